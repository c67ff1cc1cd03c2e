//! Consumer-side policies for native clients of the coordinator: how to
//! reconnect a dropped push channel, keep ride status fresh by polling, merge
//! polled and pushed state, and draw a traveled path without GPS jitter.

pub mod backoff;
pub mod poller;
pub mod reconcile;
pub mod trail;
