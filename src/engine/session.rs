use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::debug;
use uuid::Uuid;

use crate::engine::location::{Relayed, forget_if_closed, publish_location};
use crate::engine::presence;
use crate::error::AppError;
use crate::models::caller::Caller;
use crate::models::driver::GeoPoint;
use crate::models::message::{ClientMessage, PushMessage};
use crate::state::{AppState, ConnectionId};

/// Everything one socket connection has subscribed to. Dropping the session
/// stops every forwarder it started.
pub struct Session {
    id: ConnectionId,
    caller: Caller,
    state: Arc<AppState>,
    outbound: mpsc::Sender<PushMessage>,
    feeds: Vec<JoinHandle<()>>,
    rides: HashMap<Uuid, JoinHandle<()>>,
}

impl Session {
    pub fn open(state: Arc<AppState>, caller: Caller, outbound: mpsc::Sender<PushMessage>) -> Self {
        let id = state.next_connection_id();
        let mut feeds = vec![forward_feed(
            state.hub.subscribe_user(caller.id),
            outbound.clone(),
        )];
        if caller.is_admin() {
            feeds.push(forward_feed(state.hub.subscribe_admin(), outbound.clone()));
        }

        state.metrics.ws_connections.inc();
        debug!(connection_id = id, user_id = %caller.id, role = ?caller.role, "session opened");

        Self {
            id,
            caller,
            state,
            outbound,
            feeds,
            rides: HashMap::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_subscribed(&self, ride_id: Uuid) -> bool {
        self.rides
            .get(&ride_id)
            .is_some_and(|forwarder| !forwarder.is_finished())
    }

    /// Starts relaying the ride's locations to this connection, beginning
    /// with the latest known positions. Subscribing twice is a no-op.
    pub async fn subscribe_ride(&mut self, ride_id: Uuid) -> Result<(), AppError> {
        self.rides.retain(|_, forwarder| !forwarder.is_finished());
        if self.rides.contains_key(&ride_id) {
            return Ok(());
        }

        let ride = self.state.store.ride(ride_id)?;
        if !self.caller.is_admin() && !ride.is_party(self.caller.id) {
            return Err(AppError::Unauthorized(format!(
                "caller {} may not track ride {ride_id}",
                self.caller.id
            )));
        }
        if !ride.is_active() {
            return Err(AppError::InvalidState(format!(
                "ride {ride_id} is {} and no longer tracked",
                ride.status
            )));
        }

        let rx = self.state.locations.subscribe(ride_id);
        if forget_if_closed(&self.state, ride_id) {
            return Err(AppError::InvalidState(format!(
                "ride {ride_id} closed while subscribing"
            )));
        }
        for sample in self.state.locations.latest(ride_id) {
            self.outbound
                .send(PushMessage::from(&sample))
                .await
                .map_err(|_| AppError::Transport("connection closed".to_string()))?;
        }

        let forwarder = forward_ride(rx, self.id, self.outbound.clone());
        self.rides.insert(ride_id, forwarder);
        debug!(connection_id = self.id, ride_id = %ride_id, "subscribed to ride");
        Ok(())
    }

    /// Safe to call any number of times. Returns whether a live
    /// subscription was ended.
    pub fn unsubscribe_ride(&mut self, ride_id: Uuid) -> bool {
        match self.rides.remove(&ride_id) {
            Some(forwarder) => {
                let was_live = !forwarder.is_finished();
                forwarder.abort();
                was_live
            }
            None => false,
        }
    }

    /// Applies one inbound message and returns the reply, if any. Location
    /// publishes are best effort and never answered.
    pub async fn handle(&mut self, message: ClientMessage) -> Option<PushMessage> {
        match message {
            ClientMessage::SubscribeRide { ride_id } => match self.subscribe_ride(ride_id).await {
                Ok(()) => Some(PushMessage::Subscribed { ride_id }),
                Err(err) => Some(PushMessage::Error {
                    message: err.to_string(),
                }),
            },
            ClientMessage::UnsubscribeRide { ride_id } => {
                self.unsubscribe_ride(ride_id);
                Some(PushMessage::Unsubscribed { ride_id })
            }
            ClientMessage::LocationUpdate {
                ride_id,
                lat,
                lng,
                at,
            } => {
                let published = publish_location(
                    &self.state,
                    &self.caller,
                    ride_id,
                    GeoPoint::new(lat, lng),
                    at,
                    Some(self.id),
                );
                if let Err(err) = published {
                    debug!(connection_id = self.id, ride_id = %ride_id, error = %err, "location sample dropped");
                }
                None
            }
            ClientMessage::DriverLocation { lat, lng } => {
                let moved = presence::update_location(&self.state, &self.caller, GeoPoint::new(lat, lng));
                if let Err(err) = moved {
                    debug!(connection_id = self.id, error = %err, "driver location dropped");
                }
                None
            }
            ClientMessage::Ping => Some(PushMessage::Pong),
        }
    }

    fn teardown(&mut self) {
        for (_, forwarder) in self.rides.drain() {
            forwarder.abort();
        }
        for feed in self.feeds.drain(..) {
            feed.abort();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
        self.state.hub.release_user(self.caller.id);
        self.state.metrics.ws_connections.dec();
        debug!(connection_id = self.id, "session closed");
    }
}

fn forward_feed(rx: broadcast::Receiver<PushMessage>, outbound: mpsc::Sender<PushMessage>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stream = BroadcastStream::new(rx);
        while let Some(item) = stream.next().await {
            match item {
                Ok(message) => {
                    if outbound.send(message).await.is_err() {
                        break;
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    debug!(skipped, "slow connection skipped push messages");
                }
            }
        }
    })
}

fn forward_ride(
    mut rx: broadcast::Receiver<Relayed>,
    own: ConnectionId,
    outbound: mpsc::Sender<PushMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(relayed) => {
                    if relayed.origin == Some(own) {
                        continue;
                    }
                    if outbound.send(PushMessage::from(&relayed.sample)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(connection_id = own, skipped, "slow connection skipped location samples");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
