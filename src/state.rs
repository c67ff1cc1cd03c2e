use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::DispatchConfig;
use crate::engine::dispatch::Dispatcher;
use crate::engine::hub::PushHub;
use crate::engine::location::LocationBroadcaster;
use crate::observability::metrics::Metrics;
use crate::store::{MemoryStore, RideStore};

pub type ConnectionId = u64;

pub struct AppState {
    pub store: Arc<dyn RideStore>,
    pub hub: PushHub,
    pub locations: LocationBroadcaster,
    pub dispatch: Dispatcher,
    pub metrics: Metrics,
    next_connection_id: AtomicU64,
}

impl AppState {
    pub fn new(event_buffer_size: usize, dispatch: DispatchConfig) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), event_buffer_size, dispatch)
    }

    pub fn with_store(
        store: Arc<dyn RideStore>,
        event_buffer_size: usize,
        dispatch: DispatchConfig,
    ) -> Self {
        Self::with_dispatcher(store, event_buffer_size, Dispatcher::new(dispatch))
    }

    /// For a dispatcher carrying filters beyond the configured ones.
    pub fn with_dispatcher(
        store: Arc<dyn RideStore>,
        event_buffer_size: usize,
        dispatch: Dispatcher,
    ) -> Self {
        Self {
            store,
            hub: PushHub::new(event_buffer_size),
            locations: LocationBroadcaster::new(event_buffer_size),
            dispatch,
            metrics: Metrics::new(),
            next_connection_id: AtomicU64::new(1),
        }
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }
}
