use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::models::message::PushMessage;

/// Push topics keyed by user id, plus one stream every admin observes.
///
/// Delivery is best effort: a message for a user with no open connection is
/// dropped, and the REST surface stays the source of truth.
pub struct PushHub {
    users: DashMap<Uuid, broadcast::Sender<PushMessage>>,
    admin: broadcast::Sender<PushMessage>,
    capacity: usize,
}

impl PushHub {
    pub fn new(capacity: usize) -> Self {
        let (admin, _unused_rx) = broadcast::channel(capacity);
        Self {
            users: DashMap::new(),
            admin,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscribe_user(&self, user_id: Uuid) -> broadcast::Receiver<PushMessage> {
        self.users
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn subscribe_admin(&self) -> broadcast::Receiver<PushMessage> {
        self.admin.subscribe()
    }

    /// Returns whether at least one connection of `user_id` received it.
    pub fn send_to_user(&self, user_id: Uuid, message: PushMessage) -> bool {
        let delivered = match self.users.get(&user_id) {
            Some(sender) => sender.send(message).is_ok(),
            None => false,
        };
        if !delivered {
            debug!(user_id = %user_id, "no open connection; push dropped");
            self.release_user(user_id);
        }
        delivered
    }

    pub fn send_to_admins(&self, message: PushMessage) {
        let _ = self.admin.send(message);
    }

    /// Drops the user's topic once its last connection is gone.
    pub fn release_user(&self, user_id: Uuid) {
        self.users
            .remove_if(&user_id, |_, sender| sender.receiver_count() == 0);
    }

    pub fn connected_users(&self) -> usize {
        self.users.len()
    }
}
