pub mod memory;

use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::DriverPresence;
use crate::models::ride::Ride;

pub use memory::MemoryStore;

/// Durable home of rides and driver presence.
///
/// `update_ride` is the only way to mutate a ride. Implementations must run
/// `apply` atomically with respect to every other update of the same ride and
/// persist the result only when `apply` succeeds, so a failed transition
/// leaves the stored ride untouched. They also keep two uniqueness indices
/// consistent with each write: at most one active ride per rider and at most
/// one active ride per driver.
pub trait RideStore: Send + Sync {
    /// Fails with `Conflict` when the rider already has an active ride.
    fn insert_ride(&self, ride: Ride) -> Result<Ride, AppError>;

    fn ride(&self, id: Uuid) -> Result<Ride, AppError>;

    fn update_ride(
        &self,
        id: Uuid,
        apply: &mut dyn FnMut(&mut Ride) -> Result<(), AppError>,
    ) -> Result<Ride, AppError>;

    fn rides(&self, filter: &dyn Fn(&Ride) -> bool) -> Vec<Ride>;

    fn active_ride_of_driver(&self, driver_id: Uuid) -> Option<Uuid>;

    fn presence(&self, driver_id: Uuid) -> Option<DriverPresence>;

    fn upsert_presence(&self, presence: DriverPresence) -> DriverPresence;

    fn update_presence(
        &self,
        driver_id: Uuid,
        apply: &mut dyn FnMut(&mut DriverPresence),
    ) -> Result<DriverPresence, AppError>;

    fn presences(&self) -> Vec<DriverPresence>;
}
