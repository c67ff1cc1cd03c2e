use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::DriverPresence;
use crate::models::ride::Ride;
use crate::store::RideStore;

/// In-process store. Each ride update runs under the ride's shard write lock.
#[derive(Default)]
pub struct MemoryStore {
    rides: DashMap<Uuid, Ride>,
    presence: DashMap<Uuid, DriverPresence>,
    active_by_rider: DashMap<Uuid, Uuid>,
    active_by_driver: DashMap<Uuid, Uuid>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RideStore for MemoryStore {
    fn insert_ride(&self, ride: Ride) -> Result<Ride, AppError> {
        match self.active_by_rider.entry(ride.rider_id) {
            Entry::Occupied(existing) => {
                return Err(AppError::Conflict(format!(
                    "rider {} already has active ride {}",
                    ride.rider_id,
                    existing.get()
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(ride.id);
            }
        }

        self.rides.insert(ride.id, ride.clone());
        Ok(ride)
    }

    fn ride(&self, id: Uuid) -> Result<Ride, AppError> {
        self.rides
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("ride {id} not found")))
    }

    fn update_ride(
        &self,
        id: Uuid,
        apply: &mut dyn FnMut(&mut Ride) -> Result<(), AppError>,
    ) -> Result<Ride, AppError> {
        let mut current = self
            .rides
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("ride {id} not found")))?;

        let mut next = current.clone();
        apply(&mut next)?;

        if let Some(driver_id) = next.driver_id {
            if next.is_active() && current.driver_id != Some(driver_id) {
                match self.active_by_driver.entry(driver_id) {
                    Entry::Occupied(bound) if *bound.get() != id => {
                        return Err(AppError::InvalidState(format!(
                            "driver {driver_id} is already bound to ride {}",
                            bound.get()
                        )));
                    }
                    Entry::Occupied(_) => {}
                    Entry::Vacant(slot) => {
                        slot.insert(id);
                    }
                }
            }
        }

        if current.is_active() && !next.is_active() {
            self.active_by_rider
                .remove_if(&current.rider_id, |_, ride_id| *ride_id == id);
        }
        if let Some(previous_driver) = current.driver_id {
            if !next.is_active() || next.driver_id != Some(previous_driver) {
                self.active_by_driver
                    .remove_if(&previous_driver, |_, ride_id| *ride_id == id);
            }
        }

        next.version = current.version + 1;
        *current = next.clone();
        Ok(next)
    }

    fn rides(&self, filter: &dyn Fn(&Ride) -> bool) -> Vec<Ride> {
        self.rides
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn active_ride_of_driver(&self, driver_id: Uuid) -> Option<Uuid> {
        self.active_by_driver.get(&driver_id).map(|entry| *entry.value())
    }

    fn presence(&self, driver_id: Uuid) -> Option<DriverPresence> {
        self.presence.get(&driver_id).map(|entry| entry.value().clone())
    }

    fn upsert_presence(&self, presence: DriverPresence) -> DriverPresence {
        self.presence.insert(presence.driver_id, presence.clone());
        presence
    }

    fn update_presence(
        &self,
        driver_id: Uuid,
        apply: &mut dyn FnMut(&mut DriverPresence),
    ) -> Result<DriverPresence, AppError> {
        let mut presence = self
            .presence
            .get_mut(&driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

        apply(&mut presence);
        Ok(presence.clone())
    }

    fn presences(&self) -> Vec<DriverPresence> {
        self.presence
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::MemoryStore;
    use crate::error::AppError;
    use crate::models::driver::GeoPoint;
    use crate::models::ride::{Place, Ride, RideStatus, VehicleType};
    use crate::store::RideStore;

    fn pending_ride(rider_id: Uuid) -> Ride {
        let now = Utc::now();
        let place = Place {
            location: GeoPoint::new(28.6, 77.2),
            label: "somewhere".to_string(),
        };
        Ride {
            id: Uuid::new_v4(),
            status: RideStatus::Pending,
            rider_id,
            driver_id: None,
            pickup: place.clone(),
            dropoff: place,
            vehicle_type: VehicleType::ERickshaw,
            female_driver_preferred: false,
            distance_km: 0.5,
            estimated_fare: 44.0,
            actual_fare: None,
            co2_saved_kg: None,
            eco_points_earned: None,
            requested_at: now,
            accepted_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            cancelled_by: None,
            cancel_reason: None,
            sos_raised_at: None,
            sos_raised_by: None,
            updated_at: now,
            version: 0,
        }
    }

    #[test]
    fn second_active_ride_for_same_rider_is_a_conflict() {
        let store = MemoryStore::new();
        let rider = Uuid::new_v4();
        store.insert_ride(pending_ride(rider)).unwrap();

        let err = store.insert_ride(pending_ride(rider)).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn failed_update_leaves_ride_untouched() {
        let store = MemoryStore::new();
        let ride = store.insert_ride(pending_ride(Uuid::new_v4())).unwrap();

        let result = store.update_ride(ride.id, &mut |ride| {
            ride.status = RideStatus::Accepted;
            Err(AppError::InvalidState("nope".to_string()))
        });

        assert!(result.is_err());
        let stored = store.ride(ride.id).unwrap();
        assert_eq!(stored.status, RideStatus::Pending);
        assert_eq!(stored.version, 0);
    }

    #[test]
    fn terminal_update_frees_the_rider_slot() {
        let store = MemoryStore::new();
        let rider = Uuid::new_v4();
        let ride = store.insert_ride(pending_ride(rider)).unwrap();

        let cancelled = store
            .update_ride(ride.id, &mut |ride| {
                ride.status = RideStatus::Cancelled;
                Ok(())
            })
            .unwrap();
        assert_eq!(cancelled.version, 1);

        assert!(store.insert_ride(pending_ride(rider)).is_ok());
    }

    #[test]
    fn driver_cannot_be_bound_to_two_active_rides() {
        let store = MemoryStore::new();
        let driver = Uuid::new_v4();
        let first = store.insert_ride(pending_ride(Uuid::new_v4())).unwrap();
        let second = store.insert_ride(pending_ride(Uuid::new_v4())).unwrap();

        let bind = |ride: &mut Ride| -> Result<(), AppError> {
            ride.status = RideStatus::Accepted;
            ride.driver_id = Some(driver);
            Ok(())
        };

        store.update_ride(first.id, &mut bind.clone()).unwrap();
        let err = store.update_ride(second.id, &mut bind.clone()).unwrap_err();
        assert!(err.is_invalid_state());
        assert_eq!(store.active_ride_of_driver(driver), Some(first.id));
        assert_eq!(store.ride(second.id).unwrap().status, RideStatus::Pending);
    }

    #[test]
    fn unknown_ride_is_not_found() {
        let store = MemoryStore::new();
        let err = store.ride(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
