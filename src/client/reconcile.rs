use crate::models::ride::Ride;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Poll,
    Push,
}

/// A client's picture of one ride, fed by both the poller and the push
/// channel. The write with the higher store version wins; on equal versions
/// the later `updated_at` wins, and a poll may refresh an identical push.
#[derive(Debug, Default, Clone)]
pub struct RideView {
    current: Option<Ride>,
}

impl RideView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Ride> {
        self.current.as_ref()
    }

    /// Returns whether `incoming` replaced the current state.
    pub fn apply(&mut self, incoming: Ride, source: Source) -> bool {
        let newer = match &self.current {
            None => true,
            Some(current) if current.id != incoming.id => true,
            Some(current) => {
                let ours = (current.version, current.updated_at);
                let theirs = (incoming.version, incoming.updated_at);
                theirs > ours || (theirs == ours && source == Source::Poll)
            }
        };

        if newer {
            let changed = self
                .current
                .as_ref()
                .is_none_or(|current| (current.version, current.updated_at) != (incoming.version, incoming.updated_at));
            self.current = Some(incoming);
            return changed;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{RideView, Source};
    use crate::models::driver::GeoPoint;
    use crate::models::ride::{Place, Ride, RideStatus, VehicleType};

    fn ride(id: Uuid, status: RideStatus, version: u64) -> Ride {
        let now = Utc::now();
        let place = Place {
            location: GeoPoint::new(28.6, 77.2),
            label: "stop".to_string(),
        };
        Ride {
            id,
            status,
            rider_id: Uuid::nil(),
            driver_id: None,
            pickup: place.clone(),
            dropoff: place,
            vehicle_type: VehicleType::ERickshaw,
            female_driver_preferred: false,
            distance_km: 1.0,
            estimated_fare: 48.0,
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
            updated_at: now + Duration::milliseconds(version as i64),
            version,
        }
    }

    #[test]
    fn stale_push_does_not_roll_back_polled_state() {
        let id = Uuid::new_v4();
        let mut view = RideView::new();

        assert!(view.apply(ride(id, RideStatus::InProgress, 2), Source::Poll));
        assert!(!view.apply(ride(id, RideStatus::Accepted, 1), Source::Push));
        assert_eq!(view.current().unwrap().status, RideStatus::InProgress);
    }

    #[test]
    fn newer_push_wins_over_older_poll() {
        let id = Uuid::new_v4();
        let mut view = RideView::new();

        view.apply(ride(id, RideStatus::Pending, 0), Source::Poll);
        assert!(view.apply(ride(id, RideStatus::Accepted, 1), Source::Push));
        assert!(!view.apply(ride(id, RideStatus::Pending, 0), Source::Poll));
        assert_eq!(view.current().unwrap().status, RideStatus::Accepted);
    }

    #[test]
    fn repeated_poll_of_same_version_is_not_a_change() {
        let id = Uuid::new_v4();
        let mut view = RideView::new();
        let snapshot = ride(id, RideStatus::Accepted, 3);

        assert!(view.apply(snapshot.clone(), Source::Push));
        assert!(!view.apply(snapshot, Source::Poll));
    }
}
