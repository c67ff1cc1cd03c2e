use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::caller::Caller;
use crate::models::driver::GeoPoint;
use crate::models::location::{LocationSample, Who};
use crate::models::message::PushMessage;
use crate::state::{AppState, ConnectionId};

/// A sample on its way to subscribers, tagged with the connection that sent
/// it so that connection can skip its own echo.
#[derive(Debug, Clone)]
pub struct Relayed {
    pub origin: Option<ConnectionId>,
    pub sample: LocationSample,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Applied,
    /// A newer sample for the same (ride, who) was already applied.
    Stale,
}

/// Latest position per (ride, who) and a relay topic per ride. Nothing is
/// kept once a ride closes.
pub struct LocationBroadcaster {
    latest: DashMap<(Uuid, Who), LocationSample>,
    topics: DashMap<Uuid, broadcast::Sender<Relayed>>,
    capacity: usize,
}

impl LocationBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            latest: DashMap::new(),
            topics: DashMap::new(),
            capacity,
        }
    }

    pub fn publish(&self, sample: LocationSample, origin: Option<ConnectionId>) -> PublishOutcome {
        match self.latest.entry((sample.ride_id, sample.who)) {
            Entry::Occupied(mut current) => {
                if current.get().at > sample.at {
                    return PublishOutcome::Stale;
                }
                current.insert(sample.clone());
            }
            Entry::Vacant(slot) => {
                slot.insert(sample.clone());
            }
        }

        if let Some(topic) = self.topics.get(&sample.ride_id) {
            let _ = topic.send(Relayed { origin, sample });
        }
        PublishOutcome::Applied
    }

    pub fn subscribe(&self, ride_id: Uuid) -> broadcast::Receiver<Relayed> {
        self.topics
            .entry(ride_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn latest(&self, ride_id: Uuid) -> Vec<LocationSample> {
        [Who::Rider, Who::Driver]
            .into_iter()
            .filter_map(|who| self.latest.get(&(ride_id, who)).map(|entry| entry.value().clone()))
            .collect()
    }

    /// Ends every subscription to the ride and forgets its positions.
    pub fn close_ride(&self, ride_id: Uuid) {
        self.topics.remove(&ride_id);
        for who in [Who::Rider, Who::Driver, Who::Unknown] {
            self.latest.remove(&(ride_id, who));
        }
    }

    pub fn open_topics(&self) -> usize {
        self.topics.len()
    }
}

/// Publishes the caller's position within a ride. `who` is derived from the
/// caller's seat in the ride, never taken from the client.
pub fn publish_location(
    state: &AppState,
    caller: &Caller,
    ride_id: Uuid,
    point: GeoPoint,
    at: Option<DateTime<Utc>>,
    origin: Option<ConnectionId>,
) -> Result<PublishOutcome, AppError> {
    let result = publish_checked(state, caller, ride_id, point, at, origin);

    let outcome = match &result {
        Ok(PublishOutcome::Applied) => "applied",
        Ok(PublishOutcome::Stale) => "stale",
        Err(_) => "rejected",
    };
    state
        .metrics
        .location_updates_total
        .with_label_values(&[outcome])
        .inc();

    result
}

fn publish_checked(
    state: &AppState,
    caller: &Caller,
    ride_id: Uuid,
    point: GeoPoint,
    at: Option<DateTime<Utc>>,
    origin: Option<ConnectionId>,
) -> Result<PublishOutcome, AppError> {
    point.validate()?;

    let ride = state.store.ride(ride_id)?;
    if !ride.is_active() {
        return Err(AppError::InvalidState(format!(
            "ride {ride_id} is {} and no longer tracked",
            ride.status
        )));
    }

    let who = Who::in_ride(&ride, caller.id);
    if who == Who::Unknown {
        return Err(AppError::Unauthorized(format!(
            "caller {} is not a party of ride {ride_id}",
            caller.id
        )));
    }

    // Client clocks may run ahead; a future stamp would outrank every later sample.
    let now = Utc::now();
    let sample = LocationSample {
        ride_id,
        who,
        lat: point.lat,
        lng: point.lng,
        at: at.map_or(now, |at| at.min(now)),
    };

    let outcome = state.locations.publish(sample.clone(), origin);
    if outcome == PublishOutcome::Stale {
        debug!(ride_id = %ride_id, who = ?who, "out-of-order location sample dropped");
        return Ok(outcome);
    }
    if forget_if_closed(state, ride_id) {
        return Err(AppError::InvalidState(format!(
            "ride {ride_id} closed while the sample was published"
        )));
    }

    if who == Who::Driver {
        let mirrored = state.store.update_presence(caller.id, &mut |presence| {
            presence.last_known_location = Some(sample.point());
            presence.updated_at = sample.at;
        });
        if let Err(err) = mirrored {
            debug!(driver_id = %caller.id, error = %err, "driver presence not mirrored");
        }
    }

    state.hub.send_to_admins(PushMessage::from(&sample));
    Ok(outcome)
}

/// Drops relay state for a ride that ended after the caller last checked it.
/// Returns whether the ride is closed.
pub(crate) fn forget_if_closed(state: &AppState, ride_id: Uuid) -> bool {
    match state.store.ride(ride_id) {
        Ok(ride) if ride.is_active() => false,
        _ => {
            state.locations.close_ride(ride_id);
            true
        }
    }
}

/// Latest samples of a ride, the polling counterpart of a subscription.
pub fn latest_locations(
    state: &AppState,
    caller: &Caller,
    ride_id: Uuid,
) -> Result<Vec<LocationSample>, AppError> {
    let ride = state.store.ride(ride_id)?;
    if !caller.is_admin() && !ride.is_party(caller.id) {
        return Err(AppError::Unauthorized(format!(
            "caller {} may not track ride {ride_id}",
            caller.id
        )));
    }
    Ok(state.locations.latest(ride_id))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{LocationBroadcaster, PublishOutcome, forget_if_closed, latest_locations, publish_location};
    use crate::config::DispatchConfig;
    use crate::engine::lifecycle::{NewRide, accept_ride, cancel_ride, create_ride};
    use crate::models::caller::Caller;
    use crate::models::driver::{DriverPresence, GeoPoint};
    use crate::models::location::{LocationSample, Who};
    use crate::models::ride::{Place, Ride, VehicleType};
    use crate::state::AppState;

    fn sample(ride_id: Uuid, who: Who, lat: f64, at: chrono::DateTime<Utc>) -> LocationSample {
        LocationSample {
            ride_id,
            who,
            lat,
            lng: 77.2,
            at,
        }
    }

    #[tokio::test]
    async fn relays_to_subscribers_with_origin() {
        let broadcaster = LocationBroadcaster::new(16);
        let ride_id = Uuid::new_v4();
        let mut rx = broadcaster.subscribe(ride_id);

        let outcome = broadcaster.publish(sample(ride_id, Who::Driver, 28.6, Utc::now()), Some(7));
        assert_eq!(outcome, PublishOutcome::Applied);

        let relayed = rx.recv().await.unwrap();
        assert_eq!(relayed.origin, Some(7));
        assert_eq!(relayed.sample.who, Who::Driver);
    }

    #[test]
    fn older_sample_does_not_overwrite_newer_one() {
        let broadcaster = LocationBroadcaster::new(16);
        let ride_id = Uuid::new_v4();
        let now = Utc::now();

        broadcaster.publish(sample(ride_id, Who::Driver, 28.61, now), None);
        let outcome = broadcaster.publish(
            sample(ride_id, Who::Driver, 28.60, now - Duration::seconds(3)),
            None,
        );

        assert_eq!(outcome, PublishOutcome::Stale);
        let latest = broadcaster.latest(ride_id);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].lat, 28.61);
    }

    #[test]
    fn rider_and_driver_positions_are_kept_separately() {
        let broadcaster = LocationBroadcaster::new(16);
        let ride_id = Uuid::new_v4();
        let now = Utc::now();

        broadcaster.publish(sample(ride_id, Who::Rider, 28.1, now), None);
        broadcaster.publish(sample(ride_id, Who::Driver, 28.2, now), None);

        assert_eq!(broadcaster.latest(ride_id).len(), 2);
    }

    #[tokio::test]
    async fn closing_a_ride_ends_subscriptions_and_forgets_positions() {
        let broadcaster = LocationBroadcaster::new(16);
        let ride_id = Uuid::new_v4();
        let mut rx = broadcaster.subscribe(ride_id);
        broadcaster.publish(sample(ride_id, Who::Rider, 28.1, Utc::now()), None);
        let _ = rx.recv().await.unwrap();

        broadcaster.close_ride(ride_id);

        assert!(rx.recv().await.is_err());
        assert!(broadcaster.latest(ride_id).is_empty());
        assert_eq!(broadcaster.open_topics(), 0);
    }

    fn accepted_ride(state: &AppState) -> (Caller, Caller, Ride) {
        let rider = Caller::rider(Uuid::new_v4());
        let driver = Caller::driver(Uuid::new_v4());
        state.store.upsert_presence(DriverPresence {
            driver_id: driver.id,
            is_available: true,
            last_known_location: Some(GeoPoint::new(28.63, 77.22)),
            vehicle_type: VehicleType::ERickshaw,
            updated_at: Utc::now(),
        });
        let ride = create_ride(
            state,
            &rider,
            NewRide {
                pickup: Place {
                    location: GeoPoint::new(28.6328, 77.2197),
                    label: "Connaught Place".to_string(),
                },
                dropoff: Place {
                    location: GeoPoint::new(28.6129, 77.2295),
                    label: "India Gate".to_string(),
                },
                vehicle_type: VehicleType::ERickshaw,
                female_driver_preferred: false,
            },
        )
        .unwrap();
        let ride = accept_ride(state, &driver, ride.id).unwrap();
        (rider, driver, ride)
    }

    #[test]
    fn future_dated_sample_cannot_block_later_ones() {
        let state = AppState::new(16, DispatchConfig::default());
        let (rider, driver, ride) = accepted_ride(&state);
        let far_future = Utc::now() + Duration::days(365 * 50);

        let outcome = publish_location(
            &state,
            &driver,
            ride.id,
            GeoPoint::new(28.60, 77.2),
            Some(far_future),
            None,
        )
        .unwrap();
        assert_eq!(outcome, PublishOutcome::Applied);
        assert!(state.locations.latest(ride.id)[0].at <= Utc::now());

        let outcome =
            publish_location(&state, &driver, ride.id, GeoPoint::new(28.61, 77.2), None, None).unwrap();
        assert_eq!(outcome, PublishOutcome::Applied);

        let latest = latest_locations(&state, &rider, ride.id).unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].lat, 28.61);
    }

    #[test]
    fn leftovers_of_a_closed_ride_are_forgotten() {
        let state = AppState::new(16, DispatchConfig::default());
        let (rider, _driver, ride) = accepted_ride(&state);
        assert!(!forget_if_closed(&state, ride.id));

        cancel_ride(&state, &rider, ride.id, None).unwrap();
        let _rx = state.locations.subscribe(ride.id);
        state
            .locations
            .publish(sample(ride.id, Who::Rider, 28.1, Utc::now()), None);

        assert!(forget_if_closed(&state, ride.id));
        assert!(state.locations.latest(ride.id).is_empty());
        assert_eq!(state.locations.open_topics(), 0);
    }

    #[test]
    fn publishing_to_a_closed_ride_is_refused() {
        let state = AppState::new(16, DispatchConfig::default());
        let (rider, driver, ride) = accepted_ride(&state);
        cancel_ride(&state, &rider, ride.id, None).unwrap();

        let err = publish_location(&state, &driver, ride.id, GeoPoint::new(28.6, 77.2), None, None)
            .unwrap_err();
        assert!(err.is_invalid_state());
        assert!(state.locations.latest(ride.id).is_empty());
    }
}
