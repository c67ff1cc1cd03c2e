use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::GeoPoint;
use crate::models::ride::Ride;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Who {
    Rider,
    Driver,
    #[serde(other)]
    Unknown,
}

impl Who {
    /// The role `user_id` plays in `ride`.
    pub fn in_ride(ride: &Ride, user_id: Uuid) -> Self {
        if ride.rider_id == user_id {
            Who::Rider
        } else if ride.driver_id == Some(user_id) {
            Who::Driver
        } else {
            Who::Unknown
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationSample {
    pub ride_id: Uuid,
    pub who: Who,
    pub lat: f64,
    pub lng: f64,
    pub at: DateTime<Utc>,
}

impl LocationSample {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}
