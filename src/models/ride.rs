use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    ERickshaw,
    EScooter,
    CngCar,
}

impl VehicleType {
    pub const ALL: [VehicleType; 3] = [
        VehicleType::ERickshaw,
        VehicleType::EScooter,
        VehicleType::CngCar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::ERickshaw => "e_rickshaw",
            VehicleType::EScooter => "e_scooter",
            VehicleType::CngCar => "cng_car",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|vehicle| vehicle.as_str() == raw.trim())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Pending,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
}

impl RideStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::Cancelled)
    }

    /// Statuses in which a driver is bound to the ride.
    pub fn binds_driver(&self) -> bool {
        matches!(
            self,
            RideStatus::Accepted | RideStatus::InProgress | RideStatus::Completed
        )
    }

    pub fn can_transition_to(&self, next: RideStatus) -> bool {
        matches!(
            (self, next),
            (RideStatus::Pending, RideStatus::Accepted)
                | (RideStatus::Accepted, RideStatus::InProgress)
                | (RideStatus::InProgress, RideStatus::Completed)
                | (RideStatus::Pending, RideStatus::Cancelled)
                | (RideStatus::Accepted, RideStatus::Cancelled)
                | (RideStatus::InProgress, RideStatus::Cancelled)
        )
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RideStatus::Pending => "pending",
            RideStatus::Accepted => "accepted",
            RideStatus::InProgress => "in_progress",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Place {
    pub location: GeoPoint,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub status: RideStatus,
    pub rider_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub pickup: Place,
    pub dropoff: Place,
    pub vehicle_type: VehicleType,
    pub female_driver_preferred: bool,
    pub distance_km: f64,
    pub estimated_fare: f64,
    pub actual_fare: Option<f64>,
    pub co2_saved_kg: Option<f64>,
    pub eco_points_earned: Option<u32>,
    pub requested_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<Uuid>,
    pub cancel_reason: Option<String>,
    pub sos_raised_at: Option<DateTime<Utc>>,
    pub sos_raised_by: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Ride {
    pub fn is_party(&self, user_id: Uuid) -> bool {
        self.rider_id == user_id || self.driver_id == Some(user_id)
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Checks the driver binding invariant: a driver is set exactly when the
    /// status binds one.
    pub fn driver_binding_holds(&self) -> bool {
        self.driver_id.is_some() == self.status.binds_driver()
    }
}

#[cfg(test)]
mod tests {
    use super::{RideStatus, VehicleType};

    #[test]
    fn happy_path_transitions_are_legal() {
        assert!(RideStatus::Pending.can_transition_to(RideStatus::Accepted));
        assert!(RideStatus::Accepted.can_transition_to(RideStatus::InProgress));
        assert!(RideStatus::InProgress.can_transition_to(RideStatus::Completed));
    }

    #[test]
    fn terminal_states_reject_every_transition() {
        for from in [RideStatus::Completed, RideStatus::Cancelled] {
            for to in [
                RideStatus::Pending,
                RideStatus::Accepted,
                RideStatus::InProgress,
                RideStatus::Completed,
                RideStatus::Cancelled,
            ] {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn skipping_a_step_is_illegal() {
        assert!(!RideStatus::Pending.can_transition_to(RideStatus::InProgress));
        assert!(!RideStatus::Pending.can_transition_to(RideStatus::Completed));
        assert!(!RideStatus::Accepted.can_transition_to(RideStatus::Completed));
        assert!(!RideStatus::InProgress.can_transition_to(RideStatus::Accepted));
    }

    #[test]
    fn vehicle_type_parse_is_strict() {
        assert_eq!(VehicleType::parse("e_rickshaw"), Some(VehicleType::ERickshaw));
        assert_eq!(VehicleType::parse(" cng_car "), Some(VehicleType::CngCar));
        assert_eq!(VehicleType::parse("helicopter"), None);
    }

    #[test]
    fn statuses_serialize_in_snake_case() {
        let json = serde_json::to_string(&RideStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }
}
