//! Fare and eco-reward estimation. Everything here is a pure function of its
//! inputs.

use serde::{Deserialize, Serialize};

use crate::geo::haversine_km;
use crate::models::driver::GeoPoint;
use crate::models::ride::VehicleType;

/// Trips shorter than this are billed as if they were this long.
pub const MIN_DISTANCE_KM: f64 = 0.5;

pub const FEMALE_DRIVER_MULTIPLIER: f64 = 1.05;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tariff {
    pub base: f64,
    pub per_km: f64,
    /// Emissions avoided per km compared to a petrol car, in kg of CO2.
    pub co2_per_km: f64,
}

const E_RICKSHAW: Tariff = Tariff {
    base: 40.0,
    per_km: 8.0,
    co2_per_km: 0.12,
};

const E_SCOOTER: Tariff = Tariff {
    base: 25.0,
    per_km: 6.0,
    co2_per_km: 0.08,
};

const CNG_CAR: Tariff = Tariff {
    base: 60.0,
    per_km: 12.0,
    co2_per_km: 0.05,
};

pub const DEFAULT_TARIFF: Tariff = Tariff {
    base: 50.0,
    per_km: 10.0,
    co2_per_km: 0.05,
};

impl Tariff {
    /// Unknown vehicles fall back to the default tier.
    pub fn lookup(vehicle: Option<VehicleType>) -> Tariff {
        match vehicle {
            Some(VehicleType::ERickshaw) => E_RICKSHAW,
            Some(VehicleType::EScooter) => E_SCOOTER,
            Some(VehicleType::CngCar) => CNG_CAR,
            None => DEFAULT_TARIFF,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub distance_km: f64,
    pub estimated_fare: f64,
    pub co2_saved_kg: f64,
    pub eco_points: u32,
}

pub fn estimate(
    pickup: &GeoPoint,
    dropoff: &GeoPoint,
    vehicle: Option<VehicleType>,
    female_pref: bool,
) -> Estimate {
    let tariff = Tariff::lookup(vehicle);
    let distance_km = round2(haversine_km(pickup, dropoff).max(MIN_DISTANCE_KM));

    let mut fare = tariff.base + tariff.per_km * distance_km;
    if female_pref {
        fare *= FEMALE_DRIVER_MULTIPLIER;
    }

    let (co2_saved_kg, eco_points) = eco_metrics(distance_km, vehicle);

    Estimate {
        distance_km,
        estimated_fare: round2(fare),
        co2_saved_kg,
        eco_points,
    }
}

/// CO2 saved and reward points for a trip of `distance_km`.
pub fn eco_metrics(distance_km: f64, vehicle: Option<VehicleType>) -> (f64, u32) {
    let tariff = Tariff::lookup(vehicle);
    let co2_saved_kg = round2(distance_km * tariff.co2_per_km);
    let points = (co2_saved_kg * 10.0 + distance_km * 2.0).round().max(0.0);
    (co2_saved_kg, points as u32)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_TARIFF, MIN_DISTANCE_KM, Tariff, estimate};
    use crate::models::driver::GeoPoint;
    use crate::models::ride::VehicleType;

    fn connaught_place() -> GeoPoint {
        GeoPoint::new(28.6328, 77.2197)
    }

    fn india_gate() -> GeoPoint {
        GeoPoint::new(28.6129, 77.2295)
    }

    #[test]
    fn rickshaw_from_connaught_place_to_india_gate() {
        let result = estimate(
            &connaught_place(),
            &india_gate(),
            Some(VehicleType::ERickshaw),
            false,
        );

        assert!(result.distance_km > 2.3 && result.distance_km < 3.0);
        let expected = 40.0 + 8.0 * result.distance_km;
        assert!((result.estimated_fare - expected).abs() < 0.01);
        assert!(result.estimated_fare > 58.0 && result.estimated_fare < 64.0);
    }

    #[test]
    fn estimate_is_deterministic() {
        let a = estimate(&connaught_place(), &india_gate(), Some(VehicleType::ERickshaw), false);
        let b = estimate(&connaught_place(), &india_gate(), Some(VehicleType::ERickshaw), false);
        assert_eq!(a, b);
    }

    #[test]
    fn zero_length_trip_is_floored() {
        let p = connaught_place();
        let result = estimate(&p, &p, Some(VehicleType::EScooter), false);
        assert_eq!(result.distance_km, MIN_DISTANCE_KM);
        assert_eq!(result.estimated_fare, 25.0 + 6.0 * MIN_DISTANCE_KM);
    }

    #[test]
    fn female_preference_adds_five_percent() {
        let plain = estimate(&connaught_place(), &india_gate(), Some(VehicleType::CngCar), false);
        let preferred = estimate(&connaught_place(), &india_gate(), Some(VehicleType::CngCar), true);
        assert!((preferred.estimated_fare - plain.estimated_fare * 1.05).abs() < 0.02);
    }

    #[test]
    fn eco_points_follow_co2_and_distance() {
        let result = estimate(&connaught_place(), &india_gate(), Some(VehicleType::ERickshaw), false);
        let expected = (result.co2_saved_kg * 10.0 + result.distance_km * 2.0).round() as u32;
        assert_eq!(result.eco_points, expected);
        assert!((result.co2_saved_kg - result.distance_km * 0.12).abs() < 0.01);
    }

    #[test]
    fn unknown_vehicle_uses_default_tier() {
        assert_eq!(Tariff::lookup(None), DEFAULT_TARIFF);
        let p = connaught_place();
        let result = estimate(&p, &p, None, false);
        assert_eq!(result.estimated_fare, DEFAULT_TARIFF.base + DEFAULT_TARIFF.per_km * 0.5);
    }
}
