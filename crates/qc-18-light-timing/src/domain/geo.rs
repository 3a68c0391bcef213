//! # Geographic Positions
//!
//! Node positions and the distance between them.
//!
//! Distances combine the haversine great-circle distance on a spherical
//! Earth with the altitude difference, in quadrature:
//!
//! ```text
//! distance = sqrt(great_circle² + |alt_a - alt_b|²)
//! ```

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

use super::{TimingError, TimingResult};

/// Degrees to radians conversion factor
const DEG_TO_RAD: f64 = PI / 180.0;

/// Mean Earth radius for the spherical approximation, in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Latitude beyond which a position is tagged as polar
const POLAR_LATITUDE: f64 = 66.5;

/// A validated WGS84-style position.
///
/// Latitude is in `[-90, 90]`, longitude in `[-180, 180]` (degrees) and
/// altitude is meters above sea level, never negative.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGeoPosition", into = "RawGeoPosition")]
pub struct GeoPosition {
    latitude: f64,
    longitude: f64,
    altitude: f64,
}

/// Unchecked wire representation, validated on deserialization.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct RawGeoPosition {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    altitude: f64,
}

impl GeoPosition {
    /// Create a position, rejecting out-of-range or non-finite coordinates.
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> TimingResult<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(TimingError::InvalidPosition(format!(
                "latitude {latitude} outside [-90, 90]"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(TimingError::InvalidPosition(format!(
                "longitude {longitude} outside [-180, 180]"
            )));
        }
        if !altitude.is_finite() || altitude < 0.0 {
            return Err(TimingError::InvalidPosition(format!(
                "altitude {altitude} must be a non-negative number of meters"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
            altitude,
        })
    }

    /// Position at sea level.
    pub fn surface(latitude: f64, longitude: f64) -> TimingResult<Self> {
        Self::new(latitude, longitude, 0.0)
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn altitude(&self) -> f64 {
        self.altitude
    }

    /// Distance to another position in meters.
    pub fn distance_to(&self, other: &GeoPosition) -> f64 {
        distance(self, other)
    }
}

impl TryFrom<RawGeoPosition> for GeoPosition {
    type Error = TimingError;

    fn try_from(raw: RawGeoPosition) -> Result<Self, Self::Error> {
        GeoPosition::new(raw.latitude, raw.longitude, raw.altitude)
    }
}

impl From<GeoPosition> for RawGeoPosition {
    fn from(pos: GeoPosition) -> Self {
        RawGeoPosition {
            latitude: pos.latitude,
            longitude: pos.longitude,
            altitude: pos.altitude,
        }
    }
}

impl fmt::Display for GeoPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.4}, {:.4}, {:.0}m)",
            self.latitude, self.longitude, self.altitude
        )
    }
}

/// Haversine great-circle distance over the surface, in meters.
pub fn great_circle(a: &GeoPosition, b: &GeoPosition) -> f64 {
    let lat_a = a.latitude * DEG_TO_RAD;
    let lat_b = b.latitude * DEG_TO_RAD;
    let d_lat = lat_b - lat_a;
    let d_lon = (b.longitude - a.longitude) * DEG_TO_RAD;

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);

    // Rounding can push h marginally above 1 for antipodal points
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Great-circle distance combined with the altitude difference, in meters.
pub fn distance(a: &GeoPosition, b: &GeoPosition) -> f64 {
    let surface = great_circle(a, b);
    let vertical = (a.altitude - b.altitude).abs();
    surface.hypot(vertical)
}

/// Coarse geographic region used to tag offset records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Region {
    NorthAmerica,
    SouthAmerica,
    Europe,
    Africa,
    Asia,
    Oceania,
    Polar,
}

impl Region {
    /// Bucket a position into a region by latitude/longitude bands.
    pub fn from_position(pos: &GeoPosition) -> Self {
        let (lat, lon) = (pos.latitude, pos.longitude);
        if lat.abs() > POLAR_LATITUDE {
            return Region::Polar;
        }
        if lon < -30.0 {
            if lat >= 12.0 {
                Region::NorthAmerica
            } else {
                Region::SouthAmerica
            }
        } else if lon < 60.0 {
            if lat >= 35.0 {
                Region::Europe
            } else {
                Region::Africa
            }
        } else if lat < -10.0 && lon >= 110.0 {
            Region::Oceania
        } else {
            Region::Asia
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::NorthAmerica => "north-america",
            Region::SouthAmerica => "south-america",
            Region::Europe => "europe",
            Region::Africa => "africa",
            Region::Asia => "asia",
            Region::Oceania => "oceania",
            Region::Polar => "polar",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
