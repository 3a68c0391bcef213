//! # Propagation Delay Math
//!
//! Converts distances into the minimum time a signal needs to cover them.
//!
//! All functions here are total: degenerate input (negative, NaN or
//! infinite values) is clamped instead of producing an error, so callers on
//! the consensus path never have to handle a failure from pure math.

use std::time::Duration;

/// Speed of light in vacuum, meters per second
pub const SPEED_OF_LIGHT_M_PER_S: f64 = 299_792_458.0;

/// Distance at which the distance-based confidence bottoms out (20,000 km)
pub const CONFIDENCE_DISTANCE_SCALE_M: f64 = 20_000_000.0;

/// Delay at which the delay-based confidence bottoms out
pub const CONFIDENCE_DELAY_SCALE_SECS: f64 = 0.5;

/// Lower bound for each component of a combined confidence
pub const MIN_COMPONENT_CONFIDENCE: f64 = 0.1;

/// Convert seconds into a `Duration`, mapping degenerate values to zero and
/// saturating on overflow.
pub fn secs_to_duration(secs: f64) -> Duration {
    if !secs.is_finite() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Multiply a duration by a non-negative factor without panicking.
pub fn scale_duration(duration: Duration, factor: f64) -> Duration {
    secs_to_duration(duration.as_secs_f64() * factor)
}

/// Clamp a duration into `[min, max]`. A misordered range resolves to `max`.
pub fn clamp_duration(duration: Duration, min: Duration, max: Duration) -> Duration {
    duration.max(min).min(max)
}

fn sanitize_distance(distance_m: f64) -> f64 {
    if distance_m.is_finite() && distance_m > 0.0 {
        distance_m
    } else {
        0.0
    }
}

fn network_delay_secs(distance_m: f64, network_factor: f64) -> f64 {
    let factor = if network_factor.is_finite() && network_factor > 0.0 {
        network_factor
    } else {
        0.0
    };
    sanitize_distance(distance_m) / SPEED_OF_LIGHT_M_PER_S * factor
}

/// Time for light to cover `distance_m` in a straight line.
pub fn light_delay(distance_m: f64) -> Duration {
    secs_to_duration(sanitize_distance(distance_m) / SPEED_OF_LIGHT_M_PER_S)
}

/// Light delay stretched by the routing inefficiency of a real network.
pub fn network_delay(distance_m: f64, network_factor: f64) -> Duration {
    secs_to_duration(network_delay_secs(distance_m, network_factor))
}

/// Lorentz factor `1/sqrt(1-(v/c)²)`.
///
/// Returns 1.0 for velocities that are not strictly inside `(0, c)`.
pub fn lorentz_factor(velocity_m_per_s: f64) -> f64 {
    if !velocity_m_per_s.is_finite()
        || velocity_m_per_s <= 0.0
        || velocity_m_per_s >= SPEED_OF_LIGHT_M_PER_S
    {
        return 1.0;
    }
    let beta = velocity_m_per_s / SPEED_OF_LIGHT_M_PER_S;
    let gamma = 1.0 / (1.0 - beta * beta).sqrt();
    if gamma.is_finite() {
        gamma
    } else {
        1.0
    }
}

/// Network delay dilated by the relative velocity of the two endpoints.
///
/// Velocities at or below zero, or at or above `c`, leave the network delay
/// unchanged.
pub fn relativistic_delay(distance_m: f64, velocity_m_per_s: f64, network_factor: f64) -> Duration {
    let base = network_delay_secs(distance_m, network_factor);
    let gamma = lorentz_factor(velocity_m_per_s);
    if gamma == 1.0 {
        return secs_to_duration(base);
    }
    secs_to_duration(base * gamma)
}

/// Linear confidence that an observed time difference is genuine.
///
/// `max_acceptable` is the full bound (expected delay plus tolerance).
/// Returns `1 - diff/max`, and 0 once the difference reaches the bound.
pub fn confidence_score(actual_diff: Duration, max_acceptable: Duration) -> f64 {
    if max_acceptable.is_zero() {
        return if actual_diff.is_zero() { 1.0 } else { 0.0 };
    }
    if actual_diff >= max_acceptable {
        return 0.0;
    }
    (1.0 - actual_diff.as_secs_f64() / max_acceptable.as_secs_f64()).clamp(0.0, 1.0)
}

/// Confidence of a pairwise measurement from its distance and delay.
///
/// Average of `1 - distance/20000km` and `1 - delay/0.5s`, each floored
/// at 0.1.
pub fn combined_confidence(distance_m: f64, delay_secs: f64) -> f64 {
    let distance_confidence = component_confidence(distance_m / CONFIDENCE_DISTANCE_SCALE_M);
    let delay_confidence = component_confidence(delay_secs / CONFIDENCE_DELAY_SCALE_SECS);
    ((distance_confidence + delay_confidence) / 2.0).clamp(0.0, 1.0)
}

fn component_confidence(ratio: f64) -> f64 {
    if !ratio.is_finite() {
        return MIN_COMPONENT_CONFIDENCE;
    }
    (1.0 - ratio).clamp(MIN_COMPONENT_CONFIDENCE, 1.0)
}
