//! # Offset Estimation Model
//!
//! A node's clock offset is estimated from theoretical delays to a set of
//! reference nodes. Delay between two nodes is assumed symmetric, so each
//! side is charged half of the pairwise delay:
//!
//! ```text
//! offset = Σ(confidence_i × delay_i / 2) / Σ(confidence_i)
//! ```

use std::time::Duration;

use super::delay::{combined_confidence, secs_to_duration};

/// One node-to-reference comparison.
#[derive(Clone, Debug, PartialEq)]
pub struct PairMeasurement {
    pub reference_id: String,
    pub distance_m: f64,
    pub delay: Duration,
    /// Weight of this comparison in `[0, 1]`
    pub confidence: f64,
}

impl PairMeasurement {
    /// Measurement weighted by its distance and delay.
    pub fn new(reference_id: impl Into<String>, distance_m: f64, delay: Duration) -> Self {
        let confidence = combined_confidence(distance_m, delay.as_secs_f64());
        Self::with_confidence(reference_id, distance_m, delay, confidence)
    }

    pub fn with_confidence(
        reference_id: impl Into<String>,
        distance_m: f64,
        delay: Duration,
        confidence: f64,
    ) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            reference_id: reference_id.into(),
            distance_m,
            delay,
            confidence,
        }
    }
}

/// Confidence-weighted average of half of each pairwise delay.
///
/// Returns the offset and the mean confidence of the measurements, or
/// `None` when there is nothing with positive weight to average.
pub fn weighted_half_delay(measurements: &[PairMeasurement]) -> Option<(Duration, f64)> {
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    for m in measurements {
        weighted_sum += m.confidence * m.delay.as_secs_f64() / 2.0;
        total_weight += m.confidence;
    }
    if total_weight <= 0.0 {
        return None;
    }

    let mean_confidence = (total_weight / measurements.len() as f64).clamp(0.0, 1.0);
    Some((secs_to_duration(weighted_sum / total_weight), mean_confidence))
}

/// Confidence-weighted average over `(offset, confidence)` pairs whose
/// confidence exceeds `min_confidence`. Zero when none qualify.
pub fn weighted_global_offset<I>(offsets: I, min_confidence: f64) -> Duration
where
    I: IntoIterator<Item = (Duration, f64)>,
{
    let (weighted_sum, total_weight) = offsets
        .into_iter()
        .filter(|(_, confidence)| *confidence > min_confidence)
        .fold((0.0, 0.0), |(sum, weight), (offset, confidence)| {
            (sum + offset.as_secs_f64() * confidence, weight + confidence)
        });

    if total_weight <= 0.0 {
        return Duration::ZERO;
    }
    secs_to_duration(weighted_sum / total_weight)
}
