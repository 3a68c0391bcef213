//! Domain layer for the Light Timing subsystem
//!
//! Pure math, value types and the TTL cache. Nothing here performs I/O or
//! spawns tasks.

pub mod cache;
pub mod config;
pub mod delay;
pub mod entities;
pub mod error;
pub mod fault_tolerance;
pub mod geo;
pub mod offset;
pub mod timing;

pub use cache::{CacheKind, CacheLookup, TtlCache};
pub use config::{
    ConsensusTimingConfig, LightTimingConfig, OffsetConfig, PropagationConfig, SyncConfig,
};
pub use delay::{
    combined_confidence, confidence_score, light_delay, lorentz_factor, network_delay,
    relativistic_delay, SPEED_OF_LIGHT_M_PER_S,
};
pub use entities::{
    BatchOutcome, DelayResult, NodeOffset, NodeRef, PairKey, SyncState, SyncStatus,
    ValidationResult, ValidationSubject,
};
pub use error::{ErrorKind, TimingError, TimingResult};
pub use fault_tolerance::{unique_ids, validator_set_fingerprint, FaultTolerance};
pub use geo::{distance, great_circle, GeoPosition, Region, EARTH_RADIUS_M};
pub use offset::{weighted_global_offset, weighted_half_delay, PairMeasurement};
pub use timing::{ConsensusTiming, TimeoutParameters};
