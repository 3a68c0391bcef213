//! # qc-18-light-timing
//!
//! Light-speed timing subsystem for Quantum-Chain.
//!
//! ## Architecture
//!
//! Signals between validators cannot travel faster than light. This
//! subsystem turns node positions into the physically irreducible
//! propagation delay between them and derives from it:
//!
//! - timestamp plausibility checks (a timestamp that claims to have crossed
//!   the planet faster than light is rejected)
//! - consensus timing (block time, voting window, per-phase timeouts) that
//!   is provably longer than the worst pairwise delay
//! - BFT fault-tolerance thresholds
//! - per-node clock offsets and a network-wide global offset
//!
//! ```text
//! consensus / API callers
//!          │
//!          ↓
//! ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │ PropagationEngine│←──│ TimingCalculator │   │ OffsetEstimator  │←── Synchronizer
//! └────────┬─────────┘   └──────────────────┘   └────────┬─────────┘     (timer)
//!          │ delay cache                                 │ offset table
//!          ↓                                             ↓
//!   geo + delay math                              NodeDirectory (read-only)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use qc_18_light_timing::{InMemoryNodeDirectory, LightTimingConfig, LightTimingService};
//! use qc_18_light_timing::ports::LightTimingApi;
//!
//! let directory = Arc::new(InMemoryNodeDirectory::from_json_str(&seed)?);
//! let (service, stats) =
//!     LightTimingService::with_defaults(directory, LightTimingConfig::default())?;
//!
//! let timing = service.consensus_timing(&validator_ids).await?;
//! let verdict = service.validate_timestamp(claimed_at, position, "ref-node").await;
//! ```

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

// Re-export main types
pub use adapters::{AtomicTimingStats, InMemoryNodeDirectory, TimingStatsSnapshot};
pub use domain::{
    BatchOutcome, ConsensusTiming, DelayResult, ErrorKind, FaultTolerance, GeoPosition,
    LightTimingConfig, NodeOffset, NodeRef, PairKey, Region, SyncState, SyncStatus,
    TimeoutParameters, TimingError, TimingResult, ValidationResult, ValidationSubject,
};
pub use ports::{LightTimingApi, NodeDirectory, SystemTimeSource, TimeSource, TimingStats};
pub use service::{
    LightTimingDependencies, LightTimingService, OffsetEstimator, PropagationEngine,
    Synchronizer, TimingCalculator,
};
