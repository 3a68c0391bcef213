//! Adapters layer (Hexagonal Architecture)
//!
//! Concrete implementations of the outbound ports.

pub mod directory;
#[cfg(feature = "metrics")]
pub mod prometheus;
pub mod stats;

pub use directory::InMemoryNodeDirectory;
#[cfg(feature = "metrics")]
pub use self::prometheus::PrometheusTimingStats;
pub use stats::{AtomicTimingStats, TimingStatsSnapshot};
