use super::*;
use crate::domain::{network_delay, SyncConfig, SyncState, TimingError, ValidationSubject};
use parking_lot::Mutex;
use std::collections::HashMap;

// Mock implementations for testing
struct MockDirectory {
    nodes: HashMap<String, NodeRef>,
    lookup_latency: Option<Duration>,
}

impl MockDirectory {
    fn new(nodes: Vec<NodeRef>) -> Self {
        Self {
            nodes: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
            lookup_latency: None,
        }
    }

    fn slow(nodes: Vec<NodeRef>, latency: Duration) -> Self {
        Self {
            lookup_latency: Some(latency),
            ..Self::new(nodes)
        }
    }

    fn sorted(&self, active_only: bool) -> Vec<NodeRef> {
        let mut nodes: Vec<NodeRef> = self
            .nodes
            .values()
            .filter(|n| !active_only || n.active)
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }
}

#[async_trait]
impl NodeDirectory for MockDirectory {
    async fn get_node(&self, id: &str) -> TimingResult<NodeRef> {
        if let Some(latency) = self.lookup_latency {
            tokio::time::sleep(latency).await;
        }
        self.nodes
            .get(id)
            .cloned()
            .ok_or_else(|| TimingError::NodeNotFound(id.to_string()))
    }

    async fn get_all_nodes(&self) -> Vec<NodeRef> {
        self.sorted(false)
    }

    async fn get_active_nodes(&self) -> Vec<NodeRef> {
        self.sorted(true)
    }
}

struct MockClock {
    now: Mutex<DateTime<Utc>>,
}

impl MockClock {
    fn new() -> Self {
        Self {
            now: Mutex::new(Utc::now()),
        }
    }

    fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += chrono::Duration::from_std(by).unwrap();
    }
}

impl TimeSource for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

struct Harness {
    service: LightTimingService<MockDirectory>,
    clock: Arc<MockClock>,
    stats: Arc<AtomicTimingStats>,
}

fn node(id: &str, lat: f64, lon: f64) -> NodeRef {
    NodeRef::new(id, GeoPosition::surface(lat, lon).unwrap())
}

fn world() -> Vec<NodeRef> {
    vec![
        node("nyc", 40.7128, -74.0060),
        node("la", 34.0522, -118.2437),
        node("lon", 51.5074, -0.1278),
        node("tok", 35.6762, 139.6503),
    ]
}

fn harness_with(directory: MockDirectory) -> Harness {
    harness_with_config(directory, LightTimingConfig::default())
}

fn harness_with_config(directory: MockDirectory, config: LightTimingConfig) -> Harness {
    let clock = Arc::new(MockClock::new());
    let stats = Arc::new(AtomicTimingStats::new());
    let service = LightTimingService::new(LightTimingDependencies {
        directory: Arc::new(directory),
        config,
        time_source: clock.clone(),
        stats: stats.clone(),
    })
    .unwrap();
    Harness {
        service,
        clock,
        stats,
    }
}

fn harness() -> Harness {
    harness_with(MockDirectory::new(world()))
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

// === Delay ===

#[tokio::test]
async fn test_new_york_los_angeles_delay() {
    let h = harness();
    let result = h.service.delay("nyc", "la").await.unwrap();

    assert!((result.distance_m - 3_936_000.0).abs() / 3_936_000.0 < 0.01);
    assert!((ms(result.delay) - 19.7).abs() / 19.7 < 0.01, "got {}ms", ms(result.delay));
    assert!(!result.cached);
}

#[tokio::test]
async fn test_delay_cached_in_both_directions() {
    let h = harness();
    let first = h.service.delay("nyc", "la").await.unwrap();
    let reverse = h.service.delay("la", "nyc").await.unwrap();

    assert!(reverse.cached);
    assert_eq!(reverse.delay, first.delay);
    assert_eq!(reverse.source_id, "la");

    let snap = h.stats.snapshot();
    assert_eq!(snap.delay_cache_hits, 1);
    assert_eq!(snap.delays_computed, 1);
}

#[tokio::test]
async fn test_delay_cache_expires() {
    let h = harness();
    h.service.delay("nyc", "la").await.unwrap();

    h.clock.advance(Duration::from_secs(5 * 60));
    let again = h.service.delay("nyc", "la").await.unwrap();
    assert!(!again.cached);
    assert_eq!(h.stats.snapshot().delays_computed, 2);
}

#[tokio::test]
async fn test_delay_unknown_node() {
    let h = harness();
    let err = h.service.delay("nyc", "mars").await.unwrap_err();
    assert!(matches!(err, TimingError::NodeNotFound(ref id) if id == "mars"));
    assert_eq!(err.kind().http_status(), 404);
}

#[tokio::test(start_paused = true)]
async fn test_delay_deadline_exceeded() {
    let h = harness_with(MockDirectory::slow(world(), Duration::from_secs(2)));
    let err = h
        .service
        .engine()
        .delay_by_id_within(Duration::from_millis(500), "nyc", "la")
        .await
        .unwrap_err();
    assert!(matches!(err, TimingError::DeadlineExceeded(d) if d == Duration::from_millis(500)));

    // A generous deadline succeeds
    let ok = h
        .service
        .engine()
        .delay_by_id_within(Duration::from_secs(10), "nyc", "la")
        .await;
    assert!(ok.is_ok());
}

// === Batch delays ===

#[tokio::test]
async fn test_batch_delays_empty_and_single() {
    let h = harness();
    let empty = h.service.batch_delays(Vec::new()).await;
    assert!(empty.results.is_empty());
    assert!(empty.error().is_none());

    let single = h.service.batch_delays(vec![node("solo", 0.0, 0.0)]).await;
    assert!(single.results.is_empty());
    assert!(single.error().is_none());
}

#[tokio::test]
async fn test_batch_delays_all_pairs() {
    let h = harness();
    let outcome = h.service.batch_delays(world()).await;

    assert_eq!(outcome.total, 6);
    assert_eq!(outcome.results.len(), 6);
    assert!(outcome.is_complete());

    let nyc_la = outcome.results[&PairKey::new("la", "nyc")];
    let direct = h.service.delay("nyc", "la").await.unwrap();
    assert_eq!(nyc_la, direct.delay);
}

#[tokio::test]
async fn test_batch_delays_skips_duplicate_ids() {
    let h = harness();
    let mut nodes = world();
    nodes.push(node("nyc", 40.7128, -74.0060));
    let outcome = h.service.batch_delays(nodes).await;
    assert_eq!(outcome.total, 6);
}

#[tokio::test]
async fn test_batch_delays_cancelled_before_start() {
    let h = harness();
    let token = CancellationToken::new();
    token.cancel();

    let outcome = h
        .service
        .engine()
        .batch_delays_with_cancel(&world(), &token)
        .await;
    assert!(outcome.cancelled);
    assert!(outcome.results.is_empty());
    assert!(matches!(
        outcome.error(),
        Some(TimingError::Cancelled { completed: 0, total: 6 })
    ));
    assert_eq!(h.service.engine().cached_pairs(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_batches_share_delay_cache() {
    let h = harness();
    let engine = h.service.engine().clone();

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..32 {
        let engine = engine.clone();
        tasks.spawn(async move { engine.batch_delays(&world()).await });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        outcomes.push(joined.unwrap());
    }

    let reference = &outcomes[0].results;
    for outcome in &outcomes {
        assert!(outcome.is_complete());
        assert_eq!(&outcome.results, reference);
    }
    assert_eq!(engine.cached_pairs(), 6);
    let snap = h.stats.snapshot();
    assert!(snap.delays_computed >= 6);
    assert_eq!(snap.delay_cache_hits + snap.delay_cache_misses, 32 * 6);
}

#[tokio::test]
async fn test_max_network_delay() {
    let h = harness();
    let (pair, delay) = h.service.engine().max_network_delay().await.unwrap();
    let matrix = h.service.engine().network_delay_matrix().await;
    assert!(matrix.results.values().all(|d| *d <= delay));
    assert!(pair.contains("tok"));
}

// === Validation ===

#[tokio::test]
async fn test_validate_now_from_nearby_reference() {
    let h = harness();
    let now = h.clock.now();
    // London to Tokyo is roughly 48ms of network delay
    let claimed_position = GeoPosition::surface(35.6762, 139.6503).unwrap();

    let result = h
        .service
        .validate_timestamp(now, claimed_position, "lon")
        .await;
    assert!(result.valid, "{}", result.reason);
    assert!(result.confidence > 0.9);
    assert!(ms(result.expected_delay) > 40.0 && ms(result.expected_delay) < 55.0);
    assert_eq!(result.threshold, result.expected_delay + Duration::from_millis(50));
}

#[tokio::test]
async fn test_validate_unknown_reference_is_verdict() {
    let h = harness();
    let result = h
        .service
        .validate_timestamp(h.clock.now(), GeoPosition::surface(0.0, 0.0).unwrap(), "ghost")
        .await;
    assert!(!result.valid);
    assert_eq!(result.confidence, 0.0);
    assert!(result.reason.contains("not found"));
}

#[tokio::test]
async fn test_validate_far_past_rejected() {
    let h = harness();
    let claimed = h.clock.now() - chrono::Duration::seconds(10);
    let la = GeoPosition::surface(34.0522, -118.2437).unwrap();

    let result = h.service.validate_timestamp(claimed, la, "nyc").await;
    assert!(!result.valid);
    assert_eq!(result.confidence, 0.0);
    assert!(result.reason.contains("exceeds bound"));
}

#[tokio::test]
async fn test_validate_future_timestamp_uses_absolute_difference() {
    let h = harness();
    let claimed = h.clock.now() + chrono::Duration::seconds(10);
    let la = GeoPosition::surface(34.0522, -118.2437).unwrap();

    let result = h.service.validate_timestamp(claimed, la, "nyc").await;
    assert!(!result.valid);
    assert_eq!(result.actual_diff, Duration::from_secs(10));
}

#[tokio::test]
async fn test_validate_low_confidence_forced_invalid() {
    let h = harness();
    // ~20ms expected + 50ms tolerance; 60ms off is inside the bound
    let claimed = h.clock.now() - chrono::Duration::milliseconds(60);
    let la = GeoPosition::surface(34.0522, -118.2437).unwrap();

    let result = h.service.validate_timestamp(claimed, la, "nyc").await;
    assert!(result.actual_diff <= result.threshold);
    assert!(!result.valid);
    assert!(result.confidence > 0.0 && result.confidence < 0.5);
    assert!(result.reason.contains("confidence"));
}

#[tokio::test]
async fn test_validate_arrival_at_physical_delay_from_far_reference() {
    let h = harness();
    let london = GeoPosition::surface(51.5074, -0.1278).unwrap();
    let sydney = GeoPosition::surface(-33.8688, 151.2093).unwrap();
    let expected = network_delay(london.distance_to(&sydney), 1.5);
    assert!(expected > Duration::from_millis(50));

    // Sent from Sydney exactly one propagation delay ago
    let claimed = h.clock.now() - chrono::Duration::from_std(expected).unwrap();
    let result = h.service.validate_timestamp(claimed, sydney, "lon").await;
    assert!(result.valid, "{}", result.reason);
    assert!(result.confidence < 0.5);

    // Eating most of the tolerance slack is still rejected
    let late = claimed - chrono::Duration::milliseconds(45);
    let result = h.service.validate_timestamp(late, sydney, "lon").await;
    assert!(result.actual_diff <= result.threshold);
    assert!(!result.valid);
    assert!(result.reason.contains("confidence"));
}

#[tokio::test]
async fn test_validate_subject_tolerances() {
    let h = harness();
    let claimed = h.clock.now() - chrono::Duration::milliseconds(300);
    let la = GeoPosition::surface(34.0522, -118.2437).unwrap();
    let engine = h.service.engine();

    let tx = engine
        .validate_subject(
            ValidationSubject::Transaction { hash: "0xab".into() },
            claimed,
            la,
            "nyc",
        )
        .await;
    assert!(tx.valid, "{}", tx.reason);
    assert_eq!(tx.subject, Some(ValidationSubject::Transaction { hash: "0xab".into() }));

    let block = engine
        .validate_subject(ValidationSubject::Block { height: 7 }, claimed, la, "nyc")
        .await;
    assert!(!block.valid);

    let heartbeat = engine
        .validate_subject(
            ValidationSubject::Heartbeat { node_id: "la".into() },
            claimed,
            la,
            "nyc",
        )
        .await;
    assert!(!heartbeat.valid);
    assert!(heartbeat.reason.contains("exceeds bound"));
}

#[tokio::test(start_paused = true)]
async fn test_validate_deadline_is_invalid_verdict() {
    let h = harness_with(MockDirectory::slow(world(), Duration::from_secs(5)));
    let result = h
        .service
        .engine()
        .validate_timestamp_within(
            Duration::from_millis(100),
            h.clock.now(),
            GeoPosition::surface(0.0, 0.0).unwrap(),
            "nyc",
        )
        .await;
    assert!(!result.valid);
    assert_eq!(result.reason, "deadline exceeded");
    assert_eq!(h.stats.snapshot().validations_rejected, 1);
}

// === Consensus timing ===

#[tokio::test]
async fn test_consensus_timing_floor() {
    let h = harness();
    let timing = h
        .service
        .consensus_timing(&ids(&["nyc", "la", "lon", "tok"]))
        .await
        .unwrap();

    // Every pair is under 100ms, so the floor applies
    assert_eq!(timing.max_propagation_delay, Duration::from_millis(100));
    assert_eq!(timing.safety_margin, Duration::from_millis(200));
    assert_eq!(timing.block_time, Duration::from_secs(2));
    assert_eq!(timing.optimal_clock_offset, Duration::from_millis(50));
    assert_eq!(timing.validator_count, 4);
}

#[tokio::test]
async fn test_consensus_timing_skips_unresolvable() {
    let h = harness();
    let timing = h
        .service
        .consensus_timing(&ids(&["nyc", "ghost", "la"]))
        .await
        .unwrap();
    assert_eq!(timing.validator_count, 2);

    let err = h
        .service
        .consensus_timing(&ids(&["nyc", "ghost"]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TimingError::InsufficientValidators {
            required: 2,
            resolved: 1
        }
    ));
    assert_eq!(err.kind().http_status(), 400);
}

#[tokio::test]
async fn test_consensus_timing_cached_per_set() {
    let h = harness();
    let first = h
        .service
        .consensus_timing(&ids(&["nyc", "la", "lon"]))
        .await
        .unwrap();

    h.clock.advance(Duration::from_secs(30));
    let reordered = h
        .service
        .consensus_timing(&ids(&["lon", "nyc", "la", "nyc"]))
        .await
        .unwrap();
    assert_eq!(reordered.computed_at, first.computed_at);
    assert_eq!(h.stats.snapshot().timing_cache_hits, 1);

    h.clock.advance(Duration::from_secs(91));
    let refreshed = h
        .service
        .consensus_timing(&ids(&["nyc", "la", "lon"]))
        .await
        .unwrap();
    assert_ne!(refreshed.computed_at, first.computed_at);
}

#[tokio::test]
async fn test_derived_parameters() {
    let h = harness();
    let validators = ids(&["nyc", "la", "lon", "tok"]);

    let window = h.service.voting_window(&validators).await.unwrap();
    assert_eq!(window, Duration::from_secs(2));

    let timeouts = h.service.timeout_parameters(&validators).await.unwrap();
    assert_eq!(timeouts.proposal, Duration::from_secs(2));
    assert_eq!(timeouts.view_change, Duration::from_secs(2));

    let busy = h
        .service
        .optimal_block_interval(&validators, 0.9)
        .await
        .unwrap();
    assert_eq!(busy, Duration::from_millis(1_400));
    let idle = h
        .service
        .optimal_block_interval(&validators, f64::NAN)
        .await
        .unwrap();
    assert_eq!(idle, Duration::from_secs(2));
}

#[tokio::test]
async fn test_fault_tolerance() {
    let h = harness();
    let ft = h
        .service
        .fault_tolerance(&ids(&["a", "b", "c", "d", "e", "f", "g"]))
        .await
        .unwrap();
    assert_eq!(ft.byzantine_tolerance, 2);
    assert_eq!(ft.crash_tolerance, 3);
    assert_eq!(ft.quorum_size, 4);

    assert!(matches!(
        h.service.fault_tolerance(&[]).await,
        Err(TimingError::EmptyValidatorSet)
    ));
}

// === Offsets ===

#[tokio::test]
async fn test_node_offset_weighted_half_delay() {
    let h = harness();
    let offsets = h.service.offsets();
    let record = offsets
        .node_offset("nyc", &ids(&["nyc", "la", "lon", "ghost"]))
        .await
        .unwrap();

    // Self and the unknown reference are skipped
    assert_eq!(record.measurement_count, 2);
    assert_eq!(record.region, crate::domain::Region::NorthAmerica);
    assert!(record.confidence > 0.0 && record.confidence <= 1.0);

    let to_la = h.service.delay("nyc", "la").await.unwrap().delay;
    let to_lon = h.service.delay("nyc", "lon").await.unwrap().delay;
    assert!(record.offset >= to_la / 2 && record.offset <= to_lon / 2);

    assert_eq!(offsets.get_node_offset("nyc").unwrap(), record);
}

#[tokio::test]
async fn test_node_offset_without_references() {
    let h = harness();
    let err = h
        .service
        .offsets()
        .node_offset("nyc", &ids(&["nyc", "ghost"]))
        .await
        .unwrap_err();
    assert!(matches!(err, TimingError::NoValidMeasurements(ref id) if id == "nyc"));
}

#[tokio::test]
async fn test_offset_goes_stale() {
    let h = harness();
    let offsets = h.service.offsets();
    offsets.node_offset("la", &ids(&["nyc", "lon"])).await.unwrap();

    h.clock.advance(Duration::from_secs(30 * 60));
    assert!(matches!(
        offsets.get_node_offset("la"),
        Err(TimingError::StaleOffset { ref node_id, .. }) if node_id == "la"
    ));
    assert!(offsets.adjust_timestamp(h.clock.now(), "la").is_err());

    // The one-argument form recomputes against the active set
    let fresh = h.service.node_offset("la").await.unwrap();
    assert_eq!(fresh.measurement_count, 3);
    assert!(offsets.get_node_offset("la").is_ok());
}

#[tokio::test]
async fn test_missing_offset() {
    let h = harness();
    assert!(matches!(
        h.service.offsets().get_node_offset("nyc"),
        Err(TimingError::OffsetNotFound(_))
    ));
    assert!(matches!(
        h.service.adjust_timestamp(h.clock.now(), "nyc"),
        Err(TimingError::OffsetNotFound(_))
    ));
}

#[tokio::test]
async fn test_adjust_timestamp_adds_offset() {
    let h = harness();
    let record = h
        .service
        .offsets()
        .node_offset("lon", &ids(&["nyc", "tok"]))
        .await
        .unwrap();

    let t = h.clock.now();
    let adjusted = h.service.adjust_timestamp(t, "lon").unwrap();
    assert_eq!(
        adjusted.signed_duration_since(t).to_std().unwrap(),
        record.offset
    );
}

#[tokio::test]
async fn test_global_offset() {
    let h = harness();
    assert_eq!(h.service.global_offset().await, Duration::ZERO);

    let outcome = h
        .service
        .offsets()
        .batch_offsets(&ids(&["nyc", "la", "lon", "tok"]), &ids(&["nyc", "la", "lon", "tok"]))
        .await;
    assert!(outcome.is_complete());

    let qualifying: Vec<_> = h
        .service
        .offsets()
        .known_offsets()
        .into_iter()
        .filter(|o| o.confidence > 0.5)
        .collect();
    let global = h.service.global_offset().await;
    if qualifying.is_empty() {
        assert_eq!(global, Duration::ZERO);
    } else {
        let min = qualifying.iter().map(|o| o.offset).min().unwrap();
        let max = qualifying.iter().map(|o| o.offset).max().unwrap();
        assert!(global >= min && global <= max);
    }
}

#[tokio::test(start_paused = true)]
async fn test_batch_offsets_cancelled_mid_flight() {
    let h = harness_with(MockDirectory::slow(world(), Duration::from_secs(1)));
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let outcome = h
        .service
        .offsets()
        .batch_offsets_with_cancel(&ids(&["nyc", "la", "lon"]), &ids(&["tok"]), &token)
        .await;
    assert!(outcome.cancelled);
    assert!(outcome.results.is_empty());
    assert!(matches!(
        outcome.error(),
        Some(TimingError::Cancelled { completed: 0, total: 3 })
    ));
    assert!(h.service.offsets().known_offsets().is_empty());
}

#[tokio::test]
async fn test_batch_offsets_best_effort() {
    let h = harness();
    let outcome = h
        .service
        .offsets()
        .batch_offsets(&ids(&["nyc", "ghost"]), &ids(&["la", "lon"]))
        .await;
    assert!(outcome.results.contains_key("nyc"));
    assert_eq!(outcome.failures.len(), 1);
    assert!(matches!(outcome.failures[0].1, TimingError::NodeNotFound(_)));
}

// === Synchronizer ===

#[tokio::test]
async fn test_sync_all_nodes_marks_synced() {
    let h = harness();
    let report = h.service.synchronizer().sync_all_nodes().await;
    assert_eq!(report.total, 4);
    assert_eq!(report.synced, 4);
    assert!(!report.cancelled);

    let status = h.service.sync_status("tok").unwrap();
    assert_eq!(status.state, SyncState::Synced);
    assert_eq!(status.sync_count, 1);
    assert_eq!(status.history.len(), 1);
    assert_eq!(status.average_offset, status.last_offset.unwrap());
    assert_eq!(h.stats.snapshot().syncs_ok, 4);
}

#[tokio::test]
async fn test_sync_failure_recorded() {
    let h = harness_with(MockDirectory::new(vec![node("solo", 10.0, 10.0)]));
    let report = h.service.synchronizer().sync_all_nodes().await;
    assert_eq!(report.failed, 1);

    let status = h.service.sync_status("solo").unwrap();
    assert_eq!(status.state, SyncState::Failed);
    assert!(status.last_error.unwrap().contains("No valid reference measurements"));
}

#[tokio::test]
async fn test_inactive_nodes_synced_against_active_set() {
    let mut nodes = world();
    nodes.push(node("syd", -33.8688, 151.2093).with_active(false));
    let h = harness_with(MockDirectory::new(nodes));

    h.service.synchronizer().sync_all_nodes().await;
    let syd = h.service.offsets().get_node_offset("syd").unwrap();
    assert_eq!(syd.measurement_count, 4);
    let nyc = h.service.offsets().get_node_offset("nyc").unwrap();
    assert_eq!(nyc.measurement_count, 3);
}

#[tokio::test]
async fn test_status_cleanup_after_retention() {
    let h = harness();
    let sync = h.service.synchronizer();
    sync.sync_all_nodes().await;
    assert_eq!(sync.sync_statuses().len(), 4);

    h.clock.advance(Duration::from_secs(23 * 3600));
    assert_eq!(sync.cleanup_statuses(), 0);

    h.clock.advance(Duration::from_secs(2 * 3600));
    assert_eq!(sync.cleanup_statuses(), 4);
    assert!(sync.sync_statuses().is_empty());
}

#[tokio::test]
async fn test_injected_clock_ages_every_store() {
    let h = harness();
    h.service.delay("nyc", "la").await.unwrap();
    h.service
        .consensus_timing(&ids(&["nyc", "la"]))
        .await
        .unwrap();
    h.service.synchronizer().sync_all_nodes().await;
    assert_eq!(h.service.offsets().known_offsets().len(), 4);

    // Only the service clock moves; tokio time stands still
    h.clock.advance(Duration::from_secs(25 * 3600));
    assert!(matches!(
        h.service.offsets().get_node_offset("nyc"),
        Err(TimingError::StaleOffset { .. })
    ));

    let report = h.service.synchronizer().run_maintenance();
    assert_eq!(
        report,
        MaintenanceReport {
            statuses_removed: 4,
            offsets_removed: 4,
            delays_purged: 6,
            timings_purged: 1,
        }
    );
}

#[test]
fn test_invalid_config_rejected_at_construction() {
    let mut config = LightTimingConfig::default();
    config.sync.interval = Duration::ZERO;

    let result = LightTimingService::new(LightTimingDependencies {
        directory: Arc::new(MockDirectory::new(world())),
        config,
        time_source: Arc::new(MockClock::new()),
        stats: Arc::new(AtomicTimingStats::new()),
    });
    assert!(matches!(result, Err(TimingError::Config(_))));
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_synchronizer_is_clamped() {
    let directory = Arc::new(MockDirectory::new(world()));
    let clock: Arc<dyn TimeSource> = Arc::new(MockClock::new());
    let stats: Arc<dyn TimingStats> = Arc::new(AtomicTimingStats::new());
    let config = LightTimingConfig::default();

    let engine = PropagationEngine::new(
        Arc::clone(&directory),
        config.propagation,
        Arc::clone(&clock),
        Arc::clone(&stats),
    );
    let timing = Arc::new(TimingCalculator::new(
        engine.clone(),
        Arc::clone(&directory),
        config.consensus,
        Arc::clone(&clock),
        Arc::clone(&stats),
    ));
    let estimator = OffsetEstimator::new(
        engine.clone(),
        Arc::clone(&directory),
        config.offsets,
        Arc::clone(&clock),
        Arc::clone(&stats),
    );
    let synchronizer = Arc::new(Synchronizer::new(SyncDependencies {
        directory,
        estimator,
        engine,
        timing,
        config: SyncConfig {
            interval: Duration::ZERO,
            ..config.sync
        },
        time_source: clock,
        stats,
    }));

    let shutdown = CancellationToken::new();
    let handle = Arc::clone(&synchronizer).start(shutdown.clone());
    tokio::time::sleep(Duration::from_millis(10)).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert!(synchronizer.sync_status("nyc").unwrap().sync_count >= 2);
}

#[tokio::test(start_paused = true)]
async fn test_background_loop_runs_and_stops() {
    let h = harness();
    let shutdown = CancellationToken::new();
    let handle = h.service.start_sync(shutdown.clone());

    // First tick fires immediately, the second after one interval
    tokio::time::sleep(Duration::from_secs(61)).await;
    let status = h.service.sync_status("nyc").unwrap();
    assert_eq!(status.sync_count, 2);

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_maintenance_purges_expired() {
    let h = harness();
    h.service.delay("nyc", "la").await.unwrap();
    h.service
        .consensus_timing(&ids(&["nyc", "la"]))
        .await
        .unwrap();
    h.service.offsets().node_offset("nyc", &ids(&["la"])).await.unwrap();

    h.clock.advance(Duration::from_secs(31 * 60));
    let report = h.service.synchronizer().run_maintenance();
    assert_eq!(report.delays_purged, 1);
    assert_eq!(report.timings_purged, 1);
    assert_eq!(report.offsets_removed, 1);
    assert_eq!(h.service.engine().cached_pairs(), 0);
}

#[tokio::test]
async fn test_clear_caches() {
    let h = harness();
    h.service.delay("nyc", "la").await.unwrap();
    h.service.node_offset("lon").await.unwrap();
    assert!(h.service.engine().cached_pairs() > 0);

    h.service.clear_caches().await;
    assert_eq!(h.service.engine().cached_pairs(), 0);
    assert!(h.service.offsets().known_offsets().is_empty());
    assert!(!h.service.delay("nyc", "la").await.unwrap().cached);
}
