//! Integration tests for the memory tier
//!
//! Cache expiry, importance-driven persistence, LZ4 + checksum encoding and
//! the SQLite backend surviving a manager restart.

#[cfg(test)]
mod memory_tiering_tests {
    use flowcast::analysis::{AnomalyResult, Severity};
    use flowcast::clock::ManualClock;
    use flowcast::errors::{PipelineError, StorageError};
    use flowcast::forecast::RiskMetrics;
    use flowcast::memory::{
        MemoryConfig, MemoryTieringManager, Payload, SqliteStore, StorageBackend, StorageEntry,
        Tier,
    };
    use flowcast::pipeline::{EventSink, MetricsCollector, PipelineEvent};
    use std::sync::Arc;
    use tempfile::NamedTempFile;
    use tokio::sync::mpsc;

    struct Harness {
        manager: MemoryTieringManager,
        clock: ManualClock,
        metrics: Arc<MetricsCollector>,
        rx: mpsc::Receiver<PipelineEvent>,
    }

    fn make_test_manager(config: MemoryConfig, store: Option<Box<dyn StorageBackend>>) -> Harness {
        let clock = ManualClock::new(1_700_000_000_000);
        let metrics = Arc::new(MetricsCollector::new());
        let (events, rx) = EventSink::channel(256, metrics.clone());
        let mut manager =
            MemoryTieringManager::new(config, clock.as_clock(), events, metrics.clone());
        if let Some(store) = store {
            manager = manager.with_storage(store);
        }
        Harness {
            manager,
            clock,
            metrics,
            rx,
        }
    }

    fn high_anomalies(n: usize) -> Payload {
        Payload::Anomalies(
            (0..n)
                .map(|i| AnomalyResult {
                    index: i,
                    value: 100.0 + i as f64,
                    score: 1_000.0,
                    severity: Severity::High,
                })
                .collect(),
        )
    }

    fn drain(rx: &mut mpsc::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        events
    }

    #[test]
    fn test_cached_only_entry_misses_after_ttl() {
        let config = MemoryConfig {
            cache_ttl_ms: 100,
            ..MemoryConfig::default()
        };
        let mut h = make_test_manager(config, None);

        let outcome = h.manager.store("s/raw", Payload::Raw(vec![1, 2, 3])).unwrap();
        assert!(!outcome.persisted);
        assert_eq!(h.manager.tier_of("s/raw"), Tier::CachedOnly);

        h.clock.advance(99);
        assert_eq!(
            h.manager.retrieve("s/raw").unwrap(),
            Some(Payload::Raw(vec![1, 2, 3]))
        );

        h.clock.advance(101);
        assert_eq!(h.manager.retrieve("s/raw").unwrap(), None);
        assert_eq!(h.manager.tier_of("s/raw"), Tier::Absent);

        let events = drain(&mut h.rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::CacheHit { key } if key == "s/raw")));
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::Miss { key } if key == "s/raw")));

        let snapshot = h.metrics.snapshot();
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.cache_expirations, 1);
    }

    #[test]
    fn test_important_entry_outlives_cache_ttl() {
        let config = MemoryConfig {
            cache_ttl_ms: 100,
            ..MemoryConfig::default()
        };
        let mut h = make_test_manager(config, None);
        let payload = high_anomalies(1);

        let outcome = h.manager.store("s/anomalies", payload.clone()).unwrap();
        assert!(outcome.persisted);
        assert!(outcome.importance > 0.6);
        assert_eq!(h.manager.tier_of("s/anomalies"), Tier::CachedAndPersisted);

        h.clock.advance(500);
        assert_eq!(h.manager.tier_of("s/anomalies"), Tier::PersistedOnly);
        assert_eq!(h.manager.retrieve("s/anomalies").unwrap(), Some(payload));
        // Storage hits are re-cached
        assert_eq!(h.manager.tier_of("s/anomalies"), Tier::CachedAndPersisted);

        let events = drain(&mut h.rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::DataPersisted { compressed: false, .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::StorageHit { key } if key == "s/anomalies")));

        let stats = h.manager.cache_stats();
        assert_eq!(stats.storage_hits, 1);
        assert_eq!(stats.persisted_entries, 1);
    }

    #[test]
    fn test_large_payload_is_compressed_and_round_trips() {
        let config = MemoryConfig {
            compression_threshold: 256,
            ..MemoryConfig::default()
        };
        let h = make_test_manager(config, None);
        let payload = high_anomalies(50);

        let outcome = h.manager.store("s/anomalies", payload.clone()).unwrap();
        assert!(outcome.persisted);
        assert!(outcome.compressed);

        h.clock.advance(120_000);
        assert_eq!(h.manager.retrieve("s/anomalies").unwrap(), Some(payload));
    }

    #[test]
    fn test_lru_eviction_keeps_recent_keys() {
        let config = MemoryConfig {
            cache_max_size: 2,
            ..MemoryConfig::default()
        };
        let h = make_test_manager(config, None);

        h.manager.store("a", Payload::Raw(vec![1])).unwrap();
        h.manager.store("b", Payload::Raw(vec![2])).unwrap();
        assert!(h.manager.retrieve("a").unwrap().is_some());
        let outcome = h.manager.store("c", Payload::Raw(vec![3])).unwrap();

        assert_eq!(outcome.cache_evicted, vec!["b".to_string()]);
        assert_eq!(h.manager.tier_of("b"), Tier::Absent);
        assert_eq!(h.manager.tier_of("a"), Tier::CachedOnly);
        assert_eq!(h.metrics.snapshot().cache_evictions, 1);
    }

    #[test]
    fn test_cleanup_purges_expired_entries() {
        let config = MemoryConfig {
            cache_ttl_ms: 1_000,
            ..MemoryConfig::default()
        };
        let mut h = make_test_manager(config, None);
        h.manager.store("old", Payload::Raw(vec![1])).unwrap();
        h.clock.advance(600);
        h.manager.store("fresh", Payload::Raw(vec![2])).unwrap();
        h.clock.advance(600);

        let report = h.manager.cleanup();
        assert_eq!(report.before, 2);
        assert_eq!(report.after, 1);
        assert_eq!(report.expired, 1);
        assert!(drain(&mut h.rx)
            .iter()
            .any(|e| matches!(e, PipelineEvent::CacheCleanup { before: 2, after: 1 })));
    }

    #[test]
    fn test_sqlite_tier_survives_manager_restart() {
        let file = NamedTempFile::new().unwrap();
        let risk = Payload::Risk(RiskMetrics {
            volatility: 1.5,
            var: 0.05,
            cvar: 0.08,
            sharpe_ratio: 1.2,
            max_drawdown: 0.3,
        });

        {
            let store = SqliteStore::open(file.path(), 100).unwrap();
            let h = make_test_manager(MemoryConfig::default(), Some(Box::new(store)));
            let outcome = h.manager.store("cpu/risk", risk.clone()).unwrap();
            assert!(outcome.persisted);
        }

        let store = SqliteStore::open(file.path(), 100).unwrap();
        let h = make_test_manager(MemoryConfig::default(), Some(Box::new(store)));
        assert_eq!(h.manager.tier_of("cpu/risk"), Tier::PersistedOnly);
        assert_eq!(h.manager.retrieve("cpu/risk").unwrap(), Some(risk));
        assert_eq!(h.metrics.snapshot().storage_hits, 1);
    }

    #[test]
    fn test_tampered_entry_fails_checksum() {
        let file = NamedTempFile::new().unwrap();
        let store = SqliteStore::open(file.path(), 100).unwrap();
        let h = make_test_manager(MemoryConfig::default(), Some(Box::new(store)));

        let mut tamper = SqliteStore::open(file.path(), 100).unwrap();
        tamper
            .put(StorageEntry {
                key: "cpu/trend".to_string(),
                bytes: br#"{"kind":"raw","data":[1]}"#.to_vec(),
                compressed: false,
                checksum: "0".repeat(64),
                importance: 0.9,
                original_size: 25,
                stored_at: 0,
            })
            .unwrap();

        let err = h.manager.retrieve("cpu/trend").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Storage(StorageError::ChecksumMismatch { .. })
        ));
        assert!(!err.is_retryable());
        assert_eq!(h.metrics.snapshot().storage_errors, 1);
    }
}
