#[cfg(feature = "telemetry")]
mod telemetry_enabled_tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use pzip_core::telemetry;
    use pzip_core::telemetry::tags;
    use pzip_core::{
        DefaultWorkerTelemetry, PipelineConfig, RlePipeline, RunBufferPool, WorkerTelemetry,
    };
    use tempfile::tempdir;

    static TELEMETRY_TEST_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn pipeline_run_records_hotspot_metrics() -> Result<(), Box<dyn std::error::Error>> {
        let _guard = TELEMETRY_TEST_MUTEX
            .lock()
            .expect("telemetry test lock poisoned");
        telemetry::reset();

        let dir = tempdir()?;
        let first = dir.path().join("first.bin");
        let second = dir.path().join("second.bin");
        let empty = dir.path().join("empty.bin");
        std::fs::write(&first, vec![b'a'; 1000])?;
        std::fs::write(&second, b"abcabc")?;
        std::fs::write(&empty, b"")?;

        let mut config = PipelineConfig::new(2);
        config.page_size = 100;
        let pipeline = RlePipeline::new(config);
        let (writer, stats) =
            pipeline.encode_paths(&[&first, &empty, &second], pipeline.record_writer(Vec::new()))?;
        drop(writer);

        let snapshot = telemetry::snapshot();
        assert_eq!(snapshot.counter(tags::METRIC_SOURCE_OPEN_COUNT), Some(3));
        assert_eq!(snapshot.counter(tags::METRIC_CODEC_PAGE_COUNT), Some(stats.pages_total));
        assert_eq!(
            snapshot.counter(tags::METRIC_ORDERING_MERGE_COUNT),
            Some(stats.pages_total)
        );
        assert_eq!(snapshot.counter(tags::METRIC_ORDERING_BOUNDARY_MERGE_COUNT), Some(9));
        // The empty file may be passed over inside another advance.
        assert!(
            snapshot
                .counter(tags::METRIC_ORDERING_FILE_ADVANCE_COUNT)
                .is_some_and(|count| count >= 2)
        );
        assert_eq!(snapshot.counter(tags::METRIC_RECORD_SPLIT_COUNT), Some(1));
        assert_eq!(
            snapshot.counter(tags::METRIC_COLLECTOR_RUNS_WRITTEN),
            Some(stats.runs_total)
        );
        assert!(
            snapshot
                .histogram(tags::METRIC_CODEC_PAGE_LATENCY_US)
                .is_some_and(|histogram| histogram.count == stats.pages_total)
        );
        assert_eq!(snapshot.gauge(tags::METRIC_WORKER_ACTIVE_COUNT), Some(0));
        Ok(())
    }

    #[test]
    fn worker_hooks_update_registry() {
        let _guard = TELEMETRY_TEST_MUTEX
            .lock()
            .expect("telemetry test lock poisoned");
        telemetry::reset();

        let hooks = DefaultWorkerTelemetry;
        hooks.on_queue_depth(0, 7);
        hooks.on_task_started(0, "page");
        hooks.on_task_finished(0, "page", Duration::from_micros(40));
        hooks.on_task_started(1, "page");
        hooks.on_task_failed(1, "page", Duration::from_micros(10));
        hooks.on_turn_wait(1, Duration::from_micros(25));

        let snapshot = telemetry::snapshot();
        assert_eq!(snapshot.gauge(tags::METRIC_WORKER_QUEUE_DEPTH), Some(7));
        assert_eq!(snapshot.counter(tags::METRIC_WORKER_TASK_START_COUNT), Some(2));
        assert_eq!(snapshot.counter(tags::METRIC_WORKER_TASK_FINISH_COUNT), Some(1));
        assert_eq!(snapshot.counter(tags::METRIC_WORKER_TASK_FAIL_COUNT), Some(1));
        assert_eq!(snapshot.gauge(tags::METRIC_WORKER_ACTIVE_COUNT), Some(0));
        assert!(
            snapshot
                .histogram(tags::METRIC_ORDERING_TURN_WAIT_US)
                .is_some_and(|histogram| histogram.max == 25)
        );
    }

    #[test]
    fn buffer_pool_reports_recycling() -> Result<(), Box<dyn std::error::Error>> {
        let _guard = TELEMETRY_TEST_MUTEX
            .lock()
            .expect("telemetry test lock poisoned");
        telemetry::reset();

        let pool = RunBufferPool::new(16, 1);
        drop(pool.acquire()?);
        drop(pool.acquire()?);

        let snapshot = telemetry::snapshot();
        assert_eq!(snapshot.counter(tags::METRIC_BUFFER_ACQUIRE_CREATED_COUNT), Some(1));
        assert_eq!(snapshot.counter(tags::METRIC_BUFFER_ACQUIRE_RECYCLED_COUNT), Some(1));
        assert_eq!(snapshot.counter(tags::METRIC_BUFFER_RECYCLE_OK_COUNT), Some(2));
        Ok(())
    }
}

#[cfg(not(feature = "telemetry"))]
mod telemetry_disabled_tests {
    use pzip_core::telemetry;
    use pzip_core::telemetry::tags;

    #[test]
    fn registry_stays_empty() {
        telemetry::increment_counter(tags::METRIC_CODEC_PAGE_COUNT, 1, &[]);
        let snapshot = telemetry::snapshot();
        assert!(snapshot.counters.is_empty());
    }
}
