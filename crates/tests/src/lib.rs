//! # Integration Tests
//!
//! End-to-end tests across crates.
//!
//! Covers:
//! - blueprint loading into a runnable rig
//! - simulated IMUs -> acquisition -> merger -> dispatcher
//! - the firmware bench scenarios (8/7 batches, fault injection)

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{BackpressurePolicy, Source, HALF_LEN, MAX_BATCH_RECORDS, PING_PONG_SLOTS};
    use ingestion::BackpressureConfig;

    #[test]
    fn test_window_constants() {
        assert_eq!(PING_PONG_SLOTS, 2 * HALF_LEN);
        assert_eq!(MAX_BATCH_RECORDS, 32);
    }

    #[test]
    fn test_blueprint_to_ingestion_config() {
        let content = r#"
[queue]
capacity = 40
backlog_threshold = 10
sustain = 3
policy = "warn"

[[sensors]]
source = "left"
odr_hz = 1920.0

[[sensors]]
source = "right"
odr_hz = 1920.0
drift_ppm = 250.0
"#;
        let blueprint = ConfigLoader::load_from_str(content, ConfigFormat::Toml).unwrap();
        let queue = BackpressureConfig::from(&blueprint.queue);

        assert_eq!(queue.channel_capacity, 40);
        assert_eq!(queue.backlog_threshold, 10);
        assert_eq!(queue.sustain, 3);
        assert_eq!(queue.policy, BackpressurePolicy::Warn);
        assert!(blueprint.sensor(Source::Right).unwrap().nominal_period_us() > 520.0);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use contracts::{
        AcquisitionConfig, BackpressurePolicy, ContractError, ImuConfig, MergePhase, MergedHalf,
        MergerConfig, Sample, SensorTag, SinkConfig, SinkType, Source, HALF_LEN,
    };
    use dispatcher::{create_dispatcher, read_halves, ChannelSink, FileFormat};
    use ingestion::{
        batch_queue, decode_fifo, encode_fifo, Acquisition, BackpressureConfig, FifoRecord,
        IngestionError, IngestionMetrics, SimulatedImu,
    };
    use observability::MergeMetricsAggregator;
    use sync_engine::Merger;

    fn imu(source: Source, odr_hz: f64, drift_ppm: f64) -> ImuConfig {
        ImuConfig {
            source,
            odr_hz,
            drift_ppm,
            gyro_enabled: false,
            amplitude: 2000,
            signal_hz: 5.0,
            noise: 0,
            seed: 1,
            fifo_capacity: 512,
        }
    }

    fn acquisition(left: ImuConfig, right: ImuConfig) -> Acquisition {
        Acquisition::new(
            Box::new(SimulatedImu::new(left, 0)),
            Box::new(SimulatedImu::new(right, 0)),
            AcquisitionConfig::default(),
            Arc::new(IngestionMetrics::new()),
        )
        .unwrap()
    }

    /// Drive acquisition on a synthetic clock, 2 ms per tick.
    fn run_rig(
        mut acquisition: Acquisition,
        ticks: u64,
    ) -> (Merger<Vec<MergedHalf>>, MergeMetricsAggregator) {
        let mut merger = Merger::new(MergerConfig::default(), Vec::new());
        let mut aggregator = MergeMetricsAggregator::new();

        acquisition.drain(50_000).unwrap();
        for tick in 1..=ticks {
            let now_us = 50_000 + tick * 2_000;
            let batch = acquisition.tick(now_us).unwrap();
            let report = merger.handle(&batch).unwrap();
            aggregator.update(&report, 0);
        }
        (merger, aggregator)
    }

    /// Mean and max |left - right| on one axis over the later halves.
    fn side_spread(halves: &[MergedHalf], axis: usize) -> (f64, i32) {
        let later = &halves[halves.len() / 2..];
        let mut total = 0i64;
        let mut max = 0i32;
        let mut count = 0i64;
        for half in later {
            for record in &half.records {
                let diff =
                    (record.side(Source::Left)[axis] as i32 - record.side(Source::Right)[axis] as i32)
                        .abs();
                total += diff as i64;
                max = max.max(diff);
                count += 1;
            }
        }
        (total as f64 / count as f64, max)
    }

    fn assert_contiguous(halves: &[MergedHalf]) {
        for pair in halves.windows(2) {
            assert_eq!(pair[1].sequence, pair[0].sequence + 1);
            assert_eq!(pair[1].first_index, pair[0].first_index + HALF_LEN as i64);
        }
    }

    /// Simulated IMUs at different rates: the faster one becomes the reference
    /// and both sides of every merged record observe the same motion.
    #[test]
    fn test_e2e_simulated_rig_aligns_sides() {
        let acquisition = acquisition(
            imu(Source::Left, 1920.0, 0.0),
            imu(Source::Right, 1680.0, 0.0),
        );
        let (merger, aggregator) = run_rig(acquisition, 2_000);

        assert_eq!(merger.phase(), MergePhase::Merging(Source::Left));
        let halves = merger.sink();
        assert!(halves.len() > 300, "only {} halves", halves.len());
        assert_contiguous(halves);

        // 5 Hz, 2000 counts: one sample of misalignment is ~33 counts
        let (mean, max) = side_spread(halves, 0);
        assert!(mean < 60.0, "mean spread {mean}");
        assert!(max < 250, "max spread {max}");

        // Gravity axis agrees as well
        let (mean_z, _) = side_spread(halves, 2);
        assert!(mean_z < 30.0, "mean z spread {mean_z}");

        let summary = aggregator.summary();
        assert_eq!(summary.total_batches, 2_000);
        assert_eq!(summary.left_batch_size.count, 1_000);
        assert!(summary.left_batch_size.mean > summary.right_batch_size.mean);
        assert_eq!(merger.stats().window.late_drops, 0);
    }

    /// Same nominal rate with opposite clock drift and interleaved gyro records.
    #[test]
    fn test_e2e_drifting_clocks_with_gyro() {
        let mut left = imu(Source::Left, 1920.0, -300.0);
        let mut right = imu(Source::Right, 1920.0, 300.0);
        left.gyro_enabled = true;
        right.gyro_enabled = true;

        let (merger, _) = run_rig(acquisition(left, right), 3_000);

        assert!(merger.phase().is_merging());
        assert!(merger.stats().filtered_records > 0);
        let halves = merger.sink();
        assert!(halves.len() > 400, "only {} halves", halves.len());
        assert_contiguous(halves);

        let (mean, _) = side_spread(halves, 0);
        assert!(mean < 60.0, "mean spread {mean}");
    }

    /// Original bench scenario: Left 8 records, Right 7 records, alternating
    /// every 2 ms, delivered through the FIFO wire format.
    #[test]
    fn test_e2e_eight_seven_through_fifo_format() {
        let mut merger = Merger::new(MergerConfig::default(), Vec::new());
        let mut emitted = [0u64; 2];
        let periods = [500.0, 4_000.0 / 7.0];
        let offsets = [-2_000.0, 0.0];
        let mut reports = Vec::new();

        for i in 0..240u64 {
            let source = if i % 2 == 0 { Source::Left } else { Source::Right };
            let side = source.index();
            let count = if source == Source::Left { 8 } else { 7 };
            let records: Vec<FifoRecord> = (0..count)
                .map(|_| {
                    emitted[side] += 1;
                    let t = emitted[side] as f64 * periods[side] + offsets[side];
                    let value = (t / 100.0).round() as i16;
                    FifoRecord::encode(&Sample::accel([value, 0, -value]))
                })
                .collect();

            let bytes = encode_fifo(&records);
            let batch = decode_fifo(source, 2_000 * (i + 1), &bytes).unwrap();
            reports.push(merger.handle(&batch).unwrap());
        }

        assert_eq!(merger.reference(), Some(Source::Left));
        let projected: Vec<(i64, usize)> = reports
            .iter()
            .filter(|r| r.source == Source::Right && r.phase.is_merging())
            .filter_map(|r| r.write_index.map(|index| (index, r.written)))
            .collect();
        for pair in projected.windows(2) {
            assert!(pair[1].0 > pair[0].0, "projected indices must increase");
        }

        let halves = merger.sink();
        assert!(!halves.is_empty());
        assert_contiguous(halves);
        for half in halves {
            for record in &half.records {
                let left = record.side(Source::Left)[0];
                let right = record.side(Source::Right)[0];
                assert!((left - right).abs() <= 1, "left {left} right {right}");
            }
        }
    }

    /// Real-time run: acquisition task -> queue -> merger -> dispatcher -> file sink.
    #[tokio::test]
    async fn test_e2e_realtime_pipeline_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merged.jsonl");

        let (channel_sink, half_rx) = ChannelSink::channel("dispatcher", 256);
        let mut params = HashMap::new();
        params.insert("path".to_string(), path.display().to_string());
        params.insert("format".to_string(), "jsonl".to_string());
        let sinks = vec![
            SinkConfig {
                name: "file".to_string(),
                sink_type: SinkType::File,
                queue_capacity: 256,
                params,
            },
            SinkConfig {
                name: "log".to_string(),
                sink_type: SinkType::Log,
                queue_capacity: 256,
                params: HashMap::from([("every".to_string(), "50".to_string())]),
            },
        ];
        let dispatcher_handle = create_dispatcher(sinks, half_rx).unwrap().spawn();

        let metrics = Arc::new(IngestionMetrics::new());
        let queue = BackpressureConfig {
            channel_capacity: 40,
            backlog_threshold: 10,
            sustain: 1,
            policy: BackpressurePolicy::Warn,
        };
        let (sender, batch_rx) = batch_queue(queue, Arc::clone(&metrics));
        let running = Arc::new(AtomicBool::new(true));
        let acquisition_handle = acquisition(
            imu(Source::Left, 1920.0, 0.0),
            imu(Source::Right, 1920.0, 400.0),
        )
        .spawn(sender, Arc::clone(&running), tokio::time::Instant::now());

        let consumer = tokio::spawn(async move {
            let mut merger = Merger::new(MergerConfig::default(), channel_sink);
            let deadline = tokio::time::Instant::now() + Duration::from_millis(600);
            loop {
                tokio::select! {
                    received = batch_rx.recv() => match received {
                        Ok(batch) => match merger.handle(&batch) {
                            Ok(_) | Err(ContractError::SinkWrite { .. }) => {}
                            Err(e) => panic!("merger failed: {e}"),
                        },
                        Err(_) => break,
                    },
                    _ = tokio::time::sleep_until(deadline) => break,
                }
            }
            (merger.phase(), merger.into_sink().sent())
        });

        let (phase, sent) = tokio::time::timeout(Duration::from_secs(5), consumer)
            .await
            .expect("consumer timed out")
            .unwrap();
        running.store(false, Ordering::Relaxed);

        let acquisition_stats = tokio::time::timeout(Duration::from_secs(2), acquisition_handle)
            .await
            .expect("acquisition did not stop")
            .unwrap()
            .unwrap();
        let dispatch = tokio::time::timeout(Duration::from_secs(2), dispatcher_handle)
            .await
            .expect("dispatcher did not stop")
            .unwrap();

        assert!(phase.is_merging(), "phase {phase:?}");
        assert!(acquisition_stats.ticks > 40);
        assert!(sent >= 5, "only {sent} halves sent");

        assert_eq!(dispatch.halves_received, sent);
        assert_eq!(dispatch.input_gaps, 0);
        assert_eq!(dispatch.index_breaks, 0);
        let file_metrics = dispatch.sink("file").unwrap();
        assert_eq!(file_metrics.write_count, sent);
        assert_eq!(file_metrics.sequence_gaps, 0);

        let halves = read_halves(&path, FileFormat::Jsonl).unwrap();
        assert_eq!(halves.len() as u64, sent);
        for pair in halves.windows(2) {
            assert_eq!(pair[1].sequence, pair[0].sequence + 1);
        }
        // The last tick may hit the closed queue
        assert!(metrics.snapshot().batches_sent + 1 >= acquisition_stats.ticks);
    }

    /// Fault injection: oversized batch and duplicate source halt the merger.
    #[test]
    fn test_fault_injection_integrity() {
        let mut merger = Merger::new(MergerConfig::default(), Vec::new());

        let bytes = encode_fifo(&[FifoRecord::encode(&Sample::accel([1, 2, 3]))]);
        let left = decode_fifo(Source::Left, 2_000, &bytes).unwrap();
        merger.handle(&left).unwrap();

        let mut oversized = decode_fifo(Source::Right, 4_000, &bytes).unwrap();
        oversized.sample_count = 33;
        let err = merger.handle(&oversized).unwrap_err();
        assert!(matches!(err, ContractError::OversizedBatch { .. }));
        assert!(err.is_integrity_violation());

        let right = decode_fifo(Source::Right, 6_000, &bytes).unwrap();
        assert!(matches!(
            merger.handle(&right),
            Err(ContractError::MergerHalted)
        ));

        let mut merger = Merger::new(MergerConfig::default(), Vec::new());
        merger.handle(&left).unwrap();
        let err = merger.handle(&left).unwrap_err();
        assert!(matches!(
            err,
            ContractError::DuplicateSource {
                source_id: Source::Left
            }
        ));
        assert_eq!(merger.phase(), MergePhase::Halted);
    }

    /// Fault injection: more than 32 records in one FIFO read.
    #[test]
    fn test_fault_injection_oversized_fifo_read() {
        let records = vec![FifoRecord::encode(&Sample::accel([0, 0, 1])); 33];
        let result = decode_fifo(Source::Left, 2_000, &encode_fifo(&records));
        assert!(result.is_err());
    }

    /// Fault injection: a stalled consumer trips the backpressure fault.
    #[tokio::test]
    async fn test_fault_injection_backpressure() {
        let metrics = Arc::new(IngestionMetrics::new());
        let queue = BackpressureConfig {
            channel_capacity: 40,
            backlog_threshold: 10,
            sustain: 1,
            policy: BackpressurePolicy::Abort,
        };
        let (mut sender, rx) = batch_queue(queue, Arc::clone(&metrics));
        let mut acquisition = acquisition(
            imu(Source::Left, 1920.0, 0.0),
            imu(Source::Right, 1920.0, 0.0),
        );

        let mut fault = None;
        for tick in 1..=20u64 {
            let batch = acquisition.tick(tick * 2_000).unwrap();
            if let Err(e) = sender.send(batch).await {
                fault = Some((tick, e));
                break;
            }
        }

        let (tick, err) = fault.expect("backlog never detected");
        assert_eq!(tick, 11);
        assert!(matches!(err, IngestionError::Backpressure { depth: 11, .. }));
        assert!(err.is_backpressure());
        assert_eq!(metrics.snapshot().backlog_events, 1);
        assert_eq!(rx.len(), 11);

        let contract: ContractError = err.into();
        assert!(contract.is_backpressure());
    }

    #[test]
    fn test_filtered_tags_never_reach_output() {
        let mut left = imu(Source::Left, 1920.0, 0.0);
        left.gyro_enabled = true;
        let mut imu = SimulatedImu::new(left, 0);

        use contracts::BatchSource;
        let batch = imu.read_batch(4_000, 32).unwrap();
        assert_eq!(batch.count_tag(SensorTag::Accelerometer), 7);
        assert_eq!(batch.count_tag(SensorTag::Gyroscope), 7);
        assert_eq!(batch.filter_tag(SensorTag::Accelerometer).len(), 7);
    }
}
