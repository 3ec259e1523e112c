use std::time::Duration;

use crate::telemetry;
#[cfg(feature = "profiling")]
use crate::telemetry::profile;
use crate::telemetry::tags;
use crate::types::duration_to_us;

#[cfg(feature = "profiling")]
const PROFILE_TAG_STACK_WORKER: [&str; 2] = [tags::TAG_SYSTEM, tags::TAG_WORKER];

/// Telemetry contract for pipeline workers.
///
/// Workers call these hooks around every page so metrics and profiling
/// events stay independent of a specific backend.
pub trait WorkerTelemetry: Send + Sync {
    fn on_queue_depth(&self, worker_id: usize, depth: usize);
    fn on_task_started(&self, worker_id: usize, task_kind: &str);
    fn on_task_finished(&self, worker_id: usize, task_kind: &str, elapsed: Duration);
    fn on_task_failed(&self, worker_id: usize, task_kind: &str, elapsed: Duration);
    /// Time spent blocked on the ordering coordinator before a merge.
    fn on_turn_wait(&self, worker_id: usize, waited: Duration);
}

/// Default implementation feeding the telemetry registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultWorkerTelemetry;

impl WorkerTelemetry for DefaultWorkerTelemetry {
    fn on_queue_depth(&self, _worker_id: usize, depth: usize) {
        let labels = [("subsystem", "worker"), ("op", "queue_depth")];
        telemetry::increment_counter(tags::METRIC_WORKER_QUEUE_DEPTH_SAMPLES, 1, &labels);
        telemetry::set_gauge(tags::METRIC_WORKER_QUEUE_DEPTH, depth as u64, &labels);
        telemetry::record_histogram(tags::METRIC_WORKER_QUEUE_DEPTH_HIST, depth as u64, &labels);
    }

    fn on_task_started(&self, _worker_id: usize, _task_kind: &str) {
        let labels = [("subsystem", "worker"), ("op", "task_start")];
        telemetry::increment_counter(tags::METRIC_WORKER_TASK_START_COUNT, 1, &labels);
        telemetry::add_gauge(tags::METRIC_WORKER_ACTIVE_COUNT, 1, &labels);
    }

    fn on_task_finished(&self, _worker_id: usize, _task_kind: &str, elapsed: Duration) {
        let elapsed_us = duration_to_us(elapsed);
        let labels = [("subsystem", "worker"), ("op", "task"), ("result", "ok")];

        telemetry::increment_counter(tags::METRIC_WORKER_TASK_FINISH_COUNT, 1, &labels);
        telemetry::increment_counter(tags::METRIC_WORKER_TASK_COUNT, 1, &labels);
        telemetry::record_histogram(tags::METRIC_WORKER_TASK_LATENCY_US, elapsed_us, &labels);
        telemetry::sub_gauge_saturating(tags::METRIC_WORKER_ACTIVE_COUNT, 1, &labels);

        #[cfg(feature = "profiling")]
        if profile::is_tag_stack_enabled(&PROFILE_TAG_STACK_WORKER) {
            tracing::debug!(
                target: tags::PROFILE_WORKER,
                op = "task_finish",
                result = "ok",
                task_kind = _task_kind,
                worker_id = _worker_id,
                elapsed_us,
                "worker task finished"
            );
        }
    }

    fn on_task_failed(&self, _worker_id: usize, _task_kind: &str, elapsed: Duration) {
        let elapsed_us = duration_to_us(elapsed);
        let labels = [("subsystem", "worker"), ("op", "task"), ("result", "error")];

        telemetry::increment_counter(tags::METRIC_WORKER_TASK_FAIL_COUNT, 1, &labels);
        telemetry::increment_counter(tags::METRIC_WORKER_TASK_COUNT, 1, &labels);
        telemetry::record_histogram(tags::METRIC_WORKER_TASK_LATENCY_US, elapsed_us, &labels);
        telemetry::sub_gauge_saturating(tags::METRIC_WORKER_ACTIVE_COUNT, 1, &labels);

        #[cfg(feature = "profiling")]
        profile::event(
            tags::PROFILE_WORKER,
            &PROFILE_TAG_STACK_WORKER,
            "task_finish",
            "error",
            elapsed_us,
            "worker task failed",
        );
    }

    fn on_turn_wait(&self, _worker_id: usize, waited: Duration) {
        telemetry::record_duration_us(
            tags::METRIC_ORDERING_TURN_WAIT_US,
            waited,
            &[("subsystem", "ordering"), ("op", "turn_wait")],
        );
    }
}
