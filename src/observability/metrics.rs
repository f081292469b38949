//! Thread-safe metrics collection system
//!
//! Atomic counters and mutex-protected collections tracking task handling
//! and LLM call statistics. Counters are write-only from the request path;
//! nothing in request handling reads them back.

use crate::protocol::messages::{ErrorCode, TaskType};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Keep at most this many processing-time samples
const MAX_TIMING_SAMPLES: usize = 1000;

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Marks one task as in flight for as long as it lives
#[must_use = "the task leaves the in-flight count when the guard is dropped"]
pub struct InFlightGuard<'a> {
    collector: &'a MetricsCollector,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.collector.leave_in_flight();
    }
}

/// Thread-safe metrics collector using atomics and mutexes
pub struct MetricsCollector {
    tasks_received: AtomicU64,
    tasks_in_flight: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,

    llm_attempts: AtomicU64,
    llm_retries: AtomicU64,

    // Processing times in milliseconds
    processing_times: Mutex<Vec<u64>>,
    completed_by_task: Mutex<BTreeMap<String, u64>>,
    failed_by_code: Mutex<BTreeMap<String, u64>>,

    uptime_start: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            tasks_received: AtomicU64::new(0),
            tasks_in_flight: AtomicU64::new(0),
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            llm_attempts: AtomicU64::new(0),
            llm_retries: AtomicU64::new(0),
            processing_times: Mutex::new(Vec::new()),
            completed_by_task: Mutex::new(BTreeMap::new()),
            failed_by_code: Mutex::new(BTreeMap::new()),
            uptime_start: AtomicU64::new(current_timestamp()),
        }
    }

    /// Count a received task. It stays in flight until the guard is dropped,
    /// including when the request future is cancelled.
    pub fn task_received(&self) -> InFlightGuard<'_> {
        self.tasks_received.fetch_add(1, Ordering::Relaxed);
        self.tasks_in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard { collector: self }
    }

    pub fn task_completed(&self, task_type: TaskType, duration: Duration) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut by_task) = self.completed_by_task.lock() {
            *by_task.entry(task_type.as_str().to_string()).or_insert(0) += 1;
        }
        self.record_processing_time(duration);
    }

    pub fn task_failed(&self, code: ErrorCode, duration: Duration) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut by_code) = self.failed_by_code.lock() {
            *by_code.entry(code.as_str().to_string()).or_insert(0) += 1;
        }
        self.record_processing_time(duration);
    }

    pub fn record_llm_attempt(&self, is_retry: bool) {
        self.llm_attempts.fetch_add(1, Ordering::Relaxed);
        if is_retry {
            self.llm_retries.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn leave_in_flight(&self) {
        // Saturating: a reset between receive and finish must not wrap
        let _ = self
            .tasks_in_flight
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }

    fn record_processing_time(&self, duration: Duration) {
        if let Ok(mut times) = self.processing_times.lock() {
            times.push(duration.as_millis() as u64);
            if times.len() > MAX_TIMING_SAMPLES {
                times.remove(0);
            }
        }
    }

    /// Reset all metrics (useful for testing)
    pub fn reset(&self) {
        self.tasks_received.store(0, Ordering::Relaxed);
        self.tasks_in_flight.store(0, Ordering::Relaxed);
        self.tasks_completed.store(0, Ordering::Relaxed);
        self.tasks_failed.store(0, Ordering::Relaxed);
        self.llm_attempts.store(0, Ordering::Relaxed);
        self.llm_retries.store(0, Ordering::Relaxed);
        self.uptime_start
            .store(current_timestamp(), Ordering::Relaxed);
        if let Ok(mut times) = self.processing_times.lock() {
            times.clear();
        }
        if let Ok(mut by_task) = self.completed_by_task.lock() {
            by_task.clear();
        }
        if let Ok(mut by_code) = self.failed_by_code.lock() {
            by_code.clear();
        }
    }

    /// Calculate processing time statistics (pure function)
    fn calculate_processing_time_statistics(&self) -> (f64, f64, f64, f64) {
        let Ok(times) = self.processing_times.lock() else {
            return (0.0, 0.0, 0.0, 0.0);
        };
        if times.is_empty() {
            return (0.0, 0.0, 0.0, 0.0);
        }

        let mut sorted_times = times.clone();
        sorted_times.sort_unstable();

        let avg = sorted_times.iter().sum::<u64>() as f64 / sorted_times.len() as f64;
        (
            avg,
            percentile(&sorted_times, 50.0),
            percentile(&sorted_times, 95.0),
            percentile(&sorted_times, 99.0),
        )
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let (avg_processing_time_ms, p50, p95, p99) = self.calculate_processing_time_statistics();

        MetricsSnapshot {
            tasks: TaskMetrics {
                tasks_received: self.tasks_received.load(Ordering::Relaxed),
                tasks_in_flight: self.tasks_in_flight.load(Ordering::Relaxed),
                tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
                tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
                completed_by_task: self
                    .completed_by_task
                    .lock()
                    .map(|m| m.clone())
                    .unwrap_or_default(),
                failed_by_code: self
                    .failed_by_code
                    .lock()
                    .map(|m| m.clone())
                    .unwrap_or_default(),
                avg_processing_time_ms,
                processing_time_p50_ms: p50,
                processing_time_p95_ms: p95,
                processing_time_p99_ms: p99,
            },
            llm: LlmMetrics {
                attempts: self.llm_attempts.load(Ordering::Relaxed),
                retries: self.llm_retries.load(Ordering::Relaxed),
            },
            uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub tasks: TaskMetrics,
    pub llm: LlmMetrics,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct TaskMetrics {
    pub tasks_received: u64,
    pub tasks_in_flight: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub completed_by_task: BTreeMap<String, u64>,
    pub failed_by_code: BTreeMap<String, u64>,
    pub avg_processing_time_ms: f64,
    pub processing_time_p50_ms: f64,
    pub processing_time_p95_ms: f64,
    pub processing_time_p99_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct LlmMetrics {
    pub attempts: u64,
    pub retries: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let len = sorted_data.len();
    let index = (percentile / 100.0) * (len - 1) as f64;

    if index.fract() == 0.0 {
        sorted_data[index as usize] as f64
    } else {
        let lower_value = sorted_data[index.floor() as usize] as f64;
        let upper_value = sorted_data[index.ceil() as usize] as f64;
        lower_value + (upper_value - lower_value) * index.fract()
    }
}
