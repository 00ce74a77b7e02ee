use detect::ExtractionQuality;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Process-wide counters. Lock-free so handlers never contend.
pub struct Metrics {
    // Counters
    total_requests: AtomicUsize,
    successful_requests: AtomicUsize,
    rejected_requests: AtomicUsize,
    failed_requests: AtomicUsize,

    // Extraction quality of successful runs
    extracted_outcomes: AtomicUsize,
    fallback_outcomes: AtomicUsize,

    // Timing (in microseconds)
    total_run_time_us: AtomicU64,
}

/// Terminal state of one detector request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Completed(ExtractionQuality),
    Rejected,
    Failed,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            total_requests: AtomicUsize::new(0),
            successful_requests: AtomicUsize::new(0),
            rejected_requests: AtomicUsize::new(0),
            failed_requests: AtomicUsize::new(0),
            extracted_outcomes: AtomicUsize::new(0),
            fallback_outcomes: AtomicUsize::new(0),
            total_run_time_us: AtomicU64::new(0),
        })
    }

    pub fn record(&self, outcome: RequestOutcome, duration: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        match outcome {
            RequestOutcome::Completed(quality) => {
                self.successful_requests.fetch_add(1, Ordering::Relaxed);
                self.total_run_time_us
                    .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
                match quality {
                    ExtractionQuality::Extracted => &self.extracted_outcomes,
                    ExtractionQuality::Fallback => &self.fallback_outcomes,
                }
                .fetch_add(1, Ordering::Relaxed);
            }
            RequestOutcome::Rejected => {
                self.rejected_requests.fetch_add(1, Ordering::Relaxed);
            }
            RequestOutcome::Failed => {
                self.failed_requests.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let successful = self.successful_requests.load(Ordering::Relaxed);
        let fallback = self.fallback_outcomes.load(Ordering::Relaxed);
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: successful,
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            extracted_outcomes: self.extracted_outcomes.load(Ordering::Relaxed),
            fallback_outcomes: fallback,
            fallback_rate: ratio(fallback as f64, successful as f64),
            avg_run_time_ms: ratio(
                self.total_run_time_us.load(Ordering::Relaxed) as f64,
                successful as f64,
            ) / 1000.0,
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub rejected_requests: usize,
    pub failed_requests: usize,
    pub extracted_outcomes: usize,
    pub fallback_outcomes: usize,
    pub fallback_rate: f64,
    pub avg_run_time_ms: f64,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
