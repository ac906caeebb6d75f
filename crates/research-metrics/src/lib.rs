pub mod timer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use timer::{measure, measure_with_timeout, ProcessingTimer, Timed, TimingSlot};

/// Process-wide request latency counters, independent of session lifetime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyCollector {
    pub requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub timed_out_requests: usize,
    pub total_latency_ms: u64,
    pub max_latency_ms: u64,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Success,
    Failure,
    TimedOut,
}

impl LatencyCollector {
    pub fn new() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn record_request(&mut self, duration: Duration, outcome: RequestOutcome) {
        let duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.requests += 1;
        self.total_latency_ms = self.total_latency_ms.saturating_add(duration_ms);
        self.max_latency_ms = self.max_latency_ms.max(duration_ms);

        match outcome {
            RequestOutcome::Success => self.successful_requests += 1,
            RequestOutcome::Failure => self.failed_requests += 1,
            RequestOutcome::TimedOut => {
                self.failed_requests += 1;
                self.timed_out_requests += 1;
            }
        }
    }

    pub fn get_average_latency(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.requests as f64
        }
    }

    pub fn get_success_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.successful_requests as f64 / self.requests as f64 * 100.0
        }
    }

    pub fn get_summary(&self) -> LatencySummary {
        LatencySummary {
            total_requests: self.requests,
            success_rate: self.get_success_rate(),
            average_latency_ms: self.get_average_latency(),
            max_latency_ms: self.max_latency_ms,
            timed_out_requests: self.timed_out_requests,
            uptime_seconds: self
                .started_at
                .map(|start| (Utc::now() - start).num_seconds().max(0) as u64)
                .unwrap_or(0),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencySummary {
    pub total_requests: usize,
    pub success_rate: f64,
    pub average_latency_ms: f64,
    pub max_latency_ms: u64,
    pub timed_out_requests: usize,
    pub uptime_seconds: u64,
}
