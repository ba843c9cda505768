//! Traffic accounting for the proxy.
//!
//! Totals, per-method and per-domain counts, plus a rolling 60-second sample
//! window used to estimate current throughput. Every mutation goes through one
//! mutex so a snapshot never observes a half-applied request.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::observability::metrics;

/// Length of the rolling sample window.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Upper bound on retained samples; the oldest are dropped first.
const MAX_SAMPLES: usize = 10_000;

/// Floor on the elapsed time used for rate estimates, in seconds.
const MIN_RATE_ELAPSED_SECS: f64 = 1.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DomainStats {
    pub requests: u64,
    pub up_bytes: u64,
    pub down_bytes: u64,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    up: u64,
    down: u64,
}

#[derive(Debug, Default)]
struct TrafficState {
    total_up_bytes: u64,
    total_down_bytes: u64,
    total_requests: u64,
    method_counts: HashMap<String, u64>,
    domain_stats: HashMap<String, DomainStats>,
    samples: VecDeque<Sample>,
}

impl TrafficState {
    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.samples.front() {
            if now.saturating_duration_since(front.at) > RATE_WINDOW {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    fn push_sample(&mut self, sample: Sample) {
        self.prune(sample.at);
        if self.samples.len() >= MAX_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }
}

/// Point-in-time view of the traffic counters.
#[derive(Debug, Clone, Serialize)]
pub struct TrafficSnapshot {
    pub total_up_bytes: u64,
    pub total_down_bytes: u64,
    pub total_bytes: u64,
    pub total_requests: u64,
    pub method_counts: BTreeMap<String, u64>,
    pub domain_stats: BTreeMap<String, DomainStats>,
    /// Upload bytes per second over the rolling window.
    pub up_rate_bps: f64,
    /// Download bytes per second over the rolling window.
    pub down_rate_bps: f64,
    pub uptime_seconds: u64,
    pub window_seconds: u64,
}

/// Shared traffic counters.
pub struct TrafficRecorder {
    started: Instant,
    state: Mutex<TrafficState>,
}

impl TrafficRecorder {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            state: Mutex::new(TrafficState::default()),
        }
    }

    /// Count bytes received from a client and sent upstream.
    pub fn record_upload(&self, n: u64) {
        self.record_upload_at(n, Instant::now());
    }

    /// Count bytes received from upstream and sent to a client.
    pub fn record_download(&self, n: u64) {
        self.record_download_at(n, Instant::now());
    }

    pub(crate) fn record_upload_at(&self, n: u64, at: Instant) {
        if n == 0 {
            return;
        }
        {
            let mut state = self.state.lock().expect("traffic recorder mutex poisoned");
            state.total_up_bytes += n;
            state.push_sample(Sample { at, up: n, down: 0 });
        }
        metrics::record_bytes("up", n);
    }

    pub(crate) fn record_download_at(&self, n: u64, at: Instant) {
        if n == 0 {
            return;
        }
        {
            let mut state = self.state.lock().expect("traffic recorder mutex poisoned");
            state.total_down_bytes += n;
            state.push_sample(Sample { at, up: 0, down: n });
        }
        metrics::record_bytes("down", n);
    }

    /// Record a completed (or abandoned) request.
    ///
    /// Byte totals are not touched here; they were already counted by
    /// `record_upload` / `record_download`.
    pub fn record_request(&self, domain: &str, method: &str, up_bytes: u64, down_bytes: u64) {
        let mut state = self.state.lock().expect("traffic recorder mutex poisoned");
        state.total_requests += 1;
        *state.method_counts.entry(method.to_string()).or_insert(0) += 1;
        let stats = state.domain_stats.entry(domain.to_string()).or_default();
        stats.requests += 1;
        stats.up_bytes += up_bytes;
        stats.down_bytes += down_bytes;
    }

    pub fn snapshot(&self) -> TrafficSnapshot {
        self.snapshot_at(Instant::now())
    }

    pub(crate) fn snapshot_at(&self, now: Instant) -> TrafficSnapshot {
        let mut state = self.state.lock().expect("traffic recorder mutex poisoned");
        state.prune(now);

        let (up_sum, down_sum) = state
            .samples
            .iter()
            .fold((0u64, 0u64), |(up, down), s| (up + s.up, down + s.down));
        let (up_rate_bps, down_rate_bps) = match state.samples.front() {
            Some(oldest) => {
                let elapsed = now
                    .saturating_duration_since(oldest.at)
                    .as_secs_f64()
                    .max(MIN_RATE_ELAPSED_SECS);
                (up_sum as f64 / elapsed, down_sum as f64 / elapsed)
            }
            None => (0.0, 0.0),
        };

        TrafficSnapshot {
            total_up_bytes: state.total_up_bytes,
            total_down_bytes: state.total_down_bytes,
            total_bytes: state.total_up_bytes + state.total_down_bytes,
            total_requests: state.total_requests,
            method_counts: state
                .method_counts
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            domain_stats: state
                .domain_stats
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            up_rate_bps,
            down_rate_bps,
            uptime_seconds: now.saturating_duration_since(self.started).as_secs(),
            window_seconds: RATE_WINDOW.as_secs(),
        }
    }

    /// Zero every counter. Process start time is kept for uptime.
    pub fn reset(&self) {
        let mut state = self.state.lock().expect("traffic recorder mutex poisoned");
        *state = TrafficState::default();
        tracing::info!("Traffic counters reset");
    }
}

impl Default for TrafficRecorder {
    fn default() -> Self {
        Self::new()
    }
}
