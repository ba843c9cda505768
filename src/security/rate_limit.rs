//! Fixed-window rate limiting per client IP and per target domain.
//!
//! `window_id = floor(now / window_seconds)`. All counts belong to the current
//! window; when the window id advances the whole state is replaced. A client
//! can therefore spend its full quota at the end of one window and again at
//! the start of the next.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// Quota state reported alongside an admission decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaInfo {
    pub enabled: bool,
    pub limit_ip: Option<u64>,
    pub remaining_ip: Option<u64>,
    pub limit_domain: Option<u64>,
    pub remaining_domain: Option<u64>,
    /// Unix second at which the current window rolls over.
    pub reset: Option<u64>,
}

impl QuotaInfo {
    fn disabled() -> Self {
        Self {
            enabled: false,
            limit_ip: None,
            remaining_ip: None,
            limit_domain: None,
            remaining_domain: None,
            reset: None,
        }
    }
}

/// Counts for a single window. Replaced wholesale on rollover.
#[derive(Debug)]
struct RateWindowState {
    window_id: u64,
    window_seconds: u64,
    reset_epoch: u64,
    counts_by_identity: HashMap<String, u64>,
    counts_by_domain: HashMap<String, u64>,
}

impl RateWindowState {
    fn new(window_id: u64, window_seconds: u64) -> Self {
        Self {
            window_id,
            window_seconds,
            reset_epoch: (window_id + 1) * window_seconds,
            counts_by_identity: HashMap::new(),
            counts_by_domain: HashMap::new(),
        }
    }

    fn is_current(&self, window_id: u64, window_seconds: u64) -> bool {
        self.window_id == window_id && self.window_seconds == window_seconds
    }

    /// A newer window or a resized one replaces this state. An older
    /// `window_id` never does; such a request counts against this window.
    fn is_superseded_by(&self, window_id: u64, window_seconds: u64) -> bool {
        self.window_seconds != window_seconds || window_id > self.window_id
    }
}

/// Partial update accepted by the admin API.
///
/// An absent field is left unchanged; an explicit `null` limit means unbounded.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RateLimitUpdate {
    pub enabled: Option<bool>,
    pub window_seconds: Option<u64>,
    #[serde(default, deserialize_with = "double_option")]
    pub max_requests_per_ip: Option<Option<u64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub max_requests_per_domain: Option<Option<u64>>,
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("window_seconds must be greater than zero")]
    InvalidWindow,
}

/// Current-window usage for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct WindowUsage {
    pub enabled: bool,
    #[serde(flatten)]
    pub window: Option<WindowDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WindowDetail {
    pub window_seconds: u64,
    pub window_id: u64,
    pub max_requests_per_ip: Option<u64>,
    pub max_requests_per_domain: Option<u64>,
    pub reset_epoch: u64,
    pub counts_ip: BTreeMap<String, u64>,
    pub counts_domain: BTreeMap<String, u64>,
}

/// Process-wide fixed-window limiter.
pub struct RateLimiter {
    config: ArcSwap<RateLimitConfig>,
    state: Mutex<Option<RateWindowState>>,
}

fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn key_or_unknown(key: &str) -> &str {
    if key.is_empty() {
        "unknown"
    } else {
        key
    }
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            state: Mutex::new(None),
        }
    }

    /// Snapshot of the live configuration.
    pub fn config(&self) -> RateLimitConfig {
        RateLimitConfig::clone(&self.config.load())
    }

    /// Apply a partial update and return the resulting configuration.
    pub fn update_config(&self, update: RateLimitUpdate) -> Result<RateLimitConfig, RateLimitError> {
        if update.window_seconds == Some(0) {
            return Err(RateLimitError::InvalidWindow);
        }
        self.config.rcu(|current| {
            let mut next = RateLimitConfig::clone(current);
            if let Some(enabled) = update.enabled {
                next.enabled = enabled;
            }
            if let Some(window_seconds) = update.window_seconds {
                next.window_seconds = window_seconds;
            }
            if let Some(limit) = update.max_requests_per_ip {
                next.max_requests_per_ip = limit;
            }
            if let Some(limit) = update.max_requests_per_domain {
                next.max_requests_per_domain = limit;
            }
            Arc::new(next)
        });
        let applied = self.config();
        tracing::info!(
            enabled = applied.enabled,
            window_seconds = applied.window_seconds,
            max_requests_per_ip = ?applied.max_requests_per_ip,
            max_requests_per_domain = ?applied.max_requests_per_domain,
            "Rate limit configuration updated"
        );
        Ok(applied)
    }

    /// Admit or reject one request, consuming quota on admission.
    pub fn check_and_increment(&self, identity: &str, domain: &str) -> (bool, QuotaInfo) {
        self.check_and_increment_at(identity, domain, now_epoch_secs())
    }

    /// [`check_and_increment`](Self::check_and_increment) against an explicit clock.
    pub fn check_and_increment_at(&self, identity: &str, domain: &str, now: u64) -> (bool, QuotaInfo) {
        let config = self.config.load();
        if !config.enabled {
            return (true, QuotaInfo::disabled());
        }

        let window_seconds = config.window_seconds.max(1);
        let window_id = now / window_seconds;
        let identity = key_or_unknown(identity);
        let domain = key_or_unknown(domain);

        let mut guard = self.state.lock().expect("rate limiter mutex poisoned");
        if guard
            .as_ref()
            .map_or(true, |state| state.is_superseded_by(window_id, window_seconds))
        {
            *guard = Some(RateWindowState::new(window_id, window_seconds));
        }
        let state = guard.get_or_insert_with(|| RateWindowState::new(window_id, window_seconds));

        let ip_count = state.counts_by_identity.get(identity).copied().unwrap_or(0);
        let domain_count = state.counts_by_domain.get(domain).copied().unwrap_or(0);

        let ip_ok = config.max_requests_per_ip.map_or(true, |max| ip_count < max);
        let domain_ok = config.max_requests_per_domain.map_or(true, |max| domain_count < max);
        let admitted = ip_ok && domain_ok;

        if admitted {
            *state.counts_by_identity.entry(identity.to_string()).or_insert(0) += 1;
            *state.counts_by_domain.entry(domain.to_string()).or_insert(0) += 1;
        }

        let consumed = u64::from(admitted);
        let quota = QuotaInfo {
            enabled: true,
            limit_ip: config.max_requests_per_ip,
            remaining_ip: config
                .max_requests_per_ip
                .map(|max| max.saturating_sub(ip_count + consumed)),
            limit_domain: config.max_requests_per_domain,
            remaining_domain: config
                .max_requests_per_domain
                .map(|max| max.saturating_sub(domain_count + consumed)),
            reset: Some(state.reset_epoch),
        };
        drop(guard);

        if !admitted {
            let axis = if ip_ok { "domain" } else { "ip" };
            metrics::record_rate_limited(axis);
            tracing::warn!(client = %identity, domain = %domain, axis, "Rate limit exceeded");
        }
        (admitted, quota)
    }

    /// Usage in the current window.
    pub fn window_usage(&self) -> WindowUsage {
        self.window_usage_at(now_epoch_secs())
    }

    pub fn window_usage_at(&self, now: u64) -> WindowUsage {
        let config = self.config.load();
        if !config.enabled {
            return WindowUsage {
                enabled: false,
                window: None,
            };
        }

        let window_seconds = config.window_seconds.max(1);
        let window_id = now / window_seconds;
        let guard = self.state.lock().expect("rate limiter mutex poisoned");
        let (counts_ip, counts_domain): (BTreeMap<String, u64>, BTreeMap<String, u64>) =
            match guard.as_ref() {
                Some(state) if state.is_current(window_id, window_seconds) => (
                    state.counts_by_identity.iter().map(|(k, v)| (k.clone(), *v)).collect(),
                    state.counts_by_domain.iter().map(|(k, v)| (k.clone(), *v)).collect(),
                ),
                _ => (BTreeMap::new(), BTreeMap::new()),
            };
        drop(guard);

        WindowUsage {
            enabled: true,
            window: Some(WindowDetail {
                window_seconds,
                window_id,
                max_requests_per_ip: config.max_requests_per_ip,
                max_requests_per_domain: config.max_requests_per_domain,
                reset_epoch: (window_id + 1) * window_seconds,
                counts_ip,
                counts_domain,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_ip: Option<u64>, max_domain: Option<u64>) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            enabled: true,
            window_seconds: 60,
            max_requests_per_ip: max_ip,
            max_requests_per_domain: max_domain,
        })
    }

    const T0: u64 = 1_700_000_040; // window 28_333_334 starts at 1_700_000_040

    #[test]
    fn test_disabled_always_admits() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        for _ in 0..1000 {
            let (admitted, quota) = limiter.check_and_increment("1.2.3.4", "a.com");
            assert!(admitted);
            assert!(!quota.enabled);
            assert_eq!(quota.reset, None);
        }
        assert!(!limiter.window_usage().enabled);
    }

    #[test]
    fn test_third_request_rejected() {
        let limiter = limiter(Some(2), None);
        let decisions: Vec<bool> = (0..3)
            .map(|i| limiter.check_and_increment_at("1.2.3.4", "a.com", T0 + i).0)
            .collect();
        assert_eq!(decisions, vec![true, true, false]);
    }

    #[test]
    fn test_quota_reporting() {
        let limiter = limiter(Some(2), Some(10));
        let (_, first) = limiter.check_and_increment_at("ip", "a.com", T0);
        assert_eq!(first.remaining_ip, Some(1));
        assert_eq!(first.remaining_domain, Some(9));
        assert_eq!(first.reset, Some(T0 + 60));

        limiter.check_and_increment_at("ip", "a.com", T0);
        let (admitted, rejected) = limiter.check_and_increment_at("ip", "a.com", T0);
        assert!(!admitted);
        assert_eq!(rejected.remaining_ip, Some(0));
        // Rejection consumes nothing on the other axis either.
        assert_eq!(rejected.remaining_domain, Some(8));
    }

    #[test]
    fn test_either_axis_rejects() {
        let limiter = limiter(Some(100), Some(1));
        assert!(limiter.check_and_increment_at("a", "busy.com", T0).0);
        assert!(!limiter.check_and_increment_at("b", "busy.com", T0).0);
        assert!(limiter.check_and_increment_at("b", "quiet.com", T0).0);

        let usage = limiter.window_usage_at(T0).window.unwrap();
        assert_eq!(usage.counts_ip.get("a"), Some(&1));
        assert_eq!(usage.counts_ip.get("b"), Some(&1));
        assert_eq!(usage.counts_domain.get("busy.com"), Some(&1));
    }

    #[test]
    fn test_window_rollover_discards_counts() {
        let limiter = limiter(Some(1), None);
        assert!(limiter.check_and_increment_at("ip", "a.com", T0).0);
        assert!(!limiter.check_and_increment_at("ip", "a.com", T0 + 59).0);

        let next = T0 + 60;
        let usage = limiter.window_usage_at(next).window.unwrap();
        assert!(usage.counts_ip.is_empty());

        assert!(limiter.check_and_increment_at("ip", "a.com", next).0);
        let usage = limiter.window_usage_at(next).window.unwrap();
        assert_eq!(usage.counts_ip.len(), 1);
        assert_eq!(usage.window_id, next / 60);
    }

    #[test]
    fn test_boundary_burst_is_allowed() {
        let limiter = limiter(Some(3), None);
        let admitted_before = (0..3)
            .filter(|_| limiter.check_and_increment_at("ip", "a.com", T0 + 59).0)
            .count();
        let admitted_after = (0..3)
            .filter(|_| limiter.check_and_increment_at("ip", "a.com", T0 + 60).0)
            .count();
        assert_eq!(admitted_before + admitted_after, 6);
    }

    #[test]
    fn test_late_request_from_previous_window_keeps_current_counts() {
        let limiter = limiter(Some(1), None);
        assert!(limiter.check_and_increment_at("ip", "a.com", T0 + 60).0);
        // Clock read before the boundary, lock taken after it.
        assert!(limiter.check_and_increment_at("ip2", "a.com", T0 + 59).0);
        assert!(!limiter.check_and_increment_at("ip", "a.com", T0 + 60).0);

        let usage = limiter.window_usage_at(T0 + 60).window.unwrap();
        assert_eq!(usage.window_id, (T0 + 60) / 60);
        assert_eq!(usage.counts_ip.get("ip"), Some(&1));
        assert_eq!(usage.counts_ip.get("ip2"), Some(&1));
        assert_eq!(usage.counts_domain.get("a.com"), Some(&2));
    }

    #[test]
    fn test_empty_keys_share_unknown_bucket() {
        let limiter = limiter(Some(1), None);
        assert!(limiter.check_and_increment_at("", "a.com", T0).0);
        assert!(!limiter.check_and_increment_at("unknown", "a.com", T0).0);
    }

    #[test]
    fn test_update_config() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        let update: RateLimitUpdate = serde_json::from_str(
            r#"{"enabled": true, "window_seconds": 10, "max_requests_per_ip": null}"#,
        )
        .unwrap();
        let applied = limiter.update_config(update).unwrap();
        assert!(applied.enabled);
        assert_eq!(applied.window_seconds, 10);
        assert_eq!(applied.max_requests_per_ip, None);
        // Absent field keeps its value.
        assert_eq!(applied.max_requests_per_domain, Some(300));

        let zero = RateLimitUpdate {
            window_seconds: Some(0),
            ..Default::default()
        };
        assert_eq!(limiter.update_config(zero), Err(RateLimitError::InvalidWindow));
        assert_eq!(limiter.config().window_seconds, 10);
    }

    #[test]
    fn test_window_size_change_resets_state() {
        let limiter = limiter(Some(1), None);
        assert!(limiter.check_and_increment_at("ip", "a.com", T0).0);
        limiter
            .update_config(RateLimitUpdate {
                window_seconds: Some(30),
                ..Default::default()
            })
            .unwrap();
        // T0 is also a 30s boundary, but the window size changed.
        assert!(limiter.check_and_increment_at("ip", "a.com", T0).0);
    }

    #[test]
    fn test_concurrent_admission_never_overshoots() {
        let limiter = Arc::new(limiter(Some(50), None));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    (0..20)
                        .filter(|_| limiter.check_and_increment_at("ip", "a.com", T0).0)
                        .count()
                })
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }
}
