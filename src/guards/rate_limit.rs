//! Sliding-window rate limiting across user, device, and origin scopes.
//!
//! All windows live behind a single mutex so the multi-scope
//! check-then-increment runs as one critical section; two racing commands
//! can never both squeeze through the last quota slot.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Scope a window is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateScope {
    User,
    Device,
    Origin,
}

impl RateScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateScope::User => "user",
            RateScope::Device => "device",
            RateScope::Origin => "origin",
        }
    }
}

/// Identities a command is counted against. Device and origin are optional;
/// absent scopes are simply not checked.
#[derive(Debug, Clone, Default)]
pub struct RateSubject {
    pub user_id: String,
    pub device_id: Option<String>,
    pub origin: Option<String>,
}

impl RateSubject {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            device_id: None,
            origin: None,
        }
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

/// Outcome of a rate check or acquisition.
#[derive(Debug, Clone)]
pub struct RateLimitResult {
    pub allowed: bool,
    /// Requests still available in the user window, this one included.
    pub remaining: u32,
    /// When the user window resets.
    pub reset_at: Instant,
    /// Wait before retrying; zero when allowed.
    pub retry_after: Duration,
    /// Fraction of the user quota consumed before this request.
    pub usage_ratio: f64,
    /// Scope that denied the request.
    pub limited_scope: Option<RateScope>,
}

/// Rate limiter tuning.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Window length shared by all scopes.
    pub window: Duration,
    /// Device quota = user quota times this.
    pub device_multiplier: u32,
    /// Origin quota = user quota times this.
    pub origin_multiplier: u32,
    /// Windows idle for `window * prune_factor` are dropped.
    pub prune_factor: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(3600),
            device_multiplier: 2,
            origin_multiplier: 10,
            prune_factor: 24,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    window_start: Instant,
}

struct LimiterState {
    windows: HashMap<(RateScope, String), Window>,
    last_prune: Instant,
}

/// Fixed-window limiter with lazy per-key reset.
pub struct RateLimiter {
    state: Mutex<LimiterState>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            state: Mutex::new(LimiterState {
                windows: HashMap::new(),
                last_prune: Instant::now(),
            }),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check and count with the wall clock.
    pub fn acquire(&self, subject: &RateSubject, quota: u32) -> RateLimitResult {
        self.acquire_at(subject, quota, Instant::now())
    }

    /// Check every scope and count the request. Counters move only when all
    /// scopes admit it, so a denied request costs nothing.
    pub fn acquire_at(&self, subject: &RateSubject, quota: u32, now: Instant) -> RateLimitResult {
        let mut state = self.state.lock();
        self.prune_if_due(&mut state, now);

        let keys = subject_keys(subject);

        // Lazy reset before judging.
        for key in &keys {
            if let Some(window) = state.windows.get_mut(key) {
                if now.saturating_duration_since(window.window_start) > self.config.window {
                    window.count = 0;
                    window.window_start = now;
                }
            }
        }

        let user_window = state.windows.get(&keys[0]).copied();
        let user_count = user_window.map_or(0, |w| w.count);
        let user_start = user_window.map_or(now, |w| w.window_start);

        let remaining = quota.saturating_sub(user_count);
        let reset_at = user_start + self.config.window;
        let usage_ratio = usage(user_count, quota);

        let mut denial: Option<(RateScope, Instant)> = None;
        for key in &keys {
            let window = state.windows.get(key);
            let count = window.map_or(0, |w| w.count);
            if count >= self.scope_quota(key.0, quota) {
                denial = Some((key.0, window.map_or(now, |w| w.window_start)));
                break;
            }
        }

        if let Some((scope, start)) = denial {
            let retry_after = (start + self.config.window).saturating_duration_since(now);
            return RateLimitResult {
                allowed: false,
                remaining,
                reset_at,
                retry_after,
                usage_ratio,
                limited_scope: Some(scope),
            };
        }

        for key in keys {
            let window = state.windows.entry(key).or_insert(Window {
                count: 0,
                window_start: now,
            });
            window.count = window.count.saturating_add(1);
        }

        RateLimitResult {
            allowed: true,
            remaining,
            reset_at,
            retry_after: Duration::ZERO,
            usage_ratio,
            limited_scope: None,
        }
    }

    /// Read-only variant: reports what `acquire_at` would decide without
    /// counting or resetting anything.
    pub fn check_at(&self, subject: &RateSubject, quota: u32, now: Instant) -> RateLimitResult {
        let state = self.state.lock();
        let keys = subject_keys(subject);

        let live = |key: &(RateScope, String)| -> Option<Window> {
            let window = state.windows.get(key)?;
            let age = now.saturating_duration_since(window.window_start);
            (age <= self.config.window).then_some(*window)
        };

        let user_window = live(&keys[0]);
        let user_count = user_window.map_or(0, |w| w.count);
        let user_start = user_window.map_or(now, |w| w.window_start);

        let remaining = quota.saturating_sub(user_count);
        let reset_at = user_start + self.config.window;
        let usage_ratio = usage(user_count, quota);

        for key in &keys {
            let window = live(key);
            let count = window.map_or(0, |w| w.count);
            if count >= self.scope_quota(key.0, quota) {
                let start = window.map_or(now, |w| w.window_start);
                return RateLimitResult {
                    allowed: false,
                    remaining,
                    reset_at,
                    retry_after: (start + self.config.window).saturating_duration_since(now),
                    usage_ratio,
                    limited_scope: Some(key.0),
                };
            }
        }

        RateLimitResult {
            allowed: true,
            remaining,
            reset_at,
            retry_after: Duration::ZERO,
            usage_ratio,
            limited_scope: None,
        }
    }

    pub fn check(&self, subject: &RateSubject, quota: u32) -> RateLimitResult {
        self.check_at(subject, quota, Instant::now())
    }

    /// Requests counted in the user's live window, without counting one.
    pub fn user_count_at(&self, user_id: &str, now: Instant) -> u32 {
        let state = self.state.lock();
        state
            .windows
            .get(&(RateScope::User, user_id.to_string()))
            .filter(|w| now.saturating_duration_since(w.window_start) <= self.config.window)
            .map_or(0, |w| w.count)
    }

    /// Fraction of the user quota consumed, without counting.
    pub fn user_usage_at(&self, user_id: &str, quota: u32, now: Instant) -> f64 {
        if quota == 0 {
            return 1.0;
        }
        usage(self.user_count_at(user_id, now), quota)
    }

    /// Drop every window across all scopes.
    pub fn flush(&self) {
        self.state.lock().windows.clear();
    }

    /// Number of live window entries, all scopes combined.
    pub fn window_count(&self) -> usize {
        self.state.lock().windows.len()
    }

    fn scope_quota(&self, scope: RateScope, quota: u32) -> u32 {
        match scope {
            RateScope::User => quota,
            RateScope::Device => quota.saturating_mul(self.config.device_multiplier),
            RateScope::Origin => quota.saturating_mul(self.config.origin_multiplier),
        }
    }

    fn prune_if_due(&self, state: &mut LimiterState, now: Instant) {
        if now.saturating_duration_since(state.last_prune) < self.config.window {
            return;
        }
        let idle_cutoff = self.config.window.saturating_mul(self.config.prune_factor);
        state
            .windows
            .retain(|_, w| now.saturating_duration_since(w.window_start) < idle_cutoff);
        state.last_prune = now;
    }
}

fn subject_keys(subject: &RateSubject) -> Vec<(RateScope, String)> {
    let mut keys = vec![(RateScope::User, subject.user_id.clone())];
    if let Some(device_id) = &subject.device_id {
        keys.push((RateScope::Device, device_id.clone()));
    }
    if let Some(origin) = &subject.origin {
        keys.push((RateScope::Origin, origin.clone()));
    }
    keys
}

fn usage(count: u32, quota: u32) -> f64 {
    if quota == 0 {
        1.0
    } else {
        f64::from(count) / f64::from(quota)
    }
}
