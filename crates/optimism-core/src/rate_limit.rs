//! Fixed-window rate limiter with block escalation.
//!
//! One record per `(endpoint class, client id)`. Exceeding the cap inside a
//! window blocks the key for the class's block duration, independent of the
//! window; every call during the block is rejected with the remaining block
//! time. Expired windows and blocks are reset lazily on the next access and
//! evicted by a background sweeper owned by [`SweeperHandle`].
//!
//! Increments go through `DashMap::entry`, which holds the shard lock for the
//! whole read-modify-write, so concurrent requests for one key never
//! over- or under-count.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Endpoint classes with independent limits. Generation is the strictest
/// because every admitted request costs paid provider calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointClass {
    Reframe,
    Session,
    Messages,
    Dashboard,
    Default,
}

impl EndpointClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::Reframe => "reframe",
            EndpointClass::Session => "session",
            EndpointClass::Messages => "messages",
            EndpointClass::Dashboard => "dashboard",
            EndpointClass::Default => "default",
        }
    }
}

/// Window size, request cap and block duration for one endpoint class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub window_secs: u64,
    pub max_requests: u32,
    pub block_secs: u64,
}

impl RateLimitRule {
    pub const fn new(window_secs: u64, max_requests: u32, block_secs: u64) -> Self {
        Self {
            window_secs,
            max_requests,
            block_secs,
        }
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    fn block(&self) -> Duration {
        Duration::from_secs(self.block_secs)
    }
}

/// Per-class rules.
///
/// | Class | Window | Cap | Block |
/// |-------|--------|-----|-------|
/// | reframe | 60s | 10 | 5 min |
/// | session | 60s | 20 | 60s |
/// | messages | 60s | 30 | 2 min |
/// | dashboard | 15 min | 5 | 30 min |
/// | default | 60s | 60 | 60s |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitRules {
    pub reframe: RateLimitRule,
    pub session: RateLimitRule,
    pub messages: RateLimitRule,
    pub dashboard: RateLimitRule,
    pub default: RateLimitRule,
}

impl Default for RateLimitRules {
    fn default() -> Self {
        Self {
            reframe: RateLimitRule::new(60, 10, 300),
            session: RateLimitRule::new(60, 20, 60),
            messages: RateLimitRule::new(60, 30, 120),
            dashboard: RateLimitRule::new(900, 5, 1800),
            default: RateLimitRule::new(60, 60, 60),
        }
    }
}

impl RateLimitRules {
    pub fn rule_for(&self, class: EndpointClass) -> RateLimitRule {
        match class {
            EndpointClass::Reframe => self.reframe,
            EndpointClass::Session => self.session,
            EndpointClass::Messages => self.messages,
            EndpointClass::Dashboard => self.dashboard,
            EndpointClass::Default => self.default,
        }
    }

    /// Every rule needs a non-zero window and cap.
    pub fn validate(&self) -> Result<(), String> {
        for class in [
            EndpointClass::Reframe,
            EndpointClass::Session,
            EndpointClass::Messages,
            EndpointClass::Dashboard,
            EndpointClass::Default,
        ] {
            let rule = self.rule_for(class);
            if rule.window_secs == 0 || rule.max_requests == 0 {
                return Err(format!(
                    "rate limit for '{}' needs a non-zero window and cap",
                    class.as_str()
                ));
            }
        }
        Ok(())
    }
}

/// Admission decision returned by [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub retry_after_seconds: u64,
    pub remaining: u32,
}

impl RateLimitDecision {
    fn admit(remaining: u32) -> Self {
        Self {
            allowed: true,
            retry_after_seconds: 0,
            remaining,
        }
    }

    fn reject(retry_after_seconds: u64) -> Self {
        Self {
            allowed: false,
            retry_after_seconds,
            remaining: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct RateLimitRecord {
    count: u32,
    window_reset_at: Instant,
    blocked_until: Option<Instant>,
}

impl RateLimitRecord {
    fn open(now: Instant, rule: &RateLimitRule) -> Self {
        Self {
            count: 1,
            window_reset_at: now + rule.window(),
            blocked_until: None,
        }
    }

    fn is_stale(&self, now: Instant) -> bool {
        match self.blocked_until {
            Some(until) => now >= until,
            None => now >= self.window_reset_at,
        }
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let millis = d.as_millis();
    u64::try_from(millis.div_ceil(1000)).unwrap_or(u64::MAX).max(1)
}

/// Shared limiter store. Construct once and pass an `Arc` to every consumer.
#[derive(Debug, Default)]
pub struct RateLimiter {
    rules: RateLimitRules,
    records: DashMap<(EndpointClass, String), RateLimitRecord>,
}

impl RateLimiter {
    pub fn new(rules: RateLimitRules) -> Self {
        Self {
            rules,
            records: DashMap::new(),
        }
    }

    pub fn rules(&self) -> &RateLimitRules {
        &self.rules
    }

    /// Admit or reject one request for `identifier` on `class`.
    pub fn check(&self, identifier: &str, class: EndpointClass) -> RateLimitDecision {
        self.check_at(identifier, class, Instant::now())
    }

    /// Same as [`check`](Self::check) against an explicit clock reading.
    pub fn check_at(
        &self,
        identifier: &str,
        class: EndpointClass,
        now: Instant,
    ) -> RateLimitDecision {
        let rule = self.rules.rule_for(class);
        let key = (class, identifier.to_string());

        match self.records.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(RateLimitRecord::open(now, &rule));
                RateLimitDecision::admit(rule.max_requests.saturating_sub(1))
            }
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();

                if let Some(until) = record.blocked_until {
                    if now < until {
                        return RateLimitDecision::reject(ceil_secs(until - now));
                    }
                    *record = RateLimitRecord::open(now, &rule);
                    return RateLimitDecision::admit(rule.max_requests.saturating_sub(1));
                }

                if now >= record.window_reset_at {
                    *record = RateLimitRecord::open(now, &rule);
                    return RateLimitDecision::admit(rule.max_requests.saturating_sub(1));
                }

                record.count = record.count.saturating_add(1);
                if record.count > rule.max_requests {
                    record.blocked_until = Some(now + rule.block());
                    warn!(
                        target: "optimism::rate_limit",
                        class = class.as_str(),
                        client = %identifier,
                        block_secs = rule.block_secs,
                        "client blocked"
                    );
                    return RateLimitDecision::reject(rule.block_secs.max(1));
                }
                RateLimitDecision::admit(rule.max_requests - record.count)
            }
        }
    }

    /// Drop records whose window and block have both run out. Returns how many were evicted.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_stale(now));
        before.saturating_sub(self.records.len())
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn tracked_keys(&self) -> usize {
        self.records.len()
    }

    /// Start the periodic sweep task. Stop it with [`SweeperHandle::stop`].
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> SweeperHandle {
        let limiter = Arc::clone(self);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = interval(every);
            // First tick completes immediately.
            ticker.tick().await;
            info!(target: "optimism::rate_limit", every_secs = every.as_secs(), "sweeper started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = limiter.sweep();
                        if evicted > 0 {
                            debug!(target: "optimism::rate_limit", evicted, "swept expired records");
                        }
                    }
                    _ = &mut stop_rx => break,
                }
            }
            info!(target: "optimism::rate_limit", "sweeper stopped");
        });

        SweeperHandle {
            stop_tx: Some(stop_tx),
            task,
        }
    }
}

/// Lifecycle handle for the background sweep task.
pub struct SweeperHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper and wait for it to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Client identity for rate limiting: first `X-Forwarded-For` hop, then
/// `X-Real-IP`, else `"unknown"`.
pub fn client_identifier(forwarded_for: Option<&str>, real_ip: Option<&str>) -> String {
    if let Some(first) = forwarded_for
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return first.to_string();
    }
    real_ip
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "unknown".to_string())
}
