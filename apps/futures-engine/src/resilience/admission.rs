//! Admission control for exchange traffic.
//!
//! Tracks the exchange's per-minute budgets (request weight and order count)
//! and the ban window the exchange imposes after a rate-limit violation.
//!
//! # Circuit
//!
//! ```text
//! none ──(429/418/-1003)──→ banned_until = T
//! banned ──(now >= T)──→ none
//! ```
//!
//! While banned, only [`RequestPriority::Critical`] calls are admitted. They
//! still consume budget; the budget itself is never bypassed.
//!
//! # Budget shares
//!
//! | Priority | Share of budget |
//! |----------|-----------------|
//! | Critical | 95% |
//! | High | 80% |
//! | Normal | 60% |
//! | Low | 40% |
//!
//! Weight is reserved when a slot is granted and corrected upward from the
//! `X-MBX-USED-WEIGHT-1M` / `X-MBX-ORDER-COUNT-1M` response headers.

use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::observability::metrics;

/// Caller priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPriority {
    /// Session keepalive. The only priority that passes an open circuit.
    Critical,
    /// Order management.
    High,
    /// Queries.
    Normal,
    /// Background reporting.
    Low,
}

impl RequestPriority {
    /// Fraction of the budget this priority may use.
    #[must_use]
    pub const fn budget_share(&self) -> f64 {
        match self {
            Self::Critical => 0.95,
            Self::High => 0.80,
            Self::Normal => 0.60,
            Self::Low => 0.40,
        }
    }

    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for RequestPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Budget the exchange meters separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointClass {
    /// IP request weight, charged by every call.
    RequestWeight,
    /// Order placement count.
    Orders,
}

impl fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestWeight => write!(f, "request_weight"),
            Self::Orders => write!(f, "orders"),
        }
    }
}

/// What one call charges against the budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestCost {
    /// Request weight.
    pub weight: u32,
    /// Orders placed.
    pub orders: u32,
}

impl RequestCost {
    /// A call that only costs weight.
    #[must_use]
    pub const fn weight(weight: u32) -> Self {
        Self { weight, orders: 0 }
    }

    /// An order placement.
    #[must_use]
    pub const fn order(weight: u32) -> Self {
        Self { weight, orders: 1 }
    }
}

/// Why admission was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// Exchange ban in force.
    CircuitOpen {
        /// End of the ban.
        banned_until: DateTime<Utc>,
    },
    /// Budget share for this priority is used up for the current window.
    BudgetExhausted {
        /// Exhausted budget.
        class: EndpointClass,
        /// Used in the current window.
        used: u32,
        /// Limit for this priority.
        limit: u32,
    },
}

impl DenyReason {
    /// Label for metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::CircuitOpen { .. } => "circuit_open",
            Self::BudgetExhausted { .. } => "budget_exhausted",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CircuitOpen { banned_until } => {
                write!(f, "circuit open until {}", banned_until.to_rfc3339())
            }
            Self::BudgetExhausted { class, used, limit } => {
                write!(f, "{class} budget exhausted ({used}/{limit})")
            }
        }
    }
}

/// Result of [`AdmissionController::try_acquire`].
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionDecision {
    /// Whether the call may proceed.
    pub granted: bool,
    /// Suggested wait before asking again.
    pub wait_hint: Duration,
    /// Why the call was refused.
    pub reason: Option<DenyReason>,
    /// Granted despite an open circuit.
    pub bypassed_circuit: bool,
    /// Weight left for this priority after the decision.
    pub remaining_weight: u32,
    /// Weight used as a percentage of the full budget.
    pub usage_percent: f64,
}

/// Error from [`AdmissionController::wait_for_slot`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    /// No slot became available before the ceiling.
    #[error("admission denied after {waited:?}: {reason}")]
    Denied {
        /// Last refusal reason.
        reason: DenyReason,
        /// Time spent waiting.
        waited: Duration,
    },
}

/// Admission settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionConfig {
    /// Request weight per window.
    pub max_weight_per_window: u32,
    /// Orders per window.
    pub max_orders_per_window: u32,
    /// Budget window length.
    pub window: Duration,
    /// Ban applied when the exchange gives no usable unban time.
    pub default_ban: Duration,
    /// Default wait ceiling for callers.
    pub wait_ceiling: Duration,
    /// Longest single sleep while waiting.
    pub max_wait_step: Duration,
    /// Server unban times further out than this are ignored.
    pub max_ban_horizon: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_weight_per_window: 2400,
            max_orders_per_window: 1200,
            window: Duration::from_secs(60),
            default_ban: Duration::from_secs(120),
            wait_ceiling: Duration::from_secs(30),
            max_wait_step: Duration::from_secs(5),
            max_ban_horizon: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Server-reported usage parsed from response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeaderSnapshot {
    /// `X-MBX-USED-WEIGHT-1M`.
    pub used_weight_1m: Option<u32>,
    /// `X-MBX-ORDER-COUNT-1M`.
    pub order_count_1m: Option<u32>,
}

/// Point-in-time view of admission state.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionSnapshot {
    /// Weight used in the current window.
    pub used_weight: u32,
    /// Orders used in the current window.
    pub used_orders: u32,
    /// End of the current ban.
    pub banned_until: Option<DateTime<Utc>>,
    /// Rate-limit violations since the last clean call.
    pub consecutive_violations: u32,
    /// Logical calls settled.
    pub completed_calls: u64,
    /// Calls granted despite an open circuit.
    pub circuit_bypasses: u64,
    /// Calls refused.
    pub denials: u64,
}

#[derive(Debug)]
struct AdmissionState {
    window_start: DateTime<Utc>,
    used_weight: u32,
    used_orders: u32,
    banned_until: Option<DateTime<Utc>>,
    consecutive_violations: u32,
}

/// Process-wide gate for outbound exchange calls.
///
/// Constructed once and shared as `Arc<AdmissionController>`. The internal
/// lock is never held across an `.await`.
#[derive(Debug)]
pub struct AdmissionController {
    config: AdmissionConfig,
    state: Mutex<AdmissionState>,
    completed_calls: AtomicU64,
    circuit_bypasses: AtomicU64,
    denials: AtomicU64,
}

impl AdmissionController {
    /// Create a controller with an empty window.
    #[must_use]
    pub fn new(config: AdmissionConfig) -> Self {
        let now = Utc::now();
        let window_start = align_window(now, config.window);
        Self {
            config,
            state: Mutex::new(AdmissionState {
                window_start,
                used_weight: 0,
                used_orders: 0,
                banned_until: None,
                consecutive_violations: 0,
            }),
            completed_calls: AtomicU64::new(0),
            circuit_bypasses: AtomicU64::new(0),
            denials: AtomicU64::new(0),
        }
    }

    /// Settings in force.
    #[must_use]
    pub const fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Ask for a slot now.
    pub fn try_acquire(&self, cost: RequestCost, priority: RequestPriority) -> AdmissionDecision {
        self.try_acquire_at(Utc::now(), cost, priority)
    }

    /// Ask for a slot at `now`. Reserves the cost when granted.
    pub fn try_acquire_at(
        &self,
        now: DateTime<Utc>,
        cost: RequestCost,
        priority: RequestPriority,
    ) -> AdmissionDecision {
        let share = priority.budget_share();
        let weight_limit = share_of(self.config.max_weight_per_window, share);
        let order_limit = share_of(self.config.max_orders_per_window, share);

        let (decision, circuit_closed) = {
            let mut state = self.state.lock();
            self.roll_window(&mut state, now);

            let mut circuit_closed = false;
            let mut bypassed = false;
            if let Some(until) = state.banned_until {
                if now > until {
                    state.banned_until = None;
                    circuit_closed = true;
                } else if priority == RequestPriority::Critical {
                    bypassed = true;
                } else {
                    let decision = self.denied(
                        &state,
                        weight_limit,
                        to_std(until - now).max(Duration::from_millis(1)),
                        DenyReason::CircuitOpen {
                            banned_until: until,
                        },
                    );
                    drop(state);
                    return self.finish(decision, priority);
                }
            }

            let window_left = self.window_remaining(&state, now);
            if state.used_weight.saturating_add(cost.weight) > weight_limit {
                let reason = DenyReason::BudgetExhausted {
                    class: EndpointClass::RequestWeight,
                    used: state.used_weight,
                    limit: weight_limit,
                };
                let decision = self.denied(&state, weight_limit, window_left, reason);
                (decision, circuit_closed)
            } else if cost.orders > 0 && state.used_orders.saturating_add(cost.orders) > order_limit {
                let reason = DenyReason::BudgetExhausted {
                    class: EndpointClass::Orders,
                    used: state.used_orders,
                    limit: order_limit,
                };
                let decision = self.denied(&state, weight_limit, window_left, reason);
                (decision, circuit_closed)
            } else {
                state.used_weight += cost.weight;
                state.used_orders += cost.orders;
                let decision = AdmissionDecision {
                    granted: true,
                    wait_hint: Duration::ZERO,
                    reason: None,
                    bypassed_circuit: bypassed,
                    remaining_weight: weight_limit.saturating_sub(state.used_weight),
                    usage_percent: self.usage_percent(state.used_weight),
                };
                metrics::set_admission_usage(state.used_weight, state.used_orders);
                (decision, circuit_closed)
            }
        };

        if circuit_closed {
            info!("Exchange ban expired, circuit closed");
        }
        self.finish(decision, priority)
    }

    /// Wait until a slot is granted or `ceiling` passes.
    ///
    /// Gives up early when the refusal outlasts the remaining wait.
    pub async fn wait_for_slot(
        &self,
        cost: RequestCost,
        priority: RequestPriority,
        ceiling: Duration,
    ) -> Result<AdmissionDecision, AdmissionError> {
        let started = Instant::now();
        loop {
            let decision = self.try_acquire(cost, priority);
            if decision.granted {
                return Ok(decision);
            }
            let reason = decision
                .reason
                .clone()
                .unwrap_or(DenyReason::BudgetExhausted {
                    class: EndpointClass::RequestWeight,
                    used: 0,
                    limit: 0,
                });

            let waited = started.elapsed();
            let remaining = ceiling.saturating_sub(waited);
            if remaining.is_zero() || decision.wait_hint > remaining {
                return Err(AdmissionError::Denied { reason, waited });
            }

            let step = decision
                .wait_hint
                .min(self.config.max_wait_step)
                .min(remaining)
                .max(Duration::from_millis(10));
            debug!(
                priority = %priority,
                reason = %reason,
                sleep_ms = step.as_millis() as u64,
                "Waiting for admission slot"
            );
            tokio::time::sleep(step).await;
        }
    }

    /// Settle one logical call that ended without a rate-limit outcome.
    pub fn record_request(&self, _cost: RequestCost) {
        self.completed_calls.fetch_add(1, Ordering::Relaxed);
        self.state.lock().consecutive_violations = 0;
    }

    /// Open (or extend) the circuit after a rate-limit response.
    ///
    /// Returns the ban end in force.
    pub fn record_rate_limit_error(&self, server_until: Option<DateTime<Utc>>) -> DateTime<Utc> {
        self.record_rate_limit_error_at(Utc::now(), server_until)
    }

    /// Open (or extend) the circuit as of `now`.
    pub fn record_rate_limit_error_at(
        &self,
        now: DateTime<Utc>,
        server_until: Option<DateTime<Utc>>,
    ) -> DateTime<Utc> {
        let candidate = self.resolve_ban(now, server_until);
        let (until, violations) = {
            let mut state = self.state.lock();
            let until = state.banned_until.map_or(candidate, |b| b.max(candidate));
            state.banned_until = Some(until);
            state.consecutive_violations = state.consecutive_violations.saturating_add(1);
            (until, state.consecutive_violations)
        };
        warn!(
            banned_until = %until.to_rfc3339(),
            violations,
            "Exchange rate limit hit, circuit opened"
        );
        metrics::record_circuit_trip();
        until
    }

    /// Push the ban end out without counting a new violation.
    pub fn extend_ban(&self, server_until: Option<DateTime<Utc>>) -> DateTime<Utc> {
        self.extend_ban_at(Utc::now(), server_until)
    }

    /// Push the ban end out as of `now`.
    pub fn extend_ban_at(
        &self,
        now: DateTime<Utc>,
        server_until: Option<DateTime<Utc>>,
    ) -> DateTime<Utc> {
        let candidate = self.resolve_ban(now, server_until);
        let mut state = self.state.lock();
        let until = state.banned_until.map_or(candidate, |b| b.max(candidate));
        state.banned_until = Some(until);
        until
    }

    /// Fold server-reported usage into the window. Higher value wins.
    pub fn update_from_response_headers(&self, headers: HeaderSnapshot) {
        let mut state = self.state.lock();
        self.roll_window(&mut state, Utc::now());
        if let Some(weight) = headers.used_weight_1m {
            state.used_weight = state.used_weight.max(weight);
        }
        if let Some(orders) = headers.order_count_1m {
            state.used_orders = state.used_orders.max(orders);
        }
        metrics::set_admission_usage(state.used_weight, state.used_orders);
    }

    /// Current ban end, if any.
    #[must_use]
    pub fn banned_until(&self) -> Option<DateTime<Utc>> {
        self.state.lock().banned_until
    }

    /// Whether a ban is in force at `now`. The unban instant itself is
    /// still banned.
    #[must_use]
    pub fn is_circuit_open_at(&self, now: DateTime<Utc>) -> bool {
        self.state.lock().banned_until.is_some_and(|until| now <= until)
    }

    /// Point-in-time view.
    #[must_use]
    pub fn snapshot(&self) -> AdmissionSnapshot {
        let state = self.state.lock();
        AdmissionSnapshot {
            used_weight: state.used_weight,
            used_orders: state.used_orders,
            banned_until: state.banned_until,
            consecutive_violations: state.consecutive_violations,
            completed_calls: self.completed_calls.load(Ordering::Relaxed),
            circuit_bypasses: self.circuit_bypasses.load(Ordering::Relaxed),
            denials: self.denials.load(Ordering::Relaxed),
        }
    }

    fn resolve_ban(&self, now: DateTime<Utc>, server_until: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let horizon = now + to_delta(self.config.max_ban_horizon);
        match server_until {
            Some(until) if until > now && until <= horizon => until,
            _ => now + to_delta(self.config.default_ban),
        }
    }

    fn roll_window(&self, state: &mut AdmissionState, now: DateTime<Utc>) {
        if now - state.window_start >= to_delta(self.config.window) {
            state.window_start = align_window(now, self.config.window);
            state.used_weight = 0;
            state.used_orders = 0;
        }
    }

    fn window_remaining(&self, state: &AdmissionState, now: DateTime<Utc>) -> Duration {
        let end = state.window_start + to_delta(self.config.window);
        to_std(end - now)
    }

    fn denied(
        &self,
        state: &AdmissionState,
        weight_limit: u32,
        wait_hint: Duration,
        reason: DenyReason,
    ) -> AdmissionDecision {
        AdmissionDecision {
            granted: false,
            wait_hint,
            reason: Some(reason),
            bypassed_circuit: false,
            remaining_weight: weight_limit.saturating_sub(state.used_weight),
            usage_percent: self.usage_percent(state.used_weight),
        }
    }

    fn finish(
        &self,
        decision: AdmissionDecision,
        priority: RequestPriority,
    ) -> AdmissionDecision {
        if decision.bypassed_circuit {
            self.circuit_bypasses.fetch_add(1, Ordering::Relaxed);
            metrics::record_critical_bypass();
            warn!(
                priority = %priority,
                remaining_weight = decision.remaining_weight,
                "Critical request bypassing open circuit"
            );
        }
        if let Some(reason) = &decision.reason {
            self.denials.fetch_add(1, Ordering::Relaxed);
            metrics::record_admission_denied(reason.label(), priority.as_str());
            debug!(priority = %priority, reason = %reason, "Admission denied");
        }
        decision
    }

    fn usage_percent(&self, used: u32) -> f64 {
        if self.config.max_weight_per_window == 0 {
            return 100.0;
        }
        f64::from(used) / f64::from(self.config.max_weight_per_window) * 100.0
    }
}

/// Extract `banned until <epoch-ms>` from an exchange error message.
#[must_use]
#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
pub fn parse_ban_until(message: &str) -> Option<DateTime<Utc>> {
    static BAN_RE: OnceLock<Regex> = OnceLock::new();
    let re = BAN_RE
        .get_or_init(|| Regex::new(r"banned until (\d{13})").expect("ban regex is valid"));
    let millis: i64 = re.captures(message)?.get(1)?.as_str().parse().ok()?;
    DateTime::from_timestamp_millis(millis)
}

fn share_of(max: u32, share: f64) -> u32 {
    (f64::from(max) * share).floor() as u32
}

fn align_window(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    let window_ms = window.as_millis().max(1) as i64;
    let ms = now.timestamp_millis();
    DateTime::from_timestamp_millis(ms - ms.rem_euclid(window_ms)).unwrap_or(now)
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

fn to_std(delta: TimeDelta) -> Duration {
    delta.to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    fn controller() -> AdmissionController {
        let controller = AdmissionController::new(AdmissionConfig::default());
        controller.state.lock().window_start = t0();
        controller
    }

    #[test]
    fn grants_and_reserves_weight() {
        let c = controller();
        let d = c.try_acquire_at(t0(), RequestCost::weight(5), RequestPriority::Normal);
        assert!(d.granted);
        assert_eq!(c.snapshot().used_weight, 5);
        assert_eq!(d.remaining_weight, 1440 - 5);
    }

    #[test]
    fn normal_priority_denied_at_its_share_until_rollover() {
        let c = controller();
        let now = t0() + TimeDelta::seconds(10);
        for _ in 0..48 {
            assert!(c.try_acquire_at(now, RequestCost::weight(30), RequestPriority::Normal).granted);
        }
        let d = c.try_acquire_at(now, RequestCost::weight(1), RequestPriority::Normal);
        assert!(!d.granted);
        assert!(matches!(
            d.reason,
            Some(DenyReason::BudgetExhausted { class: EndpointClass::RequestWeight, used: 1440, limit: 1440 })
        ));
        assert_eq!(d.wait_hint, Duration::from_secs(50));

        // higher priority still has room
        assert!(c.try_acquire_at(now, RequestCost::weight(1), RequestPriority::High).granted);

        let next_window = t0() + TimeDelta::seconds(60);
        assert!(c.try_acquire_at(next_window, RequestCost::weight(1), RequestPriority::Normal).granted);
        assert_eq!(c.snapshot().used_weight, 1);
    }

    #[test]
    fn order_budget_is_separate() {
        let c = AdmissionController::new(AdmissionConfig {
            max_orders_per_window: 10,
            ..AdmissionConfig::default()
        });
        c.state.lock().window_start = t0();
        for _ in 0..6 {
            assert!(c.try_acquire_at(t0(), RequestCost::order(1), RequestPriority::Normal).granted);
        }
        let d = c.try_acquire_at(t0(), RequestCost::order(1), RequestPriority::Normal);
        assert!(matches!(
            d.reason,
            Some(DenyReason::BudgetExhausted { class: EndpointClass::Orders, .. })
        ));
        assert!(c.try_acquire_at(t0(), RequestCost::weight(1), RequestPriority::Normal).granted);
    }

    #[test]
    fn ban_denies_normal_and_admits_critical() {
        let c = controller();
        let until = t0() + TimeDelta::seconds(60);
        c.record_rate_limit_error_at(t0(), Some(until));

        let later = t0() + TimeDelta::seconds(30);
        let normal = c.try_acquire_at(later, RequestCost::weight(1), RequestPriority::Normal);
        assert!(!normal.granted);
        assert_eq!(normal.reason, Some(DenyReason::CircuitOpen { banned_until: until }));
        assert_eq!(normal.wait_hint, Duration::from_secs(30));

        let high = c.try_acquire_at(later, RequestCost::weight(1), RequestPriority::High);
        assert!(!high.granted);

        let critical = c.try_acquire_at(later, RequestCost::weight(1), RequestPriority::Critical);
        assert!(critical.granted);
        assert!(critical.bypassed_circuit);
        assert_eq!(c.snapshot().circuit_bypasses, 1);
    }

    #[test]
    fn critical_never_bypasses_budget() {
        let c = controller();
        c.record_rate_limit_error_at(t0(), None);
        let d = c.try_acquire_at(t0(), RequestCost::weight(2281), RequestPriority::Critical);
        assert!(!d.granted);
        assert!(matches!(d.reason, Some(DenyReason::BudgetExhausted { .. })));
    }

    #[test]
    fn ban_expires_and_circuit_closes() {
        let c = controller();
        let until = t0() + TimeDelta::seconds(5);
        c.record_rate_limit_error_at(t0(), Some(until));

        let d = c.try_acquire_at(until, RequestCost::weight(1), RequestPriority::Normal);
        assert!(!d.granted);
        assert!(matches!(d.reason, Some(DenyReason::CircuitOpen { .. })));
        assert!(d.wait_hint > Duration::ZERO);
        assert!(c.is_circuit_open_at(until));

        let after = until + TimeDelta::milliseconds(1);
        let d = c.try_acquire_at(after, RequestCost::weight(1), RequestPriority::Normal);
        assert!(d.granted);
        assert_eq!(c.banned_until(), None);
    }

    #[test]
    fn implausible_server_time_uses_default_ban() {
        let c = controller();
        let past = c.record_rate_limit_error_at(t0(), Some(t0() - TimeDelta::seconds(10)));
        assert_eq!(past, t0() + TimeDelta::seconds(120));

        let c = controller();
        let far = c.record_rate_limit_error_at(t0(), Some(t0() + TimeDelta::days(3)));
        assert_eq!(far, t0() + TimeDelta::seconds(120));
    }

    #[test]
    fn ban_never_shrinks_and_extend_does_not_count_violation() {
        let c = controller();
        c.record_rate_limit_error_at(t0(), Some(t0() + TimeDelta::seconds(300)));
        let until = c.extend_ban_at(t0(), Some(t0() + TimeDelta::seconds(60)));
        assert_eq!(until, t0() + TimeDelta::seconds(300));
        assert_eq!(c.snapshot().consecutive_violations, 1);

        c.record_request(RequestCost::weight(1));
        assert_eq!(c.snapshot().consecutive_violations, 0);
        assert_eq!(c.snapshot().completed_calls, 1);
    }

    #[test]
    fn server_headers_win_when_higher() {
        let c = AdmissionController::new(AdmissionConfig::default());
        c.try_acquire(RequestCost::weight(10), RequestPriority::Normal);
        c.update_from_response_headers(HeaderSnapshot {
            used_weight_1m: Some(1500),
            order_count_1m: Some(3),
        });
        let snap = c.snapshot();
        assert_eq!(snap.used_weight, 1500);
        assert_eq!(snap.used_orders, 3);

        c.update_from_response_headers(HeaderSnapshot {
            used_weight_1m: Some(2),
            order_count_1m: None,
        });
        assert_eq!(c.snapshot().used_weight, 1500);
    }

    #[test]
    fn parses_ban_time_from_message() {
        let msg = "Way too many requests; IP(1.2.3.4) banned until 1760616000000. Please use the websocket.";
        let until = parse_ban_until(msg).unwrap();
        assert_eq!(until.timestamp_millis(), 1_760_616_000_000);
        assert!(parse_ban_until("Too many requests").is_none());
    }

    #[tokio::test]
    async fn wait_for_slot_gives_up_when_ban_outlasts_ceiling() {
        let c = AdmissionController::new(AdmissionConfig::default());
        c.record_rate_limit_error(None);
        let started = Instant::now();
        let err = c
            .wait_for_slot(RequestCost::weight(1), RequestPriority::Normal, Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(1));
        let AdmissionError::Denied { reason, .. } = err;
        assert!(matches!(reason, DenyReason::CircuitOpen { .. }));
    }

    #[tokio::test]
    async fn wait_for_slot_waits_out_short_ban() {
        let c = AdmissionController::new(AdmissionConfig::default());
        let until = Utc::now() + TimeDelta::milliseconds(150);
        c.record_rate_limit_error(Some(until));
        let decision = c
            .wait_for_slot(RequestCost::weight(1), RequestPriority::Normal, Duration::from_secs(2))
            .await
            .unwrap();
        assert!(decision.granted);
        assert!(Utc::now() >= until);
    }
}
