//! `Policy{fail_fast, timeout, retry, on_error}`: validation, merging, and
//! the retry/timeout loop the scheduler drives node execution through.
//!
//! Ported from `original_source/src/illumo_flow/policy.py` (`Policy`, `Retry`,
//! `OnError`, `_merge_policy`, `_parse_duration_seconds`) into the teacher's
//! async idiom — `tokio::time::{sleep, timeout}` instead of Python's
//! synchronous `time.sleep`.

use std::time::Duration;

use tracing::instrument;

use crate::error::{LadderError, PolicyError};
use crate::tracer::{SpanKind, SpanStatus, Tracer};
use crate::types::NodeId;

/// Retry mode: `fixed` delay per attempt, or `exponential` backoff
/// (`delay * 2^(attempt-1)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryMode {
    Fixed,
    Exponential,
}

impl Default for RetryMode {
    fn default() -> Self {
        Self::Fixed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Retry {
    pub max_attempts: u32,
    pub delay: Duration,
    pub mode: RetryMode,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            delay: Duration::ZERO,
            mode: RetryMode::Fixed,
        }
    }
}

impl Retry {
    /// Delay to sleep before the given 1-indexed attempt (i.e. before retry
    /// number `attempt`), per §4.4: "delay (fixed) or delay * 2^(attempt-1)
    /// (exponential)".
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self.mode {
            RetryMode::Fixed => self.delay,
            RetryMode::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.delay.saturating_mul(factor)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnErrorAction {
    Stop,
    Continue,
    Goto,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OnError {
    pub action: OnErrorAction,
    pub target: Option<NodeId>,
}

impl Default for OnError {
    fn default() -> Self {
        Self {
            action: OnErrorAction::Stop,
            target: None,
        }
    }
}

impl OnError {
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.action == OnErrorAction::Goto && self.target.is_none() {
            return Err(PolicyError::GotoWithoutTarget);
        }
        Ok(())
    }
}

/// `{fail_fast, timeout, retry, on_error}`, resolved top-down: global
/// runtime policy first, then a per-node override shallow-merged on top
/// (§4.4).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Policy {
    pub fail_fast: bool,
    pub timeout: Duration,
    pub retry: Retry,
    pub on_error: OnError,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            fail_fast: true,
            timeout: Duration::ZERO,
            retry: Retry::default(),
            on_error: OnError::default(),
        }
    }
}

impl Policy {
    pub fn validate(&self) -> Result<(), PolicyError> {
        self.on_error.validate()
    }

    /// Shallow-merges `override_policy` on top of `self` (the global
    /// default): `fail_fast`/`timeout` merge per-field, `retry`/`on_error`
    /// replace wholesale when present, per §4.4.
    #[must_use]
    pub fn merged_with(&self, override_policy: &PolicyOverride) -> Policy {
        Policy {
            fail_fast: override_policy.fail_fast.unwrap_or(self.fail_fast),
            timeout: override_policy.timeout.unwrap_or(self.timeout),
            retry: override_policy.retry.clone().unwrap_or_else(|| self.retry.clone()),
            on_error: override_policy
                .on_error
                .clone()
                .unwrap_or_else(|| self.on_error.clone()),
        }
    }
}

/// A per-node policy override; any field left `None` falls back to the
/// global runtime policy.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PolicyOverride {
    pub fail_fast: Option<bool>,
    pub timeout: Option<Duration>,
    pub retry: Option<Retry>,
    pub on_error: Option<OnError>,
}

/// Parses the `"250ms"`/`"5s"`/`"1m"`/`"1h"`/bare-number grammar from §6,
/// following `_parse_duration_seconds` in the original source literally
/// (§10.5 of the expanded spec).
pub fn parse_duration(text: &str) -> Result<Duration, PolicyError> {
    let trimmed = text.trim().to_ascii_lowercase();
    if trimmed.is_empty() || trimmed == "0" || trimmed == "0s" {
        return Ok(Duration::ZERO);
    }
    let (number_part, factor) = if let Some(n) = trimmed.strip_suffix("ms") {
        (n, 0.001)
    } else if let Some(n) = trimmed.strip_suffix('s') {
        (n, 1.0)
    } else if let Some(n) = trimmed.strip_suffix('m') {
        (n, 60.0)
    } else if let Some(n) = trimmed.strip_suffix('h') {
        (n, 3600.0)
    } else {
        (trimmed.as_str(), 1.0)
    };
    let number: f64 = number_part
        .parse()
        .map_err(|_| PolicyError::BadDuration(text.to_string()))?;
    let seconds = (number * factor).max(0.0);
    Ok(Duration::from_secs_f64(seconds))
}

/// Outcome of running one node attempt through the policy engine.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The attempt succeeded (possibly after retries).
    Success { value: T, attempts: u32 },
    /// Retries are exhausted; `on_error` has been consulted and the caller
    /// should act on `recovery`.
    Failed {
        attempts: u32,
        recovery: OnErrorAction,
        timed_out: bool,
    },
}

/// Drives `operation` through the retry/timeout loop described in §4.4.
///
/// `operation`'s first attempt always runs; on failure it retries while
/// `attempts_so_far < policy.retry.max_attempts`, so `max_attempts = 0` (or
/// `1`) runs it exactly once with no retry, and `max_attempts = N > 1` runs
/// it at most `N` times total. Each attempt is bounded by `policy.timeout`
/// when it is non-zero.
///
/// Opens one `node`-kind span per attempt on `tracer` (§4.6: "node (one per
/// node attempt, including retries)"), carrying the effective policy as the
/// `policy_snapshot` attribute (§4.4 "Every policy decision is recorded as a
/// span attribute `policy_snapshot`").
#[instrument(skip(policy, tracer, operation), fields(node = %node, max_attempts = policy.retry.max_attempts))]
pub async fn run_with_policy<T, E, F, Fut>(
    node: &NodeId,
    policy: &Policy,
    tracer: &dyn Tracer,
    mut operation: F,
) -> Outcome<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let policy_snapshot = serde_json::to_value(policy).unwrap_or(serde_json::Value::Null);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let span = tracer.start_span(
            node.as_str(),
            SpanKind::Node,
            serde_json::json!({ "attempt": attempt, "policy_snapshot": policy_snapshot }),
        );

        let mut succeeded = None;
        let mut timed_out = false;

        if policy.timeout.is_zero() {
            match operation().await {
                Ok(value) => succeeded = Some(value),
                Err(err) => {
                    tracing::debug!(node = %node, attempt, error = %err, "node attempt failed");
                    tracer.end_span(span, SpanStatus::Error, Some(LadderError::msg(err.to_string())));
                }
            }
        } else {
            match tokio::time::timeout(policy.timeout, operation()).await {
                Ok(Ok(value)) => succeeded = Some(value),
                Ok(Err(err)) => {
                    tracing::debug!(node = %node, attempt, error = %err, "node attempt failed");
                    tracer.end_span(span, SpanStatus::Error, Some(LadderError::msg(err.to_string())));
                }
                Err(_) => {
                    tracing::warn!(node = %node, attempt, "node attempt timed out");
                    tracer.end_span(span, SpanStatus::Error, Some(LadderError::msg("timeout")));
                    timed_out = true;
                }
            }
        }

        if let Some(value) = succeeded {
            tracer.end_span(span, SpanStatus::Ok, None);
            return Outcome::Success { value, attempts: attempt };
        }

        if attempt < policy.retry.max_attempts {
            let delay = policy.retry.delay_for_attempt(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            continue;
        }

        let recovery = if policy.fail_fast {
            OnErrorAction::Stop
        } else {
            policy.on_error.action.clone()
        };
        return Outcome::Failed {
            attempts: attempt,
            recovery,
            timed_out,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracer::InMemoryTracer;

    #[test]
    fn duration_grammar() {
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("2.5").unwrap(), Duration::from_secs_f64(2.5));
    }

    #[test]
    fn exponential_backoff_doubles() {
        let retry = Retry {
            max_attempts: 3,
            delay: Duration::from_millis(100),
            mode: RetryMode::Exponential,
        };
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(retry.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn goto_without_target_is_invalid() {
        let on_error = OnError {
            action: OnErrorAction::Goto,
            target: None,
        };
        assert!(on_error.validate().is_err());
    }

    #[test]
    fn merge_replaces_retry_wholesale_when_present() {
        let base = Policy::default();
        let override_policy = PolicyOverride {
            retry: Some(Retry {
                max_attempts: 2,
                delay: Duration::ZERO,
                mode: RetryMode::Fixed,
            }),
            ..Default::default()
        };
        let merged = base.merged_with(&override_policy);
        assert_eq!(merged.retry.max_attempts, 2);
        assert_eq!(merged.fail_fast, base.fail_fast);
    }

    #[tokio::test]
    async fn retry_recovers_on_second_attempt() {
        let node = NodeId::new("node").unwrap();
        let policy = Policy {
            retry: Retry {
                max_attempts: 2,
                delay: Duration::ZERO,
                mode: RetryMode::Fixed,
            },
            ..Default::default()
        };
        let tracer = InMemoryTracer::new("t1", "flowcore");
        let mut calls = 0;
        let outcome = run_with_policy(&node, &policy, &tracer, || {
            calls += 1;
            let call = calls;
            async move {
                if call == 1 {
                    Err::<&str, &str>("boom")
                } else {
                    Ok("recovered")
                }
            }
        })
        .await;
        match outcome {
            Outcome::Success { value, attempts } => {
                assert_eq!(value, "recovered");
                assert_eq!(attempts, 2);
            }
            Outcome::Failed { .. } => panic!("expected success on retry"),
        }
        assert_eq!(tracer.spans().len(), 2);
    }

    #[tokio::test]
    async fn max_attempts_zero_runs_exactly_once() {
        let node = NodeId::new("node").unwrap();
        let policy = Policy::default();
        let tracer = InMemoryTracer::new("t1", "flowcore");
        let mut calls = 0;
        let outcome = run_with_policy(&node, &policy, &tracer, || {
            calls += 1;
            async move { Err::<(), &str>("always fails") }
        })
        .await;
        assert_eq!(calls, 1);
        match outcome {
            Outcome::Failed { attempts, .. } => assert_eq!(attempts, 1),
            Outcome::Success { .. } => panic!("expected failure"),
        }
        assert_eq!(tracer.spans().len(), 1);
    }

    #[tokio::test]
    async fn exhausting_retries_runs_exactly_max_attempts_times() {
        let node = NodeId::new("node").unwrap();
        let policy = Policy {
            retry: Retry {
                max_attempts: 3,
                delay: Duration::ZERO,
                mode: RetryMode::Fixed,
            },
            ..Policy::default()
        };
        let tracer = InMemoryTracer::new("t1", "flowcore");
        let mut calls = 0;
        let outcome = run_with_policy(&node, &policy, &tracer, || {
            calls += 1;
            async move { Err::<(), &str>("always fails") }
        })
        .await;
        assert_eq!(calls, 3);
        match outcome {
            Outcome::Failed { attempts, .. } => assert_eq!(attempts, 3),
            Outcome::Success { .. } => panic!("expected failure"),
        }
        assert_eq!(tracer.spans().len(), 3);
    }
}
