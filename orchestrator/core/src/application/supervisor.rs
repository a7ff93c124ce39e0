// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! Agent Supervisor
//!
//! Wraps a single agent invocation with the engine's resilience policy:
//! a per-attempt deadline, bounded retries with exponential backoff and
//! jitter for transient failures, and cooperative cancellation. Permanent
//! failures and exhausted retry budgets surface as
//! [`AgentError::Unavailable`]; the coordinator decides whether the run
//! continues degraded.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::agent::{Agent, AgentError, AgentInput, AgentResult};
use crate::domain::config::RetryConfig;

/// Run one supervised agent invocation.
///
/// Each attempt is bounded by `timeout`; a timed-out attempt counts as a
/// transient failure. Cancellation wins over any in-flight attempt or
/// backoff sleep.
pub async fn invoke_supervised(
    agent: &dyn Agent,
    input: AgentInput,
    timeout: Duration,
    retry: &RetryConfig,
    cancel: &CancellationToken,
) -> Result<AgentResult, AgentError> {
    let kind = agent.kind();
    let mut last_error = String::new();

    for attempt in 0..retry.max_attempts {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let started = std::time::Instant::now();
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            outcome = tokio::time::timeout(timeout, agent.analyze(input.clone())) => outcome,
        };

        let error = match outcome {
            Ok(Ok(result)) => {
                metrics::histogram!("agent_invocation_seconds", "agent" => kind.as_str())
                    .record(started.elapsed().as_secs_f64());
                debug!(agent = %kind, attempt, "Agent invocation succeeded");
                return Ok(result);
            }
            Ok(Err(err)) => err,
            Err(_) => AgentError::Timeout {
                agent: kind,
                timeout,
            },
        };

        if !error.is_transient() {
            warn!(agent = %kind, attempt, error = %error, "Agent failed permanently");
            return Err(error);
        }

        last_error = error.to_string();
        metrics::counter!("agent_retries_total", "agent" => kind.as_str()).increment(1);
        warn!(agent = %kind, attempt, error = %last_error, "Transient agent failure");

        // No backoff after the final attempt.
        if attempt + 1 < retry.max_attempts {
            let delay = backoff_delay(retry, attempt);
            tokio::select! {
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    Err(AgentError::Unavailable {
        agent: kind,
        attempts: retry.max_attempts,
        last_error,
    })
}

/// Exponential backoff with symmetric jitter: `base * 2^attempt`, scaled
/// by a random factor in `[1 - jitter, 1 + jitter]`.
fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    let base = retry.base_delay.as_secs_f64() * 2f64.powi(attempt as i32);
    let factor = if retry.jitter > 0.0 {
        1.0 + rand::rng().random_range(-retry.jitter..=retry.jitter)
    } else {
        1.0
    };
    Duration::from_secs_f64((base * factor).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{AgentId, AgentKind, AgentPayload, AnomalyReport};
    use crate::domain::scenario::{ScenarioRequest, Severity};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyAgent {
        calls: AtomicU32,
        fail_first: u32,
        permanent: bool,
    }

    impl FlakyAgent {
        fn new(fail_first: u32, permanent: bool) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_first,
                permanent,
            }
        }
    }

    #[async_trait]
    impl Agent for FlakyAgent {
        fn kind(&self) -> AgentKind {
            AgentKind::Info
        }

        async fn analyze(&self, _input: AgentInput) -> Result<AgentResult, AgentError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                if self.permanent {
                    return Err(AgentError::Internal("model rejected input".into()));
                }
                return Err(AgentError::Transport("connection reset".into()));
            }
            Ok(AgentResult::new(
                AgentId::new(),
                AgentPayload::Info(AnomalyReport { anomalies: vec![] }),
                0.9,
            ))
        }
    }

    struct StuckAgent;

    #[async_trait]
    impl Agent for StuckAgent {
        fn kind(&self) -> AgentKind {
            AgentKind::Impact
        }

        async fn analyze(&self, _input: AgentInput) -> Result<AgentResult, AgentError> {
            std::future::pending().await
        }
    }

    fn input() -> AgentInput {
        AgentInput::stage_one(
            ScenarioRequest {
                disruption_type: "strike".to_string(),
                location: "hub-west".to_string(),
                severity: Severity::Low,
                duration_days: 2,
                affected_nodes: vec!["w-1".to_string()],
                weights: None,
                idempotency_key: None,
            },
            None,
        )
    }

    fn retry() -> RetryConfig {
        RetryConfig {
            base_delay: Duration::from_millis(10),
            max_attempts: 3,
            jitter: 0.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_until_success() {
        let agent = FlakyAgent::new(2, false);
        let result = invoke_supervised(
            &agent,
            input(),
            Duration::from_secs(1),
            &retry(),
            &CancellationToken::new(),
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(agent.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_reports_unavailable() {
        let agent = FlakyAgent::new(10, false);
        let err = invoke_supervised(
            &agent,
            input(),
            Duration::from_secs(1),
            &retry(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        match err {
            AgentError::Unavailable { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected unavailable, got {:?}", other),
        }
        assert_eq!(agent.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failures_are_not_retried() {
        let agent = FlakyAgent::new(10, true);
        let err = invoke_supervised(
            &agent,
            input(),
            Duration::from_secs(1),
            &retry(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AgentError::Internal(_)));
        assert_eq!(agent.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_agent_times_out_per_attempt() {
        let err = invoke_supervised(
            &StuckAgent,
            input(),
            Duration::from_millis(50),
            &retry(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AgentError::Unavailable { attempts: 3, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_wins_over_inflight_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = invoke_supervised(
            &StuckAgent,
            input(),
            Duration::from_secs(60),
            &retry(),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }
}
