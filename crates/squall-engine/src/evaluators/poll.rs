use crate::{AssertionResult, EvalWindow, Observation, ObservationQuery, ObservationSource};
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::time::Instant;

pub enum PollVerdict {
    Satisfied { observation: Observation, polls: u32 },
    Timeout { polls: u32 },
    Canceled { polls: u32 },
}

/// Shared polling core for every built-in evaluator.
///
/// Samples the surface at the window's cadence until the predicate matches
/// an observation, the deadline passes, or cancellation fires. A zero-width
/// window still gets exactly one poll. Sample failures are absorbed and the
/// loop keeps going until the deadline.
pub async fn poll_until<P>(
    source: &dyn ObservationSource,
    query: &ObservationQuery,
    window: &EvalWindow,
    predicate: P,
) -> PollVerdict
where
    P: Fn(&Observation) -> bool,
{
    let mut polls = 0u32;
    loop {
        polls += 1;
        let sample_budget = window
            .deadline
            .saturating_duration_since(Instant::now())
            .max(window.poll_interval);
        let sampled = tokio::select! {
            _ = window.cancel.cancelled() => return PollVerdict::Canceled { polls },
            result = tokio::time::timeout(sample_budget, source.sample(query)) => result,
        };
        match sampled {
            Ok(Ok(observations)) => {
                let mut hits: Vec<&Observation> = observations
                    .iter()
                    .filter(|observation| predicate(observation))
                    .collect();
                // Several satisfying observations in one poll: the earliest
                // by observation timestamp becomes the evidence.
                hits.sort_by_key(|observation| observation.observed_at);
                if let Some(earliest) = hits.first() {
                    return PollVerdict::Satisfied {
                        observation: (*earliest).clone(),
                        polls,
                    };
                }
            }
            Ok(Err(error)) => {
                tracing::debug!(surface = %query.surface, "observation sample failed: {error}");
            }
            Err(_elapsed) => {
                tracing::debug!(surface = %query.surface, "observation sample timed out");
            }
        }

        let now = Instant::now();
        if now >= window.deadline {
            return PollVerdict::Timeout { polls };
        }
        let wait = window.poll_interval.min(window.deadline.duration_since(now));
        tokio::select! {
            _ = window.cancel.cancelled() => return PollVerdict::Canceled { polls },
            _ = tokio::time::sleep(wait) => {}
        }
    }
}

pub fn verdict_to_result(
    kind: &str,
    evidence_key: &str,
    verdict: PollVerdict,
    started: Instant,
) -> AssertionResult {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let (passed, message, evidence) = match verdict {
        PollVerdict::Satisfied { observation, polls } => {
            let mut evidence = BTreeMap::new();
            evidence.insert(evidence_key.to_string(), observation.data);
            evidence.insert(
                "observed_at".to_string(),
                Value::String(observation.observed_at.to_rfc3339()),
            );
            evidence.insert("polls".to_string(), Value::from(polls));
            (true, "condition observed".to_string(), evidence)
        }
        PollVerdict::Timeout { polls } => {
            let mut evidence = BTreeMap::new();
            evidence.insert("polls".to_string(), Value::from(polls));
            (false, "timeout".to_string(), evidence)
        }
        PollVerdict::Canceled { polls } => {
            let mut evidence = BTreeMap::new();
            evidence.insert("polls".to_string(), Value::from(polls));
            (false, "canceled".to_string(), evidence)
        }
    };
    AssertionResult {
        kind: kind.to_string(),
        passed,
        message,
        timestamp: Utc::now(),
        evidence,
        elapsed_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProbeError;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    struct ScriptedSource {
        pass_on_poll: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ObservationSource for ScriptedSource {
        async fn sample(&self, _query: &ObservationQuery) -> Result<Vec<Observation>, ProbeError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.pass_on_poll {
                Ok(vec![
                    Observation {
                        observed_at: Utc::now(),
                        data: json!({"status": "healthy", "order": "late"}),
                    },
                    Observation {
                        observed_at: Utc::now() - ChronoDuration::seconds(10),
                        data: json!({"status": "healthy", "order": "early"}),
                    },
                ])
            } else {
                Ok(vec![])
            }
        }
    }

    fn window(deadline_ms: u64, poll_ms: u64) -> EvalWindow {
        let now = Instant::now();
        EvalWindow {
            phase_start: now,
            deadline: now + Duration::from_millis(deadline_ms),
            poll_interval: Duration::from_millis(poll_ms),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn poll_until_expected_earliest_observation_wins() {
        let source = ScriptedSource {
            pass_on_poll: 1,
            calls: AtomicU32::new(0),
        };
        let verdict = poll_until(
            &source,
            &ObservationQuery::surface("health"),
            &window(1_000, 100),
            |observation| observation.data["status"] == "healthy",
        )
        .await;

        match verdict {
            PollVerdict::Satisfied { observation, polls } => {
                assert_eq!(polls, 1);
                assert_eq!(observation.data["order"], "early");
            }
            _ => panic!("expected satisfied verdict"),
        }
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn poll_until_zero_width_window_expected_single_poll() {
        let source = ScriptedSource {
            pass_on_poll: 2,
            calls: AtomicU32::new(0),
        };
        let verdict = poll_until(
            &source,
            &ObservationQuery::surface("health"),
            &window(0, 100),
            |observation| observation.data["status"] == "healthy",
        )
        .await;

        match verdict {
            PollVerdict::Timeout { polls } => assert_eq!(polls, 1),
            _ => panic!("expected timeout verdict"),
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn poll_until_condition_appears_later_expected_multiple_polls() {
        let source = ScriptedSource {
            pass_on_poll: 3,
            calls: AtomicU32::new(0),
        };
        let verdict = poll_until(
            &source,
            &ObservationQuery::surface("health"),
            &window(5_000, 100),
            |observation| observation.data["status"] == "healthy",
        )
        .await;

        match verdict {
            PollVerdict::Satisfied { polls, .. } => assert_eq!(polls, 3),
            _ => panic!("expected satisfied verdict"),
        }
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn poll_until_cancel_expected_canceled_verdict() {
        let source = ScriptedSource {
            pass_on_poll: u32::MAX,
            calls: AtomicU32::new(0),
        };
        let window = window(60_000, 100);
        let cancel = window.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            cancel.cancel();
        });

        let verdict = poll_until(
            &source,
            &ObservationQuery::surface("health"),
            &window,
            |_| false,
        )
        .await;
        assert!(matches!(verdict, PollVerdict::Canceled { .. }));
    }
}
