//! Consultation orchestrator: fans a change out to consultants under the
//! tier's time budget and collects whatever opinions come back.
//!
//! Every consultant call runs in its own spawned task so that a timeout can
//! abort the call itself rather than just the wait. Failures never escape
//! [`ConsultationOrchestrator::run`]; they are translated into omissions (or a
//! fail-closed rejection on the fast tier).

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, instrument, warn};

use crate::adapter::{AnalysisEngine, AnalysisReport, AnalysisTarget};
use crate::config::OrchestrationConfig;
use crate::consultant::{Consultant, ConsultantRegistry};
use crate::domain::{ChangeContext, Opinion, Tier};
use crate::error::{GateError, GateResult};
use crate::metrics::METRICS;
use crate::obs;

const ORCHESTRATOR_ID: &str = "orchestrator";

/// Runs consultations for one tier at a time. Holds no per-run state.
#[derive(Debug, Clone, Default)]
pub struct ConsultationOrchestrator {
    config: OrchestrationConfig,
}

impl ConsultationOrchestrator {
    pub fn new(config: OrchestrationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OrchestrationConfig {
        &self.config
    }

    /// Consult the tier's consultant set and return the opinions that arrived,
    /// sorted by consultant id.
    ///
    /// - `Fast`: the designated risk consultant alone under `fast_budget`;
    ///   timeout, failure, or no designated consultant yields a fail-closed
    ///   rejection.
    /// - `Standard`: all consultants concurrently under `standard_timeout`;
    ///   stragglers and failures are omitted.
    /// - `Exhaustive`: all consultants concurrently with no overall timeout;
    ///   failures are retried, risky opinions get a deep-analysis round.
    #[instrument(skip_all, fields(tier = %tier, consultants = registry.len()))]
    pub async fn run(
        &self,
        tier: Tier,
        ctx: Arc<ChangeContext>,
        registry: &ConsultantRegistry,
    ) -> Vec<Opinion> {
        let start = Instant::now();
        let requested = if tier.uses_full_council() {
            registry.len()
        } else {
            1
        };

        let mut opinions = match tier {
            Tier::Fast => self.run_fast(ctx, registry).await,
            Tier::Standard => self.run_standard(ctx, registry).await,
            Tier::Exhaustive => self.run_exhaustive(ctx, registry).await,
        };
        opinions.sort_by(|a, b| a.consultant.cmp(&b.consultant));

        obs::emit_consultation_finished(
            tier,
            requested,
            opinions.len(),
            start.elapsed().as_millis() as u64,
        );
        opinions
    }

    async fn run_fast(&self, ctx: Arc<ChangeContext>, registry: &ConsultantRegistry) -> Vec<Opinion> {
        let Some(consultant) = registry.designated_risk() else {
            warn!("no risk-focused consultant registered; failing closed");
            return vec![Opinion::fail_closed(
                ORCHESTRATOR_ID,
                "no risk-focused consultant registered; failing closed",
            )];
        };

        let id = consultant.id().to_string();
        let budget = self.config.fast_budget();
        let opinion = match self.consult_once(consultant, ctx, Some(budget)).await {
            Ok(opinion) => opinion,
            Err(GateError::ConsultationTimeout { budget_ms, .. }) => Opinion::fail_closed(
                id,
                format!("no answer within {budget_ms}ms; failing closed"),
            ),
            Err(e) => Opinion::fail_closed(id, format!("{e}; failing closed")),
        };
        vec![opinion]
    }

    async fn run_standard(
        &self,
        ctx: Arc<ChangeContext>,
        registry: &ConsultantRegistry,
    ) -> Vec<Opinion> {
        let budget = self.config.standard_timeout();
        let calls = registry
            .all()
            .iter()
            .map(|c| self.consult_once(Arc::clone(c), Arc::clone(&ctx), Some(budget)));

        join_all(calls)
            .await
            .into_iter()
            .filter_map(|r| match r {
                Ok(opinion) => Some(opinion),
                Err(e) => {
                    debug!(error = %e, "dropping consultant from standard tier");
                    None
                }
            })
            .collect()
    }

    async fn run_exhaustive(
        &self,
        ctx: Arc<ChangeContext>,
        registry: &ConsultantRegistry,
    ) -> Vec<Opinion> {
        let calls = registry
            .all()
            .iter()
            .map(|c| self.consult_thoroughly(Arc::clone(c), Arc::clone(&ctx)));

        join_all(calls).await.into_iter().flatten().collect()
    }

    /// Exhaustive-tier consultation: retry failures, then deepen risky opinions.
    async fn consult_thoroughly(
        &self,
        consultant: Arc<dyn Consultant>,
        ctx: Arc<ChangeContext>,
    ) -> Option<Opinion> {
        let attempts = 1 + self.config.exhaustive_retries;
        let mut first = None;
        for attempt in 1..=attempts {
            match self
                .consult_once(Arc::clone(&consultant), Arc::clone(&ctx), None)
                .await
            {
                Ok(opinion) => {
                    first = Some(opinion);
                    break;
                }
                Err(e) if attempt < attempts => {
                    warn!(consultant = %consultant.id(), attempt, error = %e, "retrying consultant");
                }
                Err(e) => {
                    warn!(consultant = %consultant.id(), error = %e, "dropping consultant after retries");
                }
            }
        }
        let first = first?;

        if first.risk <= self.config.deep_analysis_risk {
            return Some(first);
        }

        debug!(consultant = %consultant.id(), risk = first.risk, "running deep analysis round");
        let id = consultant.id().to_string();
        let ctx_deep = Arc::clone(&ctx);
        let prior = first.clone();
        let deep = self
            .bounded(&id, None, async move {
                consultant.deep_consult(&ctx_deep, &prior).await
            })
            .await;

        match deep {
            Ok(opinion) => Some(stamp(&id, opinion)),
            Err(e) => {
                warn!(consultant = %id, error = %e, "deep analysis failed; keeping first opinion");
                Some(first)
            }
        }
    }

    async fn consult_once(
        &self,
        consultant: Arc<dyn Consultant>,
        ctx: Arc<ChangeContext>,
        budget: Option<Duration>,
    ) -> GateResult<Opinion> {
        let id = consultant.id().to_string();
        let opinion = self
            .bounded(&id, budget, async move { consultant.consult(&ctx).await })
            .await?;
        Ok(stamp(&id, opinion))
    }

    /// Run every engine concurrently under `engine_timeout`; failed or slow
    /// engines are omitted from the result.
    #[instrument(skip_all, fields(engines = engines.len()))]
    pub async fn run_engines(
        &self,
        engines: &[Arc<dyn AnalysisEngine>],
        target: Arc<AnalysisTarget>,
    ) -> Vec<AnalysisReport> {
        let budget = self.config.engine_timeout();
        let calls = engines.iter().map(|engine| {
            let engine = Arc::clone(engine);
            let target = Arc::clone(&target);
            let name = engine.name().to_string();
            async move {
                self.bounded(&name, Some(budget), async move { engine.run(&target).await })
                    .await
            }
        });

        join_all(calls)
            .await
            .into_iter()
            .filter_map(|r| match r {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(error = %e, "analysis engine omitted");
                    None
                }
            })
            .collect()
    }

    /// Spawn `fut` and await it, optionally under `budget`.
    ///
    /// On timeout the task is aborted and the caller gets the error at once.
    /// A detached watcher gives the task `cancellation_grace` to wind down and
    /// reports it as a contract violation if it is still running after that.
    async fn bounded<T, F>(&self, label: &str, budget: Option<Duration>, fut: F) -> GateResult<T>
    where
        T: Send + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let mut handle = tokio::spawn(fut);
        // Abandoning this future (pipeline cancellation) must stop the task too.
        let _abort = AbortOnDrop(handle.abort_handle());

        let joined = match budget {
            None => (&mut handle).await,
            Some(budget) => match tokio::time::timeout(budget, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    let budget_ms = budget.as_millis() as u64;
                    METRICS.inc_consultant_timeouts();
                    obs::emit_consultant_timeout(label, budget_ms);
                    self.abort_and_reap(label, handle);
                    return Err(GateError::ConsultationTimeout {
                        consultant: label.to_string(),
                        budget_ms,
                    });
                }
            },
        };

        match joined {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                METRICS.inc_consultant_failures();
                Err(GateError::ConsultationFailure {
                    consultant: label.to_string(),
                    reason: format!("{e:#}"),
                })
            }
            Err(join_err) => {
                METRICS.inc_consultant_failures();
                let reason = if join_err.is_panic() {
                    "panicked".to_string()
                } else {
                    join_err.to_string()
                };
                Err(GateError::ConsultationFailure {
                    consultant: label.to_string(),
                    reason,
                })
            }
        }
    }

    fn abort_and_reap<T: Send + 'static>(&self, label: &str, handle: JoinHandle<T>) {
        handle.abort();
        let grace = self.config.cancellation_grace();
        let label = label.to_string();
        tokio::spawn(async move {
            if tokio::time::timeout(grace, handle).await.is_err() {
                METRICS.inc_cancellation_violations();
                obs::emit_cancellation_ignored(&label, grace.as_millis() as u64);
            }
        });
    }
}

struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Force the opinion's identity to the consultant that was actually invoked,
/// so there is exactly one opinion per consultant.
fn stamp(id: &str, opinion: Opinion) -> Opinion {
    if opinion.consultant == id {
        opinion
    } else {
        Opinion {
            consultant: id.to_string(),
            ..opinion
        }
    }
}
