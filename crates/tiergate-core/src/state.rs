//! Pipeline state store.
//!
//! Keyed, append-only record of in-flight and completed pipeline runs. The
//! outer map lock is held only long enough to insert or look up an entry;
//! transitions for one id are serialized by that entry's own mutex, so
//! readers of other ids never wait on them. Lifecycle rules are enforced
//! here rather than by callers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::Utc;
use tokio::sync::watch;
use tracing::debug;

use crate::domain::{
    Decision, PipelineId, PipelineState, PipelineStatus, StageTransition, Tier,
};
use crate::error::{GateError, GateResult};

struct Entry {
    state: Mutex<PipelineState>,
    status_tx: watch::Sender<PipelineStatus>,
}

impl Entry {
    fn lock(&self) -> MutexGuard<'_, PipelineState> {
        // Every write below completes before the guard drops, so a poisoned
        // lock still holds a consistent state.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// In-memory store of pipeline states.
#[derive(Default)]
pub struct PipelineStateStore {
    entries: RwLock<HashMap<PipelineId, Arc<Entry>>>,
}

impl PipelineStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new running pipeline for `tier` and return its id.
    pub fn create(&self, tier: Tier) -> PipelineId {
        let id = PipelineId::new();
        let now = Utc::now();
        let state = PipelineState {
            id,
            tier,
            status: PipelineStatus::Running,
            stage: "created".to_string(),
            decision: None,
            error: None,
            history: vec![StageTransition {
                stage: "created".to_string(),
                status: PipelineStatus::Running,
                note: None,
                at: now,
            }],
            created_at: now,
            updated_at: now,
        };
        let (status_tx, _) = watch::channel(PipelineStatus::Running);
        let entry = Arc::new(Entry {
            state: Mutex::new(state),
            status_tx,
        });
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, entry);
        debug!(pipeline_id = %id, tier = %tier, "pipeline state created");
        id
    }

    fn entry(&self, id: PipelineId) -> GateResult<Arc<Entry>> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
            .ok_or(GateError::PipelineNotFound(id))
    }

    /// Snapshot of one pipeline.
    pub fn get(&self, id: PipelineId) -> GateResult<PipelineState> {
        let entry = self.entry(id)?;
        let state = entry.lock().clone();
        Ok(state)
    }

    /// Snapshots of every pipeline, oldest first.
    pub fn list(&self) -> Vec<PipelineState> {
        let entries: Vec<Arc<Entry>> = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        let mut states: Vec<PipelineState> = entries.iter().map(|e| e.lock().clone()).collect();
        states.sort_by_key(|s| s.created_at);
        states
    }

    /// Watch a pipeline's status.
    pub fn subscribe(&self, id: PipelineId) -> GateResult<watch::Receiver<PipelineStatus>> {
        Ok(self.entry(id)?.status_tx.subscribe())
    }

    /// Record that a running pipeline entered `stage`.
    pub fn set_stage(&self, id: PipelineId, stage: &str) -> GateResult<()> {
        let entry = self.entry(id)?;
        let mut state = entry.lock();
        if state.status.is_terminal() {
            return Err(GateError::InvalidTransition {
                id,
                from: state.status,
                to: PipelineStatus::Running,
            });
        }
        let now = Utc::now();
        state.stage = stage.to_string();
        state.updated_at = now;
        state.history.push(StageTransition {
            stage: stage.to_string(),
            status: PipelineStatus::Running,
            note: None,
            at: now,
        });
        Ok(())
    }

    pub fn complete(&self, id: PipelineId, decision: Decision) -> GateResult<()> {
        let note = format!("{} ({})", decision.verdict(), decision.id());
        self.finish(id, PipelineStatus::Completed, "completed", Some(note), |s| {
            s.decision = Some(decision);
        })
    }

    pub fn fail(&self, id: PipelineId, reason: &str) -> GateResult<()> {
        let reason = reason.to_string();
        self.finish(id, PipelineStatus::Failed, "failed", Some(reason.clone()), |s| {
            s.error = Some(reason);
        })
    }

    /// Cancel a running pipeline. Returns `false` if it had already finished.
    pub fn cancel(&self, id: PipelineId, reason: &str) -> GateResult<bool> {
        let reason = reason.to_string();
        match self.finish(id, PipelineStatus::Cancelled, "cancelled", Some(reason.clone()), |s| {
            s.error = Some(reason);
        }) {
            Ok(()) => Ok(true),
            Err(GateError::InvalidTransition { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn finish(
        &self,
        id: PipelineId,
        to: PipelineStatus,
        stage: &str,
        note: Option<String>,
        apply: impl FnOnce(&mut PipelineState),
    ) -> GateResult<()> {
        let entry = self.entry(id)?;
        let mut state = entry.lock();
        if !state.status.can_transition_to(to) {
            return Err(GateError::InvalidTransition {
                id,
                from: state.status,
                to,
            });
        }
        let now = Utc::now();
        apply(&mut *state);
        state.status = to;
        state.stage = stage.to_string();
        state.updated_at = now;
        state.history.push(StageTransition {
            stage: stage.to_string(),
            status: to,
            note,
            at: now,
        });
        drop(state);
        entry.status_tx.send_replace(to);
        debug!(pipeline_id = %id, status = %to, "pipeline finished");
        Ok(())
    }
}

impl std::fmt::Debug for PipelineStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self.entries.read().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("PipelineStateStore")
            .field("pipelines", &len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::DecisionAggregator;
    use crate::domain::Opinion;

    fn decision() -> Decision {
        DecisionAggregator::default().decide(
            Tier::Standard,
            &[Opinion::new("a", true, "ok", 0.1, Utc::now())],
        )
    }

    #[test]
    fn test_lifecycle_records_history() {
        let store = PipelineStateStore::new();
        let id = store.create(Tier::Standard);
        store.set_stage(id, "consulting").unwrap();
        store.complete(id, decision()).unwrap();

        let s = store.get(id).unwrap();
        assert_eq!(s.status, PipelineStatus::Completed);
        let stages: Vec<&str> = s.history.iter().map(|t| t.stage.as_str()).collect();
        assert_eq!(stages, vec!["created", "consulting", "completed"]);
    }

    #[test]
    fn test_no_transition_out_of_terminal() {
        let store = PipelineStateStore::new();
        let id = store.create(Tier::Fast);
        store.fail(id, "boom").unwrap();

        assert!(matches!(
            store.complete(id, decision()),
            Err(GateError::InvalidTransition { .. })
        ));
        assert!(matches!(
            store.set_stage(id, "consulting"),
            Err(GateError::InvalidTransition { .. })
        ));
        assert!(!store.cancel(id, "late").unwrap());
        assert_eq!(store.get(id).unwrap().status, PipelineStatus::Failed);
    }

    #[test]
    fn test_unknown_id() {
        let store = PipelineStateStore::new();
        let id = PipelineId::new();
        assert!(matches!(store.get(id), Err(GateError::PipelineNotFound(_))));
        assert!(matches!(store.cancel(id, "x"), Err(GateError::PipelineNotFound(_))));
    }

    #[test]
    fn test_stored_decision_equals_original() {
        let store = PipelineStateStore::new();
        let id = store.create(Tier::Standard);
        let d = decision();
        store.complete(id, d.clone()).unwrap();
        let fetched = store.get(id).unwrap().decision.unwrap();
        assert_eq!(fetched, d);
        assert_eq!(
            serde_json::to_vec(&fetched).unwrap(),
            serde_json::to_vec(&d).unwrap()
        );
    }

    #[tokio::test]
    async fn test_subscribe_sees_terminal_status() {
        let store = PipelineStateStore::new();
        let id = store.create(Tier::Standard);
        let mut rx = store.subscribe(id).unwrap();
        store.cancel(id, "operator").unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), PipelineStatus::Cancelled);
    }

    #[test]
    fn test_list_is_ordered() {
        let store = PipelineStateStore::new();
        let a = store.create(Tier::Fast);
        let b = store.create(Tier::Exhaustive);
        let ids: Vec<PipelineId> = store.list().iter().map(|s| s.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a) && ids.contains(&b));
    }
}
