//! The stage runner.
//!
//! Stages run strictly one at a time in the fixed order
//! `Fetch → Distill → Curate → Produce → Review → Deliver`, with a single
//! back-edge from `Review` to `Produce`. The loop is an explicit state
//! machine; `Produce` is refused once it has run `max_attempts + 1` times.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::pipeline::state::{PipelineState, StageName};
use crate::quality::{QualityGate, Verdict};

/// One pipeline step. Takes the state and returns it updated.
///
/// Implementations never fail: a stage that cannot finish its work writes a
/// well-formed fallback into the field it owns and leaves a note.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> StageName;

    async fn run(&self, state: PipelineState) -> PipelineState;
}

/// The six stages, one per slot.
#[derive(Clone)]
pub struct Stages {
    pub fetch: Arc<dyn Stage>,
    pub distill: Arc<dyn Stage>,
    pub curate: Arc<dyn Stage>,
    pub produce: Arc<dyn Stage>,
    pub review: Arc<dyn Stage>,
    pub deliver: Arc<dyn Stage>,
}

impl Stages {
    fn get(&self, name: StageName) -> &Arc<dyn Stage> {
        match name {
            StageName::Fetch => &self.fetch,
            StageName::Distill => &self.distill,
            StageName::Curate => &self.curate,
            StageName::Produce => &self.produce,
            StageName::Review => &self.review,
            StageName::Deliver => &self.deliver,
        }
    }
}

/// Drives a run from `Fetch` to `Deliver`.
pub struct PipelineEngine {
    stages: Stages,
    max_attempts: u32,
}

impl PipelineEngine {
    pub fn new(stages: Stages, gate: QualityGate) -> Self {
        Self {
            stages,
            max_attempts: gate.max_attempts(),
        }
    }

    /// Most times `Produce` may run in one pipeline run.
    pub fn produce_budget(&self) -> u32 {
        self.max_attempts + 1
    }

    /// Run to completion. Always returns a complete state.
    pub async fn run(&self, initial: PipelineState) -> PipelineState {
        self.run_observed(initial, |_, _| {}).await
    }

    /// Run to completion, calling `observer` after every stage.
    pub async fn run_observed<F>(&self, initial: PipelineState, mut observer: F) -> PipelineState
    where
        F: FnMut(StageName, &PipelineState) + Send,
    {
        let mut state = initial;
        let mut produce_runs = 0u32;
        let mut next = Some(StageName::Fetch);

        info!(run_id = %state.run_id, "Pipeline run starting");

        while let Some(mut stage) = next {
            if stage == StageName::Produce {
                if produce_runs >= self.produce_budget() {
                    warn!(
                        run_id = %state.run_id,
                        produce_runs,
                        "Produce budget exhausted, routing to delivery"
                    );
                    state.approved = false;
                    state.verdict = Some(Verdict::RejectedFinal);
                    state.note(
                        StageName::Review,
                        format!("Produce refused after {produce_runs} runs; draft not approved."),
                    );
                    stage = StageName::Deliver;
                } else {
                    produce_runs += 1;
                }
            }

            info!(
                run_id = %state.run_id,
                stage = %stage,
                attempt = state.revision_attempts,
                "Running stage"
            );
            let runner = self.stages.get(stage);
            debug_assert_eq!(runner.name(), stage);
            state = runner.run(state).await;
            observer(stage, &state);
            next = self.route(stage, &state);
        }

        info!(
            run_id = %state.run_id,
            approved = state.approved,
            sent = state.delivery.sent,
            revision_attempts = state.revision_attempts,
            "Pipeline run finished"
        );
        state
    }

    /// Next stage after `completed`, or `None` once `Deliver` has run.
    pub fn route(&self, completed: StageName, state: &PipelineState) -> Option<StageName> {
        match completed {
            StageName::Fetch => Some(StageName::Distill),
            StageName::Distill => Some(StageName::Curate),
            StageName::Curate => Some(StageName::Produce),
            StageName::Produce => Some(StageName::Review),
            StageName::Review => Some(self.route_after_review(state)),
            StageName::Deliver => None,
        }
    }

    /// `Produce` only on a revise verdict within the attempt ceiling.
    pub fn route_after_review(&self, state: &PipelineState) -> StageName {
        if state.approved {
            return StageName::Deliver;
        }
        match state.verdict {
            Some(Verdict::ReviseAndRetry) if state.revision_attempts <= self.max_attempts => {
                StageName::Produce
            }
            _ => StageName::Deliver,
        }
    }
}
