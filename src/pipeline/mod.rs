//! The digest pipeline.
//!
//! A run threads one [`PipelineState`] through
//! `Fetch → Distill → Curate → Produce → Review → Deliver`, revisiting
//! `Produce` while the [`QualityGate`] asks for revisions:
//! 1. `FetchStage` collects raw items from every configured source
//! 2. `DistillStage` and `CurateStage` summarize, score and outline them
//! 3. `ProduceStage` and `ReviewStage` write and judge the newsletter
//! 4. `DeliverStage` mails and archives the approved draft
//!
//! Stages never fail; a run always ends with a complete state.

pub mod engine;
pub mod prompts;
pub mod stages;
pub mod state;

pub use engine::{PipelineEngine, Stage, Stages};
pub use stages::{
    CurateStage, DeliverStage, DistillStage, FetchStage, ModelCall, ProduceStage, ReviewStage,
};
pub use state::{
    Delivery, Draft, Outline, OutlineArticle, OutlineSection, PipelineState, RawItem,
    ReviewIssue, RunOutcome, StageName, StageNote, SummarizedItem,
};

use std::sync::Arc;

use crate::config::DigestConfig;
use crate::delivery::{Archiver, Mailer};
use crate::llm::{Invoker, LlmProvider};
use crate::quality::QualityGate;
use crate::recovery::RecoveryParser;
use crate::schema::SchemaValidator;
use crate::sources::ItemSource;

/// External collaborators a run talks to.
pub struct Collaborators {
    pub llm: Arc<dyn LlmProvider>,
    pub sources: Vec<Arc<dyn ItemSource>>,
    pub mailer: Arc<dyn Mailer>,
    pub archiver: Arc<dyn Archiver>,
}

/// The six standard stages wired from configuration.
pub fn standard_stages(config: &DigestConfig, deps: Collaborators) -> Stages {
    let parser = RecoveryParser::new(config.quality.parse_attempts);
    let validator = SchemaValidator::new(config.validator.clone());
    let call = |temperature: f32, max_tokens: u32| {
        let invoker = Invoker::new(deps.llm.clone(), config.llm.timeout)
            .with_temperature(temperature)
            .with_max_tokens(max_tokens);
        ModelCall::new(invoker, parser.clone(), validator.clone())
    };
    let research = &config.research;

    Stages {
        fetch: Arc::new(FetchStage::new(
            deps.sources.clone(),
            research.keywords.clone(),
            research.max_items,
        )),
        distill: Arc::new(DistillStage::new(
            call(0.2, 1024),
            research.max_summary_len,
            research.max_chunk,
        )),
        curate: Arc::new(CurateStage::new(
            call(0.1, 2048),
            config.quality.min_score,
            research.scoring_concurrency,
        )),
        produce: Arc::new(ProduceStage::new(
            call(0.7, 4096),
            config.delivery.subject_prefix.clone(),
        )),
        review: Arc::new(ReviewStage::new(
            call(0.1, 2048),
            QualityGate::from_config(&config.quality),
        )),
        deliver: Arc::new(DeliverStage::new(deps.mailer, deps.archiver)),
    }
}

/// An engine over the standard stages.
pub fn build_engine(config: &DigestConfig, deps: Collaborators) -> PipelineEngine {
    PipelineEngine::new(
        standard_stages(config, deps),
        QualityGate::from_config(&config.quality),
    )
}
