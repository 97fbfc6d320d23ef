//! AI Digest: a weekly newsletter pipeline driven by a language model.

pub mod config;
pub mod delivery;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod quality;
pub mod recovery;
pub mod schema;
pub mod sources;
