//! Built-in pipeline stages.
//!
//! These deterministic implementations make the pipeline runnable without
//! external collaborators; the product's strategy/research/writer services
//! replace them through the [`PipelineStage`](crate::traits::PipelineStage)
//! seam.

pub mod intent;
pub mod research;
pub mod strategy;
pub mod writer;

pub use intent::{AnalyticsIntentStage, PublishIntentStage};
pub use research::ResearchStage;
pub use strategy::StrategyStage;
pub use writer::WriterStage;
