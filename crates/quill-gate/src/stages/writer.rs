use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use quill_types::{Draft, Platform};

use crate::context::WorkflowContext;
use crate::error::StageError;
use crate::policy::PolicyConfig;
use crate::traits::PipelineStage;

/// Stage 3: writer.
///
/// Assembles the draft from the strategy brief and research notes. Carries
/// the house disclosure map so tagged posts include their disclosures by
/// construction; the gate still verifies them independently.
pub struct WriterStage {
    disclosures: HashMap<String, String>,
}

impl WriterStage {
    pub fn new(disclosures: HashMap<String, String>) -> Self {
        Self { disclosures }
    }

    fn hashtags_for(&self, policy_tags: &[String]) -> Vec<String> {
        policy_tags
            .iter()
            .filter_map(|tag| self.disclosures.get(tag))
            .map(|t| t.trim_start_matches('#').to_string())
            .collect()
    }
}

impl Default for WriterStage {
    fn default() -> Self {
        Self::new(PolicyConfig::default_disclosures())
    }
}

#[async_trait]
impl PipelineStage for WriterStage {
    fn name(&self) -> &'static str {
        "writer"
    }

    async fn run(&self, ctx: &mut WorkflowContext) -> Result<String, StageError> {
        let strategy = ctx
            .strategy
            .as_ref()
            .ok_or_else(|| StageError::MissingInput("strategy brief".into()))?;
        let research = ctx
            .research
            .as_ref()
            .ok_or_else(|| StageError::MissingInput("research notes".into()))?;

        let topic = &ctx.request.topic;
        let first_point = research
            .talking_points
            .first()
            .cloned()
            .unwrap_or_else(|| format!("an update on {}", topic));

        // Short form for X; room for full notes everywhere else.
        let body = match ctx.request.platform {
            Platform::X => format!("{}: {}. More soon.", topic, first_point),
            _ => {
                let points: Vec<String> = research
                    .talking_points
                    .iter()
                    .map(|p| format!("• {}", p))
                    .collect();
                format!(
                    "{} — {}.\n\n{}\n\nTone: {}.",
                    topic,
                    strategy.angle,
                    points.join("\n"),
                    strategy.tone
                )
            }
        };

        let draft = Draft {
            body,
            hashtags: self.hashtags_for(&ctx.request.policy_tags),
            citations: research.citations.clone(),
        };
        let summary = format!(
            "draft ready ({} chars, {} hashtag(s))",
            draft.rendered_len(),
            draft.hashtags.len()
        );
        ctx.draft = Some(draft);
        Ok(summary)
    }

    fn snapshot(&self, ctx: &WorkflowContext) -> Option<Value> {
        ctx.draft.as_ref().and_then(|d| serde_json::to_value(d).ok())
    }

    fn restore(&self, ctx: &mut WorkflowContext, snapshot: &Value) -> bool {
        match serde_json::from_value::<Draft>(snapshot.clone()) {
            Ok(draft) => {
                ctx.draft = Some(draft);
                true
            }
            Err(_) => false,
        }
    }

    fn fallback(&self, ctx: &mut WorkflowContext) -> String {
        ctx.draft = Some(Draft {
            body: format!("{}: update to follow.", ctx.request.topic),
            hashtags: self.hashtags_for(&ctx.request.policy_tags),
            citations: ctx
                .research
                .as_ref()
                .map(|n| n.citations.clone())
                .unwrap_or_default(),
        });
        "substituted minimal fallback draft".to_string()
    }
}
