use async_trait::async_trait;
use serde_json::Value;

use quill_types::Platform;

use crate::context::{StrategyBrief, WorkflowContext};
use crate::error::StageError;
use crate::traits::PipelineStage;

/// Stage 1: strategy.
///
/// Derives a content angle, audience and tone for the request. Deterministic
/// per (topic, platform).
#[derive(Default)]
pub struct StrategyStage;

impl StrategyStage {
    pub fn new() -> Self {
        Self
    }

    fn brief_for(platform: Platform, topic: &str) -> StrategyBrief {
        let (angle, audience, tone) = match platform {
            Platform::X => ("one sharp take", "peers and practitioners", "direct"),
            Platform::Instagram => ("visual story", "community followers", "warm"),
            Platform::Tiktok => ("hook-first short", "broad discovery", "playful"),
            Platform::Linkedin => ("lesson-learned narrative", "industry audience", "professional"),
            Platform::Youtube => ("explainer outline", "subscribers", "conversational"),
        };
        StrategyBrief {
            angle: format!("{} on {}", angle, topic),
            audience: audience.to_string(),
            tone: tone.to_string(),
        }
    }
}

#[async_trait]
impl PipelineStage for StrategyStage {
    fn name(&self) -> &'static str {
        "strategy"
    }

    async fn run(&self, ctx: &mut WorkflowContext) -> Result<String, StageError> {
        let brief = Self::brief_for(ctx.request.platform, &ctx.request.topic);
        let summary = format!("strategy brief ready ({})", brief.angle);
        ctx.strategy = Some(brief);
        Ok(summary)
    }

    fn snapshot(&self, ctx: &WorkflowContext) -> Option<Value> {
        ctx.strategy
            .as_ref()
            .and_then(|b| serde_json::to_value(b).ok())
    }

    fn restore(&self, ctx: &mut WorkflowContext, snapshot: &Value) -> bool {
        match serde_json::from_value::<StrategyBrief>(snapshot.clone()) {
            Ok(brief) => {
                ctx.strategy = Some(brief);
                true
            }
            Err(_) => false,
        }
    }

    fn fallback(&self, ctx: &mut WorkflowContext) -> String {
        ctx.strategy = Some(StrategyBrief {
            angle: format!("straightforward update on {}", ctx.request.topic),
            audience: "general followers".to_string(),
            tone: "neutral".to_string(),
        });
        "substituted generic strategy brief".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_types::{ContentRequest, UserId, WorkflowId};

    fn ctx(platform: Platform) -> WorkflowContext {
        let request = ContentRequest::new(UserId::new("creator-1"), "spring launch", platform);
        WorkflowContext::new(WorkflowId::new(), request)
    }

    #[tokio::test]
    async fn produces_platform_specific_brief() {
        let stage = StrategyStage::new();
        let mut ctx = ctx(Platform::Linkedin);
        stage.run(&mut ctx).await.unwrap();

        let brief = ctx.strategy.unwrap();
        assert!(brief.angle.contains("spring launch"));
        assert_eq!(brief.tone, "professional");
    }

    #[tokio::test]
    async fn snapshot_restores_into_fresh_context() {
        let stage = StrategyStage::new();
        let mut first = ctx(Platform::X);
        stage.run(&mut first).await.unwrap();
        let snap = stage.snapshot(&first).unwrap();

        let mut second = ctx(Platform::X);
        assert!(stage.restore(&mut second, &snap));
        assert_eq!(
            second.strategy.unwrap().angle,
            first.strategy.unwrap().angle
        );
    }

    #[tokio::test]
    async fn fallback_is_still_valid() {
        let stage = StrategyStage::new();
        let mut ctx = ctx(Platform::Tiktok);
        let warning = stage.fallback(&mut ctx);
        assert!(ctx.strategy.is_some());
        assert!(warning.contains("generic"));
    }
}
