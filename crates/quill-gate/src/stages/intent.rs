use async_trait::async_trait;
use serde_json::Value;

use quill_types::Platform;

use crate::context::{AnalyticsIntent, PublishIntent, WorkflowContext};
use crate::error::StageError;
use crate::traits::PipelineStage;

/// Stage 5: publish intent.
///
/// Runs after the gate. Prepares the publish payload; `ready` reflects the
/// decision so a failed draft is staged but held. Publishing itself is the
/// collaborator's job and always requires a receipt.
#[derive(Default)]
pub struct PublishIntentStage;

impl PublishIntentStage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PipelineStage for PublishIntentStage {
    fn name(&self) -> &'static str {
        "publish_intent"
    }

    async fn run(&self, ctx: &mut WorkflowContext) -> Result<String, StageError> {
        let draft = ctx
            .draft
            .as_ref()
            .ok_or_else(|| StageError::MissingInput("draft".into()))?;
        let ready = ctx.decision.as_ref().map(|d| d.is_pass()).unwrap_or(false);

        ctx.publish_intent = Some(PublishIntent {
            platform: ctx.request.platform,
            body: draft.body.clone(),
            hashtags: draft.hashtags.clone(),
            ready,
        });
        Ok(if ready {
            "publish payload staged".to_string()
        } else {
            "publish payload staged on hold".to_string()
        })
    }

    fn snapshot(&self, ctx: &WorkflowContext) -> Option<Value> {
        ctx.publish_intent
            .as_ref()
            .and_then(|p| serde_json::to_value(p).ok())
    }

    fn restore(&self, ctx: &mut WorkflowContext, snapshot: &Value) -> bool {
        match serde_json::from_value::<PublishIntent>(snapshot.clone()) {
            Ok(intent) => {
                // A replayed payload is never publish-ready for a new workflow.
                ctx.publish_intent = Some(PublishIntent {
                    ready: false,
                    ..intent
                });
                true
            }
            Err(_) => false,
        }
    }

    fn fallback(&self, ctx: &mut WorkflowContext) -> String {
        ctx.publish_intent = Some(PublishIntent {
            platform: ctx.request.platform,
            body: ctx.draft.as_ref().map(|d| d.body.clone()).unwrap_or_default(),
            hashtags: ctx
                .draft
                .as_ref()
                .map(|d| d.hashtags.clone())
                .unwrap_or_default(),
            ready: false,
        });
        "publish payload staged on hold".to_string()
    }
}

/// Stage 6: analytics intent.
///
/// Registers which engagement events downstream analytics should track for
/// this workflow. Analytics computation itself lives outside the core.
#[derive(Default)]
pub struct AnalyticsIntentStage;

impl AnalyticsIntentStage {
    pub fn new() -> Self {
        Self
    }

    fn events_for(platform: Platform) -> Vec<String> {
        let events: &[&str] = match platform {
            Platform::X => &["impressions", "reposts", "replies"],
            Platform::Instagram => &["impressions", "likes", "saves"],
            Platform::Tiktok => &["views", "likes", "shares"],
            Platform::Linkedin => &["impressions", "reactions", "comments"],
            Platform::Youtube => &["views", "watch_time", "subscribers"],
        };
        events.iter().map(|e| e.to_string()).collect()
    }
}

#[async_trait]
impl PipelineStage for AnalyticsIntentStage {
    fn name(&self) -> &'static str {
        "analytics_intent"
    }

    async fn run(&self, ctx: &mut WorkflowContext) -> Result<String, StageError> {
        let events = Self::events_for(ctx.request.platform);
        let summary = format!("tracking {} event kinds", events.len());
        ctx.analytics_intent = Some(AnalyticsIntent {
            workflow_id: ctx.workflow_id.clone(),
            platform: ctx.request.platform,
            track_events: events,
        });
        Ok(summary)
    }

    fn snapshot(&self, _ctx: &WorkflowContext) -> Option<Value> {
        // Analytics registration is workflow-specific; replaying another
        // workflow's registration would mislabel metrics.
        None
    }

    fn restore(&self, _ctx: &mut WorkflowContext, _snapshot: &Value) -> bool {
        false
    }

    fn fallback(&self, ctx: &mut WorkflowContext) -> String {
        ctx.analytics_intent = Some(AnalyticsIntent {
            workflow_id: ctx.workflow_id.clone(),
            platform: ctx.request.platform,
            track_events: vec!["impressions".to_string()],
        });
        "registered minimal tracking set".to_string()
    }
}
