use async_trait::async_trait;
use serde_json::Value;

use crate::context::{ResearchNotes, WorkflowContext};
use crate::error::StageError;
use crate::traits::PipelineStage;

/// Stage 2: research.
///
/// Assembles talking points for the topic and, for regulated topics,
/// source citations the writer carries into the draft.
pub struct ResearchStage {
    /// Policy tags whose content needs citations. Mirrors the evaluator's
    /// citation tags so compliant drafts cite by construction.
    citation_tags: Vec<String>,
}

impl ResearchStage {
    pub fn new(citation_tags: Vec<String>) -> Self {
        Self { citation_tags }
    }

    fn needs_citations(&self, policy_tags: &[String]) -> bool {
        policy_tags.iter().any(|t| self.citation_tags.contains(t))
    }
}

impl Default for ResearchStage {
    fn default() -> Self {
        Self::new(vec![
            "finance".to_string(),
            "health".to_string(),
            "news".to_string(),
        ])
    }
}

fn slug(topic: &str) -> String {
    topic
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect()
}

#[async_trait]
impl PipelineStage for ResearchStage {
    fn name(&self) -> &'static str {
        "research"
    }

    async fn run(&self, ctx: &mut WorkflowContext) -> Result<String, StageError> {
        let topic = &ctx.request.topic;
        let talking_points = vec![
            format!("what changed in {} this week", topic),
            format!("why {} matters to this audience", topic),
            format!("one concrete next step on {}", topic),
        ];
        let citations = if self.needs_citations(&ctx.request.policy_tags) {
            vec![format!(
                "https://research.quill.internal/briefs/{}",
                slug(topic)
            )]
        } else {
            Vec::new()
        };

        let summary = format!(
            "{} talking points, {} citation(s)",
            talking_points.len(),
            citations.len()
        );
        ctx.research = Some(ResearchNotes {
            talking_points,
            citations,
        });
        Ok(summary)
    }

    fn snapshot(&self, ctx: &WorkflowContext) -> Option<Value> {
        ctx.research
            .as_ref()
            .and_then(|n| serde_json::to_value(n).ok())
    }

    fn restore(&self, ctx: &mut WorkflowContext, snapshot: &Value) -> bool {
        match serde_json::from_value::<ResearchNotes>(snapshot.clone()) {
            Ok(notes) => {
                ctx.research = Some(notes);
                true
            }
            Err(_) => false,
        }
    }

    fn fallback(&self, ctx: &mut WorkflowContext) -> String {
        ctx.research = Some(ResearchNotes {
            talking_points: vec![format!("an update on {}", ctx.request.topic)],
            citations: Vec::new(),
        });
        "substituted minimal research notes".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_types::{ContentRequest, Platform, UserId, WorkflowId};

    fn ctx(tags: Vec<String>) -> WorkflowContext {
        let request = ContentRequest::new(UserId::new("creator-1"), "index funds", Platform::X)
            .with_policy_tags(tags);
        WorkflowContext::new(WorkflowId::new(), request)
    }

    #[tokio::test]
    async fn untagged_topics_get_no_citations() {
        let stage = ResearchStage::default();
        let mut ctx = ctx(vec![]);
        stage.run(&mut ctx).await.unwrap();
        assert!(ctx.research.unwrap().citations.is_empty());
    }

    #[tokio::test]
    async fn regulated_topics_get_citations() {
        let stage = ResearchStage::default();
        let mut ctx = ctx(vec!["finance".to_string()]);
        stage.run(&mut ctx).await.unwrap();

        let notes = ctx.research.unwrap();
        assert_eq!(notes.citations.len(), 1);
        assert!(notes.citations[0].contains("index-funds"));
    }
}
