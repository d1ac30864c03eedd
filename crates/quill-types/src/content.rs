use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// Social platforms a workflow can target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    X,
    Instagram,
    Tiktok,
    Linkedin,
    Youtube,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Platform::X => "x",
            Platform::Instagram => "instagram",
            Platform::Tiktok => "tiktok",
            Platform::Linkedin => "linkedin",
            Platform::Youtube => "youtube",
        };
        write!(f, "{}", name)
    }
}

/// One content-generation request, as received from the product endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContentRequest {
    pub user_id: UserId,
    pub topic: String,
    pub platform: Platform,
    /// Policy tags declared on the request, e.g. "sponsored" or "finance".
    /// The evaluator maps these to required disclosures.
    pub policy_tags: Vec<String>,
}

impl ContentRequest {
    pub fn new(user_id: UserId, topic: impl Into<String>, platform: Platform) -> Self {
        Self {
            user_id,
            topic: topic.into(),
            platform,
            policy_tags: Vec::new(),
        }
    }

    pub fn with_policy_tags(mut self, tags: Vec<String>) -> Self {
        self.policy_tags = tags;
        self
    }
}

/// A generated draft ready for the policy gate.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Draft {
    pub body: String,
    pub hashtags: Vec<String>,
    pub citations: Vec<String>,
}

impl Draft {
    /// Full rendered length as posted: body plus appended hashtags.
    pub fn rendered_len(&self) -> usize {
        let tags: usize = self
            .hashtags
            .iter()
            .map(|t| t.chars().count() + 2) // " #" separator
            .sum();
        self.body.chars().count() + tags
    }
}
