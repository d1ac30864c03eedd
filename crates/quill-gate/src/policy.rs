use std::collections::HashMap;

use quill_types::{Decision, Draft, Platform, ViolationCode};

/// Policy gate configuration.
///
/// Every limit and term list is explicit configuration, threaded through the
/// evaluator instance — there is no hidden module state.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Maximum rendered post length per platform, in characters.
    pub max_lengths: HashMap<Platform, usize>,
    /// Terms blocked on every platform.
    pub banned_terms: Vec<String>,
    /// Additional terms blocked on specific platforms (engagement bait and
    /// platform rule violations).
    pub platform_terms: HashMap<Platform, Vec<String>>,
    /// Policy tag → hashtag disclosure that must appear in the post.
    pub required_disclosures: HashMap<String, String>,
    /// Policy tags whose content must cite at least one source.
    pub citation_tags: Vec<String>,
}

impl PolicyConfig {
    /// House disclosure map, shared with the writer stage so compliant
    /// drafts carry their disclosures by construction.
    pub fn default_disclosures() -> HashMap<String, String> {
        HashMap::from([
            ("sponsored".to_string(), "#ad".to_string()),
            ("affiliate".to_string(), "#affiliate".to_string()),
            ("gifted".to_string(), "#gifted".to_string()),
        ])
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_lengths: HashMap::from([
                (Platform::X, 280),
                (Platform::Instagram, 2200),
                (Platform::Tiktok, 2200),
                (Platform::Linkedin, 3000),
                (Platform::Youtube, 5000),
            ]),
            banned_terms: vec![
                "damn".to_string(),
                "hell yeah".to_string(),
                "wtf".to_string(),
                "screw this".to_string(),
            ],
            platform_terms: HashMap::from([
                (
                    Platform::X,
                    vec!["retweet to win".to_string(), "follow and rt".to_string()],
                ),
                (
                    Platform::Linkedin,
                    vec!["follow for follow".to_string(), "like and share to win".to_string()],
                ),
                (
                    Platform::Instagram,
                    vec!["tag 3 friends to win".to_string()],
                ),
            ]),
            required_disclosures: Self::default_disclosures(),
            citation_tags: vec![
                "finance".to_string(),
                "health".to_string(),
                "news".to_string(),
            ],
        }
    }
}

/// The policy gate.
///
/// A pure function over (draft, platform, policy tags): identical input
/// always yields an identical decision — no clock, no randomness, no I/O.
/// This is the only component in the system permitted to produce a FAIL.
#[derive(Debug, Clone, Default)]
pub struct PolicyEvaluator {
    config: PolicyConfig,
}

impl PolicyEvaluator {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Evaluate a draft against every check. Checks are independent; their
    /// violations aggregate order-insensitively into one canonical decision.
    pub fn evaluate(&self, draft: &Draft, platform: Platform, policy_tags: &[String]) -> Decision {
        let mut violations: Vec<(ViolationCode, String)> = Vec::new();

        violations.extend(self.check_length(draft, platform));
        violations.extend(self.check_banned_terms(draft));
        violations.extend(self.check_platform_terms(draft, platform));
        violations.extend(self.check_required_tags(draft, policy_tags));
        violations.extend(self.check_citations(draft, policy_tags));

        if violations.is_empty() {
            Decision::pass()
        } else {
            Decision::fail(violations)
        }
    }

    fn check_length(&self, draft: &Draft, platform: Platform) -> Option<(ViolationCode, String)> {
        let limit = *self.config.max_lengths.get(&platform)?;
        let actual = draft.rendered_len();
        if actual > limit {
            Some((
                ViolationCode::LengthExceeded,
                format!(
                    "Shorten the post to at most {} characters for {} (currently {}).",
                    limit, platform, actual
                ),
            ))
        } else {
            None
        }
    }

    fn check_banned_terms(&self, draft: &Draft) -> Vec<(ViolationCode, String)> {
        let body = draft.body.to_lowercase();
        self.config
            .banned_terms
            .iter()
            .filter(|term| body.contains(term.to_lowercase().as_str()))
            .map(|term| {
                (
                    ViolationCode::Profanity,
                    format!("Remove the flagged term \"{}\".", term),
                )
            })
            .collect()
    }

    fn check_platform_terms(
        &self,
        draft: &Draft,
        platform: Platform,
    ) -> Vec<(ViolationCode, String)> {
        let body = draft.body.to_lowercase();
        self.config
            .platform_terms
            .get(&platform)
            .map(|terms| {
                terms
                    .iter()
                    .filter(|term| body.contains(term.to_lowercase().as_str()))
                    .map(|term| {
                        (
                            ViolationCode::PlatformTermBlocked,
                            format!("\"{}\" is not allowed on {}; rephrase without it.", term, platform),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn check_required_tags(
        &self,
        draft: &Draft,
        policy_tags: &[String],
    ) -> Vec<(ViolationCode, String)> {
        policy_tags
            .iter()
            .filter_map(|tag| {
                let required = self.config.required_disclosures.get(tag)?;
                if has_hashtag(draft, required) {
                    None
                } else {
                    Some((
                        ViolationCode::MissingRequiredTag,
                        format!(
                            "Posts tagged \"{}\" must include the {} disclosure.",
                            tag, required
                        ),
                    ))
                }
            })
            .collect()
    }

    fn check_citations(
        &self,
        draft: &Draft,
        policy_tags: &[String],
    ) -> Option<(ViolationCode, String)> {
        let tag = policy_tags
            .iter()
            .find(|t| self.config.citation_tags.contains(t))?;
        if draft.citations.is_empty() {
            Some((
                ViolationCode::MissingCitation,
                format!("Add at least one source citation for \"{}\" content.", tag),
            ))
        } else {
            None
        }
    }
}

fn has_hashtag(draft: &Draft, required: &str) -> bool {
    let wanted = required.trim_start_matches('#').to_lowercase();
    draft
        .hashtags
        .iter()
        .any(|t| t.trim_start_matches('#').to_lowercase() == wanted)
        || draft.body.to_lowercase().contains(&required.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_types::DecisionStatus;

    fn evaluator() -> PolicyEvaluator {
        PolicyEvaluator::new(PolicyConfig::default())
    }

    fn clean_draft() -> Draft {
        Draft {
            body: "Three things we learned shipping the spring launch.".into(),
            hashtags: vec![],
            citations: vec![],
        }
    }

    #[test]
    fn clean_draft_passes() {
        let decision = evaluator().evaluate(&clean_draft(), Platform::X, &[]);
        assert!(decision.is_pass());
    }

    #[test]
    fn banned_term_yields_profanity_with_remediation() {
        let mut draft = clean_draft();
        draft.body = "This launch was a damn mess.".into();
        let decision = evaluator().evaluate(&draft, Platform::X, &[]);

        assert_eq!(decision.status, DecisionStatus::Fail);
        assert_eq!(decision.violation_codes, vec![ViolationCode::Profanity]);
        assert!(decision.required_edits[0].contains("damn"));
    }

    #[test]
    fn over_limit_body_fails_with_interpolated_limit() {
        let mut draft = clean_draft();
        draft.body = "x".repeat(300);
        let decision = evaluator().evaluate(&draft, Platform::X, &[]);

        assert_eq!(
            decision.violation_codes,
            vec![ViolationCode::LengthExceeded]
        );
        assert!(decision.required_edits[0].contains("280"));
        assert!(decision.required_edits[0].contains("300"));
    }

    #[test]
    fn platform_terms_only_apply_to_their_platform() {
        let mut draft = clean_draft();
        draft.body = "Retweet to win a signed copy!".into();

        let on_x = evaluator().evaluate(&draft, Platform::X, &[]);
        assert_eq!(
            on_x.violation_codes,
            vec![ViolationCode::PlatformTermBlocked]
        );

        let on_tiktok = evaluator().evaluate(&draft, Platform::Tiktok, &[]);
        assert!(on_tiktok.is_pass());
    }

    #[test]
    fn sponsored_without_disclosure_fails() {
        let decision = evaluator().evaluate(
            &clean_draft(),
            Platform::Instagram,
            &["sponsored".to_string()],
        );
        assert_eq!(
            decision.violation_codes,
            vec![ViolationCode::MissingRequiredTag]
        );
        assert!(decision.required_edits[0].contains("#ad"));
    }

    #[test]
    fn disclosure_in_hashtags_or_body_satisfies_the_check() {
        let mut draft = clean_draft();
        draft.hashtags = vec!["ad".into()];
        let via_tags = evaluator().evaluate(
            &draft,
            Platform::Instagram,
            &["sponsored".to_string()],
        );
        assert!(via_tags.is_pass());

        let mut draft = clean_draft();
        draft.body.push_str(" #ad");
        let via_body = evaluator().evaluate(
            &draft,
            Platform::Instagram,
            &["sponsored".to_string()],
        );
        assert!(via_body.is_pass());
    }

    #[test]
    fn citation_tag_without_citations_fails() {
        let decision =
            evaluator().evaluate(&clean_draft(), Platform::Linkedin, &["finance".to_string()]);
        assert_eq!(
            decision.violation_codes,
            vec![ViolationCode::MissingCitation]
        );
    }

    #[test]
    fn evaluation_is_deterministic() {
        let mut draft = clean_draft();
        draft.body = "wtf, this damn launch".into();
        let tags = vec!["finance".to_string()];

        let a = evaluator().evaluate(&draft, Platform::X, &tags);
        let b = evaluator().evaluate(&draft, Platform::X, &tags);
        assert_eq!(a, b);
    }

    #[test]
    fn multiple_checks_aggregate_into_one_decision() {
        let mut draft = clean_draft();
        draft.body = format!("{} damn", "y".repeat(300));
        let decision = evaluator().evaluate(&draft, Platform::X, &["finance".to_string()]);

        assert_eq!(decision.violation_codes.len(), 3);
        assert_eq!(decision.required_edits.len(), 3);
        // Canonical order regardless of check order.
        assert_eq!(decision.violation_codes[0], ViolationCode::Profanity);
    }
}
