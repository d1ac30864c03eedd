use serde::{Deserialize, Serialize};

/// Terminal gate outcome. There are exactly two states; advisory stages can
/// degrade or fail, but only the policy evaluator produces a `Fail` here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionStatus {
    Pass,
    Fail,
}

/// Canonical violation codes emitted by the policy evaluator.
///
/// The derive order is the canonical aggregation order: decisions list their
/// codes sorted by this ordering so identical inputs always serialize
/// identically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationCode {
    Profanity,
    LengthExceeded,
    PlatformTermBlocked,
    MissingRequiredTag,
    MissingCitation,
}

impl std::fmt::Display for ViolationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            ViolationCode::Profanity => "PROFANITY",
            ViolationCode::LengthExceeded => "LENGTH_EXCEEDED",
            ViolationCode::PlatformTermBlocked => "PLATFORM_TERM_BLOCKED",
            ViolationCode::MissingRequiredTag => "MISSING_REQUIRED_TAG",
            ViolationCode::MissingCitation => "MISSING_CITATION",
        };
        write!(f, "{}", code)
    }
}

/// The single canonical decision type.
///
/// Produced exactly once per workflow, by the policy evaluator only.
/// `violation_codes` and `required_edits` are parallel: edit `i` remediates
/// code `i`. A passing decision has both empty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub status: DecisionStatus,
    pub violation_codes: Vec<ViolationCode>,
    pub required_edits: Vec<String>,
}

impl Decision {
    pub fn pass() -> Self {
        Self {
            status: DecisionStatus::Pass,
            violation_codes: Vec::new(),
            required_edits: Vec::new(),
        }
    }

    /// Build a failing decision from (code, remediation) pairs. Pairs are
    /// sorted into canonical order so aggregation is order-insensitive.
    pub fn fail(mut violations: Vec<(ViolationCode, String)>) -> Self {
        violations.sort();
        violations.dedup();
        let (violation_codes, required_edits) = violations.into_iter().unzip();
        Self {
            status: DecisionStatus::Fail,
            violation_codes,
            required_edits,
        }
    }

    pub fn is_pass(&self) -> bool {
        self.status == DecisionStatus::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_sorts_violations_canonically() {
        let a = Decision::fail(vec![
            (ViolationCode::MissingCitation, "cite".into()),
            (ViolationCode::Profanity, "remove".into()),
        ]);
        let b = Decision::fail(vec![
            (ViolationCode::Profanity, "remove".into()),
            (ViolationCode::MissingCitation, "cite".into()),
        ]);
        assert_eq!(a, b);
        assert_eq!(a.violation_codes[0], ViolationCode::Profanity);
    }

    #[test]
    fn status_serializes_screaming() {
        let json = serde_json::to_string(&DecisionStatus::Fail).unwrap();
        assert_eq!(json, "\"FAIL\"");
        let code = serde_json::to_string(&ViolationCode::Profanity).unwrap();
        assert_eq!(code, "\"PROFANITY\"");
    }

    #[test]
    fn pass_has_no_codes() {
        let d = Decision::pass();
        assert!(d.is_pass());
        assert!(d.violation_codes.is_empty());
        assert!(d.required_edits.is_empty());
    }
}
