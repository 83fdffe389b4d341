use serde::{Deserialize, Serialize};

/// Per-subject authoring guidance injected into generation prompts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectGuideline {
    pub instruction: Option<String>,
    pub good_example: Option<String>,
    pub bad_example: Option<String>,
}

impl SubjectGuideline {
    pub fn is_empty(&self) -> bool {
        [&self.instruction, &self.good_example, &self.bad_example]
            .iter()
            .all(|field| field.as_deref().map_or(true, |s| s.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_guideline_is_empty() {
        let g = SubjectGuideline {
            instruction: Some("  ".into()),
            ..Default::default()
        };
        assert!(g.is_empty());
    }

    #[test]
    fn guideline_with_example_is_not_empty() {
        let g = SubjectGuideline {
            good_example: Some("Use realistic ledger entries.".into()),
            ..Default::default()
        };
        assert!(!g.is_empty());
    }
}
