//! Prompt rewriting

use crate::config::DEFAULT_PROMPT_PREFIX;
use crate::error::PipelineError;

/// Deterministic rewrite applied to every user prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    prefix: String,
}

impl PromptTemplate {
    #[inline]
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Trim `prompt` and prepend the prefix
    ///
    /// # Errors
    /// Returns `PipelineError::EmptyPrompt` when nothing is left after trimming.
    pub fn render(&self, prompt: &str) -> Result<String, PipelineError> {
        let trimmed = prompt.trim();
        if trimmed.is_empty() {
            return Err(PipelineError::EmptyPrompt);
        }
        Ok(format!("{}{trimmed}", self.prefix))
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn trims_then_prefixes() {
        let template = PromptTemplate::new("render: ");
        assert_eq!(template.render("  a red chair \n").unwrap(), "render: a red chair");
    }

    #[test]
    fn blank_prompt_is_rejected() {
        let template = PromptTemplate::default();
        assert!(matches!(template.render(""), Err(PipelineError::EmptyPrompt)));
        assert!(matches!(template.render(" \t\r\n"), Err(PipelineError::EmptyPrompt)));
    }

    proptest! {
        #[test]
        fn render_is_deterministic(prompt in "\\PC{0,40}") {
            let template = PromptTemplate::default();
            let first = template.render(&prompt).ok();
            let second = template.render(&prompt).ok();
            prop_assert_eq!(&first, &second);
            if let Some(rendered) = first {
                prop_assert!(rendered.starts_with(DEFAULT_PROMPT_PREFIX));
                prop_assert!(rendered.ends_with(prompt.trim()));
            }
        }
    }
}
