//! Anthropic model aliases.
//!
//! Clients may ask for a model family name; Anthropic needs a dated model
//! id. The table pins each family to one release.

const ANTHROPIC_ALIASES: &[(&str, &str)] = &[
    ("claude-3-5-sonnet", "claude-3-5-sonnet-20240620"),
    ("claude-3-7-sonnet", "claude-3-7-sonnet-20240307"),
    ("claude-3-opus", "claude-3-opus-20240229"),
    ("claude-3-haiku", "claude-3-haiku-20240307"),
    ("claude-3-sonnet", "claude-3-sonnet-20240229"),
];

/// Dated model id for an Anthropic alias, or `None` if `model` is not an
/// alias (including when it is already a dated id).
pub fn anthropic_model_alias(model: &str) -> Option<&'static str> {
    ANTHROPIC_ALIASES
        .iter()
        .find(|(alias, _)| *alias == model)
        .map(|(_, pinned)| *pinned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_aliases() {
        assert_eq!(
            anthropic_model_alias("claude-3-5-sonnet"),
            Some("claude-3-5-sonnet-20240620")
        );
        assert_eq!(
            anthropic_model_alias("claude-3-7-sonnet"),
            Some("claude-3-7-sonnet-20240307")
        );
        assert_eq!(
            anthropic_model_alias("claude-3-sonnet"),
            Some("claude-3-sonnet-20240229")
        );
    }

    #[test]
    fn test_exact_match_only() {
        assert_eq!(anthropic_model_alias("claude-3-opus-20240229"), None);
        assert_eq!(anthropic_model_alias("CLAUDE-3-OPUS"), None);
        assert_eq!(anthropic_model_alias("gpt-4"), None);
    }
}
