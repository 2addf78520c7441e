//! Naming helpers for runtime names, image tags and model ids.

/// Longest runtime name the managed runtime control plane accepts
pub const MAX_RUNTIME_NAME_LEN: usize = 48;
/// Longest model id accepted from callers
pub const MAX_MODEL_ID_LEN: usize = 256;

/// Check a model id against `[A-Za-z0-9][A-Za-z0-9._:/@+-]*`
///
/// Covers provider model ids (`anthropic.claude-3-haiku-20240307-v1:0`),
/// model ARNs and local tags (`llama3:8b`, `hf.co/org/model:Q4`). Model ids
/// end up in build recipes and command lines, so nothing else is allowed.
#[must_use]
pub fn is_valid_model_id(model_id: &str) -> bool {
    model_id.len() <= MAX_MODEL_ID_LEN
        && model_id.starts_with(|c: char| c.is_ascii_alphanumeric())
        && model_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._:/@+-".contains(c))
}

/// Join name parts into a runtime name matching `[a-zA-Z][a-zA-Z0-9_]{0,47}`.
///
/// Non-alphanumeric characters collapse to `_`; a leading digit or empty
/// result gets an `agent_` prefix.
#[must_use]
pub fn runtime_name(parts: &[&str]) -> String {
    let mut out = String::new();
    for part in parts {
        let cleaned = collapse(part, '_', |c| c.is_ascii_alphanumeric());
        if cleaned.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('_');
        }
        out.push_str(&cleaned);
    }
    if !out.starts_with(|c: char| c.is_ascii_alphabetic()) {
        out.insert_str(0, "agent_");
    }
    out.truncate(MAX_RUNTIME_NAME_LEN);
    out.trim_end_matches('_').to_string()
}

/// Lowercase container image tag, `<prefix>-<owner>`.
#[must_use]
pub fn image_tag(prefix: &str, owner_id: &str) -> String {
    let owner = collapse(&owner_id.to_ascii_lowercase(), '-', |c| {
        c.is_ascii_alphanumeric() || c == '.' || c == '_'
    });
    let owner = if owner.is_empty() { "anonymous".to_string() } else { owner };
    format!("{}-{}", prefix.to_ascii_lowercase(), owner)
}

fn collapse(raw: &str, sep: char, keep: impl Fn(char) -> bool) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if keep(ch) {
            out.push(ch);
        } else if !out.ends_with(sep) {
            out.push(sep);
        }
    }
    out.trim_matches(sep).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn runtime_name_joins_parts() {
        assert_eq!(runtime_name(&["tenant-42", "My Agent!"]), "tenant_42_My_Agent");
        assert_eq!(runtime_name(&["9lives"]), "agent_9lives");
        assert_eq!(runtime_name(&["", "---"]), "agent");
    }

    #[test]
    fn image_tag_is_docker_safe() {
        assert_eq!(image_tag("agent-test", "User@Example.com"), "agent-test-user-example.com");
        assert_eq!(image_tag("agent-test", "///"), "agent-test-anonymous");
    }

    #[test]
    fn model_ids() {
        for ok in [
            "llama3",
            "llama3:8b",
            "hf.co/org/model:Q4_K_M",
            "anthropic.claude-3-haiku-20240307-v1:0",
            "arn:aws:bedrock:us-east-1::foundation-model/amazon.titan-text-express-v1",
        ] {
            assert!(is_valid_model_id(ok), "{ok}");
        }
        for bad in ["", "llama3\nRUN rm -rf /", "llama 3", "-flag", "\"quoted\"", "a;b"] {
            assert!(!is_valid_model_id(bad), "{bad}");
        }
        assert!(!is_valid_model_id(&"m".repeat(MAX_MODEL_ID_LEN + 1)));
    }

    proptest! {
        #[test]
        fn prop_runtime_name_is_always_valid(parts in proptest::collection::vec(".{0,40}", 1..4)) {
            let refs: Vec<&str> = parts.iter().map(String::as_str).collect();
            let name = runtime_name(&refs);
            prop_assert!(name.len() <= MAX_RUNTIME_NAME_LEN);
            prop_assert!(name.starts_with(|c: char| c.is_ascii_alphabetic()));
            prop_assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        }
    }
}
