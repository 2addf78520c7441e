//! Agent program synthesis
//!
//! Renders the Python agent program, its dependency manifest and the
//! container build recipe for a descriptor. String values are embedded as
//! JSON string literals, which Python parses identically.

use crate::error::SandboxError;
use launchpad_core::{AgentDescriptor, SandboxConfig};
use std::fs;
use std::path::Path;

/// File name of the agent program inside the scratch directory
pub const ENTRYPOINT_FILE: &str = "test_agent.py";
/// File name of the dependency manifest
pub const REQUIREMENTS_FILE: &str = "requirements.txt";
/// File name of the container build recipe
pub const DOCKERFILE: &str = "Dockerfile";

/// Rendered files for one sandbox run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentBundle {
    pub program: String,
    pub requirements: String,
    pub dockerfile: Option<String>,
}

impl AgentBundle {
    /// Bundle for the container sandbox
    #[must_use]
    pub fn for_container(agent: &AgentDescriptor, config: &SandboxConfig) -> Self {
        Self {
            program: container_program(agent, &config.local_runtime_url),
            requirements: requirements(false),
            dockerfile: Some(dockerfile(agent, config)),
        }
    }

    /// Bundle for the managed agent runtime
    #[must_use]
    pub fn for_managed(agent: &AgentDescriptor) -> Self {
        Self {
            program: managed_program(agent),
            requirements: requirements(true),
            dockerfile: None,
        }
    }

    /// Write every file into `dir`
    ///
    /// # Errors
    /// Propagates filesystem errors
    pub fn write_to(&self, dir: &Path) -> std::io::Result<()> {
        fs::write(dir.join(ENTRYPOINT_FILE), &self.program)?;
        fs::write(dir.join(REQUIREMENTS_FILE), &self.requirements)?;
        if let Some(dockerfile) = &self.dockerfile {
            fs::write(dir.join(DOCKERFILE), dockerfile)?;
        }
        Ok(())
    }

    /// Write the bundle into a fresh scratch directory
    ///
    /// # Errors
    /// `SandboxError::Io` if the directory or a file cannot be created
    pub fn stage(&self, config: &SandboxConfig) -> Result<tempfile::TempDir, SandboxError> {
        let scratch = scratch_dir(config)?;
        self.write_to(scratch.path())?;
        Ok(scratch)
    }
}

/// Fresh scratch directory, removed when the handle drops
fn scratch_dir(config: &SandboxConfig) -> std::io::Result<tempfile::TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("launchpad-");
    match &config.scratch_root {
        Some(root) => builder.tempdir_in(root),
        None => builder.tempdir(),
    }
}

fn py_str(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Tool names usable as `strands_tools` imports
fn tool_idents(agent: &AgentDescriptor) -> Vec<&str> {
    agent
        .tool_names
        .iter()
        .map(String::as_str)
        .filter(|name| {
            let valid = name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid {
                tracing::warn!(tool = %name, "skipping tool with non-identifier name");
            }
            valid
        })
        .collect()
}

fn agent_block(agent: &AgentDescriptor, model_ctor: &str) -> String {
    let tools = tool_idents(agent);
    let imports = if tools.is_empty() {
        String::new()
    } else {
        format!("from strands_tools import {}\n", tools.join(", "))
    };
    format!(
        "{imports}\nmodel = {model_ctor}\n\nagent = Agent(\n    model=model,\n    system_prompt={prompt},\n    tools=[{tools}],\n)\n",
        prompt = py_str(&agent.system_prompt),
        tools = tools.join(", "),
    )
}

/// Program run once inside the container: prompt in `argv[1]`, model id from
/// `OLLAMA_MODEL`, answer on stdout
#[must_use]
pub fn container_program(agent: &AgentDescriptor, runtime_url: &str) -> String {
    let model = format!(
        "OllamaModel(\n    host={url},\n    model_id=os.environ.get(\"OLLAMA_MODEL\", {model}),\n)",
        url = py_str(runtime_url),
        model = py_str(&agent.model_id),
    );
    format!(
        "import os\nimport sys\n\nfrom strands import Agent\nfrom strands.models.ollama import OllamaModel\n{body}\n\
if __name__ == \"__main__\":\n    if len(sys.argv) < 2:\n        print(\"No input provided\", file=sys.stderr)\n        sys.exit(2)\n    \
response = agent(sys.argv[1])\n    print(response.message[\"content\"][0][\"text\"])\n",
        body = agent_block(agent, &model),
    )
}

/// Program wrapped for the managed runtime's entrypoint contract
#[must_use]
pub fn managed_program(agent: &AgentDescriptor) -> String {
    let model = format!("BedrockModel(model_id={})", py_str(&agent.model_id));
    format!(
        "from bedrock_agentcore.runtime import BedrockAgentCoreApp\nfrom strands import Agent\nfrom strands.models import BedrockModel\n{body}\n\
app = BedrockAgentCoreApp()\n\n\n@app.entrypoint\ndef invoke(payload):\n    response = agent(payload.get(\"prompt\", \"\"))\n    \
return {{\n        \"message\": response.message[\"content\"][0][\"text\"],\n        \"agent_name\": {name},\n        \"model\": {model_id},\n    }}\n\n\n\
if __name__ == \"__main__\":\n    app.run()\n",
        body = agent_block(agent, &model),
        name = py_str(&agent.name),
        model_id = py_str(&agent.model_id),
    )
}

/// Dependency manifest
#[must_use]
pub fn requirements(managed: bool) -> String {
    let mut deps = vec!["strands-agents", "strands-agents-tools"];
    if managed {
        deps.push("bedrock-agentcore");
    } else {
        deps.push("ollama");
    }
    let mut out = deps.join("\n");
    out.push('\n');
    out
}

/// Build recipe: installs the local model runtime, pulls the model and the
/// program's dependencies. The runtime is started before the program on
/// every run; extra `docker run` arguments reach the program as `argv`.
#[must_use]
pub fn dockerfile(agent: &AgentDescriptor, config: &SandboxConfig) -> String {
    format!(
        r#"FROM {base}

RUN apt-get update && apt-get install -y --no-install-recommends curl ca-certificates \
    && rm -rf /var/lib/apt/lists/*
RUN curl -fsSL https://ollama.com/install.sh | sh

WORKDIR /app
COPY {req} .
RUN pip install --no-cache-dir -r {req}
COPY {entry} .

ENV OLLAMA_MODEL={model}
RUN ollama serve & sleep 5 && ollama pull "$OLLAMA_MODEL"

ENTRYPOINT ["/bin/sh", "-c", "ollama serve >/dev/null 2>&1 & sleep 3 && exec python {entry} \"$@\"", "agent"]
"#,
        base = config.base_image,
        req = REQUIREMENTS_FILE,
        entry = ENTRYPOINT_FILE,
        model = py_str(&agent.model_id),
    )
}
