//! Component outputs read through the provisioning tool's CLI

use std::sync::Arc;

use crate::cancel::Cancellation;
use crate::error::CollaboratorError;
use crate::value::{Mapping, Value};

use super::collaborators::{OutputProvider, OutputTarget, ShellExecutor, ShellRequest};

/// Reads outputs with `terraform output -json` in the component folder.
///
/// The target workspace is selected through `TF_WORKSPACE`.
pub struct CommandOutputs {
    shell: Arc<dyn ShellExecutor>,
    program: String,
}

impl CommandOutputs {
    pub fn new(shell: Arc<dyn ShellExecutor>) -> Self {
        Self {
            shell,
            program: "terraform".to_string(),
        }
    }

    /// Use a different executable, such as `tofu`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl OutputProvider for CommandOutputs {
    fn outputs(&self, target: &OutputTarget, cancel: &Cancellation) -> Result<Mapping, CollaboratorError> {
        let mut request = ShellRequest::new(&self.program, ["output", "-json"])
            .with_working_dir(target.folder.to_native());
        if let Some(ref workspace) = target.workspace {
            request = request.with_env("TF_WORKSPACE", workspace);
        }
        tracing::debug!(
            component = %target.component,
            stack = %target.stack,
            folder = %target.folder,
            "Reading component outputs"
        );
        let output = self.shell.run(&request, cancel)?;
        if !output.success() {
            return Err(format!(
                "'{} output' failed for component '{}' in stack '{}' (exit code {}): {}",
                self.program,
                target.component,
                target.stack,
                output.status,
                output.stderr.trim()
            )
            .into());
        }
        parse_outputs(&output.stdout)
    }
}

/// Turn `{"name": {"value": ..., "type": ...}}` into `name -> value`.
fn parse_outputs(json: &str) -> Result<Mapping, CollaboratorError> {
    let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;
    Ok(raw
        .into_iter()
        .map(|(name, mut entry)| {
            let value = entry
                .get_mut("value")
                .map(serde_json::Value::take)
                .map(Value::from_json)
                .unwrap_or(Value::Null);
            (name, value)
        })
        .collect())
}
