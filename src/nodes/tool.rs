use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use crate::engine::{NodeExecutor, NodeRunResult, PortMap, RuntimeContext};
use crate::error::NodeError;

use super::value_to_arg;

/// Declaration of one external tool invocation.
///
/// The orchestrator only knows which command to run and which files it is
/// declared to produce; the tool itself is opaque. `{port}` placeholders in
/// `args` are interpolated from the node's resolved input ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Output ports, by declared location or static value.
    #[serde(default)]
    pub outputs: HashMap<String, OutputSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputSpec {
    /// A single file, relative to the node working directory.
    File { file: String },
    /// A fixed set of files, relative to the node working directory.
    Files { files: Vec<String> },
    /// A static value known at graph-construction time (e.g. a subjects dir).
    Value { value: String },
}

pub struct ToolExecutor;

#[async_trait]
impl NodeExecutor for ToolExecutor {
    async fn execute(
        &self,
        node_id: &str,
        config: &Value,
        inputs: &PortMap,
        context: &RuntimeContext,
    ) -> Result<NodeRunResult, NodeError> {
        let spec: ToolSpec = serde_json::from_value(config.clone())?;
        let node_dir = context.node_dir(node_id);
        tokio::fs::create_dir_all(&node_dir)
            .await
            .map_err(|e| NodeError::io(&node_dir, e))?;

        let args = interpolate_args(&spec.args, inputs)?;
        debug!("{node_id}: running `{}` {:?}", spec.program, args);
        context
            .log
            .line(&format!("  * Running tool: {} ({node_id})", spec.program));

        let status = Command::new(&spec.program)
            .args(&args)
            .envs(&spec.env)
            .current_dir(&node_dir)
            .status()
            .await
            .map_err(|source| NodeError::Spawn {
                program: spec.program.clone(),
                source,
            })?;
        if !status.success() {
            return Err(NodeError::ToolFailed {
                program: spec.program.clone(),
                status: status.to_string(),
            });
        }

        let mut outputs = PortMap::new();
        for (port, output) in &spec.outputs {
            let value = resolve_output(&node_dir, output)?;
            outputs.insert(port.clone(), value);
        }
        Ok(NodeRunResult::with_outputs(outputs))
    }
}

/// Replace `{port}` placeholders with input values; an unresolved
/// placeholder is an error, not a silently passed-through brace.
fn interpolate_args(args: &[String], inputs: &PortMap) -> Result<Vec<String>, NodeError> {
    let mut rendered = Vec::with_capacity(args.len());
    for arg in args {
        let mut arg = arg.clone();
        for (port, value) in inputs {
            arg = arg.replace(&format!("{{{port}}}"), &value_to_arg(value));
        }
        if let Some(placeholder) = unresolved_placeholder(&arg) {
            return Err(NodeError::InputNotFound(placeholder));
        }
        rendered.push(arg);
    }
    Ok(rendered)
}

/// First `{ident}`-shaped span left in an argument, if any. Shell syntax
/// like `${VAR}` is not a placeholder.
fn unresolved_placeholder(arg: &str) -> Option<String> {
    let bytes = arg.as_bytes();
    for (start, _) in arg.match_indices('{') {
        if start > 0 && bytes[start - 1] == b'$' {
            continue;
        }
        let rest = &arg[start + 1..];
        if let Some(len) = rest.find('}') {
            let inner = &rest[..len];
            if !inner.is_empty()
                && inner
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Some(format!("{{{inner}}}"));
            }
        }
    }
    None
}

fn resolve_output(node_dir: &Path, output: &OutputSpec) -> Result<Value, NodeError> {
    match output {
        OutputSpec::File { file } => {
            let path = node_dir.join(file);
            require_exists(&path)?;
            Ok(Value::String(path.display().to_string()))
        }
        OutputSpec::Files { files } => {
            let mut resolved = Vec::with_capacity(files.len());
            for file in files {
                let path = node_dir.join(file);
                require_exists(&path)?;
                resolved.push(Value::String(path.display().to_string()));
            }
            Ok(Value::Array(resolved))
        }
        OutputSpec::Value { value } => Ok(Value::String(value.clone())),
    }
}

fn require_exists(path: &Path) -> Result<(), NodeError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(NodeError::OutputMissing(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RunLog;
    use serde_json::json;

    #[tokio::test]
    async fn test_tool_runs_and_declared_outputs_resolve() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = RuntimeContext::new(tmp.path(), RunLog::disabled());
        let config = json!({
            "program": "sh",
            "args": ["-c", "printf brain > brain.nii.gz"],
            "outputs": { "brain": { "file": "brain.nii.gz" } },
        });
        let result = ToolExecutor
            .execute("seg.tool", &config, &PortMap::new(), &ctx)
            .await
            .unwrap();
        let brain = result.outputs["brain"].as_str().unwrap();
        assert!(brain.ends_with("seg/tool/brain.nii.gz"));
        assert_eq!(std::fs::read_to_string(brain).unwrap(), "brain");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = RuntimeContext::new(tmp.path(), RunLog::disabled());
        let config = json!({ "program": "sh", "args": ["-c", "exit 3"] });
        let err = ToolExecutor
            .execute("seg.tool", &config, &PortMap::new(), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::ToolFailed { .. }));
    }

    #[tokio::test]
    async fn test_missing_declared_output_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = RuntimeContext::new(tmp.path(), RunLog::disabled());
        let config = json!({
            "program": "true",
            "outputs": { "brain": { "file": "never_written.nii.gz" } },
        });
        let err = ToolExecutor
            .execute("seg.tool", &config, &PortMap::new(), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::OutputMissing(_)));
    }

    #[tokio::test]
    async fn test_placeholder_interpolation() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = RuntimeContext::new(tmp.path(), RunLog::disabled());
        let src = tmp.path().join("input.txt");
        std::fs::write(&src, "payload").unwrap();

        let mut inputs = PortMap::new();
        inputs.insert("T1".into(), json!(src.display().to_string()));
        let config = json!({
            "program": "sh",
            "args": ["-c", "cp {T1} copied.txt"],
            "outputs": { "copy": { "file": "copied.txt" } },
        });
        let result = ToolExecutor
            .execute("convert", &config, &inputs, &ctx)
            .await
            .unwrap();
        let copy = result.outputs["copy"].as_str().unwrap();
        assert_eq!(std::fs::read_to_string(copy).unwrap(), "payload");
    }

    #[tokio::test]
    async fn test_unresolved_placeholder_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = RuntimeContext::new(tmp.path(), RunLog::disabled());
        let config = json!({ "program": "true", "args": ["{missing_port}"] });
        let err = ToolExecutor
            .execute("convert", &config, &PortMap::new(), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::InputNotFound(_)));
    }

    #[tokio::test]
    async fn test_static_value_output() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = RuntimeContext::new(tmp.path(), RunLog::disabled());
        let config = json!({
            "program": "true",
            "outputs": { "subjects_dir": { "value": "/derivatives/freesurfer" } },
        });
        let result = ToolExecutor
            .execute("recon", &config, &PortMap::new(), &ctx)
            .await
            .unwrap();
        assert_eq!(result.outputs["subjects_dir"], json!("/derivatives/freesurfer"));
    }
}
