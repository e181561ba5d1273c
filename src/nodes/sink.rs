use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::engine::{NodeExecutor, NodeRunResult, PortMap, RuntimeContext};
use crate::error::NodeError;

use super::value_to_paths;

/// Persists named outputs into the derivatives tree.
///
/// Input ports are namespaced `folder.@name` (`anat.@brain`): the part
/// before `.@` is the destination subfolder, which avoids collisions when
/// several values land in one folder. Each incoming file is copied under its
/// substituted name; a filename with no substitution entry is kept as-is,
/// which the output check will then flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkSpec {
    pub base_directory: PathBuf,
    /// Ordered `(producer filename, derivative filename)` pairs; exact full
    /// match, applied once per file.
    #[serde(default)]
    pub substitutions: Vec<(String, String)>,
}

impl SinkSpec {
    pub fn substitute<'a>(&'a self, file_name: &'a str) -> &'a str {
        self.substitutions
            .iter()
            .find(|(from, _)| from == file_name)
            .map(|(_, to)| to.as_str())
            .unwrap_or(file_name)
    }
}

fn folder_of(port: &str) -> &str {
    port.split_once(".@").map_or("", |(folder, _)| folder)
}

pub struct SinkExecutor;

#[async_trait]
impl NodeExecutor for SinkExecutor {
    async fn execute(
        &self,
        node_id: &str,
        config: &Value,
        inputs: &PortMap,
        context: &RuntimeContext,
    ) -> Result<NodeRunResult, NodeError> {
        let spec: SinkSpec = serde_json::from_value(config.clone())?;
        let mut persisted = Vec::new();

        // Stable iteration keeps the run log deterministic.
        let mut ports: Vec<&String> = inputs.keys().collect();
        ports.sort();

        for port in ports {
            let dest_dir = spec.base_directory.join(folder_of(port));
            tokio::fs::create_dir_all(&dest_dir)
                .await
                .map_err(|e| NodeError::io(&dest_dir, e))?;

            for src in value_to_paths(&inputs[port]) {
                let file_name = src
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| NodeError::InputNotFound(src.display().to_string()))?;
                let dest = dest_dir.join(spec.substitute(file_name));
                debug!("{node_id}: {} -> {}", src.display(), dest.display());
                tokio::fs::copy(&src, &dest)
                    .await
                    .map_err(|e| NodeError::io(&src, e))?;
                persisted.push(Value::String(dest.display().to_string()));
            }
        }

        let mut outputs = PortMap::new();
        outputs.insert("persisted".to_string(), Value::Array(persisted));
        Ok(NodeRunResult::with_outputs(outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RunLog;
    use serde_json::json;
    use std::fs;

    #[tokio::test]
    async fn test_copies_with_substitution_into_namespaced_folder() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = RuntimeContext::new(tmp.path().join("work"), RunLog::disabled());
        let src = tmp.path().join("brain.nii.gz");
        fs::write(&src, b"brain").unwrap();
        let base = tmp.path().join("cmp/sub-01");

        let config = json!({
            "base_directory": base,
            "substitutions": [["brain.nii.gz", "sub-01_desc-brain_T1w.nii.gz"]],
        });
        let mut inputs = PortMap::new();
        inputs.insert("anat.@brain".into(), json!(src.display().to_string()));

        SinkExecutor
            .execute("sinker", &config, &inputs, &ctx)
            .await
            .unwrap();
        let dest = base.join("anat/sub-01_desc-brain_T1w.nii.gz");
        assert_eq!(fs::read(dest).unwrap(), b"brain");
    }

    #[tokio::test]
    async fn test_unmatched_filename_is_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = RuntimeContext::new(tmp.path().join("work"), RunLog::disabled());
        let src = tmp.path().join("mystery.nii.gz");
        fs::write(&src, b"x").unwrap();
        let base = tmp.path().join("cmp/sub-01");

        let config = json!({ "base_directory": base, "substitutions": [] });
        let mut inputs = PortMap::new();
        inputs.insert("anat.@odd".into(), json!(src.display().to_string()));

        SinkExecutor
            .execute("sinker", &config, &inputs, &ctx)
            .await
            .unwrap();
        assert!(base.join("anat/mystery.nii.gz").exists());
    }

    #[tokio::test]
    async fn test_list_port_copies_every_file() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = RuntimeContext::new(tmp.path().join("work"), RunLog::disabled());
        let base = tmp.path().join("cmp/sub-01");
        let mut srcs = Vec::new();
        for scale in 1..=3 {
            let src = tmp.path().join(format!("ROIv_HR_th_scale{scale}.nii.gz"));
            fs::write(&src, scale.to_string()).unwrap();
            srcs.push(json!(src.display().to_string()));
        }

        let config = json!({
            "base_directory": base,
            "substitutions": [
                ["ROIv_HR_th_scale1.nii.gz", "sub-01_label-L2018_desc-scale1_atlas.nii.gz"],
                ["ROIv_HR_th_scale2.nii.gz", "sub-01_label-L2018_desc-scale2_atlas.nii.gz"],
                ["ROIv_HR_th_scale3.nii.gz", "sub-01_label-L2018_desc-scale3_atlas.nii.gz"],
            ],
        });
        let mut inputs = PortMap::new();
        inputs.insert("anat.@roivs".into(), json!(srcs));

        let result = SinkExecutor
            .execute("sinker", &config, &inputs, &ctx)
            .await
            .unwrap();
        assert_eq!(result.outputs["persisted"].as_array().unwrap().len(), 3);
        for scale in 1..=3 {
            assert!(base
                .join(format!("anat/sub-01_label-L2018_desc-scale{scale}_atlas.nii.gz"))
                .exists());
        }
    }
}
