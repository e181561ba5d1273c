//! End-to-end pipeline tests over temporary BIDS fixtures.
//!
//! External tools are replaced by a fake executor that writes every declared
//! output with deterministic content, so runs are reproducible and need no
//! FreeSurfer installation.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use neuroparc::engine::{
    NodeExecutor, NodeExecutorRegistry, NodeRunResult, PortMap, RuntimeContext,
};
use neuroparc::error::NodeError;
use neuroparc::nodes::{OutputSpec, ToolSpec};
use neuroparc::stage::Stage;
use neuroparc::{AnatomicalPipeline, BidsLayout, PipelineConfig, SegmentationTool};

/// Stands in for external tools: writes each declared file output with
/// content derived from the node id and filename, then resolves outputs the
/// way the real tool executor does.
struct FakeToolExecutor;

#[async_trait]
impl NodeExecutor for FakeToolExecutor {
    async fn execute(
        &self,
        node_id: &str,
        config: &Value,
        _inputs: &PortMap,
        context: &RuntimeContext,
    ) -> Result<NodeRunResult, NodeError> {
        let spec: ToolSpec = serde_json::from_value(config.clone())?;
        let node_dir = context.node_dir(node_id);
        fs::create_dir_all(&node_dir).map_err(|e| NodeError::io(&node_dir, e))?;

        let mut outputs = PortMap::new();
        for (port, output) in &spec.outputs {
            match output {
                OutputSpec::File { file } => {
                    let path = node_dir.join(file);
                    fs::write(&path, format!("{node_id}:{file}"))
                        .map_err(|e| NodeError::io(&path, e))?;
                    outputs.insert(port.clone(), Value::String(path.display().to_string()));
                }
                OutputSpec::Files { files } => {
                    let mut resolved = Vec::new();
                    for file in files {
                        let path = node_dir.join(file);
                        fs::write(&path, format!("{node_id}:{file}"))
                            .map_err(|e| NodeError::io(&path, e))?;
                        resolved.push(Value::String(path.display().to_string()));
                    }
                    outputs.insert(port.clone(), Value::Array(resolved));
                }
                OutputSpec::Value { value } => {
                    outputs.insert(port.clone(), Value::String(value.clone()));
                }
            }
        }
        Ok(NodeRunResult::with_outputs(outputs))
    }
}

fn fake_registry() -> Arc<NodeExecutorRegistry> {
    let mut registry = NodeExecutorRegistry::new();
    registry.register("tool", Box::new(FakeToolExecutor));
    Arc::new(registry)
}

fn write_bids_fixture(bids_dir: &Path, subject: &str, session: Option<&str>) {
    let mut anat = bids_dir.join(subject);
    if let Some(ses) = session {
        anat.push(ses);
    }
    anat.push("anat");
    fs::create_dir_all(&anat).unwrap();
    fs::write(anat.join(format!("{subject}_T1w.nii.gz")), b"T1DATA").unwrap();
    fs::write(
        anat.join(format!("{subject}_T1w.json")),
        br#"{"Modality": "MR"}"#,
    )
    .unwrap();
}

/// Derivative files under the subject's `anat/` folder, keyed by filename,
/// excluding the run log.
fn anat_derivatives(anat_dir: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    for entry in fs::read_dir(anat_dir).unwrap().flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.ends_with("_log.txt") {
            continue;
        }
        files.insert(name, fs::read(entry.path()).unwrap());
    }
    files
}

#[test]
fn test_check_input_without_t1_fails_and_copies_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let bids = tmp.path().join("bids");
    let out = tmp.path().join("derivatives");
    fs::create_dir_all(bids.join("sub-01/anat")).unwrap();

    let config = PipelineConfig::new(&bids, &out, "sub-01");
    let pipeline = AnatomicalPipeline::new(&config).unwrap();
    let input = pipeline.check_input(&BidsLayout::new(&bids)).unwrap();

    assert!(!input.valid());
    assert!(input.staged_t1.is_none());
    assert!(!out.join("cmp").exists());
}

#[test]
fn test_check_input_stages_copy_idempotently() {
    let tmp = tempfile::tempdir().unwrap();
    let bids = tmp.path().join("bids");
    let out = tmp.path().join("derivatives");
    write_bids_fixture(&bids, "sub-01", None);

    let config = PipelineConfig::new(&bids, &out, "sub-01");
    let pipeline = AnatomicalPipeline::new(&config).unwrap();
    let layout = BidsLayout::new(&bids);

    let input = pipeline.check_input(&layout).unwrap();
    assert!(input.valid());
    assert!(input.sidecar_available);

    let staged = input.staged_t1.unwrap();
    assert!(staged.ends_with("cmp/sub-01/anat/sub-01_desc-cmp_T1w.nii.gz"));
    assert_eq!(fs::read(&staged).unwrap(), b"T1DATA");
    assert!(out
        .join("cmp/sub-01/anat/sub-01_desc-cmp_T1w.json")
        .is_file());

    // Re-running leaves the existing copy alone.
    fs::write(&staged, b"ALREADY_STAGED").unwrap();
    let again = pipeline.check_input(&layout).unwrap();
    assert!(again.valid());
    assert_eq!(fs::read(&staged).unwrap(), b"ALREADY_STAGED");
}

#[tokio::test]
async fn test_full_run_produces_all_derivatives() {
    let tmp = tempfile::tempdir().unwrap();
    let bids = tmp.path().join("bids");
    let out = tmp.path().join("derivatives");
    write_bids_fixture(&bids, "sub-01", None);

    let config = PipelineConfig::new(&bids, &out, "sub-01");
    let mut pipeline = AnatomicalPipeline::new(&config).unwrap();
    assert!(pipeline.check_input(&BidsLayout::new(&bids)).unwrap().valid());

    let report = pipeline.process_with(fake_registry()).await.unwrap();
    assert_eq!(report.message, "Processing successful");

    let output = pipeline.check_output();
    assert!(output.valid, "missing: {:?}", output.missing);

    let anat = out.join("cmp/sub-01/anat");
    for name in [
        "sub-01_desc-head_T1w.nii.gz",
        "sub-01_desc-brain_T1w.nii.gz",
        "sub-01_desc-brainmask_dseg.nii.gz",
        "sub-01_label-WM_dseg.nii.gz",
        "sub-01_label-GM_dseg.nii.gz",
        "sub-01_desc-aseg_dseg.nii.gz",
        "sub-01_desc-aparcaseg_dseg.nii.gz",
    ] {
        assert!(anat.join(name).is_file(), "missing {name}");
    }
    for scale in 1..=5 {
        for name in [
            format!("sub-01_label-L2018_desc-scale{scale}_atlas.nii.gz"),
            format!("sub-01_label-L2018_desc-scale{scale}_atlas.graphml"),
            format!("sub-01_label-L2018_desc-scale{scale}_atlas_FreeSurferColorLUT.txt"),
            format!("sub-01_label-L2018_desc-scale{scale}_stats.tsv"),
        ] {
            assert!(anat.join(&name).is_file(), "missing {name}");
        }
    }

    // Run side artifacts.
    assert!(anat.join("sub-01_desc-neuroparc_log.txt").is_file());
    assert!(out
        .join("nipype/sub-01/anatomical_pipeline.dot")
        .is_file());

    // No stage left an unfinished marker behind.
    assert_eq!(pipeline.segmentation.is_running(), 0);
    assert_eq!(pipeline.parcellation.is_running(), 0);
}

#[tokio::test]
async fn test_session_run_uses_session_prefix() {
    let tmp = tempfile::tempdir().unwrap();
    let bids = tmp.path().join("bids");
    let out = tmp.path().join("derivatives");
    write_bids_fixture(&bids, "sub-01", Some("ses-02"));

    let mut config = PipelineConfig::new(&bids, &out, "sub-01");
    config.session = Some("ses-02".into());
    let mut pipeline = AnatomicalPipeline::new(&config).unwrap();
    assert!(pipeline.check_input(&BidsLayout::new(&bids)).unwrap().valid());
    pipeline.process_with(fake_registry()).await.unwrap();

    let output = pipeline.check_output();
    assert!(output.valid, "missing: {:?}", output.missing);
    assert!(out
        .join("cmp/sub-01/ses-02/anat/sub-01_ses-02_desc-head_T1w.nii.gz")
        .is_file());
    assert!(out
        .join("cmp/sub-01/ses-02/anat/sub-01_ses-02_label-L2018_desc-scale3_atlas.nii.gz")
        .is_file());
}

#[tokio::test]
async fn test_disabled_parcellation_is_omitted_and_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let bids = tmp.path().join("bids");
    let out = tmp.path().join("derivatives");
    write_bids_fixture(&bids, "sub-01", None);

    let mut config = PipelineConfig::new(&bids, &out, "sub-01");
    config.parcellation.enabled = false;
    let mut pipeline = AnatomicalPipeline::new(&config).unwrap();
    assert!(pipeline.check_input(&BidsLayout::new(&bids)).unwrap().valid());
    pipeline.process_with(fake_registry()).await.unwrap();

    // The sink never received the parcellation ports.
    let anat = out.join("cmp/sub-01/anat");
    assert!(!anat.join("sub-01_desc-head_T1w.nii.gz").exists());
    assert!(!anat.join("sub-01_label-WM_dseg.nii.gz").exists());

    let output = pipeline.check_output();
    assert!(!output.valid);
    assert!(!output.missing.is_empty());
    // Aggregated: head, brain, brain mask, WM mask, and the atlas glob.
    assert_eq!(output.missing.len(), 5);
    for message in &output.missing {
        assert!(!message.is_empty());
    }
}

#[tokio::test]
async fn test_parallel_run_matches_serial_run() {
    let tmp = tempfile::tempdir().unwrap();
    let bids = tmp.path().join("bids");
    write_bids_fixture(&bids, "sub-01", None);

    let mut anat_dirs = Vec::new();
    for (label, workers) in [("serial", 1), ("parallel", 4)] {
        let out = tmp.path().join(format!("derivatives_{label}"));
        let mut config = PipelineConfig::new(&bids, &out, "sub-01");
        config.number_of_cores = workers;
        let mut pipeline = AnatomicalPipeline::new(&config).unwrap();
        assert!(pipeline.check_input(&BidsLayout::new(&bids)).unwrap().valid());
        pipeline.process_with(fake_registry()).await.unwrap();
        assert!(pipeline.check_output().valid);
        anat_dirs.push(out.join("cmp/sub-01/anat"));
    }

    let serial = anat_derivatives(&anat_dirs[0]);
    let parallel = anat_derivatives(&anat_dirs[1]);
    assert_eq!(
        serial.keys().collect::<Vec<_>>(),
        parallel.keys().collect::<Vec<_>>()
    );
    for (name, content) in &serial {
        assert_eq!(content, &parallel[name], "content differs for {name}");
    }
}

#[tokio::test]
async fn test_custom_segmentation_path_skips_freesurfer_linkage() {
    let tmp = tempfile::tempdir().unwrap();
    let bids = tmp.path().join("bids");
    let out = tmp.path().join("derivatives");
    write_bids_fixture(&bids, "sub-01", None);

    // User-supplied masks and atlases, named as the custom tool emits them.
    let masks = tmp.path().join("masks");
    fs::create_dir_all(&masks).unwrap();
    let wm_mask = masks.join("fsmask_1mm.nii.gz");
    fs::write(&wm_mask, b"wm").unwrap();
    let graphml = masks.join("atlas.graphml");
    fs::write(&graphml, b"<graphml/>").unwrap();
    let mut volumes = std::collections::HashMap::new();
    for scale in 1..=2u8 {
        let volume = masks.join(format!("ROIv_HR_th_scale{scale}.nii.gz"));
        fs::write(&volume, vec![scale]).unwrap();
        volumes.insert(scale, volume);
    }

    let mut config = PipelineConfig::new(&bids, &out, "sub-01");
    config.segmentation.tool = SegmentationTool::Custom;
    config.segmentation.white_matter_mask = Some(wm_mask);
    config.parcellation.custom_atlas_volumes = volumes;
    config.parcellation.custom_graphml = Some(graphml);

    let mut pipeline = AnatomicalPipeline::new(&config).unwrap();
    pipeline.check_config().unwrap();
    assert!(pipeline.check_input(&BidsLayout::new(&bids)).unwrap().valid());
    pipeline.process_with(fake_registry()).await.unwrap();

    // Custom naming table applies; nothing came from a FreeSurfer run.
    let anat = out.join("cmp/sub-01/anat");
    assert!(anat.join("sub-01_T1w_class-WM.nii.gz").is_file());
    assert!(anat.join("sub-01_T1w_parc_scale1.nii.gz").is_file());
    assert!(anat.join("sub-01_T1w_parc_scale2.nii.gz").is_file());
    assert!(!anat.join("sub-01_desc-head_T1w.nii.gz").exists());
}

#[tokio::test]
async fn test_custom_config_with_missing_files_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let bids = tmp.path().join("bids");
    let out = tmp.path().join("derivatives");
    write_bids_fixture(&bids, "sub-01", None);

    let mut config = PipelineConfig::new(&bids, &out, "sub-01");
    config.segmentation.tool = SegmentationTool::Custom;
    config.segmentation.white_matter_mask = Some(PathBuf::from("/nowhere/wm.nii.gz"));
    let pipeline = AnatomicalPipeline::new(&config).unwrap();
    assert!(pipeline.check_config().is_err());
}
