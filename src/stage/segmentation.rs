//! Segmentation stage: tissue classification of the T1 image.
//!
//! The full-featured path runs FreeSurfer's `recon-all` and exposes the
//! resulting subjects directory to downstream stages. The custom path skips
//! the tool entirely and exposes a user-supplied white-matter mask instead.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::bids::SubjectRef;
use crate::config::{SegmentationConfig, SegmentationTool};
use crate::error::{PipelineError, PipelineResult};
use crate::flow::{FlowBuilder, FlowNode};
use crate::nodes::{IdentitySpec, OutputSpec, SourceSpec, ToolSpec};

use super::{node_config, path_string, stage_dir_under, Stage, StageFlow};

pub struct SegmentationStage {
    pub enabled: bool,
    pub config: SegmentationConfig,
    stage_dir: PathBuf,
}

impl Stage for SegmentationStage {
    fn name(&self) -> &'static str {
        "segmentation"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn stage_dir(&self) -> &Path {
        &self.stage_dir
    }
}

impl SegmentationStage {
    pub fn new(config: SegmentationConfig, work_dir: &Path) -> Self {
        SegmentationStage {
            enabled: config.enabled,
            config,
            stage_dir: stage_dir_under(work_dir, "segmentation"),
        }
    }

    /// Add this stage's sub-graph to the flow.
    ///
    /// Selecting the Freesurfer tool also registers the tool's subjects
    /// directory on the stage configuration, so later inspection sees where
    /// the external tool worked.
    pub fn add_to_flow(
        &mut self,
        builder: &mut FlowBuilder,
        subject: &SubjectRef,
        output_root: &Path,
    ) -> PipelineResult<StageFlow> {
        match self.config.tool {
            SegmentationTool::Freesurfer => self.add_freesurfer_flow(builder, subject, output_root),
            SegmentationTool::Custom => self.add_custom_flow(builder),
        }
    }

    fn add_freesurfer_flow(
        &mut self,
        builder: &mut FlowBuilder,
        subject: &SubjectRef,
        output_root: &Path,
    ) -> PipelineResult<StageFlow> {
        let subjects_dir = output_root.join("freesurfer");
        let subject_id = subjects_dir.join(subject.subject());
        self.config.freesurfer_subjects_dir = Some(subjects_dir.clone());
        self.config.freesurfer_subject_id = Some(subject_id.clone());

        builder.add_node(FlowNode::new(
            "segmentation.inputnode",
            "identity",
            node_config(&IdentitySpec {
                fields: vec!["T1".into()],
            })?,
        ))?;

        let recon_all = ToolSpec {
            program: "recon-all".into(),
            args: vec![
                "-all".into(),
                "-i".into(),
                "{T1}".into(),
                "-s".into(),
                subject.subject().to_string(),
                "-sd".into(),
                path_string(&subjects_dir),
            ],
            env: HashMap::from([("SUBJECTS_DIR".to_string(), path_string(&subjects_dir))]),
            outputs: HashMap::from([
                (
                    "subjects_dir".to_string(),
                    OutputSpec::Value {
                        value: path_string(&subjects_dir),
                    },
                ),
                (
                    "subject_id".to_string(),
                    OutputSpec::Value {
                        value: path_string(&subject_id),
                    },
                ),
            ]),
        };
        builder.add_node(FlowNode::new(
            "segmentation.recon_all",
            "tool",
            node_config(&recon_all)?,
        ))?;

        builder.add_node(FlowNode::new(
            "segmentation.outputnode",
            "identity",
            node_config(&IdentitySpec {
                fields: vec!["subjects_dir".into(), "subject_id".into()],
            })?,
        ))?;

        builder.connect("segmentation.inputnode", "T1", "segmentation.recon_all", "T1")?;
        builder.connect(
            "segmentation.recon_all",
            "subjects_dir",
            "segmentation.outputnode",
            "subjects_dir",
        )?;
        builder.connect(
            "segmentation.recon_all",
            "subject_id",
            "segmentation.outputnode",
            "subject_id",
        )?;

        Ok(StageFlow {
            input_node: Some("segmentation.inputnode".into()),
            input_ports: vec!["T1".into()],
            output_node: "segmentation.outputnode".into(),
            output_ports: vec!["subjects_dir".into(), "subject_id".into()],
        })
    }

    fn add_custom_flow(&mut self, builder: &mut FlowBuilder) -> PipelineResult<StageFlow> {
        let wm_mask = self.config.white_matter_mask.as_ref().ok_or_else(|| {
            PipelineError::Config(
                "custom segmentation selected but no white-matter mask configured".into(),
            )
        })?;

        let masks = SourceSpec {
            base_directory: PathBuf::from("/"),
            field_templates: HashMap::from([(
                "wm_mask_file".to_string(),
                path_string(wm_mask),
            )]),
            list_field_templates: HashMap::new(),
            raise_if_empty: true,
        };
        builder.add_node(FlowNode::new(
            "segmentation.custom_masks",
            "source",
            node_config(&masks)?,
        ))?;

        builder.add_node(FlowNode::new(
            "segmentation.outputnode",
            "identity",
            node_config(&IdentitySpec {
                fields: vec!["wm_mask_file".into()],
            })?,
        ))?;
        builder.connect(
            "segmentation.custom_masks",
            "wm_mask_file",
            "segmentation.outputnode",
            "wm_mask_file",
        )?;

        Ok(StageFlow {
            input_node: None,
            input_ports: Vec::new(),
            output_node: "segmentation.outputnode".into(),
            output_ports: vec!["wm_mask_file".into()],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;

    fn subject() -> SubjectRef {
        SubjectRef::new("sub-01", None)
    }

    #[test]
    fn test_freesurfer_flow_registers_subjects_dir() {
        let cfg = PipelineConfig::new("/bids", "/out", "sub-01");
        let mut stage = SegmentationStage::new(cfg.segmentation, Path::new("/out/nipype/sub-01"));
        let mut builder = FlowBuilder::new("t");
        let flow = stage
            .add_to_flow(&mut builder, &subject(), Path::new("/out"))
            .unwrap();

        assert_eq!(
            stage.config.freesurfer_subjects_dir.as_deref(),
            Some(Path::new("/out/freesurfer"))
        );
        assert_eq!(
            stage.config.freesurfer_subject_id.as_deref(),
            Some(Path::new("/out/freesurfer/sub-01"))
        );
        assert_eq!(flow.output_ports, vec!["subjects_dir", "subject_id"]);
        let built = builder.build().unwrap();
        assert!(built.contains("segmentation.recon_all"));
    }

    #[test]
    fn test_custom_flow_requires_wm_mask() {
        let mut cfg = PipelineConfig::new("/bids", "/out", "sub-01");
        cfg.segmentation.tool = SegmentationTool::Custom;
        let mut stage = SegmentationStage::new(cfg.segmentation, Path::new("/work"));
        let mut builder = FlowBuilder::new("t");
        assert!(stage
            .add_to_flow(&mut builder, &subject(), Path::new("/out"))
            .is_err());
    }

    #[test]
    fn test_custom_flow_exposes_wm_mask() {
        let mut cfg = PipelineConfig::new("/bids", "/out", "sub-01");
        cfg.segmentation.tool = SegmentationTool::Custom;
        cfg.segmentation.white_matter_mask = Some(PathBuf::from("/masks/wm.nii.gz"));
        let mut stage = SegmentationStage::new(cfg.segmentation, Path::new("/work"));
        let mut builder = FlowBuilder::new("t");
        let flow = stage
            .add_to_flow(&mut builder, &subject(), Path::new("/out"))
            .unwrap();
        assert!(flow.input_node.is_none());
        assert_eq!(flow.output_ports, vec!["wm_mask_file"]);
        assert!(builder.build().unwrap().contains("segmentation.custom_masks"));
    }

    #[test]
    fn test_stage_dir_and_markers() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = PipelineConfig::new("/bids", "/out", "sub-01");
        let stage = SegmentationStage::new(cfg.segmentation, tmp.path());
        assert_eq!(stage.is_running(), 0);

        let report = stage.stage_dir().join("recon_all/_report");
        std::fs::create_dir_all(&report).unwrap();
        std::fs::write(report.join("recon_all_unfinished.json"), b"{}").unwrap();
        assert_eq!(stage.is_running(), 1);
    }
}
