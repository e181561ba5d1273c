//! Parcellation stage: multiscale region-of-interest atlases.
//!
//! With the Lausanne2018 scheme the stage drives the external multiscale
//! parcellation tool over the FreeSurfer subjects directory produced by the
//! segmentation stage, declaring one atlas volume, color lookup table, graph
//! description, and statistics table per scale. With the custom scheme the
//! atlas files are supplied directly by the user.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::bids::derivatives::SCALES;
use crate::config::{ParcellationConfig, ParcellationScheme};
use crate::error::{PipelineError, PipelineResult};
use crate::flow::{FlowBuilder, FlowNode};
use crate::nodes::{IdentitySpec, OutputSpec, SourceSpec, ToolSpec};

use super::{node_config, path_string, stage_dir_under, Stage, StageFlow};

pub struct ParcellationStage {
    pub enabled: bool,
    pub config: ParcellationConfig,
    stage_dir: PathBuf,
}

impl Stage for ParcellationStage {
    fn name(&self) -> &'static str {
        "parcellation"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn stage_dir(&self) -> &Path {
        &self.stage_dir
    }
}

impl ParcellationStage {
    pub fn new(config: ParcellationConfig, work_dir: &Path) -> Self {
        ParcellationStage {
            enabled: config.enabled,
            config,
            stage_dir: stage_dir_under(work_dir, "parcellation"),
        }
    }

    pub fn add_to_flow(
        &self,
        builder: &mut FlowBuilder,
        scheme: ParcellationScheme,
    ) -> PipelineResult<StageFlow> {
        match scheme {
            ParcellationScheme::Lausanne2018 => self.add_lausanne_flow(builder),
            ParcellationScheme::Custom => self.add_custom_flow(builder),
        }
    }

    fn add_lausanne_flow(&self, builder: &mut FlowBuilder) -> PipelineResult<StageFlow> {
        builder.add_node(FlowNode::new(
            "parcellation.inputnode",
            "identity",
            node_config(&IdentitySpec {
                fields: vec!["subjects_dir".into(), "subject_id".into()],
            })?,
        ))?;

        let mut outputs: HashMap<String, OutputSpec> = HashMap::from([
            (
                "T1".to_string(),
                OutputSpec::File {
                    file: "T1.nii.gz".into(),
                },
            ),
            (
                "brain".to_string(),
                OutputSpec::File {
                    file: "brain.nii.gz".into(),
                },
            ),
            (
                "brain_mask".to_string(),
                OutputSpec::File {
                    file: "brain_mask.nii.gz".into(),
                },
            ),
            (
                "aseg".to_string(),
                OutputSpec::File {
                    file: "aseg.nii.gz".into(),
                },
            ),
            (
                "aparc_aseg".to_string(),
                OutputSpec::File {
                    file: "aparc+aseg.Lausanne2018.native.nii.gz".into(),
                },
            ),
            (
                "wm_mask_file".to_string(),
                OutputSpec::File {
                    file: "fsmask_1mm.nii.gz".into(),
                },
            ),
            (
                "gm_mask_file".to_string(),
                OutputSpec::File {
                    file: "T1w_class-GM.nii.gz".into(),
                },
            ),
        ]);
        outputs.insert(
            "roi_volumes".to_string(),
            OutputSpec::Files {
                files: SCALES
                    .iter()
                    .map(|s| format!("ROIv_HR_th_scale{s}.nii.gz"))
                    .collect(),
            },
        );
        outputs.insert(
            "roi_colorLUTs".to_string(),
            OutputSpec::Files {
                files: SCALES
                    .iter()
                    .map(|s| format!("ROIv_HR_th_scale{s}_FreeSurferColorLUT.txt"))
                    .collect(),
            },
        );
        outputs.insert(
            "roi_graphMLs".to_string(),
            OutputSpec::Files {
                files: SCALES
                    .iter()
                    .map(|s| format!("ROIv_HR_th_scale{s}.graphml"))
                    .collect(),
            },
        );
        outputs.insert(
            "roi_volumes_stats".to_string(),
            OutputSpec::Files {
                files: SCALES
                    .iter()
                    .map(|s| format!("roi_stats_scale{s}.tsv"))
                    .collect(),
            },
        );

        let parcellate = ToolSpec {
            program: "multiscale_parcellation".into(),
            args: vec![
                "--subjects-dir".into(),
                "{subjects_dir}".into(),
                "--subject".into(),
                "{subject_id}".into(),
                "--scheme".into(),
                "Lausanne2018".into(),
            ],
            env: HashMap::new(),
            outputs,
        };
        builder.add_node(FlowNode::new(
            "parcellation.parcellate",
            "tool",
            node_config(&parcellate)?,
        ))?;

        let output_ports: Vec<String> = [
            "T1",
            "brain",
            "brain_mask",
            "aseg",
            "aparc_aseg",
            "wm_mask_file",
            "gm_mask_file",
            "roi_volumes",
            "roi_colorLUTs",
            "roi_graphMLs",
            "roi_volumes_stats",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        builder.add_node(FlowNode::new(
            "parcellation.outputnode",
            "identity",
            node_config(&IdentitySpec {
                fields: output_ports.clone(),
            })?,
        ))?;

        for port in ["subjects_dir", "subject_id"] {
            builder.connect(
                "parcellation.inputnode",
                port,
                "parcellation.parcellate",
                port,
            )?;
        }
        for port in &output_ports {
            builder.connect(
                "parcellation.parcellate",
                port,
                "parcellation.outputnode",
                port,
            )?;
        }

        Ok(StageFlow {
            input_node: Some("parcellation.inputnode".into()),
            input_ports: vec!["subjects_dir".into(), "subject_id".into()],
            output_node: "parcellation.outputnode".into(),
            output_ports,
        })
    }

    fn add_custom_flow(&self, builder: &mut FlowBuilder) -> PipelineResult<StageFlow> {
        if self.config.custom_atlas_volumes.is_empty() {
            return Err(PipelineError::Config(
                "custom parcellation selected but no atlas volumes configured".into(),
            ));
        }
        let graphml = self.config.custom_graphml.as_ref().ok_or_else(|| {
            PipelineError::Config(
                "custom parcellation selected but no graphml description configured".into(),
            )
        })?;

        let mut scales: Vec<&u8> = self.config.custom_atlas_volumes.keys().collect();
        scales.sort();
        let volumes: Vec<String> = scales
            .iter()
            .map(|s| path_string(&self.config.custom_atlas_volumes[s]))
            .collect();

        let atlas = SourceSpec {
            base_directory: PathBuf::from("/"),
            field_templates: HashMap::new(),
            list_field_templates: HashMap::from([
                ("roi_volumes".to_string(), volumes),
                ("roi_graphMLs".to_string(), vec![path_string(graphml)]),
            ]),
            raise_if_empty: true,
        };
        builder.add_node(FlowNode::new(
            "parcellation.custom_atlas",
            "source",
            node_config(&atlas)?,
        ))?;

        let output_ports = vec!["roi_volumes".to_string(), "roi_graphMLs".to_string()];
        builder.add_node(FlowNode::new(
            "parcellation.outputnode",
            "identity",
            node_config(&IdentitySpec {
                fields: output_ports.clone(),
            })?,
        ))?;
        for port in &output_ports {
            builder.connect(
                "parcellation.custom_atlas",
                port,
                "parcellation.outputnode",
                port,
            )?;
        }

        Ok(StageFlow {
            input_node: None,
            input_ports: Vec::new(),
            output_node: "parcellation.outputnode".into(),
            output_ports,
        })
    }
}
