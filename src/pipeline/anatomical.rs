//! The anatomical pipeline orchestrator.
//!
//! Control flow: construct, [`check_input`](AnatomicalPipeline::check_input)
//! to stage the raw T1 image, [`process`](AnatomicalPipeline::process) to
//! build and execute the flow graph, then
//! [`check_output`](AnatomicalPipeline::check_output) to verify the expected
//! derivatives exist.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::bids::derivatives::{
    is_atlas_volume_name, run_log_name, DESC_BRAINMASK_DSEG, DESC_BRAIN_T1W, DESC_CMP_T1W,
    DESC_CMP_T1W_JSON, DESC_HEAD_T1W, LABEL_WM_DSEG,
};
use crate::bids::{DatasetQuery, SubjectRef};
use crate::config::{ParcellationScheme, PipelineConfig, SegmentationTool};
use crate::engine::{Dispatcher, EngineConfig, NodeExecutorRegistry, RunConfig, RunLog};
use crate::error::{PipelineError, PipelineResult};
use crate::flow::{node_config, FlowBuilder, FlowDefinition, FlowNode};
use crate::nodes::{IdentitySpec, SinkSpec, SourceSpec};
use crate::stage::{ParcellationStage, SegmentationStage, StageFlow};

use super::common::PipelineBase;
use super::substitutions::substitutions_for;

/// Output port of `outputnode` and the namespaced sink entry it lands in.
fn sink_ports() -> [(&'static str, &'static str); 11] {
    [
        ("T1", "anat.@T1"),
        ("aseg", "anat.@aseg"),
        ("aparc_aseg", "anat.@aparc_aseg"),
        ("brain", "anat.@brain"),
        ("brain_mask", "anat.@brain_mask"),
        ("wm_mask_file", "anat.@wm_mask"),
        ("gm_mask_file", "anat.@gm_mask"),
        ("roi_volumes", "anat.@roivs"),
        ("roi_colorLUTs", "anat.@luts"),
        ("roi_graphMLs", "anat.@graphmls"),
        ("roi_volumes_stats", "anat.@stats"),
    ]
}

/// Result of the input check.
#[derive(Debug, Clone)]
pub struct InputCheck {
    pub t1_available: bool,
    pub sidecar_available: bool,
    /// Where the raw image was staged in the derivatives tree, when found.
    pub staged_t1: Option<PathBuf>,
}

impl InputCheck {
    /// True iff the anatomical image was found. A missing sidecar only
    /// downgrades to a warning.
    pub fn valid(&self) -> bool {
        self.t1_available
    }
}

/// Result of the output check, with every missing artifact recorded.
#[derive(Debug, Clone, Default)]
pub struct OutputCheck {
    pub valid: bool,
    pub missing: Vec<String>,
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub message: String,
}

pub struct AnatomicalPipeline {
    base: PipelineBase,
    pub segmentation: SegmentationStage,
    pub parcellation: ParcellationStage,
}

impl AnatomicalPipeline {
    pub fn new(config: &PipelineConfig) -> PipelineResult<Self> {
        let base = PipelineBase::new(config)?;
        let work_dir = base.work_dir();
        Ok(AnatomicalPipeline {
            segmentation: SegmentationStage::new(config.segmentation.clone(), &work_dir),
            parcellation: ParcellationStage::new(config.parcellation.clone(), &work_dir),
            base,
        })
    }

    pub fn base(&self) -> &PipelineBase {
        &self.base
    }

    pub fn subject(&self) -> &SubjectRef {
        self.base.subject()
    }

    /// The scheme the parcellation stage will run with, derived from the
    /// segmentation tool unless the config pinned it explicitly.
    pub fn scheme(&self) -> ParcellationScheme {
        self.parcellation
            .config
            .scheme
            .unwrap_or_else(|| self.segmentation.config.tool.implied_scheme())
    }

    /// Validate that files referenced by the custom tool path exist.
    pub fn check_config(&self) -> PipelineResult<()> {
        if self.segmentation.config.tool != SegmentationTool::Custom {
            return Ok(());
        }
        let wm_mask = self.segmentation.config.white_matter_mask.as_ref().ok_or_else(|| {
            PipelineError::Config(
                "custom segmentation selected but no white-matter mask configured".into(),
            )
        })?;
        if !wm_mask.is_file() {
            return Err(PipelineError::Config(format!(
                "white-matter mask {} does not exist",
                wm_mask.display()
            )));
        }
        for (scale, volume) in &self.parcellation.config.custom_atlas_volumes {
            if !volume.is_file() {
                return Err(PipelineError::Config(format!(
                    "custom atlas volume for scale {scale} not found at {}",
                    volume.display()
                )));
            }
        }
        match &self.parcellation.config.custom_graphml {
            Some(graphml) if !graphml.is_file() => Err(PipelineError::Config(format!(
                "custom graphml description not found at {}",
                graphml.display()
            ))),
            Some(_) => Ok(()),
            None => Err(PipelineError::Config(
                "custom parcellation selected but no graphml description configured".into(),
            )),
        }
    }

    /// Locate the raw T1 image and its sidecar, and stage both into the
    /// derivatives tree under the `desc-cmp` rename.
    ///
    /// The copy is idempotent: an existing destination is left alone. A
    /// missing sidecar is a warning, not a failure.
    pub fn check_input(&self, layout: &dyn DatasetQuery) -> PipelineResult<InputCheck> {
        info!("**** Check Inputs ****");
        let subject = self.base.subject();
        info!("  > Looking in {} ...", self.base.base_directory().display());

        let t1_file = self.locate(layout, ".nii.gz", subject.raw_t1w(self.base.base_directory()));
        info!("  ... t1_file : {}", t1_file.display());
        let t1_json_file = self.locate(
            layout,
            ".json",
            subject.raw_t1w_sidecar(self.base.base_directory()),
        );
        info!("  ... t1_json_file : {}", t1_json_file.display());

        // Presence is a filesystem check on the resolved path, independent
        // of what the query returned.
        let t1_available = t1_file.is_file();
        let sidecar_available = t1_json_file.is_file();

        let mut staged_t1 = None;
        if t1_available {
            let anat_dir = self.base.deriv_anat_dir();
            fs::create_dir_all(&anat_dir).map_err(|e| PipelineError::io(&anat_dir, e))?;

            let dest = anat_dir.join(subject.derivative_name(DESC_CMP_T1W));
            self.stage_copy(&t1_file, &dest)?;
            staged_t1 = Some(dest);

            if sidecar_available {
                let dest = anat_dir.join(subject.derivative_name(DESC_CMP_T1W_JSON));
                self.stage_copy(&t1_json_file, &dest)?;
            }
            info!("  * Inputs check finished successfully.");
        } else {
            error!(
                "  * Error: no anatomical data available in {}",
                subject.subject_dir(self.base.base_directory()).join("anat").display()
            );
        }

        if !sidecar_available {
            warn!("  * Warning: missing BIDS json sidecar");
        }

        Ok(InputCheck {
            t1_available,
            sidecar_available,
            staged_t1,
        })
    }

    fn locate(&self, layout: &dyn DatasetQuery, extension: &str, fallback: PathBuf) -> PathBuf {
        let subject = self.base.subject();
        layout
            .find(
                subject.subject_label(),
                subject.session_label(),
                "T1w",
                extension,
            )
            .into_iter()
            .next()
            .unwrap_or(fallback)
    }

    fn stage_copy(&self, src: &Path, dest: &Path) -> PipelineResult<()> {
        if dest.is_file() {
            return Ok(());
        }
        info!("  * Copying {} to {}", src.display(), dest.display());
        fs::copy(src, dest).map_err(|e| PipelineError::io(src, e))?;
        Ok(())
    }

    /// Build the flow graph for this run: datasource, input adapter, the
    /// enabled stage sub-graphs, the output adapter, and the derivatives
    /// sink with the tool-specific naming-substitution table.
    pub fn create_flow(&mut self, deriv_dir: &Path) -> PipelineResult<FlowDefinition> {
        info!("**** Create pipeline flow ****");
        let subject = self.base.subject().clone();
        let output_root = self.base.output_directory().to_path_buf();
        let mut builder = FlowBuilder::new("anatomical_pipeline");

        let datasource = SourceSpec {
            base_directory: deriv_dir.to_path_buf(),
            field_templates: HashMap::from([(
                "T1".to_string(),
                format!("anat/{}", subject.derivative_name(DESC_CMP_T1W)),
            )]),
            list_field_templates: HashMap::new(),
            raise_if_empty: false,
        };
        builder.add_node(FlowNode::new("datasource", "source", node_config(&datasource)?))?;

        builder.add_node(FlowNode::new(
            "inputnode",
            "identity",
            node_config(&IdentitySpec {
                fields: vec!["T1".into()],
            })?,
        ))?;
        builder.connect("datasource", "T1", "inputnode", "T1")?;

        let mut output_fields: Vec<String> =
            sink_ports().iter().map(|(port, _)| port.to_string()).collect();
        output_fields.push("subjects_dir".into());
        output_fields.push("subject_id".into());
        builder.add_node(FlowNode::new(
            "outputnode",
            "identity",
            node_config(&IdentitySpec {
                fields: output_fields.clone(),
            })?,
        ))?;

        let seg_flow: Option<StageFlow> = if self.segmentation.enabled {
            let stage_flow =
                self.segmentation
                    .add_to_flow(&mut builder, &subject, &output_root)?;
            if let Some(input_node) = &stage_flow.input_node {
                if stage_flow.input_ports.iter().any(|p| p == "T1") {
                    builder.connect("inputnode", "T1", input_node, "T1")?;
                }
            }
            for port in &stage_flow.output_ports {
                if output_fields.contains(port) {
                    builder.connect(&stage_flow.output_node, port, "outputnode", port)?;
                }
            }
            Some(stage_flow)
        } else {
            None
        };

        if self.parcellation.enabled {
            let parc_flow = self.parcellation.add_to_flow(&mut builder, self.scheme())?;
            // Only the full-featured tool hands its subjects dir onward; the
            // custom path feeds the parcellation stage directly from config.
            if self.segmentation.config.tool == SegmentationTool::Freesurfer {
                if let (Some(seg_flow), Some(input_node)) = (&seg_flow, &parc_flow.input_node) {
                    for port in &parc_flow.input_ports {
                        if seg_flow.output_ports.contains(port) {
                            builder.connect(&seg_flow.output_node, port, input_node, port)?;
                        }
                    }
                }
            }
            for port in &parc_flow.output_ports {
                if output_fields.contains(port) {
                    builder.connect(&parc_flow.output_node, port, "outputnode", port)?;
                }
            }
        }

        let sink = SinkSpec {
            base_directory: deriv_dir.to_path_buf(),
            substitutions: substitutions_for(self.segmentation.config.tool, &subject.prefix()),
        };
        builder.add_node(FlowNode::new("anatomical_sinker", "sink", node_config(&sink)?))?;
        for (port, target) in sink_ports() {
            builder.connect("outputnode", port, "anatomical_sinker", target)?;
        }

        builder.build()
    }

    /// Execute the pipeline with the default executors.
    pub async fn process(&mut self) -> PipelineResult<RunReport> {
        self.process_with(Arc::new(NodeExecutorRegistry::new())).await
    }

    /// Execute the pipeline with an explicit executor registry, so callers
    /// can substitute tool execution.
    pub async fn process_with(
        &mut self,
        registry: Arc<NodeExecutorRegistry>,
    ) -> PipelineResult<RunReport> {
        let deriv_dir = self.base.deriv_dir();
        let work_dir = self.base.work_dir();
        let anat_dir = self.base.deriv_anat_dir();
        fs::create_dir_all(&anat_dir).map_err(|e| PipelineError::io(&anat_dir, e))?;
        fs::create_dir_all(&work_dir).map_err(|e| PipelineError::io(&work_dir, e))?;

        // Reset any stale run log before starting.
        let log_path = anat_dir.join(run_log_name(&self.base.subject().prefix()));
        if log_path.is_file() {
            fs::remove_file(&log_path).map_err(|e| PipelineError::io(&log_path, e))?;
        }
        let log = RunLog::to_file(&log_path).map_err(|e| PipelineError::io(&log_path, e))?;

        let flow = self.create_flow(&deriv_dir)?;

        // Side artifact only; a failed rendering must not abort the run.
        let dot_path = work_dir.join("anatomical_pipeline.dot");
        if let Err(e) = fs::write(&dot_path, flow.to_dot()) {
            warn!("could not write graph rendering to {}: {e}", dot_path.display());
        }

        let run_config = RunConfig {
            work_dir,
            log,
            engine: EngineConfig {
                workers: self.base.number_of_cores(),
                stop_on_first_failure: true,
                keep_intermediate_outputs: true,
            },
        };
        let dispatcher = Dispatcher::new(registry, run_config);
        let summary = dispatcher.run(&flow).await?;

        Ok(RunReport {
            run_id: summary.run_id,
            message: "Processing successful".into(),
        })
    }

    /// Verify the expected derivatives of a run, aggregating every missing
    /// artifact instead of keeping only the last failure.
    pub fn check_output(&self) -> OutputCheck {
        info!("**** Check Outputs ****");
        let subject = self.base.subject();
        let anat_dir = self.base.deriv_anat_dir();
        let prefix = subject.prefix();
        let mut missing = Vec::new();

        for suffix in [
            DESC_HEAD_T1W,
            DESC_BRAIN_T1W,
            DESC_BRAINMASK_DSEG,
            LABEL_WM_DSEG,
        ] {
            let path = anat_dir.join(subject.derivative_name(suffix));
            if !path.is_file() {
                let message = format!(
                    "Missing anatomical output file {}. Please re-run the anatomical pipeline",
                    path.display()
                );
                error!("  * {message}");
                missing.push(message);
            }
        }

        let atlas_volumes = self.find_atlas_volumes(&anat_dir, &prefix);
        let existing = atlas_volumes.iter().filter(|p| p.is_file()).count();
        if atlas_volumes.is_empty() {
            let message = format!(
                "Missing parcellation atlas volumes in {}. Please re-run the anatomical pipeline",
                anat_dir.display()
            );
            error!("  * {message}");
            missing.push(message);
        } else if existing < atlas_volumes.len() {
            let message = format!(
                "Missing {}/{} parcellation output files. Please re-run the anatomical pipeline",
                atlas_volumes.len() - existing,
                atlas_volumes.len()
            );
            error!("  * {message}");
            missing.push(message);
        }

        let valid = missing.is_empty();
        if valid {
            info!("  * Valid outputs");
        }
        OutputCheck { valid, missing }
    }

    fn find_atlas_volumes(&self, anat_dir: &Path, prefix: &str) -> Vec<PathBuf> {
        let entries = match fs::read_dir(anat_dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };
        let mut volumes: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|name| is_atlas_volume_name(prefix, name))
            })
            .collect();
        volumes.sort();
        volumes
    }
}
