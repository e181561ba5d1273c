//! Pipeline configuration.
//!
//! The configuration is a plain value deserialized from YAML. There is no
//! reactive coupling between stage configs: the parcellation scheme is a
//! pure function of the selected segmentation tool, resolved (and checked)
//! when the flow graph is constructed.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Which external tool performs tissue segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SegmentationTool {
    #[default]
    Freesurfer,
    /// Pre-computed masks supplied by the user instead of a tool run.
    Custom,
}

impl SegmentationTool {
    /// The parcellation scheme implied by this tool choice.
    pub fn implied_scheme(self) -> ParcellationScheme {
        match self {
            SegmentationTool::Freesurfer => ParcellationScheme::Lausanne2018,
            SegmentationTool::Custom => ParcellationScheme::Custom,
        }
    }
}

/// Parcellation scheme applied by the parcellation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParcellationScheme {
    Lausanne2018,
    Custom,
}

/// Segmentation stage section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub tool: SegmentationTool,
    /// White-matter mask for the custom tool path.
    #[serde(default)]
    pub white_matter_mask: Option<PathBuf>,
    /// FreeSurfer SUBJECTS_DIR, registered at graph-construction time when
    /// the Freesurfer tool is selected.
    #[serde(skip)]
    pub freesurfer_subjects_dir: Option<PathBuf>,
    /// FreeSurfer subject path under the subjects dir, registered alongside.
    #[serde(skip)]
    pub freesurfer_subject_id: Option<PathBuf>,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        SegmentationConfig {
            enabled: true,
            tool: SegmentationTool::default(),
            white_matter_mask: None,
            freesurfer_subjects_dir: None,
            freesurfer_subject_id: None,
        }
    }
}

/// Parcellation stage section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParcellationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Explicit scheme override. When absent the scheme implied by the
    /// segmentation tool is used; a conflicting value is a config error.
    #[serde(default)]
    pub scheme: Option<ParcellationScheme>,
    /// Atlas volumes for the custom scheme, keyed by scale number.
    #[serde(default)]
    pub custom_atlas_volumes: HashMap<u8, PathBuf>,
    /// Graph description of the custom atlas.
    #[serde(default)]
    pub custom_graphml: Option<PathBuf>,
}

impl Default for ParcellationConfig {
    fn default() -> Self {
        ParcellationConfig {
            enabled: true,
            scheme: None,
            custom_atlas_volumes: HashMap::new(),
            custom_graphml: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cores() -> usize {
    1
}

/// Top-level pipeline configuration, loadable from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub bids_dir: PathBuf,
    pub output_dir: PathBuf,
    pub subject: String,
    #[serde(default)]
    pub session: Option<String>,
    /// Worker processes handed to the execution engine; 1 means serial.
    #[serde(default = "default_cores")]
    pub number_of_cores: usize,
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    #[serde(default)]
    pub parcellation: ParcellationConfig,
}

impl PipelineConfig {
    pub fn new(
        bids_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        subject: impl Into<String>,
    ) -> Self {
        PipelineConfig {
            bids_dir: bids_dir.into(),
            output_dir: output_dir.into(),
            subject: subject.into(),
            session: None,
            number_of_cores: 1,
            segmentation: SegmentationConfig::default(),
            parcellation: ParcellationConfig::default(),
        }
    }

    pub fn from_yaml_file(path: &Path) -> PipelineResult<Self> {
        let raw = fs::read_to_string(path).map_err(|source| PipelineError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: PipelineConfig =
            serde_yaml::from_str(&raw).map_err(|source| PipelineError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// The scheme the parcellation stage will run with.
    pub fn effective_scheme(&self) -> ParcellationScheme {
        self.parcellation
            .scheme
            .unwrap_or_else(|| self.segmentation.tool.implied_scheme())
    }

    /// Structural checks that need no filesystem access.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.subject.is_empty() {
            return Err(PipelineError::Config("subject must not be empty".into()));
        }
        if !self.subject.starts_with("sub-") {
            return Err(PipelineError::Config(format!(
                "subject `{}` is not BIDS-formatted (expected `sub-<label>`)",
                self.subject
            )));
        }
        if let Some(ses) = &self.session {
            if !ses.starts_with("ses-") {
                return Err(PipelineError::Config(format!(
                    "session `{ses}` is not BIDS-formatted (expected `ses-<label>`)"
                )));
            }
        }
        if self.number_of_cores == 0 {
            return Err(PipelineError::Config(
                "number_of_cores must be at least 1".into(),
            ));
        }
        if let Some(scheme) = self.parcellation.scheme {
            let tool = self.segmentation.tool;
            let implied = tool.implied_scheme();
            if scheme != implied {
                return Err(PipelineError::Config(format!(
                    "parcellation scheme {scheme:?} conflicts with segmentation tool \
                     {tool:?} (implies {implied:?})"
                )));
            }
        }
        Ok(())
    }
}
