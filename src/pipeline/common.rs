//! Bookkeeping shared by pipelines.

use std::path::{Path, PathBuf};

use chrono::Local;

use crate::bids::SubjectRef;
use crate::config::PipelineConfig;
use crate::error::PipelineResult;

/// Subject/session bookkeeping common to every pipeline flavour.
#[derive(Debug, Clone)]
pub struct PipelineBase {
    subject: SubjectRef,
    base_directory: PathBuf,
    output_directory: PathBuf,
    number_of_cores: usize,
    /// Construction timestamp, stamped into run artifacts.
    now: String,
}

impl PipelineBase {
    pub fn new(config: &PipelineConfig) -> PipelineResult<Self> {
        config.validate()?;
        Ok(PipelineBase {
            subject: SubjectRef::new(config.subject.clone(), config.session.clone()),
            base_directory: config.bids_dir.clone(),
            output_directory: config.output_dir.clone(),
            number_of_cores: config.number_of_cores,
            now: Local::now().format("%Y%m%d_%H%M").to_string(),
        })
    }

    pub fn subject(&self) -> &SubjectRef {
        &self.subject
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    pub fn number_of_cores(&self) -> usize {
        self.number_of_cores
    }

    pub fn now(&self) -> &str {
        &self.now
    }

    pub fn deriv_dir(&self) -> PathBuf {
        self.subject.deriv_dir(&self.output_directory)
    }

    pub fn deriv_anat_dir(&self) -> PathBuf {
        self.subject.deriv_anat_dir(&self.output_directory)
    }

    pub fn work_dir(&self) -> PathBuf {
        self.subject.work_dir(&self.output_directory)
    }
}
