//! Pipeline orchestration.
//!
//! [`AnatomicalPipeline`] wires the segmentation and parcellation stages
//! into a flow, stages raw inputs into the derivatives tree, executes the
//! flow, and validates the expected outputs afterwards.

pub mod anatomical;
pub mod common;
pub mod substitutions;

pub use anatomical::{AnatomicalPipeline, InputCheck, OutputCheck, RunReport};
pub use common::PipelineBase;
