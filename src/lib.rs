//! # neuroparc: multiscale brain parcellation pipeline
//!
//! `neuroparc` turns a subject's anatomical T1 MRI scan from a BIDS dataset
//! into segmented tissue masks and multiscale region-of-interest atlases,
//! for use in downstream connectivity analysis. The heavy lifting (image
//! segmentation, surface reconstruction, atlas registration) is performed by
//! external tools invoked as subprocesses; this crate orchestrates them:
//!
//! - **Input resolution**: locate the raw `T1w` image and its JSON sidecar
//!   and stage them into the derivatives tree.
//! - **Flow construction**: build a directed acyclic graph of named nodes
//!   with typed ports, one sub-graph per enabled stage (segmentation,
//!   parcellation), ending in a sink that renames raw tool outputs into
//!   BIDS-derivatives filenames.
//! - **Execution**: run the graph topologically, serially or across a
//!   configured number of workers, stopping at the first failure.
//! - **Output validation**: verify the expected derivative files exist,
//!   reporting every missing artifact.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use neuroparc::{AnatomicalPipeline, BidsLayout, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> neuroparc::PipelineResult<()> {
//!     let config = PipelineConfig::new("/data/bids", "/data/derivatives", "sub-01");
//!     let mut pipeline = AnatomicalPipeline::new(&config)?;
//!
//!     let layout = BidsLayout::new("/data/bids");
//!     if pipeline.check_input(&layout)?.valid() {
//!         pipeline.process().await?;
//!         let report = pipeline.check_output();
//!         println!("valid outputs: {}", report.valid);
//!     }
//!     Ok(())
//! }
//! ```

pub mod bids;
pub mod config;
pub mod engine;
pub mod error;
pub mod flow;
pub mod nodes;
pub mod pipeline;
pub mod stage;

pub use bids::{BidsLayout, DatasetQuery, SubjectRef};
pub use config::{ParcellationScheme, PipelineConfig, SegmentationTool};
pub use engine::{Dispatcher, EngineConfig, NodeExecutorRegistry, RunConfig};
pub use error::{NodeError, PipelineError, PipelineResult};
pub use pipeline::{AnatomicalPipeline, InputCheck, OutputCheck, RunReport};
