//! BIDS dataset conventions.
//!
//! - [`SubjectRef`] — `(subject, session?)` identity and the raw/derivative
//!   directory layout derived from it.
//! - [`DatasetQuery`] / [`BidsLayout`] — file discovery over a BIDS tree.
//! - [`derivatives`] — the fixed vocabulary of derivative filenames.

pub mod derivatives;
pub mod layout;
pub mod subject;

pub use layout::{BidsLayout, DatasetQuery};
pub use subject::SubjectRef;
