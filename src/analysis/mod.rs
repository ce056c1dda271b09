//! Analysis modules.
//!
//! `aggregator` holds the column-deriving steps, `pipeline` drives them per
//! dimension, and `profile` joins the results of one dataset per region.

pub mod aggregator;
pub mod pipeline;
pub mod profile;

pub use aggregator::*;
pub use pipeline::{run_all, DimensionOutcome, DimensionResult, DimensionSpec, RegionScope};
pub use profile::{build_profiles, DatasetProfile};
