//! Analysis modules.
//!
//! The orchestrator fans each file out to the configured models; the
//! aggregator turns the collected results into statistics and consensus.

pub mod aggregator;
pub mod orchestrator;

pub use aggregator::{aggregate, most_smelly_files, ConsensusSettings};
pub use orchestrator::Orchestrator;
