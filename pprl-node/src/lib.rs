//! Library surface for the `pprl-node` binary, split out so integration
//! tests (and the binary itself) share one copy of the orchestration,
//! record-source, and output-writing logic.

pub mod match_output;
pub mod record_source;
pub mod run;
pub mod sketch_file;
