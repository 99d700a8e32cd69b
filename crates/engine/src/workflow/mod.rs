//! Workflow-level runtime pieces that sit around the executable graph.
//!
//! Input preparation and output promotion frame a run, the tracker owns the
//! bookkeeping keys behind checkpoints and the tri-state status, and the
//! nested executor lets one workflow run another as a node.

pub mod inputs;
pub mod nested;
pub mod outputs;
pub mod runner;
pub mod store;
pub mod tracker;
