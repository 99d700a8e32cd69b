//! Shared type definitions for the pathflow workflow engine.
//!
//! The [`workflow`] module holds the serde model of the workflow IR together
//! with the identifier and input validation helpers every consumer agrees on.

pub mod workflow;

pub use workflow::{
    BatchErrorHandling, BatchSpec, DEFAULT_ACTION, ERROR_ACTION, EdgeSpec, InputSpec, NESTED_WORKFLOW_TYPE, NodeSpec, OutputSpec,
    WorkflowIr,
    validation::{is_valid_ir_version, is_valid_node_id, json_type_name, validate_input_value},
};
