//! Node wrappers the compiler stacks around every implementation.
//!
//! Outer to inner:
//!
//! - [`instrumented::InstrumentedNode`] records the checkpoint, cache hits and timing
//! - [`namespace::NamespacedNode`] scopes writes under the node id
//! - [`batch::BatchNode`] (batch nodes only) runs the rest once per item
//! - [`binding::TemplateBoundNode`] resolves params right before the implementation runs

pub mod batch;
pub mod binding;
pub mod instrumented;
pub mod namespace;

pub use batch::{BATCH_OUTPUT_KEYS, BatchNode, ITEM_INDEX_KEY, ItemScope, RunnableFactory};
pub use binding::{TemplateBoundNode, bind_params};
pub use instrumented::{ExecutionObserver, InstrumentedNode, NodeReport, NodeRunStatus, node_config_hash};
pub use namespace::{NamespacedNode, NamespacedStore};
