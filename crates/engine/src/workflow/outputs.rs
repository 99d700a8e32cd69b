//! Promotion of declared workflow outputs to the store root.

use indexmap::IndexMap;
use pathflow_types::WorkflowIr;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    resolve::{resolve, resolve_value},
    store::StoreAccess,
    templates::{has_templates, single_template_expression},
    workflow::tracker::ExecutionTracker,
};

/// Resolves an output source: a braced template, embedded templates in text, or a bare path.
pub fn resolve_output_source(source: &str, store: &dyn StoreAccess) -> Option<Value> {
    if has_templates(source) && single_template_expression(source).is_none() {
        let resolved = resolve_value(&Value::String(source.to_string()), store);
        return resolved.is_complete().then_some(resolved.value);
    }
    resolve(source, store)
}

/// Writes every declared output whose source resolves under its own root key.
///
/// Outputs that do not resolve are left out of the returned map and recorded
/// as `output:<name>` warnings. Outputs without a source are skipped.
pub fn promote_outputs(ir: &WorkflowIr, store: &mut dyn StoreAccess) -> IndexMap<String, Value> {
    let mut promoted = IndexMap::new();
    for (name, output) in &ir.outputs {
        let Some(source) = output.source.as_deref().filter(|source| !source.trim().is_empty()) else {
            continue;
        };
        match resolve_output_source(source, store) {
            Some(value) => {
                debug!(output = %name, source, "promoting workflow output");
                store.set(name, value.clone());
                promoted.insert(name.clone(), value);
            }
            None => {
                warn!(output = %name, source, "workflow output did not resolve");
                ExecutionTracker::new(store).record_warning(&format!("output:{name}"), &format!("source '{source}' did not resolve"));
            }
        }
    }
    promoted
}
