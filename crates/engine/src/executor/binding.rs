//! Parameter binding.
//!
//! Templates in a node's params are resolved as late as possible: right before
//! the node runs, against the store view it runs in. That is what lets a batch
//! item see its alias and a downstream node see every upstream write.

use std::{collections::BTreeSet, sync::Arc};

use serde_json::{Map as JsonMap, Value};
use tracing::warn;

use crate::{
    node::{Node, NodeError, Runnable},
    resolve::{TemplateMode, resolve_value},
    store::StoreAccess,
    templates::extract_references,
};

/// Resolves every param except those named in `skip_keys`.
///
/// Returns the bound params and the raw text of templates that did not resolve.
pub fn bind_params(raw_params: &JsonMap<String, Value>, store: &dyn StoreAccess, skip_keys: &[&str]) -> (JsonMap<String, Value>, Vec<String>) {
    let mut bound = JsonMap::new();
    let mut unresolved = Vec::new();

    for (key, raw_value) in raw_params {
        if skip_keys.contains(&key.as_str()) {
            bound.insert(key.clone(), raw_value.clone());
            continue;
        }
        let resolved = resolve_value(raw_value, store);
        unresolved.extend(resolved.unresolved);
        bound.insert(key.clone(), resolved.value);
    }

    (bound, unresolved)
}

/// Binds templated params into the wrapped implementation before each run.
pub struct TemplateBoundNode {
    node_id: String,
    inner: Box<dyn Node>,
    raw_params: JsonMap<String, Value>,
    mode: TemplateMode,
    node_ids: Arc<[String]>,
    skip_keys: &'static [&'static str],
}

impl TemplateBoundNode {
    pub fn new(
        node_id: impl Into<String>,
        inner: Box<dyn Node>,
        raw_params: JsonMap<String, Value>,
        mode: TemplateMode,
        node_ids: Arc<[String]>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            inner,
            raw_params,
            mode,
            node_ids,
            skip_keys: &[],
        }
    }

    /// Leaves the named params untouched; the implementation resolves them itself.
    pub fn skipping(mut self, skip_keys: &'static [&'static str]) -> Self {
        self.skip_keys = skip_keys;
        self
    }

    fn referenced_nodes(&self, templates: &[String]) -> BTreeSet<String> {
        templates
            .iter()
            .flat_map(|template| extract_references(template, self.node_ids.iter().map(String::as_str)))
            .collect()
    }
}

impl Runnable for TemplateBoundNode {
    fn run(&mut self, store: &mut dyn StoreAccess) -> Result<String, NodeError> {
        let (params, unresolved) = bind_params(&self.raw_params, store, self.skip_keys);

        if !unresolved.is_empty() {
            match self.mode {
                TemplateMode::Strict => {
                    return Err(NodeError::UnresolvedTemplate {
                        referenced_nodes: self.referenced_nodes(&unresolved),
                        templates: unresolved,
                    });
                }
                TemplateMode::Permissive => {
                    warn!(node_id = %self.node_id, templates = ?unresolved, "leaving unresolved templates in params");
                }
            }
        }

        self.inner.set_params(params);
        self.inner.run(store)
    }
}
