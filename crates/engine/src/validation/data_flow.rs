//! Data-flow checks over the edge graph and every template reference.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use indexmap::IndexMap;
use pathflow_types::{NodeSpec, WorkflowIr};

use super::{ValidationCode, ValidationIssue};
use crate::{
    executor::{BATCH_OUTPUT_KEYS, ITEM_INDEX_KEY},
    field_paths::closest_match,
    registry::NodeRegistry,
    store::is_bookkeeping_key,
    templates::{TemplateOccurrence, TemplatePath, collect_templates_from_value, expression_paths},
    workflow::nested::is_child_scoped_param,
};

pub(super) fn check(ir: &WorkflowIr, registry: Option<&NodeRegistry>, issues: &mut Vec<ValidationIssue>) {
    let graph = EdgeGraph::new(ir);
    for cycle in graph.cycles() {
        issues.push(ValidationIssue::new(
            ValidationCode::Cycle,
            "edges",
            format!("cycle detected: {}", cycle.join(" -> ")),
        ));
    }

    let scope = ReferenceScope {
        node_ids: ir.node_ids(),
        input_names: ir.inputs.keys().map(String::as_str).collect(),
        graph: &graph,
    };
    for (index, node) in ir.nodes.iter().enumerate() {
        let mut occurrences = Vec::new();
        for (key, value) in &node.params {
            if !is_child_scoped_param(node, key) {
                collect_templates_from_value(value, &format!("nodes[{index}].params.{key}"), &mut occurrences);
            }
        }
        for TemplateOccurrence { source_path, expression, .. } in occurrences {
            if let Ok(path) = TemplatePath::parse(&expression) {
                scope.check_reference(node, &path, &source_path, true, issues);
            }
        }

        if let Some(batch) = &node.batch {
            for path in expression_paths(&batch.items) {
                scope.check_reference(node, &path, &format!("nodes[{index}].batch.items"), false, issues);
            }
        }
    }

    for (name, output) in &ir.outputs {
        let source_path = format!("outputs.{name}.source");
        let Some(source) = output.source.as_deref().filter(|source| !source.trim().is_empty()) else {
            issues.push(ValidationIssue::new(
                ValidationCode::MissingOutputSource,
                source_path,
                format!("output '{name}' has no source"),
            ));
            continue;
        };
        for path in expression_paths(source) {
            scope.check_output(ir, registry, name, &path, &source_path, issues);
        }
    }
}

struct ReferenceScope<'a> {
    node_ids: Vec<&'a str>,
    input_names: Vec<&'a str>,
    graph: &'a EdgeGraph<'a>,
}

impl ReferenceScope<'_> {
    fn is_node(&self, root: &str) -> bool {
        self.node_ids.contains(&root)
    }

    fn check_reference(&self, node: &NodeSpec, path: &TemplatePath, source_path: &str, item_bound: bool, issues: &mut Vec<ValidationIssue>) {
        let root = path.root.as_str();
        if is_bookkeeping_key(root) && root != ITEM_INDEX_KEY {
            return;
        }
        if item_bound
            && let Some(batch) = &node.batch
            && (root == batch.alias || root == ITEM_INDEX_KEY)
        {
            return;
        }
        if root == node.id {
            issues.push(ValidationIssue::new(
                ValidationCode::ReferenceNotUpstream,
                source_path,
                format!("node '{}' references its own output in '{path}'", node.id),
            ));
            return;
        }
        if self.is_node(root) {
            if !self.graph.ancestors(&node.id).contains(root) {
                issues.push(ValidationIssue::new(
                    ValidationCode::ReferenceNotUpstream,
                    source_path,
                    format!("node '{}' references '{root}', which does not run before it", node.id),
                ));
            }
            return;
        }
        if self.input_names.contains(&root) || !path.is_dotted() {
            return;
        }
        let candidates = self.node_ids.iter().chain(self.input_names.iter()).copied();
        issues.push(
            ValidationIssue::new(
                ValidationCode::UnknownReference,
                source_path,
                format!("'{path}' references unknown node or input '{root}'"),
            )
            .with_suggestion(closest_match(root, candidates).map(str::to_string)),
        );
    }

    fn check_output(
        &self,
        ir: &WorkflowIr,
        registry: Option<&NodeRegistry>,
        name: &str,
        path: &TemplatePath,
        source_path: &str,
        issues: &mut Vec<ValidationIssue>,
    ) {
        let root = path.root.as_str();
        if !path.is_dotted() || is_bookkeeping_key(root) {
            return;
        }
        let Some(producer) = ir.node(root) else {
            if self.input_names.contains(&root) {
                return;
            }
            issues.push(
                ValidationIssue::new(
                    ValidationCode::UnknownOutputNode,
                    source_path,
                    format!("output '{name}' references unknown node '{root}'"),
                )
                .with_suggestion(closest_match(root, self.node_ids.iter().copied()).map(str::to_string)),
            );
            return;
        };

        let declared_keys = if producer.batch.is_some() {
            Some(BATCH_OUTPUT_KEYS.to_vec())
        } else {
            registry.and_then(|registry| registry.output_keys(&producer.r#type))
        };
        if let (Some(keys), Some(field)) = (declared_keys, path.first_field())
            && !keys.contains(&field)
        {
            issues.push(
                ValidationIssue::new(
                    ValidationCode::UnknownOutputKey,
                    source_path,
                    format!("output '{name}' reads '{field}', which node '{root}' does not produce"),
                )
                .with_suggestion(closest_match(field, keys.iter().copied()).map(str::to_string)),
            );
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Active,
    Done,
}

/// Static edge graph over declared nodes; edges with unknown endpoints are
/// reported elsewhere and left out.
struct EdgeGraph<'a> {
    successors: IndexMap<&'a str, Vec<&'a str>>,
    predecessors: HashMap<&'a str, Vec<&'a str>>,
}

impl<'a> EdgeGraph<'a> {
    fn new(ir: &'a WorkflowIr) -> Self {
        let mut successors: IndexMap<&str, Vec<&str>> = ir.nodes.iter().map(|node| (node.id.as_str(), Vec::new())).collect();
        let mut predecessors: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &ir.edges {
            let (from, to) = (edge.from.as_str(), edge.to.as_str());
            if !successors.contains_key(to) {
                continue;
            }
            let Some(targets) = successors.get_mut(from) else {
                continue;
            };
            if !targets.contains(&to) {
                targets.push(to);
                predecessors.entry(to).or_default().push(from);
            }
        }
        Self { successors, predecessors }
    }

    /// Every distinct cycle, each rendered as `a -> b -> a`.
    fn cycles(&self) -> Vec<Vec<&'a str>> {
        let mut marks = HashMap::new();
        let mut stack = Vec::new();
        let mut cycles = Vec::new();
        for node in self.successors.keys().copied() {
            if !marks.contains_key(node) {
                self.visit(node, &mut marks, &mut stack, &mut cycles);
            }
        }

        let mut seen = HashSet::new();
        cycles.retain(|cycle: &Vec<&str>| seen.insert(cycle.iter().copied().collect::<BTreeSet<_>>()));
        cycles
    }

    fn visit(&self, node: &'a str, marks: &mut HashMap<&'a str, Mark>, stack: &mut Vec<&'a str>, cycles: &mut Vec<Vec<&'a str>>) {
        marks.insert(node, Mark::Active);
        stack.push(node);
        for next in self.successors.get(node).into_iter().flatten().copied() {
            match marks.get(next) {
                Some(Mark::Active) => {
                    let start = stack.iter().position(|entry| *entry == next).unwrap_or_default();
                    let mut cycle = stack[start..].to_vec();
                    cycle.push(next);
                    cycles.push(cycle);
                }
                Some(Mark::Done) => {}
                None => self.visit(next, marks, stack, cycles),
            }
        }
        stack.pop();
        marks.insert(node, Mark::Done);
    }

    /// Nodes from which `node_id` is reachable.
    fn ancestors(&self, node_id: &str) -> HashSet<&'a str> {
        let mut found = HashSet::new();
        let mut queue: VecDeque<&str> = self.predecessors.get(node_id).into_iter().flatten().copied().collect();
        while let Some(current) = queue.pop_front() {
            if found.insert(current)
                && let Some(parents) = self.predecessors.get(current)
            {
                queue.extend(parents.iter().copied());
            }
        }
        found
    }
}
