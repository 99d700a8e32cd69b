//! Structural checks: required fields, identifiers, endpoints, batch and
//! nested-workflow shape, and (with a registry) known node types.

use std::collections::HashSet;

use pathflow_types::{NESTED_WORKFLOW_TYPE, NodeSpec, WorkflowIr, is_valid_ir_version, is_valid_node_id};
use serde_json::Value;

use super::{ValidationCode, ValidationIssue, validate_workflow};
use crate::{
    field_paths::closest_match,
    registry::NodeRegistry,
    workflow::nested::{NESTED_SKIPPED_PARAMS, StorageMode},
};

pub(super) fn check(ir: &WorkflowIr, registry: Option<&NodeRegistry>, issues: &mut Vec<ValidationIssue>) {
    if ir.ir_version.trim().is_empty() {
        issues.push(ValidationIssue::new(ValidationCode::MissingIrVersion, "ir_version", "ir_version is required"));
    } else if !is_valid_ir_version(&ir.ir_version) {
        issues.push(ValidationIssue::new(
            ValidationCode::InvalidIrVersion,
            "ir_version",
            format!("ir_version '{}' must look like MAJOR.MINOR.PATCH", ir.ir_version),
        ));
    }

    if ir.nodes.is_empty() {
        issues.push(ValidationIssue::new(ValidationCode::NoNodes, "nodes", "workflow must declare at least one node"));
    }

    let mut seen_ids = HashSet::new();
    for (index, node) in ir.nodes.iter().enumerate() {
        let node_path = format!("nodes[{index}]");

        if !is_valid_node_id(&node.id) {
            issues.push(ValidationIssue::new(
                ValidationCode::InvalidNodeId,
                format!("{node_path}.id"),
                format!("node id '{}' must be non-empty and use only letters, digits, '_' or '-'", node.id),
            ));
        } else if !seen_ids.insert(node.id.as_str()) {
            issues.push(ValidationIssue::new(
                ValidationCode::DuplicateNodeId,
                format!("{node_path}.id"),
                format!("node id '{}' is declared more than once", node.id),
            ));
        }

        check_node_type(node, &node_path, registry, issues);
        check_batch(node, &node_path, issues);
        if node.r#type == NESTED_WORKFLOW_TYPE {
            check_nested_workflow(node, &node_path, registry, issues);
        }
    }

    let node_ids = ir.node_ids();
    for (index, edge) in ir.edges.iter().enumerate() {
        for (field, endpoint) in [("from", &edge.from), ("to", &edge.to)] {
            if node_ids.contains(&endpoint.as_str()) {
                continue;
            }
            issues.push(
                ValidationIssue::new(
                    ValidationCode::UnknownEdgeEndpoint,
                    format!("edges[{index}].{field}"),
                    format!("edge {} -> {} references unknown node '{}'", edge.from, edge.to, endpoint),
                )
                .with_suggestion(closest_match(endpoint, node_ids.iter().copied()).map(str::to_string)),
            );
        }
    }

    let mut seen_actions = HashSet::new();
    for (index, edge) in ir.edges.iter().enumerate() {
        if !seen_actions.insert((edge.from.as_str(), edge.action.as_str())) {
            issues.push(ValidationIssue::new(
                ValidationCode::DuplicateEdgeAction,
                format!("edges[{index}].action"),
                format!("node '{}' has more than one outgoing '{}' edge", edge.from, edge.action),
            ));
        }
    }

    let declared_names: [(&str, Vec<&String>); 2] = [("inputs", ir.inputs.keys().collect()), ("outputs", ir.outputs.keys().collect())];
    for (section, names) in declared_names {
        for name in names.into_iter().filter(|name| node_ids.contains(&name.as_str())) {
            issues.push(ValidationIssue::new(
                ValidationCode::NamespaceCollision,
                format!("{section}.{name}"),
                format!("{section} entry '{name}' shares its root key with node '{name}'"),
            ));
        }
    }

    if let Some(start_node) = &ir.start_node
        && !node_ids.contains(&start_node.as_str())
    {
        issues.push(
            ValidationIssue::new(
                ValidationCode::UnknownStartNode,
                "start_node",
                format!("start_node '{start_node}' is not a declared node"),
            )
            .with_suggestion(closest_match(start_node, node_ids.iter().copied()).map(str::to_string)),
        );
    }
}

fn check_node_type(node: &NodeSpec, node_path: &str, registry: Option<&NodeRegistry>, issues: &mut Vec<ValidationIssue>) {
    if node.r#type.trim().is_empty() {
        issues.push(ValidationIssue::new(
            ValidationCode::MissingNodeType,
            format!("{node_path}.type"),
            format!("node '{}' has no type", node.id),
        ));
        return;
    }
    let Some(registry) = registry else {
        return;
    };
    if node.r#type == NESTED_WORKFLOW_TYPE || registry.contains(&node.r#type) {
        return;
    }
    issues.push(
        ValidationIssue::new(
            ValidationCode::UnknownNodeType,
            format!("{node_path}.type"),
            format!("node '{}' uses unknown type '{}'", node.id, node.r#type),
        )
        .with_suggestion(closest_match(&node.r#type, registry.node_types()).map(str::to_string)),
    );
}

fn check_batch(node: &NodeSpec, node_path: &str, issues: &mut Vec<ValidationIssue>) {
    let Some(batch) = &node.batch else {
        return;
    };
    let batch_path = format!("{node_path}.batch");
    if batch.items.trim().is_empty() {
        issues.push(ValidationIssue::new(
            ValidationCode::InvalidBatch,
            format!("{batch_path}.items"),
            format!("batch node '{}' must declare items", node.id),
        ));
    }
    if !is_valid_node_id(&batch.alias) {
        issues.push(ValidationIssue::new(
            ValidationCode::InvalidBatch,
            format!("{batch_path}.as"),
            format!("batch alias '{}' must be a plain identifier", batch.alias),
        ));
    }
    if batch.max_concurrency == Some(0) {
        issues.push(ValidationIssue::new(
            ValidationCode::InvalidBatch,
            format!("{batch_path}.max_concurrency"),
            "max_concurrency must be at least 1",
        ));
    }
}

fn check_nested_workflow(node: &NodeSpec, node_path: &str, registry: Option<&NodeRegistry>, issues: &mut Vec<ValidationIssue>) {
    let params_path = format!("{node_path}.params");
    let has_ref = node.params.get("workflow_ref").is_some_and(|value| !value.is_null());
    let inline = node.params.get("workflow_ir").filter(|value| !value.is_null());

    if has_ref == inline.is_some() {
        issues.push(ValidationIssue::new(
            ValidationCode::InvalidNestedWorkflow,
            params_path.clone(),
            format!("workflow node '{}' must set exactly one of workflow_ref or workflow_ir", node.id),
        ));
    }

    let storage_mode = match node.params.get("storage_mode") {
        None | Some(Value::Null) => Some(StorageMode::default()),
        Some(Value::String(raw)) => raw.parse::<StorageMode>().ok(),
        Some(_) => None,
    };
    match storage_mode {
        None => issues.push(ValidationIssue::new(
            ValidationCode::InvalidNestedWorkflow,
            format!("{params_path}.storage_mode"),
            "storage_mode must be one of mapped, isolated, scoped, shared",
        )),
        Some(StorageMode::Scoped) if !node.params.get("scope_prefix").is_some_and(Value::is_string) => {
            issues.push(ValidationIssue::new(
                ValidationCode::InvalidNestedWorkflow,
                format!("{params_path}.scope_prefix"),
                "scoped storage mode requires a scope_prefix string",
            ));
        }
        Some(_) => {}
    }

    for key in NESTED_SKIPPED_PARAMS.iter().filter(|key| **key != "workflow_ir") {
        if let Some(value) = node.params.get(*key)
            && !value.is_null()
            && !value.is_object()
        {
            issues.push(ValidationIssue::new(
                ValidationCode::InvalidNestedWorkflow,
                format!("{params_path}.{key}"),
                format!("{key} must be a mapping"),
            ));
        }
    }

    let Some(inline) = inline else {
        return;
    };
    match serde_json::from_value::<WorkflowIr>(inline.clone()) {
        Ok(child) => {
            for mut issue in validate_workflow(&child, registry) {
                issue.path = format!("{params_path}.workflow_ir.{}", issue.path);
                issues.push(issue);
            }
        }
        Err(error) => issues.push(ValidationIssue::new(
            ValidationCode::InvalidNestedWorkflow,
            format!("{params_path}.workflow_ir"),
            format!("inline workflow is not a valid IR document: {error}"),
        )),
    }
}
