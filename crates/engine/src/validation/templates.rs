//! Template syntax checks.
//!
//! Syntax problems get their own codes so a repair loop can tell "this brace
//! is never closed" apart from "this node does not exist".

use pathflow_types::WorkflowIr;
use serde_json::Value;

use super::{ValidationCode, ValidationIssue};
use crate::{
    templates::{TemplatePath, extract_template_expressions, find_unclosed_template, has_templates},
    workflow::nested::is_child_scoped_param,
};

pub(super) fn check(ir: &WorkflowIr, issues: &mut Vec<ValidationIssue>) {
    for (index, node) in ir.nodes.iter().enumerate() {
        for (key, value) in &node.params {
            if is_child_scoped_param(node, key) {
                continue;
            }
            visit_strings(value, &format!("nodes[{index}].params.{key}"), &mut |path, text| {
                check_embedded(path, text, issues);
            });
        }
        if let Some(batch) = &node.batch {
            check_expression(&format!("nodes[{index}].batch.items"), &batch.items, issues);
        }
    }

    for (name, output) in &ir.outputs {
        if let Some(source) = &output.source {
            check_expression(&format!("outputs.{name}.source"), source, issues);
        }
    }
}

/// Checks a field that holds either embedded templates or a bare path.
fn check_expression(path: &str, expression: &str, issues: &mut Vec<ValidationIssue>) {
    if has_templates(expression) {
        check_embedded(path, expression, issues);
        return;
    }
    if expression.trim().is_empty() {
        return;
    }
    if let Err(error) = TemplatePath::parse(expression) {
        issues.push(ValidationIssue::new(
            ValidationCode::MalformedTemplate,
            path,
            format!("malformed path expression: {error}"),
        ));
    }
}

fn check_embedded(path: &str, text: &str, issues: &mut Vec<ValidationIssue>) {
    if let Some(position) = find_unclosed_template(text) {
        issues.push(ValidationIssue::new(
            ValidationCode::UnclosedTemplate,
            path,
            format!("'${{' at position {position} is never closed in '{text}'"),
        ));
        return;
    }
    for found in extract_template_expressions(text) {
        if let Err(error) = TemplatePath::parse(&found.expression) {
            issues.push(ValidationIssue::new(
                ValidationCode::MalformedTemplate,
                path,
                format!("malformed template '{}': {error}", found.raw),
            ));
        }
    }
}

fn visit_strings(value: &Value, path: &str, visitor: &mut dyn FnMut(&str, &str)) {
    match value {
        Value::String(text) => visitor(path, text),
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                visit_strings(item, &format!("{path}[{index}]"), visitor);
            }
        }
        Value::Object(map) => {
            for (key, nested) in map {
                visit_strings(nested, &format!("{path}.{key}"), visitor);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}
