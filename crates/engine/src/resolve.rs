//! # Template resolution
//!
//! Evaluates template paths (see [`crate::templates`]) against a shared-store
//! view and expands templates inside parameter trees.
//!
//! ## Lookup rules
//!
//! - The first path segment is read through the store view, so a node id yields
//!   that node's namespace mapping and a bare key yields a root value such as a
//!   workflow input.
//! - `.field` is a mapping lookup and `[n]` a zero-based index. A missing key,
//!   an out-of-range index, or a scalar intermediate yields `None`.
//! - A string met while more segments remain is decoded as JSON once. Strings
//!   found inside a decoded value are never decoded again.
//!
//! ## Expansion rules
//!
//! - A string that is exactly one `${...}` keeps the resolved JSON type.
//! - Templates embedded in surrounding text are interpolated as text.
//! - Numbers, booleans and null pass through unchanged.

use std::{borrow::Cow, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    store::StoreAccess,
    templates::{PathSegment, TemplatePath, extract_template_expressions, has_templates, single_template_expression},
};

/// How parameter binding treats templates that do not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateMode {
    /// Fail the node with the list of unresolved templates.
    #[default]
    Strict,
    /// Keep the original template text and log a warning.
    Permissive,
}

impl fmt::Display for TemplateMode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateMode::Strict => formatter.write_str("strict"),
            TemplateMode::Permissive => formatter.write_str("permissive"),
        }
    }
}

impl FromStr for TemplateMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(TemplateMode::Strict),
            "permissive" => Ok(TemplateMode::Permissive),
            other => Err(format!("unknown template mode '{other}' (expected 'strict' or 'permissive')")),
        }
    }
}

/// Result of expanding every template inside a value tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedValue {
    /// Expanded value. Unresolved templates keep their original text.
    pub value: Value,
    /// Raw text of every template that did not resolve, in visit order.
    pub unresolved: Vec<String>,
}

impl ResolvedValue {
    /// True when every template in the tree resolved.
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Resolves a braced template (`${a.b}`) or a bare path (`a.b`, `key`).
///
/// Returns `None` for malformed expressions and for paths that do not exist.
/// A present `null` resolves to `Some(Value::Null)`.
pub fn resolve(expression: &str, store: &dyn StoreAccess) -> Option<Value> {
    let inner = single_template_expression(expression).unwrap_or(expression);
    let path = TemplatePath::parse(inner).ok()?;
    resolve_path(&path, store)
}

/// Resolves a parsed path against a store view.
pub fn resolve_path(path: &TemplatePath, store: &dyn StoreAccess) -> Option<Value> {
    let root = store.get(&path.root)?;
    walk_segments(root, &path.segments).map(Cow::into_owned)
}

/// Returns the longest prefix of `path` that resolves, with the value found there.
///
/// The prefix is expressed as the number of segments after the root. `None`
/// means even the root key is absent.
pub fn deepest_resolvable_prefix(path: &TemplatePath, store: &dyn StoreAccess) -> Option<(usize, Value)> {
    let root = store.get(&path.root)?;
    let mut deepest = (0usize, root.clone());
    for segment_count in 1..=path.segments.len() {
        match walk_segments(root, &path.segments[..segment_count]) {
            Some(found) => deepest = (segment_count, found.into_owned()),
            None => break,
        }
    }
    Some(deepest)
}

fn walk_segments<'a>(root: &'a Value, segments: &[PathSegment]) -> Option<Cow<'a, Value>> {
    let mut current = Cow::Borrowed(root);
    let mut decoded_once = false;

    for segment in segments {
        if let Value::String(text) = current.as_ref() {
            if decoded_once {
                return None;
            }
            let decoded = serde_json::from_str::<Value>(text).ok()?;
            current = Cow::Owned(decoded);
            decoded_once = true;
        }

        current = match current {
            Cow::Borrowed(value) => Cow::Borrowed(lookup_segment(value, segment)?),
            Cow::Owned(value) => Cow::Owned(take_segment(value, segment)?),
        };
    }

    Some(current)
}

fn lookup_segment<'a>(value: &'a Value, segment: &PathSegment) -> Option<&'a Value> {
    match (value, segment) {
        (Value::Object(map), PathSegment::Field(name)) => map.get(name),
        (Value::Array(items), PathSegment::Index(index)) => items.get(*index),
        _ => None,
    }
}

fn take_segment(value: Value, segment: &PathSegment) -> Option<Value> {
    match (value, segment) {
        (Value::Object(mut map), PathSegment::Field(name)) => map.remove(name),
        (Value::Array(items), PathSegment::Index(index)) => items.into_iter().nth(*index),
        _ => None,
    }
}

/// Expands every template in `value`, visiting strings, arrays and objects.
pub fn resolve_value(value: &Value, store: &dyn StoreAccess) -> ResolvedValue {
    let mut unresolved = Vec::new();
    let value = expand_value(value, store, &mut unresolved);
    ResolvedValue { value, unresolved }
}

fn expand_value(value: &Value, store: &dyn StoreAccess, unresolved: &mut Vec<String>) -> Value {
    match value {
        Value::String(text) => expand_string(text, store, unresolved),
        Value::Array(items) => Value::Array(items.iter().map(|item| expand_value(item, store, unresolved)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, nested)| (key.clone(), expand_value(nested, store, unresolved)))
                .collect(),
        ),
        Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
    }
}

fn expand_string(text: &str, store: &dyn StoreAccess, unresolved: &mut Vec<String>) -> Value {
    if !has_templates(text) {
        return Value::String(text.to_string());
    }
    if let Some(expression) = single_template_expression(text) {
        return match resolve(expression, store) {
            Some(resolved) => resolved,
            None => {
                unresolved.push(text.trim().to_string());
                Value::String(text.to_string())
            }
        };
    }
    Value::String(interpolate_string(text, store, unresolved))
}

/// Replaces each embedded template with the text form of its value.
///
/// Unresolved templates are left verbatim and their raw text is appended to
/// `unresolved`.
pub fn interpolate_string(text: &str, store: &dyn StoreAccess, unresolved: &mut Vec<String>) -> String {
    let mut output = String::with_capacity(text.len());
    let mut cursor = 0usize;

    for found in extract_template_expressions(text) {
        output.push_str(&text[cursor..found.start]);
        match resolve(&found.expression, store) {
            Some(resolved) => output.push_str(&format_json_value(&resolved)),
            None => {
                unresolved.push(found.raw.clone());
                output.push_str(&found.raw);
            }
        }
        cursor = found.end;
    }

    output.push_str(&text[cursor..]);
    output
}

/// Formats a JSON value for interpolation into text.
///
/// - Strings are returned as-is
/// - Null becomes an empty string
/// - Numbers and booleans use their JSON spelling
/// - Arrays and objects are compact JSON
pub fn format_json_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SharedStore;
    use serde_json::json;

    fn store_with(entries: Value) -> SharedStore {
        match entries {
            Value::Object(map) => SharedStore::from_map(map),
            _ => SharedStore::new(),
        }
    }

    #[test]
    fn resolves_namespaced_values() {
        let store = store_with(json!({"n": {"a": {"b": 5}}}));
        assert_eq!(resolve("${n.a.b}", &store), Some(json!(5)));
        assert_eq!(resolve("n.a.b", &store), Some(json!(5)));
        assert_eq!(resolve("${n.a.missing}", &store), None);
        assert_eq!(resolve("${n.a.b.deeper}", &store), None);
        assert_eq!(resolve("${absent.a}", &store), None);
    }

    #[test]
    fn resolves_root_inputs_and_indices() {
        let store = store_with(json!({
            "username": "torvalds",
            "list": {"files": ["a.txt", "b.txt"]}
        }));
        assert_eq!(resolve("username", &store), Some(json!("torvalds")));
        assert_eq!(resolve("${list.files[1]}", &store), Some(json!("b.txt")));
        assert_eq!(resolve("${list.files[2]}", &store), None);
    }

    #[test]
    fn present_null_counts_as_resolved() {
        let store = store_with(json!({"n": {"value": null}}));
        assert_eq!(resolve("${n.value}", &store), Some(Value::Null));
    }

    #[test]
    fn decodes_json_strings_one_level_only() {
        let store = store_with(json!({
            "shell": {"stdout": "{\"items\": [{\"id\": 7}], \"inner\": \"{\\\"x\\\": 1}\"}"}
        }));
        assert_eq!(resolve("${shell.stdout.items[0].id}", &store), Some(json!(7)));
        assert_eq!(resolve("${shell.stdout.inner}", &store), Some(json!("{\"x\": 1}")));
        assert_eq!(resolve("${shell.stdout.inner.x}", &store), None);
    }

    #[test]
    fn non_json_strings_do_not_resolve_deeper() {
        let store = store_with(json!({"n": {"text": "plain words"}}));
        assert_eq!(resolve("${n.text.length}", &store), None);
    }

    #[test]
    fn whole_template_keeps_json_type() {
        let store = store_with(json!({"n": {"items": [1, 2], "count": 2, "name": "x"}}));
        let resolved = resolve_value(
            &json!({"items": "${n.items}", "count": "${n.count}", "label": "${n.name} has ${n.count}", "flag": true}),
            &store,
        );
        assert!(resolved.is_complete());
        assert_eq!(resolved.value, json!({"items": [1, 2], "count": 2, "label": "x has 2", "flag": true}));
    }

    #[test]
    fn padded_template_interpolates_as_text() {
        let store = store_with(json!({"n": {"count": 2}}));
        let resolved = resolve_value(&json!({"padded": "  ${n.count}  "}), &store);
        assert_eq!(resolved.value, json!({"padded": "  2  "}));
    }

    #[test]
    fn embedded_values_use_text_form() {
        let store = store_with(json!({"n": {"obj": {"k": [1]}, "nothing": null}}));
        let mut unresolved = Vec::new();
        let text = interpolate_string("obj=${n.obj} nothing=[${n.nothing}]", &store, &mut unresolved);
        assert_eq!(text, "obj={\"k\":[1]} nothing=[]");
        assert!(unresolved.is_empty());
    }

    #[test]
    fn unresolved_templates_are_reported_and_left_intact() {
        let store = store_with(json!({"n": {"a": 1}}));
        let resolved = resolve_value(&json!({"one": "${n.b}", "two": ["x ${missing.y} z"]}), &store);
        assert_eq!(resolved.unresolved, vec!["${n.b}".to_string(), "${missing.y}".to_string()]);
        assert_eq!(resolved.value, json!({"one": "${n.b}", "two": ["x ${missing.y} z"]}));
    }

    #[test]
    fn deepest_prefix_stops_at_first_missing_segment() {
        let store = store_with(json!({"api": {"response": {"login": "torvalds", "id": 1}}}));
        let path = TemplatePath::parse("api.response.username").expect("path");
        let (depth, value) = deepest_resolvable_prefix(&path, &store).expect("root exists");
        assert_eq!(depth, 1);
        assert_eq!(value, json!({"login": "torvalds", "id": 1}));

        let missing_root = TemplatePath::parse("nope.x").expect("path");
        assert!(deepest_resolvable_prefix(&missing_root, &store).is_none());
    }

    #[test]
    fn template_mode_parses_from_text() {
        assert_eq!("Permissive".parse::<TemplateMode>(), Ok(TemplateMode::Permissive));
        assert_eq!("strict".parse::<TemplateMode>(), Ok(TemplateMode::Strict));
        assert!("lenient".parse::<TemplateMode>().is_err());
    }
}
