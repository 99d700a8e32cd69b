//! Template expression grammar.
//!
//! Expressions take three forms:
//!
//! - `${node_id.path.segments[0]}` embedded anywhere in a string
//! - a bare `node_id.path` where an expression is expected (output sources, batch items)
//! - a bare `root_key` with no dot, naming a workflow input
//!
//! Paths follow `IDENT ('.' IDENT | '[' INT ']')*`. This module only parses;
//! evaluation against a store lives in [`crate::resolve`].

use std::{collections::BTreeSet, fmt};

use serde_json::Value;
use thiserror::Error;

/// Opening delimiter of an embedded template.
pub const TEMPLATE_OPEN: &str = "${";
/// Closing delimiter of an embedded template.
pub const TEMPLATE_CLOSE: char = '}';

/// One step of a template path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Mapping lookup (`.field`).
    Field(String),
    /// Zero-based sequence index (`[n]`).
    Index(usize),
}

/// Parsed template path: a root key followed by field/index segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplatePath {
    /// First identifier: a node id or a root-level key.
    pub root: String,
    /// Remaining segments, in order.
    pub segments: Vec<PathSegment>,
}

/// Syntax errors raised while parsing a template path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateSyntaxError {
    #[error("template expression is empty")]
    Empty,
    #[error("unexpected character '{character}' at position {position} in '{expression}'")]
    UnexpectedCharacter { expression: String, character: char, position: usize },
    #[error("empty path segment in '{expression}'")]
    EmptySegment { expression: String },
    #[error("unclosed '[' in '{expression}'")]
    UnclosedIndex { expression: String },
    #[error("index '{raw}' is not a non-negative integer in '{expression}'")]
    InvalidIndex { expression: String, raw: String },
}

impl TemplatePath {
    /// Parses a path expression without `${`/`}` delimiters.
    pub fn parse(expression: &str) -> Result<Self, TemplateSyntaxError> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(TemplateSyntaxError::Empty);
        }

        let characters: Vec<(usize, char)> = trimmed.char_indices().collect();
        let mut cursor = 0usize;
        let root = read_identifier(trimmed, &characters, &mut cursor)?;
        let mut segments = Vec::new();

        while cursor < characters.len() {
            let (position, character) = characters[cursor];
            match character {
                '.' => {
                    cursor += 1;
                    let field = read_identifier(trimmed, &characters, &mut cursor)?;
                    segments.push(PathSegment::Field(field.to_string()));
                }
                '[' => {
                    cursor += 1;
                    let mut raw = String::new();
                    let mut closed = false;
                    while cursor < characters.len() {
                        let (_, next_character) = characters[cursor];
                        cursor += 1;
                        if next_character == ']' {
                            closed = true;
                            break;
                        }
                        raw.push(next_character);
                    }
                    if !closed {
                        return Err(TemplateSyntaxError::UnclosedIndex {
                            expression: trimmed.to_string(),
                        });
                    }
                    let index = raw.trim().parse::<usize>().map_err(|_| TemplateSyntaxError::InvalidIndex {
                        expression: trimmed.to_string(),
                        raw: raw.clone(),
                    })?;
                    segments.push(PathSegment::Index(index));
                }
                other => {
                    return Err(TemplateSyntaxError::UnexpectedCharacter {
                        expression: trimmed.to_string(),
                        character: other,
                        position,
                    });
                }
            }
        }

        Ok(Self {
            root: root.to_string(),
            segments,
        })
    }

    /// True when the path has at least one segment after the root (`node.field`).
    pub fn is_dotted(&self) -> bool {
        !self.segments.is_empty()
    }

    /// First field segment after the root, if any.
    pub fn first_field(&self) -> Option<&str> {
        match self.segments.first() {
            Some(PathSegment::Field(name)) => Some(name.as_str()),
            _ => None,
        }
    }

    /// Path truncated to the root plus `segment_count` segments.
    pub fn prefix(&self, segment_count: usize) -> TemplatePath {
        TemplatePath {
            root: self.root.clone(),
            segments: self.segments.iter().take(segment_count).cloned().collect(),
        }
    }
}

impl fmt::Display for TemplatePath {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.root)?;
        for segment in &self.segments {
            match segment {
                PathSegment::Field(name) => write!(formatter, ".{name}")?,
                PathSegment::Index(index) => write!(formatter, "[{index}]")?,
            }
        }
        Ok(())
    }
}

fn is_identifier_character(character: char) -> bool {
    character.is_ascii_alphanumeric() || character == '_' || character == '-'
}

fn read_identifier<'a>(expression: &'a str, characters: &[(usize, char)], cursor: &mut usize) -> Result<&'a str, TemplateSyntaxError> {
    let start = *cursor;
    while *cursor < characters.len() && is_identifier_character(characters[*cursor].1) {
        *cursor += 1;
    }
    if *cursor == start {
        return match characters.get(start) {
            Some(&(position, character)) if character != '.' && character != '[' => Err(TemplateSyntaxError::UnexpectedCharacter {
                expression: expression.to_string(),
                character,
                position,
            }),
            _ => Err(TemplateSyntaxError::EmptySegment {
                expression: expression.to_string(),
            }),
        };
    }
    let byte_start = characters[start].0;
    let byte_end = characters.get(*cursor).map(|(position, _)| *position).unwrap_or(expression.len());
    Ok(&expression[byte_start..byte_end])
}

/// A closed `${...}` occurrence inside a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateMatch {
    /// Full text including delimiters.
    pub raw: String,
    /// Trimmed expression between the delimiters.
    pub expression: String,
    /// Byte offset of `${`.
    pub start: usize,
    /// Byte offset one past the closing `}`.
    pub end: usize,
}

/// Extracts closed template occurrences from a string value.
///
/// Unclosed `${` sequences are skipped; see [`find_unclosed_template`].
pub fn extract_template_expressions(value: &str) -> Vec<TemplateMatch> {
    let mut matches = Vec::new();
    let mut offset = 0usize;

    while let Some(relative_start) = value[offset..].find(TEMPLATE_OPEN) {
        let start = offset + relative_start;
        let after_open = start + TEMPLATE_OPEN.len();
        let Some(relative_end) = value[after_open..].find(TEMPLATE_CLOSE) else {
            break;
        };
        let end = after_open + relative_end + 1;
        matches.push(TemplateMatch {
            raw: value[start..end].to_string(),
            expression: value[after_open..end - 1].trim().to_string(),
            start,
            end,
        });
        offset = end;
    }

    matches
}

/// Returns the byte offset of the first `${` that is never closed.
pub fn find_unclosed_template(value: &str) -> Option<usize> {
    let mut offset = 0usize;
    while let Some(relative_start) = value[offset..].find(TEMPLATE_OPEN) {
        let start = offset + relative_start;
        let after_open = start + TEMPLATE_OPEN.len();
        match value[after_open..].find(TEMPLATE_CLOSE) {
            Some(relative_end) => {
                let nested_open = value[after_open..after_open + relative_end].find(TEMPLATE_OPEN);
                if nested_open.is_some() {
                    return Some(start);
                }
                offset = after_open + relative_end + 1;
            }
            None => return Some(start),
        }
    }
    None
}

/// Returns true when the string contains at least one `${` opener.
pub fn has_templates(value: &str) -> bool {
    value.contains(TEMPLATE_OPEN)
}

/// Returns the inner expression when the whole string is exactly one template.
///
/// Such strings resolve to the referenced value with its JSON type intact.
/// Surrounding whitespace makes the string text, so `" ${x} "` interpolates.
pub fn single_template_expression(value: &str) -> Option<&str> {
    let inner = value.strip_prefix(TEMPLATE_OPEN)?.strip_suffix(TEMPLATE_CLOSE)?;
    if inner.contains(TEMPLATE_OPEN) || inner.contains(TEMPLATE_CLOSE) {
        return None;
    }
    Some(inner.trim())
}

/// Parses every path an expression string refers to.
///
/// Strings containing `${` yield their embedded templates; other strings are
/// treated as a single bare path. Unparseable fragments are skipped.
pub fn expression_paths(expression: &str) -> Vec<TemplatePath> {
    if has_templates(expression) {
        extract_template_expressions(expression)
            .iter()
            .filter_map(|found| TemplatePath::parse(&found.expression).ok())
            .collect()
    } else {
        TemplatePath::parse(expression).into_iter().collect()
    }
}

/// Returns the node ids an expression references.
///
/// Only dotted paths whose root is in `node_ids` count; bare root keys are
/// workflow inputs.
pub fn extract_references<'a>(expression: &str, node_ids: impl IntoIterator<Item = &'a str> + Clone) -> BTreeSet<String> {
    expression_paths(expression)
        .into_iter()
        .filter(|path| node_ids.clone().into_iter().any(|node_id| node_id == path.root))
        .map(|path| path.root)
        .collect()
}

/// Template occurrence discovered while walking a parameter tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateOccurrence {
    /// Location of the string leaf (`params.url`, `params.items[2]`).
    pub source_path: String,
    /// The full string leaf the template appears in.
    pub text: String,
    /// Trimmed expression without delimiters.
    pub expression: String,
}

/// Collects template occurrences from an arbitrary JSON value tree.
pub fn collect_templates_from_value(value: &Value, source_path: &str, occurrences: &mut Vec<TemplateOccurrence>) {
    match value {
        Value::String(text) => {
            for found in extract_template_expressions(text) {
                occurrences.push(TemplateOccurrence {
                    source_path: source_path.to_string(),
                    text: text.clone(),
                    expression: found.expression,
                });
            }
        }
        Value::Array(values) => {
            for (index, nested_value) in values.iter().enumerate() {
                collect_templates_from_value(nested_value, format!("{source_path}[{index}]").as_str(), occurrences);
            }
        }
        Value::Object(map) => {
            for (key, nested_value) in map {
                collect_templates_from_value(nested_value, format!("{source_path}.{key}").as_str(), occurrences);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_fields_and_indices() {
        let path = TemplatePath::parse("api.response[0].items[12].name").expect("parsed");
        assert_eq!(path.root, "api");
        assert_eq!(
            path.segments,
            vec![
                PathSegment::Field("response".into()),
                PathSegment::Index(0),
                PathSegment::Field("items".into()),
                PathSegment::Index(12),
                PathSegment::Field("name".into()),
            ]
        );
        assert_eq!(path.to_string(), "api.response[0].items[12].name");
    }

    #[test]
    fn bare_root_key_is_not_dotted() {
        let path = TemplatePath::parse("username").expect("parsed");
        assert!(!path.is_dotted());
        assert!(path.segments.is_empty());
    }

    #[test]
    fn rejects_malformed_paths() {
        assert_eq!(TemplatePath::parse("  "), Err(TemplateSyntaxError::Empty));
        assert!(matches!(TemplatePath::parse("a..b"), Err(TemplateSyntaxError::EmptySegment { .. })));
        assert!(matches!(TemplatePath::parse("a[0"), Err(TemplateSyntaxError::UnclosedIndex { .. })));
        assert!(matches!(TemplatePath::parse("a[-1]"), Err(TemplateSyntaxError::InvalidIndex { .. })));
        assert!(matches!(
            TemplatePath::parse("a + b"),
            Err(TemplateSyntaxError::UnexpectedCharacter { character: ' ', .. })
        ));
    }

    #[test]
    fn extracts_embedded_templates_with_offsets() {
        let text = "Hello ${user.name}, you have ${inbox.count} messages";
        let found = extract_template_expressions(text);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].expression, "user.name");
        assert_eq!(&text[found[0].start..found[0].end], "${user.name}");
        assert_eq!(found[1].raw, "${inbox.count}");
    }

    #[test]
    fn detects_unclosed_templates() {
        assert_eq!(find_unclosed_template("ok ${a.b} and ${c"), Some(14));
        assert_eq!(find_unclosed_template("${a ${b}"), Some(0));
        assert_eq!(find_unclosed_template("${a.b}"), None);
        assert_eq!(find_unclosed_template("no templates"), None);
    }

    #[test]
    fn single_template_detection_requires_whole_string() {
        assert_eq!(single_template_expression("${n1.x}"), Some("n1.x"));
        assert_eq!(single_template_expression("${ n1.x }"), Some("n1.x"));
        assert_eq!(single_template_expression("  ${n1.x}  "), None);
        assert_eq!(single_template_expression("value: ${n1.x}"), None);
        assert_eq!(single_template_expression("${a}${b}"), None);
    }

    #[test]
    fn references_only_include_known_node_ids() {
        let node_ids = ["fetch", "parse"];
        let references = extract_references("${fetch.body} ${parse.items[0]} ${username}", node_ids);
        assert_eq!(references.into_iter().collect::<Vec<_>>(), vec!["fetch", "parse"]);

        let bare = extract_references("fetch.status", node_ids);
        assert_eq!(bare.len(), 1);
    }

    #[test]
    fn collects_templates_from_nested_params() {
        let params = json!({
            "url": "https://x/${user}",
            "headers": {"auth": "${token.value}"},
            "list": ["literal", "${a.b[1]}"],
            "count": 3
        });
        let mut occurrences = Vec::new();
        collect_templates_from_value(&params, "params", &mut occurrences);
        let paths: Vec<&str> = occurrences.iter().map(|found| found.source_path.as_str()).collect();
        assert_eq!(paths, vec!["params.headers.auth", "params.list[1]", "params.url"]);
    }
}
