//! Shared helpers for listing field paths and proposing near matches.
//!
//! Static validation (unknown node ids and output keys) and the runtime
//! validator (missing template paths) both build "did you mean" text from
//! these, so suggestions read the same on both surfaces.

use serde_json::Value;

/// Maximum edit distance accepted for a suggestion, scaled by name length.
fn suggestion_threshold(candidate_len: usize) -> usize {
    (candidate_len / 3).clamp(1, 3)
}

/// Returns the names visible one level inside `value`.
///
/// Objects yield their sorted keys; arrays yield `[0]`..`[n-1]`; scalars yield
/// nothing.
pub fn available_fields(value: &Value) -> Vec<String> {
    match value {
        Value::Object(map) => {
            let mut fields = map.keys().cloned().collect::<Vec<_>>();
            fields.sort();
            fields
        }
        Value::Array(items) => (0..items.len()).map(|index| format!("[{index}]")).collect(),
        _ => Vec::new(),
    }
}

/// Levenshtein distance between two strings, counted in chars.
pub fn edit_distance(left: &str, right: &str) -> usize {
    let right_chars: Vec<char> = right.chars().collect();
    let mut previous_row: Vec<usize> = (0..=right_chars.len()).collect();
    let mut current_row = vec![0usize; right_chars.len() + 1];

    for (left_index, left_char) in left.chars().enumerate() {
        current_row[0] = left_index + 1;
        for (right_index, right_char) in right_chars.iter().enumerate() {
            let substitution_cost = usize::from(left_char != *right_char);
            current_row[right_index + 1] = (previous_row[right_index] + substitution_cost)
                .min(previous_row[right_index + 1] + 1)
                .min(current_row[right_index] + 1);
        }
        std::mem::swap(&mut previous_row, &mut current_row);
    }

    previous_row[right_chars.len()]
}

/// Picks the candidate closest to `target`.
///
/// A candidate qualifies when its edit distance is within a small
/// length-scaled threshold, or when one name contains the other
/// (case-insensitive). Ties keep the earlier candidate.
pub fn closest_match<'a, I>(target: &str, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let lowered_target = target.to_ascii_lowercase();
    let mut best: Option<(usize, &'a str)> = None;

    for candidate in candidates {
        if candidate == target {
            continue;
        }
        let distance = edit_distance(target, candidate);
        let lowered_candidate = candidate.to_ascii_lowercase();
        let substring_hit = !lowered_target.is_empty()
            && !lowered_candidate.is_empty()
            && (lowered_candidate.contains(&lowered_target) || lowered_target.contains(&lowered_candidate));
        let within_threshold = distance <= suggestion_threshold(target.chars().count().max(candidate.chars().count()));
        if !within_threshold && !substring_hit {
            continue;
        }
        if best.is_none_or(|(best_distance, _)| distance < best_distance) {
            best = Some((distance, candidate));
        }
    }

    best.map(|(_, candidate)| candidate)
}

/// Collect scalar leaf candidates from a JSON payload by leaf key name.
///
/// Returns `(path, value)` for every scalar whose final key equals `leaf`.
/// Paths use template syntax relative to `value` (`user.login`, `items[0].id`).
pub fn nested_scalar_leaf_candidates_from_json(value: &Value, leaf: &str) -> Vec<(String, Value)> {
    let mut matches = Vec::new();
    collect_nested_scalar_leaf_candidates(value, "", leaf, &mut matches);
    matches
}

fn collect_nested_scalar_leaf_candidates(value: &Value, current_path: &str, leaf: &str, matches: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => {
            for (key, nested_value) in map {
                let next_path = if current_path.is_empty() {
                    key.to_string()
                } else {
                    format!("{current_path}.{key}")
                };
                if key == leaf && is_scalar_json_value(nested_value) {
                    matches.push((next_path.clone(), nested_value.clone()));
                }
                collect_nested_scalar_leaf_candidates(nested_value, &next_path, leaf, matches);
            }
        }
        Value::Array(items) => {
            for (index, nested_value) in items.iter().enumerate() {
                let next_path = format!("{current_path}[{index}]");
                collect_nested_scalar_leaf_candidates(nested_value, &next_path, leaf, matches);
            }
        }
        _ => {}
    }
}

fn is_scalar_json_value(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn available_fields_are_sorted_or_indexed() {
        assert_eq!(available_fields(&json!({"name": 1, "bio": 2, "login": 3})), vec!["bio", "login", "name"]);
        assert_eq!(available_fields(&json!(["a", "b"])), vec!["[0]", "[1]"]);
        assert!(available_fields(&json!("text")).is_empty());
    }

    #[test]
    fn edit_distance_counts_single_edits() {
        assert_eq!(edit_distance("fetch", "fetch"), 0);
        assert_eq!(edit_distance("fetch", "fetc"), 1);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
    }

    #[test]
    fn closest_match_prefers_small_distances() {
        let candidates = ["fetch_user", "summarize", "write_file"];
        assert_eq!(closest_match("fetch_usr", candidates), Some("fetch_user"));
        assert_eq!(closest_match("sumarize", candidates), Some("summarize"));
        assert_eq!(closest_match("completely_else", candidates), None);
    }

    #[test]
    fn closest_match_accepts_substrings() {
        assert_eq!(closest_match("user", ["fetch_user", "other"]), Some("fetch_user"));
    }

    #[test]
    fn nested_leaf_candidates_use_template_paths() {
        let payload = json!({"data": {"items": [{"login": "a"}, {"login": "b"}]}, "login": {"nested": true}});
        let paths: Vec<String> = nested_scalar_leaf_candidates_from_json(&payload, "login")
            .into_iter()
            .map(|(path, _)| path)
            .collect();
        assert_eq!(paths, vec!["data.items[0].login", "data.items[1].login"]);
    }
}
