//! Workflow input preparation: defaults, required checks and type checks.

use pathflow_types::{WorkflowIr, validate_input_value};
use serde_json::{Map as JsonMap, Value};

/// Builds the root entries for a run from caller params.
///
/// Declared defaults fill omitted inputs. Every problem is collected so the
/// caller sees all missing or mistyped inputs at once. Params the IR does not
/// declare pass through untouched.
pub fn prepare_inputs(ir: &WorkflowIr, params: &JsonMap<String, Value>) -> Result<JsonMap<String, Value>, Vec<String>> {
    let mut prepared = params.clone();
    let mut errors = Vec::new();

    for (name, spec) in &ir.inputs {
        match params.get(name) {
            Some(value) => {
                if let Err(message) = validate_input_value(value, spec) {
                    errors.push(format!("input '{name}': {message}"));
                }
            }
            None => match &spec.default {
                Some(default) => {
                    prepared.insert(name.clone(), default.clone());
                }
                None if spec.required => {
                    let description = spec.description.as_deref().map(|text| format!(" ({text})")).unwrap_or_default();
                    errors.push(format!("missing required input '{name}'{description}"));
                }
                None => {}
            },
        }
    }

    if errors.is_empty() { Ok(prepared) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathflow_types::InputSpec;
    use serde_json::json;

    fn ir() -> WorkflowIr {
        let mut ir = WorkflowIr::default();
        ir.inputs.insert(
            "repo".into(),
            InputSpec {
                r#type: Some("string".into()),
                description: Some("owner/name".into()),
                ..Default::default()
            },
        );
        ir.inputs.insert(
            "limit".into(),
            InputSpec {
                r#type: Some("integer".into()),
                default: Some(json!(10)),
                ..Default::default()
            },
        );
        ir.inputs.insert(
            "verbose".into(),
            InputSpec {
                r#type: Some("boolean".into()),
                required: false,
                ..Default::default()
            },
        );
        ir
    }

    #[test]
    fn applies_defaults_and_passes_through_extras() {
        let params = json!({"repo": "a/b", "extra": 1}).as_object().cloned().unwrap_or_default();
        let prepared = prepare_inputs(&ir(), &params).expect("valid inputs");
        assert_eq!(Value::Object(prepared), json!({"repo": "a/b", "extra": 1, "limit": 10}));
    }

    #[test]
    fn reports_every_problem_at_once() {
        let params = json!({"limit": "ten"}).as_object().cloned().unwrap_or_default();
        let errors = prepare_inputs(&ir(), &params).expect_err("invalid inputs");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0], "missing required input 'repo' (owner/name)");
        assert!(errors[1].starts_with("input 'limit':"));
    }
}
