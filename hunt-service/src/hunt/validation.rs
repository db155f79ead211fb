// Hunt Validation
// Definition checks and initial-parameter validation performed before a hunt runs

use crate::execution::graph::{DefinitionError, DependencyGraph};
use crate::hunt::models::{HuntDefinition, ParameterSpec, ParameterType};
use crate::resolver::{value_kind, PathExpr, INITIAL_ROOT};

use std::fmt;

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Validate a hunt definition and return its dependency graph
///
/// Checks, in order: reserved step ids, the dependency graph (duplicates,
/// unknown references, cycles) and every parameter mapping path.
pub fn validate_definition(definition: &HuntDefinition) -> Result<DependencyGraph, DefinitionError> {
    for step in &definition.steps {
        if step.step_id == INITIAL_ROOT {
            return Err(DefinitionError::reserved_step_id(format!(
                "hunt '{}': step id '{}' is reserved for initial parameters",
                definition.name, INITIAL_ROOT
            )));
        }
    }

    let graph = DependencyGraph::from_steps(&definition.steps).map_err(|e| DefinitionError {
        message: format!("hunt '{}': {}", definition.name, e.message),
        kind: e.kind,
    })?;

    for step in &definition.steps {
        for (parameter, path) in &step.parameter_mapping {
            let expr = PathExpr::parse(path).map_err(|e| {
                DefinitionError::invalid_mapping(format!(
                    "hunt '{}', step '{}', parameter '{}': {}",
                    definition.name, step.step_id, parameter, e
                ))
            })?;

            if expr.root() == INITIAL_ROOT {
                match expr.first_key() {
                    Some(name) if definition.get_parameter(name).is_some() => {}
                    Some(name) => {
                        return Err(DefinitionError::invalid_mapping(format!(
                            "hunt '{}', step '{}', parameter '{}': '{}' is not a declared initial parameter",
                            definition.name, step.step_id, parameter, name
                        )))
                    }
                    None => {
                        return Err(DefinitionError::invalid_mapping(format!(
                            "hunt '{}', step '{}', parameter '{}': path '{}' must name an initial parameter",
                            definition.name, step.step_id, parameter, path
                        )))
                    }
                }
            } else if !step.depends_on.iter().any(|d| d == expr.root()) {
                return Err(DefinitionError::invalid_mapping(format!(
                    "hunt '{}', step '{}', parameter '{}': path '{}' reads step '{}' which is not listed in depends_on",
                    definition.name,
                    step.step_id,
                    parameter,
                    path,
                    expr.root()
                )));
            }
        }
    }

    Ok(graph)
}

/// One problem with the submitted initial parameters
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterProblem {
    Missing {
        name: String,
    },
    WrongType {
        name: String,
        expected: ParameterType,
        found: &'static str,
    },
}

impl fmt::Display for ParameterProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterProblem::Missing { name } => {
                write!(f, "missing required parameter '{}'", name)
            }
            ParameterProblem::WrongType {
                name,
                expected,
                found,
            } => write!(
                f,
                "parameter '{}' must be {} but {} was given",
                name, expected, found
            ),
        }
    }
}

/// Initial parameters rejected at submission; lists every problem found
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid parameters for hunt '{hunt}': {}", format_problems(.problems))]
pub struct ParameterValidationError {
    pub hunt: String,
    pub problems: Vec<ParameterProblem>,
}

fn format_problems(problems: &[ParameterProblem]) -> String {
    problems
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Check submitted parameters against the hunt's schema
///
/// Returns the normalised snapshot: coerced values, defaults filled in for
/// omitted optional parameters, undeclared parameters passed through as-is.
pub fn validate_parameters(
    definition: &HuntDefinition,
    submitted: &Map<String, Value>,
) -> Result<Map<String, Value>, ParameterValidationError> {
    let mut normalised = Map::new();
    let mut problems = Vec::new();

    for spec in &definition.initial_parameters {
        match submitted.get(&spec.name) {
            Some(Value::Null) | None => {
                if let Some(default) = &spec.default {
                    normalised.insert(spec.name.clone(), default.clone());
                } else if spec.required {
                    problems.push(ParameterProblem::Missing {
                        name: spec.name.clone(),
                    });
                }
            }
            Some(value) => match coerce(spec, value) {
                Some(coerced) => {
                    normalised.insert(spec.name.clone(), coerced);
                }
                None => problems.push(ParameterProblem::WrongType {
                    name: spec.name.clone(),
                    expected: spec.param_type,
                    found: value_kind(value),
                }),
            },
        }
    }

    for (name, value) in submitted {
        if definition.get_parameter(name).is_none() {
            normalised.insert(name.clone(), value.clone());
        }
    }

    if problems.is_empty() {
        Ok(normalised)
    } else {
        Err(ParameterValidationError {
            hunt: definition.name.clone(),
            problems,
        })
    }
}

/// Coerce a submitted value to the declared type, if it can be
fn coerce(spec: &ParameterSpec, value: &Value) -> Option<Value> {
    match (spec.param_type, value) {
        (ParameterType::String, Value::String(_)) => Some(value.clone()),
        (ParameterType::String, Value::Number(n)) => Some(Value::String(n.to_string())),
        (ParameterType::String, Value::Bool(b)) => Some(Value::String(b.to_string())),

        (ParameterType::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => {
            Some(value.clone())
        }
        (ParameterType::Integer, Value::String(s)) => {
            s.trim().parse::<i64>().ok().map(Value::from)
        }

        (ParameterType::Number, Value::Number(_)) => Some(value.clone()),
        (ParameterType::Number, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),

        (ParameterType::Boolean, Value::Bool(_)) => Some(value.clone()),
        (ParameterType::Boolean, Value::String(s)) => match s.trim() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },

        (ParameterType::Array, Value::Array(_)) => Some(value.clone()),
        (ParameterType::Object, Value::Object(_)) => Some(value.clone()),

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::graph::DefinitionErrorKind;
    use crate::hunt::models::StepDefinition;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn recon() -> HuntDefinition {
        HuntDefinition::new("recon", "Recon")
            .parameter(ParameterSpec::required(
                "domain",
                ParameterType::String,
                "Target domain",
            ))
            .parameter(
                ParameterSpec::optional("depth", ParameterType::Integer, "Depth").with_default(1),
            )
            .parameter(ParameterSpec::optional(
                "verbose",
                ParameterType::Boolean,
                "Verbose output",
            ))
            .step(StepDefinition::new("dns", "dns_lookup").map("domain", "initial.domain"))
            .step(
                StepDefinition::new("reverse", "reverse_dns")
                    .map("address", "dns.results[0].data.line")
                    .depends_on(["dns"]),
            )
    }

    #[test]
    fn test_valid_definition_returns_graph() {
        let graph = validate_definition(&recon()).unwrap();
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_mapping_must_reference_a_dependency() {
        let def = recon().step(StepDefinition::new("whois", "whois").map("ip", "dns.results"));
        let err = validate_definition(&def).unwrap_err();
        assert_eq!(err.kind, DefinitionErrorKind::InvalidMapping);
        assert!(err.message.contains("depends_on"));
    }

    #[test]
    fn test_mapping_to_undeclared_initial_parameter() {
        let def = recon().step(StepDefinition::new("whois", "whois").map("q", "initial.target"));
        let err = validate_definition(&def).unwrap_err();
        assert_eq!(err.kind, DefinitionErrorKind::InvalidMapping);
        assert!(err.message.contains("target"));
    }

    #[test]
    fn test_malformed_mapping_path() {
        let def = recon().step(StepDefinition::new("whois", "whois").map("q", "initial.domain["));
        let err = validate_definition(&def).unwrap_err();
        assert_eq!(err.kind, DefinitionErrorKind::InvalidMapping);
    }

    #[test]
    fn test_reserved_step_id() {
        let def = recon().step(StepDefinition::new("initial", "echo"));
        let err = validate_definition(&def).unwrap_err();
        assert_eq!(err.kind, DefinitionErrorKind::ReservedStepId);
    }

    #[test]
    fn test_cycle_is_reported_with_hunt_name() {
        let def = HuntDefinition::new("loop", "Loop")
            .step(StepDefinition::new("a", "echo").depends_on(["b"]))
            .step(StepDefinition::new("b", "echo").depends_on(["a"]));
        let err = validate_definition(&def).unwrap_err();
        assert_eq!(err.kind, DefinitionErrorKind::CyclicDependency);
        assert!(err.message.starts_with("hunt 'loop'"));
    }

    #[test]
    fn test_parameters_apply_defaults_and_coerce() {
        let normalised = validate_parameters(
            &recon(),
            &params(json!({ "domain": "example.com", "verbose": "true", "extra": [1] })),
        )
        .unwrap();

        assert_eq!(normalised["domain"], json!("example.com"));
        assert_eq!(normalised["depth"], json!(1));
        assert_eq!(normalised["verbose"], json!(true));
        assert_eq!(normalised["extra"], json!([1]));
    }

    #[test]
    fn test_integer_coercion_from_string() {
        let normalised = validate_parameters(
            &recon(),
            &params(json!({ "domain": "example.com", "depth": "3" })),
        )
        .unwrap();
        assert_eq!(normalised["depth"], json!(3));
    }

    #[test]
    fn test_scalar_coerced_to_string() {
        let normalised =
            validate_parameters(&recon(), &params(json!({ "domain": 42 }))).unwrap();
        assert_eq!(normalised["domain"], json!("42"));
    }

    #[test]
    fn test_collects_every_problem() {
        let err = validate_parameters(
            &recon(),
            &params(json!({ "depth": "deep", "verbose": 1 })),
        )
        .unwrap_err();

        assert_eq!(err.problems.len(), 3);
        assert!(err.problems.contains(&ParameterProblem::Missing {
            name: "domain".to_string()
        }));
        assert!(err.problems.contains(&ParameterProblem::WrongType {
            name: "depth".to_string(),
            expected: ParameterType::Integer,
            found: "a string",
        }));
        let message = err.to_string();
        assert!(message.contains("missing required parameter 'domain'"));
        assert!(message.contains("'verbose' must be boolean"));
    }

    #[test]
    fn test_null_counts_as_missing() {
        let err = validate_parameters(&recon(), &params(json!({ "domain": null }))).unwrap_err();
        assert_eq!(
            err.problems,
            vec![ParameterProblem::Missing {
                name: "domain".to_string()
            }]
        );
    }
}
