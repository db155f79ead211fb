// Hunt Data Models
// Hunt/step definitions and the run-time execution and step records

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Declared type of an initial hunt parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParameterType::String => "string",
            ParameterType::Integer => "integer",
            ParameterType::Number => "number",
            ParameterType::Boolean => "boolean",
            ParameterType::Array => "array",
            ParameterType::Object => "object",
        };
        f.write_str(name)
    }
}

/// Schema entry for one initial parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParameterSpec {
    /// A parameter the submitter must provide
    pub fn required(
        name: impl Into<String>,
        param_type: ParameterType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
            default: None,
        }
    }

    /// A parameter the submitter may omit
    pub fn optional(
        name: impl Into<String>,
        param_type: ParameterType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// One step of a hunt, bound to exactly one plugin invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub step_id: String,
    pub plugin_name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    /// Plugin parameter name -> path expression
    #[serde(default)]
    pub parameter_mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Falls back to the engine default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    /// Failure of an optional step does not abort the hunt
    #[serde(default)]
    pub optional: bool,
}

impl StepDefinition {
    pub fn new(step_id: impl Into<String>, plugin_name: impl Into<String>) -> Self {
        let step_id = step_id.into();
        Self {
            display_name: step_id.clone(),
            step_id,
            plugin_name: plugin_name.into(),
            description: String::new(),
            parameter_mapping: BTreeMap::new(),
            depends_on: Vec::new(),
            timeout_seconds: None,
            optional: false,
        }
    }

    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Map a plugin parameter to a path expression
    pub fn map(mut self, parameter: impl Into<String>, path: impl Into<String>) -> Self {
        self.parameter_mapping.insert(parameter.into(), path.into());
        self
    }

    pub fn depends_on<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for step in steps {
            let step = step.into();
            if !self.depends_on.contains(&step) {
                self.depends_on.push(step);
            }
        }
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// A named, versioned, declarative multi-step workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HuntDefinition {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub category: String,
    pub version: String,
    /// Ordered parameter schema
    pub initial_parameters: Vec<ParameterSpec>,
    /// Ordered step list
    pub steps: Vec<StepDefinition>,
}

impl HuntDefinition {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            description: String::new(),
            category: "general".to_string(),
            version: "1.0.0".to_string(),
            initial_parameters: Vec::new(),
            steps: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn parameter(mut self, spec: ParameterSpec) -> Self {
        self.initial_parameters.push(spec);
        self
    }

    pub fn step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    /// Look up a step by id
    pub fn get_step(&self, step_id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    /// Look up a declared initial parameter by name
    pub fn get_parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.initial_parameters.iter().find(|p| p.name == name)
    }
}

/// Lifecycle status of a hunt execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HuntStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl HuntStatus {
    /// Completed, failed and canceled are final
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HuntStatus::Completed | HuntStatus::Failed | HuntStatus::Canceled
        )
    }
}

impl fmt::Display for HuntStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HuntStatus::Pending => "pending",
            HuntStatus::Running => "running",
            HuntStatus::Completed => "completed",
            HuntStatus::Failed => "failed",
            HuntStatus::Canceled => "canceled",
        };
        f.write_str(name)
    }
}

/// Status of one step within an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Canceled,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepStatus::Pending | StepStatus::Running)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
            StepStatus::Canceled => "canceled",
        };
        f.write_str(name)
    }
}

/// The user on whose behalf a hunt runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub id: String,
    pub username: String,
}

impl UserContext {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
        }
    }
}

/// One run of a hunt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HuntExecution {
    pub id: Uuid,
    pub hunt_id: String,
    pub case_id: String,
    /// Snapshot taken at submission, never modified afterwards
    pub initial_parameters: Map<String, Value>,
    pub status: HuntStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl HuntExecution {
    /// Create a pending execution record
    pub fn new(
        hunt_id: impl Into<String>,
        case_id: impl Into<String>,
        initial_parameters: Map<String, Value>,
        user: &UserContext,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            hunt_id: hunt_id.into(),
            case_id: case_id.into(),
            initial_parameters,
            status: HuntStatus::Pending,
            created_by: user.id.clone(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Run-time record of one step within an execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HuntStep {
    pub execution_id: Uuid,
    pub step_id: String,
    pub plugin_name: String,
    pub resolved_parameters: Map<String, Value>,
    pub status: StepStatus,
    /// Collected plugin output (`null` until the step completes)
    pub output: Value,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl HuntStep {
    /// Record for a step that has just been dispatched
    pub fn started(execution_id: Uuid, step: &StepDefinition) -> Self {
        Self {
            execution_id,
            step_id: step.step_id.clone(),
            plugin_name: step.plugin_name.clone(),
            resolved_parameters: Map::new(),
            status: StepStatus::Running,
            output: Value::Null,
            error: None,
            started_at: Some(Utc::now()),
            completed_at: None,
        }
    }

    /// Record for a step that was never dispatched (skipped or canceled)
    pub fn never_started(execution_id: Uuid, step: &StepDefinition, status: StepStatus) -> Self {
        Self {
            execution_id,
            step_id: step.step_id.clone(),
            plugin_name: step.plugin_name.clone(),
            resolved_parameters: Map::new(),
            status,
            output: Value::Null,
            error: None,
            started_at: None,
            completed_at: Some(Utc::now()),
        }
    }

    /// Move the record to a terminal status
    pub fn finish(&mut self, status: StepStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_builder() {
        let step = StepDefinition::new("reverse", "reverse_dns")
            .display_name("Reverse DNS")
            .map("address", "dns.results[0].data.line")
            .depends_on(["dns", "dns"])
            .timeout(30)
            .optional();

        assert_eq!(step.display_name, "Reverse DNS");
        assert_eq!(step.depends_on, vec!["dns".to_string()]);
        assert_eq!(step.timeout_seconds, Some(30));
        assert!(step.optional);
        assert_eq!(
            step.parameter_mapping.get("address").map(String::as_str),
            Some("dns.results[0].data.line")
        );
    }

    #[test]
    fn test_statuses_serialize_snake_case() {
        assert_eq!(
            serde_json::to_value(HuntStatus::Canceled).unwrap(),
            json!("canceled")
        );
        assert_eq!(
            serde_json::to_value(StepStatus::Skipped).unwrap(),
            json!("skipped")
        );
        assert!(HuntStatus::Failed.is_terminal());
        assert!(!HuntStatus::Running.is_terminal());
        assert!(StepStatus::Skipped.is_terminal());
        assert!(!StepStatus::Pending.is_terminal());
    }

    #[test]
    fn test_parameter_spec_uses_type_key() {
        let spec = ParameterSpec::optional("depth", ParameterType::Integer, "Crawl depth")
            .with_default(2);
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["type"], json!("integer"));
        assert_eq!(value["default"], json!(2));
        assert_eq!(value["required"], json!(false));
    }

    #[test]
    fn test_new_execution_is_pending() {
        let user = UserContext::new("u-1", "analyst");
        let execution = HuntExecution::new("domain_recon", "case-7", Map::new(), &user);
        assert_eq!(execution.status, HuntStatus::Pending);
        assert_eq!(execution.created_by, "u-1");
        assert!(execution.completed_at.is_none());
    }

    #[test]
    fn test_step_record_lifecycle() {
        let def = StepDefinition::new("dns", "dns_lookup");
        let mut record = HuntStep::started(Uuid::new_v4(), &def);
        assert_eq!(record.status, StepStatus::Running);
        assert!(record.started_at.is_some());

        record.finish(StepStatus::Completed);
        assert_eq!(record.status, StepStatus::Completed);
        assert!(record.completed_at.is_some());

        let skipped = HuntStep::never_started(Uuid::new_v4(), &def, StepStatus::Skipped);
        assert!(skipped.started_at.is_none());
        assert_eq!(skipped.status, StepStatus::Skipped);
    }
}
