// Runtime Execution Context
// Tracks step outputs of one execution and builds the namespace each step sees

use crate::hunt::models::StepDefinition;
use crate::resolver::{Namespace, INITIAL_ROOT};

use std::collections::HashMap;

use serde_json::{Map, Value};

/// Runtime context of one hunt execution
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    /// Initial parameter snapshot
    initial: Map<String, Value>,

    /// Output of every step that is done for scheduling purposes
    /// (`null` for a failed optional step)
    outputs: HashMap<String, Value>,
}

impl RuntimeContext {
    pub fn new(initial: Map<String, Value>) -> Self {
        Self {
            initial,
            outputs: HashMap::new(),
        }
    }

    /// Record the output of a completed step
    pub fn record_output(&mut self, step_id: impl Into<String>, output: Value) {
        self.outputs.insert(step_id.into(), output);
    }

    /// Record that a step finished without a usable result
    pub fn record_absent(&mut self, step_id: impl Into<String>) {
        self.outputs.insert(step_id.into(), Value::Null);
    }

    pub fn output(&self, step_id: &str) -> Option<&Value> {
        self.outputs.get(step_id)
    }

    /// Namespace visible to a step: `initial` plus its direct dependencies
    pub fn namespace_for(&self, step: &StepDefinition) -> Namespace {
        let mut namespace = Namespace::new();
        namespace.insert(INITIAL_ROOT.to_string(), Value::Object(self.initial.clone()));

        for dep in &step.depends_on {
            if let Some(output) = self.outputs.get(dep) {
                namespace.insert(dep.clone(), output.clone());
            }
        }

        namespace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_namespace_contains_only_direct_dependencies() {
        let mut initial = Map::new();
        initial.insert("domain".to_string(), json!("example.com"));

        let mut ctx = RuntimeContext::new(initial);
        ctx.record_output("dns", json!({ "results": [] }));
        ctx.record_output("whois", json!({ "results": [1] }));
        ctx.record_absent("headers");

        let step = StepDefinition::new("report", "echo").depends_on(["dns", "headers"]);
        let ns = ctx.namespace_for(&step);

        assert_eq!(ns["initial"], json!({ "domain": "example.com" }));
        assert_eq!(ns["dns"], json!({ "results": [] }));
        assert_eq!(ns["headers"], Value::Null);
        assert!(!ns.contains_key("whois"));
    }
}
