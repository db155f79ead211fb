// Step Dependency Graph (DAG)
// Validates step dependencies and answers which steps are unblocked

use crate::hunt::models::StepDefinition;

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;

/// Error in a hunt definition, detected before anything runs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("definition error: {message}")]
pub struct DefinitionError {
    pub message: String,
    pub kind: DefinitionErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionErrorKind {
    /// Circular dependency detected
    CyclicDependency,
    /// `depends_on` names a step that does not exist
    UnknownStep,
    /// Two steps share an id
    DuplicateStep,
    /// A parameter mapping is malformed or reads something the step cannot see
    InvalidMapping,
    /// Step id collides with a reserved namespace root
    ReservedStepId,
    /// Two hunts share a name in one catalog
    DuplicateHunt,
}

impl DefinitionError {
    pub fn cyclic(message: impl Into<String>) -> Self {
        Self::with_kind(DefinitionErrorKind::CyclicDependency, message)
    }

    pub fn unknown_step(message: impl Into<String>) -> Self {
        Self::with_kind(DefinitionErrorKind::UnknownStep, message)
    }

    pub fn duplicate_step(message: impl Into<String>) -> Self {
        Self::with_kind(DefinitionErrorKind::DuplicateStep, message)
    }

    pub fn invalid_mapping(message: impl Into<String>) -> Self {
        Self::with_kind(DefinitionErrorKind::InvalidMapping, message)
    }

    pub fn reserved_step_id(message: impl Into<String>) -> Self {
        Self::with_kind(DefinitionErrorKind::ReservedStepId, message)
    }

    pub fn duplicate_hunt(message: impl Into<String>) -> Self {
        Self::with_kind(DefinitionErrorKind::DuplicateHunt, message)
    }

    fn with_kind(kind: DefinitionErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

/// A node of the dependency graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepNode {
    pub step_id: String,
    /// Ids of steps this step waits for (deduplicated, definition order)
    pub dependencies: Vec<String>,
}

/// Dependency graph over the steps of one hunt
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Nodes in definition order
    nodes: Vec<StepNode>,
    /// Quick lookup of node index by step id
    indices: HashMap<String, usize>,
}

impl DependencyGraph {
    /// Build and validate a graph from step definitions
    pub fn from_steps(steps: &[StepDefinition]) -> Result<Self, DefinitionError> {
        let graph = Self::build(steps)?;
        graph.validate()?;
        Ok(graph)
    }

    /// Build a graph without checking references or cycles
    ///
    /// Only duplicate step ids are rejected here since they make the index ambiguous.
    pub fn build(steps: &[StepDefinition]) -> Result<Self, DefinitionError> {
        let mut nodes = Vec::with_capacity(steps.len());
        let mut indices = HashMap::with_capacity(steps.len());

        for (i, step) in steps.iter().enumerate() {
            if indices.insert(step.step_id.clone(), i).is_some() {
                return Err(DefinitionError::duplicate_step(format!(
                    "step id '{}' is used more than once",
                    step.step_id
                )));
            }

            let mut dependencies: Vec<String> = Vec::with_capacity(step.depends_on.len());
            for dep in &step.depends_on {
                if !dependencies.contains(dep) {
                    dependencies.push(dep.clone());
                }
            }

            nodes.push(StepNode {
                step_id: step.step_id.clone(),
                dependencies,
            });
        }

        Ok(Self { nodes, indices })
    }

    /// Check that every dependency exists and that there are no cycles
    pub fn validate(&self) -> Result<(), DefinitionError> {
        for node in &self.nodes {
            for dep in &node.dependencies {
                if !self.indices.contains_key(dep) {
                    return Err(DefinitionError::unknown_step(format!(
                        "step '{}' depends on unknown step '{}'",
                        node.step_id, dep
                    )));
                }
            }
        }

        self.detect_cycles()
    }

    /// Detect cycles using DFS
    fn detect_cycles(&self) -> Result<(), DefinitionError> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();

        for node in &self.nodes {
            if !visited.contains(node.step_id.as_str()) {
                if let Some(cycle) = self.dfs_cycle(node, &mut visited, &mut rec_stack) {
                    return Err(DefinitionError::cyclic(format!(
                        "circular dependency detected in steps: {}",
                        cycle.join(" -> ")
                    )));
                }
            }
        }

        Ok(())
    }

    fn dfs_cycle<'a>(
        &'a self,
        node: &'a StepNode,
        visited: &mut HashSet<&'a str>,
        rec_stack: &mut HashSet<&'a str>,
    ) -> Option<Vec<String>> {
        let name = node.step_id.as_str();
        visited.insert(name);
        rec_stack.insert(name);

        for dep in &node.dependencies {
            if rec_stack.contains(dep.as_str()) {
                return Some(vec![name.to_string(), dep.clone()]);
            }
            if !visited.contains(dep.as_str()) {
                if let Some(&idx) = self.indices.get(dep) {
                    if let Some(mut cycle) = self.dfs_cycle(&self.nodes[idx], visited, rec_stack)
                    {
                        cycle.insert(0, name.to_string());
                        return Some(cycle);
                    }
                }
            }
        }

        rec_stack.remove(name);
        None
    }

    /// Steps whose dependencies are all in `completed` and which are not yet scheduled
    ///
    /// Returned in definition order. The graph keeps no scheduling state of its own;
    /// callers pass what has finished and what they have already dispatched.
    pub fn ready(
        &self,
        completed: &HashSet<String>,
        scheduled: &HashSet<String>,
    ) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|node| {
                !scheduled.contains(&node.step_id)
                    && !completed.contains(&node.step_id)
                    && node.dependencies.iter().all(|dep| completed.contains(dep))
            })
            .map(|node| node.step_id.as_str())
            .collect()
    }

    /// Every step that transitively depends on `step_id`, in definition order
    pub fn dependents(&self, step_id: &str) -> Vec<&str> {
        let mut reached: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([step_id]);

        while let Some(current) = queue.pop_front() {
            for node in &self.nodes {
                if node.dependencies.iter().any(|d| d == current)
                    && reached.insert(node.step_id.as_str())
                {
                    queue.push_back(node.step_id.as_str());
                }
            }
        }

        self.nodes
            .iter()
            .map(|n| n.step_id.as_str())
            .filter(|id| reached.contains(id))
            .collect()
    }

    /// Get steps in topological order (Kahn's algorithm, ties broken by definition order)
    pub fn topological_order(&self) -> Vec<&StepNode> {
        let mut in_degree: Vec<usize> = self.nodes.iter().map(|n| n.dependencies.len()).collect();
        let mut adj_list: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];

        for (i, node) in self.nodes.iter().enumerate() {
            for dep in &node.dependencies {
                if let Some(&dep_idx) = self.indices.get(dep) {
                    adj_list[dep_idx].push(i);
                }
            }
        }

        let mut queue: VecDeque<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &deg)| deg == 0)
            .map(|(i, _)| i)
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());

        while let Some(idx) = queue.pop_front() {
            result.push(&self.nodes[idx]);
            for &neighbor in &adj_list[idx] {
                in_degree[neighbor] -= 1;
                if in_degree[neighbor] == 0 {
                    queue.push_back(neighbor);
                }
            }
        }

        result
    }

    /// Group steps into levels; steps on the same level have no dependencies between them
    pub fn parallel_levels(&self) -> Vec<Vec<&StepNode>> {
        let mut levels: Vec<Vec<&StepNode>> = Vec::new();
        let mut assigned: HashMap<&str, usize> = HashMap::new();

        for node in self.topological_order() {
            let level = node
                .dependencies
                .iter()
                .filter_map(|dep| assigned.get(dep.as_str()))
                .max()
                .map(|l| l + 1)
                .unwrap_or(0);

            assigned.insert(node.step_id.as_str(), level);

            if level >= levels.len() {
                levels.resize(level + 1, Vec::new());
            }
            levels[level].push(node);
        }

        levels
    }

    pub fn get(&self, step_id: &str) -> Option<&StepNode> {
        self.indices.get(step_id).map(|&idx| &self.nodes[idx])
    }

    pub fn nodes(&self) -> &[StepNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
