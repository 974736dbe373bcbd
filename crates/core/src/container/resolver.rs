use std::collections::{HashMap, HashSet, VecDeque};

use crate::errors::CoreError;

/// Ids currently being resolved in one execution context
#[derive(Debug, Clone, Default)]
pub struct ResolutionPath {
    pub services: Vec<String>,
}

impl ResolutionPath {
    /// Create a new resolution path
    pub fn new() -> Self {
        Self {
            services: Vec::new(),
        }
    }

    /// Add a service to the resolution path
    pub fn push(&mut self, id: impl Into<String>) {
        self.services.push(id.into());
    }

    /// Remove the last service from the resolution path
    pub fn pop(&mut self) -> Option<String> {
        self.services.pop()
    }

    /// Check if the path contains a service (for cycle detection)
    pub fn contains(&self, id: &str) -> bool {
        self.services.iter().any(|s| s == id)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Push `id` unless that would close a cycle or exceed `max_depth`
    pub fn enter(&mut self, id: &str, max_depth: usize) -> Result<(), CoreError> {
        if self.contains(id) {
            let mut stack = self.services.clone();
            stack.push(id.to_string());
            return Err(CoreError::RecursionDetected {
                id: id.to_string(),
                stack,
            });
        }
        if self.services.len() >= max_depth {
            return Err(CoreError::ResolutionDepthExceeded {
                id: id.to_string(),
                depth: max_depth,
                stack: self.services.clone(),
            });
        }
        self.push(id);
        Ok(())
    }

    /// Remove the most recent frame for `id`, wherever it sits
    pub fn leave(&mut self, id: &str) -> bool {
        match self.services.iter().rposition(|s| s == id) {
            Some(index) => {
                self.services.remove(index);
                true
            }
            None => false,
        }
    }

    /// Get the path as a string for error messages
    pub fn path_string(&self) -> String {
        self.services.join(" -> ")
    }
}

/// Anything that owns a resolution stack frame
pub trait FrameOwner {
    fn pop_frame(&self, id: &str);
}

/// Pops the frame it was created for when dropped, on success, error or unwind alike
pub struct StackGuard<'a> {
    owner: &'a dyn FrameOwner,
    id: &'a str,
}

impl<'a> StackGuard<'a> {
    /// The caller must already have pushed the frame for `id`
    pub fn new(owner: &'a dyn FrameOwner, id: &'a str) -> Self {
        Self { owner, id }
    }
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        self.owner.pop_frame(self.id);
    }
}

/// Dependency graph node
#[derive(Debug)]
pub struct DependencyNode {
    pub id: String,
    pub dependencies: Vec<String>,
    pub dependents: Vec<String>,
}

/// Graph over declared `depends_on` edges.
///
/// Nodes keep insertion order so sorts are deterministic. Edges to ids that
/// were never added are kept on the node but ignored when sorting.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    order: Vec<String>,
    nodes: HashMap<String, DependencyNode>,
}

impl DependencyGraph {
    /// Create a new dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service to the graph
    pub fn add_service(&mut self, id: &str, dependencies: &[String]) {
        if !self.nodes.contains_key(id) {
            self.order.push(id.to_string());
        }
        self.nodes.insert(
            id.to_string(),
            DependencyNode {
                id: id.to_string(),
                dependencies: dependencies.to_vec(),
                dependents: Vec::new(),
            },
        );
    }

    /// Build reverse dependency relationships
    pub fn build_reverse_dependencies(&mut self) {
        for node in self.nodes.values_mut() {
            node.dependents.clear();
        }

        let edges: Vec<(String, String)> = self
            .order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .flat_map(|node| {
                node.dependencies
                    .iter()
                    .map(move |dep| (node.id.clone(), dep.clone()))
            })
            .collect();

        for (id, dep) in edges {
            if let Some(dep_node) = self.nodes.get_mut(&dep) {
                if !dep_node.dependents.contains(&id) {
                    dep_node.dependents.push(id);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Detect circular dependencies
    pub fn detect_cycles(&self) -> Result<(), CoreError> {
        let mut visited = HashSet::new();
        let mut in_progress = HashSet::new();

        for id in &self.order {
            if !visited.contains(id.as_str()) {
                let mut path = ResolutionPath::new();
                self.detect_cycle_dfs(id, &mut visited, &mut in_progress, &mut path)?;
            }
        }

        Ok(())
    }

    fn detect_cycle_dfs(
        &self,
        id: &str,
        visited: &mut HashSet<String>,
        in_progress: &mut HashSet<String>,
        path: &mut ResolutionPath,
    ) -> Result<(), CoreError> {
        if in_progress.contains(id) {
            path.push(id);
            return Err(CoreError::RecursionDetected {
                id: id.to_string(),
                stack: path.services.clone(),
            });
        }

        if visited.contains(id) {
            return Ok(());
        }

        in_progress.insert(id.to_string());
        path.push(id);

        if let Some(node) = self.nodes.get(id) {
            for dep in &node.dependencies {
                if self.nodes.contains_key(dep) {
                    self.detect_cycle_dfs(dep, visited, in_progress, path)?;
                }
            }
        }

        path.pop();
        in_progress.remove(id);
        visited.insert(id.to_string());

        Ok(())
    }

    /// Dependencies before dependents
    pub fn topological_sort(&self) -> Result<Vec<String>, CoreError> {
        self.detect_cycles()?;

        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut queue = VecDeque::new();
        let mut result = Vec::with_capacity(self.order.len());

        for id in &self.order {
            let degree = self.nodes[id]
                .dependencies
                .iter()
                .filter(|dep| self.nodes.contains_key(dep.as_str()))
                .collect::<HashSet<_>>()
                .len();
            in_degree.insert(id.as_str(), degree);
            if degree == 0 {
                queue.push_back(id.as_str());
            }
        }

        while let Some(id) = queue.pop_front() {
            result.push(id.to_string());

            if let Some(node) = self.nodes.get(id) {
                for dependent in &node.dependents {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(dependent.as_str());
                        }
                    }
                }
            }
        }

        if result.len() != self.nodes.len() {
            return Err(CoreError::configuration(
                "dependency graph could not be ordered",
            ));
        }

        Ok(result)
    }

    /// Dependents before dependencies, the reverse of construction order
    pub fn release_order(&self) -> Result<Vec<String>, CoreError> {
        let mut order = self.topological_sort()?;
        order.reverse();
        Ok(order)
    }

    /// Every declared dependency must name a node in the graph
    pub fn validate_dependencies(&self) -> Result<(), CoreError> {
        for id in &self.order {
            for dep in &self.nodes[id].dependencies {
                if !self.nodes.contains_key(dep) {
                    return Err(CoreError::configuration(format!(
                        "dependency {} declares depends_on {} which is not defined",
                        id, dep
                    )));
                }
            }
        }
        Ok(())
    }

    /// Get dependencies for a service
    pub fn get_dependencies(&self, id: &str) -> Option<&[String]> {
        self.nodes.get(id).map(|node| node.dependencies.as_slice())
    }

    /// Get dependents for a service
    pub fn get_dependents(&self, id: &str) -> Option<&[String]> {
        self.nodes.get(id).map(|node| node.dependents.as_slice())
    }
}
