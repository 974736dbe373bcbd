//! Definition table: service id to construction recipe.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::container::scope::ScopeKind;
use crate::container::types::TypeRegistry;
use crate::errors::CoreError;

/// Construction recipe for one service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    /// Filled from the table key when loaded from a map
    #[serde(default)]
    pub id: String,
    #[serde(rename = "class")]
    pub class_name: String,
    #[serde(default)]
    pub args: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeKind>,
    #[serde(default)]
    pub initialize_immediately: bool,
}

impl ServiceDefinition {
    pub fn new(id: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            class_name: class_name.into(),
            args: BTreeMap::new(),
            depends_on: Vec::new(),
            scope: None,
            initialize_immediately: false,
        }
    }

    /// Definition for a bare class name used as an id
    pub fn anonymous(class_name: &str) -> Self {
        Self::new(class_name, class_name)
    }

    pub fn arg(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.depends_on.push(id.into());
        self
    }

    pub fn scope(mut self, scope: ScopeKind) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn initialize_immediately(mut self, enabled: bool) -> Self {
        self.initialize_immediately = enabled;
        self
    }
}

/// Immutable table of service definitions, in declaration order
#[derive(Debug, Clone, Default)]
pub struct DefinitionTable {
    definitions: Vec<ServiceDefinition>,
    index: HashMap<String, usize>,
}

impl DefinitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_definitions(
        definitions: impl IntoIterator<Item = ServiceDefinition>,
    ) -> Result<Self, CoreError> {
        let mut table = Self::new();
        for definition in definitions {
            table.insert(definition)?;
        }
        Ok(table)
    }

    /// Load from a JSON object mapping id to `{class, args, depends_on, scope, initialize_immediately}`
    pub fn from_value(value: serde_json::Value) -> Result<Self, CoreError> {
        let serde_json::Value::Object(map) = value else {
            return Err(CoreError::configuration(
                "definition table must be an object keyed by service id",
            ));
        };

        let mut table = Self::new();
        for (id, record) in map {
            let mut definition: ServiceDefinition =
                serde_json::from_value(record).map_err(|e| {
                    CoreError::configuration(format!("invalid definition for {}: {}", id, e))
                })?;
            definition.id = id;
            table.insert(definition)?;
        }
        Ok(table)
    }

    pub fn insert(&mut self, definition: ServiceDefinition) -> Result<(), CoreError> {
        if definition.id.is_empty() {
            return Err(CoreError::configuration("service definition id cannot be empty"));
        }
        if self.index.contains_key(&definition.id) {
            return Err(CoreError::configuration(format!(
                "service {} is defined more than once",
                definition.id
            )));
        }
        self.index
            .insert(definition.id.clone(), self.definitions.len());
        self.definitions.push(definition);
        Ok(())
    }

    pub fn has(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&ServiceDefinition> {
        self.index.get(id).map(|&i| &self.definitions[i])
    }

    pub fn get_definition(&self, id: &str) -> Result<&ServiceDefinition, CoreError> {
        self.get(id).ok_or_else(|| CoreError::service_not_found(id))
    }

    /// The definition for `id`, or an anonymous one when `id` names a concrete class
    pub fn definition_for(
        &self,
        id: &str,
        types: &TypeRegistry,
    ) -> Result<ServiceDefinition, CoreError> {
        if let Some(definition) = self.get(id) {
            return Ok(definition.clone());
        }
        if types.is_concrete(id) {
            return Ok(ServiceDefinition::anonymous(id));
        }
        Err(CoreError::service_not_found(id))
    }

    pub fn resolve_class_name(&self, id: &str, types: &TypeRegistry) -> Result<String, CoreError> {
        if let Some(definition) = self.get(id) {
            return Ok(definition.class_name.clone());
        }
        if types.is_concrete(id) {
            return Ok(id.to_string());
        }
        Err(CoreError::service_not_found(id))
    }

    /// Ids whose definition constructs `class_name`, in table order
    pub fn ids_by_class(&self, class_name: &str) -> Vec<String> {
        self.definitions
            .iter()
            .filter(|d| d.class_name == class_name)
            .map(|d| d.id.clone())
            .collect()
    }

    pub fn depends_on(&self, id: &str) -> &[String] {
        self.get(id)
            .map(|d| d.depends_on.as_slice())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceDefinition> {
        self.definitions.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.definitions.iter().map(|d| d.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
