/// Tool Registry
///
/// Holds the immutable list of tools exposed by the server. A registry is
/// built once from a list of descriptors and never changes afterwards, so it
/// can be shared behind an `Arc` and read from any number of workers without
/// locking.

use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::core::error::{RegistryError, ToolFault};
use crate::core::invoker::ToolArguments;

/// Tool handler function type definition.
///
/// Handlers receive the arguments bound to their declared parameters and
/// return either a JSON value or a fault. Returning `Value::Null` means the
/// tool produced no value.
pub type ToolHandler = Arc<dyn Fn(&ToolArguments) -> Result<Value, ToolFault> + Send + Sync>;

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolParameter {
    pub name: String,
    /// JSON schema of the parameter value
    pub schema: Value,
    pub required: bool,
}

impl ToolParameter {
    pub fn required(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
            required: false,
        }
    }

    /// Attach a description to the parameter schema.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        if let Value::Object(schema) = &mut self.schema {
            schema.insert("description".to_string(), Value::String(description.into()));
        }
        self
    }
}

/// Behavioural hints published alongside a tool in `tools/list`.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only_hint: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destructive_hint: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotent_hint: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_world_hint: Option<bool>,
}

/// Where an incoming argument key lands in the declared parameter list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    Named(usize),
    Positional(usize),
}

/// Name to parameter-index resolution table.
///
/// Declared names always win over the positional `argN` aliases, so a
/// parameter literally called `arg1` is never shadowed by the alias of the
/// second parameter.
#[derive(Debug, Clone, Default)]
pub(crate) struct BindingTable {
    slots: HashMap<String, Slot>,
}

impl BindingTable {
    fn new(parameters: &[ToolParameter]) -> Self {
        let mut slots = HashMap::with_capacity(parameters.len() * 2);
        for (index, parameter) in parameters.iter().enumerate() {
            slots.insert(parameter.name.clone(), Slot::Named(index));
        }
        for index in 0..parameters.len() {
            slots
                .entry(format!("arg{}", index))
                .or_insert(Slot::Positional(index));
        }
        Self { slots }
    }

    pub(crate) fn resolve(&self, key: &str) -> Option<Slot> {
        self.slots.get(key).copied()
    }
}

/// MCP tool definition: metadata, declared parameters and the handler.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub title: Option<String>,
    pub annotations: Option<ToolAnnotations>,
    pub meta: Option<Map<String, Value>>,
    parameters: Vec<ToolParameter>,
    bindings: BindingTable,
    handler: ToolHandler,
}

impl ToolDescriptor {
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&ToolArguments) -> Result<Value, ToolFault> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: None,
            title: None,
            annotations: None,
            meta: None,
            parameters: Vec::new(),
            bindings: BindingTable::default(),
            handler: Arc::new(handler),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn annotations(mut self, annotations: ToolAnnotations) -> Self {
        self.annotations = Some(annotations);
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }

    /// Declare the next parameter. Declaration order defines the positional
    /// aliases `arg0`, `arg1`, ...
    pub fn parameter(mut self, parameter: ToolParameter) -> Self {
        self.parameters.push(parameter);
        self.bindings = BindingTable::new(&self.parameters);
        self
    }

    pub fn parameters(&self) -> &[ToolParameter] {
        &self.parameters
    }

    pub(crate) fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    pub(crate) fn handler(&self) -> &ToolHandler {
        &self.handler
    }

    /// JSON schema describing the tool's arguments object.
    pub fn input_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .parameters
            .iter()
            .map(|parameter| (parameter.name.clone(), parameter.schema.clone()))
            .collect();
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|parameter| parameter.required)
            .map(|parameter| parameter.name.as_str())
            .collect();

        let mut schema = json!({
            "type": "object",
            "properties": properties,
        });
        if !required.is_empty() {
            schema["required"] = json!(required);
        }
        schema
    }

    /// Entry of the `tools/list` result. Optional fields are only emitted
    /// when the tool carries them.
    pub fn to_listing(&self) -> Value {
        let mut entry = Map::new();
        entry.insert("name".to_string(), Value::String(self.name.clone()));
        if let Some(title) = &self.title {
            entry.insert("title".to_string(), Value::String(title.clone()));
        }
        if let Some(description) = &self.description {
            entry.insert("description".to_string(), Value::String(description.clone()));
        }
        entry.insert("inputSchema".to_string(), self.input_schema());
        if let Some(annotations) = &self.annotations {
            if let Ok(value) = serde_json::to_value(annotations) {
                entry.insert("annotations".to_string(), value);
            }
        }
        if let Some(meta) = &self.meta {
            entry.insert("_meta".to_string(), Value::Object(meta.clone()));
        }
        Value::Object(entry)
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// Registry of available MCP tools.
///
/// Tools keep their registration order for `tools/list`; lookups by name go
/// through an index built at construction.
#[derive(Debug)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Build a registry from the server's tool descriptors.
    ///
    /// # Arguments
    /// * `descriptors` - Tools in the order `tools/list` should report them
    ///
    /// # Returns
    /// The registry, or a `RegistryError` naming the first empty or repeated
    /// tool name. No request can be served before this succeeds.
    pub fn new(descriptors: Vec<ToolDescriptor>) -> Result<Self, RegistryError> {
        let mut by_name = HashMap::with_capacity(descriptors.len());
        for (index, descriptor) in descriptors.iter().enumerate() {
            if descriptor.name.trim().is_empty() {
                return Err(RegistryError::EmptyToolName);
            }
            if by_name.insert(descriptor.name.clone(), index).is_some() {
                return Err(RegistryError::DuplicateToolName(descriptor.name.clone()));
            }
        }
        Ok(Self {
            tools: descriptors,
            by_name,
        })
    }

    pub fn find(&self, name: &str) -> Option<&ToolDescriptor> {
        self.by_name.get(name).map(|&index| &self.tools[index])
    }

    /// All tools in registration order.
    pub fn list(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
