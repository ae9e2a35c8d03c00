/// Tool Invoker
///
/// Binds a decoded arguments value to a tool's declared parameters, runs the
/// tool and normalizes whatever happens into a `ToolOutcome`. Nothing raised
/// by a tool, panics included, escapes this module.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::core::error::ToolFault;
use crate::core::protocol::ToolCallResult;
use crate::core::registry::{Slot, ToolDescriptor};

/// Text returned for tools that produce no value.
pub const NO_VALUE_TEXT: &str = "Success";

/// Arguments bound to a tool's declared parameters, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ToolArguments {
    names: Vec<String>,
    values: Vec<Option<Value>>,
}

impl ToolArguments {
    /// Raw value bound to `name`, if the caller supplied one.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.names
            .iter()
            .position(|declared| declared == name)
            .and_then(|index| self.values[index].as_ref())
            .filter(|value| !value.is_null())
    }

    /// Value bound to `name`, or a `MissingArgument` fault.
    pub fn value(&self, name: &str) -> Result<&Value, ToolFault> {
        self.get(name).ok_or_else(|| ToolFault::MissingArgument {
            name: name.to_string(),
        })
    }

    pub fn str(&self, name: &str) -> Result<&str, ToolFault> {
        self.value(name)?
            .as_str()
            .ok_or_else(|| ToolFault::invalid_argument(name, "expected a string"))
    }

    pub fn f64(&self, name: &str) -> Result<f64, ToolFault> {
        self.value(name)?
            .as_f64()
            .ok_or_else(|| ToolFault::invalid_argument(name, "expected a number"))
    }

    /// Deserialize the value bound to `name` into `T`.
    pub fn parse<T: DeserializeOwned>(&self, name: &str) -> Result<T, ToolFault> {
        serde_json::from_value(self.value(name)?.clone())
            .map_err(|e| ToolFault::invalid_argument(name, e.to_string()))
    }

    /// Optional string parameter; absent and null both read as `None`.
    pub fn opt_str(&self, name: &str) -> Result<Option<&str>, ToolFault> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => value
                .as_str()
                .map(Some)
                .ok_or_else(|| ToolFault::invalid_argument(name, "expected a string")),
        }
    }
}

/// Normalized result of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    Success(String),
    Failure(String),
}

impl ToolOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Success(text) | Self::Failure(text) => text,
        }
    }
}

impl From<ToolOutcome> for ToolCallResult {
    fn from(outcome: ToolOutcome) -> Self {
        match outcome {
            ToolOutcome::Success(text) => ToolCallResult::success(text),
            ToolOutcome::Failure(text) => ToolCallResult::error(text),
        }
    }
}

/// Bind `arguments` to the tool's parameters.
///
/// Anything other than a JSON object (absent, null, a string, ...) is treated
/// as "no bindable arguments"; required parameters then fault here rather
/// than on a type error.
///
/// # Arguments
/// * `tool` - Descriptor whose declared parameters drive the binding
/// * `arguments` - The `arguments` member of a `tools/call` request, if any
///
/// # Returns
/// One slot per declared parameter, filled by name or by its `argN` alias,
/// or `ToolFault::MissingArgument` for the first required parameter left
/// empty.
pub fn bind(tool: &ToolDescriptor, arguments: Option<&Value>) -> Result<ToolArguments, ToolFault> {
    let parameters = tool.parameters();
    let mut named: Vec<Option<&Value>> = vec![None; parameters.len()];
    let mut positional: Vec<Option<&Value>> = vec![None; parameters.len()];

    if let Some(Value::Object(object)) = arguments {
        for (key, value) in object {
            match tool.bindings().resolve(key) {
                Some(Slot::Named(index)) => named[index] = Some(value),
                Some(Slot::Positional(index)) => positional[index] = Some(value),
                None => {}
            }
        }
    }

    let mut values = Vec::with_capacity(parameters.len());
    for (index, parameter) in parameters.iter().enumerate() {
        let value = named[index]
            .filter(|value| !value.is_null())
            .or_else(|| positional[index].filter(|value| !value.is_null()));
        if parameter.required && value.is_none() {
            return Err(ToolFault::MissingArgument {
                name: parameter.name.clone(),
            });
        }
        values.push(value.cloned());
    }

    Ok(ToolArguments {
        names: parameters.iter().map(|p| p.name.clone()).collect(),
        values,
    })
}

/// Canonical text form of a tool's return value.
pub fn render(value: &Value) -> String {
    match value {
        Value::Null => NO_VALUE_TEXT.to_string(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Bind, execute and normalize. Never panics on behalf of the tool.
pub fn invoke(tool: &ToolDescriptor, arguments: Option<&Value>) -> ToolOutcome {
    let result = bind(tool, arguments).and_then(|bound| {
        let handler = tool.handler();
        catch_unwind(AssertUnwindSafe(|| handler(&bound)))
            .unwrap_or_else(|payload| Err(ToolFault::Panicked(panic_message(payload.as_ref()))))
    });

    match result {
        Ok(value) => ToolOutcome::Success(render(&value)),
        Err(fault) => {
            tracing::warn!(tool = %tool.name, kind = fault.kind(), error = %fault, "tool call failed");
            ToolOutcome::Failure(fault.diagnostic())
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::new()
    }
}
