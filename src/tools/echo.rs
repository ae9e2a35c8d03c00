/// Echo Tool Implementation
///
/// Returns the message it is given, optionally prefixed.

use serde_json::{Value, json};

use crate::core::error::ToolFault;
use crate::core::invoker::ToolArguments;
use crate::core::registry::{ToolAnnotations, ToolDescriptor, ToolParameter};

pub fn descriptor() -> ToolDescriptor {
    ToolDescriptor::new("echo", echo)
        .title("Echo")
        .description("Echo a message back to the client.")
        .parameter(
            ToolParameter::required("message", json!({"type": "string"}))
                .describe("The message to echo"),
        )
        .parameter(
            ToolParameter::optional("prefix", json!({"type": "string"}))
                .describe("Text placed before the message"),
        )
        .annotations(ToolAnnotations {
            read_only_hint: Some(true),
            idempotent_hint: Some(true),
            open_world_hint: Some(false),
            ..Default::default()
        })
}

fn echo(args: &ToolArguments) -> Result<Value, ToolFault> {
    let message = args.str("message")?;
    let result = match args.opt_str("prefix")? {
        Some(prefix) => {
            // Pre-allocate with known capacity
            let mut result = String::with_capacity(prefix.len() + message.len());
            result.push_str(prefix);
            result.push_str(message);
            result
        }
        None => message.to_string(),
    };
    Ok(Value::String(result))
}
