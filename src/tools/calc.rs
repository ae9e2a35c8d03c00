/// Calculator Tool Implementation

use serde_json::{Value, json};

use crate::core::error::ToolFault;
use crate::core::invoker::ToolArguments;
use crate::core::registry::{ToolAnnotations, ToolDescriptor, ToolParameter};

pub fn descriptor() -> ToolDescriptor {
    ToolDescriptor::new("add", add)
        .title("Add")
        .description("Add two numbers.")
        .parameter(ToolParameter::required("a", json!({"type": "number"})).describe("First addend"))
        .parameter(ToolParameter::required("b", json!({"type": "number"})).describe("Second addend"))
        .annotations(ToolAnnotations {
            read_only_hint: Some(true),
            idempotent_hint: Some(true),
            open_world_hint: Some(false),
            ..Default::default()
        })
}

fn add(args: &ToolArguments) -> Result<Value, ToolFault> {
    let a = args.value("a")?;
    let b = args.value("b")?;

    // Keep integer sums exact when both operands are integers.
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        return a
            .checked_add(b)
            .map(|sum| json!(sum))
            .ok_or_else(|| ToolFault::failed("integer overflow"));
    }

    let sum = args.f64("a")? + args.f64("b")?;
    serde_json::Number::from_f64(sum)
        .map(Value::Number)
        .ok_or_else(|| ToolFault::failed("result is not a finite number"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::invoker::{ToolOutcome, invoke};

    #[test]
    fn adds_integers_exactly() {
        let outcome = invoke(&descriptor(), Some(&json!({"a": 2, "b": 40})));
        assert_eq!(outcome, ToolOutcome::Success("42".to_string()));
    }

    #[test]
    fn adds_floats() {
        let outcome = invoke(&descriptor(), Some(&json!({"arg0": 1.5, "arg1": 2.25})));
        assert_eq!(outcome, ToolOutcome::Success("3.75".to_string()));
    }

    #[test]
    fn rejects_non_numbers() {
        let outcome = invoke(&descriptor(), Some(&json!({"a": "one", "b": 2})));
        assert_eq!(
            outcome,
            ToolOutcome::Failure("invalid argument 'a': expected a number".to_string())
        );
    }

    #[test]
    fn reports_overflow() {
        let outcome = invoke(&descriptor(), Some(&json!({"a": i64::MAX, "b": 1})));
        assert_eq!(outcome, ToolOutcome::Failure("integer overflow".to_string()));
    }
}
