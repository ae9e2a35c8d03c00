/// Tools Module
///
/// Built-in MCP tools. Each tool lives in its own module exporting a
/// `descriptor` function; `builtin_tools` collects them for the registry.

pub mod calc;
pub mod echo;

use crate::core::registry::ToolDescriptor;

/// All built-in tools, in the order `tools/list` reports them.
pub fn builtin_tools() -> Vec<ToolDescriptor> {
    vec![echo::descriptor(), calc::descriptor()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::ToolRegistry;

    #[test]
    fn builtin_tools_have_unique_names() {
        let registry = ToolRegistry::new(builtin_tools()).expect("unique tool names");
        assert_eq!(registry.len(), 2);
    }
}
