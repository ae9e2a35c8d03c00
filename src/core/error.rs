/// Error Taxonomy
///
/// Every failure the server can produce falls into one of these enums:
/// - `RegistryError`: construction faults, fatal at startup
/// - `ToolFault`: application errors raised while binding or running a tool
/// - `TransportError`: faults of a single connection
/// - `ClientError`: faults seen by the client side of a connection
///
/// Protocol errors (invalid request, unknown method, invalid params) are not
/// Rust errors at all; they are data, see `protocol::JsonRpcError`.

use thiserror::Error;

use crate::core::protocol::JsonRpcError;

/// Raised when a tool registry cannot be built from the given descriptors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate tool name: {0}")]
    DuplicateToolName(String),
    #[error("tool name must not be empty")]
    EmptyToolName,
}

/// A fault raised while binding arguments to a tool or executing it.
///
/// Faults never cross the transport boundary: the invoker turns every fault
/// into a failure message via `ToolFault::diagnostic`.
#[derive(Debug, Error)]
pub enum ToolFault {
    #[error("missing required argument: {name}")]
    MissingArgument { name: String },
    #[error("invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },
    #[error("{0}")]
    Failed(String),
    #[error("{0}")]
    Panicked(String),
}

impl ToolFault {
    /// Convenience constructor for tool handlers reporting their own failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn invalid_argument(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Name of the fault variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingArgument { .. } => "MissingArgument",
            Self::InvalidArgument { .. } => "InvalidArgument",
            Self::Failed(_) => "ToolFailed",
            Self::Panicked(_) => "ToolPanicked",
        }
    }

    /// Text shown to the caller: the fault message when it is not blank,
    /// otherwise the fault kind, so the text is never empty.
    pub fn diagnostic(&self) -> String {
        let message = self.to_string();
        if message.trim().is_empty() {
            self.kind().to_string()
        } else {
            message
        }
    }
}

/// Faults of a single stream connection. All of them are terminal for the
/// connection except `FrameTooLarge` and `Malformed`, which only affect the
/// frame they were raised for.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl TransportError {
    /// Whether the connection can keep carrying frames after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::FrameTooLarge { .. } | Self::Malformed(_))
    }
}

/// Faults observed by `RpcClient` while waiting for a response.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("request id {0} is already pending")]
    DuplicateRequestId(u64),
    #[error("request {0} timed out")]
    Timeout(u64),
    #[error("connection closed before a response arrived")]
    Closed,
    #[error("server returned error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_uses_message_when_present() {
        let fault = ToolFault::failed("disk on fire");
        assert_eq!(fault.diagnostic(), "disk on fire");
    }

    #[test]
    fn diagnostic_falls_back_to_kind_for_blank_messages() {
        assert_eq!(ToolFault::failed("  ").diagnostic(), "ToolFailed");
        assert_eq!(ToolFault::Panicked(String::new()).diagnostic(), "ToolPanicked");
    }

    #[test]
    fn missing_argument_names_the_parameter() {
        let fault = ToolFault::MissingArgument {
            name: "message".to_string(),
        };
        assert_eq!(fault.diagnostic(), "missing required argument: message");
    }

    #[test]
    fn only_frame_level_errors_are_recoverable() {
        assert!(TransportError::FrameTooLarge { limit: 1 }.is_recoverable());
        assert!(!TransportError::Closed.is_recoverable());
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert!(!TransportError::from(io).is_recoverable());
    }
}
