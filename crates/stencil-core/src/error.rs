use crate::tree::{NodeId, Tree, TreeError};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Closed set of compile diagnostics with stable numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    UnsupportedExpression,
    MissingReturn,
    AmbiguousAddition,
    RuntimeArithmetic,
    IntegrationNotSupported,
    NonConstantOutput,
    NonConstantSpread,
    UnsupportedSpread,
    InvalidEventReference,
    MissingProperty,
    InvalidIntegrationInput,
    UnknownReference,
    InvalidFunction,
}

impl ErrorCode {
    pub fn code(self) -> u32 {
        match self {
            ErrorCode::UnsupportedExpression => 10001,
            ErrorCode::MissingReturn => 10002,
            ErrorCode::AmbiguousAddition => 10003,
            ErrorCode::RuntimeArithmetic => 10004,
            ErrorCode::IntegrationNotSupported => 10005,
            ErrorCode::NonConstantOutput => 10006,
            ErrorCode::NonConstantSpread => 10007,
            ErrorCode::UnsupportedSpread => 10008,
            ErrorCode::InvalidEventReference => 10009,
            ErrorCode::MissingProperty => 10010,
            ErrorCode::InvalidIntegrationInput => 10011,
            ErrorCode::UnknownReference => 10012,
            ErrorCode::InvalidFunction => 10013,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ErrorCode::UnsupportedExpression => "Unsupported expression",
            ErrorCode::MissingReturn => "Missing return statement",
            ErrorCode::AmbiguousAddition => "Ambiguous addition",
            ErrorCode::RuntimeArithmetic => "Arithmetic on runtime values",
            ErrorCode::IntegrationNotSupported => "Integration not supported here",
            ErrorCode::NonConstantOutput => "Output must be constant",
            ErrorCode::NonConstantSpread => "Spread of a runtime value",
            ErrorCode::UnsupportedSpread => "Spread of a non-object value",
            ErrorCode::InvalidEventReference => "Invalid event reference",
            ErrorCode::MissingProperty => "Missing property",
            ErrorCode::InvalidIntegrationInput => "Invalid integration input",
            ErrorCode::UnknownReference => "Unknown reference",
            ErrorCode::InvalidFunction => "Invalid function",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stencil({})", self.code())
    }
}

/// Structured compile error: code + message + originating node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{message}")]
pub struct CompileError {
    pub code: ErrorCode,
    pub message: String,
    pub node: Option<NodeId>,
    pub node_kind: Option<&'static str>,
}

impl CompileError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            node: None,
            node_kind: None,
        }
    }

    /// Attach the node the error originates from.
    pub fn at(mut self, tree: &Tree, node: NodeId) -> Self {
        self.node = Some(node);
        self.node_kind = Some(tree.kind(node).name());
        self
    }

    pub fn unsupported(tree: &Tree, node: NodeId) -> Self {
        let kind = tree.kind(node).name();
        Self::new(
            ErrorCode::UnsupportedExpression,
            format!("Unsupported template expression of kind: {kind}"),
        )
        .at(tree, node)
    }
}

impl From<TreeError> for CompileError {
    fn from(value: TreeError) -> Self {
        Self::new(ErrorCode::InvalidFunction, value.to_string())
    }
}

/// Failure reported by a native table operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntegrationError {
    #[error("missing required field `{field}` for {operation}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },
    #[error("{operation} input must be an object, got {found}")]
    InvalidInput {
        operation: &'static str,
        found: &'static str,
    },
    #[error("client error: {0}")]
    Client(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeBuilder;
    use serde_json::json;

    #[test]
    fn test_error_serializes_with_location() {
        let mut b = TreeBuilder::new();
        let callee = b.reference("f");
        let call = b.call(callee, vec![]);
        let tree = b.finish(call).expect("tree should be well formed");

        let err = CompileError::unsupported(&tree, call);
        assert_eq!(err.to_string(), "Unsupported template expression of kind: CallExpr");
        assert_eq!(
            serde_json::to_value(&err).expect("error should serialize"),
            json!({
                "code": "unsupported_expression",
                "message": "Unsupported template expression of kind: CallExpr",
                "node": call.index(),
                "node_kind": "CallExpr"
            })
        );
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::MissingReturn.to_string(), "Stencil(10002)");
        assert_eq!(ErrorCode::UnsupportedSpread.title(), "Spread of a non-object value");
    }
}
