//! Backend emitters.
//!
//! Every emitter walks the same tree and, at each node, first asks the
//! [`crate::Evaluator`] whether the value is known. Known values get the
//! dialect's literal encoding; everything else gets its runtime encoding,
//! recursing into children.

pub mod asl;
pub mod events;
pub mod vtl;

use crate::error::CompileError;
use crate::tree::NodeId;

pub use asl::{AslEmitter, State, StateMachine};
pub use events::{EventTransform, EventsEmitter};
pub use vtl::{MappingTemplate, VtlEmitter};

/// One backend's encoding of expression nodes.
pub trait Dialect {
    /// What a single expression lowers to.
    type Fragment;

    fn emit(&mut self, node: NodeId) -> Result<Self::Fragment, CompileError>;
}

/// `[A-Za-z_$][A-Za-z0-9_$]*`
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
