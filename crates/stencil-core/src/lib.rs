//! Stencil core crate.
//!
//! Lowers small function bodies into configuration languages that managed
//! services execute on the caller's behalf. The layers are:
//!
//! - `tree` + `reader`: arena expression tree with resolved bindings, and its
//!   JSON source form.
//! - `constant` + `externals`: compile-time folding of sub-expressions,
//!   including values captured from outside the function.
//! - `names`: per-run temporary and unique name allocation.
//! - `dialect`: the mapping template, state machine and event transform
//!   emitters.
//! - `integration`: table operations shared by every backend, plus native
//!   dispatch through a [`integration::Client`].
//!
//! Every emitter follows one rule: ask the evaluator first, emit a literal
//! when the value is known, and fall back to the dialect's runtime path
//! otherwise.

pub mod tree;
pub mod value;
pub mod externals;
pub mod constant;
pub mod names;
pub mod error;
pub mod options;
pub mod reader;
pub mod integration;
pub mod dialect;
pub mod engine;

pub use constant::{Constant, Evaluator};
pub use dialect::{
    AslEmitter, Dialect, EventTransform, EventsEmitter, MappingTemplate, State, StateMachine,
    VtlEmitter,
};
pub use engine::{Artifact, Compiler, Target};
pub use error::{CompileError, ErrorCode, IntegrationError};
pub use externals::{ExternalDef, Externals};
pub use integration::{Client, NativeOperation, TableIntegration, TableOperation};
pub use names::{DeterministicNames, UniqueNames};
pub use options::CompileOptions;
pub use reader::{Document, read_document};
pub use tree::{NodeId, NodeKind, Tree, TreeBuilder, TreeError};
pub use value::{Handle, Value};
