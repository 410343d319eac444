use crate::constant::{Constant, Evaluator};
use crate::dialect::{
    AslEmitter, EventTransform, EventsEmitter, MappingTemplate, StateMachine, VtlEmitter,
};
use crate::error::CompileError;
use crate::externals::Externals;
use crate::integration::{NativeOperation, TableIntegration, TableOperation};
use crate::options::CompileOptions;
use crate::reader::Document;
use crate::tree::{NodeId, Tree};
use crate::value::{Handle, Value};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Backend a function is lowered into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Vtl,
    Asl,
    Events,
}

impl Target {
    pub const ALL: [Target; 3] = [Target::Vtl, Target::Asl, Target::Events];

    pub fn as_str(self) -> &'static str {
        match self {
            Target::Vtl => "vtl",
            Target::Asl => "asl",
            Target::Events => "events",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Target::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown target `{s}` (expected vtl, asl or events)"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Artifact {
    MappingTemplate(MappingTemplate),
    StateMachine(StateMachine),
    EventTransform(EventTransform),
}

impl Artifact {
    /// Template text for mapping templates, pretty JSON otherwise.
    pub fn render(&self) -> Result<String, serde_json::Error> {
        match self {
            Artifact::MappingTemplate(template) => Ok(template.to_string()),
            other => serde_json::to_string_pretty(other),
        }
    }
}

/// Compilation surface holding options and the externals functions close
/// over.
///
/// Every compile call builds fresh emitters, so name allocation never leaks
/// between units and one `Compiler` can be shared across threads.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CompileOptions,
    externals: Externals,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: CompileOptions) -> Self {
        Self {
            options,
            externals: Externals::new(),
        }
    }

    /// Take externals and options (when present) from a source document.
    pub fn for_document(document: &Document) -> Self {
        Self {
            options: document.options.clone().unwrap_or_default(),
            externals: document.externals.clone(),
        }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: CompileOptions) {
        self.options = options;
    }

    pub fn externals(&self) -> &Externals {
        &self.externals
    }

    /// Register or replace an external value.
    pub fn define(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.externals.define(name, value)
    }

    /// Register a table handle under `name`.
    pub fn table(&mut self, name: impl Into<String>, table_name: impl Into<String>) -> Option<Value> {
        self.externals.table(name, table_name)
    }

    /// Fold one node.
    pub fn fold(&self, tree: &Tree, node: NodeId) -> Option<Constant> {
        Evaluator::new(tree, &self.externals).eval(node)
    }

    pub fn mapping_template(
        &self,
        tree: &Tree,
        function: NodeId,
    ) -> Result<MappingTemplate, CompileError> {
        VtlEmitter::new(tree, &self.externals, &self.options).compile(function)
    }

    pub fn state_machine(&self, tree: &Tree, function: NodeId) -> Result<StateMachine, CompileError> {
        AslEmitter::new(tree, &self.externals, &self.options).compile(function)
    }

    pub fn event_transform(
        &self,
        tree: &Tree,
        function: NodeId,
    ) -> Result<EventTransform, CompileError> {
        EventsEmitter::new(tree, &self.externals).compile(function)
    }

    pub fn compile(
        &self,
        tree: &Tree,
        function: NodeId,
        target: Target,
    ) -> Result<Artifact, CompileError> {
        debug!(%target, %function, nodes = tree.len(), "compile");
        let artifact = match target {
            Target::Vtl => self.mapping_template(tree, function).map(Artifact::MappingTemplate),
            Target::Asl => self.state_machine(tree, function).map(Artifact::StateMachine),
            Target::Events => self.event_transform(tree, function).map(Artifact::EventTransform),
        };
        if let Err(err) = &artifact {
            debug!(%target, code = %err.code, "compile failed: {err}");
        }
        artifact
    }

    /// Runtime dispatch for `operation` against the table registered as `name`.
    pub fn native(&self, name: &str, operation: TableOperation) -> Option<NativeOperation> {
        match self.externals.resolve(name)? {
            Value::Opaque(Handle::Table { name: table_name }) => {
                Some(TableIntegration::new(table_name.clone(), operation).native())
            }
            _ => None,
        }
    }
}
