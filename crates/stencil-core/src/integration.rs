//! Table integrations.
//!
//! One [`OperationSpec`] per logical table operation describes the request
//! fields. A call such as `table.updateItem({ key, update })` is turned into a
//! [`RequestPlan`] once, and each backend renders that same plan: the mapping
//! template dialect as a resolver request document, the state machine dialect
//! as an SDK `Task` state, and [`NativeOperation`] as a request built at
//! runtime and handed to a [`Client`].

use crate::constant::Evaluator;
use crate::error::{CompileError, ErrorCode, IntegrationError};
use crate::tree::{NodeId, NodeKind};
use crate::value::{Handle, Value};
use serde::{Deserialize, Serialize};
use serde_json::Map;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableOperation {
    GetItem,
    PutItem,
    UpdateItem,
    DeleteItem,
    Query,
    Scan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Read,
    Write,
}

/// Static description of a table operation's request document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSpec {
    pub operation: &'static str,
    pub method: &'static str,
    pub access: Access,
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

impl OperationSpec {
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, bool)> + '_ {
        self.required
            .iter()
            .map(|f| (*f, true))
            .chain(self.optional.iter().map(|f| (*f, false)))
    }

    pub fn knows(&self, field: &str) -> bool {
        self.required.contains(&field) || self.optional.contains(&field)
    }
}

const GET_ITEM: OperationSpec = OperationSpec {
    operation: "GetItem",
    method: "getItem",
    access: Access::Read,
    required: &["key"],
    optional: &["consistentRead"],
};

const PUT_ITEM: OperationSpec = OperationSpec {
    operation: "PutItem",
    method: "putItem",
    access: Access::Write,
    required: &["key", "attributeValues"],
    optional: &["condition", "_version"],
};

const UPDATE_ITEM: OperationSpec = OperationSpec {
    operation: "UpdateItem",
    method: "updateItem",
    access: Access::Write,
    required: &["key", "update"],
    optional: &["condition", "_version"],
};

const DELETE_ITEM: OperationSpec = OperationSpec {
    operation: "DeleteItem",
    method: "deleteItem",
    access: Access::Write,
    required: &["key"],
    optional: &["condition", "_version"],
};

const QUERY: OperationSpec = OperationSpec {
    operation: "Query",
    method: "query",
    access: Access::Read,
    required: &["query"],
    optional: &[
        "filter",
        "index",
        "nextToken",
        "limit",
        "scanIndexForward",
        "consistentRead",
        "select",
    ],
};

const SCAN: OperationSpec = OperationSpec {
    operation: "Scan",
    method: "scan",
    access: Access::Read,
    required: &[],
    optional: &[
        "filter",
        "index",
        "nextToken",
        "limit",
        "consistentRead",
        "select",
        "segment",
        "totalSegments",
    ],
};

impl TableOperation {
    pub const ALL: [TableOperation; 6] = [
        TableOperation::GetItem,
        TableOperation::PutItem,
        TableOperation::UpdateItem,
        TableOperation::DeleteItem,
        TableOperation::Query,
        TableOperation::Scan,
    ];

    pub fn spec(self) -> &'static OperationSpec {
        match self {
            TableOperation::GetItem => &GET_ITEM,
            TableOperation::PutItem => &PUT_ITEM,
            TableOperation::UpdateItem => &UPDATE_ITEM,
            TableOperation::DeleteItem => &DELETE_ITEM,
            TableOperation::Query => &QUERY,
            TableOperation::Scan => &SCAN,
        }
    }

    pub fn from_method(method: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.spec().method == method)
    }
}

/// Whether a request field is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Always,
    /// Sent only when the runtime input has a non-null value for it.
    IfDefined,
    Never,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldPlan {
    pub name: &'static str,
    pub required: bool,
    pub presence: Presence,
    /// Property value node when the argument is an object literal.
    pub source: Option<NodeId>,
}

/// Shape of the call argument.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestInput {
    /// No argument.
    Empty,
    /// An object literal; field values come from its properties.
    Literal(NodeId),
    /// A fully constant object.
    Constant(Value),
    /// Any other expression, only known at runtime.
    Runtime(NodeId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestPlan {
    pub spec: &'static OperationSpec,
    pub table_name: String,
    pub input: RequestInput,
    pub fields: Vec<FieldPlan>,
}

impl RequestPlan {
    /// Fields that can appear in the request, in declaration order.
    pub fn sent(&self) -> impl Iterator<Item = &FieldPlan> {
        self.fields.iter().filter(|f| f.presence != Presence::Never)
    }
}

/// A table operation bound to a concrete table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableIntegration {
    pub table_name: String,
    pub operation: TableOperation,
}

impl TableIntegration {
    pub fn new(table_name: impl Into<String>, operation: TableOperation) -> Self {
        Self {
            table_name: table_name.into(),
            operation,
        }
    }

    #[inline]
    pub fn spec(&self) -> &'static OperationSpec {
        self.operation.spec()
    }

    /// Recognize `<table>.<method>(...)` where `<table>` folds to a table handle.
    pub fn resolve(eval: &Evaluator<'_>, call: NodeId) -> Option<Self> {
        let tree = eval.tree();
        let NodeKind::Call { callee, .. } = tree.kind(call) else {
            return None;
        };
        let NodeKind::PropAccess { expr, name } = tree.kind(*callee) else {
            return None;
        };
        let constant = eval.eval(*expr)?;
        let Value::Opaque(Handle::Table { name: table_name }) = constant.value() else {
            return None;
        };
        let operation = TableOperation::from_method(name)?;
        Some(Self::new(table_name.clone(), operation))
    }

    /// True when the call targets a table handle at all, known method or not.
    pub fn is_integration_call(eval: &Evaluator<'_>, call: NodeId) -> bool {
        let tree = eval.tree();
        let NodeKind::Call { callee, .. } = tree.kind(call) else {
            return false;
        };
        let target = match tree.kind(*callee) {
            NodeKind::PropAccess { expr, .. } => *expr,
            _ => *callee,
        };
        matches!(
            eval.eval(target).map(|c| c.into_value()),
            Some(Value::Opaque(Handle::Table { .. }))
        )
    }

    pub fn plan(&self, eval: &Evaluator<'_>, call: NodeId) -> Result<RequestPlan, CompileError> {
        let tree = eval.tree();
        let spec = self.spec();
        let invalid = |message: String| {
            CompileError::new(ErrorCode::InvalidIntegrationInput, message).at(tree, call)
        };

        let NodeKind::Call { args, .. } = tree.kind(call) else {
            return Err(CompileError::unsupported(tree, call));
        };
        let input = match args.as_slice() {
            [] => RequestInput::Empty,
            [arg] if matches!(tree.kind(*arg), NodeKind::Spread { .. }) => {
                return Err(invalid(format!(
                    "{} does not accept a spread argument",
                    spec.method
                )));
            }
            [arg] => match (tree.kind(*arg), eval.eval(*arg)) {
                (NodeKind::Object { .. }, _) => RequestInput::Literal(*arg),
                (_, Some(constant)) => match constant.into_value() {
                    Value::Undefined => RequestInput::Empty,
                    value @ Value::Object(_) => RequestInput::Constant(value),
                    other => {
                        return Err(invalid(format!(
                            "{} expects an object argument, got {}",
                            spec.method,
                            other.type_name()
                        )));
                    }
                },
                (_, None) => RequestInput::Runtime(*arg),
            },
            _ => {
                return Err(invalid(format!(
                    "{} takes a single request argument, got {}",
                    spec.method,
                    args.len()
                )));
            }
        };

        let literal_fields = match &input {
            RequestInput::Literal(object) => literal_properties(eval, *object, spec, call)?,
            _ => Vec::new(),
        };

        let mut fields = Vec::with_capacity(spec.required.len() + spec.optional.len());
        for (name, required) in spec.fields() {
            let (presence, source) = match &input {
                RequestInput::Empty => (Presence::Never, None),
                RequestInput::Literal(_) => {
                    match literal_fields.iter().find(|(field, _)| field == name) {
                        None => (Presence::Never, None),
                        Some((_, value)) => {
                            (field_presence(eval, *value, required), Some(*value))
                        }
                    }
                }
                RequestInput::Constant(value) => match value.get(name) {
                    None | Some(Value::Undefined | Value::Null) => (Presence::Never, None),
                    Some(_) => (Presence::Always, None),
                },
                RequestInput::Runtime(_) if required => (Presence::Always, None),
                RequestInput::Runtime(_) => (Presence::IfDefined, None),
            };
            if required && presence == Presence::Never {
                return Err(invalid(format!(
                    "missing required field `{name}` for {}",
                    spec.operation
                )));
            }
            fields.push(FieldPlan {
                name,
                required,
                presence,
                source,
            });
        }

        Ok(RequestPlan {
            spec,
            table_name: self.table_name.clone(),
            input,
            fields,
        })
    }

    pub fn native(&self) -> NativeOperation {
        NativeOperation {
            table_name: self.table_name.clone(),
            spec: self.spec(),
        }
    }
}

/// Nullish constants are never sent. Object, array and template literals
/// always produce a value; anything else is only known at runtime.
fn field_presence(eval: &Evaluator<'_>, value: NodeId, required: bool) -> Presence {
    match eval.eval(value).map(|c| c.into_value()) {
        Some(Value::Undefined | Value::Null) => Presence::Never,
        Some(_) => Presence::Always,
        None if required => Presence::Always,
        None => match eval.tree().kind(value) {
            NodeKind::Object { .. } | NodeKind::Array { .. } | NodeKind::Template { .. } => {
                Presence::Always
            }
            _ => Presence::IfDefined,
        },
    }
}

fn literal_properties(
    eval: &Evaluator<'_>,
    object: NodeId,
    spec: &OperationSpec,
    call: NodeId,
) -> Result<Vec<(String, NodeId)>, CompileError> {
    let tree = eval.tree();
    let NodeKind::Object { properties } = tree.kind(object) else {
        return Ok(Vec::new());
    };
    let mut out: Vec<(String, NodeId)> = Vec::with_capacity(properties.len());
    for prop in properties {
        let NodeKind::PropAssign { name, expr } = tree.kind(*prop) else {
            return Err(CompileError::new(
                ErrorCode::InvalidIntegrationInput,
                format!("{} request objects cannot spread other values", spec.method),
            )
            .at(tree, *prop));
        };
        let field = eval.property_name(name).ok_or_else(|| {
            CompileError::new(
                ErrorCode::InvalidIntegrationInput,
                format!("{} request field names must be constant", spec.method),
            )
            .at(tree, *prop)
        })?;
        if !spec.knows(&field) {
            return Err(CompileError::new(
                ErrorCode::InvalidIntegrationInput,
                format!("unknown field `{field}` for {}", spec.operation),
            )
            .at(tree, call));
        }
        match out.iter_mut().find(|(existing, _)| *existing == field) {
            Some(slot) => slot.1 = *expr,
            None => out.push((field, *expr)),
        }
    }
    Ok(out)
}

/// Transport used by [`NativeOperation`].
pub trait Client {
    fn send(
        &self,
        operation: &OperationSpec,
        request: serde_json::Value,
    ) -> Result<serde_json::Value, IntegrationError>;
}

/// Runtime thunk for one table operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeOperation {
    table_name: String,
    spec: &'static OperationSpec,
}

impl NativeOperation {
    pub fn spec(&self) -> &'static OperationSpec {
        self.spec
    }

    /// Build the request document: `TableName` plus every field present in
    /// `input`. Optional fields that are absent or null are dropped.
    pub fn request(&self, input: &serde_json::Value) -> Result<serde_json::Value, IntegrationError> {
        let empty = Map::new();
        let fields = match input {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => &empty,
            other => {
                return Err(IntegrationError::InvalidInput {
                    operation: self.spec.operation,
                    found: json_type_name(other),
                });
            }
        };

        let mut request = Map::new();
        request.insert(
            "TableName".to_string(),
            serde_json::Value::String(self.table_name.clone()),
        );
        for (name, required) in self.spec.fields() {
            match fields.get(name) {
                None | Some(serde_json::Value::Null) if required => {
                    return Err(IntegrationError::MissingField {
                        operation: self.spec.operation,
                        field: name,
                    });
                }
                None | Some(serde_json::Value::Null) => {}
                Some(value) => {
                    request.insert(name.to_string(), value.clone());
                }
            }
        }
        Ok(serde_json::Value::Object(request))
    }

    pub fn call(
        &self,
        client: &dyn Client,
        input: &serde_json::Value,
    ) -> Result<serde_json::Value, IntegrationError> {
        let request = self.request(input)?;
        tracing::debug!(operation = self.spec.operation, table = %self.table_name, "dispatching table operation");
        client.send(self.spec, request)
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
