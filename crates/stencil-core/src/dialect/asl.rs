//! State machine definitions.
//!
//! A function `(input) => { ... }` becomes a chain of states, one per
//! statement, linked with `Next` and terminated with `End`. The function's
//! first parameter is the state input `$`; `const x = ...` stores its result
//! at `$.x`. Values with no JSONPath form are hoisted into their own state
//! writing `$.fnl_tmp_<n>`.

use super::{Dialect, is_identifier};
use crate::constant::Evaluator;
use crate::error::{CompileError, ErrorCode};
use crate::externals::Externals;
use crate::integration::{Presence, RequestInput, TableIntegration};
use crate::names::{DeterministicNames, UniqueNames};
use crate::options::{AslOptions, CompileOptions};
use crate::tree::{BinaryOp, Binding, NodeId, NodeKind, Tree, UnaryOp, VariableKind};
use crate::value::Value;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value as Json};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StateMachine {
    pub start_at: String,
    pub states: IndexMap<String, State>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "Type")]
pub enum State {
    Pass(PassState),
    Task(TaskState),
}

impl State {
    fn link(&mut self, next: Option<String>) {
        let (slot_next, slot_end) = match self {
            State::Pass(s) => (&mut s.next, &mut s.end),
            State::Task(s) => (&mut s.next, &mut s.end),
        };
        *slot_end = next.is_none().then_some(true);
        *slot_next = next;
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PassState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Json>,
    /// `Some(Json::Null)` discards the result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskState {
    pub resource: String,
    pub parameters: Json,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<bool>,
}

/// Lowered form of one expression.
#[derive(Debug, Clone, PartialEq)]
pub enum AslValue {
    /// Inline JSON.
    Literal(Json),
    /// JSONPath into the state input.
    Path(String),
    /// Intrinsic function call, valid only in `.$` fields.
    Intrinsic(String),
    /// `Parameters`-style document with `.$` keys.
    Document(Map<String, Json>),
}

fn space_suffix(base: &str, n: u32) -> String {
    format!("{base} {n}")
}

pub struct AslEmitter<'a> {
    eval: Evaluator<'a>,
    options: &'a AslOptions,
    temps: DeterministicNames,
    state_names: UniqueNames,
    variables: UniqueNames,
    bound: HashMap<NodeId, String>,
    states: IndexMap<String, State>,
}

impl<'a> AslEmitter<'a> {
    pub fn new(tree: &'a Tree, externals: &'a Externals, options: &'a CompileOptions) -> Self {
        Self {
            eval: Evaluator::new(tree, externals),
            options: &options.asl,
            temps: DeterministicNames::new(options.temp_prefix.as_str()),
            state_names: UniqueNames::new(space_suffix),
            variables: UniqueNames::default(),
            bound: HashMap::new(),
            states: IndexMap::new(),
        }
    }

    pub fn compile(mut self, function: NodeId) -> Result<StateMachine, CompileError> {
        let tree = self.eval.tree();
        let func = tree.function(function).ok_or_else(|| {
            CompileError::new(ErrorCode::InvalidFunction, "expected a function to compile")
                .at(tree, function)
        })?;
        if func.params.len() > 1 {
            return Err(single_parameter(tree, func.params[1]));
        }
        debug!(function = %function, statements = func.body.len(), "compiling state machine");

        for stmt in func.body {
            match tree.kind(*stmt) {
                NodeKind::VariableDecl { kind, name, init } => {
                    if self.temps.owns(name) {
                        self.variables.reserve(name);
                    }
                    let variable = self.variables.get_unique(name);
                    let path = format!("$.{variable}");
                    let state = self
                        .state_names
                        .get_unique(&format!("{} {name}", keyword(*kind)));
                    let bound = match init {
                        Some(init) => self.assign(state, *init, Some(Json::String(path.clone())))?,
                        None => {
                            self.push(
                                state,
                                State::Pass(PassState {
                                    result: Some(Json::Null),
                                    result_path: Some(Json::String(path.clone())),
                                    ..PassState::default()
                                }),
                            );
                            path.clone()
                        }
                    };
                    self.bound.insert(*stmt, bound);
                }
                NodeKind::ExprStmt { expr } => {
                    let base = match TableIntegration::resolve(&self.eval, *expr) {
                        Some(integration) => integration.spec().method,
                        None => "Pass",
                    };
                    let state = self.state_names.get_unique(base);
                    self.assign(state, *expr, Some(Json::Null))?;
                }
                NodeKind::Return { expr } => {
                    let state = self.state_names.get_unique("return");
                    match expr {
                        Some(expr) => {
                            self.assign(state, *expr, None)?;
                        }
                        None => self.push(
                            state,
                            State::Pass(PassState {
                                result: Some(Json::Null),
                                ..PassState::default()
                            }),
                        ),
                    }
                    break;
                }
                _ => return Err(CompileError::unsupported(tree, *stmt)),
            }
        }

        if self.states.is_empty() {
            let state = self.state_names.get_unique("return");
            self.push(
                state,
                State::Pass(PassState {
                    result: Some(Json::Null),
                    ..PassState::default()
                }),
            );
        }

        let names: Vec<String> = self.states.keys().cloned().collect();
        for (index, state) in self.states.values_mut().enumerate() {
            state.link(names.get(index + 1).cloned());
        }
        debug!(states = names.len(), "state machine compiled");
        Ok(StateMachine {
            start_at: names.first().cloned().unwrap_or_default(),
            states: self.states,
        })
    }

    fn push(&mut self, name: String, state: State) {
        self.states.insert(name, state);
    }

    /// Emit the state computing `expr`, stored at `result_path`. Returns the
    /// JSONPath a later reference should read.
    fn assign(
        &mut self,
        name: String,
        expr: NodeId,
        result_path: Option<Json>,
    ) -> Result<String, CompileError> {
        let target = match &result_path {
            Some(Json::String(path)) => path.clone(),
            _ => "$".to_string(),
        };

        if let Some(integration) = TableIntegration::resolve(&self.eval, expr) {
            let task = self.task(expr, &integration, result_path)?;
            self.push(name, State::Task(task));
            return Ok(target);
        }

        let value = self.expression(expr)?;
        let intrinsic = matches!(value, AslValue::Intrinsic(_));
        let state = value_state(value, result_path);
        self.push(name, State::Pass(state));
        Ok(if intrinsic {
            format!("{target}.value")
        } else {
            target
        })
    }

    fn task(
        &mut self,
        call: NodeId,
        integration: &TableIntegration,
        result_path: Option<Json>,
    ) -> Result<TaskState, CompileError> {
        let tree = self.eval.tree();
        let plan = integration.plan(&self.eval, call)?;
        let mut parameters = Map::new();
        parameters.insert("TableName".to_string(), Json::String(plan.table_name.clone()));

        match &plan.input {
            RequestInput::Empty => {}
            RequestInput::Literal(_) => {
                for field in plan.sent() {
                    let Some(source) = field.source else {
                        continue;
                    };
                    if field.presence == Presence::IfDefined {
                        return Err(CompileError::new(
                            ErrorCode::InvalidIntegrationInput,
                            format!(
                                "state machine tasks cannot forward optional field `{}` from a runtime value that may be null",
                                field.name
                            ),
                        )
                        .at(tree, source));
                    }
                    let value = self.expression(source)?;
                    insert_field(&mut parameters, field.name, value);
                }
            }
            RequestInput::Constant(document) => {
                for field in plan.sent() {
                    if let Some(value) = document.get(field.name) {
                        parameters.insert(field.name.to_string(), value.to_json());
                    }
                }
            }
            RequestInput::Runtime(arg) => {
                return Err(CompileError::new(
                    ErrorCode::InvalidIntegrationInput,
                    format!(
                        "state machine tasks need the {} request written as an object literal",
                        plan.spec.method
                    ),
                )
                .at(tree, *arg));
            }
        }

        Ok(TaskState {
            resource: format!("{}{}", self.options.resource_prefix, plan.spec.method),
            parameters: Json::Object(parameters),
            result_path,
            next: None,
            end: None,
        })
    }

    fn expression(&mut self, node: NodeId) -> Result<AslValue, CompileError> {
        let tree = self.eval.tree();
        if let Some(constant) = self.eval.eval(node) {
            let value = constant.value();
            if value.contains_opaque() {
                return Err(CompileError::new(
                    ErrorCode::UnsupportedExpression,
                    format!("Cannot render a {} in a state machine", value.type_name()),
                )
                .at(tree, node));
            }
            return Ok(AslValue::Literal(value.to_json()));
        }

        match tree.kind(node) {
            NodeKind::Identifier { name, binding } => match binding {
                Some(Binding::Parameter(param)) => match tree.parameter_index(*param) {
                    Some(0) => Ok(AslValue::Path("$".to_string())),
                    _ => Err(single_parameter(tree, *param)),
                },
                Some(Binding::Variable(decl)) => self
                    .bound
                    .get(decl)
                    .map(|path| AslValue::Path(path.clone()))
                    .ok_or_else(|| unknown(tree, node, name)),
                None => Err(unknown(tree, node, name)),
            },
            NodeKind::PropAccess { expr, name } => {
                let base = self.path(*expr, name)?;
                Ok(AslValue::Path(join(&base, name)))
            }
            NodeKind::ElementAccess { expr, element } => {
                let key = self.eval.eval(*element).map(|c| c.into_value());
                let label = key
                    .as_ref()
                    .and_then(Value::property_key)
                    .unwrap_or_else(|| "[index]".to_string());
                let base = self.path(*expr, &label)?;
                match key {
                    Some(Value::Number(n)) if n >= 0.0 && n.fract() == 0.0 => {
                        Ok(AslValue::Path(format!("{base}[{n}]")))
                    }
                    Some(Value::String(s)) => Ok(AslValue::Path(join(&base, &s))),
                    Some(_) => Err(CompileError::unsupported(tree, node)),
                    None => {
                        let index = self.argument(*element)?;
                        Ok(AslValue::Intrinsic(format!(
                            "States.ArrayGetItem({base}, {index})"
                        )))
                    }
                }
            }
            NodeKind::Call { .. } => match TableIntegration::resolve(&self.eval, node) {
                Some(integration) => {
                    let temp = self.temps.generate_or_get(node);
                    let path = format!("$.{temp}");
                    let task = self.task(node, &integration, Some(Json::String(path.clone())))?;
                    let name = self.state_names.get_unique(&temp);
                    self.push(name, State::Task(task));
                    Ok(AslValue::Path(path))
                }
                None => Err(CompileError::unsupported(tree, node)),
            },
            NodeKind::Array { items } => {
                let mut args = Vec::with_capacity(items.len());
                for item in items {
                    match tree.kind(*item) {
                        NodeKind::Spread { expr } => match self.eval.eval(*expr).map(|c| c.into_value()) {
                            Some(Value::Array(values)) => {
                                for value in values.iter().filter(|v| !matches!(v, Value::Undefined)) {
                                    args.push(intrinsic_literal(&value.to_json()));
                                }
                            }
                            Some(other) => {
                                return Err(CompileError::new(
                                    ErrorCode::UnsupportedSpread,
                                    format!("Cannot spread a {} value", other.type_name()),
                                )
                                .at(tree, *item));
                            }
                            None => {
                                return Err(CompileError::new(
                                    ErrorCode::NonConstantSpread,
                                    "State machine arrays cannot spread runtime values",
                                )
                                .at(tree, *item));
                            }
                        },
                        _ => {
                            if matches!(
                                self.eval.eval(*item).map(|c| c.into_value()),
                                Some(Value::Undefined)
                            ) {
                                continue;
                            }
                            args.push(self.argument(*item)?);
                        }
                    }
                }
                Ok(AslValue::Intrinsic(format!("States.Array({})", args.join(", "))))
            }
            NodeKind::Object { properties } => self.document(properties).map(AslValue::Document),
            NodeKind::Template { head, spans } => {
                let mut format = escape_format(head);
                let mut args = Vec::new();
                for span in spans {
                    self.format_part(span.expr, &mut format, &mut args)?;
                    format.push_str(&escape_format(&span.literal));
                }
                Ok(intrinsic_format(&format, &args))
            }
            NodeKind::Binary { op, .. } => {
                if *op == BinaryOp::Add && self.eval.is_string_typed(node) {
                    let mut format = String::new();
                    let mut args = Vec::new();
                    for operand in self.eval.concat_operands(node) {
                        self.format_part(operand, &mut format, &mut args)?;
                    }
                    Ok(intrinsic_format(&format, &args))
                } else if op.is_arithmetic() || op.is_relational() {
                    Err(runtime_arithmetic(tree, node, op.token()))
                } else {
                    Err(CompileError::unsupported(tree, node))
                }
            }
            NodeKind::Unary { op, .. } => match op {
                UnaryOp::Minus | UnaryOp::Plus => Err(runtime_arithmetic(tree, node, op.token())),
                _ => Err(CompileError::unsupported(tree, node)),
            },
            NodeKind::Reference { name } => Err(unknown(tree, node, name)),
            _ => Err(CompileError::unsupported(tree, node)),
        }
    }

    /// JSONPath for `node`, hoisting documents and intrinsics into a state.
    fn path(&mut self, node: NodeId, property: &str) -> Result<String, CompileError> {
        match self.expression(node)? {
            AslValue::Path(path) => Ok(path),
            AslValue::Literal(_) => Err(CompileError::new(
                ErrorCode::MissingProperty,
                format!("Cannot find property {property} in a constant value"),
            )
            .at(self.eval.tree(), node)),
            value => Ok(self.hoist(node, value)),
        }
    }

    /// Operand of an intrinsic function.
    fn argument(&mut self, node: NodeId) -> Result<String, CompileError> {
        Ok(match self.expression(node)? {
            AslValue::Literal(value) => intrinsic_literal(&value),
            AslValue::Path(path) | AslValue::Intrinsic(path) => path,
            value @ AslValue::Document(_) => self.hoist(node, value),
        })
    }

    fn format_part(
        &mut self,
        node: NodeId,
        format: &mut String,
        args: &mut Vec<String>,
    ) -> Result<(), CompileError> {
        match self.eval.eval(node) {
            Some(constant) if !constant.value().contains_opaque() => {
                format.push_str(&escape_format(&constant.value().to_display_string()));
            }
            _ => {
                format.push_str("{}");
                args.push(self.argument(node)?);
            }
        }
        Ok(())
    }

    fn hoist(&mut self, node: NodeId, value: AslValue) -> String {
        let temp = self.temps.generate_or_get(node);
        let path = format!("$.{temp}");
        let intrinsic = matches!(value, AslValue::Intrinsic(_));
        let name = self.state_names.get_unique(&temp);
        let state = value_state(value, Some(Json::String(path.clone())));
        self.push(name, State::Pass(state));
        if intrinsic {
            format!("{path}.value")
        } else {
            path
        }
    }

    fn document(&mut self, properties: &[NodeId]) -> Result<Map<String, Json>, CompileError> {
        let tree = self.eval.tree();
        let mut out = Map::new();
        for prop in properties {
            match tree.kind(*prop) {
                NodeKind::PropAssign { name, expr } => {
                    let key = self
                        .eval
                        .property_name(name)
                        .ok_or_else(|| CompileError::unsupported(tree, *prop))?;
                    out.remove(&key);
                    out.remove(&format!("{key}.$"));
                    if matches!(self.eval.eval(*expr).map(|c| c.into_value()), Some(Value::Undefined)) {
                        continue;
                    }
                    let value = self.expression(*expr)?;
                    insert_field(&mut out, &key, value);
                }
                NodeKind::SpreadAssign { expr } => match self.eval.eval(*expr).map(|c| c.into_value()) {
                    Some(Value::Object(map)) => {
                        for (key, value) in map {
                            out.remove(&format!("{key}.$"));
                            if matches!(value, Value::Undefined) {
                                out.remove(&key);
                            } else {
                                out.insert(key, value.to_json());
                            }
                        }
                    }
                    Some(Value::Undefined | Value::Null) => {}
                    Some(other) => {
                        return Err(CompileError::new(
                            ErrorCode::UnsupportedSpread,
                            format!("Cannot spread a {} value", other.type_name()),
                        )
                        .at(tree, *prop));
                    }
                    None => {
                        return Err(CompileError::new(
                            ErrorCode::NonConstantSpread,
                            "State machine documents cannot spread runtime values",
                        )
                        .at(tree, *prop));
                    }
                },
                _ => return Err(CompileError::unsupported(tree, *prop)),
            }
        }
        Ok(out)
    }
}

impl Dialect for AslEmitter<'_> {
    type Fragment = AslValue;

    fn emit(&mut self, node: NodeId) -> Result<AslValue, CompileError> {
        self.expression(node)
    }
}

fn value_state(value: AslValue, result_path: Option<Json>) -> PassState {
    let mut state = PassState {
        result_path,
        ..PassState::default()
    };
    match value {
        AslValue::Literal(json) => state.result = Some(json),
        AslValue::Path(path) => state.input_path = Some(path),
        AslValue::Document(map) => state.parameters = Some(Json::Object(map)),
        AslValue::Intrinsic(call) => {
            let mut params = Map::new();
            params.insert("value.$".to_string(), Json::String(call));
            state.parameters = Some(Json::Object(params));
            if state.result_path.is_none() {
                state.output_path = Some("$.value".to_string());
            }
        }
    }
    state
}

fn insert_field(out: &mut Map<String, Json>, key: &str, value: AslValue) {
    match value {
        AslValue::Literal(json) => {
            out.insert(key.to_string(), json);
        }
        AslValue::Path(path) | AslValue::Intrinsic(path) => {
            out.insert(format!("{key}.$"), Json::String(path));
        }
        AslValue::Document(map) => {
            out.insert(key.to_string(), Json::Object(map));
        }
    }
}

fn join(base: &str, name: &str) -> String {
    if is_identifier(name) {
        format!("{base}.{name}")
    } else {
        format!("{base}['{}']", name.replace('\'', "\\'"))
    }
}

fn keyword(kind: VariableKind) -> &'static str {
    match kind {
        VariableKind::Const => "const",
        VariableKind::Let => "let",
        VariableKind::Var => "var",
    }
}

/// Literal text of a `States.Format` template.
fn escape_format(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\'' | '{' | '}' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn intrinsic_format(format: &str, args: &[String]) -> AslValue {
    let mut call = format!("States.Format('{format}'");
    for arg in args {
        call.push_str(", ");
        call.push_str(arg);
    }
    call.push(')');
    AslValue::Intrinsic(call)
}

fn intrinsic_literal(value: &Json) -> String {
    match value {
        Json::String(s) => format!("'{}'", escape_format(s)),
        Json::Array(_) | Json::Object(_) => {
            format!("States.StringToJson('{}')", escape_format(&value.to_string()))
        }
        other => other.to_string(),
    }
}

fn single_parameter(tree: &Tree, param: NodeId) -> CompileError {
    CompileError::new(
        ErrorCode::InvalidFunction,
        "state machine functions take a single input parameter",
    )
    .at(tree, param)
}

fn unknown(tree: &Tree, node: NodeId, name: &str) -> CompileError {
    CompileError::new(ErrorCode::UnknownReference, format!("Cannot resolve `{name}`")).at(tree, node)
}

fn runtime_arithmetic(tree: &Tree, node: NodeId, token: &str) -> CompileError {
    CompileError::new(
        ErrorCode::RuntimeArithmetic,
        format!("State machines cannot evaluate `{token}` over runtime values"),
    )
    .at(tree, node)
}
