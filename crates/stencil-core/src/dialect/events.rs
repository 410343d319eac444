//! Event bus input transforms.
//!
//! A target function `(event, utils) => expr` compiles to either a single
//! event path or a template with `<name>` placeholders bound through an
//! input paths map.

use super::Dialect;
use crate::constant::Evaluator;
use crate::error::{CompileError, ErrorCode};
use crate::externals::Externals;
use crate::integration::TableIntegration;
use crate::names::UniqueNames;
use crate::tree::{BinaryOp, Binding, NodeId, NodeKind, Tree};
use crate::value::Value;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as Json;
use std::collections::HashMap;
use tracing::{debug, trace};

const EVENT_PLACEHOLDER: &str = "<aws.events.event>";

/// The compiled input of an event bus rule target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EventTransform {
    /// Forward the value at this JSONPath of the event.
    Path(String),
    Template {
        #[serde(rename = "InputPathsMap")]
        input_paths_map: IndexMap<String, String>,
        #[serde(rename = "InputTemplate")]
        input_template: String,
    },
}

/// Context values the event bus substitutes without an input path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predefined {
    RuleName,
    RuleArn,
    EventJson,
    IngestionTime,
}

impl Predefined {
    fn from_context(name: &str) -> Option<Self> {
        match name {
            "ruleName" => Some(Predefined::RuleName),
            "ruleArn" => Some(Predefined::RuleArn),
            "eventJson" => Some(Predefined::EventJson),
            "ingestionTime" => Some(Predefined::IngestionTime),
            _ => None,
        }
    }

    pub fn placeholder(self) -> &'static str {
        match self {
            Predefined::RuleName => "<aws.events.rule-name>",
            Predefined::RuleArn => "<aws.events.rule-arn>",
            Predefined::EventJson => "<aws.events.event.json>",
            Predefined::IngestionTime => "<aws.events.ingestion-time>",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventFragment {
    Literal(Value),
    /// Segments below the event; empty for the whole event.
    Path(Vec<String>),
    Predefined(Predefined),
    Object(IndexMap<String, EventFragment>),
    Array(Vec<EventFragment>),
    Text(Vec<TextPiece>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TextPiece {
    Literal(String),
    Field(EventFragment),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransformState {
    #[default]
    Unvisited,
    PathCandidate,
    StructuralDocument,
    Rejected,
}

/// `utils` and `utils.context` before they reach a predefined accessor.
enum Operand {
    Fragment(EventFragment),
    Utils,
    Context,
}

pub struct EventsEmitter<'a> {
    eval: Evaluator<'a>,
    state: TransformState,
}

impl<'a> EventsEmitter<'a> {
    pub fn new(tree: &'a Tree, externals: &'a Externals) -> Self {
        Self {
            eval: Evaluator::new(tree, externals),
            state: TransformState::Unvisited,
        }
    }

    pub fn state(&self) -> TransformState {
        self.state
    }

    pub fn compile(&mut self, function: NodeId) -> Result<EventTransform, CompileError> {
        debug!(function = %function, "compiling event transform");
        match self.transform(function) {
            Ok(transform) => Ok(transform),
            Err(err) => {
                self.transition(TransformState::Rejected);
                Err(err)
            }
        }
    }

    fn transition(&mut self, to: TransformState) {
        trace!(from = ?self.state, to = ?to, "event transform state");
        self.state = to;
    }

    fn transform(&mut self, function: NodeId) -> Result<EventTransform, CompileError> {
        let tree = self.eval.tree();
        let func = tree.function(function).ok_or_else(|| {
            CompileError::new(ErrorCode::InvalidFunction, "expected a function to compile")
                .at(tree, function)
        })?;

        let mut returned = None;
        for stmt in func.body {
            match tree.kind(*stmt) {
                // Declarations are dereferenced where they are used.
                NodeKind::VariableDecl { .. } => {}
                NodeKind::Return { expr } => {
                    returned = Some(*expr);
                    break;
                }
                _ => return Err(CompileError::unsupported(tree, *stmt)),
            }
        }
        let Some(expr) = returned else {
            return Err(CompileError::new(
                ErrorCode::MissingReturn,
                "No return statement found in event bridge target function.",
            )
            .at(tree, function));
        };

        let fragment = match expr {
            Some(expr) => self.value(expr)?,
            None => EventFragment::Literal(Value::Undefined),
        };

        match fragment {
            EventFragment::Path(segments) if !segments.is_empty() => {
                self.transition(TransformState::PathCandidate);
                Ok(EventTransform::Path(json_path(&segments)))
            }
            fragment => {
                self.transition(TransformState::StructuralDocument);
                let mut placeholders = Placeholders::default();
                let input_template = match &fragment {
                    EventFragment::Predefined(p) => format!("\"{}\"", p.placeholder()),
                    other => placeholders.json(other, false),
                };
                Ok(EventTransform::Template {
                    input_paths_map: placeholders.map,
                    input_template,
                })
            }
        }
    }

    /// Lower `node`, rejecting partially applied `utils` accessors.
    fn value(&mut self, node: NodeId) -> Result<EventFragment, CompileError> {
        match self.expression(node)? {
            Operand::Fragment(fragment) => Ok(fragment),
            Operand::Utils | Operand::Context => {
                Err(CompileError::unsupported(self.eval.tree(), node))
            }
        }
    }

    fn expression(&mut self, node: NodeId) -> Result<Operand, CompileError> {
        let tree = self.eval.tree();
        if let Some(constant) = self.eval.eval(node) {
            return self.literal(node, constant.into_value()).map(Operand::Fragment);
        }

        let fragment = match tree.kind(node) {
            NodeKind::Identifier { name, binding } => match binding {
                Some(Binding::Parameter(param)) => match tree.parameter_index(*param) {
                    Some(0) => EventFragment::Path(Vec::new()),
                    Some(1) => return Ok(Operand::Utils),
                    _ => return Err(unknown(tree, node, name)),
                },
                Some(Binding::Variable(decl)) => match tree.kind(*decl) {
                    NodeKind::VariableDecl {
                        init: Some(init), ..
                    } => return self.expression(*init),
                    _ => EventFragment::Literal(Value::Undefined),
                },
                None => return Err(unknown(tree, node, name)),
            },
            NodeKind::PropAccess { expr, name } => {
                let base = self.expression(*expr)?;
                return self.access(node, base, name);
            }
            NodeKind::ElementAccess { expr, element } => {
                let Some(key) = self
                    .eval
                    .eval(*element)
                    .and_then(|c| c.value().property_key())
                else {
                    return Err(CompileError::unsupported(tree, node));
                };
                let base = self.expression(*expr)?;
                return self.access(node, base, &key);
            }
            NodeKind::Call { callee, .. } => {
                let opaque_callee = self
                    .eval
                    .eval(*callee)
                    .is_some_and(|c| matches!(c.value(), Value::Opaque(_)));
                if opaque_callee || TableIntegration::is_integration_call(&self.eval, node) {
                    return Err(CompileError::new(
                        ErrorCode::IntegrationNotSupported,
                        "EventBus Input Transformers do not support Integrations",
                    )
                    .at(tree, node));
                }
                return Err(CompileError::unsupported(tree, node));
            }
            NodeKind::Array { items } => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if let NodeKind::Spread { expr } = tree.kind(*item) {
                        match self.eval.eval(*expr).map(|c| c.into_value()) {
                            Some(Value::Array(values)) => {
                                let value = self.literal(*expr, Value::Array(values))?;
                                if let EventFragment::Literal(Value::Array(values)) = value {
                                    out.extend(
                                        values
                                            .into_iter()
                                            .filter(|v| !matches!(v, Value::Undefined))
                                            .map(EventFragment::Literal),
                                    );
                                }
                            }
                            Some(other) => return Err(bad_spread(tree, *item, &other)),
                            None => {
                                return Err(CompileError::new(
                                    ErrorCode::NonConstantSpread,
                                    "Event Bridge input transforms do not support array spreading non-constant arrays.",
                                )
                                .at(tree, *item));
                            }
                        }
                        continue;
                    }
                    match self.value(*item)? {
                        EventFragment::Literal(Value::Undefined) => {}
                        fragment => out.push(fragment),
                    }
                }
                EventFragment::Array(out)
            }
            NodeKind::Object { properties } => {
                let mut out = IndexMap::new();
                for prop in properties {
                    match tree.kind(*prop) {
                        NodeKind::PropAssign { name, expr } => {
                            let key = self
                                .eval
                                .property_name(name)
                                .ok_or_else(|| CompileError::unsupported(tree, *prop))?;
                            match self.value(*expr)? {
                                EventFragment::Literal(Value::Undefined) => {
                                    out.shift_remove(&key);
                                }
                                fragment => {
                                    out.insert(key, fragment);
                                }
                            }
                        }
                        NodeKind::SpreadAssign { expr } => {
                            match self.eval.eval(*expr).map(|c| c.into_value()) {
                                Some(Value::Object(map)) => {
                                    let value = self.literal(*expr, Value::Object(map))?;
                                    if let EventFragment::Literal(Value::Object(map)) = value {
                                        for (key, value) in map {
                                            if matches!(value, Value::Undefined) {
                                                out.shift_remove(&key);
                                            } else {
                                                out.insert(key, EventFragment::Literal(value));
                                            }
                                        }
                                    }
                                }
                                Some(Value::Undefined | Value::Null) => {}
                                Some(other) => return Err(bad_spread(tree, *prop, &other)),
                                None => {
                                    return Err(CompileError::new(
                                        ErrorCode::NonConstantSpread,
                                        "Event Bridge input transforms do not support object spreading non-constant objects.",
                                    )
                                    .at(tree, *prop));
                                }
                            }
                        }
                        _ => return Err(CompileError::unsupported(tree, *prop)),
                    }
                }
                EventFragment::Object(out)
            }
            NodeKind::Template { head, spans } => {
                let mut pieces = vec![TextPiece::Literal(head.clone())];
                for span in spans {
                    pieces.push(TextPiece::Field(self.value(span.expr)?));
                    pieces.push(TextPiece::Literal(span.literal.clone()));
                }
                EventFragment::Text(pieces)
            }
            NodeKind::Binary {
                op: BinaryOp::Add,
                left,
                right,
            } => {
                if !self.eval.is_string_typed(*left) && !self.eval.is_string_typed(*right) {
                    return Err(CompileError::new(
                        ErrorCode::AmbiguousAddition,
                        "Addition operator is only supported to concatenate at least one string to another value.",
                    )
                    .at(tree, node));
                }
                let left = self.value(*left)?;
                let right = self.value(*right)?;
                EventFragment::Text(vec![TextPiece::Field(left), TextPiece::Field(right)])
            }
            NodeKind::Reference { name } => return Err(unknown(tree, node, name)),
            _ => return Err(CompileError::unsupported(tree, node)),
        };
        Ok(Operand::Fragment(fragment))
    }

    fn access(&mut self, node: NodeId, base: Operand, key: &str) -> Result<Operand, CompileError> {
        let tree = self.eval.tree();
        let fragment = match base {
            Operand::Utils if key == "context" => return Ok(Operand::Context),
            Operand::Context => match Predefined::from_context(key) {
                Some(predefined) => EventFragment::Predefined(predefined),
                None => return Err(CompileError::unsupported(tree, node)),
            },
            Operand::Utils => return Err(CompileError::unsupported(tree, node)),
            Operand::Fragment(EventFragment::Path(mut segments)) => {
                segments.push(key.to_string());
                if segments.len() > 1 && segments[0] != "detail" {
                    return Err(CompileError::new(
                        ErrorCode::InvalidEventReference,
                        format!(
                            "Event references with depth greater than one must be on the detail property, got {}",
                            segments.join(",")
                        ),
                    )
                    .at(tree, node));
                }
                EventFragment::Path(segments)
            }
            Operand::Fragment(EventFragment::Literal(Value::Object(map))) => {
                match map.get(key) {
                    Some(value) => EventFragment::Literal(value.clone()),
                    None => return Err(missing_key(tree, node, key, map.keys())),
                }
            }
            Operand::Fragment(EventFragment::Object(mut map)) => match map.shift_remove(key) {
                Some(fragment) => fragment,
                None => return Err(missing_key(tree, node, key, map.keys())),
            },
            Operand::Fragment(EventFragment::Array(mut items)) => {
                match key.parse::<usize>().ok().filter(|i| *i < items.len()) {
                    Some(index) => items.swap_remove(index),
                    None => {
                        return Err(CompileError::new(
                            ErrorCode::MissingProperty,
                            format!("Cannot find property {key} in Array of length {}", items.len()),
                        )
                        .at(tree, node));
                    }
                }
            }
            Operand::Fragment(_) => return Err(CompileError::unsupported(tree, node)),
        };
        Ok(Operand::Fragment(fragment))
    }

    fn literal(&self, node: NodeId, value: Value) -> Result<EventFragment, CompileError> {
        if value.contains_opaque() {
            return Err(CompileError::new(
                ErrorCode::NonConstantOutput,
                "Event Bridge input transforms can only output constant values.",
            )
            .at(self.eval.tree(), node));
        }
        Ok(EventFragment::Literal(value))
    }
}

impl Dialect for EventsEmitter<'_> {
    type Fragment = EventFragment;

    fn emit(&mut self, node: NodeId) -> Result<EventFragment, CompileError> {
        self.value(node)
    }
}

/// Placeholder names handed out while rendering one template.
#[derive(Default)]
struct Placeholders {
    names: UniqueNames,
    by_path: HashMap<String, String>,
    map: IndexMap<String, String>,
}

impl Placeholders {
    fn field(&mut self, segments: &[String]) -> String {
        if segments.is_empty() {
            return EVENT_PLACEHOLDER.to_string();
        }
        let path = json_path(segments);
        if let Some(name) = self.by_path.get(&path) {
            return format!("<{name}>");
        }
        let base: String = segments
            .last()
            .map(|s| {
                s.chars()
                    .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
                    .collect()
            })
            .unwrap_or_default();
        let name = self
            .names
            .get_unique(if base.is_empty() { "field" } else { base.as_str() });
        self.by_path.insert(path.clone(), name.clone());
        self.map.insert(name.clone(), path);
        format!("<{name}>")
    }

    /// JSON rendering. `quoted` wraps placeholders in string quotes, for
    /// documents that end up inside a string.
    fn json(&mut self, fragment: &EventFragment, quoted: bool) -> String {
        let mut out = String::new();
        self.write_json(fragment, quoted, &mut out);
        out
    }

    fn write_json(&mut self, fragment: &EventFragment, quoted: bool, out: &mut String) {
        match fragment {
            EventFragment::Literal(value) => out.push_str(&value.to_json().to_string()),
            EventFragment::Path(segments) => {
                let placeholder = self.field(segments);
                push_placeholder(out, &placeholder, quoted);
            }
            EventFragment::Predefined(p) => push_placeholder(out, p.placeholder(), quoted),
            EventFragment::Object(map) => {
                out.push('{');
                let mut first = true;
                for (key, value) in map {
                    if matches!(value, EventFragment::Literal(Value::Undefined)) {
                        continue;
                    }
                    if !first {
                        out.push(',');
                    }
                    first = false;
                    out.push_str(&Json::String(key.clone()).to_string());
                    out.push(':');
                    self.write_json(value, quoted, out);
                }
                out.push('}');
            }
            EventFragment::Array(items) => {
                out.push('[');
                let mut first = true;
                for item in items {
                    if matches!(item, EventFragment::Literal(Value::Undefined)) {
                        continue;
                    }
                    if !first {
                        out.push(',');
                    }
                    first = false;
                    self.write_json(item, quoted, out);
                }
                out.push(']');
            }
            EventFragment::Text(_) => {
                let mut text = String::new();
                self.write_text(fragment, &mut text);
                out.push_str(&Json::String(text).to_string());
            }
        }
    }

    /// Raw string content, before JSON escaping.
    fn write_text(&mut self, fragment: &EventFragment, out: &mut String) {
        match fragment {
            EventFragment::Literal(value) => out.push_str(&value.to_display_string()),
            EventFragment::Path(segments) => {
                let placeholder = self.field(segments);
                out.push_str(&placeholder);
            }
            EventFragment::Predefined(p) => out.push_str(p.placeholder()),
            EventFragment::Object(_) | EventFragment::Array(_) => {
                self.write_json(fragment, true, out);
            }
            EventFragment::Text(pieces) => {
                for piece in pieces {
                    match piece {
                        TextPiece::Literal(s) => out.push_str(s),
                        TextPiece::Field(field) => self.write_text(field, out),
                    }
                }
            }
        }
    }
}

fn push_placeholder(out: &mut String, placeholder: &str, quoted: bool) {
    if quoted {
        out.push('"');
        out.push_str(placeholder);
        out.push('"');
    } else {
        out.push_str(placeholder);
    }
}

fn json_path(segments: &[String]) -> String {
    format!("$.{}", segments.join("."))
}

fn missing_key<'k>(
    tree: &Tree,
    node: NodeId,
    key: &str,
    keys: impl Iterator<Item = &'k String>,
) -> CompileError {
    let keys: Vec<&str> = keys.map(String::as_str).collect();
    CompileError::new(
        ErrorCode::MissingProperty,
        format!(
            "Cannot find property {key} in Object with constant keys: {}",
            keys.join(",")
        ),
    )
    .at(tree, node)
}

fn bad_spread(tree: &Tree, node: NodeId, value: &Value) -> CompileError {
    CompileError::new(
        ErrorCode::UnsupportedSpread,
        format!("Cannot spread a {} value", value.type_name()),
    )
    .at(tree, node)
}

fn unknown(tree: &Tree, node: NodeId, name: &str) -> CompileError {
    CompileError::new(ErrorCode::UnknownReference, format!("Cannot resolve `{name}`")).at(tree, node)
}
