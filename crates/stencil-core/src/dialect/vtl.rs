//! Velocity-style request mapping templates.
//!
//! A function `(context) => { ... }` becomes a list of template lines:
//! declarations turn into `#set`, expression statements into `$util.qr`, and
//! the returned value into a final `$util.toJson`. Intermediate documents are
//! built in deterministic temporaries (`$fnl_tmp_<n>`).

use super::Dialect;
use crate::constant::Evaluator;
use crate::error::{CompileError, ErrorCode};
use crate::externals::Externals;
use crate::integration::{Presence, RequestInput, TableIntegration};
use crate::names::{DeterministicNames, UniqueNames};
use crate::options::{CompileOptions, VtlOptions};
use crate::tree::{BinaryOp, Binding, NodeId, NodeKind, PropName, Tree, UnaryOp};
use crate::value::{Value, format_number};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Rendered template, one directive or expression per line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MappingTemplate {
    lines: Vec<String>,
}

impl MappingTemplate {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl fmt::Display for MappingTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines.join("\n"))
    }
}

impl Serialize for MappingTemplate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn double_underscore(base: &str, n: u32) -> String {
    format!("{base}__{n}")
}

pub struct VtlEmitter<'a> {
    eval: Evaluator<'a>,
    options: &'a VtlOptions,
    temps: DeterministicNames,
    variables: UniqueNames,
    bound: HashMap<NodeId, String>,
    lines: Vec<String>,
}

impl<'a> VtlEmitter<'a> {
    pub fn new(tree: &'a Tree, externals: &'a Externals, options: &'a CompileOptions) -> Self {
        let mut variables: UniqueNames = UniqueNames::new(double_underscore);
        variables.get_unique(&options.vtl.input_variable);
        Self {
            eval: Evaluator::new(tree, externals),
            options: &options.vtl,
            temps: DeterministicNames::new(options.temp_prefix.as_str()),
            variables,
            bound: HashMap::new(),
            lines: Vec::new(),
        }
    }

    pub fn compile(mut self, function: NodeId) -> Result<MappingTemplate, CompileError> {
        let tree = self.eval.tree();
        let func = tree.function(function).ok_or_else(|| {
            CompileError::new(ErrorCode::InvalidFunction, "expected a function to compile")
                .at(tree, function)
        })?;
        if func.params.len() > 1 {
            return Err(single_parameter(tree, func.params[1]));
        }
        debug!(function = %function, statements = func.body.len(), "compiling mapping template");

        for stmt in func.body {
            match tree.kind(*stmt) {
                NodeKind::VariableDecl { name, init, .. } => {
                    let value = match init {
                        Some(init) => self.expression(*init)?,
                        None => "$null".to_string(),
                    };
                    if self.temps.owns(name) {
                        self.variables.reserve(name);
                    }
                    let variable = self.variables.get_unique(name);
                    self.lines.push(format!("#set(${variable} = {value})"));
                    self.bound.insert(*stmt, variable);
                }
                NodeKind::ExprStmt { expr } => {
                    let value = self.expression(*expr)?;
                    if !is_reference(&value) {
                        self.lines.push(format!("$util.qr({value})"));
                    }
                }
                NodeKind::Return { expr } => {
                    let value = match expr {
                        Some(expr) => self.expression(*expr)?,
                        None => "$null".to_string(),
                    };
                    self.lines.push(format!("$util.toJson({value})"));
                    break;
                }
                _ => return Err(CompileError::unsupported(tree, *stmt)),
            }
        }

        debug!(lines = self.lines.len(), temps = self.temps.len(), "mapping template compiled");
        Ok(MappingTemplate { lines: self.lines })
    }

    fn expression(&mut self, node: NodeId) -> Result<String, CompileError> {
        let tree = self.eval.tree();
        if let Some(constant) = self.eval.eval(node) {
            return self.literal(node, constant.value());
        }

        match tree.kind(node) {
            NodeKind::Identifier { name, binding } => match binding {
                Some(Binding::Parameter(param)) => match tree.parameter_index(*param) {
                    Some(0) => Ok(format!("${}", self.options.input_variable)),
                    _ => Err(single_parameter(tree, *param)),
                },
                Some(Binding::Variable(decl)) => self
                    .bound
                    .get(decl)
                    .map(|variable| format!("${variable}"))
                    .ok_or_else(|| unknown(tree, node, name)),
                None => Err(unknown(tree, node, name)),
            },
            NodeKind::PropAccess { expr, name } => {
                let base = self.reference(*expr)?;
                if is_vtl_identifier(name) {
                    Ok(format!("{base}.{name}"))
                } else {
                    Ok(format!("{base}.get({})", quote(name)))
                }
            }
            NodeKind::ElementAccess { expr, element } => {
                let base = self.reference(*expr)?;
                let key = self.expression(*element)?;
                Ok(format!("{base}[{key}]"))
            }
            NodeKind::Call { .. } => match TableIntegration::resolve(&self.eval, node) {
                Some(integration) => self.request(node, &integration),
                None => Err(CompileError::unsupported(tree, node)),
            },
            NodeKind::Array { items } => self.array(node, items),
            NodeKind::Object { properties } => self.object(node, properties),
            NodeKind::Template { head, spans } => {
                let parts: Vec<(NodeId, &str)> =
                    spans.iter().map(|s| (s.expr, s.literal.as_str())).collect();
                self.interpolate(head, &parts)
            }
            NodeKind::Unary { op, expr } => match op {
                UnaryOp::Not => Ok(format!("!{}", self.expression(*expr)?)),
                UnaryOp::Minus => Ok(format!("-{}", self.expression(*expr)?)),
                UnaryOp::Plus => self.expression(*expr),
                _ => Err(CompileError::unsupported(tree, node)),
            },
            NodeKind::Binary { op, left, right } => self.binary(node, *op, *left, *right),
            NodeKind::Reference { name } => Err(unknown(tree, node, name)),
            _ => Err(CompileError::unsupported(tree, node)),
        }
    }

    fn literal(&self, node: NodeId, value: &Value) -> Result<String, CompileError> {
        if value.contains_opaque() {
            return Err(opaque(self.eval.tree(), node, value));
        }
        Ok(match value {
            Value::Undefined | Value::Null => "$null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => quote(s),
            Value::Array(_) | Value::Object(_) => {
                format!("$util.parseJson({})", quote(&value.to_json().to_string()))
            }
            Value::Opaque(_) => "$null".to_string(),
        })
    }

    /// Emit `node` as something that can be dereferenced, hoisting when needed.
    fn reference(&mut self, node: NodeId) -> Result<String, CompileError> {
        let value = self.expression(node)?;
        if is_reference(&value) {
            Ok(value)
        } else {
            Ok(self.hoist(node, value))
        }
    }

    fn hoist(&mut self, node: NodeId, value: String) -> String {
        let temp = self.temps.generate_or_get(node);
        self.lines.push(format!("#set(${temp} = {value})"));
        format!("${temp}")
    }

    fn array(&mut self, node: NodeId, items: &[NodeId]) -> Result<String, CompileError> {
        let tree = self.eval.tree();
        let temp = self.temps.generate_or_get(node);
        self.lines.push(format!("#set(${temp} = [])"));
        for item in items {
            match tree.kind(*item) {
                NodeKind::Spread { expr } => {
                    let value = match self.eval.eval(*expr).map(|c| c.into_value()) {
                        Some(value @ Value::Array(_)) => self.literal(*expr, &value)?,
                        Some(other) => return Err(bad_spread(tree, *item, &other)),
                        None => self.expression(*expr)?,
                    };
                    self.lines.push(format!("$util.qr(${temp}.addAll({value}))"));
                }
                _ => {
                    if matches!(self.eval.eval(*item).map(|c| c.into_value()), Some(Value::Undefined)) {
                        continue;
                    }
                    let value = self.expression(*item)?;
                    self.lines.push(format!("$util.qr(${temp}.add({value}))"));
                }
            }
        }
        Ok(format!("${temp}"))
    }

    fn object(&mut self, node: NodeId, properties: &[NodeId]) -> Result<String, CompileError> {
        let tree = self.eval.tree();
        let temp = self.temps.generate_or_get(node);
        self.lines.push(format!("#set(${temp} = {{}})"));
        for prop in properties {
            match tree.kind(*prop) {
                NodeKind::PropAssign { name, expr } => {
                    if matches!(self.eval.eval(*expr).map(|c| c.into_value()), Some(Value::Undefined)) {
                        continue;
                    }
                    let key = match (self.eval.property_name(name), name) {
                        (Some(key), _) => quote(&key),
                        (None, PropName::Computed(key)) => self.expression(*key)?,
                        (None, _) => return Err(CompileError::unsupported(tree, *prop)),
                    };
                    let value = self.expression(*expr)?;
                    self.lines.push(format!("$util.qr(${temp}.put({key}, {value}))"));
                }
                NodeKind::SpreadAssign { expr } => {
                    let value = match self.eval.eval(*expr).map(|c| c.into_value()) {
                        Some(Value::Undefined | Value::Null) => continue,
                        Some(value @ Value::Object(_)) => self.literal(*expr, &value)?,
                        Some(other) => return Err(bad_spread(tree, *prop, &other)),
                        None => self.expression(*expr)?,
                    };
                    self.lines.push(format!("$util.qr(${temp}.putAll({value}))"));
                }
                _ => return Err(CompileError::unsupported(tree, *prop)),
            }
        }
        Ok(format!("${temp}"))
    }

    /// Double-quoted string with `${ref}` interpolations.
    fn interpolate(&mut self, head: &str, parts: &[(NodeId, &str)]) -> Result<String, CompileError> {
        let mut out = escape_text(head);
        for (expr, literal) in parts {
            match self.eval.eval(*expr) {
                Some(constant) => {
                    let value = constant.value();
                    if value.contains_opaque() {
                        return Err(opaque(self.eval.tree(), *expr, value));
                    }
                    out.push_str(&escape_text(&value.to_display_string()));
                }
                None => {
                    let reference = self.reference(*expr)?;
                    out.push_str("${");
                    out.push_str(&reference[1..]);
                    out.push('}');
                }
            }
            out.push_str(&escape_text(literal));
        }
        Ok(format!("\"{out}\""))
    }

    fn binary(
        &mut self,
        node: NodeId,
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    ) -> Result<String, CompileError> {
        let tree = self.eval.tree();
        let left_const = self.eval.eval(left);
        let right_const = self.eval.eval(right);

        match op {
            BinaryOp::Add if self.eval.is_string_typed(node) => {
                let parts: Vec<(NodeId, &str)> = self
                    .eval
                    .concat_operands(node)
                    .into_iter()
                    .map(|n| (n, ""))
                    .collect();
                self.interpolate("", &parts)
            }
            BinaryOp::Add => Err(CompileError::new(
                ErrorCode::AmbiguousAddition,
                "Addition operator is only supported to concatenate at least one string to another value.",
            )
            .at(tree, node)),
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                let l = self.expression(left)?;
                let r = self.expression(right)?;
                Ok(format!("({l} {} {r})", op.token()))
            }
            BinaryOp::And | BinaryOp::Or => {
                let l = self.expression(left)?;
                let r = self.expression(right)?;
                Ok(format!("({l} {} {r})", op.token()))
            }
            _ if op.is_relational() => {
                // Keep the runtime operand on the left.
                if left_const.is_some() && right_const.is_none() {
                    let r = self.expression(right)?;
                    let l = self.expression(left)?;
                    Ok(format!("({r} {} {l})", op.invert().token()))
                } else {
                    let l = self.expression(left)?;
                    let r = self.expression(right)?;
                    Ok(format!("({l} {} {r})", op.token()))
                }
            }
            _ => Err(CompileError::unsupported(tree, node)),
        }
    }

    /// Resolver request document for a table integration call.
    fn request(&mut self, call: NodeId, integration: &TableIntegration) -> Result<String, CompileError> {
        let plan = integration.plan(&self.eval, call)?;
        let input = match &plan.input {
            RequestInput::Empty => None,
            RequestInput::Literal(arg) | RequestInput::Runtime(arg) => Some(self.reference(*arg)?),
            RequestInput::Constant(_) => match self.eval.tree().kind(call) {
                NodeKind::Call { args, .. } => match args.first() {
                    Some(arg) => Some(self.reference(*arg)?),
                    None => None,
                },
                _ => None,
            },
        };

        let request = self.temps.generate_or_get(call);
        let envelope = serde_json::json!({
            "operation": plan.spec.operation,
            "version": self.options.request_version,
        });
        self.lines.push(format!(
            "#set(${request} = $util.parseJson({}))",
            quote(&envelope.to_string())
        ));

        let Some(input) = input else {
            return Ok(format!("${request}"));
        };
        for field in plan.sent() {
            let name = quote(field.name);
            let value = format!("{input}.get({name})");
            let put = format!("$util.qr(${request}.put({name}, {value}))");
            if field.presence == Presence::IfDefined {
                self.lines.push(format!("#if(!$util.isNull({value}))"));
                self.lines.push(put);
                self.lines.push("#end".to_string());
            } else {
                self.lines.push(put);
            }
        }
        Ok(format!("${request}"))
    }
}

impl Dialect for VtlEmitter<'_> {
    type Fragment = String;

    fn emit(&mut self, node: NodeId) -> Result<String, CompileError> {
        self.expression(node)
    }
}

fn single_parameter(tree: &Tree, param: NodeId) -> CompileError {
    CompileError::new(
        ErrorCode::InvalidFunction,
        "mapping template functions take a single context parameter",
    )
    .at(tree, param)
}

fn unknown(tree: &Tree, node: NodeId, name: &str) -> CompileError {
    CompileError::new(ErrorCode::UnknownReference, format!("Cannot resolve `{name}`")).at(tree, node)
}

fn opaque(tree: &Tree, node: NodeId, value: &Value) -> CompileError {
    CompileError::new(
        ErrorCode::UnsupportedExpression,
        format!("Cannot render a {} in a mapping template", value.type_name()),
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

/// Single-quoted string literal; quotes are doubled.
fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Literal text inside a double-quoted interpolated string.
fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\"\""),
            '$' => out.push_str("\\$"),
            '#' => out.push_str("\\#"),
            c => out.push(c),
        }
    }
    out
}

fn is_vtl_identifier(name: &str) -> bool {
    super::is_identifier(name) && !name.contains('$')
}

/// `$name` or `$name.path.to.field`
fn is_reference(value: &str) -> bool {
    match value.strip_prefix('$') {
        Some(rest) => {
            !rest.is_empty()
                && rest.split('.').all(is_vtl_identifier)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{TreeBuilder, VariableKind};

    fn compile(tree: &Tree, externals: &Externals) -> Result<String, CompileError> {
        let options = CompileOptions::default();
        VtlEmitter::new(tree, externals, &options)
            .compile(tree.root())
            .map(|t| t.to_string())
    }

    #[test]
    fn test_update_item_request_template() {
        let mut b = TreeBuilder::new();
        let ctx = b.parameter("context");
        let table = b.reference("table");
        let callee = b.prop(table, "updateItem");

        let ctx_ref = b.param_ref(ctx);
        let id = b.path(ctx_ref, "arguments.id");
        let s = b.record(vec![("S", id)]);
        let key = b.record(vec![("id", s)]);

        let expression = b.string("SET #name = :name");
        let hash_name = b.string("name");
        let names = b.record(vec![("#name", hash_name)]);
        let ctx_ref = b.param_ref(ctx);
        let name = b.path(ctx_ref, "arguments.name");
        let name_s = b.record(vec![("S", name)]);
        let values = b.record(vec![(":name", name_s)]);
        let update = b.record(vec![
            ("expression", expression),
            ("expressionNames", names),
            ("expressionValues", values),
        ]);

        let arg = b.record(vec![("key", key), ("update", update)]);
        let call = b.call(callee, vec![arg]);
        let ret = b.ret(Some(call));
        let func = b.function(vec![ctx], vec![ret]);
        let tree = b.finish(func).expect("tree should be well formed");

        let mut externals = Externals::new();
        externals.table("table", "Items");

        let template = compile(&tree, &externals).expect("template should compile");
        let expected = [
            "#set($fnl_tmp_0 = {})",
            "#set($fnl_tmp_1 = {})",
            "#set($fnl_tmp_2 = {})",
            "$util.qr($fnl_tmp_2.put('S', $context.arguments.id))",
            "$util.qr($fnl_tmp_1.put('id', $fnl_tmp_2))",
            "$util.qr($fnl_tmp_0.put('key', $fnl_tmp_1))",
            "#set($fnl_tmp_3 = {})",
            "$util.qr($fnl_tmp_3.put('expression', 'SET #name = :name'))",
            r##"$util.qr($fnl_tmp_3.put('expressionNames', $util.parseJson('{"#name":"name"}')))"##,
            "#set($fnl_tmp_4 = {})",
            "#set($fnl_tmp_5 = {})",
            "$util.qr($fnl_tmp_5.put('S', $context.arguments.name))",
            "$util.qr($fnl_tmp_4.put(':name', $fnl_tmp_5))",
            "$util.qr($fnl_tmp_3.put('expressionValues', $fnl_tmp_4))",
            "$util.qr($fnl_tmp_0.put('update', $fnl_tmp_3))",
            r#"#set($fnl_tmp_6 = $util.parseJson('{"operation":"UpdateItem","version":"2018-05-29"}'))"#,
            "$util.qr($fnl_tmp_6.put('key', $fnl_tmp_0.get('key')))",
            "$util.qr($fnl_tmp_6.put('update', $fnl_tmp_0.get('update')))",
            "$util.toJson($fnl_tmp_6)",
        ]
        .join("\n");
        assert_eq!(template, expected);
    }

    #[test]
    fn test_constant_update_item_reads_fields_from_bound_argument() {
        let mut b = TreeBuilder::new();
        let ctx = b.parameter("context");
        let table = b.reference("table");
        let callee = b.prop(table, "updateItem");
        let id = b.string("123");
        let key = b.record(vec![("id", id)]);
        let expression = b.string("#n = #n + 1");
        let n = b.string("n");
        let names = b.record(vec![("#n", n)]);
        let update = b.record(vec![("expression", expression), ("expressionNames", names)]);
        let arg = b.record(vec![("key", key), ("update", update)]);
        let call = b.call(callee, vec![arg]);
        let ret = b.ret(Some(call));
        let func = b.function(vec![ctx], vec![ret]);
        let tree = b.finish(func).expect("tree should be well formed");
        let mut externals = Externals::new();
        externals.table("table", "Items");

        let template = compile(&tree, &externals).expect("template should compile");
        let expected = [
            r##"#set($fnl_tmp_0 = $util.parseJson('{"key":{"id":"123"},"update":{"expression":"#n = #n + 1","expressionNames":{"#n":"n"}}}'))"##,
            r#"#set($fnl_tmp_1 = $util.parseJson('{"operation":"UpdateItem","version":"2018-05-29"}'))"#,
            "$util.qr($fnl_tmp_1.put('key', $fnl_tmp_0.get('key')))",
            "$util.qr($fnl_tmp_1.put('update', $fnl_tmp_0.get('update')))",
            "$util.toJson($fnl_tmp_1)",
        ]
        .join("\n");
        assert_eq!(template, expected);
        assert!(!template.contains("condition"));
        assert!(!template.contains("_version"));
    }

    #[test]
    fn test_optional_literal_fields_are_guarded_or_dropped() {
        let build = |null_condition: bool| {
            let mut b = TreeBuilder::new();
            let ctx = b.parameter("context");
            let table = b.reference("table");
            let callee = b.prop(table, "updateItem");
            let ctx_ref = b.param_ref(ctx);
            let key = b.path(ctx_ref, "arguments.key");
            let ctx_ref = b.param_ref(ctx);
            let update = b.path(ctx_ref, "arguments.update");
            let condition = if null_condition {
                b.null()
            } else {
                let ctx_ref = b.param_ref(ctx);
                b.path(ctx_ref, "arguments.condition")
            };
            let arg = b.record(vec![("key", key), ("update", update), ("condition", condition)]);
            let call = b.call(callee, vec![arg]);
            let ret = b.ret(Some(call));
            let func = b.function(vec![ctx], vec![ret]);
            b.finish(func).expect("tree should be well formed")
        };
        let mut externals = Externals::new();
        externals.table("table", "Items");

        let template = compile(&build(false), &externals).expect("template should compile");
        let expected = [
            "#set($fnl_tmp_0 = {})",
            "$util.qr($fnl_tmp_0.put('key', $context.arguments.key))",
            "$util.qr($fnl_tmp_0.put('update', $context.arguments.update))",
            "$util.qr($fnl_tmp_0.put('condition', $context.arguments.condition))",
            r#"#set($fnl_tmp_1 = $util.parseJson('{"operation":"UpdateItem","version":"2018-05-29"}'))"#,
            "$util.qr($fnl_tmp_1.put('key', $fnl_tmp_0.get('key')))",
            "$util.qr($fnl_tmp_1.put('update', $fnl_tmp_0.get('update')))",
            "#if(!$util.isNull($fnl_tmp_0.get('condition')))",
            "$util.qr($fnl_tmp_1.put('condition', $fnl_tmp_0.get('condition')))",
            "#end",
            "$util.toJson($fnl_tmp_1)",
        ]
        .join("\n");
        assert_eq!(template, expected);

        let template = compile(&build(true), &externals).expect("template should compile");
        assert!(!template.contains("$fnl_tmp_1.put('condition'"));
        assert!(!template.contains("#if"));
    }

    #[test]
    fn test_user_variables_never_take_temp_names() {
        let mut b = TreeBuilder::new();
        let ctx = b.parameter("context");
        let ctx_ref = b.param_ref(ctx);
        let init = b.path(ctx_ref, "arguments.a");
        let decl = b.declare(VariableKind::Const, "fnl_tmp_0", Some(init));
        let user = b.var_ref(decl);
        let list = b.array(vec![user]);
        let ret = b.ret(Some(list));
        let func = b.function(vec![ctx], vec![decl, ret]);
        let tree = b.finish(func).expect("tree should be well formed");

        let template = compile(&tree, &Externals::new()).expect("template should compile");
        let expected = [
            "#set($fnl_tmp_0__1 = $context.arguments.a)",
            "#set($fnl_tmp_0 = [])",
            "$util.qr($fnl_tmp_0.add($fnl_tmp_0__1))",
            "$util.toJson($fnl_tmp_0)",
        ]
        .join("\n");
        assert_eq!(template, expected);
    }

    #[test]
    fn test_addition_requires_a_string_operand() {
        let mut b = TreeBuilder::new();
        let ctx = b.parameter("context");
        let ctx_ref = b.param_ref(ctx);
        let a = b.path(ctx_ref, "arguments.a");
        let ctx_ref = b.param_ref(ctx);
        let c = b.path(ctx_ref, "arguments.b");
        let sum = b.binary(BinaryOp::Add, a, c);
        let ret = b.ret(Some(sum));
        let func = b.function(vec![ctx], vec![ret]);
        let tree = b.finish(func).expect("tree should be well formed");
        let err = compile(&tree, &Externals::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::AmbiguousAddition);
        assert_eq!(err.node, Some(sum));

        let mut b = TreeBuilder::new();
        let ctx = b.parameter("context");
        let prefix = b.string("id-");
        let ctx_ref = b.param_ref(ctx);
        let a = b.path(ctx_ref, "arguments.a");
        let first = b.binary(BinaryOp::Add, prefix, a);
        let ctx_ref = b.param_ref(ctx);
        let c = b.path(ctx_ref, "arguments.b");
        let chain = b.binary(BinaryOp::Add, first, c);
        let ret = b.ret(Some(chain));
        let func = b.function(vec![ctx], vec![ret]);
        let tree = b.finish(func).expect("tree should be well formed");
        let template = compile(&tree, &Externals::new()).expect("template should compile");
        assert_eq!(
            template,
            r#"$util.toJson("id-${context.arguments.a}${context.arguments.b}")"#
        );
    }

    #[test]
    fn test_runtime_request_guards_optional_fields() {
        let mut b = TreeBuilder::new();
        let ctx = b.parameter("context");
        let table = b.reference("table");
        let callee = b.prop(table, "getItem");
        let ctx_ref = b.param_ref(ctx);
        let arg = b.path(ctx_ref, "arguments");
        let call = b.call(callee, vec![arg]);
        let ret = b.ret(Some(call));
        let func = b.function(vec![ctx], vec![ret]);
        let tree = b.finish(func).expect("tree should be well formed");
        let mut externals = Externals::new();
        externals.table("table", "Items");

        let template = compile(&tree, &externals).expect("template should compile");
        let expected = [
            r#"#set($fnl_tmp_0 = $util.parseJson('{"operation":"GetItem","version":"2018-05-29"}'))"#,
            "$util.qr($fnl_tmp_0.put('key', $context.arguments.get('key')))",
            "#if(!$util.isNull($context.arguments.get('consistentRead')))",
            "$util.qr($fnl_tmp_0.put('consistentRead', $context.arguments.get('consistentRead')))",
            "#end",
            "$util.toJson($fnl_tmp_0)",
        ]
        .join("\n");
        assert_eq!(template, expected);
    }

    #[test]
    fn test_declarations_are_renamed_uniquely() {
        let mut b = TreeBuilder::new();
        let ctx = b.parameter("context");
        let ctx_ref = b.param_ref(ctx);
        let first_init = b.path(ctx_ref, "arguments.a");
        let first = b.declare(VariableKind::Let, "x", Some(first_init));
        let ctx_ref = b.param_ref(ctx);
        let second_init = b.path(ctx_ref, "arguments.b");
        let second = b.declare(VariableKind::Let, "x", Some(second_init));
        let ctx_ref = b.param_ref(ctx);
        let shadow_init = b.path(ctx_ref, "source");
        let shadow = b.declare(VariableKind::Const, "context", Some(shadow_init));
        let first_ref = b.var_ref(first);
        let second_ref = b.var_ref(second);
        let shadow_ref = b.var_ref(shadow);
        let list = b.array(vec![first_ref, second_ref, shadow_ref]);
        let ret = b.ret(Some(list));
        let func = b.function(vec![ctx], vec![first, second, shadow, ret]);
        let tree = b.finish(func).expect("tree should be well formed");

        let template = compile(&tree, &Externals::new()).expect("template should compile");
        let expected = [
            "#set($x = $context.arguments.a)",
            "#set($x__1 = $context.arguments.b)",
            "#set($context__1 = $context.source)",
            "#set($fnl_tmp_0 = [])",
            "$util.qr($fnl_tmp_0.add($x))",
            "$util.qr($fnl_tmp_0.add($x__1))",
            "$util.qr($fnl_tmp_0.add($context__1))",
            "$util.toJson($fnl_tmp_0)",
        ]
        .join("\n");
        assert_eq!(template, expected);
    }

    #[test]
    fn test_constants_and_omitted_undefined() {
        let mut b = TreeBuilder::new();
        let ctx = b.parameter("context");
        let ctx_ref = b.param_ref(ctx);
        let dynamic = b.path(ctx_ref, "arguments.id");
        let missing = b.undefined();
        let quote = b.string("it's");
        let list_a = b.number(1.0);
        let list = b.array(vec![list_a]);
        let obj = b.record(vec![
            ("id", dynamic),
            ("skip", missing),
            ("text", quote),
            ("list", list),
        ]);
        let expr = b.expr_stmt(obj);
        let func = b.function(vec![ctx], vec![expr]);
        let tree = b.finish(func).expect("tree should be well formed");

        let template = compile(&tree, &Externals::new()).expect("template should compile");
        let expected = [
            "#set($fnl_tmp_0 = {})",
            "$util.qr($fnl_tmp_0.put('id', $context.arguments.id))",
            "$util.qr($fnl_tmp_0.put('text', 'it''s'))",
            "$util.qr($fnl_tmp_0.put('list', $util.parseJson('[1]')))",
        ]
        .join("\n");
        assert_eq!(template, expected);
    }

    #[test]
    fn test_template_hoists_non_reference_spans() {
        let mut b = TreeBuilder::new();
        let ctx = b.parameter("context");
        let ctx_ref = b.param_ref(ctx);
        let name = b.path(ctx_ref, "arguments.name");
        let ctx_ref = b.param_ref(ctx);
        let args = b.path(ctx_ref, "arguments");
        let odd = b.prop(args, "first-name");
        let two = b.number(2.0);
        let template = b.template(
            "hi ",
            vec![(name, " ".to_string()), (odd, " $".to_string()), (two, "".to_string())],
        );
        let ret = b.ret(Some(template));
        let func = b.function(vec![ctx], vec![ret]);
        let tree = b.finish(func).expect("tree should be well formed");

        let template = compile(&tree, &Externals::new()).expect("template should compile");
        let expected = [
            "#set($fnl_tmp_0 = $context.arguments.get('first-name'))",
            r#"$util.toJson("hi ${context.arguments.name} ${fnl_tmp_0} \$2")"#,
        ]
        .join("\n");
        assert_eq!(template, expected);
    }

    #[test]
    fn test_relational_keeps_runtime_operand_left() {
        let mut b = TreeBuilder::new();
        let ctx = b.parameter("context");
        let one = b.number(1.0);
        let ctx_ref = b.param_ref(ctx);
        let count = b.path(ctx_ref, "arguments.count");
        let cmp = b.binary(BinaryOp::Lt, one, count);
        let ret = b.ret(Some(cmp));
        let func = b.function(vec![ctx], vec![ret]);
        let tree = b.finish(func).expect("tree should be well formed");

        let template = compile(&tree, &Externals::new()).expect("template should compile");
        assert_eq!(template, "$util.toJson(($context.arguments.count > 1))");
    }

    #[test]
    fn test_unsupported_call_and_bad_spread() {
        let mut b = TreeBuilder::new();
        let ctx = b.parameter("context");
        let f = b.reference("f");
        let call = b.call(f, vec![]);
        let ret = b.ret(Some(call));
        let func = b.function(vec![ctx], vec![ret]);
        let tree = b.finish(func).expect("tree should be well formed");
        let err = compile(&tree, &Externals::new()).unwrap_err();
        assert_eq!(err.message, "Unsupported template expression of kind: CallExpr");
        assert_eq!(err.node, Some(call));

        let mut b = TreeBuilder::new();
        let ctx = b.parameter("context");
        let ctx_ref = b.param_ref(ctx);
        let dynamic = b.path(ctx_ref, "arguments");
        let field = b.prop_assign("a", dynamic);
        let n = b.number(1.0);
        let spread = b.spread_assign(n);
        let obj = b.object(vec![field, spread]);
        let ret = b.ret(Some(obj));
        let func = b.function(vec![ctx], vec![ret]);
        let tree = b.finish(func).expect("tree should be well formed");
        let err = compile(&tree, &Externals::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnsupportedSpread);
        assert_eq!(err.node, Some(spread));
    }
}
