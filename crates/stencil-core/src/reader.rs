//! JSON source documents.
//!
//! A document carries one function body plus the externals it closes over:
//!
//! ```json
//! {
//!   "function": { "params": ["event"], "body": [ { "return": { "path": "event.source" } } ] },
//!   "externals": { "table": { "kind": "table", "name": "Items" } },
//!   "options": { "temp_prefix": "tmp" }
//! }
//! ```
//!
//! Expressions use plain JSON for literals (`"s"`, `1`, `true`, `null`) and
//! single-key objects for everything else: `id`, `path`, `ref`, `undefined`,
//! `text`, `prop`, `index`, `call`/`args`, `array`, `spread`, `object`,
//! `template`, `unary`, `binary`, `function`. Statements are `const`, `let`,
//! `var`, `return`, `expr`, or the bare string `"return"`.
//!
//! Identifiers resolve lexically while reading: a function's parameters and
//! the declarations preceding the use site (in this or an enclosing function)
//! are in scope. Anything else stays unbound.

use crate::externals::{ExternalDef, Externals};
use crate::options::CompileOptions;
use crate::tree::{
    Binding, BinaryOp, NodeId, NodeKind, PropName, Tree, TreeBuilder, TreeError, UnaryOp,
    VariableKind,
};
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// A parsed compilation unit.
#[derive(Debug, Clone)]
pub struct Document {
    pub tree: Tree,
    pub externals: Externals,
    pub options: Option<CompileOptions>,
}

impl Document {
    /// The function being compiled (always the tree root).
    pub fn function(&self) -> NodeId {
        self.tree.root()
    }
}

pub fn read_document(input: &Value) -> Result<Document, TreeError> {
    let doc = input
        .as_object()
        .ok_or_else(|| malformed("document must be an object"))?;

    let function = doc
        .get("function")
        .ok_or_else(|| malformed("document is missing `function`"))?;

    let externals = match doc.get("externals") {
        None | Some(Value::Null) => Externals::new(),
        Some(value) => {
            let defs: IndexMap<String, ExternalDef> = serde_json::from_value(value.clone())
                .map_err(|err| malformed(format!("invalid externals: {err}")))?;
            defs.into_iter().collect()
        }
    };

    let options = match doc.get("options") {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            serde_json::from_value(value.clone())
                .map_err(|err| malformed(format!("invalid options: {err}")))?,
        ),
    };

    let mut reader = Reader::default();
    let root = reader.function(function)?;
    let tree = reader.builder.finish(root)?;
    Ok(Document {
        tree,
        externals,
        options,
    })
}

fn malformed(message: impl Into<String>) -> TreeError {
    TreeError::Malformed(message.into())
}

#[derive(Default)]
struct Reader {
    builder: TreeBuilder,
    scopes: Vec<Vec<(String, Binding)>>,
}

impl Reader {
    fn resolve(&self, name: &str) -> Option<Binding> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(bound, _)| bound == name)
            .map(|(_, binding)| *binding)
    }

    fn bind(&mut self, name: &str, binding: Binding) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.push((name.to_string(), binding));
        }
    }

    fn function(&mut self, value: &Value) -> Result<NodeId, TreeError> {
        let obj = value
            .as_object()
            .ok_or_else(|| malformed("function must be an object"))?;

        self.scopes.push(Vec::new());
        let result = self.function_body(obj);
        self.scopes.pop();
        result
    }

    fn function_body(&mut self, obj: &Map<String, Value>) -> Result<NodeId, TreeError> {
        let mut params = Vec::new();
        if let Some(list) = obj.get("params") {
            let list = list
                .as_array()
                .ok_or_else(|| malformed("`params` must be an array"))?;
            for param in list {
                let name = param
                    .as_str()
                    .ok_or_else(|| malformed("parameter names must be strings"))?;
                let id = self.builder.parameter(name);
                self.bind(name, Binding::Parameter(id));
                params.push(id);
            }
        }

        let mut body = Vec::new();
        if let Some(list) = obj.get("body") {
            let list = list
                .as_array()
                .ok_or_else(|| malformed("`body` must be an array"))?;
            for stmt in list {
                body.push(self.statement(stmt)?);
            }
        }

        Ok(self.builder.function(params, body))
    }

    fn statement(&mut self, value: &Value) -> Result<NodeId, TreeError> {
        if value.as_str() == Some("return") {
            return Ok(self.builder.ret(None));
        }
        let obj = value
            .as_object()
            .ok_or_else(|| malformed(format!("invalid statement: {value}")))?;

        for (key, kind) in [
            ("const", VariableKind::Const),
            ("let", VariableKind::Let),
            ("var", VariableKind::Var),
        ] {
            if let Some(name) = obj.get(key) {
                let name = name
                    .as_str()
                    .ok_or_else(|| malformed(format!("`{key}` name must be a string")))?;
                let init = obj.get("init").map(|e| self.expression(e)).transpose()?;
                let decl = self.builder.declare(kind, name, init);
                self.bind(name, Binding::Variable(decl));
                return Ok(decl);
            }
        }

        if let Some(expr) = obj.get("return") {
            let expr = self.expression(expr)?;
            return Ok(self.builder.ret(Some(expr)));
        }
        if let Some(expr) = obj.get("expr") {
            let expr = self.expression(expr)?;
            return Ok(self.builder.expr_stmt(expr));
        }
        Err(malformed(format!("invalid statement: {value}")))
    }

    fn expression(&mut self, value: &Value) -> Result<NodeId, TreeError> {
        let obj = match value {
            Value::Null => return Ok(self.builder.null()),
            Value::Bool(b) => return Ok(self.builder.boolean(*b)),
            Value::Number(n) => {
                let n = n
                    .as_f64()
                    .ok_or_else(|| malformed(format!("unrepresentable number {n}")))?;
                return Ok(self.builder.number(n));
            }
            Value::String(s) => return Ok(self.builder.string(s.as_str())),
            Value::Array(_) => {
                return Err(malformed("bare arrays are not expressions; use {\"array\": [...]}"));
            }
            Value::Object(obj) => obj,
        };

        if obj.contains_key("undefined") {
            return Ok(self.builder.undefined());
        }
        if let Some(text) = obj.get("text") {
            let text = as_str(text, "text")?;
            return Ok(self.builder.push(NodeKind::NoSubstitutionTemplate(text.to_string())));
        }
        if let Some(name) = obj.get("id") {
            let name = as_str(name, "id")?;
            return Ok(self.identifier(name));
        }
        if let Some(path) = obj.get("path") {
            let path = as_str(path, "path")?;
            let (head, rest) = path.split_once('.').unwrap_or((path, ""));
            let base = self.identifier(head);
            return Ok(self.builder.path(base, rest));
        }
        if let Some(name) = obj.get("ref") {
            let name = as_str(name, "ref")?;
            return Ok(self.builder.reference(name));
        }
        if let Some(pair) = obj.get("prop") {
            let [expr, name] = pair_of(pair, "prop")?;
            let expr = self.expression(expr)?;
            let name = as_str(name, "prop name")?;
            return Ok(self.builder.prop(expr, name));
        }
        if let Some(pair) = obj.get("index") {
            let [expr, element] = pair_of(pair, "index")?;
            let expr = self.expression(expr)?;
            let element = self.expression(element)?;
            return Ok(self.builder.element(expr, element));
        }
        if let Some(callee) = obj.get("call") {
            let callee = self.expression(callee)?;
            let args = match obj.get("args") {
                None => Vec::new(),
                Some(args) => self.items(args, "args")?,
            };
            return Ok(self.builder.call(callee, args));
        }
        if let Some(items) = obj.get("array") {
            let items = self.items(items, "array")?;
            return Ok(self.builder.array(items));
        }
        if let Some(props) = obj.get("object") {
            return self.object(props);
        }
        if let Some(template) = obj.get("template") {
            return self.template(template);
        }
        if let Some(op) = obj.get("unary") {
            let op: UnaryOp = serde_json::from_value(op.clone())
                .map_err(|err| malformed(format!("invalid unary operator: {err}")))?;
            let expr = self.operand(obj, "expr")?;
            return Ok(self.builder.unary(op, expr));
        }
        if let Some(op) = obj.get("binary") {
            let op: BinaryOp = serde_json::from_value(op.clone())
                .map_err(|err| malformed(format!("invalid binary operator: {err}")))?;
            let left = self.operand(obj, "left")?;
            let right = self.operand(obj, "right")?;
            return Ok(self.builder.binary(op, left, right));
        }
        if let Some(function) = obj.get("function") {
            return self.function(function);
        }
        Err(malformed(format!("invalid expression: {value}")))
    }

    fn identifier(&mut self, name: &str) -> NodeId {
        let binding = self.resolve(name);
        self.builder.identifier(name, binding)
    }

    fn operand(&mut self, obj: &Map<String, Value>, key: &str) -> Result<NodeId, TreeError> {
        let value = obj
            .get(key)
            .ok_or_else(|| malformed(format!("missing `{key}` operand")))?;
        self.expression(value)
    }

    /// Array items or call arguments; `{"spread": expr}` becomes a spread element.
    fn items(&mut self, value: &Value, what: &str) -> Result<Vec<NodeId>, TreeError> {
        let list = value
            .as_array()
            .ok_or_else(|| malformed(format!("`{what}` must be an array")))?;
        list.iter()
            .map(|item| match item.as_object().and_then(|o| o.get("spread")) {
                Some(inner) => {
                    let expr = self.expression(inner)?;
                    Ok(self.builder.spread(expr))
                }
                None => self.expression(item),
            })
            .collect()
    }

    fn object(&mut self, value: &Value) -> Result<NodeId, TreeError> {
        let list = value
            .as_array()
            .ok_or_else(|| malformed("`object` must be an array of properties"))?;
        let mut properties = Vec::with_capacity(list.len());
        for prop in list {
            let obj = prop
                .as_object()
                .ok_or_else(|| malformed(format!("invalid property: {prop}")))?;
            if let Some(inner) = obj.get("spread") {
                let expr = self.expression(inner)?;
                properties.push(self.builder.spread_assign(expr));
                continue;
            }
            let name = match (obj.get("name"), obj.get("computed")) {
                (Some(Value::String(s)), None) => PropName::String(s.clone()),
                (Some(Value::Number(n)), None) => PropName::Number(n.as_f64().unwrap_or(f64::NAN)),
                (None, Some(key)) => PropName::Computed(self.expression(key)?),
                _ => return Err(malformed(format!("invalid property name: {prop}"))),
            };
            let expr = self.operand(obj, "value")?;
            properties.push(self.builder.push(NodeKind::PropAssign { name, expr }));
        }
        Ok(self.builder.object(properties))
    }

    fn template(&mut self, value: &Value) -> Result<NodeId, TreeError> {
        let obj = value
            .as_object()
            .ok_or_else(|| malformed("`template` must be an object"))?;
        let head = obj.get("head").and_then(Value::as_str).unwrap_or_default();
        let mut spans = Vec::new();
        if let Some(list) = obj.get("spans") {
            let list = list
                .as_array()
                .ok_or_else(|| malformed("`spans` must be an array"))?;
            for span in list {
                let [expr, literal] = pair_of(span, "span")?;
                let expr = self.expression(expr)?;
                spans.push((expr, as_str(literal, "span literal")?.to_string()));
            }
        }
        Ok(self.builder.template(head, spans))
    }
}

fn as_str<'v>(value: &'v Value, what: &str) -> Result<&'v str, TreeError> {
    value
        .as_str()
        .ok_or_else(|| malformed(format!("`{what}` must be a string")))
}

fn pair_of<'v>(value: &'v Value, what: &str) -> Result<[&'v Value; 2], TreeError> {
    match value.as_array().map(Vec::as_slice) {
        Some([a, b]) => Ok([a, b]),
        _ => Err(malformed(format!("`{what}` must be a two-element array"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Handle, Value as HostValue};
    use serde_json::json;

    #[test]
    fn test_read_binds_parameters_and_declarations() {
        let doc = read_document(&json!({
            "function": {
                "params": ["event"],
                "body": [
                    { "const": "greeting", "init": "hello" },
                    { "return": { "binary": "+", "left": { "id": "greeting" }, "right": { "path": "event.source" } } }
                ]
            }
        }))
        .expect("document should read");

        let tree = &doc.tree;
        let func = tree.function(doc.function()).expect("root is a function");
        let param = func.params[0];
        let decl = func.body[0];
        let ret = tree.find_return(doc.function()).expect("has a return");
        let NodeKind::Return { expr: Some(sum) } = tree.kind(ret) else {
            panic!("return should carry an expression");
        };
        let NodeKind::Binary { left, right, .. } = tree.kind(*sum) else {
            panic!("return should be a binary expression");
        };
        assert_eq!(
            tree.kind(*left),
            &NodeKind::Identifier {
                name: "greeting".to_string(),
                binding: Some(Binding::Variable(decl))
            }
        );
        let NodeKind::PropAccess { expr, name } = tree.kind(*right) else {
            panic!("path should read as property access");
        };
        assert_eq!(name, "source");
        assert_eq!(
            tree.kind(*expr),
            &NodeKind::Identifier {
                name: "event".to_string(),
                binding: Some(Binding::Parameter(param))
            }
        );
    }

    #[test]
    fn test_unknown_identifiers_stay_unbound() {
        let doc = read_document(&json!({
            "function": { "params": [], "body": [ { "return": { "id": "later" } }, { "const": "later", "init": 1 } ] }
        }))
        .expect("document should read");
        let ret = doc.tree.find_return(doc.function()).expect("has a return");
        let NodeKind::Return { expr: Some(ident) } = doc.tree.kind(ret) else {
            panic!("return should carry an expression");
        };
        assert_eq!(
            doc.tree.kind(*ident),
            &NodeKind::Identifier {
                name: "later".to_string(),
                binding: None
            }
        );
    }

    #[test]
    fn test_read_externals_and_options() {
        let doc = read_document(&json!({
            "function": { "params": [], "body": ["return"] },
            "externals": {
                "table": { "kind": "table", "name": "Items" },
                "limit": { "kind": "value", "value": 10 }
            },
            "options": { "temp_prefix": "tmp" }
        }))
        .expect("document should read");

        assert_eq!(
            doc.externals.resolve("table"),
            Some(&HostValue::Opaque(Handle::Table {
                name: "Items".to_string()
            }))
        );
        assert_eq!(doc.externals.resolve("limit"), Some(&HostValue::Number(10.0)));
        assert_eq!(doc.options.map(|o| o.temp_prefix), Some("tmp".to_string()));
    }

    #[test]
    fn test_read_rejects_bad_shapes() {
        let err = read_document(&json!({ "body": [] })).unwrap_err();
        assert_eq!(err, TreeError::Malformed("document is missing `function`".to_string()));

        let err = read_document(&json!({
            "function": { "body": [ { "return": [1, 2] } ] }
        }))
        .unwrap_err();
        assert!(matches!(err, TreeError::Malformed(_)));
    }

    #[test]
    fn test_read_object_and_template() {
        let doc = read_document(&json!({
            "function": {
                "params": ["event"],
                "body": [ { "return": { "object": [
                    { "name": "value", "value": { "template": { "head": "hi ", "spans": [[ { "path": "event.source" }, "!" ]] } } },
                    { "computed": "key", "value": { "undefined": true } },
                    { "spread": { "array": [1, { "spread": { "id": "event" } }] } }
                ] } } ]
            }
        }))
        .expect("document should read");
        assert_eq!(doc.tree.len(), 16);
    }
}
