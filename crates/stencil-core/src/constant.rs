//! Compile-time reduction of sub-expressions.
//!
//! [`Evaluator::eval`] answers one question per node: is its value fully
//! known without running the program? The answer is wrapped so that a known
//! `undefined` stays distinguishable from "not constant". Evaluation never
//! fails; unsupported shapes are simply not constant and callers fall back to
//! a runtime reference in their dialect.

use crate::externals::Externals;
use crate::tree::{BinaryOp, Binding, NodeId, NodeKind, PropName, Tree, UnaryOp, VariableKind};
use crate::value::{Value, format_number};
use indexmap::IndexMap;
use tracing::trace;

/// A value known at compile time.
#[derive(Debug, Clone, PartialEq)]
pub struct Constant(Value);

impl Constant {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    #[inline]
    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

/// Stateless constant folder over one tree and its externals.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    tree: &'a Tree,
    externals: &'a Externals,
}

impl<'a> Evaluator<'a> {
    pub fn new(tree: &'a Tree, externals: &'a Externals) -> Self {
        Self { tree, externals }
    }

    #[inline]
    pub fn tree(&self) -> &'a Tree {
        self.tree
    }

    #[inline]
    pub fn externals(&self) -> &'a Externals {
        self.externals
    }

    pub fn eval(&self, node: NodeId) -> Option<Constant> {
        let result = self.value(node);
        trace!(
            node = %node,
            kind = self.tree.kind(node).name(),
            constant = result.is_some(),
            "constant evaluation"
        );
        result.map(Constant)
    }

    /// Resolved name of an object literal property, if statically known.
    pub fn property_name(&self, name: &PropName) -> Option<String> {
        match name {
            PropName::Identifier(s) | PropName::String(s) => Some(s.clone()),
            PropName::Number(n) => Some(format_number(*n)),
            PropName::Computed(key) => self.value(*key)?.property_key(),
        }
    }

    /// True when `node` certainly produces a string: a string constant, a
    /// template, or a `+` with a string-typed side.
    pub fn is_string_typed(&self, node: NodeId) -> bool {
        if let Some(constant) = self.eval(node) {
            return matches!(constant.value(), Value::String(_));
        }
        match self.tree.kind(node) {
            NodeKind::Template { .. } => true,
            NodeKind::Binary {
                op: BinaryOp::Add,
                left,
                right,
            } => self.is_string_typed(*left) || self.is_string_typed(*right),
            _ => false,
        }
    }

    /// Operands of a string-typed `+` chain, left to right. Sides that are
    /// not themselves string-typed chains stay whole.
    pub fn concat_operands(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.push_operands(node, &mut out);
        out
    }

    fn push_operands(&self, node: NodeId, out: &mut Vec<NodeId>) {
        match self.tree.kind(node) {
            NodeKind::Binary {
                op: BinaryOp::Add,
                left,
                right,
            } if self.value(node).is_none() && self.is_string_typed(node) => {
                self.push_operands(*left, out);
                self.push_operands(*right, out);
            }
            _ => out.push(node),
        }
    }

    fn value(&self, node: NodeId) -> Option<Value> {
        match self.tree.kind(node) {
            NodeKind::String(s) => Some(Value::String(s.clone())),
            NodeKind::Number(n) => Some(Value::Number(*n)),
            NodeKind::Boolean(b) => Some(Value::Bool(*b)),
            NodeKind::Null => Some(Value::Null),
            NodeKind::Undefined => Some(Value::Undefined),
            NodeKind::NoSubstitutionTemplate(text) => Some(Value::String(text.clone())),

            NodeKind::Array { items } => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match self.tree.kind(*item) {
                        NodeKind::Spread { expr } => match self.value(*expr)? {
                            Value::Array(values) => out.extend(values),
                            _ => return None,
                        },
                        _ => out.push(self.value(*item)?),
                    }
                }
                Some(Value::Array(out))
            }

            NodeKind::Object { properties } => {
                let mut out = IndexMap::new();
                for prop in properties {
                    match self.tree.kind(*prop) {
                        NodeKind::PropAssign { name, expr } => {
                            let key = self.property_name(name)?;
                            let value = self.value(*expr)?;
                            out.insert(key, value);
                        }
                        NodeKind::SpreadAssign { expr } => match self.value(*expr)? {
                            Value::Object(map) => out.extend(map),
                            Value::Undefined | Value::Null => {}
                            // Spreading any other constant has no folded form.
                            _ => return None,
                        },
                        _ => return None,
                    }
                }
                Some(Value::Object(out))
            }

            NodeKind::Unary { op, expr } => match (op, self.value(*expr)?) {
                (UnaryOp::Minus, Value::Number(n)) => Some(Value::Number(-n)),
                (UnaryOp::Plus, Value::Number(n)) => Some(Value::Number(n)),
                _ => None,
            },

            NodeKind::PropAccess { expr, name } => self.value(*expr)?.get(name),

            NodeKind::ElementAccess { expr, element } => {
                let base = self.value(*expr)?;
                let key = self.value(*element)?.property_key()?;
                base.get(&key)
            }

            NodeKind::Reference { name } => self.externals.resolve(name).cloned(),

            NodeKind::Identifier {
                binding: Some(Binding::Variable(decl)),
                ..
            } => match self.tree.kind(*decl) {
                NodeKind::VariableDecl {
                    kind: VariableKind::Const,
                    init: Some(init),
                    ..
                } => self.value(*init),
                _ => None,
            },

            NodeKind::Binary { op, left, right } if op.is_arithmetic() => {
                let left = self.value(*left)?;
                let right = self.value(*right)?;
                Some(match op {
                    BinaryOp::Add => left.add(&right),
                    BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
                    BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
                    BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
                    _ => return None,
                })
            }

            NodeKind::Template { head, spans } => {
                let mut out = head.clone();
                for span in spans {
                    out.push_str(&self.value(span.expr)?.to_display_string());
                    out.push_str(&span.literal);
                }
                Some(Value::String(out))
            }

            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeBuilder;
    use crate::value::Handle;
    use serde_json::json;

    fn fold(build: impl FnOnce(&mut TreeBuilder) -> NodeId) -> Option<Value> {
        fold_with(&Externals::new(), build)
    }

    fn fold_with(
        externals: &Externals,
        build: impl FnOnce(&mut TreeBuilder) -> NodeId,
    ) -> Option<Value> {
        let mut b = TreeBuilder::new();
        let root = build(&mut b);
        let tree = b.finish(root).expect("tree should be well formed");
        Evaluator::new(&tree, externals)
            .eval(root)
            .map(Constant::into_value)
    }

    #[test]
    fn test_string_number_addition_is_concatenation() {
        let out = fold(|b| {
            let l = b.string("hello");
            let r = b.number(1.0);
            b.binary(BinaryOp::Add, l, r)
        });
        assert_eq!(out, Some(Value::from("hello1")));

        let out = fold(|b| {
            let l = b.number(1.0);
            let r = b.string("hello");
            b.binary(BinaryOp::Add, l, r)
        });
        assert_eq!(out, Some(Value::from("1hello")));
    }

    #[test]
    fn test_string_typed_addition_chains() {
        let mut b = TreeBuilder::new();
        let event = b.parameter("event");
        let prefix = b.string("a");
        let x_ref = b.param_ref(event);
        let x = b.path(x_ref, "x");
        let y_ref = b.param_ref(event);
        let y = b.path(y_ref, "y");
        let first = b.binary(BinaryOp::Add, prefix, x);
        let chain = b.binary(BinaryOp::Add, first, y);
        let sum_ref = b.param_ref(event);
        let sum_left = b.path(sum_ref, "n");
        let one = b.number(1.0);
        let sum = b.binary(BinaryOp::Add, sum_left, one);
        let items = b.array(vec![chain, sum]);
        let ret = b.ret(Some(items));
        let func = b.function(vec![event], vec![ret]);
        let tree = b.finish(func).expect("tree should be well formed");
        let externals = Externals::new();
        let eval = Evaluator::new(&tree, &externals);

        assert!(eval.is_string_typed(first));
        assert!(eval.is_string_typed(chain));
        assert!(!eval.is_string_typed(sum));
        assert!(!eval.is_string_typed(x));
        assert_eq!(eval.concat_operands(chain), vec![prefix, x, y]);
        assert_eq!(eval.concat_operands(sum), vec![sum]);
    }

    #[test]
    fn test_arithmetic_folds() {
        let out = fold(|b| {
            let one = b.number(1.0);
            let two = b.number(2.0);
            let sum = b.binary(BinaryOp::Add, one, two);
            let four = b.number(4.0);
            let product = b.binary(BinaryOp::Mul, sum, four);
            let two = b.number(2.0);
            b.binary(BinaryOp::Div, product, two)
        });
        assert_eq!(out, Some(Value::from(6.0)));
    }

    #[test]
    fn test_double_negation() {
        let out = fold(|b| {
            let five = b.number(5.0);
            let neg = b.unary(UnaryOp::Minus, five);
            b.unary(UnaryOp::Minus, neg)
        });
        assert_eq!(out, Some(Value::from(5.0)));
    }

    #[test]
    fn test_unary_not_is_not_evaluated() {
        let out = fold(|b| {
            let t = b.boolean(true);
            b.unary(UnaryOp::Not, t)
        });
        assert_eq!(out, None);
    }

    #[test]
    fn test_object_spread_merges() {
        let out = fold(|b| {
            let one = b.number(1.0);
            let inner = b.record(vec![("a", one)]);
            let spread = b.spread_assign(inner);
            let two = b.number(2.0);
            let field = b.prop_assign("b", two);
            b.object(vec![spread, field])
        });
        assert_eq!(out.map(|v| v.to_json()), Some(json!({"a": 1, "b": 2})));
    }

    #[test]
    fn test_object_spread_of_nullish_is_noop() {
        let out = fold(|b| {
            let null = b.null();
            let spread = b.spread_assign(null);
            let undefined = b.undefined();
            let spread2 = b.spread_assign(undefined);
            b.object(vec![spread, spread2])
        });
        assert_eq!(out.map(|v| v.to_json()), Some(json!({})));
    }

    #[test]
    fn test_object_spread_of_number_is_not_constant() {
        let out = fold(|b| {
            let n = b.number(1.0);
            let spread = b.spread_assign(n);
            b.object(vec![spread])
        });
        assert_eq!(out, None);
    }

    #[test]
    fn test_array_spread_flattens() {
        let out = fold(|b| {
            let one = b.number(1.0);
            let two = b.number(2.0);
            let inner = b.array(vec![one, two]);
            let spread = b.spread(inner);
            let three = b.number(3.0);
            b.array(vec![spread, three])
        });
        assert_eq!(out.map(|v| v.to_json()), Some(json!([1, 2, 3])));
    }

    #[test]
    fn test_array_with_runtime_element_is_not_constant() {
        let out = fold(|b| {
            let one = b.number(1.0);
            let free = b.identifier("x", None);
            b.array(vec![one, free])
        });
        assert_eq!(out, None);
    }

    #[test]
    fn test_template_folding() {
        let out = fold(|b| {
            let hi = b.string("hi?");
            let n = b.number(2.0);
            b.template("hello ", vec![(hi, " and ".to_string()), (n, "!".to_string())])
        });
        assert_eq!(out, Some(Value::from("hello hi? and 2!")));

        let out = fold(|b| {
            let hi = b.string("hi?");
            let free = b.identifier("x", None);
            b.template("hello ", vec![(hi, " ".to_string()), (free, "".to_string())])
        });
        assert_eq!(out, None);
    }

    #[test]
    fn test_computed_property_name() {
        let out = fold(|b| {
            let key = b.string("hi");
            let value = b.string("there");
            let prop = b.computed_assign(key, value);
            b.object(vec![prop])
        });
        assert_eq!(out.map(|v| v.to_json()), Some(json!({"hi": "there"})));

        let out = fold(|b| {
            let key = b.boolean(true);
            let value = b.string("there");
            let prop = b.computed_assign(key, value);
            b.object(vec![prop])
        });
        assert_eq!(out, None);
    }

    #[test]
    fn test_property_access_and_missing_key() {
        let out = fold(|b| {
            let hi = b.string("hi");
            let obj = b.record(vec![("value", hi)]);
            b.prop(obj, "value")
        });
        assert_eq!(out, Some(Value::from("hi")));

        let out = fold(|b| {
            let hi = b.string("hi");
            let obj = b.record(vec![("value", hi)]);
            b.prop(obj, "blah")
        });
        assert_eq!(out, None);
    }

    #[test]
    fn test_element_access_by_constant_index() {
        let out = fold(|b| {
            let hi = b.string("hi");
            let list = b.array(vec![hi]);
            let zero = b.number(0.0);
            b.element(list, zero)
        });
        assert_eq!(out, Some(Value::from("hi")));
    }

    #[test]
    fn test_undefined_is_a_constant() {
        let out = fold(|b| b.undefined());
        assert_eq!(out, Some(Value::Undefined));
        let out = fold(|b| b.null());
        assert_eq!(out, Some(Value::Null));
    }

    #[test]
    fn test_reference_dereferences_any_value() {
        let mut externals = Externals::new();
        externals.define("config", Value::from(json!({"arn": "arn:aws:states:1"})));
        externals.define(
            "handler",
            Value::Opaque(Handle::Closure {
                name: "handler".to_string(),
            }),
        );

        let out = fold_with(&externals, |b| {
            let config = b.reference("config");
            b.prop(config, "arn")
        });
        assert_eq!(out, Some(Value::from("arn:aws:states:1")));

        let out = fold_with(&externals, |b| b.reference("handler"));
        assert!(matches!(out, Some(Value::Opaque(Handle::Closure { .. }))));

        let out = fold_with(&externals, |b| b.reference("unknown"));
        assert_eq!(out, None);
    }

    #[test]
    fn test_const_declaration_folds_through_identifier() {
        let mut b = TreeBuilder::new();
        let hi = b.string("hi");
        let decl = b.declare(VariableKind::Const, "value", Some(hi));
        let use_site = b.var_ref(decl);
        let ret = b.ret(Some(use_site));
        let func = b.function(vec![], vec![decl, ret]);
        let tree = b.finish(func).expect("tree should be well formed");
        let externals = Externals::new();
        let evaluator = Evaluator::new(&tree, &externals);

        assert_eq!(evaluator.eval(use_site), Some(Constant::new(Value::from("hi"))));
    }

    #[test]
    fn test_let_declaration_does_not_fold() {
        let mut b = TreeBuilder::new();
        let hi = b.string("hi");
        let decl = b.declare(VariableKind::Let, "value", Some(hi));
        let use_site = b.var_ref(decl);
        let ret = b.ret(Some(use_site));
        let func = b.function(vec![], vec![decl, ret]);
        let tree = b.finish(func).expect("tree should be well formed");
        let externals = Externals::new();

        assert_eq!(Evaluator::new(&tree, &externals).eval(use_site), None);
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let mut b = TreeBuilder::new();
        let a = b.string("a");
        let n = b.number(1.5);
        let sum = b.binary(BinaryOp::Add, a, n);
        let list = b.array(vec![sum]);
        let tree = b.finish(list).expect("tree should be well formed");
        let externals = Externals::new();
        let evaluator = Evaluator::new(&tree, &externals);

        assert_eq!(evaluator.eval(list), evaluator.eval(list));
        assert_eq!(
            evaluator.eval(list).map(|c| c.into_value().to_json()),
            Some(json!(["a1.5"]))
        );
    }

    #[test]
    fn test_relational_operators_do_not_fold() {
        let out = fold(|b| {
            let one = b.number(1.0);
            let two = b.number(2.0);
            b.binary(BinaryOp::Lt, one, two)
        });
        assert_eq!(out, None);
    }
}
