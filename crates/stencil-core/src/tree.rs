//! Normalized expression tree.
//!
//! Nodes live in an arena ([`Tree`]) and are addressed by [`NodeId`]. Child
//! edges are owned by the parent's [`NodeKind`]; the parent edge is a plain
//! index kept only for upward scope queries. Trees are built once through
//! [`TreeBuilder`] and are immutable afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Index of a node inside its [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    #[serde(rename = "-")]
    Minus,
    #[serde(rename = "+")]
    Plus,
    #[serde(rename = "!")]
    Not,
    #[serde(rename = "~")]
    BitNot,
    #[serde(rename = "typeof")]
    TypeOf,
    #[serde(rename = "void")]
    Void,
}

impl UnaryOp {
    pub fn token(self) -> &'static str {
        match self {
            UnaryOp::Minus => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::TypeOf => "typeof",
            UnaryOp::Void => "void",
        }
    }
}

/// Closed set of binary operator tokens.
///
/// `===` and `!==` read as [`BinaryOp::Eq`] and [`BinaryOp::NotEq`]: none of
/// the target dialects distinguish strict from loose equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "%")]
    Mod,
    #[serde(rename = "**")]
    Exp,
    #[serde(rename = "==", alias = "===")]
    Eq,
    #[serde(rename = "!=", alias = "!==")]
    NotEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    LtEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    GtEq,
    #[serde(rename = "&&")]
    And,
    #[serde(rename = "||")]
    Or,
    #[serde(rename = "??")]
    Coalesce,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "instanceof")]
    InstanceOf,
    #[serde(rename = "&")]
    BitAnd,
    #[serde(rename = "|")]
    BitOr,
    #[serde(rename = "^")]
    BitXor,
    #[serde(rename = "<<")]
    Shl,
    #[serde(rename = ">>")]
    Shr,
    #[serde(rename = ">>>")]
    UShr,
    #[serde(rename = ",")]
    Comma,
}

impl BinaryOp {
    pub fn token(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Exp => "**",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Coalesce => "??",
            BinaryOp::In => "in",
            BinaryOp::InstanceOf => "instanceof",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::UShr => ">>>",
            BinaryOp::Comma => ",",
        }
    }

    /// `+ - * /`
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div
        )
    }

    /// `== != < <= > >=`
    pub fn is_relational(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    /// Mirror a directional comparison so its operands can be swapped.
    ///
    /// `<` ↔ `>`, `<=` ↔ `>=`; every other operator is returned unchanged.
    pub fn invert(self) -> BinaryOp {
        match self {
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::LtEq => BinaryOp::GtEq,
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::GtEq => BinaryOp::LtEq,
            other => other,
        }
    }
}

/// Resolved static binding of an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Points at a [`NodeKind::Parameter`].
    Parameter(NodeId),
    /// Points at a [`NodeKind::VariableDecl`].
    Variable(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    Const,
    Let,
    Var,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropName {
    Identifier(String),
    String(String),
    Number(f64),
    /// `[expr]: value`
    Computed(NodeId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSpan {
    pub expr: NodeId,
    /// Literal text following the interpolation.
    pub literal: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    // === Literals ===
    String(String),
    Number(f64),
    Boolean(bool),
    Null,
    Undefined,
    NoSubstitutionTemplate(String),

    // === Expressions ===
    Identifier {
        name: String,
        binding: Option<Binding>,
    },
    PropAccess {
        expr: NodeId,
        name: String,
    },
    ElementAccess {
        expr: NodeId,
        element: NodeId,
    },
    Call {
        callee: NodeId,
        args: Vec<NodeId>,
    },
    Array {
        items: Vec<NodeId>,
    },
    /// `...expr` inside an array literal or argument list.
    Spread {
        expr: NodeId,
    },
    Object {
        properties: Vec<NodeId>,
    },
    PropAssign {
        name: PropName,
        expr: NodeId,
    },
    /// `...expr` inside an object literal.
    SpreadAssign {
        expr: NodeId,
    },
    Template {
        head: String,
        spans: Vec<TemplateSpan>,
    },
    Unary {
        op: UnaryOp,
        expr: NodeId,
    },
    Binary {
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    },
    /// Late-bound handle into the compilation's external registry.
    Reference {
        name: String,
    },

    // === Declarations & statements ===
    Function {
        params: Vec<NodeId>,
        body: Vec<NodeId>,
    },
    Parameter {
        name: String,
    },
    VariableDecl {
        kind: VariableKind,
        name: String,
        init: Option<NodeId>,
    },
    Return {
        expr: Option<NodeId>,
    },
    ExprStmt {
        expr: NodeId,
    },
}

impl NodeKind {
    /// Diagnostic name of the node kind.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::String(_) => "StringLiteralExpr",
            NodeKind::Number(_) => "NumberLiteralExpr",
            NodeKind::Boolean(_) => "BooleanLiteralExpr",
            NodeKind::Null => "NullLiteralExpr",
            NodeKind::Undefined => "UndefinedLiteralExpr",
            NodeKind::NoSubstitutionTemplate(_) => "NoSubstitutionTemplateLiteral",
            NodeKind::Identifier { .. } => "Identifier",
            NodeKind::PropAccess { .. } => "PropAccessExpr",
            NodeKind::ElementAccess { .. } => "ElementAccessExpr",
            NodeKind::Call { .. } => "CallExpr",
            NodeKind::Array { .. } => "ArrayLiteralExpr",
            NodeKind::Spread { .. } => "SpreadElementExpr",
            NodeKind::Object { .. } => "ObjectLiteralExpr",
            NodeKind::PropAssign { .. } => "PropAssignExpr",
            NodeKind::SpreadAssign { .. } => "SpreadAssignExpr",
            NodeKind::Template { .. } => "TemplateExpr",
            NodeKind::Unary { .. } => "UnaryExpr",
            NodeKind::Binary { .. } => "BinaryExpr",
            NodeKind::Reference { .. } => "ReferenceExpr",
            NodeKind::Function { .. } => "FunctionExpr",
            NodeKind::Parameter { .. } => "ParameterDecl",
            NodeKind::VariableDecl { .. } => "VariableStmt",
            NodeKind::Return { .. } => "ReturnStmt",
            NodeKind::ExprStmt { .. } => "ExprStmt",
        }
    }

    /// Owned child edges, in source order.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            NodeKind::String(_)
            | NodeKind::Number(_)
            | NodeKind::Boolean(_)
            | NodeKind::Null
            | NodeKind::Undefined
            | NodeKind::NoSubstitutionTemplate(_)
            | NodeKind::Identifier { .. }
            | NodeKind::Reference { .. }
            | NodeKind::Parameter { .. } => Vec::new(),
            NodeKind::PropAccess { expr, .. }
            | NodeKind::Spread { expr }
            | NodeKind::SpreadAssign { expr }
            | NodeKind::Unary { expr, .. }
            | NodeKind::ExprStmt { expr } => vec![*expr],
            NodeKind::ElementAccess { expr, element } => vec![*expr, *element],
            NodeKind::Call { callee, args } => {
                let mut out = Vec::with_capacity(args.len() + 1);
                out.push(*callee);
                out.extend(args.iter().copied());
                out
            }
            NodeKind::Array { items } => items.clone(),
            NodeKind::Object { properties } => properties.clone(),
            NodeKind::PropAssign { name, expr } => match name {
                PropName::Computed(key) => vec![*key, *expr],
                _ => vec![*expr],
            },
            NodeKind::Template { spans, .. } => spans.iter().map(|s| s.expr).collect(),
            NodeKind::Binary { left, right, .. } => vec![*left, *right],
            NodeKind::Function { params, body } => {
                params.iter().chain(body.iter()).copied().collect()
            }
            NodeKind::VariableDecl { init, .. } => init.iter().copied().collect(),
            NodeKind::Return { expr } => expr.iter().copied().collect(),
        }
    }

    fn binding(&self) -> Option<Binding> {
        match self {
            NodeKind::Identifier { binding, .. } => *binding,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
}

impl Node {
    #[inline]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

/// Borrowed view of a [`NodeKind::Function`].
#[derive(Debug, Clone, Copy)]
pub struct FunctionView<'a> {
    pub id: NodeId,
    pub params: &'a [NodeId],
    pub body: &'a [NodeId],
}

/// Structural violations caught while building or reading a tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("node {0} does not exist")]
    DanglingNode(NodeId),
    #[error("node {child} is referenced by {parent} before it was created")]
    ForwardChild { parent: NodeId, child: NodeId },
    #[error("node {0} has more than one parent")]
    MultipleParents(NodeId),
    #[error("node {0} is not reachable from the root")]
    Detached(NodeId),
    #[error("identifier {0} is bound to a node that is not a parameter or declaration")]
    InvalidBinding(NodeId),
    #[error("malformed document: {0}")]
    Malformed(String),
}

/// Immutable arena of nodes.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Tree {
    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    #[inline]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    /// Walk parent edges from `id` (exclusive) to the root (inclusive).
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |p| self.parent(*p))
    }

    /// Nearest function node containing `id`.
    pub fn enclosing_function(&self, id: NodeId) -> Option<NodeId> {
        self.ancestors(id)
            .find(|a| matches!(self.kind(*a), NodeKind::Function { .. }))
    }

    /// True when `id` is not nested inside a function other than the root.
    pub fn is_in_top_level_scope(&self, id: NodeId) -> bool {
        match self.enclosing_function(id) {
            None => true,
            Some(func) => self.parent(func).is_none(),
        }
    }

    pub fn function(&self, id: NodeId) -> Option<FunctionView<'_>> {
        match self.kind(id) {
            NodeKind::Function { params, body } => Some(FunctionView {
                id,
                params,
                body,
            }),
            _ => None,
        }
    }

    /// Position of a parameter within its function's parameter list.
    pub fn parameter_index(&self, param: NodeId) -> Option<usize> {
        let func = self.function(self.parent(param)?)?;
        func.params.iter().position(|p| *p == param)
    }

    /// First top-level `return` statement of a function body.
    pub fn find_return(&self, function: NodeId) -> Option<NodeId> {
        self.function(function)?
            .body
            .iter()
            .copied()
            .find(|stmt| matches!(self.kind(*stmt), NodeKind::Return { .. }))
    }
}

/// Append-only builder; parents are linked and checked in [`TreeBuilder::finish`].
#[derive(Debug, Default)]
pub struct TreeBuilder {
    nodes: Vec<NodeKind>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(kind);
        id
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(id.index())
    }

    pub fn string(&mut self, value: impl Into<String>) -> NodeId {
        self.push(NodeKind::String(value.into()))
    }

    pub fn number(&mut self, value: f64) -> NodeId {
        self.push(NodeKind::Number(value))
    }

    pub fn boolean(&mut self, value: bool) -> NodeId {
        self.push(NodeKind::Boolean(value))
    }

    pub fn null(&mut self) -> NodeId {
        self.push(NodeKind::Null)
    }

    pub fn undefined(&mut self) -> NodeId {
        self.push(NodeKind::Undefined)
    }

    pub fn identifier(&mut self, name: impl Into<String>, binding: Option<Binding>) -> NodeId {
        self.push(NodeKind::Identifier {
            name: name.into(),
            binding,
        })
    }

    pub fn prop(&mut self, expr: NodeId, name: impl Into<String>) -> NodeId {
        self.push(NodeKind::PropAccess {
            expr,
            name: name.into(),
        })
    }

    /// `base.a.b.c` from a dotted suffix.
    pub fn path(&mut self, base: NodeId, dotted: &str) -> NodeId {
        dotted
            .split('.')
            .filter(|s| !s.is_empty())
            .fold(base, |expr, name| self.prop(expr, name))
    }

    pub fn element(&mut self, expr: NodeId, element: NodeId) -> NodeId {
        self.push(NodeKind::ElementAccess { expr, element })
    }

    pub fn call(&mut self, callee: NodeId, args: Vec<NodeId>) -> NodeId {
        self.push(NodeKind::Call { callee, args })
    }

    pub fn array(&mut self, items: Vec<NodeId>) -> NodeId {
        self.push(NodeKind::Array { items })
    }

    pub fn spread(&mut self, expr: NodeId) -> NodeId {
        self.push(NodeKind::Spread { expr })
    }

    pub fn object(&mut self, properties: Vec<NodeId>) -> NodeId {
        self.push(NodeKind::Object { properties })
    }

    pub fn prop_assign(&mut self, name: impl Into<String>, expr: NodeId) -> NodeId {
        self.push(NodeKind::PropAssign {
            name: PropName::Identifier(name.into()),
            expr,
        })
    }

    pub fn computed_assign(&mut self, key: NodeId, expr: NodeId) -> NodeId {
        self.push(NodeKind::PropAssign {
            name: PropName::Computed(key),
            expr,
        })
    }

    pub fn spread_assign(&mut self, expr: NodeId) -> NodeId {
        self.push(NodeKind::SpreadAssign { expr })
    }

    /// Object literal from `(name, value)` pairs.
    pub fn record(&mut self, fields: Vec<(&str, NodeId)>) -> NodeId {
        let properties = fields
            .into_iter()
            .map(|(name, expr)| self.prop_assign(name, expr))
            .collect();
        self.object(properties)
    }

    pub fn template(&mut self, head: impl Into<String>, spans: Vec<(NodeId, String)>) -> NodeId {
        self.push(NodeKind::Template {
            head: head.into(),
            spans: spans
                .into_iter()
                .map(|(expr, literal)| TemplateSpan { expr, literal })
                .collect(),
        })
    }

    pub fn unary(&mut self, op: UnaryOp, expr: NodeId) -> NodeId {
        self.push(NodeKind::Unary { op, expr })
    }

    pub fn binary(&mut self, op: BinaryOp, left: NodeId, right: NodeId) -> NodeId {
        self.push(NodeKind::Binary { op, left, right })
    }

    pub fn reference(&mut self, name: impl Into<String>) -> NodeId {
        self.push(NodeKind::Reference { name: name.into() })
    }

    pub fn parameter(&mut self, name: impl Into<String>) -> NodeId {
        self.push(NodeKind::Parameter { name: name.into() })
    }

    /// Identifier bound to `param`.
    pub fn param_ref(&mut self, param: NodeId) -> NodeId {
        let name = match self.kind(param) {
            Some(NodeKind::Parameter { name }) => name.clone(),
            _ => String::new(),
        };
        self.identifier(name, Some(Binding::Parameter(param)))
    }

    pub fn declare(&mut self, kind: VariableKind, name: impl Into<String>, init: Option<NodeId>) -> NodeId {
        self.push(NodeKind::VariableDecl {
            kind,
            name: name.into(),
            init,
        })
    }

    /// Identifier bound to `decl`.
    pub fn var_ref(&mut self, decl: NodeId) -> NodeId {
        let name = match self.kind(decl) {
            Some(NodeKind::VariableDecl { name, .. }) => name.clone(),
            _ => String::new(),
        };
        self.identifier(name, Some(Binding::Variable(decl)))
    }

    pub fn ret(&mut self, expr: Option<NodeId>) -> NodeId {
        self.push(NodeKind::Return { expr })
    }

    pub fn expr_stmt(&mut self, expr: NodeId) -> NodeId {
        self.push(NodeKind::ExprStmt { expr })
    }

    pub fn function(&mut self, params: Vec<NodeId>, body: Vec<NodeId>) -> NodeId {
        self.push(NodeKind::Function { params, body })
    }

    /// Link parent edges and check the single-tree invariants.
    ///
    /// Children must be created before their parent, which keeps the parent
    /// graph acyclic by construction.
    pub fn finish(self, root: NodeId) -> Result<Tree, TreeError> {
        let len = self.nodes.len();
        if root.index() >= len {
            return Err(TreeError::DanglingNode(root));
        }

        let mut parents: Vec<Option<NodeId>> = vec![None; len];
        for (index, kind) in self.nodes.iter().enumerate() {
            let parent = NodeId(index as u32);
            for child in kind.children() {
                if child.index() >= len {
                    return Err(TreeError::DanglingNode(child));
                }
                if child.index() >= index {
                    return Err(TreeError::ForwardChild { parent, child });
                }
                if parents[child.index()].is_some() || child == root {
                    return Err(TreeError::MultipleParents(child));
                }
                parents[child.index()] = Some(parent);
            }
        }

        for (index, kind) in self.nodes.iter().enumerate() {
            let id = NodeId(index as u32);
            if id != root && parents[index].is_none() {
                return Err(TreeError::Detached(id));
            }
            match kind.binding() {
                Some(Binding::Parameter(target)) => {
                    if !matches!(self.nodes.get(target.index()), Some(NodeKind::Parameter { .. })) {
                        return Err(TreeError::InvalidBinding(id));
                    }
                }
                Some(Binding::Variable(target)) => {
                    if !matches!(
                        self.nodes.get(target.index()),
                        Some(NodeKind::VariableDecl { .. })
                    ) {
                        return Err(TreeError::InvalidBinding(id));
                    }
                }
                None => {}
            }
        }

        let nodes = self
            .nodes
            .into_iter()
            .zip(parents)
            .map(|(kind, parent)| Node { kind, parent })
            .collect();
        Ok(Tree { nodes, root })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_links_parents() {
        let mut b = TreeBuilder::new();
        let event = b.parameter("event");
        let event_ref = b.param_ref(event);
        let access = b.path(event_ref, "detail.value");
        let ret = b.ret(Some(access));
        let func = b.function(vec![event], vec![ret]);
        let tree = b.finish(func).expect("tree should link");

        assert_eq!(tree.root(), func);
        assert_eq!(tree.parent(ret), Some(func));
        assert_eq!(tree.parent(event), Some(func));
        assert_eq!(tree.parent(access), Some(ret));
        assert_eq!(tree.enclosing_function(event_ref), Some(func));
        assert_eq!(tree.parameter_index(event), Some(0));
        assert_eq!(tree.find_return(func), Some(ret));
        assert!(tree.is_in_top_level_scope(access));
        assert_eq!(tree.ancestors(event_ref).last(), Some(func));
    }

    #[test]
    fn test_finish_rejects_shared_child() {
        let mut b = TreeBuilder::new();
        let one = b.number(1.0);
        let left = b.array(vec![one]);
        let right = b.array(vec![one]);
        let root = b.array(vec![left, right]);
        assert_eq!(b.finish(root).unwrap_err(), TreeError::MultipleParents(one));
    }

    #[test]
    fn test_finish_rejects_detached_node() {
        let mut b = TreeBuilder::new();
        let orphan = b.number(1.0);
        let root = b.null();
        assert_eq!(b.finish(root).unwrap_err(), TreeError::Detached(orphan));
    }

    #[test]
    fn test_finish_rejects_bad_binding() {
        let mut b = TreeBuilder::new();
        let lit = b.number(1.0);
        let ident = b.identifier("x", Some(Binding::Variable(lit)));
        let root = b.array(vec![lit, ident]);
        assert_eq!(b.finish(root).unwrap_err(), TreeError::InvalidBinding(ident));
    }

    #[test]
    fn test_nested_function_is_not_top_level() {
        let mut b = TreeBuilder::new();
        let one = b.number(1.0);
        let inner_ret = b.ret(Some(one));
        let inner = b.function(vec![], vec![inner_ret]);
        let stmt = b.expr_stmt(inner);
        let outer = b.function(vec![], vec![stmt]);
        let tree = b.finish(outer).expect("tree should link");

        assert!(!tree.is_in_top_level_scope(one));
        assert!(tree.is_in_top_level_scope(inner));
    }

    #[test]
    fn test_binary_op_classification() {
        assert!(BinaryOp::Add.is_arithmetic());
        assert!(!BinaryOp::Mod.is_arithmetic());
        assert!(BinaryOp::GtEq.is_relational());
        assert!(!BinaryOp::And.is_relational());
        assert_eq!(BinaryOp::Lt.invert(), BinaryOp::Gt);
        assert_eq!(BinaryOp::Eq.invert(), BinaryOp::Eq);
        let parsed: BinaryOp = serde_json::from_str("\"===\"").expect("alias should parse");
        assert_eq!(parsed, BinaryOp::Eq);
    }
}
