//! The parsed-operation tree the compiler consumes, and the adapter that
//! lowers `async-graphql-parser` documents into it.
//!
//! Fields live in a flat arena and reference each other through dense ids,
//! so parent/child stitching during compilation is integer bookkeeping
//! rather than pointer chasing. Argument values keep their object-key names
//! on the nodes; the where-clause compiler derives column paths from them.
//!
//! Fragments (in any form) and documents with more than one operation are
//! rejected up front.

use async_graphql_parser::types::{
    DocumentOperations, ExecutableDocument, Field as GqlField, OperationDefinition, OperationType,
    Selection,
};
use async_graphql_parser::Positioned;
use async_graphql_value::Value;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

/// One parsed operation. `fields` is the arena of every field in the
/// selection tree; roots are the entries without a parent.
#[derive(Debug)]
pub struct Operation {
    pub kind: OperationKind,
    pub fields: Vec<Field>,
}

impl Operation {
    /// Ids of the top-level fields, in source order.
    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.fields
            .iter()
            .filter(|f| f.parent.is_none())
            .map(|f| f.id)
    }
}

#[derive(Debug)]
pub struct Field {
    pub id: usize,
    pub name: String,
    pub alias: Option<String>,
    pub args: Vec<Arg>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

#[derive(Debug)]
pub struct Arg {
    pub name: String,
    pub value: Node,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Str,
    Int,
    Float,
    Bool,
    Null,
    List,
    Obj,
    Var,
}

impl NodeKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            NodeKind::Str => "string",
            NodeKind::Int => "int",
            NodeKind::Float => "float",
            NodeKind::Bool => "boolean",
            NodeKind::Null => "null",
            NodeKind::List => "list",
            NodeKind::Obj => "object",
            NodeKind::Var => "variable",
        }
    }
}

/// One argument value node. Scalars carry their text in `val`; objects and
/// lists carry their members in `children`.
#[derive(Debug, Clone)]
pub struct Node {
    /// Object key that introduced this value; empty for list items and for
    /// the top of an argument value.
    pub name: String,
    pub kind: NodeKind,
    pub val: String,
    pub children: Vec<Node>,
}

impl Node {
    fn scalar(name: String, kind: NodeKind, val: String) -> Self {
        Node {
            name,
            kind,
            val,
            children: Vec::new(),
        }
    }
}

/// Parses a GraphQL document into an [`Operation`].
#[tracing::instrument(skip_all)]
pub fn parse_query(query: &str) -> Result<Operation> {
    let doc = async_graphql_parser::parse_query(query)
        .map_err(|err| Error::ParseRejected(err.to_string()))?;

    if !doc.fragments.is_empty() {
        return Err(Error::ParseRejected(
            "fragment definitions are not supported".into(),
        ));
    }

    convert_document(doc)
}

/// Parses one standalone argument-value fragment, e.g. a configured filter
/// such as `{ user_id: { eq: $user_id } }`, with the same grammar and value
/// lowering as query arguments.
pub fn parse_arg_value(fragment: &str) -> Result<Node> {
    let query = format!("query {{ f(v: {fragment}) {{ f }} }}");
    let doc = async_graphql_parser::parse_query(&query)
        .map_err(|err| Error::ParseRejected(err.to_string()))?;

    let op = match doc.operations {
        DocumentOperations::Single(op) => op.node,
        DocumentOperations::Multiple(_) => return Err(Error::UnexpectedNode),
    };

    let field = match op.selection_set.node.items.into_iter().next() {
        Some(item) => match item.node {
            Selection::Field(f) => f.node,
            _ => return Err(Error::UnexpectedNode),
        },
        None => return Err(Error::UnexpectedNode),
    };

    let (_, value) = field
        .arguments
        .into_iter()
        .next()
        .ok_or(Error::UnexpectedNode)?;

    convert_value(String::new(), value.node)
}

fn convert_document(doc: ExecutableDocument) -> Result<Operation> {
    let op = single_operation(doc.operations)?;

    let kind = match op.ty {
        OperationType::Query => OperationKind::Query,
        OperationType::Mutation => OperationKind::Mutation,
        OperationType::Subscription => OperationKind::Subscription,
    };

    let mut fields = Vec::new();
    let mut stack: Vec<(Option<usize>, Positioned<GqlField>)> = Vec::new();

    for item in op.selection_set.node.items.into_iter().rev() {
        stack.push((None, selection_field(item)?));
    }

    while let Some((parent, field)) = stack.pop() {
        let field = field.node;
        let id = fields.len();

        let args = field
            .arguments
            .into_iter()
            .map(|(name, value)| {
                Ok(Arg {
                    name: name.node.to_string(),
                    value: convert_value(String::new(), value.node)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        fields.push(Field {
            id,
            name: field.name.node.to_string(),
            alias: field.alias.map(|alias| alias.node.to_string()),
            args,
            parent,
            children: Vec::new(),
        });

        if let Some(parent) = parent {
            fields[parent].children.push(id);
        }

        for item in field.selection_set.node.items.into_iter().rev() {
            stack.push((Some(id), selection_field(item)?));
        }
    }

    Ok(Operation { kind, fields })
}

fn single_operation(operations: DocumentOperations) -> Result<OperationDefinition> {
    match operations {
        DocumentOperations::Single(op) => Ok(op.node),
        DocumentOperations::Multiple(ops) => {
            let mut ops = ops.into_iter();
            match (ops.next(), ops.next()) {
                (Some((_, op)), None) => Ok(op.node),
                _ => Err(Error::ParseRejected(
                    "documents must contain exactly one operation".into(),
                )),
            }
        }
    }
}

fn selection_field(item: Positioned<Selection>) -> Result<Positioned<GqlField>> {
    match item.node {
        Selection::Field(field) => Ok(field),
        Selection::FragmentSpread(_) | Selection::InlineFragment(_) => Err(Error::ParseRejected(
            "fragments are not supported".into(),
        )),
    }
}

fn convert_value(name: String, value: Value) -> Result<Node> {
    let node = match value {
        Value::Variable(var) => Node::scalar(name, NodeKind::Var, var.to_string()),
        Value::Number(num) => {
            if num.is_f64() {
                Node::scalar(name, NodeKind::Float, num.to_string())
            } else {
                Node::scalar(name, NodeKind::Int, num.to_string())
            }
        }
        Value::String(s) => Node::scalar(name, NodeKind::Str, s),
        Value::Boolean(b) => Node::scalar(name, NodeKind::Bool, b.to_string()),
        Value::Null => Node::scalar(name, NodeKind::Null, String::new()),
        // Enum literals such as order directions lower to plain strings.
        Value::Enum(e) => Node::scalar(name, NodeKind::Str, e.to_string()),
        Value::List(items) => Node {
            name,
            kind: NodeKind::List,
            val: String::new(),
            children: items
                .into_iter()
                .map(|item| convert_value(String::new(), item))
                .collect::<Result<_>>()?,
        },
        Value::Object(members) => Node {
            name,
            kind: NodeKind::Obj,
            val: String::new(),
            children: members
                .into_iter()
                .map(|(key, value)| convert_value(key.to_string(), value))
                .collect::<Result<_>>()?,
        },
        Value::Binary(_) => return Err(Error::UnsupportedValueKind("binary")),
    };

    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_selections_into_a_dense_arena() {
        let op = parse_query("{ posts { id title user { id name } } }").unwrap();

        assert_eq!(op.kind, OperationKind::Query);
        assert_eq!(op.fields.len(), 6);
        assert_eq!(op.roots().collect::<Vec<_>>(), vec![0]);

        let root = &op.fields[0];
        assert_eq!(root.name, "posts");
        assert_eq!(root.parent, None);

        let names: Vec<&str> = root
            .children
            .iter()
            .map(|&id| op.fields[id].name.as_str())
            .collect();
        assert_eq!(names, vec!["id", "title", "user"]);

        let user = &op.fields[root.children[2]];
        assert_eq!(user.parent, Some(0));
        assert_eq!(user.children.len(), 2);
    }

    #[test]
    fn keeps_argument_and_object_key_order() {
        let op = parse_query(r#"{ users(order_by: { b: asc, a: desc }, limit: 5) { id } }"#)
            .unwrap();

        let root = &op.fields[0];
        assert_eq!(root.args[0].name, "order_by");
        assert_eq!(root.args[1].name, "limit");

        let keys: Vec<&str> = root.args[0]
            .value
            .children
            .iter()
            .map(|n| n.name.as_str())
            .collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn converts_scalar_kinds() {
        let op = parse_query(
            r#"{ users(where: { a: 1, b: 1.5, c: "x", d: true, e: $v, f: [1, 2], g: asc }) { id } }"#,
        )
        .unwrap();

        let obj = &op.fields[0].args[0].value;
        assert_eq!(obj.kind, NodeKind::Obj);

        let kinds: Vec<NodeKind> = obj.children.iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::Int,
                NodeKind::Float,
                NodeKind::Str,
                NodeKind::Bool,
                NodeKind::Var,
                NodeKind::List,
                NodeKind::Str,
            ]
        );
        assert_eq!(obj.children[4].val, "v");
        assert_eq!(obj.children[5].children[1].val, "2");
    }

    #[test]
    fn rejects_fragments() {
        let err = parse_query("{ users { ...f } } fragment f on users { id }").unwrap_err();
        assert!(matches!(err, Error::ParseRejected(_)));
    }

    #[test]
    fn rejects_multiple_operations() {
        let err = parse_query("query a { users { id } } query b { posts { id } }").unwrap_err();
        assert!(matches!(err, Error::ParseRejected(_)));
    }

    #[test]
    fn parses_filter_fragments() {
        let node = parse_arg_value("{ user_id: { eq: $user_id } }").unwrap();

        assert_eq!(node.kind, NodeKind::Obj);
        assert_eq!(node.children[0].name, "user_id");
        assert_eq!(node.children[0].children[0].name, "eq");
        assert_eq!(node.children[0].children[0].kind, NodeKind::Var);
    }
}
