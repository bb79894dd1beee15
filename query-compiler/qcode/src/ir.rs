//! The normalized query IR.
//!
//! A [`Select`] describes one selection-set level bound to one table scope;
//! the SQL backend walks the tree read-only. Nodes are constructed by the
//! compiler and never mutated afterwards.

use indexmap::IndexMap;

use crate::graph::Node;

/// The compiled form of one operation. Mutations and subscriptions are
/// reserved and currently lower to an empty `QCode`; `query` is also absent
/// when every top-level field was blacklisted.
#[derive(Debug, Default)]
pub struct QCode {
    pub query: Option<Query>,
}

#[derive(Debug)]
pub struct Query {
    pub select: Select,
}

#[derive(Debug)]
pub struct Select {
    /// Unique within one `QCode`; disambiguates alias names in emitted SQL.
    pub id: u16,
    /// Pluralized field name, or the configured remapping of it.
    pub table: String,
    pub singular: String,
    /// JSON key in the output document: the GraphQL alias when given, the
    /// table name for list selects, the singular otherwise.
    pub field_name: String,
    /// Whether this level returns a JSON array or a single object.
    pub as_list: bool,
    pub cols: Vec<Column>,
    /// Recognized arguments by lowercased name, first occurrence wins.
    pub args: IndexMap<String, Node>,
    pub where_clause: Option<Exp>,
    pub order_by: Vec<OrderBy>,
    pub distinct_on: Vec<String>,
    pub paging: Paging,
    pub joins: Vec<Select>,
}

#[derive(Debug, Clone)]
pub struct Column {
    pub table: String,
    pub name: String,
    /// JSON key in the output document (alias or field name).
    pub field_name: String,
}

/// Validated numeric literals, kept in textual form for emission.
#[derive(Debug, Clone, Default)]
pub struct Paging {
    pub limit: Option<String>,
    pub offset: Option<String>,
}

/// One node of a filter expression tree.
#[derive(Debug, Clone)]
pub struct Exp {
    pub op: ExpOp,
    /// Column the terminal applies to; dotted path when `nested_col` is
    /// set, empty for `EqID`/`TsQuery` which bind to table metadata.
    pub col: String,
    pub nested_col: bool,
    pub ty: Option<ValType>,
    pub val: String,
    pub list_type: Option<ValType>,
    pub list_val: Vec<String>,
    pub children: Vec<Exp>,
}

impl Exp {
    pub(crate) fn new(op: ExpOp) -> Self {
        Exp {
            op,
            ..Default::default()
        }
    }

    pub(crate) fn and(left: Exp, right: Exp) -> Self {
        Exp {
            children: vec![left, right],
            ..Exp::new(ExpOp::And)
        }
    }
}

impl Default for Exp {
    fn default() -> Self {
        Exp {
            op: ExpOp::Nop,
            col: String::new(),
            nested_col: false,
            ty: None,
            val: String::new(),
            list_type: None,
            list_val: Vec::new(),
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpOp {
    Nop,
    And,
    Or,
    Not,
    Equals,
    NotEquals,
    GreaterOrEquals,
    LesserOrEquals,
    GreaterThan,
    LesserThan,
    In,
    NotIn,
    Like,
    NotLike,
    ILike,
    NotILike,
    Similar,
    NotSimilar,
    Contains,
    ContainedIn,
    HasKey,
    HasKeyAny,
    HasKeyAll,
    IsNull,
    EqID,
    TsQuery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValType {
    Str,
    Int,
    Float,
    Bool,
    List,
    Var,
}

#[derive(Debug, Clone)]
pub struct OrderBy {
    pub col: String,
    pub order: OrderDir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDir {
    Asc,
    Desc,
    AscNullsFirst,
    DescNullsFirst,
    AscNullsLast,
    DescNullsLast,
}
