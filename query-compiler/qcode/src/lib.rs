//! Lowers parsed GraphQL operations into a normalized query IR.
//!
//! The IR ([`QCode`]) is a selection tree annotated with table bindings,
//! filter expressions, ordering and pagination, ready for a SQL backend to
//! walk without touching GraphQL concepts again. Lowering applies the
//! configured access policy on the way: blacklisted fields are dropped and
//! configured filter fragments are merged into the root select's where
//! clause.
//!
//! Parsing itself is delegated to `async-graphql-parser`; the [`graph`]
//! module adapts its document tree into the flat operation tree the
//! compiler walks.

pub mod graph;

mod compiler;
mod ir;

pub use compiler::{Compiler, Config};
pub use ir::{
    Column, Exp, ExpOp, OrderBy, OrderDir, Paging, QCode, Query, Select, ValType,
};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The GraphQL front-end rejected the document.
    #[error("query parse error: {0}")]
    ParseRejected(String),

    /// The operation kind is outside the query/mutation/subscription set.
    #[error("unknown operation kind")]
    UnknownOperationKind,

    /// A malformed node turned up mid-traversal.
    #[error("unexpected node in operation tree")]
    UnexpectedNode,

    #[error(
        "order by directions must be one of asc, desc, asc_nulls_first, \
         desc_nulls_first, asc_nulls_last or desc_nulls_last, got '{0}'"
    )]
    InvalidOrderDirection(String),

    #[error("expecting an object")]
    ExpectedObject,

    #[error("expecting an integer")]
    ExpectedInteger,

    #[error("expecting a list of strings or just a string")]
    ExpectedListOrString,

    /// A terminal expression value was outside the scalar/list/variable set.
    #[error("valid values include string, int, float, boolean, list and variable, got {0}")]
    UnsupportedValueKind(&'static str),

    /// Reserved: unrecognized where-operators currently pass through as
    /// column path segments instead of failing.
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),
}
