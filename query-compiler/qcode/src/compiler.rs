//! Operation tree → IR lowering.
//!
//! Both walks here are driven by explicit work stacks so deeply nested
//! selections and filters cannot exhaust the call stack. Siblings are
//! pushed in reverse so they are processed, and later emitted, left to
//! right.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use inflector::Inflector;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::{self, Arg, Node, NodeKind, Operation, OperationKind};
use crate::ir::{Column, Exp, ExpOp, OrderBy, OrderDir, Paging, QCode, Query, Select, ValType};
use crate::{Error, Result};

/// Access policy applied during lowering, as the embedding service loads it
/// from configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Filter fragments applied to every root select, `and`-combined left
    /// to right.
    pub filter: Vec<String>,
    /// Per-table overrides for `filter`, keyed case-insensitively by table
    /// name.
    pub filter_map: HashMap<String, Vec<String>>,
    /// Field names dropped everywhere, case-insensitively.
    pub blacklist: Vec<String>,
}

pub struct Compiler {
    filter: Exp,
    filter_map: HashMap<String, Exp>,
    blacklist: HashSet<String>,
}

impl Compiler {
    /// Builds a compiler, parsing the configured filter fragments up front.
    pub fn new(config: Config) -> Result<Self> {
        let blacklist = config
            .blacklist
            .iter()
            .map(|name| name.to_lowercase())
            .collect();

        let filter = compile_filter(&config.filter)?;

        let mut filter_map = HashMap::with_capacity(config.filter_map.len());
        for (table, fragments) in &config.filter_map {
            filter_map.insert(table.to_lowercase(), compile_filter(fragments)?);
        }

        Ok(Compiler {
            filter,
            filter_map,
            blacklist,
        })
    }

    /// Parses and lowers one query document.
    #[tracing::instrument(skip_all)]
    pub fn compile_query(&self, query: &str) -> Result<QCode> {
        let op = graph::parse_query(query)?;
        self.compile_operation(&op)
    }

    /// Lowers an already parsed operation. Mutations and subscriptions are
    /// reserved and produce an empty `QCode`.
    pub fn compile_operation(&self, op: &Operation) -> Result<QCode> {
        match op.kind {
            OperationKind::Query => Ok(QCode {
                query: self.compile_op_query(op)?,
            }),
            OperationKind::Mutation | OperationKind::Subscription => Ok(QCode::default()),
        }
    }

    fn compile_op_query(&self, op: &Operation) -> Result<Option<Query>> {
        // Selects are built into an arena and stitched into a tree at the
        // end; `fs` maps field ids to arena slots the way the walk maps
        // parents to children.
        let mut arena: Vec<Option<Select>> = Vec::new();
        let mut parent_of: Vec<Option<usize>> = Vec::new();
        let mut fs: Vec<Option<usize>> = vec![None; op.fields.len()];
        let mut root: Option<usize> = None;
        let mut next_id: u16 = 0;

        let mut stack: Vec<usize> = op.roots().collect();
        stack.reverse();

        while let Some(fid) = stack.pop() {
            let field = &op.fields[fid];

            let name = field.name.to_lowercase();
            if self.blacklist.contains(&name) {
                continue;
            }

            let table = name.to_plural();
            let as_list = name == table;
            let singular = if as_list { name.to_singular() } else { name };

            let field_name = match &field.alias {
                Some(alias) if !alias.is_empty() => alias.clone(),
                _ if as_list => table.clone(),
                _ => singular.clone(),
            };

            let mut sel = Select {
                id: next_id,
                table,
                singular,
                field_name,
                as_list,
                cols: Vec::new(),
                args: IndexMap::new(),
                where_clause: None,
                order_by: Vec::new(),
                distinct_on: Vec::new(),
                paging: Paging {
                    limit: (!as_list).then(|| "1".to_string()),
                    offset: None,
                },
                joins: Vec::new(),
            };
            next_id += 1;

            self.compile_args(&mut sel, &field.args)?;

            let mut nested = Vec::new();
            for &cid in &field.children {
                let child = &op.fields[cid];
                let child_name = child.name.to_lowercase();

                if self.blacklist.contains(&child_name) {
                    continue;
                }

                if child.children.is_empty() {
                    sel.cols.push(Column {
                        table: String::new(),
                        name: child_name,
                        field_name: match &child.alias {
                            Some(alias) if !alias.is_empty() => alias.clone(),
                            _ => child.name.clone(),
                        },
                    });
                } else {
                    nested.push(cid);
                }
            }
            for &cid in nested.iter().rev() {
                stack.push(cid);
            }

            let slot = arena.len();
            fs[fid] = Some(slot);
            arena.push(Some(sel));

            match field.parent.and_then(|pid| fs[pid]) {
                Some(parent_slot) => parent_of.push(Some(parent_slot)),
                None => {
                    parent_of.push(None);
                    if root.is_none() {
                        root = Some(slot);
                    }
                }
            }
        }

        let Some(root) = root else {
            debug!("every top-level field was dropped by the blacklist");
            return Ok(None);
        };

        // Stitch children into parents. Children always sit at higher slots
        // than their parent, so a reverse sweep completes each subtree
        // before moving it; the attach order is descending and gets
        // reversed once per node.
        for slot in (0..arena.len()).rev() {
            if let Some(sel) = arena[slot].as_mut() {
                sel.joins.reverse();
            }
            if let Some(parent_slot) = parent_of[slot] {
                if let Some(child) = arena[slot].take() {
                    if let Some(parent) = arena[parent_slot].as_mut() {
                        parent.joins.push(child);
                    }
                }
            }
        }

        let mut select = arena[root].take().ok_or(Error::UnexpectedNode)?;

        let filter = self
            .filter_map
            .get(&select.table)
            .unwrap_or(&self.filter);

        if filter.op != ExpOp::Nop {
            select.where_clause = Some(match select.where_clause.take() {
                Some(where_clause) => Exp::and(filter.clone(), where_clause),
                None => filter.clone(),
            });
        }

        Ok(Some(Query { select }))
    }

    fn compile_args(&self, sel: &mut Select, args: &[Arg]) -> Result<()> {
        sel.args = IndexMap::with_capacity(args.len());

        for arg in args {
            let name = arg.name.to_lowercase();
            if sel.args.contains_key(&name) {
                continue;
            }

            match name.as_str() {
                "id" => {
                    if sel.id == 0 {
                        compile_arg_id(sel, arg)?;
                    }
                }
                "search" => compile_arg_search(sel, arg),
                "where" => self.compile_arg_where(sel, arg)?,
                "orderby" | "order_by" | "order" => self.compile_arg_order_by(sel, arg)?,
                "distinct_on" | "distinct" => self.compile_arg_distinct_on(sel, arg)?,
                "limit" => compile_arg_limit(sel, arg)?,
                "offset" => compile_arg_offset(sel, arg)?,
                _ => {}
            }

            sel.args.insert(name, arg.value.clone());
        }

        Ok(())
    }

    fn compile_arg_where(&self, sel: &mut Select, arg: &Arg) -> Result<()> {
        if arg.value.kind != NodeKind::Obj {
            return Err(Error::ExpectedObject);
        }

        if let Some(exp) = compile_arg_node(&self.blacklist, &arg.value)? {
            and_into_where(sel, exp);
        }

        Ok(())
    }

    fn compile_arg_order_by(&self, sel: &mut Select, arg: &Arg) -> Result<()> {
        if arg.value.kind != NodeKind::Obj {
            return Err(Error::ExpectedObject);
        }

        // Entries carry the names of their object ancestors; a leaf's
        // column is the dotted join of that path plus its own name.
        let mut stack: Vec<(&Node, Vec<String>)> = Vec::new();
        for child in arg.value.children.iter().rev() {
            stack.push((child, Vec::new()));
        }

        while let Some((node, path)) = stack.pop() {
            if self.blacklist.contains(&node.name.to_lowercase()) {
                continue;
            }

            if node.kind == NodeKind::Obj {
                let mut path = path;
                if !node.name.is_empty() {
                    path.push(node.name.to_lowercase());
                }
                for child in node.children.iter().rev() {
                    stack.push((child, path.clone()));
                }
                continue;
            }

            let order = match node.val.to_lowercase().as_str() {
                "asc" => OrderDir::Asc,
                "desc" => OrderDir::Desc,
                "asc_nulls_first" => OrderDir::AscNullsFirst,
                "desc_nulls_first" => OrderDir::DescNullsFirst,
                "asc_nulls_last" => OrderDir::AscNullsLast,
                "desc_nulls_last" => OrderDir::DescNullsLast,
                other => return Err(Error::InvalidOrderDirection(other.to_string())),
            };

            let mut segments = path;
            if !node.name.is_empty() {
                segments.push(node.name.to_lowercase());
            }

            sel.order_by.push(OrderBy {
                col: segments.join("."),
                order,
            });
        }

        Ok(())
    }

    fn compile_arg_distinct_on(&self, sel: &mut Select, arg: &Arg) -> Result<()> {
        let node = &arg.value;

        if self.blacklist.contains(&node.name.to_lowercase()) {
            return Ok(());
        }

        match node.kind {
            NodeKind::Str => sel.distinct_on.push(node.val.clone()),
            NodeKind::List => {
                for child in &node.children {
                    sel.distinct_on.push(child.val.clone());
                }
            }
            _ => return Err(Error::ExpectedListOrString),
        }

        Ok(())
    }
}

fn compile_arg_id(sel: &mut Select, arg: &Arg) -> Result<()> {
    if matches!(&sel.where_clause, Some(exp) if exp.op == ExpOp::EqID) {
        return Ok(());
    }

    let ty = match arg.value.kind {
        NodeKind::Str => ValType::Str,
        NodeKind::Int => ValType::Int,
        NodeKind::Float => ValType::Float,
        other => return Err(Error::UnsupportedValueKind(other.as_str())),
    };

    let mut exp = Exp::new(ExpOp::EqID);
    exp.ty = Some(ty);
    exp.val = arg.value.val.clone();

    sel.where_clause = Some(exp);
    Ok(())
}

fn compile_arg_search(sel: &mut Select, arg: &Arg) {
    let mut exp = Exp::new(ExpOp::TsQuery);
    exp.ty = Some(ValType::Str);
    exp.val = arg.value.val.clone();

    and_into_where(sel, exp);
}

fn compile_arg_limit(sel: &mut Select, arg: &Arg) -> Result<()> {
    if arg.value.kind != NodeKind::Int {
        return Err(Error::ExpectedInteger);
    }

    sel.paging.limit = Some(arg.value.val.clone());
    Ok(())
}

fn compile_arg_offset(sel: &mut Select, arg: &Arg) -> Result<()> {
    if arg.value.kind != NodeKind::Int {
        return Err(Error::ExpectedInteger);
    }

    sel.paging.offset = Some(arg.value.val.clone());
    Ok(())
}

/// The new fragment becomes the first child so filters read in the order
/// they were applied.
fn and_into_where(sel: &mut Select, exp: Exp) {
    sel.where_clause = Some(match sel.where_clause.take() {
        Some(where_clause) => Exp::and(exp, where_clause),
        None => exp,
    });
}

/// Compiles a `where`-style object into an expression tree.
///
/// Expressions are created into an arena as the stack walk reaches them and
/// stitched into a tree afterwards; nodes with unrecognized names promote
/// their children into their own slot and contribute a column path segment
/// instead.
fn compile_arg_node(blacklist: &HashSet<String>, val: &Node) -> Result<Option<Exp>> {
    let Some(first) = val.children.first() else {
        return Ok(None);
    };

    let mut arena: Vec<Option<Exp>> = Vec::new();
    let mut parents: Vec<Option<usize>> = Vec::new();
    let mut root: Option<usize> = None;

    let mut stack: Vec<WhereEntry<'_>> = vec![WhereEntry {
        parent: None,
        node: first,
        path: Vec::new(),
    }];

    while let Some(entry) = stack.pop() {
        if !entry.node.name.is_empty() && blacklist.contains(&entry.node.name.to_lowercase()) {
            continue;
        }

        let Some(slot) = new_exp(&mut arena, &mut parents, &mut stack, &entry)? else {
            continue;
        };

        if entry.parent.is_none() && root.is_none() {
            root = Some(slot);
        }
    }

    // Children sit at higher slots than their parent; sweep from the end so
    // every subtree is complete before it moves into its parent.
    for slot in (0..arena.len()).rev() {
        if let Some(exp) = arena[slot].as_mut() {
            exp.children.reverse();
        }
        if let Some(parent_slot) = parents[slot] {
            if let Some(child) = arena[slot].take() {
                if let Some(parent) = arena[parent_slot].as_mut() {
                    parent.children.push(child);
                }
            }
        }
    }

    Ok(root.and_then(|slot| arena[slot].take()))
}

struct WhereEntry<'a> {
    parent: Option<usize>,
    node: &'a Node,
    /// Lowercased names of the object ancestors, logical connectives
    /// excluded.
    path: Vec<String>,
}

fn new_exp<'a>(
    arena: &mut Vec<Option<Exp>>,
    parents: &mut Vec<Option<usize>>,
    stack: &mut Vec<WhereEntry<'a>>,
    entry: &WhereEntry<'a>,
) -> Result<Option<usize>> {
    let node = entry.node;

    if node.name.is_empty() {
        push_children(stack, entry.parent, node, &entry.path);
        return Ok(None);
    }

    let mut name = node.name.to_lowercase();
    if let Some(stripped) = name.strip_prefix('_') {
        name = stripped.to_string();
    }

    let op = match name.as_str() {
        "and" => ExpOp::And,
        "or" => ExpOp::Or,
        "not" => ExpOp::Not,
        "eq" | "equals" => ExpOp::Equals,
        "neq" | "not_equals" => ExpOp::NotEquals,
        "gt" | "greater_than" => ExpOp::GreaterThan,
        "lt" | "lesser_than" => ExpOp::LesserThan,
        "gte" | "greater_or_equals" => ExpOp::GreaterOrEquals,
        "lte" | "lesser_or_equals" => ExpOp::LesserOrEquals,
        "in" => ExpOp::In,
        "nin" | "not_in" => ExpOp::NotIn,
        "like" => ExpOp::Like,
        "nlike" | "not_like" => ExpOp::NotLike,
        "ilike" => ExpOp::ILike,
        "nilike" | "not_ilike" => ExpOp::NotILike,
        "similar" => ExpOp::Similar,
        "nsimilar" | "not_similar" => ExpOp::NotSimilar,
        "contains" => ExpOp::Contains,
        "contained_in" => ExpOp::ContainedIn,
        "has_key" => ExpOp::HasKey,
        "has_key_any" => ExpOp::HasKeyAny,
        "has_key_all" => ExpOp::HasKeyAll,
        "is_null" => ExpOp::IsNull,
        _ => {
            // Not an operator: a column path segment. Its children take
            // over this node's place in the tree.
            push_children(stack, entry.parent, node, &entry.path);
            return Ok(None);
        }
    };

    let mut exp = Exp::new(op);

    match op {
        ExpOp::And | ExpOp::Or | ExpOp::Not => {}
        ExpOp::In | ExpOp::NotIn => set_list_val(&mut exp, node),
        _ => exp.val = node.val.clone(),
    }

    if !matches!(op, ExpOp::And | ExpOp::Or | ExpOp::Not) {
        exp.ty = Some(value_type(node)?);
        set_where_col(&mut exp, &entry.path);
    }

    let slot = arena.len();
    arena.push(Some(exp));
    parents.push(entry.parent);

    match op {
        ExpOp::And | ExpOp::Or => push_children(stack, Some(slot), node, &entry.path),
        ExpOp::Not => {
            let child = node.children.first().ok_or(Error::UnexpectedNode)?;
            let mut path = entry.path.clone();
            extend_path(&mut path, node);
            stack.push(WhereEntry {
                parent: Some(slot),
                node: child,
                path,
            });
        }
        _ => {}
    }

    Ok(Some(slot))
}

fn push_children<'a>(
    stack: &mut Vec<WhereEntry<'a>>,
    parent: Option<usize>,
    node: &'a Node,
    path: &[String],
) {
    let mut path = path.to_vec();
    extend_path(&mut path, node);

    for child in node.children.iter().rev() {
        stack.push(WhereEntry {
            parent,
            node: child,
            path: path.clone(),
        });
    }
}

fn extend_path(path: &mut Vec<String>, node: &Node) {
    if node.kind != NodeKind::Obj || node.name.is_empty() {
        return;
    }

    let key = node.name.to_lowercase();
    if matches!(key.as_str(), "and" | "or" | "not" | "_and" | "_or" | "_not") {
        return;
    }

    path.push(key);
}

/// A single path segment is the column name; three or more segments form a
/// dotted nested path. Two segments leave the column empty.
fn set_where_col(exp: &mut Exp, path: &[String]) {
    if path.len() == 1 {
        exp.col = path[0].clone();
    } else if path.len() > 2 {
        exp.col = path.join(".");
        exp.nested_col = true;
    }
}

fn set_list_val(exp: &mut Exp, node: &Node) {
    if let Some(first) = node.children.first() {
        exp.list_type = match first.kind {
            NodeKind::Str => Some(ValType::Str),
            NodeKind::Int => Some(ValType::Int),
            NodeKind::Bool => Some(ValType::Bool),
            NodeKind::Float => Some(ValType::Float),
            _ => None,
        };
    }

    for child in &node.children {
        exp.list_val.push(child.val.clone());
    }
}

fn value_type(node: &Node) -> Result<ValType> {
    match node.kind {
        NodeKind::Str => Ok(ValType::Str),
        NodeKind::Int => Ok(ValType::Int),
        NodeKind::Float => Ok(ValType::Float),
        NodeKind::Bool => Ok(ValType::Bool),
        NodeKind::List => Ok(ValType::List),
        NodeKind::Var => Ok(ValType::Var),
        other => Err(Error::UnsupportedValueKind(other.as_str())),
    }
}

/// Fragments are parsed with the regular argument grammar and combined
/// left to right. The blacklist does not apply to configured filters.
fn compile_filter(fragments: &[String]) -> Result<Exp> {
    if fragments.is_empty() {
        return Ok(Exp::default());
    }

    let no_blacklist = HashSet::new();
    let mut filter: Option<Exp> = None;

    for fragment in fragments {
        let node = graph::parse_arg_value(fragment)?;
        let Some(exp) = compile_arg_node(&no_blacklist, &node)? else {
            continue;
        };

        filter = Some(match filter {
            Some(acc) => Exp::and(acc, exp),
            None => exp,
        });
    }

    Ok(filter.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiler() -> Compiler {
        Compiler::new(Config::default()).unwrap()
    }

    fn compile(query: &str) -> Select {
        compiler()
            .compile_query(query)
            .unwrap()
            .query
            .unwrap()
            .select
    }

    #[test]
    fn list_select_shape() {
        let sel = compile("{ users { id name } }");

        assert_eq!(sel.id, 0);
        assert_eq!(sel.table, "users");
        assert_eq!(sel.singular, "user");
        assert_eq!(sel.field_name, "users");
        assert!(sel.as_list);
        assert_eq!(sel.paging.limit, None);

        let cols: Vec<(&str, &str)> = sel
            .cols
            .iter()
            .map(|c| (c.name.as_str(), c.field_name.as_str()))
            .collect();
        assert_eq!(cols, vec![("id", "id"), ("name", "name")]);
    }

    #[test]
    fn singular_select_gets_limit_one() {
        let sel = compile("{ user { id } }");

        assert_eq!(sel.table, "users");
        assert_eq!(sel.singular, "user");
        assert_eq!(sel.field_name, "user");
        assert!(!sel.as_list);
        assert_eq!(sel.paging.limit.as_deref(), Some("1"));
    }

    #[test]
    fn irregular_plurals() {
        let sel = compile("{ categories { id } }");
        assert_eq!(sel.table, "categories");
        assert_eq!(sel.singular, "category");
        assert!(sel.as_list);

        let sel = compile("{ category { id } }");
        assert_eq!(sel.table, "categories");
        assert!(!sel.as_list);
    }

    #[test]
    fn alias_becomes_field_name() {
        let sel = compile("{ people: users { id, nick: name } }");

        assert_eq!(sel.field_name, "people");
        assert_eq!(sel.cols[1].name, "name");
        assert_eq!(sel.cols[1].field_name, "nick");
    }

    #[test]
    fn nested_fields_become_joins_in_order() {
        let sel = compile("{ posts { id user { id } comments { id } } }");

        assert_eq!(sel.cols.len(), 1);
        assert_eq!(sel.joins.len(), 2);
        assert_eq!(sel.joins[0].table, "users");
        assert_eq!(sel.joins[0].id, 1);
        assert_eq!(sel.joins[1].table, "comments");
        assert_eq!(sel.joins[1].id, 2);
        assert!(!sel.joins[0].as_list);
        assert!(sel.joins[1].as_list);
    }

    #[test]
    fn blacklisted_fields_are_dropped() {
        let compiler = Compiler::new(Config {
            blacklist: vec!["secret".into(), "Tokens".into()],
            ..Default::default()
        })
        .unwrap();

        let sel = compiler
            .compile_query("{ users { id secret tokens { id } } }")
            .unwrap()
            .query
            .unwrap()
            .select;

        assert_eq!(sel.cols.len(), 1);
        assert!(sel.joins.is_empty());
    }

    #[test]
    fn blacklisted_root_leaves_query_absent() {
        let compiler = Compiler::new(Config {
            blacklist: vec!["users".into()],
            ..Default::default()
        })
        .unwrap();

        let qc = compiler.compile_query("{ users { id } }").unwrap();
        assert!(qc.query.is_none());
    }

    #[test]
    fn mutations_compile_to_an_empty_qcode() {
        let qc = compiler()
            .compile_query("mutation { users { id } }")
            .unwrap();
        assert!(qc.query.is_none());
    }

    #[test]
    fn id_argument_on_root() {
        let sel = compile("{ user(id: 5) { id } }");

        let exp = sel.where_clause.unwrap();
        assert_eq!(exp.op, ExpOp::EqID);
        assert_eq!(exp.ty, Some(ValType::Int));
        assert_eq!(exp.val, "5");
    }

    #[test]
    fn id_argument_on_nested_select_is_ignored() {
        let sel = compile("{ posts { id user(id: 5) { id } } }");

        let user = &sel.joins[0];
        assert!(user.where_clause.is_none());
        assert!(user.args.contains_key("id"));
    }

    #[test]
    fn id_argument_rejects_non_scalar_values() {
        let err = compiler()
            .compile_query("{ user(id: [1]) { id } }")
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedValueKind("list")));
    }

    #[test]
    fn duplicate_arguments_after_the_first_are_ignored() {
        let sel = compile("{ users(limit: 5, limit: 9) { id } }");
        assert_eq!(sel.paging.limit.as_deref(), Some("5"));
    }

    #[test]
    fn unknown_arguments_are_recorded_but_ignored() {
        let sel = compile(r#"{ users(role: "admin") { id } }"#);

        assert!(sel.args.contains_key("role"));
        assert!(sel.where_clause.is_none());
    }

    #[test]
    fn limit_and_offset_must_be_integers() {
        let sel = compile("{ users(limit: 5, offset: 10) { id } }");
        assert_eq!(sel.paging.limit.as_deref(), Some("5"));
        assert_eq!(sel.paging.offset.as_deref(), Some("10"));

        let err = compiler()
            .compile_query(r#"{ users(limit: "5") { id } }"#)
            .unwrap_err();
        assert!(matches!(err, Error::ExpectedInteger));
    }

    #[test]
    fn search_combines_into_where() {
        let sel = compile(r#"{ posts(search: "rust", where: { id: { gt: 1 } }) { id } }"#);

        let exp = sel.where_clause.unwrap();
        assert_eq!(exp.op, ExpOp::And);
        assert_eq!(exp.children.len(), 2);
        // The later fragment wraps around the earlier one, newest first.
        assert_eq!(exp.children[0].op, ExpOp::GreaterThan);
        assert_eq!(exp.children[1].op, ExpOp::TsQuery);
        assert_eq!(exp.children[1].val, "rust");
    }

    #[test]
    fn where_comparison_operators() {
        let sel = compile(
            r#"{ users(where: { age: { gte: 18 } }) { id } }"#,
        );

        let exp = sel.where_clause.unwrap();
        assert_eq!(exp.op, ExpOp::GreaterOrEquals);
        assert_eq!(exp.col, "age");
        assert!(!exp.nested_col);
        assert_eq!(exp.ty, Some(ValType::Int));
        assert_eq!(exp.val, "18");
    }

    #[test]
    fn where_underscore_aliases_match() {
        let sel = compile(r#"{ users(where: { _not: { name: { _eq: "x" } } }) { id } }"#);

        let exp = sel.where_clause.unwrap();
        assert_eq!(exp.op, ExpOp::Not);
        assert_eq!(exp.children.len(), 1);
        assert_eq!(exp.children[0].op, ExpOp::Equals);
        assert_eq!(exp.children[0].col, "name");
    }

    #[test]
    fn where_logical_children_keep_source_order() {
        let sel = compile(
            r#"{ users(where: { _and: [{ age: { gt: 18 } }, { name: { like: "A%" } }] }) { id } }"#,
        );

        let exp = sel.where_clause.unwrap();
        assert_eq!(exp.op, ExpOp::And);
        assert_eq!(exp.children[0].op, ExpOp::GreaterThan);
        assert_eq!(exp.children[0].col, "age");
        assert_eq!(exp.children[1].op, ExpOp::Like);
        assert_eq!(exp.children[1].col, "name");
    }

    #[test]
    fn where_in_builds_list_values() {
        let sel = compile(r#"{ users(where: { id: { in: [1, 2, 3] } }) { id } }"#);

        let exp = sel.where_clause.unwrap();
        assert_eq!(exp.op, ExpOp::In);
        assert_eq!(exp.ty, Some(ValType::List));
        assert_eq!(exp.list_type, Some(ValType::Int));
        assert_eq!(exp.list_val, vec!["1", "2", "3"]);
    }

    #[test]
    fn where_nested_column_path() {
        let sel = compile(
            r#"{ users(where: { profile: { address: { city: { eq: "Oslo" } } } }) { id } }"#,
        );

        let exp = sel.where_clause.unwrap();
        assert_eq!(exp.op, ExpOp::Equals);
        assert_eq!(exp.col, "profile.address.city");
        assert!(exp.nested_col);
    }

    #[test]
    fn where_two_segment_path_leaves_column_empty() {
        let sel = compile(r#"{ users(where: { profile: { city: { eq: "Oslo" } } }) { id } }"#);

        let exp = sel.where_clause.unwrap();
        assert_eq!(exp.op, ExpOp::Equals);
        assert_eq!(exp.col, "");
        assert!(!exp.nested_col);
    }

    #[test]
    fn where_variables() {
        let sel = compile("{ users(where: { id: { eq: $user_id } }) { id } }");

        let exp = sel.where_clause.unwrap();
        assert_eq!(exp.ty, Some(ValType::Var));
        assert_eq!(exp.val, "user_id");
    }

    #[test]
    fn where_null_values_are_rejected() {
        let err = compiler()
            .compile_query("{ users(where: { name: { eq: null } }) { id } }")
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedValueKind("null")));
    }

    #[test]
    fn order_by_directions_and_paths() {
        let sel = compile(
            "{ users(order_by: { name: asc, posts: { created_at: desc_nulls_last } }) { id } }",
        );

        assert_eq!(sel.order_by.len(), 2);
        assert_eq!(sel.order_by[0].col, "name");
        assert_eq!(sel.order_by[0].order, OrderDir::Asc);
        assert_eq!(sel.order_by[1].col, "posts.created_at");
        assert_eq!(sel.order_by[1].order, OrderDir::DescNullsLast);
    }

    #[test]
    fn order_by_rejects_unknown_directions() {
        let err = compiler()
            .compile_query("{ users(order_by: { name: sideways }) { id } }")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOrderDirection(dir) if dir == "sideways"));
    }

    #[test]
    fn order_by_requires_an_object() {
        let err = compiler()
            .compile_query("{ users(order_by: [1]) { id } }")
            .unwrap_err();
        assert!(matches!(err, Error::ExpectedObject));
    }

    #[test]
    fn distinct_accepts_string_or_list() {
        let sel = compile(r#"{ users(distinct: "name") { id } }"#);
        assert_eq!(sel.distinct_on, vec!["name"]);

        let sel = compile(r#"{ users(distinct_on: ["name", "age"]) { id } }"#);
        assert_eq!(sel.distinct_on, vec!["name", "age"]);

        let err = compiler()
            .compile_query("{ users(distinct: 5) { id } }")
            .unwrap_err();
        assert!(matches!(err, Error::ExpectedListOrString));
    }

    #[test]
    fn config_filter_applies_to_the_root() {
        let compiler = Compiler::new(Config {
            filter: vec!["{ user_id: { eq: $user_id } }".into()],
            ..Default::default()
        })
        .unwrap();

        let sel = compiler
            .compile_query("{ users { id } }")
            .unwrap()
            .query
            .unwrap()
            .select;

        let exp = sel.where_clause.unwrap();
        assert_eq!(exp.op, ExpOp::Equals);
        assert_eq!(exp.col, "user_id");
        assert_eq!(exp.ty, Some(ValType::Var));
    }

    #[test]
    fn config_filter_wraps_existing_where_filter_first() {
        let compiler = Compiler::new(Config {
            filter: vec!["{ user_id: { eq: $user_id } }".into()],
            ..Default::default()
        })
        .unwrap();

        let sel = compiler
            .compile_query("{ users(where: { age: { gt: 18 } }) { id } }")
            .unwrap()
            .query
            .unwrap()
            .select;

        let exp = sel.where_clause.unwrap();
        assert_eq!(exp.op, ExpOp::And);
        assert_eq!(exp.children[0].col, "user_id");
        assert_eq!(exp.children[1].col, "age");
    }

    #[test]
    fn filter_map_overrides_the_default_filter() {
        let compiler = Compiler::new(Config {
            filter: vec!["{ user_id: { eq: $user_id } }".into()],
            filter_map: HashMap::from([(
                "Products".to_string(),
                vec!["{ public: { eq: true } }".to_string()],
            )]),
            ..Default::default()
        })
        .unwrap();

        let sel = compiler
            .compile_query("{ products { id } }")
            .unwrap()
            .query
            .unwrap()
            .select;

        let exp = sel.where_clause.unwrap();
        assert_eq!(exp.op, ExpOp::Equals);
        assert_eq!(exp.col, "public");
    }

    #[test]
    fn multiple_filter_fragments_and_combine_left_to_right() {
        let compiler = Compiler::new(Config {
            filter: vec![
                "{ a: { eq: 1 } }".into(),
                "{ b: { eq: 2 } }".into(),
            ],
            ..Default::default()
        })
        .unwrap();

        let sel = compiler
            .compile_query("{ users { id } }")
            .unwrap()
            .query
            .unwrap()
            .select;

        let exp = sel.where_clause.unwrap();
        assert_eq!(exp.op, ExpOp::And);
        assert_eq!(exp.children[0].col, "a");
        assert_eq!(exp.children[1].col, "b");
    }

    #[test]
    fn first_top_level_field_becomes_the_root() {
        let sel = compile("{ users { id } products { id } }");
        assert_eq!(sel.table, "users");
    }
}
