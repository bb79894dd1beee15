//! Serialization of filter expression trees into SQL conditions, plus the
//! aggregate-prefix table for computed columns.

use std::collections::HashMap;
use std::io::Write;

use qcode::{Exp, ExpOp, Select, ValType};
use sql_catalog::TableInfo;

use crate::{Error, Result};

/// The serialization walk interleaves expression nodes with literal
/// operator tokens on one stack.
enum WhereItem<'a> {
    Exp(&'a Exp),
    Token(&'static str),
}

pub(crate) fn render_where<W: Write>(
    w: &mut W,
    sel: &Select,
    ti: &TableInfo,
    vars: &HashMap<String, String>,
) -> Result<()> {
    let mut stack: Vec<WhereItem<'_>> = Vec::new();

    if let Some(exp) = &sel.where_clause {
        stack.push(WhereItem::Exp(exp));
    }

    while let Some(item) = stack.pop() {
        let exp = match item {
            WhereItem::Token(token) => {
                w.write_all(token.as_bytes())?;
                continue;
            }
            WhereItem::Exp(exp) => exp,
        };

        match exp.op {
            ExpOp::And | ExpOp::Or => {
                let token = if exp.op == ExpOp::And { " AND " } else { " OR " };
                for (i, child) in exp.children.iter().enumerate().rev() {
                    push_operand(&mut stack, child);
                    if i > 0 {
                        stack.push(WhereItem::Token(token));
                    }
                }
                continue;
            }
            ExpOp::Not => {
                let child = exp.children.first().ok_or(Error::UnexpectedExpression)?;
                push_operand(&mut stack, child);
                stack.push(WhereItem::Token("NOT "));
                continue;
            }
            _ => {}
        }

        if exp.nested_col {
            write!(w, r#"(("{}") "#, exp.col)?;
        } else if !exp.col.is_empty() {
            write!(w, r#"(("{}"."{}") "#, sel.table, exp.col)?;
        }

        let mut with_value = true;

        match exp.op {
            ExpOp::Equals => w.write_all(b"=")?,
            ExpOp::NotEquals => w.write_all(b"!=")?,
            ExpOp::GreaterOrEquals => w.write_all(b">=")?,
            ExpOp::LesserOrEquals => w.write_all(b"<=")?,
            ExpOp::GreaterThan => w.write_all(b">")?,
            ExpOp::LesserThan => w.write_all(b"<")?,
            ExpOp::In => w.write_all(b"IN")?,
            ExpOp::NotIn => w.write_all(b"NOT IN")?,
            ExpOp::Like => w.write_all(b"LIKE")?,
            ExpOp::NotLike => w.write_all(b"NOT LIKE")?,
            ExpOp::ILike => w.write_all(b"ILIKE")?,
            ExpOp::NotILike => w.write_all(b"NOT ILIKE")?,
            ExpOp::Similar => w.write_all(b"SIMILAR TO")?,
            ExpOp::NotSimilar => w.write_all(b"NOT SIMILAR TO")?,
            ExpOp::Contains => w.write_all(b"@>")?,
            ExpOp::ContainedIn => w.write_all(b"<@")?,
            ExpOp::HasKey => w.write_all(b"?")?,
            ExpOp::HasKeyAny => w.write_all(b"?|")?,
            ExpOp::HasKeyAll => w.write_all(b"?&")?,
            ExpOp::IsNull => {
                if exp.val.eq_ignore_ascii_case("true") {
                    w.write_all(b"IS NULL)")?;
                } else {
                    w.write_all(b"IS NOT NULL)")?;
                }
                with_value = false;
            }
            ExpOp::EqID => {
                let pk = ti
                    .primary_key
                    .as_deref()
                    .ok_or_else(|| Error::NoPrimaryKey(sel.table.clone()))?;
                write!(w, r#"(("{}") = ('{}'))"#, pk, exp.val)?;
                with_value = false;
            }
            ExpOp::TsQuery => {
                let tsv = ti
                    .tsv_column
                    .as_deref()
                    .ok_or_else(|| Error::NoTsvColumn(sel.table.clone()))?;
                write!(w, r#"(("{}") @@ to_tsquery('{}'))"#, tsv, exp.val)?;
                with_value = false;
            }
            _ => return Err(Error::UnexpectedExpression),
        }

        if with_value {
            if exp.ty == Some(ValType::List) {
                render_list(w, exp)?;
            } else {
                render_val(w, exp, vars)?;
            }
            w.write_all(b")")?;
        }
    }

    Ok(())
}

/// Nested logical groups get their own parentheses; terminals bring their
/// own.
fn push_operand<'a>(stack: &mut Vec<WhereItem<'a>>, child: &'a Exp) {
    if matches!(child.op, ExpOp::And | ExpOp::Or) {
        stack.push(WhereItem::Token(")"));
        stack.push(WhereItem::Exp(child));
        stack.push(WhereItem::Token("("));
    } else {
        stack.push(WhereItem::Exp(child));
    }
}

fn render_val<W: Write>(w: &mut W, exp: &Exp, vars: &HashMap<String, String>) -> Result<()> {
    w.write_all(b" (")?;

    match exp.ty {
        Some(ValType::Bool | ValType::Int | ValType::Float) => w.write_all(exp.val.as_bytes())?,
        Some(ValType::Str) => write!(w, "'{}'", exp.val)?,
        Some(ValType::Var) => match vars.get(&exp.val) {
            Some(val) => w.write_all(val.as_bytes())?,
            None => write!(w, "'{{{{{}}}}}'", exp.val)?,
        },
        _ => {}
    }

    w.write_all(b")")?;
    Ok(())
}

fn render_list<W: Write>(w: &mut W, exp: &Exp) -> Result<()> {
    w.write_all(b" (")?;

    for (i, item) in exp.list_val.iter().enumerate() {
        match exp.list_type {
            Some(ValType::Bool | ValType::Int | ValType::Float) => {
                w.write_all(item.as_bytes())?
            }
            Some(ValType::Str) => write!(w, "'{}'", item)?,
            _ => {}
        }
        if i < exp.list_val.len() - 1 {
            w.write_all(b", ")?;
        }
    }

    w.write_all(b")")?;
    Ok(())
}

/// Aggregate column prefixes, longest first so the `stddev_*` and `var_*`
/// family members match before their shorter prefixes.
const AGGREGATE_PREFIXES: &[&str] = &[
    "stddev_samp_",
    "stddev_pop_",
    "var_samp_",
    "variance_",
    "var_pop_",
    "stddev_",
    "count_",
    "avg_",
    "max_",
    "min_",
    "sum_",
];

/// Splits an aggregate-prefixed column name into the SQL function and the
/// column it applies to.
pub(crate) fn aggregate_prefix(name: &str) -> Option<(&str, &str)> {
    AGGREGATE_PREFIXES.iter().find_map(|prefix| {
        name.strip_prefix(prefix)
            .map(|rest| (&prefix[..prefix.len() - 1], rest))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_prefixes_match_longest_first() {
        assert_eq!(aggregate_prefix("count_id"), Some(("count", "id")));
        assert_eq!(aggregate_prefix("sum_amount"), Some(("sum", "amount")));
        assert_eq!(
            aggregate_prefix("stddev_pop_price"),
            Some(("stddev_pop", "price"))
        );
        assert_eq!(
            aggregate_prefix("stddev_latency"),
            Some(("stddev", "latency"))
        );
        assert_eq!(
            aggregate_prefix("var_samp_price"),
            Some(("var_samp", "price"))
        );
        assert_eq!(aggregate_prefix("total"), None);
    }
}
