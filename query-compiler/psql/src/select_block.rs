//! Rendering of one select level: the `json_agg`/`row_to_json` wrappers,
//! the inner base select with its relationship predicate, and the order-by
//! and paging clauses around it.

use std::io::Write;

use qcode::{Column, OrderDir, Paging, Select};
use sql_catalog::{RelKind, TableInfo};

use crate::{filter, Compiler, Error, Result};

pub(crate) struct SelectBlock<'a> {
    pub(crate) parent: Option<&'a Select>,
    pub(crate) sel: &'a Select,
    pub(crate) ti: &'a TableInfo,
}

impl SelectBlock<'_> {
    pub(crate) fn render<W: Write>(
        &self,
        w: &mut W,
        c: &Compiler,
        child_cols: &[Column],
        child_idx: &[usize],
    ) -> Result<()> {
        let has_order = !self.sel.order_by.is_empty();

        if self.sel.as_list {
            write!(w, r#"SELECT coalesce(json_agg("{}""#, self.sel.table)?;
            if has_order {
                render_order_by(w, self.sel)?;
            }
            write!(w, r#"), '[]') AS "{}" FROM ("#, self.sel.table)?;
        }

        w.write_all(b"SELECT ")?;
        if !self.sel.distinct_on.is_empty() {
            self.render_distinct_on(w)?;
        }

        w.write_all(b"row_to_json((")?;
        write!(w, r#"SELECT "sel_{}" FROM (SELECT "#, self.sel.id)?;
        self.render_columns(w)?;
        self.render_joined_columns(w, child_idx)?;
        write!(w, r#") AS "sel_{}""#, self.sel.id)?;
        write!(w, r#")) AS "{}""#, self.sel.table)?;

        if has_order {
            self.render_order_by_columns(w)?;
        }

        self.render_base_select(w, c, child_cols)
    }

    fn render_columns<W: Write>(&self, w: &mut W) -> Result<()> {
        for (i, col) in self.sel.cols.iter().enumerate() {
            write!(
                w,
                r#""{}_{}"."{}" AS "{}""#,
                self.sel.table, self.sel.id, col.name, col.field_name
            )?;
            if i < self.sel.cols.len() - 1 {
                w.write_all(b", ")?;
            }
        }
        Ok(())
    }

    fn render_joined_columns<W: Write>(&self, w: &mut W, child_idx: &[usize]) -> Result<()> {
        if !self.sel.cols.is_empty() && !child_idx.is_empty() {
            w.write_all(b", ")?;
        }

        for (i, &idx) in child_idx.iter().enumerate() {
            let sub = &self.sel.joins[idx];
            write!(
                w,
                r#""{}_{}.join"."{}" AS "{}""#,
                sub.table, sub.id, sub.table, sub.field_name
            )?;
            if i < child_idx.len() - 1 {
                w.write_all(b", ")?;
            }
        }
        Ok(())
    }

    fn render_base_select<W: Write>(
        &self,
        w: &mut W,
        c: &Compiler,
        child_cols: &[Column],
    ) -> Result<()> {
        let is_root = self.parent.is_none();
        let has_filter = self.sel.where_clause.is_some();
        let search = self.sel.args.get("search");

        let mut group_by: Vec<usize> = Vec::new();
        let mut has_agg = false;

        w.write_all(b" FROM (SELECT ")?;

        for (i, col) in self.sel.cols.iter().enumerate() {
            let name = col.name.as_str();

            if self.ti.has_column(name) {
                group_by.push(i);
                write!(w, r#""{}"."{}""#, self.sel.table, name)?;
            } else {
                match search {
                    Some(arg) if name == "search_rank" => {
                        let tsv = self
                            .ti
                            .tsv_column
                            .as_deref()
                            .ok_or_else(|| Error::NoTsvColumn(self.sel.table.clone()))?;
                        write!(
                            w,
                            r#"ts_rank("{}"."{}", to_tsquery('{}')) AS {}"#,
                            self.sel.table, tsv, arg.val, col.name
                        )?;
                    }
                    Some(arg) if name.starts_with("search_headline_") => {
                        let target = &name["search_headline_".len()..];
                        write!(
                            w,
                            r#"ts_headline("{}"."{}", to_tsquery('{}')) AS {}"#,
                            self.sel.table, target, arg.val, col.name
                        )?;
                    }
                    _ => match filter::aggregate_prefix(name) {
                        Some((func, target)) => {
                            has_agg = true;
                            write!(
                                w,
                                r#"{}("{}"."{}") AS {}"#,
                                func, self.sel.table, target, col.name
                            )?;
                        }
                        None => write!(w, "'{} not defined' AS {}", name, col.name)?,
                    },
                }
            }

            if i < self.sel.cols.len() - 1 || !child_cols.is_empty() {
                w.write_all(b", ")?;
            }
        }

        for (i, col) in child_cols.iter().enumerate() {
            write!(w, r#""{}"."{}""#, col.table, col.name)?;
            if i < child_cols.len() - 1 {
                w.write_all(b", ")?;
            }
        }

        match c.table_map.get(&self.sel.table) {
            Some(real) => write!(w, r#" FROM "{}" AS "{}""#, real, self.sel.table)?,
            None => write!(w, r#" FROM "{}""#, self.sel.table)?,
        }

        if is_root && has_filter {
            w.write_all(b" WHERE (")?;
            filter::render_where(w, self.sel, self.ti, &c.vars)?;
            w.write_all(b")")?;
        }

        if let Some(parent) = self.parent {
            self.render_join_table(w, c, parent)?;

            w.write_all(b" WHERE (")?;
            self.render_relationship(w, c, parent)?;
            if has_filter {
                w.write_all(b" AND ")?;
                filter::render_where(w, self.sel, self.ti, &c.vars)?;
            }
            w.write_all(b")")?;
        }

        if has_agg && !group_by.is_empty() {
            w.write_all(b" GROUP BY ")?;
            for (i, &col) in group_by.iter().enumerate() {
                write!(w, r#""{}"."{}""#, self.sel.table, self.sel.cols[col].name)?;
                if i < group_by.len() - 1 {
                    w.write_all(b", ")?;
                }
            }
        }

        render_paging(w, &self.sel.paging)?;
        write!(w, r#") AS "{}_{}""#, self.sel.table, self.sel.id)?;

        Ok(())
    }

    /// `OneToManyThrough` joins the bridge table in before the predicate
    /// can reference it; the other kinds need no extra join.
    fn render_join_table<W: Write>(&self, w: &mut W, c: &Compiler, parent: &Select) -> Result<()> {
        let rel = c.schema.get_relationship(&self.sel.table, &parent.table)?;
        if rel.kind != RelKind::OneToManyThrough {
            return Ok(());
        }

        let (Some(through), Some(col_t)) = (&rel.through, &rel.col_t) else {
            return Err(Error::IncompleteRelationship {
                child: self.sel.table.clone(),
                parent: parent.table.clone(),
            });
        };

        write!(
            w,
            r#" LEFT OUTER JOIN "{}" ON (("{}"."{}") = ("{}_{}"."{}"))"#,
            through, through, col_t, parent.table, parent.id, rel.col1
        )?;

        Ok(())
    }

    fn render_relationship<W: Write>(&self, w: &mut W, c: &Compiler, parent: &Select) -> Result<()> {
        let rel = c.schema.get_relationship(&self.sel.table, &parent.table)?;

        match rel.kind {
            RelKind::BelongsTo | RelKind::OneToMany => write!(
                w,
                r#"(("{}"."{}") = ("{}_{}"."{}"))"#,
                self.sel.table, rel.col1, parent.table, parent.id, rel.col2
            )?,
            RelKind::OneToManyThrough => {
                let through = rel.through.as_deref().ok_or_else(|| {
                    Error::IncompleteRelationship {
                        child: self.sel.table.clone(),
                        parent: parent.table.clone(),
                    }
                })?;
                write!(
                    w,
                    r#"(("{}"."{}") = ("{}"."{}"))"#,
                    self.sel.table, rel.col1, through, rel.col2
                )?;
            }
        }

        Ok(())
    }

    /// Order-by columns are pre-projected under `"T_N.ob.<col>"` aliases so
    /// both the inner select and the `json_agg` ordering can reference
    /// them.
    fn render_order_by_columns<W: Write>(&self, w: &mut W) -> Result<()> {
        if !self.sel.cols.is_empty() {
            w.write_all(b", ")?;
        }

        for (i, ob) in self.sel.order_by.iter().enumerate() {
            write!(
                w,
                r#""{}_{}"."{}" AS "{}_{}.ob.{}""#,
                self.sel.table, self.sel.id, ob.col, self.sel.table, self.sel.id, ob.col
            )?;
            if i < self.sel.order_by.len() - 1 {
                w.write_all(b", ")?;
            }
        }
        Ok(())
    }

    fn render_distinct_on<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(b" DISTINCT ON (")?;
        for (i, col) in self.sel.distinct_on.iter().enumerate() {
            write!(w, r#""{}_{}.ob.{}""#, self.sel.table, self.sel.id, col)?;
            if i < self.sel.distinct_on.len() - 1 {
                w.write_all(b", ")?;
            }
        }
        w.write_all(b") ")?;
        Ok(())
    }
}

pub(crate) fn render_close<W: Write>(w: &mut W, sel: &Select) -> Result<()> {
    if !sel.order_by.is_empty() {
        render_order_by(w, sel)?;
    }

    render_paging(w, &sel.paging)?;

    if sel.as_list {
        write!(w, r#") AS "{}_{}""#, sel.table, sel.id)?;
    }

    Ok(())
}

fn render_paging<W: Write>(w: &mut W, paging: &Paging) -> Result<()> {
    match &paging.limit {
        Some(limit) => write!(w, " LIMIT ('{}') :: integer", limit)?,
        None => w.write_all(b" LIMIT ('20') :: integer")?,
    }

    if let Some(offset) = &paging.offset {
        write!(w, " OFFSET ('{}') :: integer", offset)?;
    }

    Ok(())
}

fn render_order_by<W: Write>(w: &mut W, sel: &Select) -> Result<()> {
    w.write_all(b" ORDER BY ")?;

    for (i, ob) in sel.order_by.iter().enumerate() {
        write!(
            w,
            r#""{}_{}.ob.{}" {}"#,
            sel.table,
            sel.id,
            ob.col,
            direction_sql(ob.order)
        )?;
        if i < sel.order_by.len() - 1 {
            w.write_all(b", ")?;
        }
    }
    Ok(())
}

fn direction_sql(dir: OrderDir) -> &'static str {
    match dir {
        OrderDir::Asc => "ASC",
        OrderDir::Desc => "DESC",
        OrderDir::AscNullsFirst => "ASC NULLS FIRST",
        OrderDir::DescNullsFirst => "DESC NULLS FIRST",
        OrderDir::AscNullsLast => "ASC NULLS LAST",
        OrderDir::DescNullsLast => "DESC NULLS LAST",
    }
}
