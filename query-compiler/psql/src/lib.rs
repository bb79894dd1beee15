//! PostgreSQL emitter for compiled query IR.
//!
//! Walks a [`qcode::QCode`] against a [`sql_catalog::DbSchema`] and writes
//! one self-contained `SELECT` statement whose result is a JSON aggregate
//! shaped like the original query: every selection level becomes a
//! `row_to_json` block, list levels wrap it in `json_agg`, and child
//! selections attach through `LEFT OUTER JOIN LATERAL`.
//!
//! Variables are substituted into the statement textually and nothing here
//! escapes them; callers must validate anything placed in
//! [`Options::vars`] (or move to driver-side parameter binding) before
//! executing the output.
//!
//! On error the output sink may already contain a prefix of the statement.
//! Callers that need all-or-nothing output should write into a buffer.

mod filter;
mod select_block;

use std::collections::HashMap;
use std::io::Write;

use qcode::{Column, QCode, Select};
use sql_catalog::{CatalogError, DbSchema, RelKind, TableInfo};
use thiserror::Error;
use tracing::trace;

use select_block::SelectBlock;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The query code has nothing to emit: the operation was a reserved
    /// kind, or every top-level field was dropped during lowering.
    #[error("query code has no query to compile")]
    EmptyQuery,

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("incomplete through relationship between '{child}' and '{parent}'")]
    IncompleteRelationship { child: String, parent: String },

    #[error("no primary key column defined for '{0}'")]
    NoPrimaryKey(String),

    #[error("no tsv column defined for '{0}'")]
    NoTsvColumn(String),

    #[error("unexpected expression node in where clause")]
    UnexpectedExpression,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Textual substitutions applied at emission time.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Variable values spliced in for `$name` references. Unresolved
    /// variables emit a quoted `'{{name}}'` placeholder instead.
    pub vars: HashMap<String, String>,
    /// Maps exposed table names to the real relation, emitted as
    /// `FROM "real" AS "exposed"`.
    pub table_map: HashMap<String, String>,
}

pub struct Compiler {
    pub(crate) schema: DbSchema,
    pub(crate) vars: HashMap<String, String>,
    pub(crate) table_map: HashMap<String, String>,
}

/// Work items for the emission walk. The set is closed: selects open and
/// close around their children, joins frame child selects.
enum RenderItem<'a> {
    SelectOpen {
        sel: &'a Select,
        parent: Option<&'a Select>,
    },
    SelectClose {
        sel: &'a Select,
    },
    JoinOpen,
    JoinClose {
        sel: &'a Select,
    },
}

impl Compiler {
    pub fn new(schema: DbSchema, options: Options) -> Self {
        Compiler {
            schema,
            vars: options.vars,
            table_map: options.table_map,
        }
    }

    /// Compiles `qc` into a single SQL statement written to `w`.
    #[tracing::instrument(skip_all)]
    pub fn compile<W: Write>(&self, w: &mut W, qc: &QCode) -> Result<()> {
        let root = &qc.query.as_ref().ok_or(Error::EmptyQuery)?.select;
        self.table_info(root)?;

        let mut stack: Vec<RenderItem<'_>> = Vec::with_capacity(8);
        stack.push(RenderItem::SelectClose { sel: root });
        stack.push(RenderItem::SelectOpen {
            sel: root,
            parent: None,
        });

        write!(
            w,
            "SELECT json_object_agg('{}', {}) FROM (",
            root.field_name, root.table
        )?;

        while let Some(item) = stack.pop() {
            match item {
                RenderItem::SelectOpen { sel, parent } => {
                    let ti = self.table_info(sel)?;
                    let (child_cols, child_idx) = self.relationship_columns(sel);

                    let block = SelectBlock { parent, sel, ti };
                    block.render(w, self, &child_cols, &child_idx)?;

                    for &idx in child_idx.iter().rev() {
                        let sub = &sel.joins[idx];
                        stack.push(RenderItem::JoinClose { sel: sub });
                        stack.push(RenderItem::SelectClose { sel: sub });
                        stack.push(RenderItem::SelectOpen {
                            sel: sub,
                            parent: Some(sel),
                        });
                        stack.push(RenderItem::JoinOpen);
                    }
                }
                RenderItem::SelectClose { sel } => select_block::render_close(w, sel)?,
                RenderItem::JoinOpen => w.write_all(b" LEFT OUTER JOIN LATERAL (")?,
                RenderItem::JoinClose { sel } => {
                    write!(w, r#") AS "{}_{}.join" ON ('true')"#, sel.table, sel.id)?
                }
            }
        }

        w.write_all(br#") AS "done_1337";"#)?;
        trace!(root = %root.table, "compiled query");

        Ok(())
    }

    /// Convenience wrapper emitting into a fresh string.
    pub fn compile_to_string(&self, qc: &QCode) -> Result<String> {
        let mut out = Vec::with_capacity(4096);
        self.compile(&mut out, qc)?;

        // The emitter only ever writes UTF-8.
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    pub(crate) fn table_info(&self, sel: &Select) -> Result<&TableInfo> {
        let name = self.table_map.get(&sel.table).unwrap_or(&sel.table);
        Ok(self.schema.get_table(name)?)
    }

    /// Derives the parent-side columns each joinable child needs, and which
    /// children are joinable at all. Children without a relationship entry
    /// are skipped and produce no SQL.
    fn relationship_columns(&self, parent: &Select) -> (Vec<Column>, Vec<usize>) {
        let selected: Vec<&str> = parent.cols.iter().map(|c| c.name.as_str()).collect();

        let mut cols = Vec::new();
        let mut child_idx = Vec::new();

        for (idx, sub) in parent.joins.iter().enumerate() {
            let Some(rel) = self.schema.relationship(&sub.table, &parent.table) else {
                continue;
            };

            let needed = match rel.kind {
                RelKind::BelongsTo | RelKind::OneToMany => &rel.col2,
                RelKind::OneToManyThrough => &rel.col1,
            };

            if !selected.contains(&needed.as_str()) {
                cols.push(Column {
                    table: parent.table.clone(),
                    name: needed.clone(),
                    field_name: needed.clone(),
                });
            }
            child_idx.push(idx);
        }

        (cols, child_idx)
    }
}
