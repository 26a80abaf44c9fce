//! Repair actions and the DDL they render to.
//!
//! Every statement is guarded so that running it a second time is a no-op:
//! `IF EXISTS` / `IF NOT EXISTS` where Postgres supports it, and a `DO` block
//! that consults `pg_constraint` where it does not (constraints).

use driftfix_schema::{Ident, Lit, OnDelete, qualified};
use std::fmt;

use crate::expect::ColumnSpec;

/// A single corrective step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairAction {
    /// Rename a table, keeping its rows.
    RenameTable { from: String, to: String },
    /// Rename a constraint on `table` (index-backed constraints take their
    /// index along).
    RenameConstraint {
        table: String,
        from: String,
        to: String,
    },
    /// Rename a standalone index.
    RenameIndex { from: String, to: String },
    /// Rename a sequence owned by a renamed table.
    RenameSequence { from: String, to: String },
    /// Create a table with the given columns.
    CreateTable {
        name: String,
        columns: Vec<ColumnSpec>,
    },
    /// Add a column.
    AddColumn { table: String, column: ColumnSpec },
    /// Add a plain b-tree index.
    AddIndex {
        table: String,
        name: String,
        columns: Vec<String>,
    },
    /// Add a single-column foreign key to `references_table(references_column)`.
    AddForeignKey {
        table: String,
        name: String,
        column: String,
        references_table: String,
        references_column: String,
        on_delete: OnDelete,
    },
    /// Drop a constraint on `table`.
    DropConstraint { table: String, name: String },
    /// Drop a table. Fails if anything outside the table depends on it.
    DropTable { name: String },
}

impl RepairAction {
    /// Render this action as a re-runnable statement against `schema`.
    pub fn to_sql(&self, schema: &str) -> String {
        match self {
            RepairAction::RenameTable { from, to } => format!(
                "ALTER TABLE IF EXISTS {} RENAME TO {};",
                qualified(schema, from),
                Ident(to)
            ),
            RepairAction::RenameConstraint { table, from, to } => guarded_constraint(
                schema,
                table,
                from,
                true,
                &format!(
                    "ALTER TABLE {} RENAME CONSTRAINT {} TO {};",
                    qualified(schema, table),
                    Ident(from),
                    Ident(to)
                ),
            ),
            RepairAction::RenameIndex { from, to } => format!(
                "ALTER INDEX IF EXISTS {} RENAME TO {};",
                qualified(schema, from),
                Ident(to)
            ),
            RepairAction::RenameSequence { from, to } => format!(
                "ALTER SEQUENCE IF EXISTS {} RENAME TO {};",
                qualified(schema, from),
                Ident(to)
            ),
            RepairAction::CreateTable { name, columns } => {
                let defs: Vec<String> = columns
                    .iter()
                    .map(|c| format!("    {}", column_definition(c)))
                    .collect();
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
                    qualified(schema, name),
                    defs.join(",\n")
                )
            }
            RepairAction::AddColumn { table, column } => format!(
                "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {};",
                qualified(schema, table),
                column_definition(column)
            ),
            RepairAction::AddIndex {
                table,
                name,
                columns,
            } => {
                let cols: Vec<String> = columns.iter().map(|c| Ident(c).to_string()).collect();
                format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {} ({});",
                    Ident(name),
                    qualified(schema, table),
                    cols.join(", ")
                )
            }
            RepairAction::AddForeignKey {
                table,
                name,
                column,
                references_table,
                references_column,
                on_delete,
            } => guarded_constraint(
                schema,
                table,
                name,
                false,
                &format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE NO ACTION;",
                    qualified(schema, table),
                    Ident(name),
                    Ident(column),
                    qualified(schema, references_table),
                    Ident(references_column),
                    on_delete
                ),
            ),
            RepairAction::DropConstraint { table, name } => guarded_constraint(
                schema,
                table,
                name,
                true,
                &format!(
                    "ALTER TABLE {} DROP CONSTRAINT {};",
                    qualified(schema, table),
                    Ident(name)
                ),
            ),
            RepairAction::DropTable { name } => {
                format!("DROP TABLE IF EXISTS {} RESTRICT;", qualified(schema, name))
            }
        }
    }
}

/// Wrap `stmt` so it only runs if constraint `name` on `table` exists
/// (`when_present`) or does not exist yet.
fn guarded_constraint(
    schema: &str,
    table: &str,
    name: &str,
    when_present: bool,
    stmt: &str,
) -> String {
    let test = if when_present { "IF EXISTS" } else { "IF NOT EXISTS" };
    format!(
        "DO $$\nBEGIN\n    {} (SELECT 1 FROM pg_constraint WHERE conname = {} AND conrelid = to_regclass({})) THEN\n        {}\n    END IF;\nEND $$;",
        test,
        Lit(name),
        Lit(qualified(schema, table)),
        stmt
    )
}

fn column_definition(col: &ColumnSpec) -> String {
    let mut def = format!("{} {}", Ident(col.name), col.pg_type);
    if col.primary_key {
        def.push_str(" PRIMARY KEY");
    } else if !col.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(default) = col.default {
        def.push_str(&format!(" DEFAULT {}", default));
    }
    def
}

impl fmt::Display for RepairAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairAction::RenameTable { from, to } => write!(f, "~ rename table {} -> {}", from, to),
            RepairAction::RenameConstraint { from, to, .. } => {
                write!(f, "~ rename constraint {} -> {}", from, to)
            }
            RepairAction::RenameIndex { from, to } => write!(f, "~ rename index {} -> {}", from, to),
            RepairAction::RenameSequence { from, to } => {
                write!(f, "~ rename sequence {} -> {}", from, to)
            }
            RepairAction::CreateTable { name, columns } => {
                write!(f, "+ table {} ({} columns)", name, columns.len())
            }
            RepairAction::AddColumn { column, .. } => {
                let nullable = if column.nullable { " (nullable)" } else { "" };
                write!(f, "+ {}: {}{}", column.name, column.pg_type, nullable)
            }
            RepairAction::AddIndex { name, columns, .. } => {
                write!(f, "+ INDEX {} ({})", name, columns.join(", "))
            }
            RepairAction::AddForeignKey {
                column,
                references_table,
                references_column,
                on_delete,
                ..
            } => write!(
                f,
                "+ FOREIGN KEY ({}) -> {}.{} ON DELETE {}",
                column, references_table, references_column, on_delete
            ),
            RepairAction::DropConstraint { name, .. } => write!(f, "- constraint {}", name),
            RepairAction::DropTable { name } => write!(f, "- table {}", name),
        }
    }
}
