//! Upload and relationship columns added after their table was created.

use driftfix_schema::{Catalog, foreign_key_name};

use super::{CheckKind, Finding};
use crate::action::RepairAction;
use crate::expect::{ColumnSpec, Expectations};

pub(super) fn plan(catalog: &Catalog, exp: &Expectations) -> Vec<Finding> {
    let mut findings = Vec::new();

    for rel in exp.relations {
        let Some(table) = catalog.get(rel.table) else {
            continue;
        };

        let mut finding = Finding::new(
            CheckKind::RelationColumns,
            format!("{}.{}", rel.table, rel.column),
        );
        if !table.has_column(rel.column) {
            finding = finding.action(RepairAction::AddColumn {
                table: rel.table.to_string(),
                column: ColumnSpec::optional(rel.column, "integer"),
            });
        }
        if table.foreign_key_on(rel.column).is_none() {
            if catalog.contains(rel.references) {
                finding = finding.action(RepairAction::AddForeignKey {
                    table: rel.table.to_string(),
                    name: foreign_key_name(rel.table, rel.column, rel.references),
                    column: rel.column.to_string(),
                    references_table: rel.references.to_string(),
                    references_column: "id".to_string(),
                    on_delete: rel.on_delete,
                });
            } else {
                finding = finding.note(format!(
                    "{} does not exist; foreign key on {}.{} skipped",
                    rel.references, rel.table, rel.column
                ));
            }
        }

        if !finding.is_empty() {
            findings.push(finding);
        }
    }

    findings
}
