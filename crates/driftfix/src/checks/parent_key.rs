//! Localization side tables point at their parent row, and deleting the
//! parent takes the translations along.
//!
//! Runs after the missing-tables and missing-columns checks so that both the
//! parent and `_parent_id` exist by the time the key is planned.

use driftfix_schema::{Catalog, ForeignKeyDescriptor, OnDelete, foreign_key_name};

use super::{CheckKind, Finding};
use crate::action::RepairAction;
use crate::expect::{Expectations, TableKind};

const PARENT_COLUMN: &str = "_parent_id";

pub(super) fn plan(catalog: &Catalog, exp: &Expectations) -> Vec<Finding> {
    let mut findings = Vec::new();

    for spec in exp.tables {
        let TableKind::Locales { parent } = spec.kind else {
            continue;
        };
        let Some(table) = catalog.get(spec.name) else {
            continue;
        };
        if !table.has_column(PARENT_COLUMN) {
            continue;
        }

        let keys: Vec<&ForeignKeyDescriptor> = table
            .foreign_keys
            .iter()
            .filter(|fk| fk.columns.len() == 1 && fk.columns[0] == PARENT_COLUMN)
            .collect();
        let linked = keys.iter().any(|fk| links_to(fk, parent));
        let wrong: Vec<&ForeignKeyDescriptor> = keys
            .iter()
            .copied()
            .filter(|fk| !links_to(fk, parent))
            .collect();
        if linked && wrong.is_empty() {
            continue;
        }

        let mut finding = Finding::new(CheckKind::LocalesParentKeys, spec.name);
        if !linked && !catalog.contains(parent) {
            findings.push(finding.note(format!(
                "parent table {} does not exist; {}.{} left without foreign key",
                parent, spec.name, PARENT_COLUMN
            )));
            continue;
        }

        for fk in wrong {
            finding = finding
                .action(RepairAction::DropConstraint {
                    table: spec.name.to_string(),
                    name: fk.name.clone(),
                })
                .note(format!(
                    "{} references {}({}) ON DELETE {}; replaced",
                    fk.name,
                    fk.references_table,
                    fk.references_columns.join(", "),
                    fk.on_delete
                ));
        }
        if !linked {
            finding = finding.action(RepairAction::AddForeignKey {
                table: spec.name.to_string(),
                name: foreign_key_name(spec.name, PARENT_COLUMN, parent),
                column: PARENT_COLUMN.to_string(),
                references_table: parent.to_string(),
                references_column: "id".to_string(),
                on_delete: OnDelete::Cascade,
            });
        }
        findings.push(finding);
    }

    findings
}

fn links_to(fk: &ForeignKeyDescriptor, parent: &str) -> bool {
    fk.references_table == parent
        && fk.references_columns == ["id"]
        && fk.on_delete == OnDelete::Cascade
}
