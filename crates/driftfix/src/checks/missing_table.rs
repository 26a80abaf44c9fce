//! Required tables that do not exist at all.

use driftfix_schema::{Catalog, OnDelete, foreign_key_name};
use std::collections::HashSet;

use super::{CheckKind, Finding};
use crate::action::RepairAction;
use crate::expect::{Expectations, TableKind};

pub(super) fn plan(catalog: &Catalog, exp: &Expectations) -> Vec<Finding> {
    let mut created: HashSet<&str> = HashSet::new();
    let mut findings = Vec::new();

    for spec in exp.tables {
        if catalog.contains(spec.name) {
            continue;
        }
        if let TableKind::Locales { .. } = spec.kind
            && let Some(legacy) = exp.naming.legacy_name(spec.name)
            && catalog.contains(&legacy)
        {
            // Renaming keeps the rows; creating would strand them.
            continue;
        }

        let mut finding = Finding::new(CheckKind::MissingTables, spec.name).action(
            RepairAction::CreateTable {
                name: spec.name.to_string(),
                columns: spec.kind.baseline().to_vec(),
            },
        );

        if let (Some(parent), Some(column)) = (spec.kind.parent(), spec.kind.parent_column()) {
            if catalog.contains(parent) || created.contains(parent) {
                finding = finding.action(RepairAction::AddForeignKey {
                    table: spec.name.to_string(),
                    name: foreign_key_name(spec.name, column, parent),
                    column: column.to_string(),
                    references_table: parent.to_string(),
                    references_column: "id".to_string(),
                    on_delete: OnDelete::Cascade,
                });
            } else {
                finding = finding.note(format!(
                    "parent table {} does not exist; {}.{} created without foreign key",
                    parent, spec.name, column
                ));
            }
        }

        created.insert(spec.name);
        findings.push(finding);
    }

    findings
}
