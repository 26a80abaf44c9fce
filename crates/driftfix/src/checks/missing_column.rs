//! Required columns missing from existing tables.

use driftfix_schema::Catalog;

use super::{CheckKind, Finding};
use crate::action::RepairAction;
use crate::expect::Expectations;

pub(super) fn plan(catalog: &Catalog, exp: &Expectations) -> Vec<Finding> {
    let mut findings = Vec::new();

    for spec in exp.tables {
        let Some(table) = catalog.get(spec.name) else {
            continue;
        };

        let mut finding = Finding::new(CheckKind::MissingColumns, spec.name);
        for column in spec.required_columns() {
            if column.primary_key || table.has_column(column.name) {
                continue;
            }
            let addable = column.addable();
            if addable.nullable != column.nullable {
                finding = finding.note(format!(
                    "{}.{} added as nullable; existing rows have no value for it",
                    spec.name, column.name
                ));
            }
            finding = finding.action(RepairAction::AddColumn {
                table: spec.name.to_string(),
                column: addable,
            });
        }

        if !finding.actions.is_empty() {
            findings.push(finding);
        }
    }

    findings
}
