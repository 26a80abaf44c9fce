//! Indexes on columns the CMS filters by.

use driftfix_schema::Catalog;

use super::{CheckKind, Finding};
use crate::action::RepairAction;
use crate::expect::Expectations;

/// `check` is either [`CheckKind::MissingIndexes`] (every expected index) or
/// [`CheckKind::LocalesIndexes`] (localization side tables only).
pub(super) fn plan(catalog: &Catalog, exp: &Expectations, check: CheckKind) -> Vec<Finding> {
    let mut findings = Vec::new();

    for ix in exp.indexes() {
        if check == CheckKind::LocalesIndexes && !exp.is_locales(ix.table) {
            continue;
        }
        let Some(table) = catalog.get(ix.table) else {
            continue;
        };
        if !ix.columns.iter().all(|c| table.has_column(c)) {
            continue;
        }
        if table.has_index_leading_with(&ix.columns) {
            continue;
        }
        let name = ix.name();
        // `CREATE INDEX IF NOT EXISTS` would silently keep the other index.
        if let Some(taken) = catalog
            .tables
            .values()
            .flat_map(|t| &t.indexes)
            .find(|i| i.name == name)
        {
            findings.push(Finding::new(check, &name).unresolved(format!(
                "{} already exists on ({}); cannot index {} ({})",
                name,
                taken.columns.join(", "),
                ix.table,
                ix.columns.join(", ")
            )));
            continue;
        }
        findings.push(
            Finding::new(check, &name).action(RepairAction::AddIndex {
                table: ix.table.to_string(),
                name,
                columns: ix.columns.iter().map(|c| c.to_string()).collect(),
            }),
        );
    }

    findings
}
