//! Localization side tables must be named `<parent>__locales`.

use driftfix_schema::{Catalog, TableDescriptor};

use super::{CheckKind, Finding};
use crate::action::RepairAction;
use crate::config::DuplicatePolicy;
use crate::expect::{Expectations, carry_name};

pub(super) fn plan(catalog: &Catalog, exp: &Expectations, policy: DuplicatePolicy) -> Vec<Finding> {
    let rule = exp.naming;
    let mut findings = Vec::new();

    for table in catalog.tables.values() {
        let Some(fixed) = rule.corrected(&table.name) else {
            continue;
        };

        if catalog.contains(&fixed) {
            findings.push(duplicate(table, &fixed, policy));
            continue;
        }

        let mut finding = Finding::new(CheckKind::LocalesNaming, &table.name).action(
            RepairAction::RenameTable {
                from: table.name.clone(),
                to: fixed.clone(),
            },
        );

        for constraint in &table.constraints {
            if let Some(to) = carry_name(&constraint.name, &table.name, &fixed) {
                finding = finding.action(RepairAction::RenameConstraint {
                    table: fixed.clone(),
                    from: constraint.name.clone(),
                    to,
                });
            }
        }
        // Constraint-backed indexes were renamed along with their constraint.
        for index in table.indexes.iter().filter(|ix| !ix.backs_constraint) {
            if let Some(to) = carry_name(&index.name, &table.name, &fixed) {
                finding = finding.action(RepairAction::RenameIndex {
                    from: index.name.clone(),
                    to,
                });
            }
        }
        for sequence in &table.sequences {
            if let Some(to) = carry_name(sequence, &table.name, &fixed) {
                finding = finding.action(RepairAction::RenameSequence {
                    from: sequence.clone(),
                    to,
                });
            }
        }

        findings.push(finding);
    }

    findings
}

fn duplicate(table: &TableDescriptor, fixed: &str, policy: DuplicatePolicy) -> Finding {
    let finding = Finding::new(CheckKind::LocalesNaming, &table.name);
    match policy {
        DuplicatePolicy::Drop => finding
            .action(RepairAction::DropTable {
                name: table.name.clone(),
            })
            .note(format!("{} already exists; dropping stale duplicate", fixed)),
        DuplicatePolicy::Keep => finding.unresolved(format!(
            "duplicate of {}; kept because duplicate policy is keep",
            fixed
        )),
    }
}
