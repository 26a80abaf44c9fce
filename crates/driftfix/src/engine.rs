//! The diff & repair engine.
//!
//! Checks run strictly in sequence. Each one re-reads the catalog, plans its
//! findings and, in repair mode, applies every finding in its own
//! transaction. A failing finding is rolled back and reported; the run goes
//! on with the next one.

use crate::action::RepairAction;
use crate::checks::{CheckKind, Finding};
use crate::config::Config;
use crate::error::describe_pg_error;
use crate::expect::Expectations;
use crate::inventory::Inventory;
use crate::report::{CheckResult, CheckState, Report};
use crate::traced::TracedConn;

/// Whether findings are applied or only reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Repair,
    Verify,
}

pub struct Engine<'a> {
    conn: &'a mut TracedConn,
    config: &'a Config,
    expectations: Expectations,
    mode: Mode,
}

impl<'a> Engine<'a> {
    pub fn new(conn: &'a mut TracedConn, config: &'a Config, mode: Mode) -> Self {
        Self {
            conn,
            config,
            expectations: Expectations::marketplace(),
            mode,
        }
    }

    /// Run `checks` in the given order.
    pub async fn run(&mut self, checks: &[CheckKind]) -> Report {
        let before = self.conn.statements_executed();
        let mut report = Report::new();
        for &check in checks {
            self.run_check(check, &mut report).await;
        }
        report.statements_executed = self.conn.statements_executed() - before;
        report
    }

    async fn run_check(&mut self, check: CheckKind, report: &mut Report) {
        let scope = check.scope(&self.expectations);
        let catalog = match Inventory::new(&*self.conn, &self.config.schema)
            .catalog(&scope)
            .await
        {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::error!(check = %check, error = %e, "cannot read catalog");
                report.push(CheckResult::failed(check, e.to_string()));
                return;
            }
        };

        let findings = check.plan(&catalog, &self.expectations, self.config.duplicate_policy);
        tracing::debug!(check = %check, tables = catalog.len(), findings = findings.len(), "planned");
        if findings.is_empty() {
            report.push(CheckResult::clean(check));
            return;
        }

        for finding in findings {
            let result = self.resolve(&finding).await;
            report.push(result);
        }
    }

    async fn resolve(&mut self, finding: &Finding) -> CheckResult {
        let mut result = CheckResult::for_finding(finding);
        for note in &finding.notes {
            tracing::warn!(check = %finding.check, subject = %finding.subject, "{}", note);
        }

        if let Some(reason) = &finding.unresolved {
            tracing::warn!(check = %finding.check, subject = %finding.subject, "{}", reason);
            result.state = CheckState::NeedsRepair;
            result.error = Some(reason.clone());
            return result;
        }
        if finding.actions.is_empty() {
            result.state = CheckState::MatchesExpectation;
            return result;
        }
        if self.mode == Mode::Verify {
            result.state = CheckState::NeedsRepair;
            return result;
        }

        let mut discarded = Vec::new();
        for action in &finding.actions {
            if let RepairAction::DropTable { name } = action
                && let Some(note) = self.count_discarded_rows(name).await
            {
                discarded.push(note);
            }
        }

        let schema = &self.config.schema;
        let statements: Vec<String> = finding.actions.iter().map(|a| a.to_sql(schema)).collect();
        match self.conn.apply(&statements).await {
            Ok(()) => {
                tracing::info!(
                    check = %finding.check,
                    subject = %finding.subject,
                    statements = statements.len(),
                    "repaired"
                );
                result.state = CheckState::Repaired;
                result.notes.extend(discarded);
            }
            Err(e) => {
                let message = describe_pg_error(&e);
                tracing::error!(
                    check = %finding.check,
                    subject = %finding.subject,
                    error = %message,
                    "repair failed, rolled back"
                );
                result.state = CheckState::RepairFailed;
                result.error = Some(message);
            }
        }
        result
    }

    async fn count_discarded_rows(&self, table: &str) -> Option<String> {
        let inventory = Inventory::new(&*self.conn, &self.config.schema);
        match inventory.row_count(table).await {
            Ok(rows) => {
                tracing::warn!(table = %table, rows, "dropping duplicate table");
                Some(format!("{} rows discarded from {}", rows, table))
            }
            Err(e) => {
                tracing::warn!(table = %table, error = %e, "cannot count rows before drop");
                None
            }
        }
    }
}
