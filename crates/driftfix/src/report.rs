//! Run report: what each check found and did.

use owo_colors::OwoColorize;
use std::fmt;

use crate::checks::{CheckKind, Finding};

/// Where a check or finding ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Unchecked,
    MatchesExpectation,
    NeedsRepair,
    Repaired,
    RepairFailed,
}

impl CheckState {
    pub fn is_ok(self) -> bool {
        matches!(self, CheckState::MatchesExpectation | CheckState::Repaired)
    }

    fn label(self) -> &'static str {
        match self {
            CheckState::Unchecked => "unchecked",
            CheckState::MatchesExpectation => "ok",
            CheckState::NeedsRepair => "needs repair",
            CheckState::Repaired => "repaired",
            CheckState::RepairFailed => "failed",
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            CheckState::MatchesExpectation | CheckState::Repaired => "✓",
            CheckState::NeedsRepair | CheckState::Unchecked => "⚠",
            CheckState::RepairFailed => "✗",
        }
    }
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome for one finding, or for a whole check that found nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub check: CheckKind,
    pub subject: Option<String>,
    pub state: CheckState,
    /// The planned actions, rendered for humans.
    pub actions: Vec<String>,
    pub notes: Vec<String>,
    pub error: Option<String>,
}

impl CheckResult {
    /// A check whose plan came back empty.
    pub fn clean(check: CheckKind) -> Self {
        Self {
            check,
            subject: None,
            state: CheckState::MatchesExpectation,
            actions: Vec::new(),
            notes: Vec::new(),
            error: None,
        }
    }

    /// A check that could not even be planned.
    pub fn failed(check: CheckKind, error: impl Into<String>) -> Self {
        Self {
            state: CheckState::RepairFailed,
            error: Some(error.into()),
            ..Self::clean(check)
        }
    }

    pub fn for_finding(finding: &Finding) -> Self {
        Self {
            check: finding.check,
            subject: Some(finding.subject.clone()),
            state: CheckState::Unchecked,
            actions: finding.actions.iter().map(|a| a.to_string()).collect(),
            notes: finding.notes.clone(),
            error: None,
        }
    }
}

/// Everything that happened during one run.
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub results: Vec<CheckResult>,
    /// The run was skipped because the database URL is the build placeholder.
    pub placeholder: bool,
    /// Statements committed during the run.
    pub statements_executed: u64,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn placeholder() -> Self {
        Self {
            placeholder: true,
            ..Self::default()
        }
    }

    pub fn push(&mut self, result: CheckResult) {
        self.results.push(result);
    }

    /// True iff every result matches expectations or was repaired.
    pub fn healthy(&self) -> bool {
        self.placeholder || self.results.iter().all(|r| r.state.is_ok())
    }

    pub fn exit_code(&self) -> u8 {
        if self.healthy() { 0 } else { 1 }
    }

    pub fn count(&self, state: CheckState) -> usize {
        self.results.iter().filter(|r| r.state == state).count()
    }

    /// Print the report to stdout with coloured status symbols.
    pub fn print(&self) {
        if self.placeholder {
            println!("{} placeholder database url, nothing to do", "✓".green());
            return;
        }
        for result in &self.results {
            let symbol = result.state.symbol();
            let symbol = match result.state {
                CheckState::MatchesExpectation | CheckState::Repaired => symbol.green().to_string(),
                CheckState::NeedsRepair | CheckState::Unchecked => symbol.yellow().to_string(),
                CheckState::RepairFailed => symbol.red().to_string(),
            };
            println!("{} {}", symbol, headline(result).bold());
            for action in &result.actions {
                println!("    {}", action.dimmed());
            }
            for note in &result.notes {
                println!("    {} {}", "⚠".yellow(), note);
            }
            if let Some(error) = &result.error {
                println!("    {}", error.red());
            }
        }
        println!("{}", self.summary());
    }

    fn summary(&self) -> String {
        format!(
            "{} repaired, {} need repair, {} failed, {} statements executed",
            self.count(CheckState::Repaired),
            self.count(CheckState::NeedsRepair),
            self.count(CheckState::RepairFailed),
            self.statements_executed
        )
    }
}

fn headline(result: &CheckResult) -> String {
    match &result.subject {
        Some(subject) => format!("{} {}: {}", result.check, subject, result.state),
        None => format!("{}: {}", result.check, result.state),
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.placeholder {
            return writeln!(f, "placeholder database url, nothing to do");
        }
        for result in &self.results {
            writeln!(f, "{} {}", result.state.symbol(), headline(result))?;
            for action in &result.actions {
                writeln!(f, "    {}", action)?;
            }
            for note in &result.notes {
                writeln!(f, "    warning: {}", note)?;
            }
            if let Some(error) = &result.error {
                writeln!(f, "    error: {}", error)?;
            }
        }
        writeln!(f, "{}", self.summary())
    }
}
