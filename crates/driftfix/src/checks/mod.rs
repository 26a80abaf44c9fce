//! The five drift checks.
//!
//! A check is a pure planner: given a freshly read [`Catalog`] and the
//! [`Expectations`], it returns the [`Finding`]s that would bring the schema
//! in line. Applying them is the engine's job.

use driftfix_schema::{Catalog, TableFilter};
use std::fmt;

use crate::action::RepairAction;
use crate::config::DuplicatePolicy;
use crate::expect::Expectations;

mod index;
mod missing_column;
mod missing_table;
mod naming;
mod parent_key;
mod relation;

/// One planned unit of repair, applied atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub check: CheckKind,
    /// The table (or table.column) the finding is about.
    pub subject: String,
    pub actions: Vec<RepairAction>,
    /// Warnings worth surfacing even when the repair succeeds.
    pub notes: Vec<String>,
    /// Set when drift was found but no automatic repair is planned.
    pub unresolved: Option<String>,
}

impl Finding {
    pub fn new(check: CheckKind, subject: impl Into<String>) -> Self {
        Self {
            check,
            subject: subject.into(),
            actions: Vec::new(),
            notes: Vec::new(),
            unresolved: None,
        }
    }

    pub fn action(mut self, action: RepairAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn unresolved(mut self, reason: impl Into<String>) -> Self {
        self.unresolved = Some(reason.into());
        self
    }

    /// Nothing to do and nothing to say.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.notes.is_empty() && self.unresolved.is_none()
    }
}

/// The checks, in the order they must run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckKind {
    LocalesNaming,
    MissingTables,
    MissingColumns,
    LocalesParentKeys,
    RelationColumns,
    MissingIndexes,
    /// [`CheckKind::MissingIndexes`] restricted to localization side tables.
    LocalesIndexes,
}

impl CheckKind {
    /// Every check in dependency order: renames first so later checks see
    /// conforming names, tables before their columns, columns before the
    /// keys and indexes on them.
    pub const ALL: [CheckKind; 6] = [
        CheckKind::LocalesNaming,
        CheckKind::MissingTables,
        CheckKind::MissingColumns,
        CheckKind::LocalesParentKeys,
        CheckKind::RelationColumns,
        CheckKind::MissingIndexes,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CheckKind::LocalesNaming => "locales-naming",
            CheckKind::MissingTables => "missing-tables",
            CheckKind::MissingColumns => "missing-columns",
            CheckKind::LocalesParentKeys => "locales-parent-keys",
            CheckKind::RelationColumns => "relation-columns",
            CheckKind::MissingIndexes => "missing-indexes",
            CheckKind::LocalesIndexes => "locales-indexes",
        }
    }

    /// Which tables the check needs to see.
    pub fn scope(self, exp: &Expectations) -> TableFilter {
        match self {
            // Legacy tables are unknown by definition, and their parents
            // live under arbitrary names.
            CheckKind::LocalesNaming => TableFilter::All,
            CheckKind::MissingTables => {
                let mut names = exp.table_names();
                names.extend(
                    exp.tables
                        .iter()
                        .filter_map(|t| exp.naming.legacy_name(t.name)),
                );
                TableFilter::Named(names)
            }
            CheckKind::MissingColumns => TableFilter::Named(exp.table_names()),
            CheckKind::LocalesParentKeys => {
                let mut names: Vec<String> = Vec::new();
                for spec in exp.tables.iter().filter(|t| exp.is_locales(t.name)) {
                    names.push(spec.name.to_string());
                    if let Some(parent) = spec.kind.parent() {
                        names.push(parent.to_string());
                    }
                }
                TableFilter::Named(names)
            }
            CheckKind::RelationColumns => {
                let mut names: Vec<String> = Vec::new();
                for rel in exp.relations {
                    for name in [rel.table, rel.references] {
                        if !names.iter().any(|n| n == name) {
                            names.push(name.to_string());
                        }
                    }
                }
                TableFilter::Named(names)
            }
            // Index names are schema-wide, so a clash can come from any table.
            CheckKind::MissingIndexes | CheckKind::LocalesIndexes => TableFilter::All,
        }
    }

    /// Plan the findings for this check against `catalog`.
    pub fn plan(
        self,
        catalog: &Catalog,
        exp: &Expectations,
        policy: DuplicatePolicy,
    ) -> Vec<Finding> {
        match self {
            CheckKind::LocalesNaming => naming::plan(catalog, exp, policy),
            CheckKind::MissingTables => missing_table::plan(catalog, exp),
            CheckKind::MissingColumns => missing_column::plan(catalog, exp),
            CheckKind::LocalesParentKeys => parent_key::plan(catalog, exp),
            CheckKind::RelationColumns => relation::plan(catalog, exp),
            CheckKind::MissingIndexes | CheckKind::LocalesIndexes => index::plan(catalog, exp, self),
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use driftfix_schema::{
        ColumnDescriptor, ConstraintDescriptor, ConstraintKind, ForeignKeyDescriptor,
        IndexDescriptor, OnDelete, TableDescriptor,
    };

    /// Build a table descriptor the way the inventory reader would.
    pub struct TableBuilder(TableDescriptor);

    pub fn table(name: &str) -> TableBuilder {
        TableBuilder(TableDescriptor::new(name))
    }

    impl TableBuilder {
        pub fn column(mut self, name: &str, data_type: &str) -> Self {
            self.0.columns.push(ColumnDescriptor {
                name: name.to_string(),
                data_type: data_type.to_string(),
                nullable: true,
                default: None,
            });
            self
        }

        /// A `serial` primary key the way Postgres materializes it.
        pub fn serial_id(mut self) -> Self {
            let table = self.0.name.clone();
            self.0.columns.push(ColumnDescriptor {
                name: "id".to_string(),
                data_type: "integer".to_string(),
                nullable: false,
                default: Some(format!("nextval('{}_id_seq'::regclass)", table)),
            });
            self.0.constraints.push(ConstraintDescriptor {
                name: format!("{}_pkey", table),
                kind: ConstraintKind::PrimaryKey,
            });
            self.0.indexes.push(IndexDescriptor {
                name: format!("{}_pkey", table),
                definition: format!("CREATE UNIQUE INDEX {0}_pkey ON public.{0} USING btree (id)", table),
                columns: vec!["id".to_string()],
                unique: true,
                primary: true,
                backs_constraint: true,
            });
            self.0.sequences.push(format!("{}_id_seq", table));
            self
        }

        pub fn index(mut self, name: &str, columns: &[&str]) -> Self {
            self.0.indexes.push(IndexDescriptor {
                name: name.to_string(),
                definition: String::new(),
                columns: columns.iter().map(|c| c.to_string()).collect(),
                unique: false,
                primary: false,
                backs_constraint: false,
            });
            self
        }

        pub fn foreign_key(mut self, name: &str, column: &str, references: &str, on_delete: OnDelete) -> Self {
            self.0.foreign_keys.push(ForeignKeyDescriptor {
                name: name.to_string(),
                columns: vec![column.to_string()],
                references_table: references.to_string(),
                references_columns: vec!["id".to_string()],
                on_delete,
            });
            self.0.constraints.push(ConstraintDescriptor {
                name: name.to_string(),
                kind: ConstraintKind::ForeignKey,
            });
            self
        }

        pub fn build(self) -> TableDescriptor {
            self.0
        }
    }
}
