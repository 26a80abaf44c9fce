//! Catalog descriptor types for driftfix.
//!
//! These types describe what the inventory reader finds in Postgres's
//! catalog: tables, their columns, indexes, constraints and foreign keys.
//! They are plain data, read fresh for every check and thrown away after.

use indexmap::IndexMap;
use std::fmt;

/// Longest identifier Postgres keeps (NAMEDATALEN - 1). Longer names are
/// silently truncated by the server.
pub const MAX_IDENT_LEN: usize = 63;

/// A PostgreSQL string literal wrapper.
///
/// Display writes the value escaped and quoted with single quotes.
///
/// # Example
/// ```
/// use driftfix_schema::Lit;
/// assert_eq!(format!("{}", Lit("pages")), "'pages'");
/// assert_eq!(format!("{}", Lit("it's")), "'it''s'");
/// ```
pub struct Lit<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> fmt::Display for Lit<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.0.as_ref().replace('\'', "''"))
    }
}

/// A PostgreSQL identifier wrapper.
///
/// Display writes the value escaped and quoted with double quotes.
///
/// # Example
/// ```
/// use driftfix_schema::Ident;
/// assert_eq!(format!("{}", Ident("order")), "\"order\"");
/// assert_eq!(format!("{}", Ident("bla\"h")), "\"bla\"\"h\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0.as_ref().replace('"', "\"\""))
    }
}

/// Quote a PostgreSQL identifier.
pub fn quote_ident(name: &str) -> String {
    Ident(name).to_string()
}

/// Schema-qualified, quoted relation name: `"public"."pages__locales"`.
pub fn qualified(schema: &str, name: &str) -> String {
    format!("{}.{}", Ident(schema), Ident(name))
}

/// Clamp a generated identifier to what Postgres will actually store.
///
/// Truncation happens on a char boundary so the result stays valid UTF-8.
pub fn fit_identifier(name: &str) -> String {
    if name.len() <= MAX_IDENT_LEN {
        return name.to_string();
    }
    let mut end = MAX_IDENT_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

fn column_stem(column: &str) -> &str {
    column.trim_start_matches('_')
}

/// Standard index name for a table and columns: `{table}_{columns}_idx`.
///
/// Leading underscores of CMS-internal columns are dropped so `_parent_id`
/// contributes `parent_id`.
///
/// ```
/// assert_eq!(driftfix_schema::index_name("pages__locales", &["_parent_id"]), "pages__locales_parent_id_idx");
/// assert_eq!(driftfix_schema::index_name("pages_rels", &["parent_id", "path"]), "pages_rels_parent_id_path_idx");
/// ```
pub fn index_name(table: &str, columns: &[impl AsRef<str>]) -> String {
    let cols: Vec<&str> = columns.iter().map(|c| column_stem(c.as_ref())).collect();
    fit_identifier(&format!("{}_{}_idx", table, cols.join("_")))
}

/// Standard foreign key name: `{table}_{column}_{references}_id_fk`.
///
/// ```
/// assert_eq!(
///     driftfix_schema::foreign_key_name("voiceovers", "full_demo_reel_id", "media"),
///     "voiceovers_full_demo_reel_id_media_id_fk"
/// );
/// ```
pub fn foreign_key_name(table: &str, column: &str, references: &str) -> String {
    fit_identifier(&format!(
        "{}_{}_{}_id_fk",
        table,
        column_stem(column),
        references
    ))
}

/// Referential action taken when the referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnDelete {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl OnDelete {
    /// Decode `pg_constraint.confdeltype`.
    pub fn from_catalog_code(code: &str) -> Self {
        match code {
            "r" => OnDelete::Restrict,
            "c" => OnDelete::Cascade,
            "n" => OnDelete::SetNull,
            "d" => OnDelete::SetDefault,
            _ => OnDelete::NoAction,
        }
    }

    pub fn to_sql(self) -> &'static str {
        match self {
            OnDelete::NoAction => "NO ACTION",
            OnDelete::Restrict => "RESTRICT",
            OnDelete::Cascade => "CASCADE",
            OnDelete::SetNull => "SET NULL",
            OnDelete::SetDefault => "SET DEFAULT",
        }
    }
}

impl fmt::Display for OnDelete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_sql())
    }
}

/// A column as found in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Declared type as rendered by `format_type`, e.g. `integer` or
    /// `timestamp(3) with time zone`.
    pub data_type: String,
    pub nullable: bool,
    /// Default expression, if any.
    pub default: Option<String>,
}

/// An index as found in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub name: String,
    /// Full `CREATE INDEX` statement from `pg_get_indexdef`.
    pub definition: String,
    /// Indexed columns in key order. Expression indexes contribute nothing.
    pub columns: Vec<String>,
    pub unique: bool,
    pub primary: bool,
    /// Whether the index is owned by a constraint (primary key, unique,
    /// exclusion). Such indexes are renamed through their constraint.
    pub backs_constraint: bool,
}

impl IndexDescriptor {
    /// True if this index's key starts with exactly `columns`.
    pub fn leads_with(&self, columns: &[impl AsRef<str>]) -> bool {
        !columns.is_empty()
            && self.columns.len() >= columns.len()
            && self
                .columns
                .iter()
                .zip(columns)
                .all(|(have, want)| have == want.as_ref())
    }
}

/// A foreign key constraint as found in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDescriptor {
    pub name: String,
    pub columns: Vec<String>,
    pub references_table: String,
    pub references_columns: Vec<String>,
    pub on_delete: OnDelete,
}

/// Constraint kinds, decoded from `pg_constraint.contype`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    ForeignKey,
    Check,
    Exclusion,
    Other,
}

impl ConstraintKind {
    pub fn from_catalog_code(code: &str) -> Self {
        match code {
            "p" => ConstraintKind::PrimaryKey,
            "u" => ConstraintKind::Unique,
            "f" => ConstraintKind::ForeignKey,
            "c" => ConstraintKind::Check,
            "x" => ConstraintKind::Exclusion,
            _ => ConstraintKind::Other,
        }
    }
}

/// Any named constraint on a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintDescriptor {
    pub name: String,
    pub kind: ConstraintKind,
}

/// Everything the inventory reader knows about one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub indexes: Vec<IndexDescriptor>,
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
    pub constraints: Vec<ConstraintDescriptor>,
    /// Sequences owned by this table's columns (serial ids).
    pub sequences: Vec<String>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// The foreign key whose sole column is `column`, if any.
    pub fn foreign_key_on(&self, column: &str) -> Option<&ForeignKeyDescriptor> {
        self.foreign_keys
            .iter()
            .find(|fk| fk.columns.len() == 1 && fk.columns[0] == column)
    }

    /// True if some index can serve filters on `columns`.
    pub fn has_index_leading_with(&self, columns: &[impl AsRef<str>]) -> bool {
        self.indexes.iter().any(|idx| idx.leads_with(columns))
    }
}

/// Tables read for one check, keyed by name in catalog order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub tables: IndexMap<String, TableDescriptor>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: TableDescriptor) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn get(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl FromIterator<TableDescriptor> for Catalog {
    fn from_iter<I: IntoIterator<Item = TableDescriptor>>(iter: I) -> Self {
        let mut catalog = Catalog::new();
        for table in iter {
            catalog.insert(table);
        }
        catalog
    }
}

/// Which tables an inventory read should cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableFilter {
    All,
    Named(Vec<String>),
    EndsWith(String),
}

impl TableFilter {
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TableFilter::Named(names.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, table: &str) -> bool {
        match self {
            TableFilter::All => true,
            TableFilter::Named(names) => names.iter().any(|n| n == table),
            TableFilter::EndsWith(suffix) => table.ends_with(suffix.as_str()),
        }
    }
}
