//! The expectation set: which tables, columns and relationships the CMS's
//! query layer assumes exist, and how its side tables must be named.
//!
//! This is data, not logic. It mirrors the content types of the voice-over
//! marketplace; changing a collection there means changing it here.

use driftfix_schema::{OnDelete, index_name};

/// What role a table plays for the CMS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// A content type's main table.
    Collection,
    /// Per-locale values of a localized content type.
    Locales { parent: &'static str },
    /// Polymorphic relationship rows of a content type.
    Rels { parent: &'static str },
}

impl TableKind {
    pub fn parent(self) -> Option<&'static str> {
        match self {
            TableKind::Collection => None,
            TableKind::Locales { parent } | TableKind::Rels { parent } => Some(parent),
        }
    }

    /// The column linking a side table back to its parent row.
    pub fn parent_column(self) -> Option<&'static str> {
        match self {
            TableKind::Collection => None,
            TableKind::Locales { .. } => Some("_parent_id"),
            TableKind::Rels { .. } => Some("parent_id"),
        }
    }

    /// Columns a freshly created table of this kind starts with.
    pub fn baseline(self) -> &'static [ColumnSpec] {
        match self {
            TableKind::Collection => COLLECTION_BASELINE,
            TableKind::Locales { .. } => LOCALES_BASELINE,
            TableKind::Rels { .. } => RELS_BASELINE,
        }
    }
}

/// An expected column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub pg_type: &'static str,
    pub nullable: bool,
    pub default: Option<&'static str>,
    pub primary_key: bool,
}

impl ColumnSpec {
    /// A nullable column without default.
    pub const fn optional(name: &'static str, pg_type: &'static str) -> Self {
        Self {
            name,
            pg_type,
            nullable: true,
            default: None,
            primary_key: false,
        }
    }

    /// A NOT NULL column without default.
    pub const fn required(name: &'static str, pg_type: &'static str) -> Self {
        Self {
            name,
            pg_type,
            nullable: false,
            default: None,
            primary_key: false,
        }
    }

    /// A NOT NULL column with a default that backfills existing rows.
    pub const fn defaulted(
        name: &'static str,
        pg_type: &'static str,
        default: &'static str,
    ) -> Self {
        Self {
            name,
            pg_type,
            nullable: false,
            default: Some(default),
            primary_key: false,
        }
    }

    pub const fn serial_key(name: &'static str) -> Self {
        Self {
            name,
            pg_type: "serial",
            nullable: false,
            default: None,
            primary_key: true,
        }
    }

    /// The shape in which this column can be added to a populated table.
    ///
    /// A NOT NULL column without a default would reject existing rows, so
    /// it is added nullable instead.
    pub fn addable(self) -> Self {
        if !self.nullable && self.default.is_none() {
            Self {
                nullable: true,
                ..self
            }
        } else {
            self
        }
    }
}

/// An expected table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub kind: TableKind,
    /// Declared columns beyond the kind's baseline.
    pub columns: &'static [ColumnSpec],
}

impl TableSpec {
    /// Baseline plus declared columns, baseline first.
    pub fn required_columns(&self) -> impl Iterator<Item = &'static ColumnSpec> {
        self.kind.baseline().iter().chain(self.columns.iter())
    }
}

/// An upload or relationship field: an integer column pointing at another
/// table's `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationSpec {
    pub table: &'static str,
    pub column: &'static str,
    pub references: &'static str,
    pub on_delete: OnDelete,
}

impl RelationSpec {
    pub const fn upload(table: &'static str, column: &'static str) -> Self {
        Self {
            table,
            column,
            references: "media",
            on_delete: OnDelete::SetNull,
        }
    }

    pub const fn to(table: &'static str, column: &'static str, references: &'static str) -> Self {
        Self {
            table,
            column,
            references,
            on_delete: OnDelete::SetNull,
        }
    }
}

/// An index the CMS's filters rely on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub table: &'static str,
    pub columns: Vec<&'static str>,
}

impl IndexSpec {
    pub fn name(&self) -> String {
        index_name(self.table, &self.columns)
    }
}

/// Side tables of localized content types must end in `__locales`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamingRule {
    pub legacy_suffix: &'static str,
    pub expected_suffix: &'static str,
}

impl NamingRule {
    pub const LOCALES: NamingRule = NamingRule {
        legacy_suffix: "_locales",
        expected_suffix: "__locales",
    };

    /// True if `table` uses the legacy single-underscore form.
    pub fn is_violation(&self, table: &str) -> bool {
        table.ends_with(self.legacy_suffix)
            && !table.ends_with(self.expected_suffix)
            && table.len() > self.legacy_suffix.len()
    }

    /// Parent content type of a side table in either form.
    pub fn parent_of<'t>(&self, table: &'t str) -> Option<&'t str> {
        table
            .strip_suffix(self.expected_suffix)
            .or_else(|| table.strip_suffix(self.legacy_suffix))
            .filter(|parent| !parent.is_empty())
    }

    /// The conforming name for a legacy table.
    pub fn corrected(&self, table: &str) -> Option<String> {
        if !self.is_violation(table) {
            return None;
        }
        let parent = &table[..table.len() - self.legacy_suffix.len()];
        Some(format!("{}{}", parent, self.expected_suffix))
    }

    /// The legacy name a conforming table would have had.
    pub fn legacy_name(&self, table: &str) -> Option<String> {
        table
            .strip_suffix(self.expected_suffix)
            .filter(|parent| !parent.is_empty())
            .map(|parent| format!("{}{}", parent, self.legacy_suffix))
    }
}

/// Carry an object name (constraint, index, sequence) over a table rename.
///
/// Only names derived from the old table name are touched: the old name must
/// be followed by `_` or end the string.
pub fn carry_name(name: &str, old_table: &str, new_table: &str) -> Option<String> {
    let rest = name.strip_prefix(old_table)?;
    if rest.is_empty() || rest.starts_with('_') {
        Some(driftfix_schema::fit_identifier(&format!("{}{}", new_table, rest)))
    } else {
        None
    }
}

/// The complete expectation set.
#[derive(Debug, Clone, Copy)]
pub struct Expectations {
    pub tables: &'static [TableSpec],
    pub relations: &'static [RelationSpec],
    pub naming: NamingRule,
}

impl Expectations {
    /// Expectations for the voice-over marketplace schema.
    pub fn marketplace() -> Self {
        MARKETPLACE
    }

    pub fn table(&self, name: &str) -> Option<&'static TableSpec> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// True if `name` is an expected localization side table.
    pub fn is_locales(&self, name: &str) -> bool {
        self.table(name)
            .is_some_and(|t| matches!(t.kind, TableKind::Locales { .. }))
    }

    pub fn relations_for<'s>(&'s self, table: &'s str) -> impl Iterator<Item = &'static RelationSpec> + 's {
        self.relations.iter().filter(move |r| r.table == table)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.to_string()).collect()
    }

    /// Indexes derived from table kinds and relationship columns.
    pub fn indexes(&self) -> Vec<IndexSpec> {
        let mut out = Vec::new();
        for table in self.tables {
            match table.kind {
                TableKind::Collection => {}
                TableKind::Locales { .. } => {
                    out.push(IndexSpec {
                        table: table.name,
                        columns: vec!["_parent_id"],
                    });
                    out.push(IndexSpec {
                        table: table.name,
                        columns: vec!["_locale"],
                    });
                }
                TableKind::Rels { .. } => {
                    out.push(IndexSpec {
                        table: table.name,
                        columns: vec!["parent_id"],
                    });
                    out.push(IndexSpec {
                        table: table.name,
                        columns: vec!["path"],
                    });
                }
            }
        }
        for rel in self.relations {
            out.push(IndexSpec {
                table: rel.table,
                columns: vec![rel.column],
            });
        }
        out
    }
}

const TIMESTAMPTZ: &str = "timestamp(3) with time zone";

const COLLECTION_BASELINE: &[ColumnSpec] = &[
    ColumnSpec::serial_key("id"),
    ColumnSpec::defaulted("updated_at", TIMESTAMPTZ, "now()"),
    ColumnSpec::defaulted("created_at", TIMESTAMPTZ, "now()"),
];

const LOCALES_BASELINE: &[ColumnSpec] = &[
    ColumnSpec::serial_key("id"),
    ColumnSpec::required("_locale", "varchar"),
    ColumnSpec::required("_parent_id", "integer"),
];

const RELS_BASELINE: &[ColumnSpec] = &[
    ColumnSpec::serial_key("id"),
    ColumnSpec::optional("order", "integer"),
    ColumnSpec::required("parent_id", "integer"),
    ColumnSpec::required("path", "varchar"),
];

const MARKETPLACE: Expectations = Expectations {
    tables: &[
        TableSpec {
            name: "users",
            kind: TableKind::Collection,
            columns: &[
                ColumnSpec::required("email", "varchar"),
                ColumnSpec::optional("name", "varchar"),
                ColumnSpec::defaulted("role", "varchar", "'customer'"),
                ColumnSpec::optional("reset_password_token", "varchar"),
                ColumnSpec::optional("reset_password_expiration", TIMESTAMPTZ),
                ColumnSpec::defaulted("login_attempts", "numeric", "0"),
                ColumnSpec::optional("lock_until", TIMESTAMPTZ),
            ],
        },
        TableSpec {
            name: "media",
            kind: TableKind::Collection,
            columns: &[
                ColumnSpec::optional("alt", "varchar"),
                ColumnSpec::optional("url", "varchar"),
                ColumnSpec::optional("thumbnail_u_r_l", "varchar"),
                ColumnSpec::optional("filename", "varchar"),
                ColumnSpec::optional("mime_type", "varchar"),
                ColumnSpec::optional("filesize", "numeric"),
            ],
        },
        TableSpec {
            name: "voiceovers",
            kind: TableKind::Collection,
            columns: &[
                ColumnSpec::required("name", "varchar"),
                ColumnSpec::optional("slug", "varchar"),
                ColumnSpec::defaulted("featured", "boolean", "false"),
                ColumnSpec::defaulted("status", "varchar", "'draft'"),
                ColumnSpec::optional("starting_price", "numeric"),
                ColumnSpec::optional("published_at", TIMESTAMPTZ),
            ],
        },
        TableSpec {
            name: "voiceovers__locales",
            kind: TableKind::Locales {
                parent: "voiceovers",
            },
            columns: &[
                ColumnSpec::optional("tagline", "varchar"),
                ColumnSpec::optional("bio", "varchar"),
            ],
        },
        TableSpec {
            name: "pages",
            kind: TableKind::Collection,
            columns: &[
                ColumnSpec::optional("slug", "varchar"),
                ColumnSpec::defaulted("show_in_nav", "boolean", "false"),
                ColumnSpec::optional("published_at", TIMESTAMPTZ),
            ],
        },
        TableSpec {
            name: "pages__locales",
            kind: TableKind::Locales { parent: "pages" },
            columns: &[
                ColumnSpec::optional("title", "varchar"),
                ColumnSpec::optional("meta_title", "varchar"),
                ColumnSpec::optional("meta_description", "varchar"),
            ],
        },
        TableSpec {
            name: "pages_rels",
            kind: TableKind::Rels { parent: "pages" },
            columns: &[
                ColumnSpec::optional("voiceovers_id", "integer"),
                ColumnSpec::optional("media_id", "integer"),
            ],
        },
        TableSpec {
            name: "posts",
            kind: TableKind::Collection,
            columns: &[
                ColumnSpec::optional("slug", "varchar"),
                ColumnSpec::defaulted("featured", "boolean", "false"),
                ColumnSpec::optional("published_at", TIMESTAMPTZ),
            ],
        },
        TableSpec {
            name: "posts__locales",
            kind: TableKind::Locales { parent: "posts" },
            columns: &[
                ColumnSpec::optional("title", "varchar"),
                ColumnSpec::optional("excerpt", "varchar"),
            ],
        },
        TableSpec {
            name: "bookings",
            kind: TableKind::Collection,
            columns: &[
                ColumnSpec::optional("client_name", "varchar"),
                ColumnSpec::optional("client_email", "varchar"),
                ColumnSpec::defaulted("status", "varchar", "'pending'"),
                ColumnSpec::optional("word_count", "numeric"),
                ColumnSpec::optional("quoted_price", "numeric"),
                ColumnSpec::defaulted("rush", "boolean", "false"),
            ],
        },
        TableSpec {
            name: "email_campaigns",
            kind: TableKind::Collection,
            columns: &[
                ColumnSpec::required("name", "varchar"),
                ColumnSpec::optional("subject", "varchar"),
                ColumnSpec::defaulted("status", "varchar", "'draft'"),
                ColumnSpec::optional("scheduled_at", TIMESTAMPTZ),
                ColumnSpec::optional("sent_at", TIMESTAMPTZ),
            ],
        },
    ],
    relations: &[
        RelationSpec::upload("voiceovers", "full_demo_reel_id"),
        RelationSpec::upload("voiceovers", "commercials_demo_id"),
        RelationSpec::upload("voiceovers", "narrative_demo_id"),
        RelationSpec::upload("voiceovers", "profile_image_id"),
        RelationSpec::to("bookings", "voiceover_id", "voiceovers"),
    ],
    naming: NamingRule::LOCALES,
};
