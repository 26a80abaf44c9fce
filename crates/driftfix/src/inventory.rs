//! Inventory reader: what the catalog says is actually there.
//!
//! Every call goes back to `pg_catalog`; nothing is cached. A table that
//! does not exist yields empty results or `None`, never an error.

use driftfix_schema::{
    Catalog, ColumnDescriptor, ConstraintDescriptor, ConstraintKind, ForeignKeyDescriptor,
    IndexDescriptor, OnDelete, TableDescriptor, TableFilter, qualified,
};
use indexmap::IndexMap;

use crate::Result;
use crate::traced::TracedConn;

const TABLES_SQL: &str = "\
SELECT c.relname::text
FROM pg_class c
JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname::text = $1
  AND c.relkind IN ('r', 'p')
ORDER BY c.relname";

const COLUMNS_SQL: &str = "\
SELECT t.relname::text,
       a.attname::text,
       format_type(a.atttypid, a.atttypmod),
       NOT a.attnotnull,
       pg_get_expr(d.adbin, d.adrelid)
FROM pg_attribute a
JOIN pg_class t ON t.oid = a.attrelid
JOIN pg_namespace n ON n.oid = t.relnamespace
LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
WHERE n.nspname::text = $1
  AND t.relkind IN ('r', 'p')
  AND ($2::text[] IS NULL OR t.relname::text = ANY($2::text[]))
  AND a.attnum > 0
  AND NOT a.attisdropped
ORDER BY t.relname, a.attnum";

const INDEXES_SQL: &str = "\
SELECT t.relname::text,
       i.relname::text,
       pg_get_indexdef(ix.indexrelid),
       ARRAY(
           SELECT a.attname::text
           FROM unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
           JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
           ORDER BY k.ord
       ),
       ix.indisunique,
       ix.indisprimary,
       EXISTS (
           SELECT 1 FROM pg_constraint c
           WHERE c.conindid = ix.indexrelid
             AND c.conrelid = t.oid
             AND c.contype IN ('p', 'u', 'x')
       )
FROM pg_index ix
JOIN pg_class t ON t.oid = ix.indrelid
JOIN pg_class i ON i.oid = ix.indexrelid
JOIN pg_namespace n ON n.oid = t.relnamespace
WHERE n.nspname::text = $1
  AND ($2::text[] IS NULL OR t.relname::text = ANY($2::text[]))
ORDER BY t.relname, i.relname";

const FOREIGN_KEYS_SQL: &str = "\
SELECT t.relname::text,
       c.conname::text,
       ARRAY(
           SELECT a.attname::text
           FROM unnest(c.conkey) WITH ORDINALITY AS k(attnum, ord)
           JOIN pg_attribute a ON a.attrelid = c.conrelid AND a.attnum = k.attnum
           ORDER BY k.ord
       ),
       r.relname::text,
       ARRAY(
           SELECT a.attname::text
           FROM unnest(c.confkey) WITH ORDINALITY AS k(attnum, ord)
           JOIN pg_attribute a ON a.attrelid = c.confrelid AND a.attnum = k.attnum
           ORDER BY k.ord
       ),
       c.confdeltype::text
FROM pg_constraint c
JOIN pg_class t ON t.oid = c.conrelid
JOIN pg_class r ON r.oid = c.confrelid
JOIN pg_namespace n ON n.oid = t.relnamespace
WHERE c.contype = 'f'
  AND n.nspname::text = $1
  AND ($2::text[] IS NULL OR t.relname::text = ANY($2::text[]))
ORDER BY t.relname, c.conname";

const CONSTRAINTS_SQL: &str = "\
SELECT t.relname::text, c.conname::text, c.contype::text
FROM pg_constraint c
JOIN pg_class t ON t.oid = c.conrelid
JOIN pg_namespace n ON n.oid = t.relnamespace
WHERE n.nspname::text = $1
  AND ($2::text[] IS NULL OR t.relname::text = ANY($2::text[]))
ORDER BY t.relname, c.conname";

const SEQUENCES_SQL: &str = "\
SELECT t.relname::text, s.relname::text
FROM pg_class s
JOIN pg_depend d ON d.objid = s.oid
    AND d.classid = 'pg_class'::regclass
    AND d.refclassid = 'pg_class'::regclass
JOIN pg_class t ON t.oid = d.refobjid
JOIN pg_namespace n ON n.oid = t.relnamespace
WHERE s.relkind = 'S'
  AND d.deptype IN ('a', 'i')
  AND n.nspname::text = $1
  AND ($2::text[] IS NULL OR t.relname::text = ANY($2::text[]))
ORDER BY t.relname, s.relname";

/// Read-only view of one schema's catalog.
pub struct Inventory<'a> {
    conn: &'a TracedConn,
    schema: &'a str,
}

impl<'a> Inventory<'a> {
    pub fn new(conn: &'a TracedConn, schema: &'a str) -> Self {
        Self { conn, schema }
    }

    /// Names of the tables matching `filter`, in name order.
    pub async fn tables(&self, filter: &TableFilter) -> Result<Vec<String>> {
        let rows = self.conn.query(TABLES_SQL, &[&self.schema]).await?;
        Ok(rows
            .iter()
            .map(|row| row.get::<_, String>(0))
            .filter(|name| filter.matches(name))
            .collect())
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let wanted = TableFilter::named([table]);
        Ok(!self.tables(&wanted).await?.is_empty())
    }

    pub async fn columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let mut by_table = self.fetch_columns(Some(vec![table.to_string()])).await?;
        Ok(by_table.shift_remove(table).unwrap_or_default())
    }

    pub async fn indexes(&self, table: &str) -> Result<Vec<IndexDescriptor>> {
        let mut by_table = self.fetch_indexes(Some(vec![table.to_string()])).await?;
        Ok(by_table.shift_remove(table).unwrap_or_default())
    }

    pub async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyDescriptor>> {
        let mut by_table = self.fetch_foreign_keys(Some(vec![table.to_string()])).await?;
        Ok(by_table.shift_remove(table).unwrap_or_default())
    }

    pub async fn constraints(&self, table: &str) -> Result<Vec<ConstraintDescriptor>> {
        let mut by_table = self.fetch_constraints(Some(vec![table.to_string()])).await?;
        Ok(by_table.shift_remove(table).unwrap_or_default())
    }

    pub async fn sequences(&self, table: &str) -> Result<Vec<String>> {
        let mut by_table = self.fetch_sequences(Some(vec![table.to_string()])).await?;
        Ok(by_table.shift_remove(table).unwrap_or_default())
    }

    /// Full description of one table, or `None` if it does not exist.
    pub async fn describe(&self, table: &str) -> Result<Option<TableDescriptor>> {
        let catalog = self.catalog(&TableFilter::named([table])).await?;
        Ok(catalog.tables.into_values().next())
    }

    /// Describe every table matching `filter` with one query per catalog
    /// view, rather than one round-trip per table.
    pub async fn catalog(&self, filter: &TableFilter) -> Result<Catalog> {
        let names = self.tables(filter).await?;
        if names.is_empty() {
            return Ok(Catalog::new());
        }

        let scope = Some(names.clone());
        let mut columns = self.fetch_columns(scope.clone()).await?;
        let mut indexes = self.fetch_indexes(scope.clone()).await?;
        let mut foreign_keys = self.fetch_foreign_keys(scope.clone()).await?;
        let mut constraints = self.fetch_constraints(scope.clone()).await?;
        let mut sequences = self.fetch_sequences(scope).await?;

        Ok(names
            .into_iter()
            .map(|name| TableDescriptor {
                columns: columns.shift_remove(&name).unwrap_or_default(),
                indexes: indexes.shift_remove(&name).unwrap_or_default(),
                foreign_keys: foreign_keys.shift_remove(&name).unwrap_or_default(),
                constraints: constraints.shift_remove(&name).unwrap_or_default(),
                sequences: sequences.shift_remove(&name).unwrap_or_default(),
                name,
            })
            .collect())
    }

    /// Exact row count, used before discarding a table.
    pub async fn row_count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT count(*) FROM {}", qualified(self.schema, table));
        let row = self.conn.query_one(&sql, &[]).await?;
        Ok(row.get(0))
    }

    async fn fetch_columns(
        &self,
        tables: Option<Vec<String>>,
    ) -> Result<IndexMap<String, Vec<ColumnDescriptor>>> {
        let rows = self.conn.query(COLUMNS_SQL, &[&self.schema, &tables]).await?;
        let mut out: IndexMap<String, Vec<ColumnDescriptor>> = IndexMap::new();
        for row in rows {
            out.entry(row.get(0)).or_default().push(ColumnDescriptor {
                name: row.get(1),
                data_type: row.get(2),
                nullable: row.get(3),
                default: row.get(4),
            });
        }
        Ok(out)
    }

    async fn fetch_indexes(
        &self,
        tables: Option<Vec<String>>,
    ) -> Result<IndexMap<String, Vec<IndexDescriptor>>> {
        let rows = self.conn.query(INDEXES_SQL, &[&self.schema, &tables]).await?;
        let mut out: IndexMap<String, Vec<IndexDescriptor>> = IndexMap::new();
        for row in rows {
            out.entry(row.get(0)).or_default().push(IndexDescriptor {
                name: row.get(1),
                definition: row.get(2),
                columns: row.get(3),
                unique: row.get(4),
                primary: row.get(5),
                backs_constraint: row.get(6),
            });
        }
        Ok(out)
    }

    async fn fetch_foreign_keys(
        &self,
        tables: Option<Vec<String>>,
    ) -> Result<IndexMap<String, Vec<ForeignKeyDescriptor>>> {
        let rows = self
            .conn
            .query(FOREIGN_KEYS_SQL, &[&self.schema, &tables])
            .await?;
        let mut out: IndexMap<String, Vec<ForeignKeyDescriptor>> = IndexMap::new();
        for row in rows {
            let on_delete: String = row.get(5);
            out.entry(row.get(0)).or_default().push(ForeignKeyDescriptor {
                name: row.get(1),
                columns: row.get(2),
                references_table: row.get(3),
                references_columns: row.get(4),
                on_delete: OnDelete::from_catalog_code(&on_delete),
            });
        }
        Ok(out)
    }

    async fn fetch_constraints(
        &self,
        tables: Option<Vec<String>>,
    ) -> Result<IndexMap<String, Vec<ConstraintDescriptor>>> {
        let rows = self
            .conn
            .query(CONSTRAINTS_SQL, &[&self.schema, &tables])
            .await?;
        let mut out: IndexMap<String, Vec<ConstraintDescriptor>> = IndexMap::new();
        for row in rows {
            let kind: String = row.get(2);
            out.entry(row.get(0)).or_default().push(ConstraintDescriptor {
                name: row.get(1),
                kind: ConstraintKind::from_catalog_code(&kind),
            });
        }
        Ok(out)
    }

    async fn fetch_sequences(
        &self,
        tables: Option<Vec<String>>,
    ) -> Result<IndexMap<String, Vec<String>>> {
        let rows = self
            .conn
            .query(SEQUENCES_SQL, &[&self.schema, &tables])
            .await?;
        let mut out: IndexMap<String, Vec<String>> = IndexMap::new();
        for row in rows {
            out.entry(row.get(0)).or_default().push(row.get(1));
        }
        Ok(out)
    }
}
