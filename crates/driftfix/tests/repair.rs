//! Integration tests against real PostgreSQL.
//!
//! Each test seeds a drifted schema in a fresh container, runs the checks,
//! and inspects the catalog afterwards.
//!
//! Run with: cargo nextest run -p driftfix --features test-postgres --test repair
//!
//! Note: Requires Docker to be running.

#![cfg(feature = "test-postgres")]

use driftfix::schema::{ConstraintKind, OnDelete, TableFilter};
use driftfix::{
    CheckKind, CheckState, Config, DuplicatePolicy, Guarded, Inventory, Mode, Report, guard,
    run_checks,
};
use std::time::Duration;
use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use tokio_postgres::{Client, NoTls};

struct TestDb {
    _container: ContainerAsync<Postgres>,
    client: Client,
    url: String,
}

/// Start postgres and return a seeding client plus the URL for driftfix.
async fn setup_postgres() -> TestDb {
    let container = Postgres::default()
        .start()
        .await
        .expect("failed to start postgres container");
    let host = container.get_host().await.expect("container host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("postgres port not available");
    let url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

    // Postgres may not accept connections the moment the port opens.
    let mut attempts = 0;
    let max_attempts = 10;
    let (client, connection) = loop {
        attempts += 1;
        match tokio_postgres::connect(&url, NoTls).await {
            Ok(result) => break result,
            Err(e) if attempts < max_attempts => {
                tracing::debug!("Connection attempt {} failed: {}, retrying...", attempts, e);
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            Err(e) => panic!(
                "failed to connect to postgres after {} attempts: {}",
                attempts, e
            ),
        }
    };

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("connection error: {}", e);
        }
    });

    TestDb {
        _container: container,
        client,
        url,
    }
}

impl TestDb {
    fn config(&self) -> Config {
        Config::new(self.url.clone())
    }

    async fn run(&self, checks: &[CheckKind], mode: Mode) -> Report {
        run_checks(&self.config(), checks, mode)
            .await
            .expect("checks should run")
    }

    async fn table_exists(&self, name: &str) -> bool {
        let row = self
            .client
            .query_one("SELECT to_regclass($1::text) IS NOT NULL", &[&format!("public.{}", name)])
            .await
            .unwrap();
        row.get(0)
    }

    async fn column_exists(&self, table: &str, column: &str) -> bool {
        let row = self
            .client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM information_schema.columns \
                 WHERE table_schema = 'public' AND table_name = $1 AND column_name = $2)",
                &[&table, &column],
            )
            .await
            .unwrap();
        row.get(0)
    }

    async fn index_exists(&self, name: &str) -> bool {
        let row = self
            .client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM pg_indexes WHERE schemaname = 'public' AND indexname = $1)",
                &[&name],
            )
            .await
            .unwrap();
        row.get(0)
    }

    async fn constraint_exists(&self, table: &str, name: &str) -> bool {
        let row = self
            .client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM pg_constraint WHERE conname = $1 AND conrelid = to_regclass($2::text))",
                &[&name, &format!("public.{}", table)],
            )
            .await
            .unwrap();
        row.get(0)
    }

    /// `(referenced table, confdeltype)` of the foreign key on `table.column`.
    async fn foreign_key(&self, table: &str, column: &str) -> Option<(String, String)> {
        self.foreign_keys(table, column).await.into_iter().next()
    }

    async fn foreign_keys(&self, table: &str, column: &str) -> Vec<(String, String)> {
        let rows = self
            .client
            .query(
                "SELECT r.relname::text, c.confdeltype::text
                 FROM pg_constraint c
                 JOIN pg_class t ON t.oid = c.conrelid
                 JOIN pg_class r ON r.oid = c.confrelid
                 JOIN pg_attribute a ON a.attrelid = c.conrelid AND a.attnum = c.conkey[1]
                 WHERE c.contype = 'f' AND t.relname = $1 AND a.attname = $2",
                &[&table, &column],
            )
            .await
            .unwrap();
        rows.iter().map(|row| (row.get(0), row.get(1))).collect()
    }

    async fn sequence_exists(&self, name: &str) -> bool {
        let row = self
            .client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM pg_class c JOIN pg_namespace n ON n.oid = c.relnamespace \
                 WHERE n.nspname = 'public' AND c.relkind = 'S' AND c.relname = $1)",
                &[&name],
            )
            .await
            .unwrap();
        row.get(0)
    }

    async fn row_count(&self, table: &str) -> i64 {
        let row = self
            .client
            .query_one(&format!("SELECT count(*) FROM public.{}", table), &[])
            .await
            .unwrap();
        row.get(0)
    }
}

async fn seed_legacy_pages_locales(db: &TestDb) {
    db.client
        .batch_execute(
            r#"
            CREATE TABLE pages (
                id serial PRIMARY KEY,
                slug varchar,
                updated_at timestamp(3) with time zone DEFAULT now() NOT NULL,
                created_at timestamp(3) with time zone DEFAULT now() NOT NULL
            );
            CREATE TABLE pages_locales (
                id serial PRIMARY KEY,
                title varchar,
                _locale varchar NOT NULL,
                _parent_id integer NOT NULL
            );
            CREATE INDEX pages_locales_parent_id_idx ON pages_locales (_parent_id);
            INSERT INTO pages (slug) VALUES ('home'), ('about');
            INSERT INTO pages_locales (title, _locale, _parent_id)
            VALUES ('Home', 'en', 1), ('Accueil', 'fr', 1), ('About', 'en', 2);
            "#,
        )
        .await
        .unwrap();
}

const FIX_LOCALES: &[CheckKind] = &[
    CheckKind::LocalesNaming,
    CheckKind::LocalesParentKeys,
    CheckKind::LocalesIndexes,
];

/// Nothing named after the legacy table survives the rename.
async fn assert_legacy_names_gone(db: &TestDb) {
    assert!(!db.index_exists("pages_locales_parent_id_idx").await);
    assert!(!db.index_exists("pages_locales_pkey").await);
    assert!(!db.constraint_exists("pages__locales", "pages_locales_pkey").await);
    assert!(!db.sequence_exists("pages_locales_id_seq").await);
    assert!(db.sequence_exists("pages__locales_id_seq").await);
}

#[tokio::test]
async fn legacy_locales_table_is_renamed_with_its_objects() {
    let db = setup_postgres().await;
    seed_legacy_pages_locales(&db).await;

    let report = db.run(FIX_LOCALES, Mode::Repair).await;
    assert!(report.healthy(), "{}", report);
    assert_legacy_names_gone(&db).await;

    assert!(!db.table_exists("pages_locales").await);
    assert!(db.table_exists("pages__locales").await);
    assert_eq!(db.row_count("pages__locales").await, 3);
    assert!(db.constraint_exists("pages__locales", "pages__locales_pkey").await);
    assert!(db.index_exists("pages__locales_parent_id_idx").await);
    assert!(db.index_exists("pages__locales_locale_idx").await);
    assert_eq!(
        db.foreign_key("pages__locales", "_parent_id").await,
        Some(("pages".to_string(), "c".to_string()))
    );

    // Serial ids keep working after the sequence was renamed.
    db.client
        .execute(
            "INSERT INTO pages__locales (title, _locale, _parent_id) VALUES ('À propos', 'fr', 2)",
            &[],
        )
        .await
        .unwrap();
    assert_eq!(db.row_count("pages__locales").await, 4);
}

#[tokio::test]
async fn second_run_executes_nothing() {
    let db = setup_postgres().await;
    seed_legacy_pages_locales(&db).await;

    let first = db.run(FIX_LOCALES, Mode::Repair).await;
    assert!(first.statements_executed > 0);

    let second = db.run(FIX_LOCALES, Mode::Repair).await;
    assert!(second.healthy(), "{}", second);
    assert_eq!(second.statements_executed, 0, "{}", second);
    assert_eq!(second.count(CheckState::Repaired), 0);
}

#[tokio::test]
async fn comprehensive_fix_renames_legacy_locales() {
    let db = setup_postgres().await;
    seed_legacy_pages_locales(&db).await;

    let report = db.run(&CheckKind::ALL, Mode::Repair).await;
    assert!(report.healthy(), "{}", report);

    assert!(!db.table_exists("pages_locales").await);
    assert_eq!(db.row_count("pages__locales").await, 3);
    assert!(db.constraint_exists("pages__locales", "pages__locales_pkey").await);
    assert!(db.index_exists("pages__locales_parent_id_idx").await);
    assert_legacy_names_gone(&db).await;
    assert_eq!(
        db.foreign_keys("pages__locales", "_parent_id").await,
        [("pages".to_string(), "c".to_string())]
    );

    let again = db.run(&CheckKind::ALL, Mode::Repair).await;
    assert_eq!(again.statements_executed, 0, "{}", again);
}

#[tokio::test]
async fn parent_key_without_cascade_is_replaced() {
    let db = setup_postgres().await;
    db.client
        .batch_execute(
            r#"
            CREATE TABLE pages (id serial PRIMARY KEY);
            CREATE TABLE pages_locales (
                id serial PRIMARY KEY,
                _locale varchar NOT NULL,
                _parent_id integer NOT NULL REFERENCES pages (id)
            );
            INSERT INTO pages DEFAULT VALUES;
            INSERT INTO pages_locales (_locale, _parent_id) VALUES ('en', 1);
            "#,
        )
        .await
        .unwrap();

    let report = db.run(&CheckKind::ALL, Mode::Repair).await;
    assert!(report.healthy(), "{}", report);
    assert_eq!(
        db.foreign_keys("pages__locales", "_parent_id").await,
        [("pages".to_string(), "c".to_string())]
    );

    let verify = db.run(&CheckKind::ALL, Mode::Verify).await;
    assert!(verify.healthy(), "{}", verify);

    db.client.execute("DELETE FROM pages", &[]).await.unwrap();
    assert_eq!(db.row_count("pages__locales").await, 0);
}

#[tokio::test]
async fn side_table_without_parent_settles_in_one_run() {
    let db = setup_postgres().await;
    db.client
        .batch_execute(
            "CREATE TABLE pages__locales (id serial PRIMARY KEY, _locale varchar NOT NULL, _parent_id integer NOT NULL)",
        )
        .await
        .unwrap();

    let first = db.run(&CheckKind::ALL, Mode::Repair).await;
    assert!(first.healthy(), "{}", first);
    assert_eq!(
        db.foreign_key("pages__locales", "_parent_id").await,
        Some(("pages".to_string(), "c".to_string()))
    );

    let second = db.run(&CheckKind::ALL, Mode::Repair).await;
    assert_eq!(second.statements_executed, 0, "{}", second);
    assert_eq!(second.count(CheckState::Repaired), 0, "{}", second);
}

#[tokio::test]
async fn index_name_taken_by_other_columns_needs_repair() {
    let db = setup_postgres().await;
    db.client
        .batch_execute(
            r#"
            CREATE TABLE pages (id serial PRIMARY KEY);
            CREATE TABLE pages__locales (
                id serial PRIMARY KEY,
                _locale varchar NOT NULL,
                _parent_id integer NOT NULL REFERENCES pages (id) ON DELETE CASCADE
            );
            CREATE INDEX pages__locales_locale_idx ON pages__locales (_parent_id);
            "#,
        )
        .await
        .unwrap();

    for _ in 0..2 {
        let report = db.run(FIX_LOCALES, Mode::Repair).await;
        assert_eq!(report.exit_code(), 1, "{}", report);
        assert_eq!(report.count(CheckState::NeedsRepair), 1, "{}", report);
        assert_eq!(report.count(CheckState::Repaired), 0, "{}", report);
        assert_eq!(report.statements_executed, 0, "{}", report);
    }
}

#[tokio::test]
async fn fix_locales_leaves_relation_indexes_alone() {
    let db = setup_postgres().await;
    seed_legacy_pages_locales(&db).await;
    db.client
        .batch_execute("CREATE TABLE bookings (id serial PRIMARY KEY, voiceover_id integer)")
        .await
        .unwrap();

    let report = db.run(FIX_LOCALES, Mode::Repair).await;
    assert!(report.healthy(), "{}", report);
    assert!(!db.index_exists("bookings_voiceover_id_idx").await);
    assert!(db.index_exists("pages__locales_locale_idx").await);
}

#[tokio::test]
async fn duplicate_with_dependents_is_not_dropped() {
    let db = setup_postgres().await;
    seed_legacy_pages_locales(&db).await;
    db.client
        .batch_execute(
            r#"
            CREATE TABLE pages__locales (id serial PRIMARY KEY, _parent_id integer);
            CREATE VIEW english_titles AS SELECT title FROM pages_locales WHERE _locale = 'en';
            "#,
        )
        .await
        .unwrap();

    let report = db.run(&[CheckKind::LocalesNaming], Mode::Repair).await;
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.count(CheckState::RepairFailed), 1, "{}", report);
    assert!(db.table_exists("pages_locales").await);
    assert!(db.table_exists("english_titles").await);
    assert_eq!(db.row_count("pages_locales").await, 3);
}

#[tokio::test]
async fn duplicate_legacy_table_is_dropped() {
    let db = setup_postgres().await;
    seed_legacy_pages_locales(&db).await;
    db.client
        .batch_execute(
            r#"
            CREATE TABLE pages__locales (
                id serial PRIMARY KEY,
                title varchar,
                _locale varchar NOT NULL,
                _parent_id integer NOT NULL REFERENCES pages (id) ON DELETE CASCADE
            );
            INSERT INTO pages__locales (title, _locale, _parent_id) VALUES ('Home', 'en', 1);
            "#,
        )
        .await
        .unwrap();

    let report = db.run(&[CheckKind::LocalesNaming], Mode::Repair).await;
    assert!(report.healthy(), "{}", report);
    assert!(!db.table_exists("pages_locales").await);
    assert_eq!(db.row_count("pages__locales").await, 1);
    assert!(
        report.results[0]
            .notes
            .iter()
            .any(|n| n.contains("3 rows discarded")),
        "{}",
        report
    );
}

#[tokio::test]
async fn duplicate_is_kept_when_policy_says_so() {
    let db = setup_postgres().await;
    seed_legacy_pages_locales(&db).await;
    db.client
        .batch_execute("CREATE TABLE pages__locales (id serial PRIMARY KEY)")
        .await
        .unwrap();

    let mut config = db.config();
    config.duplicate_policy = DuplicatePolicy::Keep;
    let report = run_checks(&config, &[CheckKind::LocalesNaming], Mode::Repair)
        .await
        .unwrap();

    assert_eq!(report.exit_code(), 1);
    assert!(db.table_exists("pages_locales").await);
    assert!(db.table_exists("pages__locales").await);
}

#[tokio::test]
async fn upload_columns_reference_media() {
    let db = setup_postgres().await;
    db.client
        .batch_execute(
            r#"
            CREATE TABLE media (id serial PRIMARY KEY, filename varchar);
            CREATE TABLE voiceovers (id serial PRIMARY KEY, name varchar NOT NULL);
            INSERT INTO voiceovers (name) VALUES ('Ada');
            "#,
        )
        .await
        .unwrap();

    let report = db.run(&[CheckKind::RelationColumns], Mode::Repair).await;
    assert!(report.healthy(), "{}", report);

    for column in [
        "full_demo_reel_id",
        "commercials_demo_id",
        "narrative_demo_id",
        "profile_image_id",
    ] {
        assert!(db.column_exists("voiceovers", column).await, "{}", column);
        assert_eq!(
            db.foreign_key("voiceovers", column).await,
            Some(("media".to_string(), "n".to_string())),
            "{}",
            column
        );
    }
}

#[tokio::test]
async fn upload_columns_without_media_skip_the_constraint() {
    let db = setup_postgres().await;
    db.client
        .batch_execute("CREATE TABLE voiceovers (id serial PRIMARY KEY, name varchar NOT NULL)")
        .await
        .unwrap();

    let report = db.run(&[CheckKind::RelationColumns], Mode::Repair).await;
    assert!(report.healthy(), "{}", report);
    assert!(db.column_exists("voiceovers", "full_demo_reel_id").await);
    assert_eq!(db.foreign_key("voiceovers", "full_demo_reel_id").await, None);
    assert!(report.results.iter().all(|r| !r.notes.is_empty()));
}

#[tokio::test]
async fn failed_finding_does_not_stop_the_run() {
    let db = setup_postgres().await;
    db.client
        .batch_execute(
            r#"
            CREATE TABLE media (id serial PRIMARY KEY);
            CREATE TABLE voiceovers (id serial PRIMARY KEY, full_demo_reel_id varchar);
            "#,
        )
        .await
        .unwrap();

    let report = db.run(&[CheckKind::RelationColumns], Mode::Repair).await;
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.count(CheckState::RepairFailed), 1, "{}", report);
    assert_eq!(report.count(CheckState::Repaired), 3, "{}", report);
    assert_eq!(db.foreign_key("voiceovers", "full_demo_reel_id").await, None);
    assert!(db.foreign_key("voiceovers", "profile_image_id").await.is_some());
}

#[tokio::test]
async fn empty_schema_is_built_and_then_verifies_clean() {
    let db = setup_postgres().await;

    let report = db.run(&CheckKind::ALL, Mode::Repair).await;
    assert!(report.healthy(), "{}", report);
    for table in ["users", "media", "voiceovers", "pages__locales", "pages_rels", "email_campaigns"] {
        assert!(db.table_exists(table).await, "{}", table);
    }
    assert!(db.column_exists("bookings", "voiceover_id").await);
    assert_eq!(
        db.foreign_key("posts__locales", "_parent_id").await,
        Some(("posts".to_string(), "c".to_string()))
    );

    let again = db.run(&CheckKind::ALL, Mode::Repair).await;
    assert_eq!(again.statements_executed, 0, "{}", again);

    let verify = db.run(&CheckKind::ALL, Mode::Verify).await;
    assert!(verify.healthy(), "{}", verify);
}

#[tokio::test]
async fn verify_mode_changes_nothing() {
    let db = setup_postgres().await;
    seed_legacy_pages_locales(&db).await;

    let report = db.run(&CheckKind::ALL, Mode::Verify).await;
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.statements_executed, 0);
    assert!(report.count(CheckState::NeedsRepair) > 0);
    assert!(db.table_exists("pages_locales").await);
    assert!(!db.table_exists("pages__locales").await);
}

#[tokio::test]
async fn inventory_reads_the_catalog() {
    let db = setup_postgres().await;
    seed_legacy_pages_locales(&db).await;
    db.client
        .batch_execute(
            "ALTER TABLE pages_locales ADD CONSTRAINT pages_locales_parent_id_fk \
             FOREIGN KEY (_parent_id) REFERENCES pages (id) ON DELETE CASCADE",
        )
        .await
        .unwrap();

    let mut database = match guard::connect(&db.config()).await.unwrap() {
        Guarded::Connected(database) => database,
        Guarded::Placeholder => panic!("real url treated as placeholder"),
    };
    let inventory = Inventory::new(database.conn(), "public");

    assert!(inventory.table_exists("pages_locales").await.unwrap());
    assert!(!inventory.table_exists("pages__locales").await.unwrap());
    assert_eq!(inventory.describe("nope").await.unwrap(), None);
    assert!(inventory.columns("nope").await.unwrap().is_empty());

    let names = inventory
        .tables(&TableFilter::EndsWith("_locales".to_string()))
        .await
        .unwrap();
    assert_eq!(names, ["pages_locales"]);

    let columns = inventory.columns("pages_locales").await.unwrap();
    let column_names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(column_names, ["id", "title", "_locale", "_parent_id"]);
    assert!(!columns[2].nullable);
    assert_eq!(columns[1].data_type, "character varying");

    let indexes = inventory.indexes("pages_locales").await.unwrap();
    let pkey = indexes.iter().find(|ix| ix.name == "pages_locales_pkey").unwrap();
    assert!(pkey.primary && pkey.backs_constraint);
    let parent = indexes
        .iter()
        .find(|ix| ix.name == "pages_locales_parent_id_idx")
        .unwrap();
    assert_eq!(parent.columns, ["_parent_id"]);
    assert!(!parent.backs_constraint);

    let fks = inventory.foreign_keys("pages_locales").await.unwrap();
    assert_eq!(fks.len(), 1);
    assert_eq!(fks[0].references_table, "pages");
    assert_eq!(fks[0].references_columns, ["id"]);
    assert_eq!(fks[0].on_delete, OnDelete::Cascade);

    let constraints = inventory.constraints("pages_locales").await.unwrap();
    assert!(
        constraints
            .iter()
            .any(|c| c.name == "pages_locales_pkey" && c.kind == ConstraintKind::PrimaryKey)
    );
    assert_eq!(
        inventory.sequences("pages_locales").await.unwrap(),
        ["pages_locales_id_seq"]
    );
    assert_eq!(inventory.row_count("pages_locales").await.unwrap(), 3);

    let described = inventory.describe("pages_locales").await.unwrap().unwrap();
    assert_eq!(described.columns, columns);
    assert_eq!(described.foreign_keys, fks);

    database.close();
}
