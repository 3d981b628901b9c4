use anyhow::{Context, Result};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Row};

use crate::model::{EntityLocation, FormDefinition, Id, MetaInformation, Property, Study};
use crate::store::traits::{EntityIndexStore, FormStore, PropertyStore, Store, StudyFilter, StudyStore};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS studies (
        id TEXT PRIMARY KEY,
        entries JSONB NOT NULL,
        meta_information JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS entity_index (
        uuid TEXT NOT NULL,
        study_id TEXT NOT NULL REFERENCES studies(id) ON DELETE CASCADE,
        list_prop TEXT NOT NULL,
        parent_uuid TEXT,
        PRIMARY KEY (study_id, uuid)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS entity_index_uuid_idx ON entity_index (uuid)",
    r#"
    CREATE TABLE IF NOT EXISTS properties (
        id TEXT PRIMARY KEY,
        data JSONB NOT NULL,
        deprecated BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS forms (
        name TEXT PRIMARY KEY,
        data JSONB NOT NULL
    )
    "#,
];

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Create tables and indexes if they do not exist yet
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to run schema migration")?;
        }
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn study_from_row(row: &PgRow) -> Result<Study> {
    let entries: Value = row.get("entries");
    let meta_information: Value = row.get("meta_information");

    Ok(Study {
        id: row.get("id"),
        entries: serde_json::from_value(entries).context("Failed to decode study entries")?,
        meta_information: serde_json::from_value::<MetaInformation>(meta_information)
            .context("Failed to decode study meta information")?,
    })
}

#[async_trait::async_trait]
impl StudyStore for PostgresStore {
    async fn get_study(&self, id: &Id) -> Result<Option<Study>> {
        let row = sqlx::query("SELECT id, entries, meta_information FROM studies WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch study")?;

        row.as_ref().map(study_from_row).transpose()
    }

    async fn list_studies(&self, filter: &StudyFilter) -> Result<Vec<Study>> {
        let rows = sqlx::query(
            r#"
            SELECT id, entries, meta_information
            FROM studies
            WHERE $1 OR NOT COALESCE((meta_information->>'deprecated')::boolean, FALSE)
            ORDER BY created_at, id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(filter.include_deprecated)
        .bind(filter.limit.map(|l| l as i64))
        .bind(filter.skip as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list studies")?;

        rows.iter().map(study_from_row).collect()
    }

    async fn upsert_study(&self, study: &Study, locations: &[EntityLocation]) -> Result<()> {
        let entries = serde_json::to_value(&study.entries).context("Failed to serialize study entries")?;
        let meta_information =
            serde_json::to_value(&study.meta_information).context("Failed to serialize meta information")?;

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            INSERT INTO studies (id, entries, meta_information)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET
                entries = EXCLUDED.entries,
                meta_information = EXCLUDED.meta_information,
                updated_at = NOW()
            "#,
        )
        .bind(&study.id)
        .bind(entries)
        .bind(meta_information)
        .execute(&mut *tx)
        .await
        .context("Failed to upsert study")?;

        sqlx::query("DELETE FROM entity_index WHERE study_id = $1")
            .bind(&study.id)
            .execute(&mut *tx)
            .await
            .context("Failed to clear entity index rows")?;

        for location in locations {
            sqlx::query(
                r#"
                INSERT INTO entity_index (uuid, study_id, list_prop, parent_uuid)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (study_id, uuid) DO NOTHING
                "#,
            )
            .bind(&location.uuid)
            .bind(&location.study_id)
            .bind(&location.list_prop)
            .bind(&location.parent_uuid)
            .execute(&mut *tx)
            .await
            .context("Failed to insert entity index row")?;
        }

        tx.commit().await.context("Failed to commit study write")?;
        Ok(())
    }

    async fn set_study_deprecated(&self, id: &Id, deprecated: bool) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE studies
            SET meta_information = jsonb_set(meta_information, '{deprecated}', to_jsonb($2::boolean)),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(deprecated)
        .execute(&self.pool)
        .await
        .context("Failed to deprecate study")?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_study(&self, id: &Id) -> Result<bool> {
        // Index rows go with the study (ON DELETE CASCADE)
        let result = sqlx::query("DELETE FROM studies WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete study")?;

        Ok(result.rows_affected() > 0)
    }

    async fn deprecate_all_studies(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE studies SET meta_information = jsonb_set(meta_information, '{deprecated}', 'true'::jsonb), updated_at = NOW()",
        )
        .execute(&self.pool)
        .await
        .context("Failed to deprecate studies")?;

        Ok(result.rows_affected())
    }

    async fn delete_all_studies(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM studies")
            .execute(&self.pool)
            .await
            .context("Failed to delete studies")?;

        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl EntityIndexStore for PostgresStore {
    async fn find_entity_locations(&self, uuid: &str) -> Result<Vec<EntityLocation>> {
        let rows = sqlx::query("SELECT uuid, study_id, list_prop, parent_uuid FROM entity_index WHERE uuid = $1")
            .bind(uuid)
            .fetch_all(&self.pool)
            .await
            .context("Failed to look up entity index")?;

        Ok(rows
            .into_iter()
            .map(|row| EntityLocation {
                uuid: row.get("uuid"),
                study_id: row.get("study_id"),
                list_prop: row.get("list_prop"),
                parent_uuid: row.get("parent_uuid"),
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl PropertyStore for PostgresStore {
    async fn get_property(&self, id: &Id) -> Result<Option<Property>> {
        let row = sqlx::query("SELECT data FROM properties WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch property")?;

        row.map(|row| serde_json::from_value(row.get("data")).context("Failed to decode property"))
            .transpose()
    }

    async fn list_properties(&self, include_deprecated: bool) -> Result<Vec<Property>> {
        let rows = sqlx::query("SELECT data FROM properties WHERE $1 OR NOT deprecated ORDER BY created_at, id")
            .bind(include_deprecated)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list properties")?;

        rows.into_iter()
            .map(|row| serde_json::from_value(row.get("data")).context("Failed to decode property"))
            .collect()
    }

    async fn upsert_property(&self, property: Property) -> Result<()> {
        let data = serde_json::to_value(&property).context("Failed to serialize property")?;

        sqlx::query(
            r#"
            INSERT INTO properties (id, data, deprecated)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET
                data = EXCLUDED.data,
                deprecated = EXCLUDED.deprecated
            "#,
        )
        .bind(&property.id)
        .bind(data)
        .bind(property.deprecated)
        .execute(&self.pool)
        .await
        .context("Failed to upsert property")?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl FormStore for PostgresStore {
    async fn get_form(&self, name: &str) -> Result<Option<FormDefinition>> {
        let row = sqlx::query("SELECT data FROM forms WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch form")?;

        row.map(|row| serde_json::from_value(row.get("data")).context("Failed to decode form"))
            .transpose()
    }

    async fn list_forms(&self) -> Result<Vec<FormDefinition>> {
        let rows = sqlx::query("SELECT data FROM forms ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list forms")?;

        rows.into_iter()
            .map(|row| serde_json::from_value(row.get("data")).context("Failed to decode form"))
            .collect()
    }

    async fn upsert_form(&self, form: FormDefinition) -> Result<()> {
        let data = serde_json::to_value(&form).context("Failed to serialize form")?;

        sqlx::query(
            r#"
            INSERT INTO forms (name, data)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET data = EXCLUDED.data
            "#,
        )
        .bind(&form.name)
        .bind(data)
        .execute(&self.pool)
        .await
        .context("Failed to upsert form")?;

        Ok(())
    }
}

impl Store for PostgresStore {}
