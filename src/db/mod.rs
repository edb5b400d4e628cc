use crate::errors::{AppError, AppResult};
use crate::models::{AppSettings, Configuration, DynamicFieldShape, SelectedProperties};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const SCHEMA_SQL: &str = include_str!("schema.sql");

const CONFIG_COLUMNS: &str = "id, api_key_sealed, database_id, title_property, date_property,
     additional_properties_json, dynamic_fields_json, label, database_title, is_active,
     created_at, updated_at";

/// A configuration row as stored, API key still sealed.
#[derive(Debug, Clone)]
pub struct StoredConfig {
    pub id: i64,
    pub api_key_sealed: String,
    pub database_id: String,
    pub title_property: Option<String>,
    pub date_property: Option<String>,
    pub additional_properties: SelectedProperties,
    pub dynamic_fields: Vec<DynamicFieldShape>,
    pub label: Option<String>,
    pub database_title: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredConfig {
    pub fn summary(&self) -> Configuration {
        Configuration {
            id: self.id,
            label: self.label.clone(),
            database_id: self.database_id.clone(),
            database_title: self.database_title.clone(),
            title_property: self.title_property.clone(),
            date_property: self.date_property.clone(),
            is_active: self.is_active,
            has_api_key: !self.api_key_sealed.is_empty(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewConfig {
    pub api_key_sealed: String,
    pub database_id: String,
    pub label: Option<String>,
    pub database_title: Option<String>,
    pub title_property: Option<String>,
    pub date_property: Option<String>,
}

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        let db = Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        };

        db.ensure_schema_extensions()?;
        db.ensure_single_active()?;

        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn insert_config(&self, config: &NewConfig, set_active: bool) -> AppResult<StoredConfig> {
        let now = Utc::now().to_rfc3339();
        let id = {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            if set_active {
                tx.execute("UPDATE notion_configs SET is_active = 0", [])?;
            }
            tx.execute(
                "INSERT INTO notion_configs (
                   api_key_sealed, database_id, title_property, date_property, label, database_title,
                   is_active, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    config.api_key_sealed,
                    config.database_id,
                    config.title_property,
                    config.date_property,
                    config.label,
                    config.database_title,
                    set_active as i64,
                    now,
                ],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            id
        };

        self.get_config(id)?
            .ok_or_else(|| AppError::Internal(format!("configuration {} vanished after insert", id)))
    }

    /// Replaces credentials and detected metadata. Selected properties and
    /// dynamic field shapes are kept.
    pub fn update_credentials(&self, id: i64, config: &NewConfig, set_active: bool) -> AppResult<Option<StoredConfig>> {
        let now = Utc::now().to_rfc3339();
        let changed = {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            let exists: Option<i64> = tx
                .query_row("SELECT id FROM notion_configs WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            if exists.is_none() {
                return Ok(None);
            }
            if set_active {
                tx.execute("UPDATE notion_configs SET is_active = 0", [])?;
            }
            let changed = tx.execute(
                "UPDATE notion_configs
                 SET api_key_sealed = ?1, database_id = ?2, title_property = ?3, date_property = ?4,
                     label = COALESCE(?5, label), database_title = ?6,
                     is_active = CASE WHEN ?7 THEN 1 ELSE is_active END,
                     updated_at = ?8
                 WHERE id = ?9",
                params![
                    config.api_key_sealed,
                    config.database_id,
                    config.title_property,
                    config.date_property,
                    config.label,
                    config.database_title,
                    set_active,
                    now,
                    id,
                ],
            )?;
            tx.commit()?;
            changed
        };

        if changed == 0 {
            return Ok(None);
        }
        self.get_config(id)
    }

    pub fn update_label(&self, id: i64, label: Option<&str>) -> AppResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE notion_configs SET label = ?1, updated_at = ?2 WHERE id = ?3",
            params![label, Utc::now().to_rfc3339(), id],
        )?;
        Ok(changed > 0)
    }

    pub fn update_detected_properties(
        &self,
        id: i64,
        title_property: Option<&str>,
        date_property: Option<&str>,
    ) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE notion_configs SET title_property = ?1, date_property = ?2, updated_at = ?3 WHERE id = ?4",
            params![title_property, date_property, Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    pub fn list_configs(&self) -> AppResult<Vec<StoredConfig>> {
        let conn = self.lock()?;
        let mut statement = conn.prepare(&format!(
            "SELECT {} FROM notion_configs ORDER BY is_active DESC, updated_at DESC, id DESC",
            CONFIG_COLUMNS
        ))?;
        let rows = statement.query_map([], parse_config_row)?;
        let mut configs = Vec::new();
        for row in rows {
            configs.push(row?);
        }
        Ok(configs)
    }

    pub fn get_config(&self, id: i64) -> AppResult<Option<StoredConfig>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM notion_configs WHERE id = ?1", CONFIG_COLUMNS),
            [id],
            parse_config_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    /// The active configuration, falling back to the most recently updated one.
    pub fn get_active_config(&self) -> AppResult<Option<StoredConfig>> {
        let conn = self.lock()?;
        let active = conn
            .query_row(
                &format!(
                    "SELECT {} FROM notion_configs WHERE is_active = 1 ORDER BY updated_at DESC, id DESC LIMIT 1",
                    CONFIG_COLUMNS
                ),
                [],
                parse_config_row,
            )
            .optional()?;
        if active.is_some() {
            return Ok(active);
        }

        conn.query_row(
            &format!(
                "SELECT {} FROM notion_configs ORDER BY updated_at DESC, id DESC LIMIT 1",
                CONFIG_COLUMNS
            ),
            [],
            parse_config_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn find_by_database_id(&self, database_id: &str) -> AppResult<Option<StoredConfig>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM notion_configs WHERE database_id = ?1 ORDER BY updated_at DESC, id DESC LIMIT 1",
                CONFIG_COLUMNS
            ),
            [database_id],
            parse_config_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn set_active_config(&self, id: i64) -> AppResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let exists: Option<i64> = tx
            .query_row("SELECT id FROM notion_configs WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;
        if exists.is_none() {
            return Ok(false);
        }
        tx.execute("UPDATE notion_configs SET is_active = 0", [])?;
        tx.execute(
            "UPDATE notion_configs SET is_active = 1, updated_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Deletes a configuration and re-activates the most recent remaining one
    /// when the active configuration was removed.
    pub fn delete_config(&self, id: i64) -> AppResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let deleted = tx.execute("DELETE FROM notion_configs WHERE id = ?1", [id])?;
        activate_most_recent_if_none(&tx)?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    pub fn save_additional_properties(&self, id: i64, properties: &SelectedProperties) -> AppResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE notion_configs SET additional_properties_json = ?1, updated_at = ?2 WHERE id = ?3",
            params![serde_json::to_string(properties)?, Utc::now().to_rfc3339(), id],
        )?;
        Ok(changed > 0)
    }

    pub fn save_dynamic_fields(&self, id: i64, fields: &[DynamicFieldShape]) -> AppResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE notion_configs SET dynamic_fields_json = ?1, updated_at = ?2 WHERE id = ?3",
            params![serde_json::to_string(fields)?, Utc::now().to_rfc3339(), id],
        )?;
        Ok(changed > 0)
    }

    pub fn get_settings(&self) -> AppResult<AppSettings> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT value_json FROM settings WHERE key = 'app'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        match raw {
            Some(raw) => Ok(serde_json::from_str::<AppSettings>(&raw).unwrap_or_default()),
            None => Ok(AppSettings::default()),
        }
    }

    pub fn update_settings(&self, update: serde_json::Value) -> AppResult<AppSettings> {
        let current = self.get_settings()?;
        let mut merged = serde_json::to_value(current)?;
        merge_json(&mut merged, update);
        let settings: AppSettings = serde_json::from_value(merged)?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO settings (key, value_json, updated_at)
             VALUES ('app', ?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
            params![serde_json::to_string(&settings)?, Utc::now().to_rfc3339()],
        )?;

        Ok(settings)
    }

    fn ensure_schema_extensions(&self) -> AppResult<()> {
        let conn = self.lock()?;
        if !column_exists(&conn, "notion_configs", "database_title")? {
            conn.execute("ALTER TABLE notion_configs ADD COLUMN database_title TEXT", [])?;
        }
        if !column_exists(&conn, "notion_configs", "label")? {
            conn.execute("ALTER TABLE notion_configs ADD COLUMN label TEXT", [])?;
        }
        Ok(())
    }

    fn ensure_single_active(&self) -> AppResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let active: i64 = tx.query_row(
            "SELECT COUNT(*) FROM notion_configs WHERE is_active = 1",
            [],
            |row| row.get(0),
        )?;
        if active > 1 {
            tracing::warn!(count = active, "multiple active configurations found, keeping the most recent");
            tx.execute(
                "UPDATE notion_configs SET is_active = 0
                 WHERE id != (SELECT id FROM notion_configs WHERE is_active = 1 ORDER BY updated_at DESC, id DESC LIMIT 1)",
                [],
            )?;
        }
        activate_most_recent_if_none(&tx)?;
        tx.commit()?;
        Ok(())
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }
}

fn activate_most_recent_if_none(conn: &Connection) -> AppResult<()> {
    let active: i64 = conn.query_row(
        "SELECT COUNT(*) FROM notion_configs WHERE is_active = 1",
        [],
        |row| row.get(0),
    )?;
    if active == 0 {
        conn.execute(
            "UPDATE notion_configs SET is_active = 1
             WHERE id = (SELECT id FROM notion_configs ORDER BY updated_at DESC, id DESC LIMIT 1)",
            [],
        )?;
    }
    Ok(())
}

fn parse_config_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredConfig> {
    let additional_raw: String = row.get(5)?;
    let dynamic_raw: String = row.get(6)?;
    let created_raw: String = row.get(10)?;
    let updated_raw: String = row.get(11)?;

    Ok(StoredConfig {
        id: row.get(0)?,
        api_key_sealed: row.get(1)?,
        database_id: row.get(2)?,
        title_property: row.get(3)?,
        date_property: row.get(4)?,
        additional_properties: serde_json::from_str(&additional_raw).unwrap_or_default(),
        dynamic_fields: serde_json::from_str(&dynamic_raw).unwrap_or_default(),
        label: row.get(7)?,
        database_title: row.get(8)?,
        is_active: row.get::<_, i64>(9)? != 0,
        created_at: parse_time(&created_raw)?,
        updated_at: parse_time(&updated_raw)?,
    })
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> AppResult<bool> {
    let pragma = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&pragma)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string())),
            )
        })
}

fn merge_json(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json(target_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (target, update) => {
            *target = update;
        }
    }
}
