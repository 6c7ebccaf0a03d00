use crate::error::AppError;
use regex::Regex;
use sqlx::{Pool, Row, Sqlite, SqlitePool};
use std::collections::{HashMap, HashSet};
use tracing::{info, instrument};

/// Brings the live database up to `target_schema` by diffing it against a
/// pristine in-memory copy, instead of replaying a migration history.
///
/// Destructive steps (dropped tables, dropped columns, dropped indices)
/// are refused unless `allow_deletions` is set.
#[instrument(skip(pool, target_schema))]
pub async fn migrate_database_declaratively(
    pool: Pool<Sqlite>,
    target_schema: &str,
    allow_deletions: bool,
) -> Result<bool, AppError> {
    info!("Starting declarative database migration");

    // Single connection: an in-memory database is private per connection.
    let pristine = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    if !target_schema.trim().is_empty() {
        sqlx::raw_sql(target_schema)
            .execute(&pristine)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create pristine schema: {}", e)))?;
    }

    let target_tables = schema_objects(&pristine, "table").await?;
    let target_indices = schema_objects(&pristine, "index").await?;

    let mut tx = pool.begin().await?;
    sqlx::query("PRAGMA defer_foreign_keys = TRUE")
        .execute(&mut *tx)
        .await?;

    let current_tables = schema_objects_tx(&mut tx, "table").await?;
    let current_indices = schema_objects_tx(&mut tx, "index").await?;

    let mut changes = 0u32;

    // New tables first, so rebuilt tables can reference them.
    for (name, sql) in &target_tables {
        if !current_tables.contains_key(name) {
            info!(table = %name, "Creating new table");
            sqlx::query(sql).execute(&mut *tx).await?;
            changes += 1;
        }
    }

    // Rebuild any table whose normalized DDL drifted: create the new shape
    // under a temporary name, copy the shared columns, swap.
    for (name, current_sql) in &current_tables {
        let Some(target_sql) = target_tables.get(name) else {
            continue;
        };
        if normalize_sql(current_sql) == normalize_sql(target_sql) {
            continue;
        }

        let current_cols = table_columns(&mut tx, name).await?;
        let target_cols = pristine_table_columns(&pristine, name).await?;
        let removed: Vec<&String> = current_cols.difference(&target_cols).collect();
        if !removed.is_empty() && !allow_deletions {
            return Err(AppError::Internal(format!(
                "Refusing to remove columns {:?} from table {}. Set allow_deletions=true to permit this.",
                removed, name
            )));
        }

        info!(table = %name, "Rebuilding modified table");
        let temp_name = format!("{}_migration_new", name);
        let temp_sql = target_sql.replace(
            &format!("CREATE TABLE {}", name),
            &format!("CREATE TABLE {}", temp_name),
        );
        sqlx::query(&temp_sql).execute(&mut *tx).await?;

        let shared: Vec<&str> = current_cols
            .intersection(&target_cols)
            .map(|s| s.as_str())
            .collect();
        if !shared.is_empty() {
            let column_list = shared.join(", ");
            sqlx::query(&format!(
                "INSERT INTO {} ({}) SELECT {} FROM {}",
                temp_name, column_list, column_list, name
            ))
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(&format!("DROP TABLE {}", name))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("ALTER TABLE {} RENAME TO {}", temp_name, name))
            .execute(&mut *tx)
            .await?;
        changes += 1;
    }

    let removed_tables: Vec<&String> = current_tables
        .keys()
        .filter(|name| !target_tables.contains_key(*name))
        .collect();
    if !removed_tables.is_empty() {
        if !allow_deletions {
            return Err(AppError::Internal(format!(
                "Refusing to delete tables: {:?}. Set allow_deletions=true to permit this.",
                removed_tables
            )));
        }
        for name in removed_tables {
            info!(table = %name, "Dropping removed table");
            sqlx::query(&format!("DROP TABLE {}", name))
                .execute(&mut *tx)
                .await?;
            changes += 1;
        }
    }

    // Indices: drop what the target no longer has (or whose definition
    // changed), then create what is missing.
    for (name, current_sql) in &current_indices {
        let keep = target_indices
            .get(name)
            .map(|target_sql| normalize_sql(current_sql) == normalize_sql(target_sql))
            .unwrap_or(false);
        if keep {
            continue;
        }
        if !target_indices.contains_key(name) && !allow_deletions {
            return Err(AppError::Internal(format!(
                "Refusing to delete index {}. Set allow_deletions=true to permit this.",
                name
            )));
        }
        info!(index = %name, "Dropping index");
        sqlx::query(&format!("DROP INDEX {}", name))
            .execute(&mut *tx)
            .await?;
        changes += 1;
    }

    for (name, sql) in &target_indices {
        let exists = current_indices
            .get(name)
            .map(|current_sql| normalize_sql(current_sql) == normalize_sql(sql))
            .unwrap_or(false);
        if !exists {
            info!(index = %name, "Creating index");
            sqlx::query(sql).execute(&mut *tx).await?;
            changes += 1;
        }
    }

    tx.commit().await?;

    if changes > 0 {
        info!("Running VACUUM after migration");
        sqlx::query("VACUUM").execute(&pool).await?;
    }

    info!("Migration completed. Schema changes made: {}", changes);
    Ok(changes > 0)
}

async fn schema_objects(
    pool: &SqlitePool,
    kind: &str,
) -> Result<HashMap<String, String>, AppError> {
    let rows = sqlx::query(
        "SELECT name, sql FROM sqlite_master
         WHERE type = ? AND sql IS NOT NULL AND name != 'sqlite_sequence'",
    )
    .bind(kind)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get::<String, _>(0), row.get::<String, _>(1)))
        .collect())
}

async fn schema_objects_tx(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    kind: &str,
) -> Result<HashMap<String, String>, AppError> {
    let rows = sqlx::query(
        "SELECT name, sql FROM sqlite_master
         WHERE type = ? AND sql IS NOT NULL AND name != 'sqlite_sequence'",
    )
    .bind(kind)
    .fetch_all(&mut **tx)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get::<String, _>(0), row.get::<String, _>(1)))
        .collect())
}

async fn table_columns(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    table: &str,
) -> Result<HashSet<String>, AppError> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
        .fetch_all(&mut **tx)
        .await?;

    Ok(rows.into_iter().map(|row| row.get::<String, _>(1)).collect())
}

async fn pristine_table_columns(
    pool: &SqlitePool,
    table: &str,
) -> Result<HashSet<String>, AppError> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(|row| row.get::<String, _>(1)).collect())
}

pub fn normalize_sql(sql: &str) -> String {
    // Strip comments
    let re = Regex::new(r"--[^\n]*\n").unwrap();
    let sql = re.replace_all(sql, "");

    // Collapse whitespace
    let re = Regex::new(r"\s+").unwrap();
    let sql = re.replace_all(&sql, " ");

    // No spaces around punctuation
    let re = Regex::new(r" *([(),]) *").unwrap();
    let sql = re.replace_all(&sql, "$1");

    // Unquote plain identifiers
    let re = Regex::new(r#""(\w+)""#).unwrap();
    let sql = re.replace_all(&sql, "$1");

    sql.trim().to_string()
}
