use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use crate::models::{
    CacheEntry, CoreError, CoreErrorKind, NewCacheEntry, PairKey, Perspective, ProjectKey,
    ProjectProfile, SeekerKey, SeekerProfile,
};
use crate::persistence::{
    ExplanationCacheStore, MigrationStore, PersistenceResult, ProfileCatalogStore, ProfileStore,
};
use crate::sqlite::migrations::{SqliteMigration, current_schema_version, migration, migrations};

const MIGRATIONS_TABLE: &str = "matchbook_schema_migrations";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed explanation cache and profile snapshot store.
///
/// Every operation opens its own connection, so a read issued after another
/// writer committed always observes that commit.
pub struct SqliteStore {
    database_path: PathBuf,
}

impl SqliteStore {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn planned_migrations(&self, from_version: i64) -> Vec<&'static SqliteMigration> {
        migrations()
            .iter()
            .filter(|entry| entry.version > from_version)
            .collect()
    }

    pub fn migrate_to_latest(&self) -> PersistenceResult<()> {
        self.apply_migration(current_schema_version())
    }

    fn with_connection<T>(
        &self,
        operation_name: &str,
        operation: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> PersistenceResult<T> {
        self.with_connection_mapped(operation_name, storage_error, operation)
    }

    fn with_connection_mapped<T>(
        &self,
        operation_name: &str,
        map_error: fn(&str, rusqlite::Error) -> CoreError,
        operation: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> PersistenceResult<T> {
        let mut connection = open_connection(&self.database_path)
            .map_err(|error| storage_error(operation_name, error))?;
        operation(&mut connection).map_err(|error| map_error(operation_name, error))
    }
}

impl MigrationStore for SqliteStore {
    fn current_version(&self) -> PersistenceResult<i64> {
        self.with_connection("current_version", |connection| {
            ensure_migrations_table(connection)?;
            read_current_version(connection)
        })
    }

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()> {
        if target_version < 0 || target_version > current_schema_version() {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("invalid migration target version '{target_version}'"),
            ));
        }

        if target_version > 0 && migration(target_version).is_none() {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("migration version '{target_version}' is not defined"),
            ));
        }

        self.with_connection("apply_migration", |connection| {
            // Concurrent migrators serialize on the write lock and read the
            // recorded version only while holding it.
            let transaction =
                connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
            ensure_migrations_table(&transaction)?;
            let current_version = read_current_version(&transaction)?;

            if target_version == current_version {
                // Recorded versions can outlive dropped tables; the DDL is
                // all IF NOT EXISTS, so replaying it is safe.
                for version in 1..=target_version {
                    transaction.execute_batch(defined_migration(version)?.up_sql)?;
                }
            } else if target_version > current_version {
                for version in (current_version + 1)..=target_version {
                    apply_up_migration(&transaction, defined_migration(version)?)?;
                }
            } else {
                for version in ((target_version + 1)..=current_version).rev() {
                    apply_down_migration(&transaction, defined_migration(version)?)?;
                }
            }

            transaction.commit()
        })
    }
}

impl ExplanationCacheStore for SqliteStore {
    fn find_explanation(&self, pair: PairKey) -> PersistenceResult<Option<CacheEntry>> {
        let (seeker_id, project_id) = pair_params(pair)?;
        self.with_connection("find_explanation", |connection| {
            ensure_schema_ready(connection)?;
            connection
                .query_row(
                    "
SELECT seeker_id, project_id, explanation_for_seeker, explanation_for_owner,
       created_at_unix, updated_at_unix
FROM match_explanations
WHERE seeker_id = ?1 AND project_id = ?2
",
                    params![seeker_id, project_id],
                    cache_entry_from_row,
                )
                .optional()
        })
    }

    fn insert_explanation(&self, entry: &NewCacheEntry) -> PersistenceResult<CacheEntry> {
        let (seeker_id, project_id) = pair_params(entry.pair)?;
        self.with_connection_mapped("insert_explanation", insert_error, |connection| {
            ensure_schema_ready(connection)?;
            let now_unix = to_unix_seconds(SystemTime::now())?;

            // Plain INSERT: a duplicate pair must surface as a constraint
            // violation, never be merged.
            connection.execute(
                "
INSERT INTO match_explanations (
    seeker_id, project_id, explanation_for_seeker, explanation_for_owner,
    created_at_unix, updated_at_unix
) VALUES (?1, ?2, ?3, ?4, ?5, ?5)
",
                params![
                    seeker_id,
                    project_id,
                    entry.explanation_for_seeker.as_deref(),
                    entry.explanation_for_owner.as_deref(),
                    now_unix,
                ],
            )?;

            let stamped = from_unix_seconds(now_unix)?;
            Ok(CacheEntry {
                pair: entry.pair,
                explanation_for_seeker: entry.explanation_for_seeker.clone(),
                explanation_for_owner: entry.explanation_for_owner.clone(),
                created_at: stamped,
                updated_at: stamped,
            })
        })
        .map_err(|error| error.attributed_to(entry.pair))
    }

    fn fill_explanation(
        &self,
        pair: PairKey,
        perspective: Perspective,
        text: &str,
    ) -> PersistenceResult<bool> {
        let (seeker_id, project_id) = pair_params(pair)?;
        self.with_connection("fill_explanation", |connection| {
            ensure_schema_ready(connection)?;
            let column = explanation_column(perspective);
            let changed = connection.execute(
                &format!(
                    "
UPDATE match_explanations
SET {column} = ?3, updated_at_unix = ?4
WHERE seeker_id = ?1 AND project_id = ?2 AND {column} IS NULL
"
                ),
                params![
                    seeker_id,
                    project_id,
                    text,
                    to_unix_seconds(SystemTime::now())?,
                ],
            )?;
            Ok(changed == 1)
        })
        .map_err(|error| error.attributed_to(pair))
    }

    fn list_by_seeker(&self, seeker: SeekerKey) -> PersistenceResult<Vec<CacheEntry>> {
        let seeker_id = seeker_key_to_i64(seeker)?;
        self.with_connection("list_by_seeker", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT seeker_id, project_id, explanation_for_seeker, explanation_for_owner,
       created_at_unix, updated_at_unix
FROM match_explanations
WHERE seeker_id = ?1
ORDER BY created_at_unix, project_id
",
            )?;
            let rows = statement.query_map([seeker_id], cache_entry_from_row)?;
            rows.collect()
        })
    }
}

impl ProfileStore for SqliteStore {
    fn resolve_seeker(&self, seeker: SeekerKey) -> PersistenceResult<Option<SeekerProfile>> {
        let seeker_id = seeker_key_to_i64(seeker)?;
        self.with_connection("resolve_seeker", |connection| {
            ensure_schema_ready(connection)?;
            connection
                .query_row(
                    "
SELECT seeker_id, display_name, skills_json, intro, work_style
FROM seeker_profiles
WHERE seeker_id = ?1
",
                    [seeker_id],
                    |row| {
                        let seeker_id: i64 = row.get(0)?;
                        let skills_json: String = row.get(2)?;
                        Ok(SeekerProfile {
                            key: SeekerKey(i64_to_u64(seeker_id)?),
                            display_name: row.get(1)?,
                            skills: decode_string_list(2, &skills_json)?,
                            intro: row.get(3)?,
                            work_style: row.get(4)?,
                        })
                    },
                )
                .optional()
        })
    }

    fn resolve_project(&self, project: ProjectKey) -> PersistenceResult<Option<ProjectProfile>> {
        let project_id = project_key_to_i64(project)?;
        self.with_connection("resolve_project", |connection| {
            ensure_schema_ready(connection)?;
            connection
                .query_row(
                    "
SELECT project_id, title, intro, tags_json, wanted_roles_json
FROM project_profiles
WHERE project_id = ?1
",
                    [project_id],
                    |row| {
                        let project_id: i64 = row.get(0)?;
                        let tags_json: String = row.get(3)?;
                        let wanted_roles_json: String = row.get(4)?;
                        Ok(ProjectProfile {
                            key: ProjectKey(i64_to_u64(project_id)?),
                            title: row.get(1)?,
                            intro: row.get(2)?,
                            tags: decode_string_list(3, &tags_json)?,
                            wanted_roles: decode_string_list(4, &wanted_roles_json)?,
                        })
                    },
                )
                .optional()
        })
    }
}

impl ProfileCatalogStore for SqliteStore {
    fn upsert_seeker_profile(&self, profile: &SeekerProfile) -> PersistenceResult<()> {
        let seeker_id = seeker_key_to_i64(profile.key)?;
        self.with_connection("upsert_seeker_profile", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute(
                "
INSERT INTO seeker_profiles (
    seeker_id, display_name, skills_json, intro, work_style, updated_at_unix
) VALUES (?1, ?2, ?3, ?4, ?5, strftime('%s', 'now'))
ON CONFLICT(seeker_id) DO UPDATE SET
    display_name = excluded.display_name,
    skills_json = excluded.skills_json,
    intro = excluded.intro,
    work_style = excluded.work_style,
    updated_at_unix = excluded.updated_at_unix
",
                params![
                    seeker_id,
                    profile.display_name.as_str(),
                    encode_string_list(&profile.skills)?,
                    profile.intro.as_str(),
                    profile.work_style.as_deref(),
                ],
            )?;
            Ok(())
        })
    }

    fn upsert_project_profile(&self, profile: &ProjectProfile) -> PersistenceResult<()> {
        let project_id = project_key_to_i64(profile.key)?;
        self.with_connection("upsert_project_profile", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute(
                "
INSERT INTO project_profiles (
    project_id, title, intro, tags_json, wanted_roles_json, updated_at_unix
) VALUES (?1, ?2, ?3, ?4, ?5, strftime('%s', 'now'))
ON CONFLICT(project_id) DO UPDATE SET
    title = excluded.title,
    intro = excluded.intro,
    tags_json = excluded.tags_json,
    wanted_roles_json = excluded.wanted_roles_json,
    updated_at_unix = excluded.updated_at_unix
",
                params![
                    project_id,
                    profile.title.as_str(),
                    profile.intro.as_str(),
                    encode_string_list(&profile.tags)?,
                    encode_string_list(&profile.wanted_roles)?,
                ],
            )?;
            Ok(())
        })
    }
}

fn open_connection(database_path: &Path) -> rusqlite::Result<Connection> {
    if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))?;
    }
    let connection = Connection::open(database_path)?;
    connection.busy_timeout(BUSY_TIMEOUT)?;
    Ok(connection)
}

fn ensure_migrations_table(connection: &Connection) -> rusqlite::Result<()> {
    connection.execute_batch(
        "
CREATE TABLE IF NOT EXISTS matchbook_schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at_unix INTEGER NOT NULL
);
",
    )?;
    Ok(())
}

fn ensure_schema_ready(connection: &Connection) -> rusqlite::Result<()> {
    ensure_migrations_table(connection)?;
    let version = read_current_version(connection)?;
    if version <= 0 {
        return Err(storage_error_sqlite(
            "database schema is not initialized; apply migrations before cache operations",
        ));
    }
    Ok(())
}

fn read_current_version(connection: &Connection) -> rusqlite::Result<i64> {
    connection.query_row(
        &format!("SELECT COALESCE(MAX(version), 0) FROM {MIGRATIONS_TABLE}"),
        [],
        |row| row.get(0),
    )
}

fn defined_migration(version: i64) -> rusqlite::Result<&'static SqliteMigration> {
    migration(version)
        .ok_or_else(|| storage_error_sqlite(&format!("migration '{version}' is not defined")))
}

fn apply_up_migration(
    connection: &Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    connection.execute_batch(migration.up_sql)?;
    connection.execute(
        &format!(
            "INSERT INTO {MIGRATIONS_TABLE} (version, name, applied_at_unix)
             VALUES (?1, ?2, strftime('%s', 'now'))"
        ),
        (migration.version, migration.name),
    )?;
    Ok(())
}

fn apply_down_migration(
    connection: &Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    connection.execute_batch(migration.down_sql)?;
    connection.execute(
        &format!("DELETE FROM {MIGRATIONS_TABLE} WHERE version = ?1"),
        [migration.version],
    )?;
    Ok(())
}

fn cache_entry_from_row(row: &Row<'_>) -> rusqlite::Result<CacheEntry> {
    let seeker_id: i64 = row.get(0)?;
    let project_id: i64 = row.get(1)?;
    let created_at_unix: i64 = row.get(4)?;
    let updated_at_unix: i64 = row.get(5)?;

    Ok(CacheEntry {
        pair: PairKey {
            seeker: SeekerKey(i64_to_u64(seeker_id)?),
            project: ProjectKey(i64_to_u64(project_id)?),
        },
        explanation_for_seeker: row.get(2)?,
        explanation_for_owner: row.get(3)?,
        created_at: from_unix_seconds(created_at_unix)?,
        updated_at: from_unix_seconds(updated_at_unix)?,
    })
}

fn explanation_column(perspective: Perspective) -> &'static str {
    match perspective {
        Perspective::Seeker => "explanation_for_seeker",
        Perspective::Owner => "explanation_for_owner",
    }
}

fn encode_string_list(values: &[String]) -> rusqlite::Result<String> {
    serde_json::to_string(values)
        .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))
}

fn decode_string_list(column: usize, raw: &str) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(raw)
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(error)))
}

fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation
                && matches!(
                    failure.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                        | rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                )
    )
}

fn storage_error(operation: &str, error: rusqlite::Error) -> CoreError {
    storage_error_text(operation, error.to_string())
}

/// Only a cache insert may report a lost race as `Conflict`.
fn insert_error(operation: &str, error: rusqlite::Error) -> CoreError {
    if is_unique_violation(&error) {
        return CoreError::new(
            CoreErrorKind::Conflict,
            format!("sqlite store '{operation}' hit uniqueness constraint: {error}"),
        );
    }
    storage_error(operation, error)
}

fn storage_error_sqlite(message: &str) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::other(message.to_string())))
}

fn to_unix_seconds(value: SystemTime) -> rusqlite::Result<i64> {
    let duration = value.duration_since(UNIX_EPOCH).map_err(|error| {
        storage_error_sqlite(&format!("time before unix epoch is not supported: {error}"))
    })?;
    let seconds = i64::try_from(duration.as_secs())
        .map_err(|_| storage_error_sqlite("unix timestamp seconds exceed i64 range"))?;
    Ok(seconds)
}

fn from_unix_seconds(value: i64) -> rusqlite::Result<SystemTime> {
    if value < 0 {
        return Err(storage_error_sqlite(
            "negative unix timestamps are not supported",
        ));
    }
    let seconds = u64::try_from(value)
        .map_err(|_| storage_error_sqlite("failed to convert unix timestamp to u64"))?;
    Ok(UNIX_EPOCH + Duration::from_secs(seconds))
}

fn seeker_key_to_i64(value: SeekerKey) -> PersistenceResult<i64> {
    i64::try_from(value.0).map_err(|_| CoreError {
        seeker: Some(value),
        ..CoreError::new(
            CoreErrorKind::InvalidInput,
            format!("{value} exceeds the sqlite key range"),
        )
    })
}

fn project_key_to_i64(value: ProjectKey) -> PersistenceResult<i64> {
    i64::try_from(value.0).map_err(|_| CoreError {
        project: Some(value),
        ..CoreError::new(
            CoreErrorKind::InvalidInput,
            format!("{value} exceeds the sqlite key range"),
        )
    })
}

fn pair_params(pair: PairKey) -> PersistenceResult<(i64, i64)> {
    let seeker_id = seeker_key_to_i64(pair.seeker).map_err(|error| error.attributed_to(pair))?;
    let project_id = project_key_to_i64(pair.project).map_err(|error| error.attributed_to(pair))?;
    Ok((seeker_id, project_id))
}

fn i64_to_u64(value: i64) -> rusqlite::Result<u64> {
    u64::try_from(value).map_err(|_| storage_error_sqlite("negative key in sqlite record"))
}

fn storage_error_text(operation: &str, message: impl AsRef<str>) -> CoreError {
    CoreError::new(
        CoreErrorKind::StorageFailure,
        format!("sqlite store '{operation}' failed: {}", message.as_ref()),
    )
}
