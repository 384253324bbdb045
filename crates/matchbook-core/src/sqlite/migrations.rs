#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SqliteMigration {
    pub version: i64,
    pub name: &'static str,
    pub up_sql: &'static str,
    pub down_sql: &'static str,
}

// The composite primary key is the only serialization point between racing
// writers; every backend must keep it.
const MIGRATION_0001: SqliteMigration = SqliteMigration {
    version: 1,
    name: "initial_match_explanation_cache",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS match_explanations (
    seeker_id INTEGER NOT NULL,
    project_id INTEGER NOT NULL,
    explanation_for_seeker TEXT,
    explanation_for_owner TEXT,
    created_at_unix INTEGER NOT NULL,
    updated_at_unix INTEGER NOT NULL,
    PRIMARY KEY (seeker_id, project_id)
);

CREATE INDEX IF NOT EXISTS idx_match_explanations_seeker_created
    ON match_explanations (seeker_id, created_at_unix);
"#,
    down_sql: r#"
DROP INDEX IF EXISTS idx_match_explanations_seeker_created;
DROP TABLE IF EXISTS match_explanations;
"#,
};

const MIGRATION_0002: SqliteMigration = SqliteMigration {
    version: 2,
    name: "add_profile_snapshots",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS seeker_profiles (
    seeker_id INTEGER PRIMARY KEY,
    display_name TEXT NOT NULL,
    skills_json TEXT NOT NULL DEFAULT '[]',
    intro TEXT NOT NULL DEFAULT '',
    work_style TEXT,
    updated_at_unix INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS project_profiles (
    project_id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    intro TEXT NOT NULL DEFAULT '',
    tags_json TEXT NOT NULL DEFAULT '[]',
    wanted_roles_json TEXT NOT NULL DEFAULT '[]',
    updated_at_unix INTEGER NOT NULL
);
"#,
    down_sql: r#"
DROP TABLE IF EXISTS project_profiles;
DROP TABLE IF EXISTS seeker_profiles;
"#,
};

const MIGRATIONS: [SqliteMigration; 2] = [MIGRATION_0001, MIGRATION_0002];

pub fn migrations() -> &'static [SqliteMigration] {
    &MIGRATIONS
}

pub fn migration(version: i64) -> Option<&'static SqliteMigration> {
    MIGRATIONS.iter().find(|entry| entry.version == version)
}

pub fn current_schema_version() -> i64 {
    MIGRATIONS.last().map(|entry| entry.version).unwrap_or(0)
}
