//! Embedded schema migrations, applied in ascending `version` order and
//! tracked in `schema_migrations` — grounded on
//! `original_source/amelia/server/database/migrator.py`'s `Migrator.run`.

pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub statements: &'static [&'static str],
}

pub const SCHEMA_MIGRATIONS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS schema_migrations (
        version BIGINT PRIMARY KEY,
        name TEXT NOT NULL,
        applied_at TIMESTAMP NOT NULL
    )
";

pub const ALL: &[Migration] = &[
    Migration {
        version: 1,
        name: "workflows_and_log",
        statements: &[
            "CREATE TABLE IF NOT EXISTS workflows (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                payload TEXT NOT NULL,
                updated_at TIMESTAMP NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS workflow_log (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
                sequence BIGINT NOT NULL,
                timestamp TIMESTAMP NOT NULL,
                agent TEXT NOT NULL,
                event_type TEXT NOT NULL,
                message TEXT,
                tool_name TEXT,
                tool_input TEXT,
                tool_output TEXT,
                is_error BOOLEAN NOT NULL DEFAULT FALSE,
                session_id TEXT
            )",
            "CREATE INDEX IF NOT EXISTS idx_workflow_log_workflow_sequence
                ON workflow_log (workflow_id, sequence)",
        ],
    },
    Migration {
        version: 2,
        name: "token_usage",
        statements: &["CREATE TABLE IF NOT EXISTS token_usage (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            workflow_id TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
            agent TEXT NOT NULL,
            prompt_tokens BIGINT NOT NULL,
            completion_tokens BIGINT NOT NULL,
            recorded_at TIMESTAMP NOT NULL
        )"],
    },
    Migration {
        version: 3,
        name: "profiles_and_server_settings",
        statements: &[
            "CREATE TABLE IF NOT EXISTS profiles (
                id TEXT PRIMARY KEY,
                tracker TEXT NOT NULL,
                working_dir TEXT NOT NULL,
                plan_output_dir TEXT NOT NULL,
                plan_path_pattern TEXT NOT NULL,
                agents_json TEXT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                trust_level TEXT NOT NULL DEFAULT 'standard',
                checkpoints_enabled BOOLEAN NOT NULL DEFAULT TRUE,
                reviewer_personas TEXT NOT NULL DEFAULT '[]'
            )",
            "CREATE TABLE IF NOT EXISTS server_settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        ],
    },
    Migration {
        version: 4,
        name: "prompts",
        statements: &[
            "CREATE TABLE IF NOT EXISTS prompts (
                name TEXT PRIMARY KEY,
                active_version BIGINT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS prompt_versions (
                prompt_name TEXT NOT NULL REFERENCES prompts(name) ON DELETE CASCADE,
                version BIGINT NOT NULL,
                template TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL,
                PRIMARY KEY (prompt_name, version)
            )",
            "CREATE TABLE IF NOT EXISTS workflow_prompt_versions (
                workflow_id TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
                prompt_name TEXT NOT NULL REFERENCES prompts(name) ON DELETE CASCADE,
                version BIGINT NOT NULL,
                PRIMARY KEY (workflow_id, prompt_name)
            )",
        ],
    },
    Migration {
        version: 5,
        name: "brainstorm",
        statements: &[
            "CREATE TABLE IF NOT EXISTS brainstorm_sessions (
                id TEXT PRIMARY KEY,
                profile_id TEXT NOT NULL,
                driver_session_id TEXT,
                status TEXT NOT NULL,
                topic TEXT,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS brainstorm_messages (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES brainstorm_sessions(id) ON DELETE CASCADE,
                sequence BIGINT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                parts TEXT,
                created_at TIMESTAMP NOT NULL
            )",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_brainstorm_messages_session_sequence
                ON brainstorm_messages (session_id, sequence)",
            "CREATE TABLE IF NOT EXISTS brainstorm_artifacts (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES brainstorm_sessions(id) ON DELETE CASCADE,
                artifact_type TEXT NOT NULL,
                path TEXT NOT NULL,
                title TEXT,
                created_at TIMESTAMP NOT NULL
            )",
        ],
    },
    Migration {
        version: 6,
        name: "checkpoints",
        statements: &["CREATE TABLE IF NOT EXISTS checkpoints (
            workflow_id TEXT PRIMARY KEY REFERENCES workflows(id) ON DELETE CASCADE,
            node TEXT NOT NULL,
            state TEXT NOT NULL,
            git_commit_sha TEXT,
            written_at TIMESTAMP NOT NULL
        )"],
    },
];
