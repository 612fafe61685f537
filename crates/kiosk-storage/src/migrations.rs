// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded schema migrations tracked via `PRAGMA user_version`.
//!
//! Each entry in [`MIGRATIONS`] is applied inside its own transaction; the
//! user_version pragma records how many have run so re-opening an existing
//! database is a no-op.

const V1_INITIAL: &str = "
CREATE TABLE users (
    id TEXT PRIMARY KEY NOT NULL,
    chat_id TEXT NOT NULL UNIQUE,
    first_name TEXT,
    last_name TEXT,
    username TEXT,
    phone TEXT,
    email TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE conversations (
    id TEXT PRIMARY KEY NOT NULL,
    chat_id TEXT NOT NULL,
    platform TEXT NOT NULL DEFAULT 'telegram',
    status TEXT NOT NULL DEFAULT 'open',
    started_at TEXT NOT NULL,
    ended_at TEXT,
    metadata TEXT
);
CREATE INDEX idx_conversations_chat ON conversations(chat_id, status);

CREATE TABLE messages (
    id TEXT PRIMARY KEY NOT NULL,
    conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    metadata TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX idx_messages_conversation ON messages(conversation_id, created_at);

CREATE TABLE leads (
    id TEXT PRIMARY KEY NOT NULL,
    chat_id TEXT NOT NULL,
    last_name TEXT NOT NULL,
    phone TEXT,
    email TEXT,
    whatsapp TEXT,
    company TEXT,
    question TEXT NOT NULL DEFAULT '',
    source TEXT NOT NULL DEFAULT 'TG',
    status TEXT NOT NULL DEFAULT 'pending_sync',
    sync_attempts INTEGER NOT NULL DEFAULT 0 CHECK (sync_attempts <= 2),
    last_attempt_at TEXT,
    crm_id TEXT,
    auto_created INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX idx_leads_status ON leads(status, sync_attempts);
CREATE INDEX idx_leads_chat ON leads(chat_id, created_at);

CREATE TABLE prompts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    content TEXT NOT NULL,
    version INTEGER NOT NULL,
    active INTEGER NOT NULL DEFAULT 0,
    role TEXT NOT NULL DEFAULT 'system',
    created_at TEXT NOT NULL,
    UNIQUE(name, version)
);
CREATE UNIQUE INDEX idx_prompts_one_active ON prompts(name) WHERE active = 1;

CREATE TABLE llm_settings (
    provider_id TEXT PRIMARY KEY NOT NULL,
    config TEXT NOT NULL DEFAULT '{}',
    is_active INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE usage_statistics (
    provider TEXT NOT NULL,
    model TEXT NOT NULL,
    year INTEGER NOT NULL,
    month INTEGER NOT NULL,
    total_tokens INTEGER NOT NULL DEFAULT 0,
    price_per_1k REAL NOT NULL DEFAULT 0.0,
    currency TEXT NOT NULL DEFAULT 'USD',
    PRIMARY KEY (provider, model, year, month)
);

CREATE TABLE catalog_versions (
    version_name TEXT PRIMARY KEY NOT NULL,
    status TEXT NOT NULL DEFAULT 'building',
    total_rows INTEGER NOT NULL DEFAULT 0,
    indexed_rows INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    activated_at TEXT
);
CREATE UNIQUE INDEX idx_catalog_one_active ON catalog_versions(status) WHERE status = 'active';

CREATE TABLE company_services (
    id TEXT PRIMARY KEY NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    category TEXT,
    keywords TEXT NOT NULL DEFAULT '[]',
    active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE company_info (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL,
    original_filename TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE TABLE system_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    level TEXT NOT NULL,
    message TEXT NOT NULL,
    metadata TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX idx_system_logs_level ON system_logs(level, created_at);
";

const MIGRATIONS: &[&str] = &[V1_INITIAL];

/// Run all pending migrations against the given connection.
pub fn run(conn: &mut rusqlite::Connection) -> rusqlite::Result<()> {
    let applied: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    for (index, sql) in MIGRATIONS.iter().enumerate().skip(applied as usize) {
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", (index + 1) as i64)?;
        tx.commit()?;
    }
    Ok(())
}
