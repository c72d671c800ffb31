//! Database schema

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS bot_state (
    bot_id INTEGER NOT NULL,
    chat_id INTEGER NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,

    PRIMARY KEY (bot_id, chat_id, key)
);

CREATE TABLE IF NOT EXISTS bot_context (
    bot_id INTEGER NOT NULL,
    chat_id INTEGER NOT NULL,
    value TEXT NOT NULL,

    PRIMARY KEY (bot_id, chat_id)
);
";
