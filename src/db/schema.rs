/// Schema for user data tables.
pub const SCHEMA: &str = r#"
-- Favorites keyed by drink id
CREATE TABLE IF NOT EXISTS favorites (
    drink_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    thumbnail TEXT,
    added_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_favorites_added ON favorites(added_at);

-- Key-value preferences
CREATE TABLE IF NOT EXISTS preferences (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
