use rusqlite_migration::{M, Migrations};

pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "CREATE TABLE cache_records (
            id              TEXT PRIMARY KEY,
            etag            TEXT,
            last_modified   TEXT
        );

        CREATE TABLE watermarks (
            source_key      TEXT PRIMARY KEY,
            last_synced_sha TEXT NOT NULL,
            synced_at       TEXT NOT NULL
        );

        CREATE TABLE entries (
            id              TEXT PRIMARY KEY,
            data_json       TEXT NOT NULL DEFAULT '{}',
            body            TEXT NOT NULL,
            digest          TEXT NOT NULL,
            file_path       TEXT NOT NULL,
            rendered        TEXT
        );

        CREATE INDEX idx_entries_file_path ON entries(file_path);",
        ),
        M::up("ALTER TABLE watermarks ADD COLUMN config_digest TEXT;"),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_valid() {
        assert!(migrations().validate().is_ok());
    }
}
