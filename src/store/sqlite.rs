use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::{Backend, Collection};
use crate::error::Result;
use crate::utils;

/// File-backed backend: one table per collection, unique on the natural key.
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    pub fn open(path: &Path) -> Result<Self> {
        utils::ensure_parent(path);
        let conn = Connection::open(path)?;
        let backend = Self { conn };
        backend.init_schema()?;
        Ok(backend)
    }

    pub fn open_in_memory() -> Result<Self> {
        let backend = Self {
            conn: Connection::open_in_memory()?,
        };
        backend.init_schema()?;
        Ok(backend)
    }

    fn init_schema(&self) -> rusqlite::Result<()> {
        for collection in Collection::ALL {
            self.conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {}(
                    natural_key TEXT PRIMARY KEY,
                    payload TEXT NOT NULL,
                    first_seen_utc TEXT NOT NULL,
                    last_seen_utc TEXT NOT NULL
                );",
                collection.table_name()
            ))?;
        }
        Ok(())
    }
}

impl Backend for SqliteBackend {
    fn get(&mut self, collection: Collection, key: &str) -> Result<Option<String>> {
        let payload = self
            .conn
            .query_row(
                &format!(
                    "SELECT payload FROM {} WHERE natural_key = ?1",
                    collection.table_name()
                ),
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload)
    }

    fn put(&mut self, collection: Collection, key: &str, payload: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            &format!(
                "INSERT INTO {} (natural_key, payload, first_seen_utc, last_seen_utc)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(natural_key) DO UPDATE SET
                   payload = excluded.payload,
                   last_seen_utc = excluded.last_seen_utc",
                collection.table_name()
            ),
            params![key, payload, now],
        )?;
        Ok(())
    }

    fn scan(&mut self, collection: Collection) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT payload FROM {} ORDER BY natural_key",
            collection.table_name()
        ))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn clear(&mut self, collection: Collection) -> Result<()> {
        self.conn
            .execute(&format!("DELETE FROM {}", collection.table_name()), [])?;
        Ok(())
    }

    fn compact(&mut self) -> Result<()> {
        self.conn.execute_batch("VACUUM;")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::models::City;
    use crate::store::Store;

    #[test]
    fn records_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("showtimes.sqlite");

        {
            let store = Store::open_sqlite(&path).expect("open");
            store
                .upsert(City {
                    city_name: "BANDUNG".into(),
                    ..City::default()
                })
                .expect("upsert");
        }

        let reopened = Store::open_sqlite(&path).expect("reopen");
        let cities: Vec<City> = reopened.find_all().expect("find");
        assert_eq!(cities.len(), 1);
        assert_eq!(cities[0].city_name, "BANDUNG");
    }
}
