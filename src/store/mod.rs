mod memory;
mod query;
mod records;
mod sqlite;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{CinemaError, Result};

pub use memory::MemoryBackend;
pub use query::{Field, FieldValue, Filter, Op, Value};
pub use sqlite::SqliteBackend;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Collection {
    Cities,
    Theatres,
    Films,
    Screenings,
    Keywords,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Cities,
        Collection::Theatres,
        Collection::Films,
        Collection::Screenings,
        Collection::Keywords,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            Collection::Cities => "cities",
            Collection::Theatres => "theatres",
            Collection::Films => "films",
            Collection::Screenings => "screenings",
            Collection::Keywords => "keywords",
        }
    }
}

/// A typed entity that lives in exactly one collection and is identified by
/// its natural key.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn natural_key(&self) -> String;

    /// Folds a newer write for the same key into `self`. Absent fields in
    /// `newer` keep the stored value.
    fn merge(&mut self, newer: Self);

    fn field(&self, field: Field) -> Option<FieldValue<'_>>;
}

/// Raw persistence: JSON payloads addressed by (collection, natural key).
/// Implementations must keep at most one payload per key.
pub trait Backend: Send {
    fn get(&mut self, collection: Collection, key: &str) -> Result<Option<String>>;
    fn put(&mut self, collection: Collection, key: &str, payload: &str) -> Result<()>;
    /// Payloads in natural-key order.
    fn scan(&mut self, collection: Collection) -> Result<Vec<String>>;
    fn clear(&mut self, collection: Collection) -> Result<()>;
    fn compact(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Entity store. Every read-merge-write cycle runs under one writer lock, so
/// two upserts of the same unseen key can never produce two records.
pub struct Store {
    backend: Mutex<Box<dyn Backend>>,
}

impl Store {
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self {
            backend: Mutex::new(backend),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryBackend::default()))
    }

    pub fn open_sqlite(path: &Path) -> Result<Self> {
        Ok(Self::new(Box::new(SqliteBackend::open(path)?)))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Box<dyn Backend>>> {
        self.backend.lock().map_err(|_| CinemaError::Poisoned)
    }

    /// Inserts `record`, or merges it into the stored record with the same
    /// natural key. Returns the record as stored.
    pub fn upsert<R: Record>(&self, record: R) -> Result<R> {
        let key = record.natural_key();
        let mut backend = self.lock()?;
        let merged = match backend.get(R::COLLECTION, &key)? {
            Some(payload) => {
                let mut existing: R = serde_json::from_str(&payload)?;
                existing.merge(record);
                existing
            }
            None => record,
        };
        let payload = serde_json::to_string(&merged)?;
        backend.put(R::COLLECTION, &key, &payload)?;
        Ok(merged)
    }

    pub fn get<R: Record>(&self, key: &str) -> Result<Option<R>> {
        let payload = self.lock()?.get(R::COLLECTION, key)?;
        payload
            .map(|payload| serde_json::from_str(&payload).map_err(CinemaError::from))
            .transpose()
    }

    pub fn find<R: Record>(&self, filter: &Filter<R>) -> Result<Vec<R>> {
        let payloads = self.lock()?.scan(R::COLLECTION)?;
        let mut out = Vec::new();
        for payload in payloads {
            let record: R = serde_json::from_str(&payload)?;
            if filter.accepts(&record) {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// Stops at the first accepted record.
    pub fn exists<R: Record>(&self, filter: &Filter<R>) -> Result<bool> {
        let payloads = self.lock()?.scan(R::COLLECTION)?;
        for payload in payloads {
            let record: R = serde_json::from_str(&payload)?;
            if filter.accepts(&record) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn find_all<R: Record>(&self) -> Result<Vec<R>> {
        self.find(&Filter::new())
    }

    pub fn count(&self, collection: Collection) -> Result<usize> {
        Ok(self.lock()?.scan(collection)?.len())
    }

    pub fn clear(&self, collection: Collection) -> Result<()> {
        self.lock()?.clear(collection)
    }

    /// Empties every collection, keyword index included.
    pub fn clear_all(&self) -> Result<()> {
        let mut backend = self.lock()?;
        for collection in Collection::ALL {
            backend.clear(collection)?;
        }
        backend.compact()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use super::*;
    use crate::models::{City, Screening, Theatre};

    fn theatre(name: &str, city: Option<&str>, locators: &[&str]) -> Theatre {
        Theatre {
            theatre_name: name.to_string(),
            city_name: city.map(str::to_string),
            provider_id: Some("xxi".to_string()),
            locators: locators.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn screening(time: &str) -> Screening {
        Screening {
            city_name: "JAKARTA".into(),
            theatre_name: "GRAND 21".into(),
            film_title: "FILM".into(),
            variant: "2D".into(),
            date: "2024-01-01".into(),
            time: time.into(),
            provider_id: Some("xxi".into()),
            price_idr: Some(50_000),
            theatre_id: Some("GRA".into()),
        }
    }

    fn stores() -> Vec<Store> {
        vec![
            Store::in_memory(),
            Store::new(Box::new(
                SqliteBackend::open_in_memory().expect("sqlite in memory"),
            )),
        ]
    }

    #[test]
    fn upsert_is_idempotent() {
        for store in stores() {
            store.upsert(screening("10:00")).expect("first upsert");
            store.upsert(screening("10:00")).expect("second upsert");

            let all: Vec<Screening> = store.find_all().expect("find");
            assert_eq!(all, vec![screening("10:00")]);
        }
    }

    #[test]
    fn upsert_merges_partial_records() {
        for store in stores() {
            store
                .upsert(theatre("GRAND 21", Some("JAKARTA"), &["GRA"]))
                .expect("insert");
            let merged = store
                .upsert(Theatre {
                    theatre_name: "GRAND 21".into(),
                    locators: BTreeSet::from(["GRB".to_string()]),
                    ..Theatre::default()
                })
                .expect("merge");

            assert_eq!(merged.city_name.as_deref(), Some("JAKARTA"));
            assert_eq!(merged.provider_id.as_deref(), Some("xxi"));
            assert_eq!(merged.locators.len(), 2);

            let stored: Theatre = store.get("GRAND 21").expect("get").expect("present");
            assert_eq!(stored, merged);
            assert_eq!(store.count(Collection::Theatres).expect("count"), 1);
        }
    }

    #[test]
    fn find_filters_and_orders_by_key() {
        for store in stores() {
            for time in ["18:00", "10:00", "13:30"] {
                store.upsert(screening(time)).expect("upsert");
            }
            let filter = Filter::<Screening>::new()
                .eq(Field::TheatreName, "GRAND 21")
                .gte(Field::Time, "13:00");
            let times: Vec<String> = store
                .find(&filter)
                .expect("find")
                .into_iter()
                .map(|s| s.time)
                .collect();
            assert_eq!(times, vec!["13:30".to_string(), "18:00".to_string()]);
        }
    }

    #[test]
    fn exists_reports_any_accepted_record() {
        for store in stores() {
            let by_time = |time: &str| Filter::<Screening>::new().eq(Field::Time, time);
            assert!(!store.exists(&by_time("10:00")).expect("exists"));
            store.upsert(screening("10:00")).expect("upsert");
            store.upsert(screening("18:00")).expect("upsert");
            assert!(store.exists(&by_time("10:00")).expect("exists"));
            assert!(!store.exists(&by_time("12:00")).expect("exists"));
        }
    }

    #[test]
    fn clear_all_empties_every_collection() {
        for store in stores() {
            store.upsert(screening("10:00")).expect("upsert");
            store
                .upsert(City {
                    city_name: "JAKARTA".into(),
                    ..City::default()
                })
                .expect("upsert city");
            store.clear_all().expect("clear");
            for collection in Collection::ALL {
                assert_eq!(store.count(collection).expect("count"), 0);
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_upserts_of_one_key_keep_one_record() {
        let store = Arc::new(Store::in_memory());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let locator = format!("L{i}");
                store
                    .upsert(theatre("GRAND 21", None, &[locator.as_str()]))
                    .expect("upsert");
            }));
        }
        for handle in handles {
            handle.await.expect("join");
        }

        let all: Vec<Theatre> = store.find_all().expect("find");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].locators.len(), 16);
    }
}
