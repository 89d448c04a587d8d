//! The orchestrator: owns the store and the provider set, drives per-city
//! loads and the periodic rebuild, and answers presentation queries.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use chrono_tz::Tz;
use futures::future::join_all;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::{CinemaError, Result};
use crate::matching::clean_name;
use crate::models::{City, Film, Keyword, Screening, Theatre};
use crate::providers::{self, Provider, ProviderInfo, Registry};
use crate::resolver::{self, KeywordQuery, Resolution};
use crate::schedule::{self, ScheduleQuery, ScheduleTree};
use crate::scheduler;
use crate::store::{Collection, Field, Filter, Store};

pub struct Cinema {
    store: Arc<Store>,
    providers: Vec<Arc<dyn Provider>>,
    timezone: Tz,
    morning_hour: u32,
    initialized: AsyncMutex<bool>,
    /// Loads hold it shared; a rebuild holds it exclusively.
    gate: RwLock<()>,
    city_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    loaded: Mutex<BTreeSet<String>>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl Cinema {
    pub fn new(
        store: Arc<Store>,
        providers: Vec<Arc<dyn Provider>>,
        timezone: Tz,
        morning_hour: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            providers,
            timezone,
            morning_hour,
            initialized: AsyncMutex::new(false),
            gate: RwLock::new(()),
            city_locks: Mutex::new(HashMap::new()),
            loaded: Mutex::new(BTreeSet::new()),
            refresh_task: Mutex::new(None),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Arc<Self>> {
        let store = Arc::new(config.open_store()?);
        let providers = providers::active_providers(config)?;
        Ok(Self::new(
            store,
            providers,
            config.timezone()?,
            config.morning_refresh_hour,
        ))
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn list_providers(&self) -> Vec<ProviderInfo> {
        providers::list_providers(&self.providers)
    }

    /// Today's date in the configured timezone, YYYY-MM-DD.
    pub fn today(&self) -> String {
        Utc::now()
            .with_timezone(&self.timezone)
            .format("%Y-%m-%d")
            .to_string()
    }

    fn lock_loaded(&self) -> Result<MutexGuard<'_, BTreeSet<String>>> {
        self.loaded.lock().map_err(|_| CinemaError::Poisoned)
    }

    fn city_lock(&self, city_name: &str) -> Result<Arc<AsyncMutex<()>>> {
        let mut locks = self.city_locks.lock().map_err(|_| CinemaError::Poisoned)?;
        Ok(Arc::clone(
            locks
                .entry(city_name.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        ))
    }

    /// Runs every provider's city discovery once, then starts the refresh
    /// schedule. Later calls return immediately.
    #[tracing::instrument(skip(self))]
    pub async fn init(self: &Arc<Self>) -> Result<()> {
        self.lazy_init().await?;
        self.schedule_refresh()
    }

    pub async fn is_initialized(&self) -> bool {
        *self.initialized.lock().await
    }

    /// Discovery counts as done once a provider succeeded or the store
    /// already knows cities; otherwise the next call tries again.
    async fn lazy_init(&self) -> Result<()> {
        let mut initialized = self.initialized.lock().await;
        if *initialized {
            return Ok(());
        }
        let succeeded = self.init_providers().await;
        *initialized = self.discovery_done(succeeded)?;
        Ok(())
    }

    fn discovery_done(&self, succeeded: usize) -> Result<bool> {
        Ok(succeeded > 0 || self.store.count(Collection::Cities)? > 0)
    }

    async fn init_providers(&self) -> usize {
        let results = join_all(self.providers.iter().map(|provider| {
            let registry = Registry::new(Arc::clone(&self.store), provider.provider_id());
            async move { (provider.provider_id(), provider.init(&registry).await) }
        }))
        .await;

        let mut succeeded = 0usize;
        for (provider, result) in results {
            match result {
                Ok(()) => {
                    succeeded += 1;
                    debug!(provider, "provider initialized");
                }
                Err(source) => {
                    let err = CinemaError::ProviderFailure {
                        provider: provider.to_string(),
                        source,
                    };
                    warn!(provider, error = ?err, "provider init failed");
                }
            }
        }
        succeeded
    }

    fn schedule_refresh(self: &Arc<Self>) -> Result<()> {
        let mut task = self.refresh_task.lock().map_err(|_| CinemaError::Poisoned)?;
        if task.is_some() {
            return Ok(());
        }

        let cinema = Arc::downgrade(self);
        let timezone = self.timezone;
        let morning_hour = self.morning_hour;
        *task = Some(tokio::spawn(async move {
            loop {
                let now = Utc::now().with_timezone(&timezone);
                let wait = scheduler::until_next_refresh(&now, morning_hour);
                debug!(secs = wait.as_secs(), "next refresh scheduled");
                tokio::time::sleep(wait).await;

                let Some(cinema) = cinema.upgrade() else {
                    break;
                };
                if let Err(err) = cinema.refresh().await {
                    warn!(error = %err, "scheduled refresh failed");
                }
            }
        }));
        Ok(())
    }

    /// Loads one city from every provider. Concurrent calls for the same
    /// city wait for the first one and do not scrape again.
    #[tracing::instrument(skip(self))]
    pub async fn load_city(self: &Arc<Self>, city_name: &str) -> Result<()> {
        self.init().await?;
        let city_name = clean_name(city_name);
        let _gate = self.gate.read().await;
        self.load_city_locked(&city_name).await
    }

    async fn load_city_locked(&self, city_name: &str) -> Result<()> {
        let lock = self.city_lock(city_name)?;
        let _guard = lock.lock().await;
        if self.is_city_loaded(city_name)? {
            return Ok(());
        }

        if self.store.get::<City>(city_name)?.is_none() {
            return Err(CinemaError::CityNotFound(city_name.to_string()));
        }

        let results = join_all(self.providers.iter().map(|provider| {
            let registry = Registry::new(Arc::clone(&self.store), provider.provider_id());
            async move {
                (
                    provider.provider_id(),
                    provider.load_city(&registry, city_name).await,
                )
            }
        }))
        .await;

        let mut succeeded = 0usize;
        let mut first_failure = None;
        for (provider, result) in results {
            match result {
                Ok(()) => succeeded += 1,
                Err(source) => {
                    let err = CinemaError::ProviderFailure {
                        provider: provider.to_string(),
                        source,
                    };
                    warn!(provider, city = city_name, error = ?err, "provider load failed");
                    first_failure.get_or_insert(err);
                }
            }
        }

        match first_failure {
            Some(err) if succeeded == 0 => Err(err),
            _ => {
                self.lock_loaded()?.insert(city_name.to_string());
                info!(city = city_name, providers = succeeded, "city loaded");
                Ok(())
            }
        }
    }

    /// Rebuilds the store from scratch and reloads every city that was
    /// loaded before. Loads started meanwhile wait for the rebuild.
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self) -> Result<()> {
        let _gate = self.gate.write().await;
        let cities = self.get_loaded_cities()?;
        {
            let mut initialized = self.initialized.lock().await;
            self.store.clear_all()?;
            self.lock_loaded()?.clear();
            let succeeded = self.init_providers().await;
            *initialized = self.discovery_done(succeeded)?;
        }

        let results = join_all(cities.iter().map(|city| self.load_city_locked(city))).await;
        for (city, result) in cities.iter().zip(results) {
            if let Err(err) = result {
                warn!(city = city.as_str(), error = %err, "city reload failed");
            }
        }
        info!(cities = cities.len(), "store refreshed");
        Ok(())
    }

    /// Empties the store and forgets every load. The next load runs
    /// provider discovery again.
    #[tracing::instrument(skip(self))]
    pub async fn flush(&self) -> Result<()> {
        let _gate = self.gate.write().await;
        let mut initialized = self.initialized.lock().await;
        self.store.clear_all()?;
        self.lock_loaded()?.clear();
        *initialized = false;
        Ok(())
    }

    /// Loaded means tracked as loaded in this process, or already holding
    /// screenings in the store (a reopened file store).
    pub fn is_city_loaded(&self, city_name: &str) -> Result<bool> {
        let city_name = clean_name(city_name);
        if self.lock_loaded()?.contains(&city_name) {
            return Ok(true);
        }
        let filter = Filter::<Screening>::new().eq(Field::CityName, city_name);
        self.store.exists(&filter)
    }

    pub fn get_loaded_cities(&self) -> Result<Vec<String>> {
        let mut cities = self.lock_loaded()?.clone();
        cities.extend(
            self.store
                .find_all::<Screening>()?
                .into_iter()
                .map(|screening| screening.city_name),
        );
        Ok(cities.into_iter().collect())
    }

    pub fn find_cities(&self, filter: &Filter<City>) -> Result<Vec<City>> {
        self.store.find(filter)
    }

    pub fn find_theatres(&self, filter: &Filter<Theatre>) -> Result<Vec<Theatre>> {
        self.store.find(filter)
    }

    pub fn find_films(&self, filter: &Filter<Film>) -> Result<Vec<Film>> {
        self.store.find(filter)
    }

    pub fn find_screenings(&self, filter: &Filter<Screening>) -> Result<Vec<Screening>> {
        self.store.find(filter)
    }

    pub fn find_keywords(&self, filter: &Filter<Keyword>) -> Result<Vec<Keyword>> {
        self.store.find(filter)
    }

    pub fn get_city_names(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .find_all::<City>()?
            .into_iter()
            .map(|city| city.city_name)
            .collect())
    }

    pub fn get_theatre(&self, theatre_name: &str) -> Result<Option<Theatre>> {
        self.store.get(&clean_name(theatre_name))
    }

    pub fn get_theatres_in_city(&self, city_name: &str) -> Result<Vec<Theatre>> {
        let filter = Filter::new().eq(Field::CityName, clean_name(city_name));
        self.store.find(&filter)
    }

    /// Films with at least one screening from today on, optionally within
    /// one city or theatre.
    pub fn get_available_films(
        &self,
        city_name: Option<&str>,
        theatre_name: Option<&str>,
    ) -> Result<Vec<Film>> {
        let filter = Filter::<Screening>::new()
            .gte(Field::Date, self.today())
            .eq_opt(Field::CityName, city_name.map(clean_name))
            .eq_opt(Field::TheatreName, theatre_name.map(clean_name));
        let titles: BTreeSet<String> = self
            .store
            .find(&filter)?
            .into_iter()
            .map(|screening| screening.film_title)
            .collect();

        let mut films = Vec::with_capacity(titles.len());
        for title in titles {
            if let Some(film) = self.store.get::<Film>(&title)? {
                films.push(film);
            }
        }
        Ok(films)
    }

    pub fn resolve_keyword(&self, query: &KeywordQuery) -> Result<Resolution> {
        resolver::resolve_keyword(&self.store, query)
    }

    pub fn get_schedule_tree(&self, query: &ScheduleQuery) -> Result<ScheduleTree> {
        let resolved = schedule::resolve_query(query, &self.today())?;
        let screenings = self.store.find(&resolved.filter)?;
        Ok(schedule::build_tree(screenings, &resolved))
    }
}

impl Drop for Cinema {
    fn drop(&mut self) {
        if let Ok(task) = self.refresh_task.get_mut() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}
