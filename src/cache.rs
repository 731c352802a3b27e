use crate::prelude::*;
use fieldx::fxstruct;
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory cache of trip count aggregates in front of a [`FactStore`].
///
/// ```ignore
/// let store = SqlFactStore::new(driver.connection());
/// let cache = TripCountCache::builder()
///     .fact_store(Arc::new(store))
///     .name("nycab")
///     .build()?;
///
/// let day = NaiveDate::from_ymd_opt(2013, 12, 1).unwrap();
/// // Only cabs not seen on that day before would hit the store.
/// let counts = cache.lookup_by_keys(["D7D598CD99978BD012A87A76A7C891B7"], day, false).await?;
/// ```
///
/// The whole index is guarded by a single lock. A lookup that needs the store holds the write lock for the entire
/// partition-query-merge sequence: concurrent misses wait for each other even if they ask for different cabs, but
/// none of them can observe or produce a half-merged index. Nothing is written into the index unless the store call
/// succeeds.
#[fxstruct(sync, rc, no_new, default(off), builder)]
pub struct TripCountCache<FS: FactStore> {
    #[fieldx(get(clone))]
    fact_store: Arc<FS>,

    /// Cache name. Most useful for debugging and logging.
    #[fieldx(get(clone), builder(into), default(String::from("trip-counts")))]
    name: String,

    #[fieldx(get(off), builder(off))]
    index: RwLock<TripCountIndex>,
}

impl<FS: FactStore> TripCountCache<FS> {
    /// Trip counts of the given cabs on `day`.
    ///
    /// Cabs already known for that day are served from memory unless `force_refresh` is set. The rest are resolved
    /// with a single [`FactStore::aggregate_by_keys`] call; cabs the store doesn't report are recorded as having made
    /// zero trips. Whatever gets resolved is written back into the cache.
    ///
    /// On store failure the error is returned and the cache is left untouched.
    pub async fn lookup_by_keys<I, S>(&self, cab_ids: I, day: Day, force_refresh: bool) -> Result<TripCountIndex, FS::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let requested: BTreeSet<String> = cab_ids.into_iter().map(Into::into).collect();

        log::debug!(
            "[{}] LOOKUP({}) on {day}, force_refresh={force_refresh}",
            self.name,
            requested.len()
        );

        if !force_refresh {
            // Fully cached requests don't need to block other readers.
            let index = self.index.read().await;
            let (response, misses) = self.partition(&index, &requested, &day);
            if misses.is_empty() {
                return Ok(response);
            }
        }

        let mut index = self.index.write().await;

        let (mut response, misses) = if force_refresh {
            (TripCountIndex::new(), requested.into_iter().collect::<Vec<_>>())
        }
        else {
            // Another writer might have resolved some of our misses while we were waiting for the lock.
            self.partition(&index, &requested, &day)
        };

        if misses.is_empty() {
            return Ok(response);
        }

        let resolved = self.resolve_misses(&misses, day).await?;

        index.merge(&resolved);
        response.merge(&resolved);

        Ok(response)
    }

    /// Trip counts of every cab on every day.
    ///
    /// Hits the store when `force_refresh` is set or when the cache is empty, as an empty cache cannot be told apart
    /// from a cold one. Otherwise returns what is cached. The result is a copy of the cache content.
    pub async fn lookup_all(&self, force_refresh: bool) -> Result<TripCountIndex, FS::Error> {
        if !force_refresh {
            let index = self.index.read().await;
            if !index.is_empty() {
                log::debug!("[{}] LOOKUP_ALL served from cache; cabs={}", self.name, index.cab_count());
                return Ok(index.clone());
            }
        }

        let mut index = self.index.write().await;

        // Somebody could have warmed the cache up while we were waiting for the lock.
        if !force_refresh && !index.is_empty() {
            return Ok(index.clone());
        }

        log::info!("[{}] Loading all trip counts from the fact store", self.name);

        let loaded: TripCountIndex = self.fact_store.aggregate_all().await?.into_iter().collect();
        index.merge(&loaded);

        log::info!(
            "[{}] Loaded {} trip count entries; cached entries={}",
            self.name,
            loaded.entry_count(),
            index.entry_count()
        );

        Ok(index.clone())
    }

    /// Drop everything cached. Always succeeds.
    pub async fn clear(&self) -> bool {
        let mut index = self.index.write().await;
        log::info!("[{}] Clearing cache; cabs={}", self.name, index.cab_count());
        *index = TripCountIndex::new();
        true
    }

    /// A copy of the current cache content. Never consults the store.
    pub async fn snapshot(&self) -> TripCountIndex {
        self.index.read().await.clone()
    }

    /// Number of cabs with at least one cached day.
    pub async fn cab_count(&self) -> usize {
        self.index.read().await.cab_count()
    }

    /// Number of cached cab/day pairs.
    pub async fn entry_count(&self) -> usize {
        self.index.read().await.entry_count()
    }

    // Split requested cabs into those cached for the day and those to be asked for. Cached ones are collected into
    // a response index right away.
    fn partition(
        &self,
        index: &TripCountIndex,
        requested: &BTreeSet<String>,
        day: &Day,
    ) -> (TripCountIndex, Vec<String>) {
        let mut hits = TripCountIndex::new();
        let mut misses = Vec::new();

        for cab_id in requested {
            if let Some(count) = index.count(cab_id, day) {
                log::debug!("[{}] HIT(cab_id='{cab_id}', day='{day}', count={count})", self.name);
                hits.insert(cab_id.clone(), *day, count);
            }
            else {
                misses.push(cab_id.clone());
            }
        }

        (hits, misses)
    }

    async fn resolve_misses(&self, misses: &[String], day: Day) -> Result<TripCountIndex, FS::Error> {
        log::debug!("[{}] MISS({}) on {day}", self.name, misses.join(", "));

        let rows = self.fact_store.aggregate_by_keys(misses, day).await?;

        // No row means no trips on that day. Record it so the store isn't asked about the same pair again.
        let mut resolved: TripCountIndex = misses
            .iter()
            .map(|cab_id| TripCountEntry::new(cab_id.clone(), day, 0))
            .collect();

        for row in rows {
            if !resolved.contains(&row.cab_id, &row.day) {
                log::warn!("[{}] Ignoring unrequested row from the fact store: {row}", self.name);
                continue;
            }
            resolved.insert_entry(row);
        }

        Ok(resolved)
    }
}

impl<FS: FactStore> Debug for TripCountCache<FS> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut dbg = f.debug_struct("TripCountCache");
        dbg.field("name", &self.name).field("fact_store", &self.fact_store);
        if let Ok(index) = self.index.try_read() {
            dbg.field("cabs", &index.cab_count()).field("entries", &index.entry_count());
        }
        dbg.finish()
    }
}
