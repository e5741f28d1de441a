//! Read-through membership cache for favorites and watchlist.
//!
//! Answers "is movie X in collection K" from an in-memory snapshot of the
//! whole collection. A snapshot is trusted for `ttl` after it was fetched, for
//! as long as the session that fetched it is still current.
//!
//! Writes never patch the snapshot. A successful add or remove marks the kind
//! stale and immediately re-fetches the full collection, so record ids always
//! come from the server.
//!
//! Concurrent readers of a stale kind share one in-flight refresh. Refreshes
//! run on a spawned task, so a refresh whose callers all went away still lands
//! in the cache.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;

use crate::{
    clock::Clock,
    error::{ApiError, MembershipError, MembershipResult},
    models::{CollectionKind, MembershipEntry, MembershipRecord},
    services::providers::MembershipProvider,
    session::SessionStore,
};

pub const DEFAULT_MEMBERSHIP_TTL: Duration = Duration::from_secs(300);

/// Freshness of one collection kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Never fetched, cleared, or fetched under another session
    Empty,
    Fresh,
    /// TTL elapsed or a write happened since the last successful refresh
    Stale,
}

#[derive(Debug)]
struct Snapshot {
    entries: Vec<MembershipEntry>,
    fetched_at: DateTime<Utc>,
    session_epoch: u64,
    generation: u64,
}

impl Snapshot {
    fn find(&self, movie_id: u64) -> Option<&MembershipEntry> {
        self.entries.iter().find(|e| e.catalog_item_id == movie_id)
    }
}

type RefreshOutcome = Result<Arc<Snapshot>, Arc<ApiError>>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

struct InFlight {
    generation: u64,
    session_epoch: u64,
    future: SharedRefresh,
}

#[derive(Default)]
struct Slot {
    snapshot: Option<Arc<Snapshot>>,
    in_flight: Option<InFlight>,
    /// Generation of the most recently started refresh
    last_generation: u64,
    /// Snapshots from earlier generations are stale
    valid_from: u64,
}

struct Inner {
    provider: Arc<dyn MembershipProvider>,
    session: Arc<SessionStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    slots: Mutex<HashMap<CollectionKind, Slot>>,
}

impl Inner {
    fn classify(&self, slot: &Slot) -> CacheState {
        let Some(snapshot) = &slot.snapshot else {
            return CacheState::Empty;
        };
        if snapshot.session_epoch != self.session.epoch() {
            return CacheState::Empty;
        }

        // A clock that went backwards counts as zero age
        let age = (self.clock.now() - snapshot.fetched_at)
            .to_std()
            .unwrap_or_default();

        if snapshot.generation < slot.valid_from || age > self.ttl {
            CacheState::Stale
        } else {
            CacheState::Fresh
        }
    }

    async fn refresh(self: Arc<Self>, kind: CollectionKind, generation: u64, epoch: u64) -> RefreshOutcome {
        tracing::debug!(kind = %kind, generation, provider = self.provider.name(), "Refreshing membership cache");

        let result = self.provider.list_memberships(kind).await;

        let mut slots = self.slots.lock().await;
        let slot = slots.entry(kind).or_default();
        if slot
            .in_flight
            .as_ref()
            .is_some_and(|f| f.generation == generation)
        {
            slot.in_flight = None;
        }

        let records = match result {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(kind = %kind, generation, error = %e, "Membership refresh failed");
                return Err(Arc::new(e));
            }
        };

        let snapshot = Arc::new(Snapshot {
            entries: collect_entries(kind, &records),
            fetched_at: self.clock.now(),
            session_epoch: epoch,
            generation,
        });

        let superseded = slot
            .snapshot
            .as_ref()
            .is_some_and(|s| s.session_epoch == epoch && s.generation > generation);

        if epoch != self.session.epoch() || generation < slot.valid_from || superseded {
            tracing::debug!(kind = %kind, generation, "Discarding superseded membership refresh");
        } else {
            tracing::info!(
                kind = %kind,
                generation,
                entries = snapshot.entries.len(),
                "Membership cache refreshed"
            );
            slot.snapshot = Some(Arc::clone(&snapshot));
        }

        Ok(snapshot)
    }
}

/// Keeps the first record per movie
fn collect_entries(kind: CollectionKind, records: &[MembershipRecord]) -> Vec<MembershipEntry> {
    let mut seen = HashSet::new();
    let entries: Vec<MembershipEntry> = records
        .iter()
        .filter(|r| seen.insert(r.movie.id))
        .map(MembershipEntry::from)
        .collect();

    if entries.len() != records.len() {
        tracing::warn!(
            kind = %kind,
            duplicates = records.len() - entries.len(),
            "Collection listing contained duplicate movies"
        );
    }

    entries
}

fn validate_movie_id(movie_id: u64) -> MembershipResult<()> {
    if movie_id == 0 {
        return Err(MembershipError::InvalidMovieId(movie_id));
    }
    Ok(())
}

/// Shared handle to the favorites and watchlist membership caches of one client
#[derive(Clone)]
pub struct MembershipCache {
    inner: Arc<Inner>,
}

impl MembershipCache {
    pub fn new(
        provider: Arc<dyn MembershipProvider>,
        session: Arc<SessionStore>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                session,
                clock,
                ttl,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Whether `movie_id` is in `kind`, refreshing first when empty or stale
    pub async fn is_member(&self, kind: CollectionKind, movie_id: u64) -> MembershipResult<bool> {
        validate_movie_id(movie_id)?;
        let snapshot = self.ensure_fresh(kind).await?;
        Ok(snapshot.find(movie_id).is_some())
    }

    /// Current entries of `kind`, refreshing first when empty or stale
    pub async fn members(&self, kind: CollectionKind) -> MembershipResult<Vec<MembershipEntry>> {
        let snapshot = self.ensure_fresh(kind).await?;
        Ok(snapshot.entries.clone())
    }

    /// Adds `movie_id` to `kind` on the server, then re-fetches the collection
    pub async fn add(&self, kind: CollectionKind, movie_id: u64) -> MembershipResult<()> {
        validate_movie_id(movie_id)?;
        let epoch = self.inner.session.epoch();

        if let Err(e) = self.inner.provider.create_membership(kind, movie_id).await {
            tracing::error!(kind = %kind, movie_id, error = %e, "Failed to add membership");
            return Err(self
                .map_failure(epoch, Arc::new(e), |source| MembershipError::Write {
                    kind,
                    movie_id,
                    source,
                })
                .await);
        }

        tracing::info!(kind = %kind, movie_id, "Membership added");
        self.refresh_after_write(kind).await
    }

    /// Removes `movie_id` from `kind` on the server, then re-fetches the collection
    pub async fn remove(&self, kind: CollectionKind, movie_id: u64) -> MembershipResult<()> {
        validate_movie_id(movie_id)?;

        let snapshot = self.ensure_fresh(kind).await?;
        let Some(entry) = snapshot.find(movie_id).copied() else {
            tracing::warn!(kind = %kind, movie_id, "Remove requested for movie not in collection");
            return Err(MembershipError::NotFound { kind, movie_id });
        };
        let epoch = self.inner.session.epoch();

        if let Err(e) = self
            .inner
            .provider
            .delete_membership(kind, entry.membership_record_id)
            .await
        {
            tracing::error!(
                kind = %kind,
                movie_id,
                record_id = entry.membership_record_id,
                error = %e,
                "Failed to remove membership"
            );
            return Err(self
                .map_failure(epoch, Arc::new(e), |source| MembershipError::Write {
                    kind,
                    movie_id,
                    source,
                })
                .await);
        }

        tracing::info!(kind = %kind, movie_id, "Membership removed");
        self.refresh_after_write(kind).await
    }

    pub async fn state(&self, kind: CollectionKind) -> CacheState {
        let slots = self.inner.slots.lock().await;
        slots
            .get(&kind)
            .map(|slot| self.inner.classify(slot))
            .unwrap_or(CacheState::Empty)
    }

    /// Drops every snapshot. Refreshes already running will not repopulate.
    pub async fn clear(&self) {
        let mut slots = self.inner.slots.lock().await;
        for slot in slots.values_mut() {
            slot.snapshot = None;
            slot.in_flight = None;
            slot.valid_from = slot.last_generation + 1;
        }
        tracing::debug!("Membership caches cleared");
    }

    async fn ensure_fresh(&self, kind: CollectionKind) -> MembershipResult<Arc<Snapshot>> {
        let (refresh, epoch) = {
            let mut slots = self.inner.slots.lock().await;
            let slot = slots.entry(kind).or_default();

            if self.inner.classify(slot) == CacheState::Fresh {
                if let Some(snapshot) = &slot.snapshot {
                    tracing::debug!(kind = %kind, "Membership cache hit");
                    return Ok(Arc::clone(snapshot));
                }
            }

            let epoch = self.inner.session.epoch();
            let joinable = slot
                .in_flight
                .as_ref()
                .filter(|f| f.generation >= slot.valid_from && f.session_epoch == epoch)
                .map(|f| f.future.clone());

            let refresh = match joinable {
                Some(future) => {
                    tracing::debug!(kind = %kind, "Joining in-flight refresh");
                    future
                }
                None => self.start_refresh(kind, slot, epoch),
            };
            (refresh, epoch)
        };

        self.await_refresh(kind, epoch, refresh).await
    }

    /// Marks `kind` stale and starts a refresh that does not join older ones
    async fn refresh_after_write(&self, kind: CollectionKind) -> MembershipResult<()> {
        let epoch = self.inner.session.epoch();
        let refresh = {
            let mut slots = self.inner.slots.lock().await;
            let slot = slots.entry(kind).or_default();
            slot.valid_from = slot.last_generation + 1;
            self.start_refresh(kind, slot, epoch)
        };

        self.await_refresh(kind, epoch, refresh).await.map(|_| ())
    }

    /// Must be called with the slot lock held
    fn start_refresh(&self, kind: CollectionKind, slot: &mut Slot, epoch: u64) -> SharedRefresh {
        slot.last_generation += 1;
        let generation = slot.last_generation;

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(inner.refresh(kind, generation, epoch));

        let future = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(Arc::new(ApiError::Task(e.to_string()))),
            }
        }
        .boxed()
        .shared();

        slot.in_flight = Some(InFlight {
            generation,
            session_epoch: epoch,
            future: future.clone(),
        });

        future
    }

    async fn await_refresh(
        &self,
        kind: CollectionKind,
        epoch: u64,
        refresh: SharedRefresh,
    ) -> MembershipResult<Arc<Snapshot>> {
        match refresh.await {
            Ok(snapshot) => Ok(snapshot),
            Err(source) => Err(self
                .map_failure(epoch, source, |source| MembershipError::Query { kind, source })
                .await),
        }
    }

    /// Auth failures become `SessionExpired`
    ///
    /// Credentials are dropped only if the session that issued the request at
    /// `epoch` is still current.
    async fn map_failure(
        &self,
        epoch: u64,
        source: Arc<ApiError>,
        wrap: impl FnOnce(Arc<ApiError>) -> MembershipError,
    ) -> MembershipError {
        if !source.is_auth_failure() {
            return wrap(source);
        }

        if matches!(*source, ApiError::Unauthorized) {
            self.inner.session.clear_if_epoch(epoch).await;
        }
        MembershipError::SessionExpired
    }
}
