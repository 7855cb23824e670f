//! SyncEngine - runs one aggregation and propagation pass.
//!
//! # Architecture
//!
//! The engine drives the pure state machine from sync-core and performs the
//! I/O through the [`RecordStore`] trait.
//!
//! ```text
//! SyncEngine → RecordStorePaginator / BulkChildFetcher → RecordStore
//!      ↓
//! sync-core (config, compute, state machine)
//! ```
//!
//! A run checks permissions, fetches every parent, pre-fetches the children
//! of all parents in bulk, then walks the parents one by one: compute each
//! rule's value, write the parent, and push the values to matching contacts.
//!
//! # Example
//!
//! ```ignore
//! let engine = SyncEngine::from_stored(store, CollectionId::new("42"), &raw_config)?;
//! let result = engine
//!     .run_sync(|p| println!("{} {}/{}", p.phase, p.current, p.total), || false)
//!     .await?;
//! ```

use futures_util::future::try_join_all;
use std::collections::{BTreeSet, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tally_sync_core::{
    compute, contact_fields, distinct_keys, parent_fields, ChildGroups, ChildRule, ChildSource,
    ContactLink, Event, FetchLimits, FieldUpdates, Progress, SyncConfig, SyncState,
};
use tally_sync_types::{CollectionId, Direction, Predicate, Query, Record, RECORD_ID_FIELD};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::SyncError;
use crate::fetcher::BulkChildFetcher;
use crate::paginator::RecordStorePaginator;
use crate::precheck::check_permissions;
use crate::store::{RecordStore, RecordUpdate};

/// Counts of a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncResult {
    /// Parent records written.
    pub parents_updated: usize,
    /// Contact records written.
    pub contacts_updated: usize,
}

/// State owned by a single run.
#[derive(Debug, Default)]
struct RunContext {
    state: SyncState,
    children: HashMap<ChildSource, ChildGroups>,
    parents_updated: usize,
    contacts_updated: usize,
}

impl RunContext {
    /// Apply an event and report the resulting progress.
    fn advance<P>(&mut self, event: Event, on_progress: &mut P)
    where
        P: FnMut(&Progress),
    {
        let before = self.state.phase();
        self.state = std::mem::take(&mut self.state).on_event(event);
        let after = self.state.phase();
        if before != after {
            if let Some(phase) = after {
                info!(phase = %phase, "sync phase");
            }
        }
        self.report(on_progress);
    }

    /// Hand the current progress to the observer.
    ///
    /// A panicking observer is logged and otherwise ignored.
    fn report<P>(&self, on_progress: &mut P)
    where
        P: FnMut(&Progress),
    {
        let Some(progress) = self.state.progress(self.contacts_updated) else {
            return;
        };
        if catch_unwind(AssertUnwindSafe(|| on_progress(&progress))).is_err() {
            warn!(phase = %progress.phase, "progress observer panicked");
        }
    }

    /// Stop the run if cancellation was requested.
    fn checkpoint<P, C>(&mut self, on_progress: &mut P, is_cancelled: &C) -> Result<(), SyncError>
    where
        P: FnMut(&Progress),
        C: Fn() -> bool,
    {
        if !is_cancelled() {
            return Ok(());
        }
        warn!(
            parents_updated = self.parents_updated,
            contacts_updated = self.contacts_updated,
            "sync cancelled"
        );
        self.advance(Event::CancelRequested, on_progress);
        Err(SyncError::Cancelled {
            parents_updated: self.parents_updated,
            contacts_updated: self.contacts_updated,
        })
    }

    fn result(&self) -> SyncResult {
        SyncResult {
            parents_updated: self.parents_updated,
            contacts_updated: self.contacts_updated,
        }
    }
}

/// Aggregates child records into parent fields and propagates the values
/// to contact records.
///
/// The engine holds no state between runs; each [`run_sync`](Self::run_sync)
/// starts from scratch.
pub struct SyncEngine<S: RecordStore> {
    store: S,
    parent: CollectionId,
    config: SyncConfig,
    limits: FetchLimits,
}

impl<S: RecordStore> SyncEngine<S> {
    /// Create an engine for a parent collection with default limits.
    pub fn new(store: S, parent: CollectionId, config: SyncConfig) -> Self {
        Self {
            store,
            parent,
            config,
            limits: FetchLimits::default(),
        }
    }

    /// Create an engine from a stored configuration document.
    pub fn from_stored(store: S, parent: CollectionId, raw: &str) -> Result<Self, SyncError> {
        let config = SyncConfig::load(raw)?;
        Ok(Self::new(store, parent, config))
    }

    /// Set the request limits.
    pub fn with_limits(mut self, limits: FetchLimits) -> Self {
        self.limits = limits;
        self
    }

    /// The configuration driving this engine.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The parent collection.
    pub fn parent(&self) -> &CollectionId {
        &self.parent
    }

    /// Get a reference to the underlying store (for testing).
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validate the configuration and probe every collection without
    /// writing anything. Returns the probed collections.
    pub async fn check(&self) -> Result<Vec<CollectionId>, SyncError> {
        self.validate()?;
        let collections = self.config.collections_to_probe(&self.parent);
        check_permissions(&self.store, &collections).await?;
        Ok(collections)
    }

    /// Run one sync pass.
    ///
    /// `on_progress` is called on every phase transition, after every parent
    /// and after every contact batch. `is_cancelled` is polled before every
    /// remaining store call; a cancelled run returns
    /// [`SyncError::Cancelled`] with the counts written so far.
    pub async fn run_sync<P, C>(&self, mut on_progress: P, is_cancelled: C) -> Result<SyncResult, SyncError>
    where
        P: FnMut(&Progress),
        C: Fn() -> bool,
    {
        let span = info_span!("sync_run", parent = %self.parent);
        self.run_inner(&mut on_progress, &is_cancelled)
            .instrument(span)
            .await
    }

    async fn run_inner<P, C>(&self, on_progress: &mut P, is_cancelled: &C) -> Result<SyncResult, SyncError>
    where
        P: FnMut(&Progress),
        C: Fn() -> bool,
    {
        let mut ctx = RunContext::default();
        let result = self.drive(&mut ctx, on_progress, is_cancelled).await;
        match &result {
            Ok(summary) => info!(
                parents_updated = summary.parents_updated,
                contacts_updated = summary.contacts_updated,
                "sync finished"
            ),
            Err(SyncError::Cancelled { .. }) => {}
            Err(e) => ctx.advance(
                Event::Errored {
                    error: e.to_string(),
                },
                on_progress,
            ),
        }
        result
    }

    fn validate(&self) -> Result<(), SyncError> {
        self.config.validate()?;
        self.limits.validate()?;
        Ok(())
    }

    async fn drive<P, C>(
        &self,
        ctx: &mut RunContext,
        on_progress: &mut P,
        is_cancelled: &C,
    ) -> Result<SyncResult, SyncError>
    where
        P: FnMut(&Progress),
        C: Fn() -> bool,
    {
        self.validate()?;
        let paginator = RecordStorePaginator::new(&self.limits);

        ctx.checkpoint(on_progress, is_cancelled)?;
        ctx.advance(Event::Started, on_progress);
        let collections = self.config.collections_to_probe(&self.parent);
        check_permissions(&self.store, &collections).await?;
        ctx.advance(Event::PermissionsVerified, on_progress);

        ctx.checkpoint(on_progress, is_cancelled)?;
        let by_id = Query::new().order_by(RECORD_ID_FIELD, Direction::Asc);
        let parents = paginator.fetch_all(&self.store, &self.parent, &by_id).await?;
        let keys = distinct_keys(&parents, &self.config.parent_join_field);
        info!(parents = parents.len(), keys = keys.len(), "fetched parents");
        ctx.advance(
            Event::ParentsFetched {
                count: parents.len(),
            },
            on_progress,
        );

        ctx.checkpoint(on_progress, is_cancelled)?;
        ctx.children = self.fetch_children(&keys).await?;
        ctx.advance(Event::ChildrenFetched, on_progress);

        for parent in &parents {
            ctx.checkpoint(on_progress, is_cancelled)?;
            self.process_parent(ctx, &paginator, parent, on_progress, is_cancelled)
                .await?;
        }

        ctx.advance(Event::Finished, on_progress);
        Ok(ctx.result())
    }

    /// Fetch the children of every key, one concurrent bulk fetch per
    /// distinct child source.
    async fn fetch_children(
        &self,
        keys: &BTreeSet<String>,
    ) -> Result<HashMap<ChildSource, ChildGroups>, SyncError> {
        let fetcher = BulkChildFetcher::new(&self.limits);
        let sources: Vec<ChildSource> = self.config.child_sources().into_iter().collect();

        let groups = try_join_all(sources.iter().map(|source| {
            fetcher.fetch_grouped(&self.store, &source.collection, &source.join_field, keys)
        }))
        .await?;

        for (source, group) in sources.iter().zip(&groups) {
            debug!(
                collection = %source.collection,
                join_field = %source.join_field,
                keys_with_children = group.len(),
                "grouped children"
            );
        }

        Ok(sources.into_iter().zip(groups).collect())
    }

    async fn process_parent<P, C>(
        &self,
        ctx: &mut RunContext,
        paginator: &RecordStorePaginator,
        parent: &Record,
        on_progress: &mut P,
        is_cancelled: &C,
    ) -> Result<(), SyncError>
    where
        P: FnMut(&Progress),
        C: Fn() -> bool,
    {
        let key = parent.join_key(&self.config.parent_join_field);

        let values: Vec<(&ChildRule, String)> = self
            .config
            .active_rules()
            .map(|rule| {
                let children = key
                    .as_ref()
                    .and_then(|k| ctx.children.get(&rule.child_source())?.get(k))
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                (rule, compute(children, rule))
            })
            .collect();

        let fields = parent_fields(&values);
        self.store.put_one(&self.parent, &parent.id, &fields).await?;
        ctx.parents_updated += 1;
        debug!(id = %parent.id, key = ?key, "parent updated");
        ctx.advance(Event::ParentProcessed, on_progress);

        let (Some(contact), Some(key)) = (&self.config.contact, key) else {
            return Ok(());
        };
        let fields = contact_fields(&values, self.config.legacy_contact_field.as_deref());
        if fields.is_empty() {
            return Ok(());
        }
        self.update_contacts(ctx, paginator, contact, &key, &fields, on_progress, is_cancelled)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn update_contacts<P, C>(
        &self,
        ctx: &mut RunContext,
        paginator: &RecordStorePaginator,
        contact: &ContactLink,
        key: &str,
        fields: &FieldUpdates,
        on_progress: &mut P,
        is_cancelled: &C,
    ) -> Result<(), SyncError>
    where
        P: FnMut(&Progress),
        C: Fn() -> bool,
    {
        ctx.checkpoint(on_progress, is_cancelled)?;
        let query = Query::filtered(Predicate::eq(&contact.join_field, key));
        let contacts = paginator
            .fetch_all(&self.store, &contact.collection, &query)
            .await?;

        let updates: Vec<RecordUpdate> = contacts
            .into_iter()
            .map(|record| RecordUpdate {
                id: record.id,
                fields: fields.clone(),
            })
            .collect();

        for batch in updates.chunks(self.limits.write_batch_size) {
            ctx.checkpoint(on_progress, is_cancelled)?;
            self.store.put_many(&contact.collection, batch).await?;
            ctx.contacts_updated += batch.len();
            debug!(key, batch = batch.len(), total = ctx.contacts_updated, "contacts updated");
            ctx.report(on_progress);
        }
        Ok(())
    }
}
