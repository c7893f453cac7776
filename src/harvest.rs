//! Harvest orchestration.
//!
//! Each configured collection is walked page by page:
//!
//! ```text
//! Listing(page) → Enumerated(ids) → Fetching(id) → Loaded | Dropped
//!               → Listing(page + 1) … → Done
//! ```
//!
//! Collections run one after another in configured order. Within a page,
//! identifiers are fetched concurrently by a bounded pool and loaded as
//! each fetch completes. A failed page ends its collection (the next one
//! still runs); a failed item is counted and skipped.

use std::sync::Arc;

use anyhow::{bail, Result};
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::cache::{ArtifactCache, FsArtifactStore};
use crate::catalog::{CatalogClient, CatalogPage};
use crate::config::Config;
use crate::db;
use crate::error::LoadError;
use crate::fetch::ItemFetcher;
use crate::http::{self, Throttle};
use crate::index::IndexLoader;
use crate::migrate;
use crate::models::Fetched;
use crate::store::{ItemStore, SqliteItemStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestStats {
    /// Catalog pages retrieved.
    pub pages: u64,
    /// Identifiers enumerated.
    pub listed: u64,
    /// Items written to the store (or, in a dry run, ready to be).
    pub loaded: u64,
    /// Items skipped for missing data.
    pub dropped: u64,
    /// Items that errored.
    pub failed: u64,
}

impl HarvestStats {
    pub fn add(&mut self, other: &HarvestStats) {
        self.pages += other.pages;
        self.listed += other.listed;
        self.loaded += other.loaded;
        self.dropped += other.dropped;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone)]
pub struct CollectionReport {
    pub collection: String,
    pub stats: HarvestStats,
    /// Set when listing stopped early because a catalog page failed.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct HarvestReport {
    pub collections: Vec<CollectionReport>,
}

impl HarvestReport {
    pub fn totals(&self) -> HarvestStats {
        let mut total = HarvestStats::default();
        for c in &self.collections {
            total.add(&c.stats);
        }
        total
    }
}

pub struct Harvester {
    catalog: CatalogClient,
    fetcher: ItemFetcher,
    /// `None` for a dry run.
    loader: Option<IndexLoader>,
    concurrency: usize,
}

impl Harvester {
    pub fn new(
        catalog: CatalogClient,
        fetcher: ItemFetcher,
        loader: Option<IndexLoader>,
        concurrency: usize,
    ) -> Self {
        Self {
            catalog,
            fetcher,
            loader,
            concurrency: concurrency.max(1),
        }
    }

    /// Wire up the HTTP client, artifact cache and throttle from `config`.
    ///
    /// Pass `store = None` to fetch and cache without writing the index.
    pub fn from_config(config: &Config, store: Option<Arc<dyn ItemStore>>) -> Result<Self> {
        let client = http::create_client(&config.harvest)?;
        let cache = Arc::new(ArtifactCache::new(Arc::new(FsArtifactStore::new(
            &config.cache.root,
        ))));
        let throttle = Throttle::from_millis(config.harvest.request_delay_ms);

        let catalog = CatalogClient::new(client.clone(), &config.harvest);
        let fetcher = ItemFetcher::new(client, cache, throttle, &config.harvest)?;
        let loader = store.map(IndexLoader::new);

        Ok(Self::new(catalog, fetcher, loader, config.harvest.concurrency))
    }

    pub fn is_dry_run(&self) -> bool {
        self.loader.is_none()
    }

    /// Harvest every collection in order.
    pub async fn run(&self, collections: &[String]) -> HarvestReport {
        let mut report = HarvestReport::default();
        for collection in collections {
            report.collections.push(self.harvest_collection(collection).await);
        }
        report
    }

    pub async fn harvest_collection(&self, collection: &str) -> CollectionReport {
        let mut stats = HarvestStats::default();
        let mut failure = None;
        let mut pager = self.catalog.list_collection(collection);

        info!(collection, "harvest started");

        loop {
            debug!(collection, "listing next page");
            let page = match pager.next_page().await {
                Ok(Some(page)) => page,
                Ok(None) => break,
                Err(e) => {
                    error!(collection, error = %e, "catalog listing failed; skipping rest of collection");
                    failure = Some(e.to_string());
                    break;
                }
            };

            stats.pages += 1;
            stats.listed += page.identifiers.len() as u64;
            debug!(
                collection,
                page = page.page,
                ids = page.identifiers.len(),
                num_found = page.num_found,
                "enumerated"
            );

            self.harvest_page(collection, &page, &mut stats).await;
        }

        info!(
            collection,
            pages = stats.pages,
            listed = stats.listed,
            loaded = stats.loaded,
            dropped = stats.dropped,
            failed = stats.failed,
            "harvest done"
        );

        CollectionReport {
            collection: collection.to_string(),
            stats,
            error: failure,
        }
    }

    async fn harvest_page(&self, collection: &str, page: &CatalogPage, stats: &mut HarvestStats) {
        let fetcher = &self.fetcher;
        let mut outcomes = stream::iter(page.identifiers.iter())
            .map(|id| async move {
                debug!(collection, id = %id, "fetching");
                (id, fetcher.fetch(collection, id).await)
            })
            .buffer_unordered(self.concurrency);

        while let Some((id, outcome)) = outcomes.next().await {
            match outcome {
                Ok(Fetched::Item(item)) => {
                    let Some(loader) = &self.loader else {
                        debug!(collection, id = %id, "fetched (dry run, not loaded)");
                        stats.loaded += 1;
                        continue;
                    };
                    match loader.load(collection, &item).await {
                        Ok(()) => {
                            debug!(collection, id = %id, "loaded");
                            stats.loaded += 1;
                        }
                        Err(LoadError::MissingText(_)) => {
                            warn!(collection, id = %id, "no full text; not indexed");
                            stats.dropped += 1;
                        }
                        Err(e) => {
                            error!(collection, id = %id, error = %e, "load failed");
                            stats.failed += 1;
                        }
                    }
                }
                Ok(Fetched::Dropped(dropped)) => {
                    info!(collection, id = %id, reason = %dropped.reason, "dropped");
                    stats.dropped += 1;
                }
                Err(e) => {
                    error!(collection, id = %id, error = %e, "fetch failed");
                    stats.failed += 1;
                }
            }
        }
    }
}

/// CLI entry point for `archivist harvest`.
pub async fn run_harvest(config: &Config, collection: Option<String>, dry_run: bool) -> Result<()> {
    let collections = match collection {
        Some(c) => vec![c],
        None => config.harvest.collections.clone(),
    };
    if collections.is_empty() {
        bail!("No collections to harvest. Set [harvest] collections in config or pass --collection.");
    }

    let pool = if dry_run {
        None
    } else {
        let pool = db::connect(config).await?;
        migrate::apply_schema(&pool).await?;
        Some(pool)
    };

    let store = pool
        .clone()
        .map(|p| Arc::new(SqliteItemStore::new(p)) as Arc<dyn ItemStore>);
    let harvester = Harvester::from_config(config, store)?;
    let report = harvester.run(&collections).await;

    if let Some(pool) = pool {
        pool.close().await;
    }

    let suffix = if dry_run { " (dry-run)" } else { "" };
    for c in &report.collections {
        println!("harvest {}{}", c.collection, suffix);
        print_stats(&c.stats, dry_run);
        if let Some(ref err) = c.error {
            println!("  error: {}", err);
        }
    }
    if report.collections.len() > 1 {
        println!("total{}", suffix);
        print_stats(&report.totals(), dry_run);
    }
    println!("ok");

    Ok(())
}

fn print_stats(stats: &HarvestStats, dry_run: bool) {
    println!("  pages: {}", stats.pages);
    println!("  listed: {}", stats.listed);
    if dry_run {
        println!("  ready to load: {}", stats.loaded);
    } else {
        println!("  loaded: {}", stats.loaded);
    }
    println!("  dropped: {}", stats.dropped);
    println!("  failed: {}", stats.failed);
}
