// Harvester module
// Resumable, deduplicating crawl of the registry into the catalog

pub mod registry;


use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use self::registry::RegistryClient;
use crate::catalog::{Catalog, CatalogStore, ToolRecord};
use crate::config::RegistryConfig;
use crate::{Result, ToolsyError};

/// Why a harvest run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The catalog holds `max_tools` records
    MaxToolsReached,
    /// The registry has no further listings
    Exhausted,
    /// A listing page could not be fetched or decoded
    PageFailed { page: u32, error: String },
}

impl fmt::Display for StopReason {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxToolsReached => write!(f, "reached the maximum number of tools"),
            Self::Exhausted => write!(f, "no more tools in the registry"),
            Self::PageFailed { page, error } => write!(f, "page {} failed: {}", page, error),
        }
    }
}

/// Outcome of one harvest run
#[derive(Debug, Clone)]
pub struct HarvestReport {
    pub catalog: Catalog,
    /// Records already present when the run started
    pub resumed: usize,
    /// Records added by this run
    pub added: usize,
    pub pages_fetched: u32,
    /// Tools whose detail fetch failed; they stay unseen and are retried next run
    pub failed_details: usize,
    pub stop_reason: StopReason,
}

/// Paginated crawler that grows the catalog one page at a time
#[derive(Debug)]
pub struct Harvester {
    registry: RegistryClient,
    store: CatalogStore,
    detail_delay: Duration,
    page_delay: Duration,
}

impl Harvester {
    #[inline]
    pub fn new(config: &RegistryConfig, store: CatalogStore) -> Result<Self> {
        Ok(Self {
            registry: RegistryClient::new(config)?,
            store,
            detail_delay: Duration::from_millis(config.detail_delay_ms),
            page_delay: Duration::from_millis(config.page_delay_ms),
        })
    }

    #[inline]
    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    /// Harvest until the catalog holds `max_tools` records or the registry runs dry.
    ///
    /// Listing and decode failures end the run early with the progress made so far;
    /// only catalog storage failures are returned as errors.
    #[inline]
    pub async fn harvest(&self, max_tools: usize) -> Result<HarvestReport> {
        let mut catalog = self.store.load()?;
        let resumed = catalog.len();
        if resumed > 0 {
            info!("Resume mode: {} tools already saved", resumed);
        }

        let bar = if console::user_attended_stderr() {
            ProgressBar::new_spinner().with_style(
                ProgressStyle::with_template("{spinner} [{pos}] Harvesting {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            )
        } else {
            ProgressBar::hidden()
        };
        bar.set_position(resumed as u64);

        let mut page = 1;
        let mut pages_fetched = 0;
        let mut failed_details = 0;
        let mut detail_fetched = false;

        let stop_reason = loop {
            if catalog.len() >= max_tools {
                info!("Reached max tools: {}", catalog.len());
                break StopReason::MaxToolsReached;
            }

            if pages_fetched > 0 {
                sleep(self.page_delay).await;
            }

            info!("Fetching listing page {}", page);
            let listing = match self.registry.fetch_page(page) {
                Ok(listing) => listing,
                Err(e) => {
                    error!("Error fetching page {}: {}", page, e);
                    break StopReason::PageFailed {
                        page,
                        error: e.to_string(),
                    };
                }
            };
            pages_fetched += 1;

            if listing.entries().is_empty() {
                info!("No more tools found on page {}", page);
                break StopReason::Exhausted;
            }

            let mut new_this_page = 0;
            for summary in listing.entries() {
                if catalog.len() >= max_tools {
                    break;
                }

                let Some(id) = summary.identifier() else {
                    let name = summary.name.clone().unwrap_or_default();
                    warn!("Skipping entry: {}", ToolsyError::MissingIdentifier(name));
                    continue;
                };

                if catalog.contains(id) {
                    debug!("Skipping already harvested tool {}", id);
                    continue;
                }

                if detail_fetched {
                    sleep(self.detail_delay).await;
                }
                detail_fetched = true;

                bar.set_message(id.to_string());
                match self.fetch_record(id) {
                    Ok(record) => {
                        catalog.push(record)?;
                        new_this_page += 1;
                        bar.inc(1);
                    }
                    Err(e) => {
                        error!("Error fetching details for {}: {}", id, e);
                        failed_details += 1;
                    }
                }
            }

            self.store.save(&catalog)?;
            info!(
                "Saved {} tools total (+{} new on page {})",
                catalog.len(),
                new_this_page,
                page
            );

            if !listing.has_next() {
                info!("No more pages");
                break StopReason::Exhausted;
            }

            page += 1;
        };

        bar.finish_and_clear();

        let added = catalog.len() - resumed;
        info!(
            "Harvest finished with {} tools ({} new): {}",
            catalog.len(),
            added,
            stop_reason
        );

        Ok(HarvestReport {
            catalog,
            resumed,
            added,
            pages_fetched,
            failed_details,
            stop_reason,
        })
    }

    fn fetch_record(&self, id: &str) -> Result<ToolRecord> {
        debug!("Fetching details for {}", id);
        let (detail, source) = self.registry.fetch_detail(id)?;
        ToolRecord::from_detail(id, detail, source.as_str())
    }
}
