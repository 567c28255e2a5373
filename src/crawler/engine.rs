//! Crawl engine - run orchestration
//!
//! A run moves through `Idle -> Seeding -> Crawling -> Draining -> Compiled`:
//! - **Seeding**: probe the endpoint, admit the seed, start the seed walker
//! - **Crawling**: spawn the validation workers and let walkers feed them
//! - **Draining**: every walker has finished; workers empty the queue
//! - **Compiled**: workers joined, report built once
//!
//! An unreachable seed ends the run in `Compiled` with an error and no
//! report.

use crate::cache::Cache;
use crate::config::Config;
use crate::crawler::fetcher::{build_http_client, DocumentFetcher};
use crate::crawler::frontier::Frontier;
use crate::crawler::backoff::QueueBackoff;
use crate::crawler::queue::WorkQueue;
use crate::crawler::walker::{walker_id, WalkerContext, WorkItem};
use crate::crawler::worker::ValidationWorker;
use crate::output::{Progress, Report, ResultAggregator};
use crate::schema::SchemaStore;
use crate::state::{CrawlPhase, PhaseTracker, SeenSet};
use crate::url::{is_tls, normalize_url};
use crate::validation::{ConformanceValidator, Document, Finding, PredicateRegistry, UNKNOWN_TYPE};
use crate::{Result, ValidatorError};
use std::sync::Arc;
use std::time::Instant;

/// Id under which an unparsable standalone document is reported
pub const STDIN_ID: &str = "<stdin>";

/// Runs one validation: either a crawl from a seed or a standalone document
///
/// An engine is good for a single run; its phase never goes back to `Idle`.
pub struct CrawlEngine {
    config: Config,
    schemas: Arc<SchemaStore>,
    predicates: Arc<PredicateRegistry>,
    progress: Arc<Progress>,
    phase: PhaseTracker,
}

impl CrawlEngine {
    /// Creates an engine, loading schemas from the configured source
    ///
    /// The configuration is validated first; an engine never runs with
    /// settings the command line would reject.
    pub fn new(config: Config) -> Result<Self> {
        crate::config::validate(&config)?;
        let schemas = Arc::new(SchemaStore::from_config(&config.validator)?);
        Ok(Self {
            config,
            schemas,
            predicates: Arc::new(PredicateRegistry::with_builtin()),
            progress: Arc::new(Progress::log()),
            phase: PhaseTracker::new(),
        })
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = Arc::new(progress);
        self
    }

    /// Replaces the predicate registry, e.g. to add project-specific rules
    pub fn with_predicates(mut self, predicates: PredicateRegistry) -> Self {
        self.predicates = Arc::new(predicates);
        self
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase.current()
    }

    pub fn schemas(&self) -> &Arc<SchemaStore> {
        &self.schemas
    }

    /// Crawls the system reachable from `seed` and returns the report
    ///
    /// # Errors
    ///
    /// Fails before crawling when the seed is not a valid URL or does not
    /// answer a HEAD request with 200 or 304. Conformance problems found
    /// during the crawl are never errors; they are in the report.
    pub async fn run(&self, seed: &str) -> Result<Report> {
        self.phase.advance(CrawlPhase::Seeding)?;
        let started = Instant::now();

        let seed_url = match normalize_url(seed) {
            Ok(url) => url,
            Err(e) => {
                self.phase.advance(CrawlPhase::Compiled)?;
                return Err(e.into());
            }
        };
        let seed = seed_url.to_string();

        let crawler_config = &self.config.crawler;
        let client = build_http_client(crawler_config)?;
        let cache = Arc::new(Cache::from_config(&self.config.cache, &seed)?);
        tracing::debug!("Using cache namespace {}", cache.basekey());

        let aggregator = Arc::new(ResultAggregator::new(
            self.config.validator.oparl_version.clone(),
            Some(seed.clone()),
        ));
        let fetcher = Arc::new(
            DocumentFetcher::new(client, Arc::clone(&cache), crawler_config.request_timeout())
                .with_telemetry(Arc::clone(&aggregator)),
        );

        tracing::info!("Probing {}", seed);
        if let Err(e) = fetcher.probe(&seed).await {
            self.phase.advance(CrawlPhase::Compiled)?;
            return Err(ValidatorError::EndpointUnreachable {
                url: seed,
                reason: e.to_string(),
            });
        }
        aggregator.set_tls(is_tls(&seed_url));

        let frontier = Arc::new(Frontier::from_config(crawler_config, Arc::new(SeenSet::new())));
        let queue: Arc<WorkQueue<WorkItem>> = Arc::new(WorkQueue::new(crawler_config.queue_size));
        let backoff = QueueBackoff::new(crawler_config.backoff_unit(), crawler_config.backoff_max());

        let walkers = WalkerContext::new(
            Arc::clone(&fetcher),
            Arc::clone(&frontier),
            Arc::clone(&self.schemas),
            Arc::clone(&self.progress),
            crawler_config.recursive,
        );
        let root = frontier
            .admit_seed(&seed)
            .ok_or_else(|| ValidatorError::Task(format!("Seed {} admitted twice", seed)))?;
        // Registered before any worker exists, so workers cannot observe a
        // run without producers.
        let seed_producer = queue.register_producer(&walker_id(&seed), backoff);
        walkers.spawn(seed_producer, root);

        self.phase.advance(CrawlPhase::Crawling)?;
        let validator = Arc::new(ConformanceValidator::from_config(
            &self.config.validator,
            Arc::clone(&self.schemas),
            Arc::clone(&self.predicates),
            Some(Arc::clone(&fetcher)),
        ));
        let workers: Vec<_> = (0..crawler_config.workers)
            .map(|id| {
                let worker = ValidationWorker::new(
                    id,
                    Arc::clone(&queue),
                    Arc::clone(&validator),
                    Arc::clone(&aggregator),
                );
                tokio::spawn(worker.run())
            })
            .collect();
        tracing::info!("Started {} validation workers", workers.len());

        queue.wait_until_producers_finished().await;
        self.phase.advance(CrawlPhase::Draining)?;
        tracing::debug!("All walkers finished, draining {} queued items", queue.len());

        for handle in walkers.take_handles() {
            if let Err(e) = handle.await {
                tracing::error!("Walker task failed: {}", e);
            }
        }

        let mut handled = 0;
        for handle in workers {
            handled += handle
                .await
                .map_err(|e| ValidatorError::Task(format!("Validation worker failed: {}", e)))?;
        }

        aggregator.record_cache_stats(cache.stats());
        let report = aggregator.compile();
        self.phase.advance(CrawlPhase::Compiled)?;

        tracing::info!(
            "Validated {} items ({} documents) in {:.1}s, queue peaked at {}/{}",
            handled,
            report.counts.total,
            started.elapsed().as_secs_f64(),
            queue.high_water_mark(),
            queue.capacity()
        );
        Ok(report)
    }

    /// Validates one document without crawling
    ///
    /// No network access happens: file reachability checks are skipped and
    /// links are not followed.
    pub async fn validate_standalone(&self, raw: &str) -> Result<Report> {
        self.phase.advance(CrawlPhase::Seeding)?;
        let aggregator = ResultAggregator::new(self.config.validator.oparl_version.clone(), None);

        match Document::standalone(raw) {
            Ok(document) => {
                let validator = ConformanceValidator::from_config(
                    &self.config.validator,
                    Arc::clone(&self.schemas),
                    Arc::clone(&self.predicates),
                    None,
                );
                let validation = validator.validate(&document).await;
                aggregator.record_all(document.report_id(), &validation.type_name, &validation.findings);
                if let Some(presence) = &validation.presence {
                    aggregator.record_property_usage(&validation.type_name, presence);
                }
            }
            Err(e) => {
                tracing::debug!("Standalone input is not JSON: {}", e);
                aggregator.record(STDIN_ID, UNKNOWN_TYPE, &Finding::error("Document is not valid JSON"));
            }
        }

        self.phase.advance(CrawlPhase::Compiled)?;
        Ok(aggregator.compile())
    }
}
