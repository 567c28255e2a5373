//! Crawler module: fetching, walking and validating the document graph
//!
//! This module contains the concurrent crawl pipeline:
//! - HTTP fetching with manual compression handling and caching
//! - Schema-driven link mining
//! - Frontier admission with deduplication, type whitelist and quotas
//! - Subtree walkers feeding one bounded work queue with backoff
//! - Validation workers draining the queue
//! - The engine driving a run through its phases

mod backoff;
mod engine;
mod fetcher;
mod frontier;
mod links;
mod queue;
mod walker;
mod worker;

pub use backoff::QueueBackoff;
pub use engine::{CrawlEngine, STDIN_ID};
pub use fetcher::{
    build_http_client, decode_body, DocumentFetcher, FetchError, FetchedBody, HeadResponse,
    HttpMeta, ACCEPT_ENCODING_VALUE, CACHED_STATUS, SUPPORTED_ENCODINGS,
};
pub use frontier::{Admission, Frontier, FrontierEntry};
pub use links::{synthetic_id, EdgeKind, LinkEdge, LinkMiner, LinkSource, ListPage, ListPageError};
pub use queue::{ProducerHandle, PushError, WorkQueue};
pub use walker::{walker_id, WalkerContext, WorkItem};
pub use worker::{ValidationWorker, LIST_TYPE};
