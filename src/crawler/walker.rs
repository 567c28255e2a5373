//! Subtree walkers
//!
//! A walker owns one subtree of the document graph. It keeps a local FIFO
//! of frontier entries, fetches each one, mines its links and pushes every
//! document it produces into the shared work queue. The walker's producer
//! flag stays set until its local FIFO is exhausted; when the walker is
//! dropped (including on panic) the flag is cleared.

use crate::crawler::fetcher::{DocumentFetcher, FetchError, HttpMeta};
use crate::crawler::frontier::{Admission, Frontier, FrontierEntry};
use crate::crawler::links::{synthetic_id, EdgeKind, LinkEdge, LinkMiner, LinkSource, ListPage};
use crate::crawler::queue::ProducerHandle;
use crate::output::Progress;
use crate::schema::SchemaStore;
use crate::url::normalize_url;
use crate::validation::Document;
use parking_lot::Mutex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// What walkers hand to the validation workers
#[derive(Debug)]
pub enum WorkItem {
    Document(Box<Document>),
    /// The body was retrieved but is not JSON
    Malformed {
        url: String,
        expected_types: Vec<String>,
        http: Option<HttpMeta>,
        reason: String,
    },
    /// A fetched document whose declared id was already claimed by another
    /// URL; it is not validated a second time
    Alias(Box<Document>),
    /// A fetched page of an external list; only its response is judged
    ListPage { url: String, http: HttpMeta },
    /// Nothing could be retrieved
    Unreachable {
        url: String,
        expected_types: Vec<String>,
        /// The target was an external list rather than a document
        list: bool,
        error: FetchError,
    },
}

/// Producer name of the walker rooted at `url`
pub fn walker_id(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    format!("walker_{}", &hex::encode(digest)[..6])
}

/// State shared by all walkers of a run
pub struct WalkerContext {
    fetcher: Arc<DocumentFetcher>,
    frontier: Arc<Frontier>,
    schemas: Arc<SchemaStore>,
    progress: Arc<Progress>,
    recursive: bool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WalkerContext {
    pub fn new(
        fetcher: Arc<DocumentFetcher>,
        frontier: Arc<Frontier>,
        schemas: Arc<SchemaStore>,
        progress: Arc<Progress>,
        recursive: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            fetcher,
            frontier,
            schemas,
            progress,
            recursive,
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Starts a walker on an already registered producer
    ///
    /// The producer must be registered by the caller before this is called,
    /// so the run can never look finished between registration and start.
    pub fn spawn(self: &Arc<Self>, producer: ProducerHandle<WorkItem>, root: FrontierEntry) {
        let walker = Walker {
            ctx: Arc::clone(self),
            producer,
            local: VecDeque::new(),
        };
        let handle = tokio::spawn(walker.run(root));
        self.handles.lock().push(handle);
    }

    /// Join handles of every walker spawned so far
    pub fn take_handles(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *self.handles.lock())
    }
}

struct Walker {
    ctx: Arc<WalkerContext>,
    producer: ProducerHandle<WorkItem>,
    local: VecDeque<FrontierEntry>,
}

impl Walker {
    async fn run(mut self, root: FrontierEntry) {
        let id = self.producer.name().to_string();
        self.ctx
            .progress
            .add_bar(&id, &format!("Walking {}", root.url), "Objects");
        tracing::debug!("{} started at {}", id, root.url);

        self.local.push_back(root);
        while let Some(entry) = self.local.pop_front() {
            match entry.kind.clone() {
                EdgeKind::Reference => self.visit_remote(entry).await,
                EdgeKind::Embedded(body) => self.visit_embedded(entry, *body).await,
                EdgeKind::ExternalList => self.visit_list(entry).await,
            }
            self.ctx.progress.update_bar(&id, self.local.len() as u64);
        }

        tracing::debug!("{} finished", id);
    }

    async fn visit_remote(&mut self, entry: FrontierEntry) {
        let fetched = match self.ctx.fetcher.fetch(&entry.url).await {
            Ok(fetched) => fetched,
            Err(error) => {
                tracing::warn!("{}", error);
                self.push(WorkItem::Unreachable {
                    url: entry.url,
                    expected_types: entry.expected_types,
                    list: false,
                    error,
                })
                .await;
                return;
            }
        };

        let document = match Document::parse(
            &fetched.url,
            &fetched.body,
            entry.expected_types.clone(),
            Some(fetched.http.clone()),
        ) {
            Ok(document) => document,
            Err(e) => {
                self.push(WorkItem::Malformed {
                    url: fetched.url,
                    expected_types: entry.expected_types,
                    http: Some(fetched.http),
                    reason: e.to_string(),
                })
                .await;
                return;
            }
        };

        let claimed_elsewhere = document
            .declared_id()
            .and_then(|id| normalize_url(id).ok())
            .is_some_and(|id| id.as_str() != entry.url && !self.ctx.frontier.mark_seen(id.as_str()));
        if claimed_elsewhere {
            // The declared id is walked on its own; only the mismatch is news
            tracing::debug!("{} serves an already claimed id", entry.url);
            self.push(WorkItem::Alias(Box::new(document))).await;
            return;
        }
        self.expand_and_push(document).await;
    }

    async fn visit_embedded(&mut self, entry: FrontierEntry, body: Value) {
        let (parent, field) = match &entry.source {
            Some(LinkSource { parent_url, field }) => (parent_url.clone(), field.clone()),
            None => (entry.url.clone(), String::new()),
        };
        let document = Document::embedded(&entry.url, body, entry.expected_types, &parent, &field);
        self.expand_and_push(document).await;
    }

    /// Walks every page of an external list
    ///
    /// Items become embedded documents of the list. Items of a fan-out list
    /// are handed to new walkers instead.
    async fn visit_list(&mut self, entry: FrontierEntry) {
        let mut page_url = entry.url.clone();
        loop {
            let page = match self.fetch_page(&page_url, &entry).await {
                Some(page) => page,
                None => return,
            };

            for (index, item) in page.items.into_iter().enumerate() {
                let Some(edge) = list_item_edge(&page_url, index, item, &entry.expected_types) else {
                    continue;
                };
                if entry.fan_out {
                    self.fan_out(edge);
                } else {
                    self.admit(edge);
                }
            }

            match page.next {
                Some(next)
                    if self
                        .ctx
                        .frontier
                        .admit_next_page(&next, &entry.expected_types, entry.fan_out) =>
                {
                    page_url = next
                }
                _ => return,
            }
        }
    }

    async fn fetch_page(&mut self, url: &str, entry: &FrontierEntry) -> Option<ListPage> {
        let fetched = match self.ctx.fetcher.fetch(url).await {
            Ok(fetched) => fetched,
            Err(error) => {
                tracing::warn!("{}", error);
                self.push(WorkItem::Unreachable {
                    url: url.to_string(),
                    expected_types: entry.expected_types.clone(),
                    list: true,
                    error,
                })
                .await;
                return None;
            }
        };

        match ListPage::parse(&fetched.body) {
            Ok(page) => {
                self.push(WorkItem::ListPage {
                    url: url.to_string(),
                    http: fetched.http,
                })
                .await;
                Some(page)
            }
            Err(e) => {
                self.push(WorkItem::Malformed {
                    url: url.to_string(),
                    expected_types: entry.expected_types.clone(),
                    http: Some(fetched.http),
                    reason: e.to_string(),
                })
                .await;
                None
            }
        }
    }

    /// Mines links of a document, queues what they admit, then pushes the
    /// document itself to the workers
    async fn expand_and_push(&mut self, document: Document) {
        let edges = self.mine(&document);
        let fan_out_field = document
            .declared_type()
            .and_then(|t| self.ctx.schemas.get(t).ok())
            .and_then(|descriptor| descriptor.fan_out.clone());

        self.push(WorkItem::Document(Box::new(document))).await;

        for edge in edges {
            let is_fan_out = fan_out_field.as_deref() == Some(edge.source.field.as_str());
            let is_list = edge.kind == EdgeKind::ExternalList;
            let is_reference = edge.kind == EdgeKind::Reference;
            if is_list {
                if let Admission::Admitted(entry) = self.ctx.frontier.admit_list(edge, is_fan_out) {
                    self.local.push_back(entry);
                }
            } else if is_reference && is_fan_out {
                self.fan_out(edge);
            } else {
                self.admit(edge);
            }
        }
    }

    fn mine(&self, document: &Document) -> Vec<LinkEdge> {
        let Some(type_name) = document.declared_type() else {
            return Vec::new();
        };
        let descriptor = match self.ctx.schemas.get(type_name) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                tracing::debug!("Not following links of {}: {}", document.url, e);
                return Vec::new();
            }
        };

        let edges = LinkMiner::mine(&descriptor, &document.url, &document.body);
        if self.ctx.recursive {
            edges
        } else {
            edges
                .into_iter()
                .filter(|edge| matches!(edge.kind, EdgeKind::Embedded(_)))
                .collect()
        }
    }

    fn admit(&mut self, edge: LinkEdge) {
        let target = edge.target_url.clone();
        match self.ctx.frontier.admit(edge) {
            Admission::Admitted(entry) => self.local.push_back(entry),
            Admission::QuotaExceeded => tracing::trace!("Quota reached, skipping {}", target),
            Admission::Filtered => tracing::trace!("Type not whitelisted, skipping {}", target),
            Admission::Duplicate => {}
        }
    }

    /// Hands a fan-out target to a new walker
    fn fan_out(&mut self, edge: LinkEdge) {
        if let Admission::Admitted(root) = self.ctx.frontier.admit_root(edge) {
            let sibling = self.producer.register_sibling(&walker_id(&root.url));
            tracing::info!("Starting {} for {}", sibling.name(), root.url);
            self.ctx.spawn(sibling, root);
        }
    }

    async fn push(&self, item: WorkItem) {
        let progress = Arc::clone(&self.ctx.progress);
        self.producer
            .push_with(item, |delay| {
                progress.message(&format!("Queue full, waiting {}", describe_wait(delay)));
            })
            .await;
    }
}

/// Human wording of a backoff delay; sub-second waits are given in ms
fn describe_wait(delay: Duration) -> String {
    if delay < Duration::from_secs(1) {
        return format!("{} ms", delay.as_millis());
    }
    let secs = delay.as_secs();
    format!("{} second{}", secs, if secs == 1 { "" } else { "s" })
}

/// Turns one list item into an edge
///
/// Items are usually full objects; a bare URL string is followed as a
/// reference.
fn list_item_edge(
    page_url: &str,
    index: usize,
    item: Value,
    item_types: &[String],
) -> Option<LinkEdge> {
    let source = LinkSource {
        parent_url: page_url.to_string(),
        field: "data".to_string(),
    };
    match item {
        Value::String(url) => {
            let url = normalize_url(&url).ok()?;
            Some(LinkEdge {
                target_url: url.to_string(),
                expected_types: item_types.to_vec(),
                source,
                kind: EdgeKind::Reference,
            })
        }
        Value::Object(_) => {
            let target_url = item
                .get("id")
                .and_then(Value::as_str)
                .and_then(|id| normalize_url(id).ok())
                .map(|url| url.to_string())
                .unwrap_or_else(|| synthetic_id(page_url, "data", Some(index)));
            Some(LinkEdge {
                target_url,
                expected_types: item_types.to_vec(),
                source,
                kind: EdgeKind::Embedded(Box::new(item)),
            })
        }
        _ => None,
    }
}

impl WorkItem {
    pub fn url(&self) -> &str {
        match self {
            Self::Document(document) | Self::Alias(document) => &document.url,
            Self::Malformed { url, .. }
            | Self::ListPage { url, .. }
            | Self::Unreachable { url, .. } => url,
        }
    }
}
