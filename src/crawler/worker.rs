//! Validation workers
//!
//! Workers drain the shared queue until every walker has finished and the
//! queue is empty. Each popped item is judged exactly once and its findings
//! go to the run's [`ResultAggregator`].

use crate::crawler::queue::WorkQueue;
use crate::crawler::walker::WorkItem;
use crate::output::ResultAggregator;
use crate::schema::SchemaStore;
use crate::validation::{ConformanceValidator, Finding, ID_MISMATCH, UNKNOWN_TYPE};
use std::sync::Arc;

/// Report type for failures on external lists
pub const LIST_TYPE: &str = "List";

pub struct ValidationWorker {
    id: usize,
    queue: Arc<WorkQueue<WorkItem>>,
    validator: Arc<ConformanceValidator>,
    aggregator: Arc<ResultAggregator>,
}

impl ValidationWorker {
    pub fn new(
        id: usize,
        queue: Arc<WorkQueue<WorkItem>>,
        validator: Arc<ConformanceValidator>,
        aggregator: Arc<ResultAggregator>,
    ) -> Self {
        Self {
            id,
            queue,
            validator,
            aggregator,
        }
    }

    /// Runs until the queue is drained; returns the number of items handled
    pub async fn run(self) -> u64 {
        let mut handled = 0;
        while let Some(item) = self.queue.pop().await {
            tracing::trace!("worker {} picked {}", self.id, item.url());
            self.handle(item).await;
            handled += 1;
        }
        tracing::debug!("worker {} done after {} items", self.id, handled);
        handled
    }

    async fn handle(&self, item: WorkItem) {
        match item {
            WorkItem::Document(document) => {
                let validation = self.validator.validate(&document).await;
                let id = document.report_id();
                self.aggregator
                    .record_all(id, &validation.type_name, &validation.findings);
                if let Some(presence) = &validation.presence {
                    self.aggregator
                        .record_property_usage(&validation.type_name, presence);
                }
            }
            WorkItem::Malformed {
                url,
                expected_types,
                reason,
                ..
            } => {
                tracing::debug!("{} is malformed: {}", url, reason);
                let type_name = expected_type_name(self.validator.schemas(), &expected_types);
                self.aggregator.record(
                    &url,
                    &type_name,
                    &Finding::error("Document is not valid JSON"),
                );
            }
            WorkItem::Alias(document) => {
                let type_name = document
                    .declared_type()
                    .and_then(|declared| self.validator.schemas().get(declared).ok())
                    .map(|descriptor| descriptor.title.clone())
                    .unwrap_or_else(|| {
                        expected_type_name(self.validator.schemas(), &document.expected_types)
                    });
                self.aggregator.record(
                    document.report_id(),
                    &type_name,
                    &Finding::warning(ID_MISMATCH),
                );
            }
            WorkItem::ListPage { url, http } => {
                // Clean pages stay out of the document totals
                for finding in self.validator.check_response(&url, Some(&http)) {
                    self.aggregator.record(&url, LIST_TYPE, &finding);
                }
            }
            WorkItem::Unreachable {
                url,
                expected_types,
                list,
                error,
            } => {
                let type_name = if list {
                    LIST_TYPE.to_string()
                } else {
                    expected_type_name(self.validator.schemas(), &expected_types)
                };
                self.aggregator.record(
                    &url,
                    &type_name,
                    &Finding::warning(format!("Document could not be retrieved: {}", error.summary())),
                );
                self.aggregator.mark_fatal(&url);
            }
        }
    }
}

/// Display name of the type a link promised
fn expected_type_name(schemas: &SchemaStore, expected_types: &[String]) -> String {
    expected_types
        .first()
        .and_then(|type_id| schemas.get(type_id).ok())
        .map(|descriptor| descriptor.title.clone())
        .unwrap_or_else(|| UNKNOWN_TYPE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{FetchError, HttpMeta, QueueBackoff};
    use crate::validation::{Document, PredicateRegistry};
    use std::time::Duration;

    fn setup() -> (Arc<WorkQueue<WorkItem>>, Arc<ResultAggregator>, ValidationWorker) {
        let queue = Arc::new(WorkQueue::new(8));
        let schemas = Arc::new(SchemaStore::bundled("1.0").unwrap());
        let validator = Arc::new(ConformanceValidator::new(
            schemas,
            Arc::new(PredicateRegistry::with_builtin()),
        ));
        let aggregator = Arc::new(ResultAggregator::new("1.0", None));
        let worker = ValidationWorker::new(0, Arc::clone(&queue), validator, Arc::clone(&aggregator));
        (queue, aggregator, worker)
    }

    #[tokio::test]
    async fn test_worker_records_each_item() {
        let (queue, aggregator, worker) = setup();
        let producer = queue.register_producer(
            "test",
            QueueBackoff::new(Duration::from_millis(1), Duration::from_millis(1)),
        );

        let paper = Document::parse(
            "https://example.org/paper/1",
            r#"{"id": "https://example.org/paper/1"}"#,
            vec!["paper".to_string()],
            None,
        )
        .unwrap();
        producer.push(WorkItem::Document(Box::new(paper))).await;
        producer
            .push(WorkItem::Unreachable {
                url: "https://example.org/paper/2".to_string(),
                expected_types: vec!["paper".to_string()],
                list: false,
                error: FetchError::Status {
                    url: "https://example.org/paper/2".to_string(),
                    status: 404,
                },
            })
            .await;
        producer
            .push(WorkItem::Unreachable {
                url: "https://example.org/papers".to_string(),
                expected_types: vec!["paper".to_string()],
                list: true,
                error: FetchError::Timeout {
                    url: "https://example.org/papers".to_string(),
                },
            })
            .await;
        drop(producer);

        assert_eq!(worker.run().await, 3);

        let report = aggregator.compile();
        assert_eq!(report.counts.total, 3);
        assert_eq!(report.counts.fatal, 2);
        let unreachable = &report.messages_for("Paper");
        assert!(unreachable
            .iter()
            .any(|m| m.text == "Document could not be retrieved: HTTP status 404"));
        assert_eq!(report.messages_for(LIST_TYPE).len(), 1);
    }

    fn list_meta(encoding: Option<&str>) -> HttpMeta {
        HttpMeta {
            status: 200,
            content_encoding: encoding.map(str::to_string),
            requested_encoding: Some("gzip, deflate".to_string()),
            from_cache: false,
            latency_ms: 1.0,
        }
    }

    #[tokio::test]
    async fn test_list_pages_only_count_with_findings() {
        let (queue, aggregator, worker) = setup();
        let producer = queue.register_producer(
            "test",
            QueueBackoff::new(Duration::from_millis(1), Duration::from_millis(1)),
        );

        producer
            .push(WorkItem::ListPage {
                url: "https://example.org/papers".to_string(),
                http: list_meta(Some("gzip")),
            })
            .await;
        producer
            .push(WorkItem::ListPage {
                url: "https://example.org/people".to_string(),
                http: list_meta(None),
            })
            .await;
        drop(producer);

        assert_eq!(worker.run().await, 2);

        let report = aggregator.compile();
        assert_eq!(report.counts.total, 1);
        assert_eq!(report.counts.failed, 1);
        let messages = report.messages_for(LIST_TYPE);
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].affected_ids,
            vec!["https://example.org/people".to_string()]
        );
    }
}
