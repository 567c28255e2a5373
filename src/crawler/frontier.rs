//! Crawl frontier
//!
//! Every edge passes through [`Frontier::admit`] before a walker follows it.
//! Admission applies, in order: the type whitelist, deduplication against
//! the shared [`SeenSet`], and the per-type quota. Only admitted entries are
//! counted against the quota.

use crate::config::CrawlerConfig;
use crate::crawler::links::{EdgeKind, LinkEdge, LinkSource};
use crate::schema::canonical_type_id;
use crate::state::SeenSet;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A unit of work for a walker
#[derive(Debug, Clone, PartialEq)]
pub struct FrontierEntry {
    pub url: String,
    pub expected_types: Vec<String>,
    /// None for seeds and fan-out roots
    pub source: Option<LinkSource>,
    pub kind: EdgeKind,
    /// Items of this list become roots of their own walkers
    pub fan_out: bool,
}

impl FrontierEntry {
    fn from_edge(edge: LinkEdge, fan_out: bool) -> Self {
        Self {
            url: edge.target_url,
            expected_types: edge.expected_types,
            source: Some(edge.source),
            kind: edge.kind,
            fan_out,
        }
    }
}

/// Outcome of an admission request
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Admitted(FrontierEntry),
    Duplicate,
    /// The primary type is not whitelisted
    Filtered,
    QuotaExceeded,
}

pub struct Frontier {
    seen: Arc<SeenSet>,
    whitelist: HashSet<String>,
    default_limit: Option<usize>,
    type_limits: HashMap<String, usize>,
    counts: Mutex<HashMap<String, usize>>,
}

impl Frontier {
    pub fn new(
        seen: Arc<SeenSet>,
        whitelist: &[String],
        default_limit: Option<usize>,
        type_limits: &HashMap<String, usize>,
    ) -> Self {
        Self {
            seen,
            whitelist: whitelist.iter().map(|t| canonical_type_id(t)).collect(),
            default_limit,
            type_limits: type_limits
                .iter()
                .map(|(t, limit)| (canonical_type_id(t), *limit))
                .collect(),
            counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &CrawlerConfig, seen: Arc<SeenSet>) -> Self {
        Self::new(seen, &config.types, config.max_documents, &config.type_limits)
    }

    pub fn seen(&self) -> &Arc<SeenSet> {
        &self.seen
    }

    /// Admits the seed; only deduplication applies
    pub fn admit_seed(&self, url: &str) -> Option<FrontierEntry> {
        if !self.seen.insert(url) {
            return None;
        }
        Some(FrontierEntry {
            url: url.to_string(),
            expected_types: Vec::new(),
            source: None,
            kind: EdgeKind::Reference,
            fan_out: false,
        })
    }

    /// Admits the target of a fan-out link as a new walker root
    ///
    /// Fan-out roots are structural: they bypass the whitelist and the
    /// quota, or a whitelist such as `Paper` could never reach any paper.
    pub fn admit_root(&self, edge: LinkEdge) -> Admission {
        if !self.seen.insert(&edge.target_url) {
            return Admission::Duplicate;
        }
        Admission::Admitted(FrontierEntry::from_edge(edge, false))
    }

    /// Admits a document edge
    pub fn admit(&self, edge: LinkEdge) -> Admission {
        let primary = edge.primary_type().map(str::to_string);

        if let Some(primary) = &primary {
            if !self.is_whitelisted(primary) {
                return Admission::Filtered;
            }
        }

        // Dedup and counting share the lock so the quota is never overshot
        // by two walkers admitting the last slot at once.
        let mut counts = self.counts.lock();
        if self.seen.contains(&edge.target_url) {
            return Admission::Duplicate;
        }
        if let Some(primary) = &primary {
            let used = counts.get(primary).copied().unwrap_or(0);
            if self.limit_for(primary).is_some_and(|limit| used >= limit) {
                return Admission::QuotaExceeded;
            }
        }
        if !self.seen.insert(&edge.target_url) {
            return Admission::Duplicate;
        }
        if let Some(primary) = primary {
            *counts.entry(primary).or_insert(0) += 1;
        }
        drop(counts);

        Admission::Admitted(FrontierEntry::from_edge(edge, false))
    }

    /// Admits an external list
    ///
    /// Lists are not documents: they are deduplicated but never counted.
    /// A list is skipped when its item type is filtered or exhausted.
    /// Fan-out lists bypass both checks.
    pub fn admit_list(&self, edge: LinkEdge, fan_out: bool) -> Admission {
        if !fan_out {
            if let Some(primary) = edge.primary_type() {
                if !self.is_whitelisted(primary) {
                    return Admission::Filtered;
                }
                if self.is_exhausted(primary) {
                    return Admission::QuotaExceeded;
                }
            }
        }
        if !self.seen.insert(&edge.target_url) {
            return Admission::Duplicate;
        }
        Admission::Admitted(FrontierEntry::from_edge(edge, fan_out))
    }

    /// Whether the next page of a list should be fetched
    pub fn admit_next_page(&self, url: &str, item_types: &[String], fan_out: bool) -> bool {
        if !fan_out {
            if let Some(primary) = item_types.first() {
                if self.is_exhausted(primary) {
                    return false;
                }
            }
        }
        self.seen.insert(url)
    }

    /// Records an alias (a document's declared id) so links to it dedup
    /// Claims an id outside of admission; false when it was already claimed
    pub fn mark_seen(&self, id: &str) -> bool {
        self.seen.insert(id)
    }

    pub fn admitted_count(&self, type_id: &str) -> usize {
        self.counts
            .lock()
            .get(&canonical_type_id(type_id))
            .copied()
            .unwrap_or(0)
    }

    fn is_whitelisted(&self, type_id: &str) -> bool {
        self.whitelist.is_empty() || self.whitelist.contains(type_id)
    }

    fn limit_for(&self, type_id: &str) -> Option<usize> {
        self.type_limits
            .get(type_id)
            .copied()
            .or(self.default_limit)
    }

    fn is_exhausted(&self, type_id: &str) -> bool {
        match self.limit_for(type_id) {
            Some(limit) => self.counts.lock().get(type_id).copied().unwrap_or(0) >= limit,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(url: &str, types: &[&str], kind: EdgeKind) -> LinkEdge {
        LinkEdge {
            target_url: url.to_string(),
            expected_types: types.iter().map(|t| t.to_string()).collect(),
            source: LinkSource {
                parent_url: "https://example.org/paper/0".to_string(),
                field: "relatedPaper".to_string(),
            },
            kind,
        }
    }

    fn frontier(types: &[&str], max: Option<usize>) -> Frontier {
        let types: Vec<String> = types.iter().map(|t| t.to_string()).collect();
        Frontier::new(Arc::new(SeenSet::new()), &types, max, &HashMap::new())
    }

    #[test]
    fn test_duplicates_are_rejected() {
        let frontier = frontier(&[], None);
        let first = frontier.admit(edge("https://example.org/p/1", &["paper"], EdgeKind::Reference));
        assert!(matches!(first, Admission::Admitted(_)));
        let second = frontier.admit(edge("https://example.org/p/1", &["paper"], EdgeKind::Reference));
        assert_eq!(second, Admission::Duplicate);
        assert_eq!(frontier.admitted_count("Paper"), 1);
    }

    #[test]
    fn test_quota_admits_exactly_limit() {
        let frontier = frontier(&[], Some(1));
        let outcomes: Vec<_> = (1..=3)
            .map(|i| frontier.admit(edge(&format!("https://example.org/p/{}", i), &["paper"], EdgeKind::Reference)))
            .collect();
        assert!(matches!(outcomes[0], Admission::Admitted(_)));
        assert_eq!(outcomes[1], Admission::QuotaExceeded);
        assert_eq!(outcomes[2], Admission::QuotaExceeded);
        // Rejected links are not marked seen
        assert!(!frontier.seen().contains("https://example.org/p/2"));
    }

    #[test]
    fn test_quota_counts_first_expected_type() {
        let frontier = frontier(&[], Some(1));
        let first = frontier.admit(edge("https://example.org/x/1", &["paper", "file"], EdgeKind::Reference));
        assert!(matches!(first, Admission::Admitted(_)));
        let file = frontier.admit(edge("https://example.org/f/1", &["file"], EdgeKind::Reference));
        assert!(matches!(file, Admission::Admitted(_)));
        assert_eq!(frontier.admitted_count("paper"), 1);
        assert_eq!(frontier.admitted_count("file"), 1);
    }

    #[test]
    fn test_type_limit_overrides_default() {
        let mut limits = HashMap::new();
        limits.insert("Paper".to_string(), 2);
        let frontier = Frontier::new(Arc::new(SeenSet::new()), &[], Some(1), &limits);
        for i in 1..=2 {
            let outcome = frontier.admit(edge(&format!("https://example.org/p/{}", i), &["paper"], EdgeKind::Reference));
            assert!(matches!(outcome, Admission::Admitted(_)));
        }
        let person = frontier.admit(edge("https://example.org/person/1", &["person"], EdgeKind::Reference));
        assert!(matches!(person, Admission::Admitted(_)));
        let person = frontier.admit(edge("https://example.org/person/2", &["person"], EdgeKind::Reference));
        assert_eq!(person, Admission::QuotaExceeded);
    }

    #[test]
    fn test_whitelist_applies_before_dedup() {
        let frontier = frontier(&["Paper"], None);
        let person = frontier.admit(edge("https://example.org/person/1", &["person"], EdgeKind::Reference));
        assert_eq!(person, Admission::Filtered);
        assert!(!frontier.seen().contains("https://example.org/person/1"));
    }

    #[test]
    fn test_seed_bypasses_whitelist_and_quota() {
        let frontier = frontier(&["Paper"], Some(0));
        let seed = frontier.admit_seed("https://example.org/").unwrap();
        assert!(seed.expected_types.is_empty());
        assert!(seed.source.is_none());
        assert!(frontier.admit_seed("https://example.org/").is_none());
    }

    #[test]
    fn test_exhausted_lists_are_skipped() {
        let frontier = frontier(&[], Some(1));
        frontier.admit(edge("https://example.org/p/1", &["paper"], EdgeKind::Reference));
        let list = frontier.admit_list(edge("https://example.org/papers", &["paper"], EdgeKind::ExternalList), false);
        assert_eq!(list, Admission::QuotaExceeded);
        let fan_out = frontier.admit_list(edge("https://example.org/papers", &["paper"], EdgeKind::ExternalList), true);
        assert!(matches!(fan_out, Admission::Admitted(FrontierEntry { fan_out: true, .. })));
        assert!(!frontier.admit_next_page("https://example.org/papers?page=2", &["paper".to_string()], false));
    }

    #[test]
    fn test_concurrent_admission_never_overshoots() {
        let frontier = Arc::new(frontier(&[], Some(10)));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let frontier = Arc::clone(&frontier);
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|i| {
                            let url = format!("https://example.org/p/{}-{}", t, i);
                            matches!(frontier.admit(edge(&url, &["paper"], EdgeKind::Reference)), Admission::Admitted(_))
                        })
                        .count()
                })
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 10);
    }
}
