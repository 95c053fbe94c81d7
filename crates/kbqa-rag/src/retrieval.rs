//! Multi-query retrieval with order-stable deduplication

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use kbqa_core::{Chunk, Error, Result, SearchHit, VectorIndex};

use crate::query_expander::QueryExpander;

/// Runs the index query for every alias of a query and merges the results
pub struct RetrievalMerger<V: VectorIndex + ?Sized = dyn VectorIndex> {
    index: Arc<V>,
    expander: QueryExpander,
    call_timeout: Duration,
    concurrent: bool,
}

impl<V: VectorIndex + ?Sized> RetrievalMerger<V> {
    pub fn new(index: Arc<V>, expander: QueryExpander) -> Self {
        Self {
            index,
            expander,
            call_timeout: Duration::from_secs(60),
            concurrent: false,
        }
    }

    /// Deadline applied to every index call
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Query all aliases at once instead of one after another
    pub fn with_concurrency(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    pub fn expander(&self) -> &QueryExpander {
        &self.expander
    }

    async fn search_alias(&self, alias: &str, k: usize) -> Result<Vec<SearchHit>> {
        match timeout(self.call_timeout, self.index.search(alias, k)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "Index search exceeded {:?}",
                self.call_timeout
            ))),
        }
    }

    /// Merged, deduplicated chunks for `query` and its aliases.
    ///
    /// Order is alias order, then rank within each alias. A failing alias is
    /// logged and skipped; if every alias fails the result is empty.
    pub async fn retrieve(&self, query: &str, k: usize) -> Vec<Chunk> {
        let aliases = self.expander.expand(query);

        let results: Vec<Result<Vec<SearchHit>>> = if self.concurrent {
            join_all(aliases.iter().map(|alias| self.search_alias(alias, k))).await
        } else {
            let mut results = Vec::with_capacity(aliases.len());
            for alias in &aliases {
                results.push(self.search_alias(alias, k).await);
            }
            results
        };

        let mut per_alias = Vec::with_capacity(results.len());
        for (alias, result) in aliases.iter().zip(results) {
            match result {
                Ok(hits) => per_alias.push(hits.into_iter().map(|hit| hit.chunk).collect()),
                Err(e) => tracing::warn!(alias = %alias, error = %e, "alias retrieval failed"),
            }
        }

        let merged = merge_unique(per_alias);
        tracing::debug!(
            query = %query,
            aliases = aliases.len(),
            chunks = merged.len(),
            "merged retrieval"
        );
        merged
    }
}

/// Concatenate per-alias results keeping the first chunk for each retrieval key
pub fn merge_unique(per_alias: Vec<Vec<Chunk>>) -> Vec<Chunk> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for chunk in per_alias.into_iter().flatten() {
        if seen.insert(chunk.retrieval_key()) {
            merged.push(chunk);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_expander::SynonymRule;
    use async_trait::async_trait;
    use kbqa_core::VectorRecord;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Canned results per query; unknown queries fail
    struct ScriptedIndex {
        answers: HashMap<String, Vec<Chunk>>,
        calls: Mutex<Vec<String>>,
        delay: Option<Duration>,
    }

    impl ScriptedIndex {
        fn new(answers: &[(&str, Vec<Chunk>)]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|(q, c)| (q.to_string(), c.clone()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
                delay: None,
            }
        }
    }

    #[async_trait]
    impl VectorIndex for ScriptedIndex {
        async fn upsert(&self, _records: Vec<VectorRecord>) -> Result<()> {
            Ok(())
        }

        async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
            self.calls.lock().unwrap().push(query.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.answers.get(query) {
                Some(chunks) => Ok(chunks
                    .iter()
                    .take(k)
                    .map(|c| SearchHit { chunk: c.clone(), score: 1.0 })
                    .collect()),
                None => Err(Error::VectorStore(format!("no script for {}", query))),
            }
        }

        async fn count(&self) -> Result<usize> {
            Ok(self.answers.len())
        }

        async fn reset_collection(&self) -> Result<()> {
            Ok(())
        }

        fn dimension(&self) -> usize {
            8
        }
    }

    fn chunk(text: &str, page: u32) -> Chunk {
        Chunk::new(text, "doc.pdf").with_page(page).with_start_index(0)
    }

    fn expander() -> QueryExpander {
        QueryExpander::with_rules(vec![SynonymRule::new(&["gc"], &["alias-a", "alias-b"])])
    }

    #[tokio::test]
    async fn test_merge_dedups_keeping_first() {
        let index = Arc::new(ScriptedIndex::new(&[
            ("gc", vec![chunk("A", 1), chunk("B", 2)]),
            ("alias-a", vec![chunk("B", 2), chunk("C", 3)]),
            ("alias-b", vec![chunk("A", 1)]),
        ]));
        let merger = RetrievalMerger::new(index, expander());

        let merged = merger.retrieve("gc", 3).await;
        let contents: Vec<&str> = merged.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_result_may_exceed_k() {
        let index = Arc::new(ScriptedIndex::new(&[
            ("gc", vec![chunk("A", 1)]),
            ("alias-a", vec![chunk("B", 2)]),
            ("alias-b", vec![chunk("C", 3)]),
        ]));
        let merger = RetrievalMerger::new(index, expander());
        assert_eq!(merger.retrieve("gc", 1).await.len(), 3);
    }

    #[tokio::test]
    async fn test_failing_alias_is_skipped() {
        let index = Arc::new(ScriptedIndex::new(&[
            ("gc", vec![chunk("A", 1)]),
            ("alias-b", vec![chunk("C", 3)]),
        ]));
        let merger = RetrievalMerger::new(index.clone(), expander());

        let merged = merger.retrieve("gc", 3).await;
        assert_eq!(merged.len(), 2);
        assert_eq!(index.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_all_aliases_failing_is_empty() {
        let index = Arc::new(ScriptedIndex::new(&[]));
        let merger = RetrievalMerger::new(index, expander());
        assert!(merger.retrieve("gc", 3).await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_fan_out_matches_sequential() {
        let script = [
            ("gc", vec![chunk("A", 1), chunk("B", 2)]),
            ("alias-a", vec![chunk("C", 3), chunk("A", 1)]),
            ("alias-b", vec![chunk("D", 4)]),
        ];
        let sequential = RetrievalMerger::new(Arc::new(ScriptedIndex::new(&script)), expander());
        let concurrent = RetrievalMerger::new(Arc::new(ScriptedIndex::new(&script)), expander())
            .with_concurrency(true);

        assert_eq!(
            sequential.retrieve("gc", 3).await,
            concurrent.retrieve("gc", 3).await
        );
    }

    #[tokio::test]
    async fn test_slow_alias_times_out() {
        let mut index = ScriptedIndex::new(&[("slow", vec![chunk("A", 1)])]);
        index.delay = Some(Duration::from_millis(200));
        let merger = RetrievalMerger::new(Arc::new(index), QueryExpander::disabled())
            .with_call_timeout(Duration::from_millis(10));

        assert!(merger.retrieve("slow", 3).await.is_empty());
    }

    #[test]
    fn test_same_prefix_different_page_kept() {
        let merged = merge_unique(vec![vec![chunk("A", 1), chunk("A", 2)]]);
        assert_eq!(merged.len(), 2);
    }
}
