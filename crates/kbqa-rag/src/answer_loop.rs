//! Round-based adaptive answering

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use kbqa_core::{Chunk, CompletionService, Error, Result, VectorIndex};

use crate::context::{render_citations, render_context, ContextBudget};
use crate::decision::{parse_decision, Decision};
use crate::prompts;
use crate::retrieval::RetrievalMerger;

/// Per-request retrieval width and round budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerOptions {
    pub k: usize,
    pub max_rounds: usize,
}

impl Default for AnswerOptions {
    fn default() -> Self {
        Self { k: 3, max_rounds: 3 }
    }
}

/// How an answer request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The model judged the context sufficient
    Final,
    /// Rounds ran out, a query repeated, or the model had no next query
    Exhausted,
    /// The decision could not be obtained or parsed
    Fallback,
}

/// What happened during one request, for logs and tests
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerTrace {
    pub outcome: Outcome,
    pub rounds: usize,
    pub queries: Vec<String>,
    pub chunks: usize,
    pub completion_calls: usize,
}

/// Mutable state of one request. Both collections only grow.
struct RoundState {
    current_query: String,
    seen_queries: HashSet<String>,
    issued: Vec<String>,
    accumulated: Vec<Chunk>,
    round: usize,
    completion_calls: usize,
}

impl RoundState {
    fn new(question: &str) -> Self {
        Self {
            current_query: question.to_string(),
            seen_queries: HashSet::new(),
            issued: Vec::new(),
            accumulated: Vec::new(),
            round: 1,
            completion_calls: 0,
        }
    }

    fn into_trace(self, outcome: Outcome) -> AnswerTrace {
        AnswerTrace {
            outcome,
            rounds: self.issued.len(),
            queries: self.issued,
            chunks: self.accumulated.len(),
            completion_calls: self.completion_calls,
        }
    }
}

/// Retrieve, judge, reformulate; bounded by a round budget and a context budget.
///
/// Holds only shared handles, so one instance can serve concurrent requests.
pub struct AnswerLoop<
    V: VectorIndex + ?Sized = dyn VectorIndex,
    C: CompletionService + ?Sized = dyn CompletionService,
> {
    retriever: RetrievalMerger<V>,
    llm: Arc<C>,
    budget: ContextBudget,
    call_timeout: Duration,
}

impl<V: VectorIndex + ?Sized, C: CompletionService + ?Sized> AnswerLoop<V, C> {
    pub fn new(retriever: RetrievalMerger<V>, llm: Arc<C>) -> Self {
        Self {
            retriever,
            llm,
            budget: ContextBudget::default(),
            call_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_budget(mut self, budget: ContextBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Deadline for every completion call
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn retriever(&self) -> &RetrievalMerger<V> {
        &self.retriever
    }

    pub fn model_id(&self) -> &str {
        self.llm.model_id()
    }

    /// Answer `question`; always returns non-empty text
    pub async fn answer(&self, question: &str, k: usize, max_rounds: usize) -> String {
        let (answer, _) = self
            .answer_with_trace(question, AnswerOptions { k, max_rounds })
            .await;
        answer
    }

    pub async fn answer_with_trace(
        &self,
        question: &str,
        options: AnswerOptions,
    ) -> (String, AnswerTrace) {
        let options = clamp_options(options);
        let mut state = RoundState::new(question);

        loop {
            if state.seen_queries.contains(&state.current_query) {
                tracing::debug!(query = %state.current_query, "query already issued, stopping");
                break;
            }
            state.seen_queries.insert(state.current_query.clone());
            state.issued.push(state.current_query.clone());

            let retrieved = self.retriever.retrieve(&state.current_query, options.k).await;
            tracing::debug!(
                round = state.round,
                query = %state.current_query,
                retrieved = retrieved.len(),
                "retrieval round"
            );
            state.accumulated.extend(retrieved);

            let context = render_context(&state.accumulated, &self.budget);
            state.completion_calls += 1;
            let decision = self
                .complete(&prompts::decision_prompt(question, &context))
                .await
                .and_then(|text| parse_decision(&text));

            match decision {
                Err(e) => {
                    tracing::warn!(
                        round = state.round,
                        error = %e,
                        "decision unavailable, using fallback synthesis"
                    );
                    state.completion_calls += 1;
                    let answer = self
                        .synthesize(&prompts::fallback_prompt(question, &context))
                        .await;
                    return (answer, state.into_trace(Outcome::Fallback));
                }
                Ok(Decision::Final { answer }) => {
                    let answer = if answer.is_empty() {
                        prompts::EMPTY_ANSWER_PLACEHOLDER.to_string()
                    } else {
                        answer
                    };
                    return (answer, state.into_trace(Outcome::Final));
                }
                Ok(Decision::NeedMore { next_query }) => {
                    if next_query.is_empty() {
                        tracing::debug!(round = state.round, "no next query, stopping");
                        break;
                    }
                    state.round += 1;
                    if state.round > options.max_rounds {
                        tracing::debug!(max_rounds = options.max_rounds, "round budget spent");
                        break;
                    }
                    state.current_query = next_query;
                }
            }
        }

        let context = render_context(&state.accumulated, &self.budget);
        state.completion_calls += 1;
        let answer = self
            .synthesize(&prompts::final_prompt(question, &context))
            .await;
        (answer, state.into_trace(Outcome::Exhausted))
    }

    /// One merged retrieval and one answer call, without judging rounds
    pub async fn answer_once(&self, question: &str, k: usize) -> String {
        let k = k.max(1);
        let chunks = self.retriever.retrieve(question, k).await;
        if chunks.is_empty() {
            return prompts::NO_DOCUMENTS_ANSWER.to_string();
        }
        let context = render_citations(&chunks, self.budget.max_chars);
        self.synthesize(&prompts::single_shot_prompt(question, &context))
            .await
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        match timeout(self.call_timeout, self.llm.complete(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "Completion exceeded {:?}",
                self.call_timeout
            ))),
        }
    }

    async fn synthesize(&self, prompt: &str) -> String {
        match self.complete(prompt).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                tracing::warn!("synthesis returned empty text");
                prompts::INSUFFICIENT_ANSWER.to_string()
            }
            Err(e) => {
                tracing::warn!(error = %e, "synthesis failed");
                prompts::INSUFFICIENT_ANSWER.to_string()
            }
        }
    }
}

fn clamp_options(options: AnswerOptions) -> AnswerOptions {
    if options.k == 0 {
        tracing::warn!("k must be positive, using 1");
    }
    if options.max_rounds == 0 {
        tracing::warn!("max_rounds must be positive, using 1");
    }
    AnswerOptions {
        k: options.k.max(1),
        max_rounds: options.max_rounds.max(1),
    }
}
