//! Request orchestration: retrieve, prompt, generate, post-process.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::RetrievalConfig;
use crate::error::PipelineError;
use crate::legal::audit::AuditLog;
use crate::legal::conflicts::{ConflictRecord, find_client_matters, parse_conflict_records};
use crate::legal::dataset::{MatterDataset, MatterRecord};
use crate::legal::prompt::{
    ContextLimits, build_conflict_messages, build_recommendation_messages,
};
use crate::legal::response::dedupe_lines;
use crate::legal::retrieval::{MatterRetriever, Retrieval};
use crate::llm::LlmClient;

/// Every matter handled by one candidate attorney.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttorneyMatters {
    pub attorney: String,
    pub matters: Vec<MatterRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub request_id: Uuid,
    pub query: String,
    pub reduced_query: String,
    pub used_fallback: bool,
    pub candidates: Vec<MatterRecord>,
    /// Model output, one deduplicated non-blank line per entry.
    pub reasoning: Vec<String>,
    pub attorney_matters: Vec<AttorneyMatters>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictReport {
    pub request_id: Uuid,
    pub client_name: String,
    pub matches: Vec<MatterRecord>,
    pub conflicts: Vec<ConflictRecord>,
}

/// Owns the dataset, its index and the model client.
pub struct Advisor {
    dataset: Arc<MatterDataset>,
    retriever: MatterRetriever,
    llm: Arc<dyn LlmClient>,
    limits: ContextLimits,
    top_k: usize,
    audit: Option<AuditLog>,
}

impl std::fmt::Debug for Advisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Advisor")
            .field("rows", &self.dataset.len())
            .field("model", &self.llm.model_name())
            .field("limits", &self.limits)
            .field("top_k", &self.top_k)
            .field("audit", &self.audit.as_ref().map(|a| a.path()))
            .finish()
    }
}

fn error_kind(err: &PipelineError) -> &'static str {
    match err {
        PipelineError::EmptyQuery => "empty_query",
        PipelineError::DataLoad(_) => "data_load",
        PipelineError::Llm(e) => e.kind(),
        PipelineError::Render(_) => "render",
    }
}

impl Advisor {
    pub fn new(
        retrieval: &RetrievalConfig,
        dataset: Arc<MatterDataset>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        let started = Instant::now();
        let retriever = MatterRetriever::build(Arc::clone(&dataset), retrieval.query_tail_tokens);
        tracing::info!(
            rows = dataset.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Built matter index"
        );
        Self {
            dataset,
            retriever,
            llm,
            limits: ContextLimits::from(retrieval),
            top_k: retrieval.top_k,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Option<AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    pub fn dataset(&self) -> &MatterDataset {
        &self.dataset
    }

    pub fn audit(&self) -> Option<&AuditLog> {
        self.audit.as_ref()
    }

    /// Retrieval only; the model is not called.
    pub fn retrieve_only(&self, query: &str) -> Result<Retrieval, PipelineError> {
        if query.trim().is_empty() {
            return Err(PipelineError::EmptyQuery);
        }
        Ok(self.retriever.retrieve(query, self.top_k))
    }

    /// Every row handled by `attorney`, in dataset order.
    pub fn matters_for(&self, attorney: &str) -> AttorneyMatters {
        let attorney = attorney.trim();
        AttorneyMatters {
            attorney: attorney.to_string(),
            matters: self
                .dataset
                .matters_for_attorney(attorney)
                .into_iter()
                .cloned()
                .collect(),
        }
    }

    pub async fn recommend(&self, query: &str) -> Result<Recommendation, PipelineError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("recommend", %request_id);
        let started = Instant::now();
        let result = self
            .run_recommendation(request_id, query)
            .instrument(span.clone())
            .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        span.in_scope(|| match &result {
            Ok(rec) => {
                tracing::info!(
                    candidates = rec.candidates.len(),
                    used_fallback = rec.used_fallback,
                    elapsed_ms,
                    "Recommendation completed"
                );
                self.audit_event(
                    "recommendation_completed",
                    serde_json::json!({
                        "request_id": request_id,
                        "workflow": "recommend",
                        "candidates": rec.candidates.len(),
                        "reasoning_lines": rec.reasoning.len(),
                        "used_fallback": rec.used_fallback,
                        "elapsed_ms": elapsed_ms,
                        "outcome": "ok",
                    }),
                );
            }
            Err(err) => self.audit_failure(
                "recommendation_failed",
                request_id,
                "recommend",
                err,
                elapsed_ms,
            ),
        });
        result
    }

    async fn run_recommendation(
        &self,
        request_id: Uuid,
        query: &str,
    ) -> Result<Recommendation, PipelineError> {
        if let Some(audit) = &self.audit {
            audit.inc_request();
        }
        if query.trim().is_empty() {
            return Err(PipelineError::EmptyQuery);
        }

        let retrieval = self.retriever.retrieve(query, self.top_k);
        let messages = build_recommendation_messages(&retrieval.records, self.limits);
        if let Some(audit) = &self.audit {
            audit.inc_model_call();
        }
        let text = self.llm.generate(&messages).await?;
        let reasoning = dedupe_lines(&text);
        let attorney_matters = self.listings_for(&retrieval.records);

        Ok(Recommendation {
            request_id,
            query: query.to_string(),
            reduced_query: retrieval.reduced_query,
            used_fallback: retrieval.used_fallback,
            candidates: retrieval.records,
            reasoning,
            attorney_matters,
        })
    }

    fn listings_for(&self, candidates: &[MatterRecord]) -> Vec<AttorneyMatters> {
        candidates
            .iter()
            .filter_map(|record| record.attorney.as_deref())
            .map(|attorney| self.matters_for(attorney))
            .collect()
    }

    pub async fn conflict_check(
        &self,
        client_name: &str,
    ) -> Result<ConflictReport, PipelineError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("conflict_check", %request_id);
        let started = Instant::now();
        let result = self
            .run_conflict_check(request_id, client_name)
            .instrument(span.clone())
            .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        span.in_scope(|| match &result {
            Ok(report) => {
                tracing::info!(
                    matches = report.matches.len(),
                    conflicts = report.conflicts.len(),
                    elapsed_ms,
                    "Conflict check completed"
                );
                self.audit_event(
                    "conflict_check_completed",
                    serde_json::json!({
                        "request_id": request_id,
                        "workflow": "conflict_check",
                        "matched_rows": report.matches.len(),
                        "conflicts": report.conflicts.len(),
                        "elapsed_ms": elapsed_ms,
                        "outcome": "ok",
                    }),
                );
            }
            Err(err) => self.audit_failure(
                "conflict_check_failed",
                request_id,
                "conflict_check",
                err,
                elapsed_ms,
            ),
        });
        result
    }

    async fn run_conflict_check(
        &self,
        request_id: Uuid,
        client_name: &str,
    ) -> Result<ConflictReport, PipelineError> {
        if let Some(audit) = &self.audit {
            audit.inc_request();
        }
        let client_name = client_name.trim();
        if client_name.is_empty() {
            return Err(PipelineError::EmptyQuery);
        }

        let matches = find_client_matters(&self.dataset, client_name);
        if matches.is_empty() {
            tracing::info!("No matters mention the client; skipping model call");
            return Ok(ConflictReport {
                request_id,
                client_name: client_name.to_string(),
                matches: Vec::new(),
                conflicts: Vec::new(),
            });
        }

        let messages = build_conflict_messages(client_name, &matches, self.limits);
        if let Some(audit) = &self.audit {
            audit.inc_model_call();
        }
        let text = self.llm.generate(&messages).await?;
        let conflicts = parse_conflict_records(&text);
        if conflicts.is_empty() {
            tracing::warn!("Model answer contained no conflict records");
        }

        Ok(ConflictReport {
            request_id,
            client_name: client_name.to_string(),
            matches: matches.into_iter().cloned().collect(),
            conflicts,
        })
    }

    fn audit_event(&self, event_type: &str, details: serde_json::Value) {
        if let Some(audit) = &self.audit {
            audit.record(event_type, details);
        }
    }

    fn audit_failure(
        &self,
        event_type: &str,
        request_id: Uuid,
        workflow: &'static str,
        err: &PipelineError,
        elapsed_ms: u64,
    ) {
        let kind = error_kind(err);
        tracing::warn!(error_kind = kind, elapsed_ms, "{} failed: {}", workflow, err);
        if let Some(audit) = &self.audit {
            audit.inc_failure();
            audit.record(
                event_type,
                serde_json::json!({
                    "request_id": request_id,
                    "workflow": workflow,
                    "elapsed_ms": elapsed_ms,
                    "outcome": "error",
                    "error_kind": kind,
                }),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::Advisor;
    use crate::config::RetrievalConfig;
    use crate::error::{LlmError, PipelineError};
    use crate::legal::audit::AuditLog;
    use crate::legal::dataset::{MatterDataset, MatterRecord};
    use crate::llm::{ChatMessage, LlmClient};

    struct ScriptedLlm {
        reply: Result<String, fn() -> LlmError>,
        calls: AtomicUsize,
        last_prompt: Mutex<Option<String>>,
    }

    impl ScriptedLlm {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
            })
        }

        fn failing(err: fn() -> LlmError) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(err),
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut last) = self.last_prompt.lock() {
                *last = messages.last().map(|m| m.content.clone());
            }
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    fn row(attorney: &str, area: &str, client: &str, description: &str) -> MatterRecord {
        MatterRecord {
            attorney: Some(attorney.to_string()),
            practice_area: Some(area.to_string()),
            matter_description: Some(description.to_string()),
            client_name: Some(client.to_string()),
            matter: Some(format!("{client} matter")),
            ..Default::default()
        }
    }

    fn dataset() -> Arc<MatterDataset> {
        Arc::new(MatterDataset::from_records(vec![
            row("Ann Lee", "Tax", "Acme Co", "federal tax controversy"),
            row("Bo Kim", "Corporate", "Beta LLC", "merger advisory"),
            row("Ann Lee", "Tax", "Gamma Inc", "state tax appeal"),
            row("Cy Day", "Tax", "Delta", "tax planning for founders"),
        ]))
    }

    fn advisor(llm: Arc<ScriptedLlm>) -> Advisor {
        Advisor::new(&RetrievalConfig::default(), dataset(), llm)
    }

    #[tokio::test]
    async fn recommend_dedupes_reasoning_and_lists_matters() {
        let llm = ScriptedLlm::ok("Ann Lee is best.\n\nAnn Lee is best.\nCy Day could assist.");
        let advisor = advisor(Arc::clone(&llm));

        let rec = advisor
            .recommend("who handles tax controversy")
            .await
            .expect("recommendation");

        assert_eq!(rec.reasoning, vec!["Ann Lee is best.", "Cy Day could assist."]);
        assert!(!rec.used_fallback);
        assert_eq!(rec.candidates[0].attorney.as_deref(), Some("Ann Lee"));
        let ann = &rec.attorney_matters[0];
        assert_eq!(ann.attorney, "Ann Lee");
        assert_eq!(ann.matters.len(), 2);
        assert_eq!(llm.calls(), 1);

        let prompt = llm.last_prompt.lock().expect("lock").clone().expect("prompt");
        assert!(prompt.contains("federal tax controversy"));
    }

    #[tokio::test]
    async fn blank_query_is_rejected_before_any_call() {
        let llm = ScriptedLlm::ok("unused");
        let advisor = advisor(Arc::clone(&llm));

        let err = advisor.recommend("   ").await.expect_err("blank query");
        assert!(matches!(err, PipelineError::EmptyQuery));
        let err = advisor.conflict_check("").await.expect_err("blank name");
        assert!(matches!(err, PipelineError::EmptyQuery));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn model_failure_aborts_without_partial_output() {
        let llm = ScriptedLlm::failing(|| LlmError::Timeout {
            timeout: Duration::from_secs(30),
        });
        let advisor = advisor(llm);

        let err = advisor.recommend("tax lawyer").await.expect_err("timeout");
        assert!(matches!(err, PipelineError::Llm(LlmError::Timeout { .. })));
    }

    #[tokio::test]
    async fn conflict_check_parses_findings() {
        let llm = ScriptedLlm::ok(
            "Client: Acme Co\nConflict Type: Prior Work\nDetails: Tax controversy matter",
        );
        let advisor = advisor(Arc::clone(&llm));

        let report = advisor.conflict_check(" acme co ").await.expect("report");
        assert_eq!(report.client_name, "acme co");
        assert_eq!(report.matches.len(), 1);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].conflict_type, "Prior Work");
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn conflict_check_without_matches_skips_the_model() {
        let llm = ScriptedLlm::ok("Client: Someone\nConflict Type: Prior Work\nDetails: x");
        let advisor = advisor(Arc::clone(&llm));

        let report = advisor.conflict_check("Omega Holdings").await.expect("report");
        assert!(report.matches.is_empty());
        assert!(report.conflicts.is_empty());
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn unparseable_conflict_answer_is_an_empty_list() {
        let llm = ScriptedLlm::ok("I could not find anything relevant.");
        let advisor = advisor(llm);

        let report = advisor.conflict_check("Beta").await.expect("report");
        assert_eq!(report.matches.len(), 1);
        assert!(report.conflicts.is_empty());
    }

    #[test]
    fn retrieve_only_and_matters_for_do_not_need_the_model() {
        let llm = ScriptedLlm::failing(|| LlmError::MalformedResponse {
            reason: "never called".to_string(),
        });
        let advisor = advisor(Arc::clone(&llm));

        let retrieval = advisor.retrieve_only("merger advisory").expect("retrieval");
        assert_eq!(retrieval.records[0].attorney.as_deref(), Some("Bo Kim"));
        assert!(matches!(
            advisor.retrieve_only(" "),
            Err(PipelineError::EmptyQuery)
        ));

        let listing = advisor.matters_for(" Ann Lee ");
        assert_eq!(listing.matters.len(), 2);
        assert!(advisor.matters_for("Nobody").matters.is_empty());
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn audit_events_carry_metadata_but_never_query_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("audit.jsonl");
        let llm = ScriptedLlm::ok("Ann Lee.");
        let advisor = advisor(llm).with_audit(Some(AuditLog::at_path(path.clone(), true)));

        advisor
            .recommend("confidential zebra tax question")
            .await
            .expect("recommendation");
        advisor.recommend(" ").await.expect_err("blank");

        let raw = std::fs::read_to_string(&path).expect("read audit");
        assert!(!raw.contains("zebra"));
        let events: Vec<serde_json::Value> = raw
            .lines()
            .map(|line| serde_json::from_str(line).expect("json"))
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["event_type"], "recommendation_completed");
        assert_eq!(events[0]["details"]["outcome"], "ok");
        assert!(events[0]["details"]["request_id"].is_string());
        assert_eq!(events[1]["event_type"], "recommendation_failed");
        assert_eq!(events[1]["details"]["error_kind"], "empty_query");
        assert_eq!(events[1]["prev_hash"], events[0]["hash"]);

        let metrics = advisor.audit().expect("audit").metrics();
        assert_eq!(metrics.requests, 2);
        assert_eq!(metrics.model_calls, 1);
        assert_eq!(metrics.failures, 1);
    }
}
