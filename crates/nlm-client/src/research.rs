//! Web and Drive research sessions: start, poll to completion, import.
//!
//! A poll lists every research task of a notebook as
//! `[task_id, [_, [query], mode, [sources, summary], status_code]]`.

use std::sync::Arc;

use async_trait::async_trait;
use nlm_wire::{RpcMethod, RpcPayload};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::clock::PollClock;
use crate::{
    NlmError, PollPolicyConfig, RpcTransport, TaskHandle, TaskKind, TaskPoller, TaskStatus,
    TaskStatusSource,
};

/// Status codes the remote uses for a finished research task; deep
/// research reports its own.
const COMPLETED_STATUS_CODES: &[u64] = &[2, 6];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchSource {
    Web,
    Drive,
}

impl ResearchSource {
    fn code(self) -> u8 {
        match self {
            Self::Web => 1,
            Self::Drive => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchMode {
    Fast,
    Deep,
}

impl ResearchMode {
    fn method(self) -> RpcMethod {
        match self {
            Self::Fast => RpcMethod::StartFastResearch,
            Self::Deep => RpcMethod::StartDeepResearch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredSource {
    pub url: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Snapshot of one research task.
pub struct ResearchReport {
    pub task_id: String,
    pub query: Option<String>,
    pub status_code: Option<u64>,
    pub sources: Vec<DiscoveredSource>,
    pub summary: Option<String>,
}

impl ResearchReport {
    pub fn is_completed(&self) -> bool {
        self.status_code
            .is_some_and(|code| COMPLETED_STATUS_CODES.contains(&code))
    }

    /// A completed report carries itself as the payload; anything else is
    /// still running, with the raw code and source count as progress.
    pub fn task_status(&self) -> TaskStatus {
        if self.is_completed() {
            return TaskStatus::Succeeded {
                payload: serde_json::to_value(self).unwrap_or(Value::Null),
            };
        }
        TaskStatus::Running {
            progress: Some(json!({
                "status_code": self.status_code,
                "sources": self.sources.len(),
            })),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedSource {
    pub id: String,
    pub title: Option<String>,
}

/// Parameters for starting research. Deep research only searches the web.
pub fn start_research_params(
    notebook_id: &str,
    query: &str,
    source: ResearchSource,
    mode: ResearchMode,
) -> Result<Value, NlmError> {
    if query.trim().is_empty() {
        return Err(NlmError::Encoding("research query must not be empty".to_string()));
    }
    match (mode, source) {
        (ResearchMode::Fast, _) => Ok(json!([[query, source.code()], null, 1, notebook_id])),
        (ResearchMode::Deep, ResearchSource::Web) => Ok(json!([
            null,
            [1],
            [query, source.code()],
            5,
            notebook_id
        ])),
        (ResearchMode::Deep, ResearchSource::Drive) => Err(NlmError::Encoding(
            "deep research only supports web sources".to_string(),
        )),
    }
}

/// Extracts the task handle from a start response `[task_id, report_id?]`.
pub fn parse_research_start(payload: &Value) -> Result<(TaskHandle, Option<String>), NlmError> {
    let task_id = payload
        .get(0)
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| NlmError::malformed("research start response carries no task id"))?;
    let report_id = payload.get(1).and_then(Value::as_str).map(str::to_string);
    Ok((TaskHandle::new(task_id, TaskKind::Research), report_id))
}

pub fn poll_research_params(notebook_id: &str) -> Value {
    json!([null, null, notebook_id])
}

/// Parses a poll payload into reports, newest first as the remote orders
/// them. Entries that are not task rows are skipped.
pub fn parse_research_poll(payload: &Value) -> Result<Vec<ResearchReport>, NlmError> {
    let entries = match payload {
        Value::Null => return Ok(Vec::new()),
        Value::Array(outer) => match outer.first() {
            Some(Value::Array(first)) if first.first().is_some_and(Value::is_array) => first,
            _ => outer,
        },
        _ => return Err(NlmError::malformed("research poll payload is not an array")),
    };
    Ok(entries.iter().filter_map(parse_research_entry).collect())
}

fn parse_research_entry(entry: &Value) -> Option<ResearchReport> {
    let task_id = entry.get(0)?.as_str()?;
    let info = entry.get(1)?.as_array()?;
    let query = info
        .get(1)
        .and_then(|query| query.get(0))
        .and_then(Value::as_str)
        .map(str::to_string);
    let results = info.get(3);
    let sources = results
        .and_then(|results| results.get(0))
        .and_then(Value::as_array)
        .map(|sources| sources.iter().filter_map(parse_discovered_source).collect())
        .unwrap_or_default();
    let summary = results
        .and_then(|results| results.get(1))
        .and_then(Value::as_str)
        .filter(|summary| !summary.is_empty())
        .map(str::to_string);
    Some(ResearchReport {
        task_id: task_id.to_string(),
        query,
        status_code: info.get(4).and_then(Value::as_u64),
        sources,
        summary,
    })
}

/// Fast research lists `[url, title, ...]`; deep research leaves the url
/// slot null and nests `[title, ...]` instead.
fn parse_discovered_source(source: &Value) -> Option<DiscoveredSource> {
    let url = source.get(0).and_then(Value::as_str).map(str::to_string);
    let title = match source.get(1)? {
        Value::String(title) => Some(title.clone()),
        Value::Array(nested) => nested.first().and_then(Value::as_str).map(str::to_string),
        _ => None,
    };
    if url.is_none() && title.is_none() {
        return None;
    }
    Some(DiscoveredSource { url, title })
}

/// Parameters for importing discovered sources. Sources without a URL
/// cannot be imported and are left out.
pub fn import_research_params(
    notebook_id: &str,
    task_id: &str,
    sources: &[DiscoveredSource],
) -> Value {
    let entries: Vec<Value> = sources
        .iter()
        .filter_map(|source| {
            let url = source.url.as_deref()?;
            let title = source.title.as_deref().unwrap_or(url);
            Some(json!([
                null, null, [url, title], null, null, null, null, null, null, null, 2
            ]))
        })
        .collect();
    json!([null, [1], task_id, notebook_id, entries])
}

/// Parses `[[[source_id], title, ...], ...]`, optionally wrapped once more.
pub fn parse_imported_sources(payload: &Value) -> Result<Vec<ImportedSource>, NlmError> {
    let entries = match payload {
        Value::Null => return Ok(Vec::new()),
        Value::Array(outer) => match outer.first() {
            Some(Value::Array(first))
                if first
                    .first()
                    .is_some_and(|cell| cell.get(0).is_some_and(Value::is_array)) =>
            {
                first
            }
            _ => outer,
        },
        _ => return Err(NlmError::malformed("import payload is not an array")),
    };
    Ok(entries
        .iter()
        .filter_map(|entry| {
            let id = entry.get(0)?.get(0)?.as_str()?;
            Some(ImportedSource {
                id: id.to_string(),
                title: entry.get(1).and_then(Value::as_str).map(str::to_string),
            })
        })
        .collect())
}

/// [`TaskStatusSource`] over a notebook's research poll.
pub struct ResearchStatusSource {
    transport: Arc<dyn RpcTransport>,
    notebook_id: String,
}

impl ResearchStatusSource {
    pub fn new(transport: Arc<dyn RpcTransport>, notebook_id: impl Into<String>) -> Self {
        Self {
            transport,
            notebook_id: notebook_id.into(),
        }
    }
}

#[async_trait]
impl TaskStatusSource for ResearchStatusSource {
    async fn poll_status(&self, handle: &TaskHandle) -> Result<TaskStatus, NlmError> {
        let payload = self
            .transport
            .call(
                RpcMethod::PollResearch.as_str(),
                poll_research_params(&self.notebook_id),
            )
            .await?;
        Ok(parse_research_poll(&payload)?
            .iter()
            .find(|report| report.task_id == handle.task_id)
            .map(ResearchReport::task_status)
            .unwrap_or(TaskStatus::Pending))
    }
}

/// Research operations for one notebook.
pub struct NotebookResearch {
    transport: Arc<dyn RpcTransport>,
    notebook_id: String,
    policy: PollPolicyConfig,
    poller: TaskPoller,
}

impl NotebookResearch {
    pub fn new(
        transport: Arc<dyn RpcTransport>,
        notebook_id: impl Into<String>,
        policy: PollPolicyConfig,
    ) -> Self {
        let notebook_id = notebook_id.into();
        let source = Arc::new(ResearchStatusSource::new(
            Arc::clone(&transport),
            notebook_id.clone(),
        ));
        let poller = TaskPoller::from_policy(source, &policy);
        Self {
            transport,
            notebook_id,
            policy,
            poller,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn PollClock>) -> Self {
        self.poller = self.poller.with_clock(clock);
        self
    }

    pub fn poller(&self) -> &TaskPoller {
        &self.poller
    }

    pub async fn start(
        &self,
        query: &str,
        source: ResearchSource,
        mode: ResearchMode,
    ) -> Result<TaskHandle, NlmError> {
        let params = start_research_params(&self.notebook_id, query, source, mode)?;
        let payload = self
            .transport
            .call_allow_null(mode.method().as_str(), params)
            .await?;
        let RpcPayload::Value(payload) = payload else {
            return Err(NlmError::malformed("research did not start"));
        };
        let (handle, report_id) = parse_research_start(&payload)?;
        tracing::debug!(
            notebook_id = %self.notebook_id,
            task_id = %handle.task_id,
            report_id = report_id.as_deref().unwrap_or(""),
            mode = ?mode,
            "research started"
        );
        Ok(handle)
    }

    /// Every research task the notebook currently reports.
    pub async fn poll(&self) -> Result<Vec<ResearchReport>, NlmError> {
        let payload = self
            .transport
            .call(
                RpcMethod::PollResearch.as_str(),
                poll_research_params(&self.notebook_id),
            )
            .await?;
        parse_research_poll(&payload)
    }

    /// Waits for `handle` with the configured schedule and deadline.
    pub async fn wait(&self, handle: &TaskHandle) -> Result<ResearchReport, NlmError> {
        let status = self
            .poller
            .wait_for_success(handle, &self.policy.schedule(), self.policy.deadline())
            .await?;
        match status {
            TaskStatus::Succeeded { payload } => serde_json::from_value(payload).map_err(|error| {
                NlmError::malformed(format!("research report did not round-trip: {error}"))
            }),
            other => Err(NlmError::malformed(format!(
                "research task '{}' ended in non-terminal status {other}",
                handle.task_id
            ))),
        }
    }

    pub async fn import_sources(
        &self,
        handle: &TaskHandle,
        sources: &[DiscoveredSource],
    ) -> Result<Vec<ImportedSource>, NlmError> {
        let payload = self
            .transport
            .call(
                RpcMethod::ImportResearch.as_str(),
                import_research_params(&self.notebook_id, &handle.task_id, sources),
            )
            .await?;
        let imported = parse_imported_sources(&payload)?;
        tracing::debug!(
            notebook_id = %self.notebook_id,
            task_id = %handle.task_id,
            imported = imported.len(),
            "research sources imported"
        );
        Ok(imported)
    }
}
