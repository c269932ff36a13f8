//! Projection of artifact rows onto task status, and the artifact facade.
//!
//! Rows arrive positionally:
//! `[id, title, type_code, _, status_code, _, audio_meta, _, video_meta, infographic_meta, ...]`.
//! Each row is validated once into an [`ArtifactRecord`]; everything after
//! that reads named accessors.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use nlm_wire::{RpcMethod, RpcPayload};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::clock::PollClock;
use crate::download::{save_media, MediaFetcher};
use crate::{
    NlmError, PollPolicyConfig, RpcTransport, TaskHandle, TaskKind, TaskPoller, TaskStatus,
    TaskStatusSource,
};

const SUGGESTED_FILTER: &str = "NOT artifact.status = \"ARTIFACT_STATUS_SUGGESTED\"";

const ROW_ID: usize = 0;
const ROW_TITLE: usize = 1;
const ROW_TYPE: usize = 2;
const ROW_STATUS: usize = 4;
const ROW_AUDIO_META: usize = 6;
const ROW_VIDEO_META: usize = 8;
const ROW_INFOGRAPHIC_META: usize = 9;
const ROW_SLIDE_DECK_META: usize = 16;
const SLIDE_DECK_PDF_URL: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Audio,
    Report,
    Video,
    /// Quizzes and flashcards share a type code.
    Quiz,
    MindMap,
    Infographic,
    SlideDeck,
    DataTable,
    Unknown(u32),
}

impl ArtifactKind {
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Audio,
            2 => Self::Report,
            3 => Self::Video,
            4 => Self::Quiz,
            5 => Self::MindMap,
            7 => Self::Infographic,
            8 => Self::SlideDeck,
            9 => Self::DataTable,
            other => Self::Unknown(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Self::Audio => 1,
            Self::Report => 2,
            Self::Video => 3,
            Self::Quiz => 4,
            Self::MindMap => 5,
            Self::Infographic => 7,
            Self::SlideDeck => 8,
            Self::DataTable => 9,
            Self::Unknown(code) => code,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => f.write_str("audio"),
            Self::Report => f.write_str("report"),
            Self::Video => f.write_str("video"),
            Self::Quiz => f.write_str("quiz"),
            Self::MindMap => f.write_str("mind_map"),
            Self::Infographic => f.write_str("infographic"),
            Self::SlideDeck => f.write_str("slide_deck"),
            Self::DataTable => f.write_str("data_table"),
            Self::Unknown(code) => write!(f, "unknown({code})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactStatusCode {
    InProgress,
    Pending,
    Completed,
    Failed,
    Unknown(u32),
}

impl ArtifactStatusCode {
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Self::InProgress,
            2 => Self::Pending,
            3 => Self::Completed,
            4 => Self::Failed,
            other => Self::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactRecord {
    id: String,
    title: Option<String>,
    kind: ArtifactKind,
    status_code: Option<u32>,
    row: Value,
}

impl ArtifactRecord {
    pub fn from_row(row: &Value) -> Result<Self, NlmError> {
        let cells = row
            .as_array()
            .ok_or_else(|| NlmError::malformed("artifact row is not an array"))?;
        let id = cells
            .get(ROW_ID)
            .and_then(Value::as_str)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| NlmError::malformed("artifact row has no id"))?;
        let kind = cells
            .get(ROW_TYPE)
            .and_then(Value::as_u64)
            .and_then(|code| u32::try_from(code).ok())
            .map(ArtifactKind::from_code)
            .ok_or_else(|| NlmError::malformed(format!("artifact '{id}' has no type code")))?;
        let status_code = match cells.get(ROW_STATUS) {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                value
                    .as_u64()
                    .and_then(|code| u32::try_from(code).ok())
                    .ok_or_else(|| {
                        NlmError::malformed(format!("artifact '{id}' has a non-numeric status"))
                    })?,
            ),
        };
        Ok(Self {
            id: id.to_string(),
            title: cells
                .get(ROW_TITLE)
                .and_then(Value::as_str)
                .map(str::to_string),
            kind,
            status_code,
            row: row.clone(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn status_code(&self) -> Option<u32> {
        self.status_code
    }

    pub fn row(&self) -> &Value {
        &self.row
    }

    pub fn is_completed(&self) -> bool {
        self.status_code.map(ArtifactStatusCode::from_code) == Some(ArtifactStatusCode::Completed)
    }

    /// Maps the status code onto the task lifecycle.
    ///
    /// Unknown codes are reported as `Running` with the raw code as
    /// progress; a missing code is `Pending`.
    pub fn task_status(&self) -> TaskStatus {
        let Some(code) = self.status_code else {
            return TaskStatus::Pending;
        };
        match ArtifactStatusCode::from_code(code) {
            ArtifactStatusCode::InProgress => TaskStatus::running(),
            ArtifactStatusCode::Pending => TaskStatus::Pending,
            ArtifactStatusCode::Completed => TaskStatus::Succeeded {
                payload: self.row.clone(),
            },
            ArtifactStatusCode::Failed => TaskStatus::Failed {
                reason: format!("artifact '{}' ({}) failed to generate", self.id, self.kind),
            },
            ArtifactStatusCode::Unknown(code) => TaskStatus::Running {
                progress: Some(json!({ "status_code": code })),
            },
        }
    }

    /// Download URL for media artifacts, when the row carries one.
    pub fn media_url(&self) -> Option<String> {
        match self.kind {
            ArtifactKind::Audio => {
                let entries = self.row.get(ROW_AUDIO_META)?.get(5)?.as_array()?;
                preferred_media_url(entries.iter(), "audio/mp4")
            }
            ArtifactKind::Video => {
                let groups = self.row.get(ROW_VIDEO_META)?.as_array()?;
                let entries = groups
                    .iter()
                    .filter_map(Value::as_array)
                    .flat_map(|group| group.iter());
                preferred_media_url(entries, "video/mp4")
            }
            ArtifactKind::Infographic => self
                .row
                .get(ROW_INFOGRAPHIC_META)?
                .get(2)?
                .as_array()?
                .iter()
                .find_map(|entry| entry.get(1)?.get(0)?.as_str())
                .filter(|url| is_http_url(url))
                .map(str::to_string),
            ArtifactKind::SlideDeck => self
                .row
                .get(ROW_SLIDE_DECK_META)?
                .get(SLIDE_DECK_PDF_URL)?
                .as_str()
                .filter(|url| is_http_url(url))
                .map(str::to_string),
            _ => None,
        }
    }
}

fn preferred_media_url<'a>(entries: impl Iterator<Item = &'a Value>, mime: &str) -> Option<String> {
    let mut fallback = None;
    for entry in entries {
        let Some(url) = entry.get(0).and_then(Value::as_str).filter(|url| is_http_url(url)) else {
            continue;
        };
        if entry.get(2).and_then(Value::as_str) == Some(mime) {
            return Some(url.to_string());
        }
        fallback.get_or_insert_with(|| url.to_string());
    }
    fallback
}

fn is_http_url(raw: &str) -> bool {
    url::Url::parse(raw)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Result of a mind-map generation: the map itself and the note it was
/// saved to. Both are absent when the remote produced nothing.
pub struct MindMapResult {
    pub mind_map: Option<Value>,
    pub note_id: Option<String>,
}

/// Parameters for generating a mind map over `source_ids`.
pub fn mind_map_params(source_ids: &[&str]) -> Value {
    let sources: Vec<Value> = source_ids.iter().map(|id| json!([[id]])).collect();
    json!([
        sources,
        null,
        null,
        null,
        null,
        ["interactive_mindmap", [["[CONTEXT]", ""]], ""],
        null,
        [2, null, [1]]
    ])
}

/// Parses `[[map, _, [note_id]]]`, where the map is either an embedded
/// JSON string or an inline object.
pub fn parse_mind_map_result(payload: &Value) -> Result<MindMapResult, NlmError> {
    let Some(entry) = payload.get(0).filter(|entry| !entry.is_null()) else {
        return Ok(MindMapResult::default());
    };
    let mind_map = match entry.get(0) {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) => Some(serde_json::from_str(raw).map_err(|error| {
            NlmError::malformed(format!("mind map is not valid JSON: {error}"))
        })?),
        Some(inline) => Some(inline.clone()),
    };
    let note_id = entry
        .get(2)
        .and_then(|note| note.get(0))
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(MindMapResult { mind_map, note_id })
}

/// Parameters for listing a notebook's artifacts, suggestions excluded.
pub fn list_artifacts_params(notebook_id: &str) -> Value {
    json!([[2], notebook_id, SUGGESTED_FILTER])
}

/// Parses a list payload: either `[[row, ...]]` or a bare `[row, ...]`.
pub fn parse_artifact_list(payload: &Value) -> Result<Vec<ArtifactRecord>, NlmError> {
    let rows = match payload {
        Value::Null => return Ok(Vec::new()),
        Value::Array(outer) => match outer.first() {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Array(first)) if first.first().is_some_and(Value::is_string) => outer,
            Some(Value::Array(rows)) => rows,
            Some(_) => return Err(NlmError::malformed("artifact list is not a list of rows")),
        },
        _ => return Err(NlmError::malformed("artifact list payload is not an array")),
    };
    rows.iter().map(ArtifactRecord::from_row).collect()
}

/// Extracts the new artifact's handle from a generation response.
pub fn task_handle_from_generation(
    payload: &Value,
    kind: ArtifactKind,
) -> Result<TaskHandle, NlmError> {
    let artifact_id = payload
        .get(0)
        .and_then(|entry| entry.get(0))
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| NlmError::malformed("generation response carries no artifact id"))?;
    Ok(TaskHandle::new(artifact_id, TaskKind::Artifact(kind)))
}

/// [`TaskStatusSource`] that re-lists a notebook's artifacts on each poll.
pub struct ArtifactStatusSource {
    transport: Arc<dyn RpcTransport>,
    notebook_id: String,
}

impl ArtifactStatusSource {
    pub fn new(transport: Arc<dyn RpcTransport>, notebook_id: impl Into<String>) -> Self {
        Self {
            transport,
            notebook_id: notebook_id.into(),
        }
    }
}

#[async_trait]
impl TaskStatusSource for ArtifactStatusSource {
    async fn poll_status(&self, handle: &TaskHandle) -> Result<TaskStatus, NlmError> {
        let payload = self
            .transport
            .call(
                RpcMethod::ListArtifacts.as_str(),
                list_artifacts_params(&self.notebook_id),
            )
            .await?;
        let records = parse_artifact_list(&payload)?;
        Ok(records
            .iter()
            .find(|record| record.id() == handle.task_id)
            .map(ArtifactRecord::task_status)
            .unwrap_or(TaskStatus::Pending))
    }
}

/// Artifact operations for one notebook.
pub struct NotebookArtifacts {
    transport: Arc<dyn RpcTransport>,
    notebook_id: String,
    policy: PollPolicyConfig,
    poller: TaskPoller,
}

impl NotebookArtifacts {
    pub fn new(
        transport: Arc<dyn RpcTransport>,
        notebook_id: impl Into<String>,
        policy: PollPolicyConfig,
    ) -> Self {
        let notebook_id = notebook_id.into();
        let source = Arc::new(ArtifactStatusSource::new(
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

    pub fn notebook_id(&self) -> &str {
        &self.notebook_id
    }

    pub fn poller(&self) -> &TaskPoller {
        &self.poller
    }

    pub async fn list(&self) -> Result<Vec<ArtifactRecord>, NlmError> {
        let payload = self
            .transport
            .call(
                RpcMethod::ListArtifacts.as_str(),
                list_artifacts_params(&self.notebook_id),
            )
            .await?;
        parse_artifact_list(&payload)
    }

    pub async fn find(&self, artifact_id: &str) -> Result<Option<ArtifactRecord>, NlmError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|record| record.id() == artifact_id))
    }

    /// Picks a completed artifact of `kind`: the one named `artifact_id`, or
    /// the first listed.
    pub async fn completed(
        &self,
        kind: ArtifactKind,
        artifact_id: Option<&str>,
    ) -> Result<ArtifactRecord, NlmError> {
        let records = self.list().await?;
        select_completed(records, kind, artifact_id, &self.notebook_id)
    }

    /// Downloads a completed media artifact to `destination`.
    pub async fn download(
        &self,
        fetcher: &dyn MediaFetcher,
        kind: ArtifactKind,
        artifact_id: Option<&str>,
        destination: &Path,
    ) -> Result<PathBuf, NlmError> {
        let record = self.completed(kind, artifact_id).await?;
        let url = record.media_url().ok_or_else(|| {
            NlmError::malformed(format!(
                "{kind} artifact '{}' carries no download URL",
                record.id()
            ))
        })?;
        tracing::debug!(
            notebook_id = %self.notebook_id,
            artifact_id = record.id(),
            kind = %kind,
            "downloading artifact"
        );
        save_media(fetcher, &url, destination).await
    }

    /// Generates a mind map; it completes synchronously, no polling.
    pub async fn generate_mind_map(&self, source_ids: &[&str]) -> Result<MindMapResult, NlmError> {
        match self
            .transport
            .call_allow_null(RpcMethod::GenerateMindMap.as_str(), mind_map_params(source_ids))
            .await?
        {
            RpcPayload::Value(payload) => parse_mind_map_result(&payload),
            RpcPayload::NoResult => Ok(MindMapResult::default()),
        }
    }

    /// Starts generation with caller-built parameters.
    pub async fn generate(
        &self,
        kind: ArtifactKind,
        params: Value,
    ) -> Result<TaskHandle, NlmError> {
        let payload = self
            .transport
            .call_allow_null(RpcMethod::CreateArtifact.as_str(), params)
            .await?;
        let RpcPayload::Value(payload) = payload else {
            return Err(NlmError::malformed(
                "generation returned no result; the request was likely rate limited",
            ));
        };
        let handle = task_handle_from_generation(&payload, kind)?;
        tracing::debug!(
            notebook_id = %self.notebook_id,
            task_id = %handle.task_id,
            kind = %kind,
            "artifact generation started"
        );
        Ok(handle)
    }

    /// Waits with the configured schedule and deadline; `Failed` is an error.
    pub async fn wait(&self, handle: &TaskHandle) -> Result<TaskStatus, NlmError> {
        self.poller
            .wait_for_success(handle, &self.policy.schedule(), self.policy.deadline())
            .await
    }

    pub async fn generate_and_wait(
        &self,
        kind: ArtifactKind,
        params: Value,
    ) -> Result<ArtifactRecord, NlmError> {
        let handle = self.generate(kind, params).await?;
        match self.wait(&handle).await? {
            TaskStatus::Succeeded { payload } => ArtifactRecord::from_row(&payload),
            other => Err(NlmError::malformed(format!(
                "task '{}' ended in non-terminal status {other}",
                handle.task_id
            ))),
        }
    }
}

fn select_completed(
    records: Vec<ArtifactRecord>,
    kind: ArtifactKind,
    artifact_id: Option<&str>,
    notebook_id: &str,
) -> Result<ArtifactRecord, NlmError> {
    let mut candidates = records
        .into_iter()
        .filter(|record| record.kind() == kind && record.is_completed());
    match artifact_id {
        Some(id) => candidates
            .find(|record| record.id() == id)
            .ok_or_else(|| NlmError::NotFound(format!("{kind} artifact '{id}' not found"))),
        None => candidates.next().ok_or_else(|| {
            NlmError::NotFound(format!(
                "no completed {kind} artifact in notebook '{notebook_id}'"
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        list_artifacts_params, mind_map_params, parse_artifact_list, parse_mind_map_result,
        select_completed, task_handle_from_generation, ArtifactKind, ArtifactRecord,
        MindMapResult,
    };
    use crate::{NlmError, TaskKind, TaskStatus};

    #[test]
    fn unit_kind_codes_round_trip() {
        for code in [1, 2, 3, 4, 5, 7, 8, 9, 6, 42] {
            assert_eq!(ArtifactKind::from_code(code).code(), code);
        }
        assert_eq!(ArtifactKind::from_code(6), ArtifactKind::Unknown(6));
        assert_eq!(ArtifactKind::MindMap.to_string(), "mind_map");
    }

    #[test]
    fn unit_status_codes_map_onto_lifecycle() {
        let status_of = |code: serde_json::Value| {
            ArtifactRecord::from_row(&json!(["a", "t", 1, null, code]))
                .expect("row")
                .task_status()
        };
        assert_eq!(status_of(json!(1)), TaskStatus::running());
        assert_eq!(status_of(json!(2)), TaskStatus::Pending);
        assert!(matches!(status_of(json!(3)), TaskStatus::Succeeded { .. }));
        assert!(matches!(status_of(json!(4)), TaskStatus::Failed { .. }));
        assert_eq!(status_of(json!(null)), TaskStatus::Pending);
        assert_eq!(
            status_of(json!(9)),
            TaskStatus::Running {
                progress: Some(json!({"status_code": 9}))
            }
        );
    }

    #[test]
    fn regression_malformed_rows_are_protocol_errors() {
        for row in [
            json!("not a row"),
            json!([null, "t", 1]),
            json!(["id", "t"]),
            json!(["id", "t", 1, null, "done"]),
        ] {
            let error = ArtifactRecord::from_row(&row).expect_err("malformed");
            assert!(matches!(error, NlmError::Protocol(_)), "{row}");
        }
    }

    #[test]
    fn audio_url_prefers_mp4() {
        let record = ArtifactRecord::from_row(&json!([
            "audio_001",
            "Audio Title",
            1,
            null,
            3,
            null,
            [null, null, null, null, null, [
                ["https://example.com/audio.webm", null, "audio/webm"],
                ["https://example.com/audio.mp4", null, "audio/mp4"]
            ]]
        ]))
        .expect("row");
        assert!(record.is_completed());
        assert_eq!(
            record.media_url().as_deref(),
            Some("https://example.com/audio.mp4")
        );
    }

    #[test]
    fn video_and_infographic_urls_follow_their_layouts() {
        let video = ArtifactRecord::from_row(&json!([
            "video_001", "Video", 3, null, 3, null, null, null,
            [[["https://example.com/video.mp4", 4, "video/mp4"]]]
        ]))
        .expect("video");
        assert_eq!(
            video.media_url().as_deref(),
            Some("https://example.com/video.mp4")
        );

        let infographic = ArtifactRecord::from_row(&json!([
            "info_001", "Info", 7, null, 3, null, null, null, null,
            [[], [], [[null, ["https://example.com/infographic.png"]]]]
        ]))
        .expect("infographic");
        assert_eq!(
            infographic.media_url().as_deref(),
            Some("https://example.com/infographic.png")
        );
    }

    #[test]
    fn slide_deck_url_comes_from_pdf_slot() {
        let mut row = vec![json!(null); 17];
        row[0] = json!("slides_001");
        row[2] = json!(8);
        row[4] = json!(3);
        row[16] = json!([null, "Deck", [], "https://example.com/deck.pdf"]);
        let record = ArtifactRecord::from_row(&json!(row)).expect("slides");
        assert_eq!(record.kind(), ArtifactKind::SlideDeck);
        assert_eq!(
            record.media_url().as_deref(),
            Some("https://example.com/deck.pdf")
        );

        let short = ArtifactRecord::from_row(&json!([
            "slides_002", "Slides", 8, null, 3, null, null, null, null, []
        ]))
        .expect("short row");
        assert_eq!(short.media_url(), None);
    }

    #[test]
    fn completed_selection_reports_what_is_missing() {
        let records = || {
            parse_artifact_list(&json!([[
                ["audio_pending", "A", 1, null, 1],
                ["audio_done", "B", 1, null, 3],
                ["video_done", "V", 3, null, 3]
            ]]))
            .expect("rows")
        };

        let first = select_completed(records(), ArtifactKind::Audio, None, "nb_1").expect("audio");
        assert_eq!(first.id(), "audio_done");

        let error = select_completed(records(), ArtifactKind::Audio, Some("audio_pending"), "nb_1")
            .expect_err("pending is not completed");
        assert_eq!(
            error,
            NlmError::NotFound("audio artifact 'audio_pending' not found".to_string())
        );

        let error = select_completed(records(), ArtifactKind::SlideDeck, None, "nb_1")
            .expect_err("no slides");
        assert_eq!(
            error,
            NlmError::NotFound("no completed slide_deck artifact in notebook 'nb_1'".to_string())
        );
    }

    #[test]
    fn mind_map_payload_accepts_string_or_object() {
        let from_string = parse_mind_map_result(&json!([[
            "{\"nodes\": [{\"id\": \"1\", \"text\": \"Root\"}]}",
            null,
            ["note_123"]
        ]]))
        .expect("string map");
        assert_eq!(from_string.note_id.as_deref(), Some("note_123"));
        assert_eq!(
            from_string.mind_map,
            Some(json!({"nodes": [{"id": "1", "text": "Root"}]}))
        );

        let inline = parse_mind_map_result(&json!([[{"nodes": [{"id": "1"}]}, null, ["note_456"]]]))
            .expect("inline map");
        assert_eq!(inline.mind_map, Some(json!({"nodes": [{"id": "1"}]})));

        assert_eq!(
            parse_mind_map_result(&json!(null)).expect("empty"),
            MindMapResult::default()
        );
        assert!(parse_mind_map_result(&json!([["{not json", null, null]])).is_err());
    }

    #[test]
    fn mind_map_params_nest_source_ids() {
        let params = mind_map_params(&["src_001", "src_002"]);
        assert_eq!(params[0], json!([[["src_001"]], [["src_002"]]]));
        assert_eq!(params[5][0], json!("interactive_mindmap"));
    }

    #[test]
    fn regression_invalid_media_metadata_is_absent_not_error() {
        let record = ArtifactRecord::from_row(&json!([
            "audio_001", "Audio", 1, null, 3, null, "not_a_list"
        ]))
        .expect("row");
        assert_eq!(record.media_url(), None);
        let report = ArtifactRecord::from_row(&json!(["r", "Report", 2, null, 3])).expect("row");
        assert_eq!(report.media_url(), None);
    }

    #[test]
    fn list_payload_accepts_wrapped_and_bare_rows() {
        let wrapped = json!([[["a1", "One", 1, null, 3], ["a2", "Two", 3, null, 1]]]);
        let bare = json!([["a1", "One", 1, null, 3]]);
        assert_eq!(parse_artifact_list(&wrapped).expect("wrapped").len(), 2);
        assert_eq!(parse_artifact_list(&bare).expect("bare")[0].id(), "a1");
        assert!(parse_artifact_list(&json!([[]])).expect("empty").is_empty());
        assert!(parse_artifact_list(&json!(null)).expect("null").is_empty());
        assert!(parse_artifact_list(&json!({"rows": []})).is_err());
    }

    #[test]
    fn generation_response_yields_handle() {
        let handle = task_handle_from_generation(
            &json!([["art_9", "Deep Dive", 1, null, 1]]),
            ArtifactKind::Audio,
        )
        .expect("handle");
        assert_eq!(handle.task_id, "art_9");
        assert_eq!(handle.kind, TaskKind::Artifact(ArtifactKind::Audio));
        assert!(task_handle_from_generation(&json!([[]]), ArtifactKind::Audio).is_err());
    }

    #[test]
    fn list_params_exclude_suggestions() {
        assert_eq!(
            list_artifacts_params("nb_1"),
            json!([[2], "nb_1", "NOT artifact.status = \"ARTIFACT_STATUS_SUGGESTED\""])
        );
    }
}
