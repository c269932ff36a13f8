use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use httpmock::prelude::*;
use nlm_client::{
    decode_batch_results, parse_storage_state_cookies, ArtifactKind, BatchResults, ClientConfig,
    HttpRpcTransport, NlmError, NotebookArtifacts, NotebookResearch, PollPolicyConfig, RpcCall,
    RpcTransport, ResearchMode, ResearchSource, TaskStatus, DEFAULT_RPC_PATH,
};
use nlm_wire::testing::{null_result_record, response_body, result_record};
use nlm_wire::RpcMethod;
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;

const STORAGE_STATE: &str = r#"{
    "cookies": [
        {"name": "SID", "value": "sid-1", "domain": ".google.com", "path": "/", "expires": -1},
        {"name": "HSID", "value": "hsid-1", "domain": ".google.com", "path": "/", "expires": -1}
    ],
    "origins": []
}"#;

fn fast_policy(deadline_ms: u64) -> PollPolicyConfig {
    PollPolicyConfig {
        initial_interval_ms: 10,
        max_interval_ms: 20,
        backoff_factor: 2.0,
        jitter: false,
        deadline_ms,
        max_consecutive_transport_errors: 3,
    }
}

fn audio_row(status: u32) -> Value {
    json!([
        "art_1",
        "Deep Dive",
        1,
        null,
        status,
        null,
        [null, null, null, null, null, [
            ["https://example.test/audio.mp4", null, "audio/mp4"]
        ]]
    ])
}

fn home_page() -> &'static str {
    r#"<script>window.WIZ_global_data = {"FdrFJe":"sess-1","SNlM0e":"csrf-1"};</script>"#
}

async fn connected_transport(server: &MockServer) -> Arc<HttpRpcTransport> {
    server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200).body(home_page());
        })
        .await;
    let cookies = parse_storage_state_cookies(STORAGE_STATE, 1_700_000_000).expect("cookies");
    let config = ClientConfig {
        base_url: server.base_url(),
        source_path: "/notebook/nb_1".to_string(),
        ..ClientConfig::default()
    };
    Arc::new(
        HttpRpcTransport::connect(config, cookies)
            .await
            .expect("connect"),
    )
}

/// Replays canned response bodies through the real decoder.
struct ScriptedTransport {
    bodies: AsyncMutex<VecDeque<String>>,
    requests: AsyncMutex<Vec<Vec<String>>>,
}

impl ScriptedTransport {
    fn new(bodies: Vec<String>) -> Self {
        Self {
            bodies: AsyncMutex::new(VecDeque::from(bodies)),
            requests: AsyncMutex::new(Vec::new()),
        }
    }

    async fn request_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

#[async_trait]
impl RpcTransport for ScriptedTransport {
    async fn execute(
        &self,
        calls: &[RpcCall],
        allow_null: bool,
    ) -> Result<BatchResults, NlmError> {
        let method_ids: Vec<&str> = calls.iter().map(|call| call.method_id.as_str()).collect();
        self.requests
            .lock()
            .await
            .push(method_ids.iter().map(|id| id.to_string()).collect());
        let body = self
            .bodies
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| NlmError::transport("scripted body queue exhausted"))?;
        decode_batch_results(body.as_bytes(), &method_ids, allow_null)
    }
}

#[tokio::test]
async fn integration_generate_and_wait_over_http_returns_completed_artifact() {
    let server = MockServer::start_async().await;
    let transport = connected_transport(&server).await;
    let create = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(DEFAULT_RPC_PATH)
                .query_param("rpcids", "R7cb6c")
                .query_param("source-path", "/notebook/nb_1")
                .header("cookie", "HSID=hsid-1; SID=sid-1")
                .body_includes("at=csrf-1");
            then.status(200).body(response_body(&[result_record(
                "R7cb6c",
                &json!([["art_1", "Deep Dive", 1, null, 1]]),
            )]));
        })
        .await;
    let list = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(DEFAULT_RPC_PATH)
                .query_param("rpcids", "gArtLc")
                .body_includes("ARTIFACT_STATUS_SUGGESTED");
            then.status(200).body(response_body(&[result_record(
                "gArtLc",
                &json!([[audio_row(3)]]),
            )]));
        })
        .await;

    let artifacts = NotebookArtifacts::new(transport, "nb_1", fast_policy(5_000));
    let record = artifacts
        .generate_and_wait(ArtifactKind::Audio, json!([[2], "nb_1", [1]]))
        .await
        .expect("completed artifact");

    assert_eq!(record.id(), "art_1");
    assert_eq!(record.kind(), ArtifactKind::Audio);
    assert_eq!(
        record.media_url().as_deref(),
        Some("https://example.test/audio.mp4")
    );
    create.assert_calls_async(1).await;
    list.assert_calls_async(1).await;
    assert_eq!(artifacts.poller().in_flight_count(), 0);
}

#[tokio::test]
async fn integration_rate_limited_generation_is_reported() {
    let server = MockServer::start_async().await;
    let transport = connected_transport(&server).await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(DEFAULT_RPC_PATH).query_param("rpcids", "R7cb6c");
            then.status(200)
                .body(response_body(&[null_result_record("R7cb6c")]));
        })
        .await;

    let artifacts = NotebookArtifacts::new(transport, "nb_1", fast_policy(1_000));
    let error = artifacts
        .generate(ArtifactKind::Video, json!([[2], "nb_1"]))
        .await
        .expect_err("no task");
    assert!(matches!(error, NlmError::Protocol(_)), "unexpected error: {error:?}");
}

#[tokio::test]
async fn functional_scripted_lifecycle_progresses_to_success() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        response_body(&[result_record(
            RpcMethod::CreateArtifact.as_str(),
            &json!([["art_1", "Deep Dive", 1, null, 2]]),
        )]),
        response_body(&[result_record(RpcMethod::ListArtifacts.as_str(), &json!([[]]))]),
        response_body(&[result_record(
            RpcMethod::ListArtifacts.as_str(),
            &json!([[audio_row(1)]]),
        )]),
        response_body(&[result_record(
            RpcMethod::ListArtifacts.as_str(),
            &json!([[audio_row(2)]]),
        )]),
        response_body(&[result_record(
            RpcMethod::ListArtifacts.as_str(),
            &json!([[audio_row(3)]]),
        )]),
    ]));
    let artifacts = NotebookArtifacts::new(transport.clone(), "nb_1", fast_policy(5_000));

    let handle = artifacts
        .generate(ArtifactKind::Audio, json!([[2], "nb_1"]))
        .await
        .expect("handle");
    let status = artifacts.wait(&handle).await.expect("status");

    assert!(matches!(status, TaskStatus::Succeeded { .. }));
    assert_eq!(transport.request_count().await, 5);
}

#[tokio::test]
async fn functional_failed_artifact_surfaces_task_failed() {
    let transport = Arc::new(ScriptedTransport::new(vec![response_body(&[result_record(
        RpcMethod::ListArtifacts.as_str(),
        &json!([[audio_row(4)]]),
    )])]));
    let artifacts = NotebookArtifacts::new(transport, "nb_1", fast_policy(5_000));
    let handle = nlm_client::TaskHandle::new(
        "art_1",
        nlm_client::TaskKind::Artifact(ArtifactKind::Audio),
    );

    let error = artifacts.wait(&handle).await.expect_err("failed");
    assert!(matches!(error, NlmError::TaskFailed { task_id, .. } if task_id == "art_1"));
}

#[tokio::test]
async fn functional_missing_artifact_times_out_as_pending() {
    let bodies = (0..64)
        .map(|_| response_body(&[result_record(RpcMethod::ListArtifacts.as_str(), &json!([[]]))]))
        .collect();
    let transport = Arc::new(ScriptedTransport::new(bodies));
    let artifacts = NotebookArtifacts::new(transport, "nb_1", fast_policy(60));
    let handle = nlm_client::TaskHandle::new("art_404", nlm_client::TaskKind::Research);

    let error = artifacts.wait(&handle).await.expect_err("timeout");
    assert_eq!(
        error,
        NlmError::TaskTimeout {
            task_id: "art_404".to_string(),
            last_status: TaskStatus::Pending,
        }
    );
}

#[tokio::test]
async fn integration_download_saves_completed_audio() {
    let server = MockServer::start_async().await;
    let transport = connected_transport(&server).await;
    let media_url = server.url("/media/deep-dive.mp4");
    server
        .mock_async(|when, then| {
            when.method(POST).path(DEFAULT_RPC_PATH).query_param("rpcids", "gArtLc");
            then.status(200).body(response_body(&[result_record(
                "gArtLc",
                &json!([[
                    ["art_0", "Draft", 1, null, 1],
                    ["art_1", "Deep Dive", 1, null, 3, null, [null, null, null, null, null, [
                        [media_url, null, "audio/mp4"]
                    ]]]
                ]]),
            )]));
        })
        .await;
    let media = server
        .mock_async(|when, then| {
            when.method(GET).path("/media/deep-dive.mp4");
            then.status(200).body("mp4 bytes");
        })
        .await;
    let dir = tempfile::tempdir().expect("tempdir");
    let destination = dir.path().join("out").join("deep-dive.mp4");

    let artifacts = NotebookArtifacts::new(transport.clone(), "nb_1", fast_policy(1_000));
    let saved = artifacts
        .download(transport.as_ref(), ArtifactKind::Audio, None, &destination)
        .await
        .expect("downloaded");

    assert_eq!(saved, destination);
    assert_eq!(std::fs::read(&destination).expect("file"), b"mp4 bytes");
    media.assert_calls_async(1).await;

    let error = artifacts
        .download(transport.as_ref(), ArtifactKind::Audio, Some("art_0"), &destination)
        .await
        .expect_err("not completed");
    assert_eq!(
        error,
        NlmError::NotFound("audio artifact 'art_0' not found".to_string())
    );
    let error = artifacts
        .download(transport.as_ref(), ArtifactKind::Video, None, &destination)
        .await
        .expect_err("no video");
    assert!(matches!(error, NlmError::NotFound(message) if message.contains("no completed video")));
}

#[tokio::test]
async fn functional_scripted_research_completes_and_imports() {
    let poll_row = |status: u32| {
        json!([
            "task_1",
            [null, ["climate"], 1, [[["https://example.test/a", "Article A"]], "Summary."], status]
        ])
    };
    let transport = Arc::new(ScriptedTransport::new(vec![
        response_body(&[result_record(
            RpcMethod::StartFastResearch.as_str(),
            &json!(["task_1", "report_1"]),
        )]),
        response_body(&[result_record(
            RpcMethod::PollResearch.as_str(),
            &json!([[poll_row(1)]]),
        )]),
        response_body(&[result_record(
            RpcMethod::PollResearch.as_str(),
            &json!([[poll_row(2)]]),
        )]),
        response_body(&[result_record(
            RpcMethod::ImportResearch.as_str(),
            &json!([[["src_1"], "Article A"]]),
        )]),
    ]));
    let research = NotebookResearch::new(transport.clone(), "nb_1", fast_policy(5_000));

    let handle = research
        .start("climate", ResearchSource::Web, ResearchMode::Fast)
        .await
        .expect("started");
    let report = research.wait(&handle).await.expect("report");
    let imported = research
        .import_sources(&handle, &report.sources)
        .await
        .expect("imported");

    assert_eq!(report.summary.as_deref(), Some("Summary."));
    assert_eq!(report.sources.len(), 1);
    assert_eq!(imported.len(), 1);
    assert_eq!(imported[0].id, "src_1");
    assert_eq!(transport.request_count().await, 4);
    assert_eq!(research.poller().in_flight_count(), 0);
}
