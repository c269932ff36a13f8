//! Async client for NotebookLM's `batchexecute` RPC endpoint.
//!
//! [`HttpRpcTransport`] sends encoded batches with the session credentials
//! held in [`AuthTokens`], [`TaskPoller`] waits for long-running jobs, and
//! [`NotebookArtifacts`] and [`NotebookResearch`] tie both together for
//! artifact generation and research sessions.
mod artifacts;
mod auth;
pub mod clock;
mod config;
mod download;
mod error;
mod poller;
mod research;
pub mod retry;
mod storage;
mod task;
mod transport;

pub use artifacts::{
    list_artifacts_params, mind_map_params, parse_artifact_list, parse_mind_map_result,
    task_handle_from_generation, ArtifactKind, ArtifactRecord, ArtifactStatusCode,
    ArtifactStatusSource, MindMapResult, NotebookArtifacts,
};
pub use auth::{
    extract_page_tokens, format_cookie_header, is_sign_in_redirect, merge_set_cookie_headers,
    missing_required_cookies, AuthTokens, PageTokens, REQUIRED_COOKIE_NAMES,
};
pub use clock::{PollClock, TokioClock};
pub use config::{ClientConfig, PollPolicyConfig, DEFAULT_BASE_URL, DEFAULT_RPC_PATH};
pub use download::{requires_session_cookies, save_media, MediaFetcher};
pub use error::NlmError;
pub use poller::{PollSchedule, TaskPoller, TaskStatusSource, DEFAULT_POLL_INTERVAL};
pub use research::{
    import_research_params, parse_imported_sources, parse_research_poll, parse_research_start,
    poll_research_params, start_research_params, DiscoveredSource, ImportedSource,
    NotebookResearch, ResearchMode, ResearchReport, ResearchSource, ResearchStatusSource,
};
pub use storage::{load_storage_state_cookies, parse_storage_state_cookies};
pub use task::{TaskHandle, TaskKind, TaskStatus};
pub use transport::{decode_batch_results, BatchResults, HttpRpcTransport, RpcTransport};

pub use nlm_wire::{RpcCall, RpcMethod, RpcPayload};
