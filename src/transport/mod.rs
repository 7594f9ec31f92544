use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

mod http;
mod types;

pub use http::HttpApi;
pub use types::{GradeCard, HistoryMessage};

/// An uploaded artifact, fully read into memory before the request is built.
#[derive(Debug, Clone)]
pub struct FilePayload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl FilePayload {
    pub async fn from_path(path: &Path) -> ClientResult<Self> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ClientError::UserInput("Not a file path".into()))?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ClientError::UserInput(format!("Cannot read {}: {}", path.display(), e)))?;
        Ok(Self { filename, bytes })
    }

    /// Lower-cased extension, used for the upload allow-lists.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.filename)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
    }
}

/// One operation per backend endpoint the orchestrator drives.
///
/// Every call takes a [`CancellationToken`]; a cancelled call resolves to
/// [`ClientError::Cancelled`] and leaves no observable side effects behind.
/// Endpoints that need a bearer token short-circuit to
/// [`ClientError::AuthRequired`] before touching the network.
#[async_trait]
pub trait Api: Send + Sync {
    async fn initialize_bot(
        &self,
        template: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<String>;

    async fn upload_document(
        &self,
        bot_id: &str,
        file: FilePayload,
        cancel: &CancellationToken,
    ) -> ClientResult<()>;

    async fn create_bot_instance(
        &self,
        bot_id: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<()>;

    async fn new_chat(&self, bot_id: &str, cancel: &CancellationToken) -> ClientResult<String>;

    async fn list_chats(
        &self,
        bot_id: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<Vec<String>>;

    async fn chat_history(
        &self,
        chat_id: &str,
        bot_id: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<Vec<HistoryMessage>>;

    async fn query(
        &self,
        bot_id: &str,
        chat_id: &str,
        text: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<String>;

    async fn norag_session(&self, cancel: &CancellationToken) -> ClientResult<String>;

    async fn norag_chat(
        &self,
        session_id: &str,
        question: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<String>;

    async fn transcribe_video(
        &self,
        youtube_url: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<String>;

    async fn upload_video(
        &self,
        file: FilePayload,
        cancel: &CancellationToken,
    ) -> ClientResult<String>;

    async fn video_query(
        &self,
        session_id: &str,
        query: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<String>;

    async fn ocr_extract(
        &self,
        file: FilePayload,
        cancel: &CancellationToken,
    ) -> ClientResult<String>;

    async fn uni_ask(&self, query: &str, cancel: &CancellationToken) -> ClientResult<String>;

    async fn grade_process(
        &self,
        student_pdf: FilePayload,
        key_pdf: FilePayload,
        cancel: &CancellationToken,
    ) -> ClientResult<Vec<GradeCard>>;

    async fn grade_download(&self, cancel: &CancellationToken) -> ClientResult<Vec<u8>>;
}
