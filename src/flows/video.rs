use super::{is_ocr_file, ocr_prefill};
use crate::error::{ClientError, ClientResult};
use crate::session::{Role, SessionStore};
use crate::stream::{StreamHandle, stream_into};
use crate::transport::{Api, FilePayload};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Video-RAG workflow: transcribe a video (by URL or upload) into a session,
/// then ask questions about it with streamed answers.
pub struct VideoRagFlow {
    api: Arc<dyn Api>,
    store: Arc<SessionStore>,
    cadence: Duration,
    transcribing: bool,
    page: CancellationToken,
    stream: Option<StreamHandle>,
}

impl VideoRagFlow {
    pub fn new(api: Arc<dyn Api>, store: Arc<SessionStore>, cadence: Duration) -> Self {
        Self {
            api,
            store,
            cadence,
            transcribing: false,
            page: CancellationToken::new(),
            stream: None,
        }
    }

    pub fn has_session(&self) -> bool {
        self.store.active_session().is_some()
    }

    pub async fn transcribe_url(&mut self, youtube_url: &str) -> ClientResult<()> {
        let url = youtube_url.trim();
        if url.is_empty() {
            return Err(ClientError::UserInput("Please enter a YouTube URL".into()));
        }
        if self.transcribing {
            return Err(ClientError::UserInput("Transcription already in progress".into()));
        }

        self.transcribing = true;
        let cancel = self.page.child_token();
        let result = self.api.transcribe_video(url, &cancel).await;
        self.transcribing = false;

        self.enter_session(result?);
        Ok(())
    }

    pub async fn upload_video(&mut self, file: FilePayload) -> ClientResult<()> {
        if self.transcribing {
            return Err(ClientError::UserInput("Transcription already in progress".into()));
        }

        self.transcribing = true;
        let cancel = self.page.child_token();
        let result = self.api.upload_video(file, &cancel).await;
        self.transcribing = false;

        self.enter_session(result?);
        Ok(())
    }

    fn enter_session(&mut self, session_id: String) {
        info!("Video session {} started", session_id);
        self.stop_stream();
        self.store.clear_log();
        self.store.set_active_session(&session_id);
        self.store.append_message(
            Role::System,
            &format!(
                "Session started (ID: {}). Ask your first question below.",
                session_id
            ),
        );
    }

    pub async fn send(&mut self, text: &str) -> ClientResult<()> {
        let session_id = self
            .store
            .active_session()
            .ok_or_else(|| ClientError::UserInput("Transcribe a video first".into()))?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::UserInput("Please enter a message".into()));
        }

        self.store.append_message(Role::User, text);
        let system_id = self.store.append_message(Role::System, "");

        let cancel = self.page.child_token();
        match self.api.video_query(&session_id, text, &cancel).await {
            Ok(answer) => {
                self.stream = Some(stream_into(
                    self.store.clone(),
                    system_id,
                    answer,
                    self.cadence,
                ));
                Ok(())
            }
            Err(ClientError::Cancelled) => Ok(()),
            Err(err) => {
                self.store.set_system_text(system_id, "Failed to fetch an answer.");
                Err(err)
            }
        }
    }

    pub async fn ocr(&mut self, file: FilePayload) -> ClientResult<()> {
        if !is_ocr_file(&file) {
            return Err(ClientError::UserInput(format!(
                "OCR accepts PDFs and images, not {}",
                file.filename
            )));
        }
        ocr_prefill(self.api.as_ref(), &self.store, file, &self.page.child_token()).await
    }

    pub async fn wait_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.wait().await;
        }
    }

    fn stop_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.cancel();
        }
    }

    /// "New Chat": drop the session, the log, and the draft. Idempotent.
    pub fn reset(&mut self) {
        self.page.cancel();
        self.page = CancellationToken::new();
        self.stop_stream();
        self.transcribing = false;
        self.store.reset();
    }

    pub fn dispose(&mut self) {
        self.page.cancel();
        self.stop_stream();
    }
}
