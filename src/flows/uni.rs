use super::{is_ocr_file, ocr_prefill};
use crate::error::{ClientError, ClientResult};
use crate::session::{Role, SessionStore};
use crate::stream::{StreamHandle, stream_into};
use crate::transport::{Api, FilePayload};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// University Q&A: stateless, one request per question, no server session.
/// Variant reply shapes are normalized inside the transport client.
pub struct UniBotFlow {
    api: Arc<dyn Api>,
    store: Arc<SessionStore>,
    cadence: Duration,
    page: CancellationToken,
    stream: Option<StreamHandle>,
}

impl UniBotFlow {
    pub fn new(api: Arc<dyn Api>, store: Arc<SessionStore>, cadence: Duration) -> Self {
        Self {
            api,
            store,
            cadence,
            page: CancellationToken::new(),
            stream: None,
        }
    }

    pub async fn ask(&mut self, text: &str) -> ClientResult<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::UserInput("Please enter a message".into()));
        }

        self.store.append_message(Role::User, text);

        let cancel = self.page.child_token();
        match self.api.uni_ask(text, &cancel).await {
            Ok(answer) => {
                // The system stub is only appended once an answer exists;
                // failures never leave an orphaned system message.
                let system_id = self.store.append_message(Role::System, "");
                self.stream = Some(stream_into(
                    self.store.clone(),
                    system_id,
                    answer,
                    self.cadence,
                ));
                Ok(())
            }
            Err(ClientError::Cancelled) => Ok(()),
            Err(err) => Err(err),
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

    pub fn reset(&mut self) {
        self.page.cancel();
        self.page = CancellationToken::new();
        self.stop_stream();
        self.store.reset();
    }

    pub fn dispose(&mut self) {
        self.page.cancel();
        self.stop_stream();
    }
}
