use super::{is_ocr_file, ocr_prefill};
use crate::error::{ClientError, ClientResult};
use crate::session::{Role, SessionStore};
use crate::transport::{Api, FilePayload};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Chat without a knowledge base: one server session, whole answers appended
/// in a single step.
pub struct NoRagFlow {
    api: Arc<dyn Api>,
    store: Arc<SessionStore>,
    creating_session: bool,
    page: CancellationToken,
}

impl NoRagFlow {
    pub fn new(api: Arc<dyn Api>, store: Arc<SessionStore>) -> Self {
        Self {
            api,
            store,
            creating_session: false,
            page: CancellationToken::new(),
        }
    }

    pub fn has_session(&self) -> bool {
        self.store.active_session().is_some()
    }

    pub async fn new_session(&mut self) -> ClientResult<()> {
        if self.creating_session {
            return Err(ClientError::UserInput("Session creation already in progress".into()));
        }

        self.creating_session = true;
        let cancel = self.page.child_token();
        let result = self.api.norag_session(&cancel).await;
        self.creating_session = false;

        let session_id = result?;
        info!("No-RAG session {} started", session_id);
        self.store.clear_log();
        self.store.set_active_session(&session_id);
        Ok(())
    }

    pub async fn send(&mut self, text: &str) -> ClientResult<()> {
        let session_id = self
            .store
            .active_session()
            .ok_or_else(|| ClientError::UserInput("Create a session first".into()))?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::UserInput("Please enter a message".into()));
        }

        self.store.append_message(Role::User, text);

        let cancel = self.page.child_token();
        match self.api.norag_chat(&session_id, text, &cancel).await {
            Ok(answer) => {
                self.store.append_message(Role::System, &answer);
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

    pub fn reset(&mut self) {
        self.page.cancel();
        self.page = CancellationToken::new();
        self.creating_session = false;
        self.store.reset();
    }

    pub fn dispose(&mut self) {
        self.page.cancel();
    }
}
