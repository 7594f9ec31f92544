use super::{derive_template, is_kb_file, is_ocr_file, ocr_prefill};
use crate::error::{ClientError, ClientResult};
use crate::session::{self, Role, SessionStore};
use crate::stream::{StreamHandle, stream_into};
use crate::transport::{Api, FilePayload};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocStep {
    InitializeBot,
    AddData,
    CreateNewChat,
    ChatScreen,
}

/// Document-RAG workflow: initialize a bot, attach a knowledge base, open a
/// chat, then converse with streamed answers.
pub struct DocumentRagFlow {
    api: Arc<dyn Api>,
    store: Arc<SessionStore>,
    data_dir: PathBuf,
    cadence: Duration,
    step: DocStep,
    custom_prompt: Option<String>,
    creating_bot: bool,
    uploading: bool,
    starting_chat: bool,
    page: CancellationToken,
    stream: Option<StreamHandle>,
}

impl DocumentRagFlow {
    pub fn new(api: Arc<dyn Api>, store: Arc<SessionStore>, data_dir: PathBuf, cadence: Duration) -> Self {
        Self {
            api,
            store,
            data_dir,
            cadence,
            step: DocStep::InitializeBot,
            custom_prompt: None,
            creating_bot: false,
            uploading: false,
            starting_chat: false,
            page: CancellationToken::new(),
            stream: None,
        }
    }

    /// An explicitly supplied prompt overrides the task-to-template mapping.
    pub fn with_custom_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.custom_prompt = Some(prompt.into());
        self
    }

    pub fn step(&self) -> DocStep {
        self.step
    }

    /// Re-enters the persisted bot/chat context after a restart. With both ids
    /// present the chat screen comes back with its history rehydrated.
    pub async fn resume(&mut self) -> ClientResult<()> {
        let Some(snapshot) = session::load_snapshot(&self.data_dir).await else {
            return Ok(());
        };
        let Some(bot_id) = snapshot.bot_id else {
            return Ok(());
        };

        self.store.set_active_bot(&bot_id);
        self.step = DocStep::AddData;

        if let Some(chat_id) = snapshot.chat_id {
            let cancel = self.page.child_token();
            let history = self.api.chat_history(&chat_id, &bot_id, &cancel).await?;
            self.store.replace_log(&history);
            self.store.set_active_chat(&chat_id);
            self.step = DocStep::ChatScreen;
            info!("Resumed chat {} under bot {}", chat_id, bot_id);
        }
        Ok(())
    }

    pub async fn new_bot(&mut self, task: &str) -> ClientResult<()> {
        if self.creating_bot {
            return Err(ClientError::UserInput("Bot creation already in progress".into()));
        }
        let template = match &self.custom_prompt {
            Some(custom) => custom.clone(),
            None => derive_template(task).tag().to_string(),
        };

        self.creating_bot = true;
        let cancel = self.page.child_token();
        let result = self.api.initialize_bot(&template, &cancel).await;
        self.creating_bot = false;

        let bot_id = result?;
        info!("Bot {} initialized with template {}", bot_id, template);
        self.store.set_active_bot(&bot_id);
        self.persist().await;
        self.step = DocStep::AddData;
        Ok(())
    }

    pub async fn upload_knowledge(&mut self, file: FilePayload) -> ClientResult<()> {
        // The backend contract for a missing bot id is unclear; refuse here
        // instead of sending an empty string.
        let bot_id = self
            .store
            .active_bot()
            .ok_or_else(|| ClientError::UserInput("Create a bot before uploading documents".into()))?;
        if !is_kb_file(&file) {
            return Err(ClientError::UserInput(format!(
                "Unsupported knowledge-base file: {}",
                file.filename
            )));
        }
        if self.uploading {
            return Err(ClientError::UserInput("Upload already in progress".into()));
        }

        self.uploading = true;
        let cancel = self.page.child_token();
        let result = self.api.upload_document(&bot_id, file, &cancel).await;
        self.uploading = false;
        result?;

        if matches!(self.step, DocStep::InitializeBot | DocStep::AddData) {
            self.step = DocStep::CreateNewChat;
        }
        Ok(())
    }

    pub async fn new_chat(&mut self) -> ClientResult<()> {
        let bot_id = self
            .store
            .active_bot()
            .ok_or_else(|| ClientError::UserInput("Create a bot first".into()))?;
        if self.starting_chat {
            return Err(ClientError::UserInput("Chat creation already in progress".into()));
        }

        self.starting_chat = true;
        let cancel = self.page.child_token();
        // Strict order: the chat may only be opened on a successfully built bot.
        let result = async {
            self.api.create_bot_instance(&bot_id, &cancel).await?;
            self.api.new_chat(&bot_id, &cancel).await
        }
        .await;
        self.starting_chat = false;

        let chat_id = result?;
        self.stop_stream();
        self.store.clear_log();
        self.store.set_active_chat(&chat_id);
        self.persist().await;
        self.step = DocStep::ChatScreen;
        Ok(())
    }

    pub async fn send(&mut self, text: &str) -> ClientResult<()> {
        let bot_id = self.store.active_bot();
        let chat_id = self.store.active_chat();
        let (Some(bot_id), Some(chat_id)) = (bot_id, chat_id) else {
            return Err(ClientError::UserInput(
                "Sending is disabled until a bot and chat are active".into(),
            ));
        };
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::UserInput("Please enter a message".into()));
        }

        self.store.append_message(Role::User, text);
        let system_id = self.store.append_message(Role::System, "");

        let cancel = self.page.child_token();
        match self.api.query(&bot_id, &chat_id, text, &cancel).await {
            Ok(response) => {
                self.stream = Some(stream_into(
                    self.store.clone(),
                    system_id,
                    response,
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

    pub async fn list_chats(&self) -> ClientResult<Vec<String>> {
        let bot_id = self
            .store
            .active_bot()
            .ok_or_else(|| ClientError::UserInput("Create a bot first".into()))?;
        self.api.list_chats(&bot_id, &self.page.child_token()).await
    }

    /// Loads a previous chat. A renderer still typing into the current log is
    /// cancelled before the log is replaced.
    pub async fn select_chat(&mut self, chat_id: &str) -> ClientResult<()> {
        let bot_id = self
            .store
            .active_bot()
            .ok_or_else(|| ClientError::UserInput("Create a bot first".into()))?;

        self.stop_stream();

        let cancel = self.page.child_token();
        let history = self.api.chat_history(chat_id, &bot_id, &cancel).await?;
        self.store.replace_log(&history);
        self.store.set_active_chat(chat_id);
        self.persist().await;
        self.step = DocStep::ChatScreen;
        Ok(())
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

    /// Waits for the current typing stream to finish, if one is running.
    pub async fn wait_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.wait().await;
        }
    }

    pub fn stream_finished(&self) -> bool {
        self.stream.as_ref().is_none_or(|s| s.is_finished())
    }

    fn stop_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.cancel();
        }
    }

    async fn persist(&self) {
        if let Err(err) = session::save_snapshot(&self.data_dir, &self.store.snapshot()).await {
            warn!("Failed to persist session snapshot: {}", err);
        }
    }

    /// Back to the zero state. Safe to call repeatedly.
    pub async fn reset(&mut self) {
        self.page.cancel();
        self.page = CancellationToken::new();
        self.stop_stream();
        self.store.reset();
        self.step = DocStep::InitializeBot;
        self.creating_bot = false;
        self.uploading = false;
        self.starting_chat = false;
        if let Err(err) = session::clear_snapshot(&self.data_dir).await {
            warn!("Failed to clear session snapshot: {}", err);
        }
    }

    /// Navigating away from the page: cancel everything this page owns.
    pub fn dispose(&mut self) {
        self.page.cancel();
        self.stop_stream();
    }
}
