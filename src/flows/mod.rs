use crate::error::ClientResult;
use crate::session::SessionStore;
use crate::transport::{Api, FilePayload};
use once_cell::sync::Lazy;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

mod document;
mod norag;
mod template;
mod uni;
mod video;

pub use document::{DocStep, DocumentRagFlow};
pub use norag::NoRagFlow;
pub use template::{PromptTemplate, derive_template};
pub use uni::UniBotFlow;
pub use video::VideoRagFlow;

/// Extensions accepted for knowledge-base uploads.
static KB_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "csv", "doc", "docx", "epub", "jpg", "jpeg", "png", "gif", "bmp", "webp", "md", "msg",
        "odt", "org", "pdf", "ppt", "pptx", "rtf", "rst", "tsv", "xlsx",
    ])
});

/// Extensions accepted for OCR (PDF or image).
static OCR_EXTENSIONS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| HashSet::from(["pdf", "jpg", "jpeg", "png", "gif", "bmp", "webp"]));

pub(crate) fn is_kb_file(file: &FilePayload) -> bool {
    file.extension().is_some_and(|ext| KB_EXTENSIONS.contains(ext.as_str()))
}

pub(crate) fn is_ocr_file(file: &FilePayload) -> bool {
    file.extension().is_some_and(|ext| OCR_EXTENSIONS.contains(ext.as_str()))
}

/// Paperclip side-channel shared by every flow: OCR the file and replace the
/// draft input with the extracted text. Touches nothing but the draft.
pub(crate) async fn ocr_prefill(
    api: &dyn Api,
    store: &SessionStore,
    file: FilePayload,
    cancel: &CancellationToken,
) -> ClientResult<()> {
    let text = api.ocr_extract(file, cancel).await?;
    store.set_draft(&text);
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::error::{ClientError, ClientResult};
    use crate::transport::{Api, FilePayload, GradeCard, HistoryMessage};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    /// Recording stub backend: every call is appended to `calls` as the path
    /// the real client would hit, and canned values come back.
    #[derive(Default)]
    pub struct StubApi {
        pub calls: Mutex<Vec<String>>,
        /// Name of the one operation that should fail with a 500.
        pub fail_op: Mutex<Option<&'static str>>,
        pub answer: Mutex<String>,
        pub history: Mutex<Vec<HistoryMessage>>,
        /// Extra latency per call, for mid-flight cancellation tests.
        pub delay: Mutex<Option<Duration>>,
    }

    impl StubApi {
        pub fn new() -> Self {
            let stub = Self::default();
            *stub.answer.lock().unwrap() = "stub answer".to_string();
            stub
        }

        pub fn recorded(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        async fn call(&self, op: &'static str, logged: String) -> ClientResult<()> {
            let delay = *self.delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if *self.fail_op.lock().unwrap() == Some(op) {
                return Err(ClientError::BackendRejection {
                    status: 500,
                    body: "stub failure".into(),
                });
            }
            self.calls.lock().unwrap().push(logged);
            Ok(())
        }

        fn answer(&self) -> String {
            self.answer.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Api for StubApi {
        async fn initialize_bot(
            &self,
            template: &str,
            _cancel: &CancellationToken,
        ) -> ClientResult<String> {
            self.call(
                "initialize_bot",
                format!("POST /initialize_bot?prompt_type={template}"),
            )
            .await?;
            Ok("b-1".into())
        }

        async fn upload_document(
            &self,
            bot_id: &str,
            file: FilePayload,
            _cancel: &CancellationToken,
        ) -> ClientResult<()> {
            self.call(
                "upload_document",
                format!("POST /upload_document bot_id={bot_id} file={}", file.filename),
            )
            .await
        }

        async fn create_bot_instance(
            &self,
            bot_id: &str,
            _cancel: &CancellationToken,
        ) -> ClientResult<()> {
            self.call("create_bot_instance", format!("POST /create_bot/{bot_id}"))
                .await
        }

        async fn new_chat(&self, bot_id: &str, _cancel: &CancellationToken) -> ClientResult<String> {
            self.call("new_chat", format!("POST /new_chat/{bot_id}")).await?;
            Ok("c-1".into())
        }

        async fn list_chats(
            &self,
            bot_id: &str,
            _cancel: &CancellationToken,
        ) -> ClientResult<Vec<String>> {
            self.call("list_chats", format!("GET /list_chats/{bot_id}")).await?;
            Ok(vec!["c-1".into(), "c-2".into()])
        }

        async fn chat_history(
            &self,
            chat_id: &str,
            bot_id: &str,
            _cancel: &CancellationToken,
        ) -> ClientResult<Vec<HistoryMessage>> {
            self.call(
                "chat_history",
                format!("GET /chat_history/{chat_id}?bot_id={bot_id}"),
            )
            .await?;
            Ok(self.history.lock().unwrap().clone())
        }

        async fn query(
            &self,
            bot_id: &str,
            chat_id: &str,
            text: &str,
            _cancel: &CancellationToken,
        ) -> ClientResult<String> {
            self.call(
                "query",
                format!("POST /query bot_id={bot_id} chat_id={chat_id} query={text}"),
            )
            .await?;
            Ok(self.answer())
        }

        async fn norag_session(&self, _cancel: &CancellationToken) -> ClientResult<String> {
            self.call("norag_session", "POST /norag/session".into()).await?;
            Ok("s-1".into())
        }

        async fn norag_chat(
            &self,
            session_id: &str,
            question: &str,
            _cancel: &CancellationToken,
        ) -> ClientResult<String> {
            self.call(
                "norag_chat",
                format!("POST /norag/chat session_id={session_id} question={question}"),
            )
            .await?;
            Ok(self.answer())
        }

        async fn transcribe_video(
            &self,
            youtube_url: &str,
            _cancel: &CancellationToken,
        ) -> ClientResult<String> {
            self.call(
                "transcribe_video",
                format!("POST /transcribe_video youtube_url={youtube_url}"),
            )
            .await?;
            Ok("S".into())
        }

        async fn upload_video(
            &self,
            file: FilePayload,
            _cancel: &CancellationToken,
        ) -> ClientResult<String> {
            self.call("upload_video", format!("POST /upload_video file={}", file.filename))
                .await?;
            Ok("S".into())
        }

        async fn video_query(
            &self,
            session_id: &str,
            query: &str,
            _cancel: &CancellationToken,
        ) -> ClientResult<String> {
            self.call(
                "video_query",
                format!("POST /vid_query session_id={session_id} query={query}"),
            )
            .await?;
            Ok(self.answer())
        }

        async fn ocr_extract(
            &self,
            file: FilePayload,
            _cancel: &CancellationToken,
        ) -> ClientResult<String> {
            self.call("ocr_extract", format!("POST /upload file={}", file.filename))
                .await?;
            Ok("Q1 ...".into())
        }

        async fn uni_ask(&self, query: &str, _cancel: &CancellationToken) -> ClientResult<String> {
            self.call("uni_ask", format!("POST /llm/ask query={query}")).await?;
            Ok(self.answer())
        }

        async fn grade_process(
            &self,
            student_pdf: FilePayload,
            key_pdf: FilePayload,
            _cancel: &CancellationToken,
        ) -> ClientResult<Vec<GradeCard>> {
            self.call(
                "grade_process",
                format!(
                    "POST /check/process student_pdf={} paper_k_pdf={}",
                    student_pdf.filename, key_pdf.filename
                ),
            )
            .await?;
            let mut card = GradeCard::new();
            card.insert("score".into(), serde_json::json!(7));
            Ok(vec![card])
        }

        async fn grade_download(&self, _cancel: &CancellationToken) -> ClientResult<Vec<u8>> {
            self.call("grade_download", "GET /check/download".into()).await?;
            Ok(br#"{"results":[]}"#.to_vec())
        }
    }

    pub fn pdf(name: &str) -> FilePayload {
        FilePayload {
            filename: name.to_string(),
            bytes: b"%PDF-1.4".to_vec(),
        }
    }
}
