use super::types::*;
use super::{Api, FilePayload};
use crate::auth::AuthContext;
use crate::config::Config;
use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::future::Future;
use std::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// reqwest-backed implementation of [`Api`], plus the account endpoints the
/// flows never stub (login, signup, profile, contact, reviews).
pub struct HttpApi {
    http: reqwest::Client,
    base_url: String,
    reviews_base_url: String,
    auth: RwLock<Option<AuthContext>>,
}

impl HttpApi {
    pub fn new(config: &Config) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            reviews_base_url: config.reviews_base_url.clone(),
            auth: RwLock::new(None),
        })
    }

    pub fn set_auth(&self, auth: AuthContext) {
        *self.auth.write().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(auth);
    }

    pub fn clear_auth(&self) {
        *self.auth.write().unwrap_or_else(std::sync::PoisonError::into_inner) = None;
    }

    pub fn auth(&self) -> Option<AuthContext> {
        self.auth.read().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(&self) -> ClientResult<String> {
        self.auth()
            .map(|a| a.access_token)
            .ok_or(ClientError::AuthRequired)
    }

    async fn expect_success(resp: reqwest::Response) -> ClientResult<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        warn!("Backend rejected request: HTTP {}: {}", status, body);
        Err(ClientError::BackendRejection {
            status: status.as_u16(),
            body,
        })
    }

    async fn send(
        &self,
        req: reqwest::RequestBuilder,
        cancel: &CancellationToken,
    ) -> ClientResult<reqwest::Response> {
        with_cancel(cancel, async {
            let resp = req.send().await?;
            Self::expect_success(resp).await
        })
        .await
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        cancel: &CancellationToken,
    ) -> ClientResult<T> {
        with_cancel(cancel, async {
            let resp = req.send().await?;
            let resp = Self::expect_success(resp).await?;
            Ok(resp.json::<T>().await?)
        })
        .await
    }


    pub async fn login(
        &self,
        username: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<AuthContext> {
        let reply: LoginReply = self
            .send_json(
                self.http
                    .post(self.url("/auth/login"))
                    .form(&[("username", username), ("password", password)]),
                cancel,
            )
            .await?;

        let auth = AuthContext {
            access_token: reply.access_token,
            refresh_token: reply.refresh_token,
            name: reply.name,
            avatar: reply.avatar,
        };
        self.set_auth(auth.clone());
        Ok(auth)
    }

    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        password: &str,
        avatar: Option<FilePayload>,
        cancel: &CancellationToken,
    ) -> ClientResult<()> {
        let mut form = Form::new()
            .text("name", name.to_string())
            .text("email", email.to_string())
            .text("password", password.to_string());
        if let Some(file) = avatar {
            form = form.part("avatar", Part::bytes(file.bytes).file_name(file.filename));
        }

        self.send(self.http.post(self.url("/auth/signup")).multipart(form), cancel)
            .await?;
        Ok(())
    }

    pub async fn user_data(&self, cancel: &CancellationToken) -> ClientResult<UserProfile> {
        let token = self.bearer()?;
        self.send_json(
            self.http
                .get(self.url("/auth/user/data"))
                .bearer_auth(token),
            cancel,
        )
        .await
    }

    pub async fn user_update(
        &self,
        fields: &[(&str, String)],
        avatar: Option<FilePayload>,
        cancel: &CancellationToken,
    ) -> ClientResult<()> {
        let token = self.bearer()?;
        let mut form = Form::new();
        for (key, value) in fields {
            form = form.text(key.to_string(), value.clone());
        }
        if let Some(file) = avatar {
            form = form.part("avatar", Part::bytes(file.bytes).file_name(file.filename));
        }

        self.send(
            self.http
                .put(self.url("/auth/user/update"))
                .bearer_auth(token)
                .multipart(form),
            cancel,
        )
        .await?;
        Ok(())
    }

    pub async fn avatar(&self, reference: &str, cancel: &CancellationToken) -> ClientResult<Vec<u8>> {
        with_cancel(cancel, async {
            let resp = self
                .http
                .get(self.url(&format!("/auth/avatar/{}", reference)))
                .send()
                .await?;
            let resp = Self::expect_success(resp).await?;
            Ok(resp.bytes().await?.to_vec())
        })
        .await
    }

    pub async fn send_contact(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<()> {
        self.send(
            self.http.post(self.url("/contact/")).json(&serde_json::json!({
                "first_name": first_name,
                "last_name": last_name,
                "email": email,
                "message": message,
            })),
            cancel,
        )
        .await?;
        Ok(())
    }

    /// Reviews live on a separate origin from the rest of the backend.
    pub async fn send_review(&self, review: &str, cancel: &CancellationToken) -> ClientResult<()> {
        let token = self.bearer()?;
        self.send(
            self.http
                .post(format!("{}/reviews", self.reviews_base_url))
                .bearer_auth(token)
                .json(&serde_json::json!({ "review": review })),
            cancel,
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Api for HttpApi {
    async fn initialize_bot(
        &self,
        template: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<String> {
        let token = self.bearer()?;
        debug!("Initializing bot with template {}", template);
        let reply: InitializeBotReply = self
            .send_json(
                self.http
                    .post(self.url("/initialize_bot"))
                    .query(&[("prompt_type", template)])
                    .bearer_auth(token),
                cancel,
            )
            .await?;
        Ok(reply.bot_id)
    }

    async fn upload_document(
        &self,
        bot_id: &str,
        file: FilePayload,
        cancel: &CancellationToken,
    ) -> ClientResult<()> {
        let token = self.bearer()?;
        let form = Form::new()
            .part("file", Part::bytes(file.bytes).file_name(file.filename))
            .text("bot_id", bot_id.to_string());

        self.send(
            self.http
                .post(self.url("/upload_document"))
                .bearer_auth(token)
                .multipart(form),
            cancel,
        )
        .await?;
        Ok(())
    }

    async fn create_bot_instance(
        &self,
        bot_id: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<()> {
        let token = self.bearer()?;
        self.send(
            self.http
                .post(self.url(&format!("/create_bot/{}", bot_id)))
                .bearer_auth(token),
            cancel,
        )
        .await?;
        Ok(())
    }

    async fn new_chat(&self, bot_id: &str, cancel: &CancellationToken) -> ClientResult<String> {
        let token = self.bearer()?;
        let reply: NewChatReply = self
            .send_json(
                self.http
                    .post(self.url(&format!("/new_chat/{}", bot_id)))
                    .bearer_auth(token),
                cancel,
            )
            .await?;
        Ok(reply.chat_id)
    }

    async fn list_chats(
        &self,
        bot_id: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<Vec<String>> {
        let token = self.bearer()?;
        let reply: ListChatsReply = self
            .send_json(
                self.http
                    .get(self.url(&format!("/list_chats/{}", bot_id)))
                    .bearer_auth(token),
                cancel,
            )
            .await?;
        Ok(reply.chat_ids)
    }

    async fn chat_history(
        &self,
        chat_id: &str,
        bot_id: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<Vec<HistoryMessage>> {
        let token = self.bearer()?;
        self.send_json(
            self.http
                .get(self.url(&format!("/chat_history/{}", chat_id)))
                .query(&[("bot_id", bot_id)])
                .bearer_auth(token),
            cancel,
        )
        .await
    }

    async fn query(
        &self,
        bot_id: &str,
        chat_id: &str,
        text: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<String> {
        let token = self.bearer()?;
        let reply: QueryReply = self
            .send_json(
                self.http
                    .post(self.url("/query"))
                    .bearer_auth(token)
                    .json(&serde_json::json!({
                        "query": text,
                        "bot_id": bot_id,
                        "chat_id": chat_id,
                    })),
                cancel,
            )
            .await?;
        Ok(reply.response)
    }

    async fn norag_session(&self, cancel: &CancellationToken) -> ClientResult<String> {
        let reply: SessionReply = self
            .send_json(self.http.post(self.url("/norag/session")), cancel)
            .await?;
        Ok(reply.session_id)
    }

    async fn norag_chat(
        &self,
        session_id: &str,
        question: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<String> {
        let reply: AnswerReply = self
            .send_json(
                self.http.post(self.url("/norag/chat")).json(&serde_json::json!({
                    "session_id": session_id,
                    "question": question,
                })),
                cancel,
            )
            .await?;
        Ok(reply.answer)
    }

    async fn transcribe_video(
        &self,
        youtube_url: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<String> {
        let token = self.bearer()?;
        let reply: SessionReply = self
            .send_json(
                self.http
                    .post(self.url("/transcribe_video"))
                    .bearer_auth(token)
                    .json(&serde_json::json!({ "youtube_url": youtube_url })),
                cancel,
            )
            .await?;
        Ok(reply.session_id)
    }

    async fn upload_video(
        &self,
        file: FilePayload,
        cancel: &CancellationToken,
    ) -> ClientResult<String> {
        let token = self.bearer()?;
        let form = Form::new().part("file", Part::bytes(file.bytes).file_name(file.filename));
        let reply: SessionReply = self
            .send_json(
                self.http
                    .post(self.url("/upload_video"))
                    .bearer_auth(token)
                    .multipart(form),
                cancel,
            )
            .await?;
        Ok(reply.session_id)
    }

    async fn video_query(
        &self,
        session_id: &str,
        query: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<String> {
        let token = self.bearer()?;
        let reply: AnswerReply = self
            .send_json(
                self.http
                    .post(self.url("/vid_query"))
                    .bearer_auth(token)
                    .json(&serde_json::json!({
                        "session_id": session_id,
                        "query": query,
                    })),
                cancel,
            )
            .await?;
        Ok(reply.answer)
    }

    async fn ocr_extract(
        &self,
        file: FilePayload,
        cancel: &CancellationToken,
    ) -> ClientResult<String> {
        let form = Form::new().part("file", Part::bytes(file.bytes).file_name(file.filename));
        let reply: OcrReply = self
            .send_json(self.http.post(self.url("/upload")).multipart(form), cancel)
            .await?;
        Ok(reply.extracted_text)
    }

    async fn uni_ask(&self, query: &str, cancel: &CancellationToken) -> ClientResult<String> {
        let value: serde_json::Value = self
            .send_json(
                self.http
                    .post(self.url("/llm/ask"))
                    .json(&serde_json::json!({ "query": query })),
                cancel,
            )
            .await?;
        extract_uni_answer(&value)
    }

    async fn grade_process(
        &self,
        student_pdf: FilePayload,
        key_pdf: FilePayload,
        cancel: &CancellationToken,
    ) -> ClientResult<Vec<GradeCard>> {
        // Field names are fixed by the backend contract.
        let form = Form::new()
            .part(
                "student_pdf",
                Part::bytes(student_pdf.bytes).file_name(student_pdf.filename),
            )
            .part(
                "paper_k_pdf",
                Part::bytes(key_pdf.bytes).file_name(key_pdf.filename),
            );

        let reply: GradeReply = self
            .send_json(self.http.post(self.url("/check/process")).multipart(form), cancel)
            .await?;
        Ok(reply.results)
    }

    async fn grade_download(&self, cancel: &CancellationToken) -> ClientResult<Vec<u8>> {
        with_cancel(cancel, async {
            let resp = self.http.get(self.url("/check/download")).send().await?;
            let resp = Self::expect_success(resp).await?;
            Ok(resp.bytes().await?.to_vec())
        })
        .await
    }
}

async fn with_cancel<T, F>(cancel: &CancellationToken, fut: F) -> ClientResult<T>
where
    F: Future<Output = ClientResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ClientError::Cancelled),
        out = fut => out,
    }
}

/// The `/llm/ask` reply carries its text under any of four field names; the
/// first one present wins. `answer` is the preferred name going forward, the
/// other three are a compatibility shim.
fn extract_uni_answer(value: &serde_json::Value) -> ClientResult<String> {
    for key in ["answer", "response", "data", "result"] {
        if let Some(field) = value.get(key) {
            if let Some(text) = field.as_str() {
                if !text.is_empty() {
                    return Ok(text.to_string());
                }
            }
            break;
        }
    }

    let keys = value
        .as_object()
        .map(|obj| obj.keys().cloned().collect())
        .unwrap_or_default();
    Err(ClientError::PayloadMismatch { keys })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn uni_answer_prefers_answer_field() {
        let value = json!({ "answer": "a", "response": "b" });
        assert_eq!(extract_uni_answer(&value).unwrap(), "a");
    }

    #[test]
    fn uni_answer_falls_back_through_known_fields() {
        assert_eq!(extract_uni_answer(&json!({ "data": "hello" })).unwrap(), "hello");
        assert_eq!(extract_uni_answer(&json!({ "result": "r" })).unwrap(), "r");
        assert_eq!(
            extract_uni_answer(&json!({ "response": "resp", "extra": 1 })).unwrap(),
            "resp"
        );
    }

    #[test]
    fn uni_answer_mismatch_reports_received_keys() {
        let err = extract_uni_answer(&json!({ "detail": "oops", "status": "ok" })).unwrap_err();
        match err {
            ClientError::PayloadMismatch { keys } => {
                assert!(keys.contains(&"detail".to_string()));
                assert!(keys.contains(&"status".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn uni_answer_rejects_empty_present_field() {
        let err = extract_uni_answer(&json!({ "answer": "" })).unwrap_err();
        assert!(matches!(err, ClientError::PayloadMismatch { .. }));
    }
}
