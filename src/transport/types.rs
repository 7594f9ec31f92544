use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct InitializeBotReply {
    pub bot_id: String,
}

#[derive(Debug, Deserialize)]
pub struct NewChatReply {
    pub chat_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListChatsReply {
    #[serde(default)]
    pub chat_ids: Vec<String>,
}

/// One persisted message as returned by `GET /chat_history/<chat_id>`.
///
/// The backend stores Mongo documents; only the fields the client renders are
/// decoded, everything else is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryMessage {
    pub sender: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QueryReply {
    pub response: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionReply {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AnswerReply {
    pub answer: String,
}

#[derive(Debug, Deserialize)]
pub struct OcrReply {
    #[serde(default)]
    pub extracted_text: String,
}

/// A single grading result card. The card layout is owned by the backend and
/// rendered verbatim, so it stays schemaless here.
pub type GradeCard = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Default, Deserialize)]
pub struct GradeReply {
    #[serde(default)]
    pub results: Vec<GradeCard>,
}

#[derive(Debug, Deserialize)]
pub struct LoginReply {
    pub access_token: String,
    pub refresh_token: String,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}
