use crate::transport::HistoryMessage;
use chrono::Local;
use std::sync::RwLock;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    System,
}

#[derive(Debug, Clone)]
pub struct Message {
    /// Local id, contiguous from 0 within the current log.
    pub id: usize,
    pub role: Role,
    pub text: String,
    pub timestamp: String,
}

/// The persisted projection of the store: active ids only, never message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub bot_id: Option<String>,
    pub chat_id: Option<String>,
}

#[derive(Default)]
struct State {
    bot_id: Option<String>,
    chat_id: Option<String>,
    session_id: Option<String>,
    messages: Vec<Message>,
    draft: String,
}

/// Single source of truth for the active conversation.
///
/// All reads and writes are synchronous; async work happens strictly between
/// store accesses, so observers always see a consistent snapshot. Observers
/// are notified through a revision counter after every write.
pub struct SessionStore {
    state: RwLock<State>,
    revision: watch::Sender<u64>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            state: RwLock::new(State::default()),
            revision,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn notify(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    fn write<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let out = f(&mut self.state.write().unwrap_or_else(std::sync::PoisonError::into_inner));
        self.notify();
        out
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> T {
        f(&self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner))
    }


    pub fn set_active_bot(&self, bot_id: &str) {
        self.write(|s| s.bot_id = Some(bot_id.to_string()));
    }

    /// Clearing the bot also clears the chat: a chat id is meaningless
    /// without its owning bot.
    pub fn clear_active_bot(&self) {
        self.write(|s| {
            s.bot_id = None;
            s.chat_id = None;
        });
    }

    pub fn set_active_chat(&self, chat_id: &str) {
        self.write(|s| s.chat_id = Some(chat_id.to_string()));
    }

    pub fn set_active_session(&self, session_id: &str) {
        self.write(|s| s.session_id = Some(session_id.to_string()));
    }

    pub fn active_bot(&self) -> Option<String> {
        self.read(|s| s.bot_id.clone())
    }

    pub fn active_chat(&self) -> Option<String> {
        self.read(|s| s.chat_id.clone())
    }

    pub fn active_session(&self) -> Option<String> {
        self.read(|s| s.session_id.clone())
    }


    /// Appends a message and returns its local id (= previous log length).
    pub fn append_message(&self, role: Role, text: &str) -> usize {
        self.write(|s| {
            let id = s.messages.len();
            s.messages.push(Message {
                id,
                role,
                text: text.to_string(),
                timestamp: Local::now().format("%H:%M:%S").to_string(),
            });
            id
        })
    }

    /// Appends `token` to the message `id`, but only while it is still the
    /// highest-id message and a system message. Returns false once the target
    /// is gone so the caller can release its stream.
    pub fn append_to_system(&self, id: usize, token: &str) -> bool {
        self.write(|s| match s.messages.last_mut() {
            Some(last) if last.id == id && last.role == Role::System => {
                last.text.push_str(token);
                true
            }
            _ => false,
        })
    }

    /// Replaces the text of the last system message (error notices). Same
    /// target rule as [`append_to_system`].
    pub fn set_system_text(&self, id: usize, text: &str) -> bool {
        self.write(|s| match s.messages.last_mut() {
            Some(last) if last.id == id && last.role == Role::System => {
                last.text = text.to_string();
                true
            }
            _ => false,
        })
    }

    /// Replaces the whole log with persisted history; local ids restart at 0.
    pub fn replace_log(&self, history: &[HistoryMessage]) {
        self.write(|s| {
            s.messages = history
                .iter()
                .enumerate()
                .map(|(id, msg)| Message {
                    id,
                    role: if msg.sender == "user" {
                        Role::User
                    } else {
                        Role::System
                    },
                    text: msg.text.clone(),
                    timestamp: msg
                        .timestamp
                        .clone()
                        .unwrap_or_else(|| Local::now().format("%H:%M:%S").to_string()),
                })
                .collect();
        });
    }

    pub fn clear_log(&self) {
        self.write(|s| s.messages.clear());
    }

    pub fn messages(&self) -> Vec<Message> {
        self.read(|s| s.messages.clone())
    }

    pub fn message_count(&self) -> usize {
        self.read(|s| s.messages.len())
    }


    pub fn set_draft(&self, text: &str) {
        self.write(|s| s.draft = text.to_string());
    }

    pub fn take_draft(&self) -> String {
        self.write(|s| std::mem::take(&mut s.draft))
    }

    pub fn draft(&self) -> String {
        self.read(|s| s.draft.clone())
    }


    pub fn snapshot(&self) -> Snapshot {
        self.read(|s| Snapshot {
            bot_id: s.bot_id.clone(),
            chat_id: s.chat_id.clone(),
        })
    }

    pub fn reset(&self) {
        self.write(|s| *s = State::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appended_ids_are_contiguous_from_zero() {
        let store = SessionStore::new();
        assert_eq!(store.append_message(Role::User, "q1"), 0);
        assert_eq!(store.append_message(Role::System, "a1"), 1);
        assert_eq!(store.append_message(Role::User, "q2"), 2);

        let ids: Vec<usize> = store.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn clearing_bot_clears_chat() {
        let store = SessionStore::new();
        store.set_active_bot("b1");
        store.set_active_chat("c1");
        store.clear_active_bot();
        assert!(store.active_bot().is_none());
        assert!(store.active_chat().is_none());
    }

    #[test]
    fn only_last_system_message_is_mutable() {
        let store = SessionStore::new();
        let user = store.append_message(Role::User, "q");
        let system = store.append_message(Role::System, "");

        assert!(store.append_to_system(system, "tok"));
        assert!(!store.append_to_system(user, "tok"));

        // Once another message lands, the old target is frozen.
        store.append_message(Role::User, "q2");
        assert!(!store.append_to_system(system, "more"));
        assert_eq!(store.messages()[system].text, "tok");
    }

    #[test]
    fn replace_log_reassigns_ids_from_zero() {
        let store = SessionStore::new();
        store.append_message(Role::User, "old");
        store.replace_log(&[
            HistoryMessage {
                sender: "user".into(),
                text: "hi".into(),
                timestamp: Some("10:00:00".into()),
            },
            HistoryMessage {
                sender: "system".into(),
                text: "hello".into(),
                timestamp: None,
            },
        ]);

        let messages = store.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, 0);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].id, 1);
        assert_eq!(messages[1].role, Role::System);
    }

    #[test]
    fn snapshot_carries_ids_only() {
        let store = SessionStore::new();
        store.set_active_bot("b1");
        store.set_active_chat("c1");
        store.append_message(Role::User, "secret text");

        let snapshot = store.snapshot();
        assert_eq!(snapshot.bot_id.as_deref(), Some("b1"));
        assert_eq!(snapshot.chat_id.as_deref(), Some("c1"));
    }

    #[test]
    fn reset_is_idempotent() {
        let store = SessionStore::new();
        store.set_active_bot("b1");
        store.set_active_session("s1");
        store.append_message(Role::User, "q");
        store.set_draft("draft");

        store.reset();
        let first = (store.snapshot(), store.message_count(), store.draft());
        store.reset();
        let second = (store.snapshot(), store.message_count(), store.draft());

        assert_eq!(first, second);
        assert_eq!(first.0, Snapshot { bot_id: None, chat_id: None });
        assert_eq!(first.1, 0);
        assert!(first.2.is_empty());
    }

    #[test]
    fn observers_are_notified_on_writes() {
        let store = SessionStore::new();
        let rx = store.subscribe();
        let before = *rx.borrow();
        store.append_message(Role::User, "q");
        store.set_draft("d");
        assert_eq!(*rx.borrow(), before + 2);
    }
}
