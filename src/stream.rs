use crate::session::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Splits text into alternating word and whitespace runs, so that
/// concatenating the tokens reproduces the input exactly.
pub fn split_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_whitespace = None;

    for ch in text.chars() {
        let ws = ch.is_whitespace();
        if in_whitespace != Some(ws) && !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        in_whitespace = Some(ws);
        current.push(ch);
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Handle to a running typing-effect stream.
pub struct StreamHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl StreamHandle {
    /// Stops the stream, leaving whatever partial text has been emitted.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn wait(self) {
        let _ = self.task.await;
    }
}

/// Appends `text` token by token to message `message_id` at the given
/// cadence. Purely decorative: the transcript converges to `text` whether or
/// not the caller ever observes intermediate states.
///
/// Releases early when cancelled or when the target stops being the last
/// system message; neither case mutates the store further.
pub fn stream_into(
    store: Arc<SessionStore>,
    message_id: usize,
    text: String,
    cadence: Duration,
) -> StreamHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let task = tokio::spawn(async move {
        let tokens = split_tokens(&text);
        if tokens.is_empty() {
            return;
        }

        let mut interval = tokio::time::interval(cadence);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        for piece in tokens {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("Stream cancelled at message {}", message_id);
                    return;
                }
                _ = interval.tick() => {}
            }
            if !store.append_to_system(message_id, &piece) {
                debug!("Stream target {} no longer mutable, releasing", message_id);
                return;
            }
        }
    });

    StreamHandle { cancel, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;

    const FAST: Duration = Duration::from_millis(1);

    #[test]
    fn tokens_concatenate_back_to_input() {
        for text in ["", "one", "one two", "  leading\tand\n\ntrailing  ", "a  b"] {
            assert_eq!(split_tokens(text).concat(), text);
        }
    }

    #[test]
    fn whitespace_runs_are_separate_tokens() {
        assert_eq!(split_tokens("a  b"), vec!["a", "  ", "b"]);
        assert_eq!(split_tokens(" x"), vec![" ", "x"]);
    }

    #[tokio::test]
    async fn streamed_text_converges_to_input() {
        let store = Arc::new(SessionStore::new());
        store.append_message(Role::User, "q");
        let id = store.append_message(Role::System, "");

        let answer = "The answer,\n  with   internal whitespace.";
        stream_into(store.clone(), id, answer.to_string(), FAST)
            .wait()
            .await;

        assert_eq!(store.messages()[id].text, answer);
    }

    #[tokio::test]
    async fn empty_answer_releases_immediately() {
        let store = Arc::new(SessionStore::new());
        let id = store.append_message(Role::System, "");

        stream_into(store.clone(), id, String::new(), FAST).wait().await;
        assert_eq!(store.messages()[id].text, "");
    }

    #[tokio::test]
    async fn cancellation_keeps_partial_text_and_stops_mutation() {
        let store = Arc::new(SessionStore::new());
        let id = store.append_message(Role::System, "");

        let handle = stream_into(
            store.clone(),
            id,
            "one two three four five".to_string(),
            Duration::from_millis(20),
        );
        tokio::time::sleep(Duration::from_millis(35)).await;
        handle.cancel();
        handle.wait().await;

        let partial = store.messages()[id].text.clone();
        let full = "one two three four five";
        assert!(full.starts_with(&partial));
        assert_ne!(partial, full);

        // No further writes after release.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.messages()[id].text, partial);
    }

    #[tokio::test]
    async fn releases_when_target_is_no_longer_last() {
        let store = Arc::new(SessionStore::new());
        let id = store.append_message(Role::System, "");
        store.append_message(Role::User, "interloper");

        stream_into(store.clone(), id, "never lands".to_string(), FAST)
            .wait()
            .await;
        assert_eq!(store.messages()[id].text, "");
    }
}
