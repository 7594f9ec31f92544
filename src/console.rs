//! Line-oriented terminal front end. Deliberately thin: all conversation
//! state lives in the session store and the flow controllers.

use crate::config::Config;
use crate::error::{ClientError, ClientResult};
use crate::flows::{DocStep, DocumentRagFlow, NoRagFlow, UniBotFlow, VideoRagFlow};
use crate::grading::GradingSession;
use crate::session::{Role, SessionStore};
use crate::transport::{Api, FilePayload, HttpApi};
use crate::{auth, session};
use anyhow::Result;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::error;

pub async fn run(config: &Config, api: Arc<HttpApi>, flow_name: &str) -> Result<()> {
    match flow_name {
        "rag" => run_document(config, api).await,
        "chat" => run_norag(api).await,
        "video" => run_video(config, api).await,
        "uni" => run_uni(config, api).await,
        "check" => run_grading(config, api).await,
        "login" => run_login(config, api).await,
        "signup" => run_signup(api).await,
        "profile" => run_profile(api).await,
        "review" => run_review(api).await,
        "contact" => run_contact(api).await,
        "logout" => {
            api.clear_auth();
            auth::clear(&config.data_dir).await?;
            session::clear_snapshot(&config.data_dir).await?;
            println!("Logged out.");
            Ok(())
        }
        other => {
            anyhow::bail!(
                "Unknown flow '{other}'. Use: rag | chat | video | uni | check | login | signup | profile | review | contact | logout"
            );
        }
    }
}

async fn read_line(prompt: &str) -> Option<String> {
    print!("{prompt}");
    std::io::stdout().flush().ok();
    let mut line = String::new();
    let mut reader = BufReader::new(tokio::io::stdin());
    match reader.read_line(&mut line).await {
        Ok(0) => None,
        Ok(_) => Some(line.trim_end_matches(['\n', '\r']).to_string()),
        Err(_) => None,
    }
}

fn print_log(store: &SessionStore) {
    for msg in store.messages() {
        let who = match msg.role {
            Role::User => "you",
            Role::System => "bot",
        };
        println!("[{}] {}: {}", msg.timestamp, who, msg.text);
    }
}

fn report(result: ClientResult<()>) {
    match result {
        Ok(()) => {}
        Err(ClientError::Cancelled) => {}
        Err(err) => {
            error!("{}", err);
            println!("! {err}");
        }
    }
}

/// Prints the tail of message `id` as the renderer appends to it.
async fn print_stream(store: &Arc<SessionStore>, id: usize, wait: impl Future<Output = ()>) {
    let mut rx = store.subscribe();
    let mut printed = 0usize;
    let mut wait = std::pin::pin!(wait);

    let flush_tail = |printed: &mut usize| {
        if let Some(msg) = store.messages().get(id)
            && msg.text.len() > *printed
        {
            print!("{}", &msg.text[*printed..]);
            std::io::stdout().flush().ok();
            *printed = msg.text.len();
        }
    };

    loop {
        tokio::select! {
            _ = &mut wait => {
                flush_tail(&mut printed);
                println!();
                break;
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                flush_tail(&mut printed);
            }
        }
    }
}

async fn load_file(path: &str) -> ClientResult<FilePayload> {
    FilePayload::from_path(Path::new(path)).await
}

async fn run_document(config: &Config, api: Arc<HttpApi>) -> Result<()> {
    let store = Arc::new(SessionStore::new());
    let mut flow = DocumentRagFlow::new(
        api,
        store.clone(),
        config.data_dir.clone(),
        config.stream_cadence,
    );
    report(flow.resume().await);
    if flow.step() == DocStep::ChatScreen {
        print_log(&store);
    }

    println!("Document-RAG chat. Commands: /bot <task>, /upload <file>, /new, /chats, /open <chat_id>, /ocr <file>, /send, /reset, /quit");
    while let Some(line) = read_line("> ").await {
        let line = line.trim();
        match line.split_once(' ').map_or((line, ""), |(a, b)| (a, b.trim())) {
            ("/quit", _) => break,
            ("/reset", _) => flow.reset().await,
            ("/bot", task) => report(flow.new_bot(task).await),
            ("/upload", path) => match load_file(path).await {
                Ok(file) => report(flow.upload_knowledge(file).await),
                Err(err) => report(Err(err)),
            },
            ("/new", _) => report(flow.new_chat().await),
            ("/chats", _) => match flow.list_chats().await {
                Ok(chats) => chats.iter().for_each(|c| println!("Chat: {c}")),
                Err(err) => report(Err(err)),
            },
            ("/open", chat_id) => {
                report(flow.select_chat(chat_id).await);
                print_log(&store);
            }
            ("/ocr", path) => match load_file(path).await {
                Ok(file) => {
                    report(flow.ocr(file).await);
                    println!("draft: {}", store.draft());
                }
                Err(err) => report(Err(err)),
            },
            ("/send", _) | ("", _) => {
                let draft = store.take_draft();
                send_document(&mut flow, &store, &draft).await;
            }
            _ => send_document(&mut flow, &store, line).await,
        }
    }
    flow.dispose();
    Ok(())
}

async fn send_document(flow: &mut DocumentRagFlow, store: &Arc<SessionStore>, text: &str) {
    match flow.send(text).await {
        Ok(()) => {
            let id = store.message_count().saturating_sub(1);
            print_stream(store, id, flow.wait_stream()).await;
        }
        Err(err) => report(Err(err)),
    }
}

async fn run_norag(api: Arc<HttpApi>) -> Result<()> {
    let store = Arc::new(SessionStore::new());
    let mut flow = NoRagFlow::new(api, store.clone());

    println!("No-RAG chat. Commands: /new, /ocr <file>, /send, /reset, /quit");
    while let Some(line) = read_line("> ").await {
        let line = line.trim();
        match line.split_once(' ').map_or((line, ""), |(a, b)| (a, b.trim())) {
            ("/quit", _) => break,
            ("/new", _) => report(flow.new_session().await),
            ("/reset", _) => flow.reset(),
            ("/ocr", path) => match load_file(path).await {
                Ok(file) => {
                    report(flow.ocr(file).await);
                    println!("draft: {}", store.draft());
                }
                Err(err) => report(Err(err)),
            },
            ("/send", _) | ("", _) => {
                let draft = store.take_draft();
                report(flow.send(&draft).await);
                print_log(&store);
            }
            _ => {
                report(flow.send(line).await);
                if let Some(last) = store.messages().last() {
                    println!("bot: {}", last.text);
                }
            }
        }
    }
    flow.dispose();
    Ok(())
}

async fn run_video(config: &Config, api: Arc<HttpApi>) -> Result<()> {
    let store = Arc::new(SessionStore::new());
    let mut flow = VideoRagFlow::new(api, store.clone(), config.stream_cadence);

    println!("Video-RAG chat. Commands: /url <youtube_url>, /upload <file>, /ocr <file>, /send, /reset, /quit");
    while let Some(line) = read_line("> ").await {
        let line = line.trim();
        match line.split_once(' ').map_or((line, ""), |(a, b)| (a, b.trim())) {
            ("/quit", _) => break,
            ("/url", url) => {
                report(flow.transcribe_url(url).await);
                print_log(&store);
            }
            ("/upload", path) => match load_file(path).await {
                Ok(file) => {
                    report(flow.upload_video(file).await);
                    print_log(&store);
                }
                Err(err) => report(Err(err)),
            },
            ("/ocr", path) => match load_file(path).await {
                Ok(file) => {
                    report(flow.ocr(file).await);
                    println!("draft: {}", store.draft());
                }
                Err(err) => report(Err(err)),
            },
            ("/reset", _) => flow.reset(),
            ("/send", _) | ("", _) => {
                let draft = store.take_draft();
                send_video(&mut flow, &store, &draft).await;
            }
            _ => send_video(&mut flow, &store, line).await,
        }
    }
    flow.dispose();
    Ok(())
}

async fn send_video(flow: &mut VideoRagFlow, store: &Arc<SessionStore>, text: &str) {
    match flow.send(text).await {
        Ok(()) => {
            let id = store.message_count().saturating_sub(1);
            print_stream(store, id, flow.wait_stream()).await;
        }
        Err(err) => report(Err(err)),
    }
}

async fn run_uni(config: &Config, api: Arc<HttpApi>) -> Result<()> {
    let store = Arc::new(SessionStore::new());
    let mut flow = UniBotFlow::new(api, store.clone(), config.stream_cadence);

    println!("University Q&A. Commands: /ocr <file>, /send, /reset, /quit");
    while let Some(line) = read_line("> ").await {
        let line = line.trim();
        match line.split_once(' ').map_or((line, ""), |(a, b)| (a, b.trim())) {
            ("/quit", _) => break,
            ("/reset", _) => flow.reset(),
            ("/ocr", path) => match load_file(path).await {
                Ok(file) => {
                    report(flow.ocr(file).await);
                    println!("draft: {}", store.draft());
                }
                Err(err) => report(Err(err)),
            },
            ("/send", _) | ("", _) => {
                let draft = store.take_draft();
                ask_uni(&mut flow, &store, &draft).await;
            }
            _ => ask_uni(&mut flow, &store, line).await,
        }
    }
    flow.dispose();
    Ok(())
}

async fn ask_uni(flow: &mut UniBotFlow, store: &Arc<SessionStore>, text: &str) {
    match flow.ask(text).await {
        Ok(()) => {
            let id = store.message_count().saturating_sub(1);
            print_stream(store, id, flow.wait_stream()).await;
        }
        Err(err) => report(Err(err)),
    }
}

async fn run_grading(config: &Config, api: Arc<HttpApi>) -> Result<()> {
    let mut grading = GradingSession::new(api as Arc<dyn Api>, config.data_dir.clone());

    println!("Grading. Commands: /student <pdf>, /key <pdf>, /process, /download, /reset, /quit");
    while let Some(line) = read_line("> ").await {
        let line = line.trim();
        match line.split_once(' ').map_or((line, ""), |(a, b)| (a, b.trim())) {
            ("/quit", _) => break,
            ("/student", path) => match load_file(path).await {
                Ok(file) => report(grading.set_student_pdf(file)),
                Err(err) => report(Err(err)),
            },
            ("/key", path) => match load_file(path).await {
                Ok(file) => report(grading.set_key_pdf(file)),
                Err(err) => report(Err(err)),
            },
            ("/process", _) => match grading.process().await {
                Ok(()) => {
                    for card in grading.results().unwrap_or_default() {
                        println!("{}", serde_json::Value::Object(card.clone()));
                    }
                }
                Err(err) => report(Err(err)),
            },
            ("/download", _) => match grading.download().await {
                Ok(path) => println!("Saved {}", path.display()),
                Err(err) => report(Err(err)),
            },
            ("/reset", _) => grading.reset(),
            _ => println!("Unknown command"),
        }
    }
    grading.dispose();
    Ok(())
}

async fn run_login(config: &Config, api: Arc<HttpApi>) -> Result<()> {
    let Some(username) = read_line("username: ").await else {
        return Ok(());
    };
    let Some(password) = read_line("password: ").await else {
        return Ok(());
    };

    let cancel = CancellationToken::new();
    match api.login(username.trim(), password.trim(), &cancel).await {
        Ok(ctx) => {
            auth::save(&config.data_dir, &ctx).await?;
            println!("Welcome, {}.", ctx.name);
        }
        Err(err) => println!("! {err}"),
    }
    Ok(())
}

async fn run_signup(api: Arc<HttpApi>) -> Result<()> {
    let (Some(name), Some(email)) = (read_line("name: ").await, read_line("email: ").await) else {
        return Ok(());
    };
    let (Some(password), Some(confirm)) = (
        read_line("password: ").await,
        read_line("confirm password: ").await,
    ) else {
        return Ok(());
    };
    if password != confirm {
        println!("! Passwords do not match");
        return Ok(());
    }
    let avatar = match read_line("avatar file (optional): ").await.as_deref() {
        Some("") | None => None,
        Some(path) => Some(load_file(path).await?),
    };

    let cancel = CancellationToken::new();
    match api
        .signup(name.trim(), email.trim(), &password, avatar, &cancel)
        .await
    {
        Ok(()) => println!("Account created; you can log in now."),
        Err(err) => println!("! {err}"),
    }
    Ok(())
}

async fn run_profile(api: Arc<HttpApi>) -> Result<()> {
    let cancel = CancellationToken::new();
    let profile = match api.user_data(&cancel).await {
        Ok(profile) => profile,
        Err(err) => {
            println!("! {err}");
            return Ok(());
        }
    };
    println!("name: {}", profile.name);
    if let Some(email) = &profile.email {
        println!("email: {email}");
    }
    if let Some(reference) = &profile.avatar {
        let bytes = api.avatar(reference, &cancel).await.unwrap_or_default();
        println!("avatar: {reference} ({} bytes)", bytes.len());
    }

    if let Some(name) = read_line("new display name (blank to keep): ").await
        && !name.trim().is_empty()
    {
        let fields = [("name", name.trim().to_string())];
        match api.user_update(&fields, None, &cancel).await {
            Ok(()) => println!("Profile updated."),
            Err(err) => println!("! {err}"),
        }
    }
    Ok(())
}

async fn run_review(api: Arc<HttpApi>) -> Result<()> {
    let Some(review) = read_line("review: ").await else {
        return Ok(());
    };
    let cancel = CancellationToken::new();
    match api.send_review(review.trim(), &cancel).await {
        Ok(()) => println!("Thanks for the review."),
        Err(err) => println!("! {err}"),
    }
    Ok(())
}

async fn run_contact(api: Arc<HttpApi>) -> Result<()> {
    let (Some(first), Some(last)) = (
        read_line("first name: ").await,
        read_line("last name: ").await,
    ) else {
        return Ok(());
    };
    let (Some(email), Some(message)) =
        (read_line("email: ").await, read_line("message: ").await)
    else {
        return Ok(());
    };

    let cancel = CancellationToken::new();
    match api
        .send_contact(first.trim(), last.trim(), email.trim(), message.trim(), &cancel)
        .await
    {
        Ok(()) => println!("Message sent."),
        Err(err) => println!("! {err}"),
    }
    Ok(())
}
