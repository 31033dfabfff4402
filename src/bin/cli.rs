//! Terminal client for the agent chat server

use agent_chat::api::{ChatResponse, CreateChatRequest};
use agent_chat::client::{ChatSession, ClientError, HttpMessageStore};
use agent_chat::store::MessageStore;
use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Server base URL
    #[arg(long, env = "AGENT_CHAT_URL", default_value = "http://127.0.0.1:8000")]
    server: String,

    /// Bearer token identifying the user
    #[arg(long, env = "AGENT_CHAT_TOKEN")]
    token: String,

    /// Continue an existing chat instead of creating one
    #[arg(long)]
    chat: Option<String>,

    /// Title of the chat to create
    #[arg(long, default_value = "New chat")]
    title: String,
}

async fn create_chat(http: &reqwest::Client, cli: &Cli) -> Result<String> {
    let response = http
        .post(format!("{}/api/chats", cli.server.trim_end_matches('/')))
        .bearer_auth(&cli.token)
        .json(&CreateChatRequest {
            title: cli.title.clone(),
        })
        .send()
        .await
        .context("Failed to reach server")?;
    if !response.status().is_success() {
        bail!("Could not create chat: {}", response.status());
    }
    let created: ChatResponse = response.json().await?;
    Ok(created.chat.id)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agent_chat=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let http = reqwest::Client::new();
    let store = HttpMessageStore::new(http.clone(), &cli.server, &cli.token);

    let (chat_id, history) = match &cli.chat {
        Some(id) => {
            let history = store
                .list_messages(id)
                .await
                .with_context(|| format!("Failed to load chat {id}"))?;
            (id.clone(), history)
        }
        None => (create_chat(&http, &cli).await?, Vec::new()),
    };
    println!("chat {chat_id} ({} earlier messages), /quit to exit", history.len());

    let mut session =
        ChatSession::new(http, &cli.server, &cli.token, chat_id, store).with_history(&history);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim() == "/quit" {
            break;
        }
        match session.submit(&line).await {
            Ok(reply) => println!("{reply}\n"),
            Err(ClientError::EmptyMessage) => {}
            Err(_) => println!("{}\n", session.render_state().text),
        }
    }

    Ok(())
}
