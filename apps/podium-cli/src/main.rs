use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use podium_realtime::{RealtimeEvent, RealtimeHub, Subscription, Topic, Transport};
use podium_store::{
    ConversationApi, ConversationId, LogStore, MessageApi, NewNotification, StoreConfig, UserId,
};
use podium_sync::{SessionAuth, SyncConfig, SyncSession};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Podium messaging sync driver", long_about = None)]
struct Args {
    /// SQLite database file (overrides the config file)
    #[arg(long)]
    db: Option<PathBuf>,

    /// JSON file with `store` and `sync` sections
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Walk an organizer and a speaker through a short exchange
    Demo,
    /// Add or rename a participant
    Register {
        id: String,
        name: String,
        #[arg(long, default_value = "speaker")]
        role: String,
    },
    /// Show conversations, notifications and badges for a user
    Inbox {
        #[arg(long)]
        user: String,
    },
    /// Write a message as `from` into the conversation with `to`
    Send {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        body: String,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CliConfig {
    store: StoreConfig,
    sync: SyncConfig,
}

fn load_config(args: &Args) -> Result<CliConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => CliConfig::default(),
    };
    if let Some(db) = &args.db {
        config.store.db_path = db.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    let args = Args::parse();
    let mut config = load_config(&args)?;

    if matches!(args.command, Command::Demo) && args.db.is_none() && args.config.is_none() {
        config.store.db_path =
            std::env::temp_dir().join(format!("podium-demo-{}.db", std::process::id()));
    }
    info!("Using database {}", config.store.db_path.display());

    let store = Arc::new(LogStore::new(config.store.clone()).await?);
    let hub = RealtimeHub::new();
    hub.attach(store.changes());

    match args.command {
        Command::Demo => demo(store, hub, config.sync).await,
        Command::Register { id, name, role } => {
            store
                .profiles()
                .upsert_user(&UserId::from(id.as_str()), &name, &role)
                .await?;
            println!("Registered {} as {} ({})", id, name, role);
            Ok(())
        }
        Command::Inbox { user } => inbox(store, hub, config.sync, UserId::from(user)).await,
        Command::Send { from, to, body } => {
            let from = UserId::from(from);
            let to = UserId::from(to);
            let conversation = store.get_or_create(&from, &to).await?;
            let message = store.create(&conversation, &from, &body).await?;
            println!("Sent {} in {}", message.id, conversation);
            Ok(())
        }
    }
}

async fn start_session(
    store: &Arc<LogStore>,
    hub: &RealtimeHub,
    config: SyncConfig,
    user: &UserId,
) -> Result<SyncSession> {
    let auth = Arc::new(SessionAuth::signed_in(user.clone()));
    let session = SyncSession::start(auth, store.clone(), Arc::new(hub.clone()), config)
        .await
        .with_context(|| format!("Failed to start session for {}", user))?;
    Ok(session)
}

async fn print_inbox(session: &SyncSession) {
    let badges = session.badges();
    println!(
        "== {} | {} unread messages, {} unread notifications",
        session.viewer(),
        badges.messages,
        badges.notifications
    );
    for conversation in session.conversations().await {
        println!(
            "  [{}] {} ({} unread): {}",
            conversation.id,
            conversation.display_name,
            conversation.unread_count,
            conversation.preview.as_deref().unwrap_or("-")
        );
    }
    for notification in session.notifications().await {
        let marker = if notification.is_read { " " } else { "*" };
        println!("  {} {}: {}", marker, notification.title, notification.body);
    }
}

async fn inbox(store: Arc<LogStore>, hub: RealtimeHub, config: SyncConfig, user: UserId) -> Result<()> {
    let session = start_session(&store, &hub, config, &user).await?;
    print_inbox(&session).await;
    session.end().await;
    Ok(())
}

async fn demo(store: Arc<LogStore>, hub: RealtimeHub, config: SyncConfig) -> Result<()> {
    let ada = UserId::from("ada");
    let grace = UserId::from("grace");
    store
        .profiles()
        .upsert_user(&ada, "Ada (organizer)", "organizer")
        .await?;
    store
        .profiles()
        .upsert_user(&grace, "Grace (speaker)", "speaker")
        .await?;

    let organizer = start_session(&store, &hub, config.clone(), &ada).await?;
    let speaker = start_session(&store, &hub, config, &grace).await?;

    let conversation = speaker.open_direct(&ada).await?;
    let transcript = live_transcript(&hub, &conversation);
    speaker
        .send_message(&conversation, "Hi Ada, are you still looking for a keynote?")
        .await?;
    speaker.settle().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    organizer.settle().await;

    println!("Before opening the conversation:");
    print_inbox(&organizer).await;

    organizer.open_conversation(&conversation).await?;
    organizer
        .send_message(&conversation, "Yes! Does the 12th work for you?")
        .await?;
    organizer.settle().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    speaker.settle().await;

    println!("\nAfter Ada replied:");
    print_inbox(&organizer).await;
    if let Some(messages) = speaker.messages(&conversation).await {
        for message in messages {
            println!("  {}: {}", message.sender_id, message.body);
        }
    }

    store
        .push_notification(
            &ada,
            NewNotification {
                kind: "booking".to_string(),
                title: "Booking request".to_string(),
                body: "Grace sent a booking request for the 12th".to_string(),
                href: Some("/bookings".to_string()),
                ..Default::default()
            },
        )
        .await?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    organizer.settle().await;

    println!("\nAfter a booking notification:");
    print_inbox(&organizer).await;

    organizer.mark_all_notifications_read().await?;
    organizer.settle().await;
    println!("\nAfter marking everything read:");
    print_inbox(&organizer).await;

    transcript.unsubscribe();
    organizer.end().await;
    speaker.end().await;
    Ok(())
}

/// Print every message written to `conversation` as it arrives
fn live_transcript(hub: &RealtimeHub, conversation: &ConversationId) -> Subscription {
    hub.subscribe(
        Topic::Conversation(conversation.clone()),
        Arc::new(|event: RealtimeEvent| match event.message() {
            Ok(message) => println!("  (live) {}: {}", message.sender_id, message.body),
            Err(e) => warn!("Skipping transcript event: {}", e),
        }),
    )
}
