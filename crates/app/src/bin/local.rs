// Threadroom - Local Terminal Client

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

use sqlx::PgPool;
use threadroom_app::{resolve_reply_target, Command, HELP};
use threadroom_chat::{ChatSession, ConnectionState, SendOutcome};
use threadroom_common::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they do not interleave with the rendered room.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    info!("Starting Threadroom local client");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(room = %config.room_name, "Configuration loaded successfully");

    let pool = PgPool::connect(&config.database_url).await.map_err(|e| {
        error!("Failed to connect to database: {}", e);
        anyhow::anyhow!("Database connection failed: {}", e)
    })?;

    sqlx::migrate!("../../migrations").run(&pool).await?;

    info!("Database connection established");

    let session = Arc::new(
        threadroom_app::create_session(&config, pool)
            .await
            .map_err(|e| {
                error!("Failed to join room: {}", e);
                e
            })?,
    );

    let renderer = tokio::spawn(render_updates(Arc::clone(&session)));

    println!("Joined {}. Type /help for commands.", session.room());

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !handle_line(&session, &line).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = &mut shutdown => break,
        }
    }

    session.leave().await;
    renderer.abort();

    info!("Left room; shutdown complete");
    Ok(())
}

/// Returns `false` when the user asked to quit
async fn handle_line(session: &ChatSession, line: &str) -> bool {
    match Command::parse(line) {
        Command::Post(content) => report(session.send(&content, None)),
        Command::Reply { parent, content } => {
            match resolve_reply_target(&session.view(), &parent) {
                Ok(parent_id) => report(session.send(&content, Some(&parent_id))),
                Err(e) => println!("{}", e),
            }
        }
        Command::Reload => session.reload_history().await,
        Command::Reconnect => {
            if !session.reconnect().await {
                println!("Already connected, or the live channel is still unavailable");
            }
        }
        Command::Help => println!("{}", HELP),
        Command::Unknown(name) => println!("Unknown command /{}; try /help", name),
        Command::Quit => return false,
    }
    true
}

fn report(outcome: SendOutcome) {
    match outcome {
        SendOutcome::Sent(_) | SendOutcome::EmptyContent => {}
        SendOutcome::NotConnected => println!("Not connected; message not sent"),
        SendOutcome::NotAuthenticated => {
            println!("Please sign in to chat (set CHAT_DISPLAY_NAME or CHAT_EMAIL)")
        }
        SendOutcome::Invalid(reason) => println!("Message rejected: {}", reason),
        SendOutcome::Closed => warn!("Send after leaving the room"),
    }
}

/// Redraw the room whenever the view or connection state changes
async fn render_updates(session: Arc<ChatSession>) {
    let mut updates = session.subscribe();
    let mut last_state = ConnectionState::Disconnected;
    let mut last_error = None;
    let mut last_view = None;

    while updates.changed().await.is_ok() {
        let snapshot = updates.borrow_and_update().clone();

        if snapshot.state != last_state {
            println!("-- {} --", snapshot.state);
            last_state = snapshot.state;
        }

        if snapshot.load_error != last_error {
            if let Some(error) = &snapshot.load_error {
                println!("-- history unavailable: {} --", error);
            }
            last_error = snapshot.load_error.clone();
        }

        let changed = last_view
            .as_ref()
            .map_or(true, |view| !Arc::ptr_eq(view, &snapshot.view));
        if changed && !snapshot.loading {
            print!("{}", threadroom_app::render_view(&snapshot.view));
            last_view = Some(Arc::clone(&snapshot.view));
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, leaving room");
        },
        _ = terminate => {
            info!("Received terminate signal, leaving room");
        },
    }
}
