//! Threadroom application composition root
//!
//! Wires the chat domain to its Postgres history store and the configured live
//! channel, and provides the line-oriented presentation used by the local
//! terminal client.

use std::sync::Arc;

use sqlx::PgPool;
use threadroom_chat::{
    ChatRepositories, ChatServices, ChatSession, Identity, Message, UnifiedView,
};
use threadroom_common::Config;
use threadroom_realtime::{LiveChannelFactory, LiveConfig};

/// Characters of a message id shown in the terminal and accepted by `/reply`
pub const SHORT_ID_LEN: usize = 8;

/// Build the chat services from configuration and a database pool
pub fn create_services(pool: PgPool) -> Result<ChatServices, anyhow::Error> {
    let repos = ChatRepositories::new(pool.clone());

    let live_config = LiveConfig::from_env()?;
    let live = LiveChannelFactory::create(live_config, Some(pool))?;

    Ok(ChatServices {
        history: Arc::new(repos.messages.clone()),
        store: Arc::new(repos.messages),
        live: Arc::from(live),
    })
}

/// Join the configured room
pub async fn create_session(config: &Config, pool: PgPool) -> Result<ChatSession, anyhow::Error> {
    let services = create_services(pool)?;
    let session = ChatSession::join(&config.room_name, services, identity_from_config(config)).await?;
    Ok(session)
}

/// The local participant; no profile at all means a guest
pub fn identity_from_config(config: &Config) -> Identity {
    if config.display_name.is_none() && config.email.is_none() {
        Identity::guest()
    } else {
        Identity::signed_in(config.display_name.as_deref(), config.email.as_deref())
    }
}

/// A line typed into the terminal client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Post(String),
    Reply { parent: String, content: String },
    Reload,
    Reconnect,
    Quit,
    Help,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();

        let Some(rest) = line.strip_prefix('/') else {
            return Command::Post(line.to_string());
        };

        let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        match name {
            "reply" => {
                let (parent, content) = args
                    .trim_start()
                    .split_once(char::is_whitespace)
                    .unwrap_or((args.trim(), ""));
                Command::Reply {
                    parent: parent.to_string(),
                    content: content.trim().to_string(),
                }
            }
            "reload" => Command::Reload,
            "reconnect" => Command::Reconnect,
            "quit" | "exit" => Command::Quit,
            "help" => Command::Help,
            other => Command::Unknown(other.to_string()),
        }
    }
}

pub const HELP: &str = "\
  <text>                  post a message
  /reply <id> <text>      reply to a top-level message (id prefix is enough)
  /reload                 re-fetch history
  /reconnect              subscribe again after the live channel gave up
  /quit                   leave the room";

/// Why a `/reply` id could not be used
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplyTargetError {
    #[error("No message matches id {0:?}")]
    NotFound(String),

    #[error("More than one message matches id {0:?}; type more of it")]
    Ambiguous(String),

    #[error("{0} is a reply; replies can only be made to top-level messages")]
    NotTopLevel(String),
}

/// Resolve a full or abbreviated message id to a root that can take replies.
///
/// Only roots are candidates, since the terminal shows one level of nesting.
pub fn resolve_reply_target(view: &UnifiedView, prefix: &str) -> Result<String, ReplyTargetError> {
    if prefix.is_empty() {
        return Err(ReplyTargetError::NotFound(prefix.to_string()));
    }

    let exact = view.roots().iter().find(|m| m.id == prefix);
    if let Some(root) = exact {
        return Ok(root.id.clone());
    }

    let mut matches = view.roots().iter().filter(|m| m.id.starts_with(prefix));
    match (matches.next(), matches.next()) {
        (Some(root), None) => Ok(root.id.clone()),
        (Some(_), Some(_)) => Err(ReplyTargetError::Ambiguous(prefix.to_string())),
        (None, _) => {
            let is_reply = view.find(prefix).is_some()
                || view.iter().any(|m| m.id.starts_with(prefix));
            if is_reply {
                Err(ReplyTargetError::NotTopLevel(prefix.to_string()))
            } else {
                Err(ReplyTargetError::NotFound(prefix.to_string()))
            }
        }
    }
}

/// Render the view as threads: each root followed by its indented replies
pub fn render_view(view: &UnifiedView) -> String {
    let mut out = String::new();
    for thread in view.threads() {
        out.push_str(&render_line(thread.root, ""));
        if thread.root.reply_count > 0 {
            let noun = if thread.root.reply_count == 1 { "reply" } else { "replies" };
            out.push_str(&format!(" ({} {})", thread.root.reply_count, noun));
        }
        out.push('\n');

        for reply in thread.replies {
            out.push_str(&render_line(reply, "    > "));
            out.push('\n');
        }
    }
    out
}

fn render_line(message: &Message, indent: &str) -> String {
    let short_id: String = message.id.chars().take(SHORT_ID_LEN).collect();
    format!(
        "{}[{}] {} {}: {}",
        indent,
        short_id,
        message.created_at.format("%H:%M:%S"),
        message.author.name,
        message.content
    )
}
