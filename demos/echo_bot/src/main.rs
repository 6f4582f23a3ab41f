//! Echo Bot Example
//!
//! Connects to the gateway with the token from `GUILDED_TOKEN`, logs every
//! message it sees, and prints a reply line for anything starting with
//! `/echo `.
//!
//! # Usage
//!
//! ```bash
//! GUILDED_TOKEN=... cargo run --package echo-bot
//! ```

use anyhow::Result;
use guilded::prelude::*;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    guilded::logging::init();

    let client = Client::new(ClientConfig::from_env())?;

    client.on("ready", |event| async move {
        if let ClientEvent::Ready { user, .. } = event {
            let user = user.read();
            info!("Logged in as {}", user.name.as_deref().unwrap_or(&user.id));
        }
        Ok(())
    });

    client.on("message", |event| async move {
        let ClientEvent::Message(message) = event else {
            return Ok(());
        };
        let (channel_id, content) = {
            let message = message.read();
            (message.channel_id.clone(), message.content.clone())
        };
        let Some(content) = content else {
            return Ok(());
        };
        info!("[{channel_id}] {content}");
        if let Some(text) = content.strip_prefix("/echo ") {
            println!("echo -> [{channel_id}] {text}");
        }
        Ok(())
    });

    client.on("error", |event| async move {
        if let ClientEvent::Error { message } = event {
            warn!("Client error: {message}");
        }
        Ok(())
    });

    client.run_until_ctrl_c().await
}
