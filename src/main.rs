use std::sync::Arc;

use chatsync::app::App;
use chatsync::cli::Command;
use chatsync::config::{Configuration, init_logger, verbose};
use chatsync::models::TransportEvent;
use chatsync::session::new_session;
use eyre::{Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Command::new();
    if cmd.version() {
        cmd.print_version();
        return Ok(());
    }

    std::panic::set_hook(Box::new(|panic_info| {
        better_panic::Settings::auto().create_panic_handler()(panic_info);
    }));

    let config = cmd.get_config()?;
    init_logger(&config.log)?;
    Configuration::init(config.clone())?;
    verbose!("[+] Logger initialized");

    let Some(conversation_id) = cmd.conversation() else {
        eyre::bail!("No conversation specified");
    };

    let user_id = match cmd.user() {
        "" => uuid::Uuid::new_v4().to_string(),
        user => user.to_string(),
    };

    verbose!("[+] Initializing session...");
    let (event_tx, event_rx) = mpsc::unbounded_channel::<TransportEvent>();
    let session = new_session(&config, conversation_id, &user_id, Arc::new(event_tx))
        .await
        .wrap_err("initializing session")?;
    verbose!("[+] Session initialized");

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    let mut app = App::new(session, event_rx, token.clone());
    if let Err(err) = app.run().await {
        eprintln!("Error: {}", err);
        log::error!("App error: {:?}", err);
    }

    token.cancel();
    Ok(())
}
