use anyhow::Context;
use args::Args;
use clap::Parser;
use control::{ControlConfig, Dispatcher, ListingLimits};
use host::ShellHost;
use log::{info, warn};
use russh::keys::ssh_key::rand_core::OsRng;
use russh::server::Server as _;
use server::{Server, ServerConfig};
use state_store::{DEFAULT_PASSWORD, StateStore};
use std::sync::Arc;
use std::time::Duration;

mod args;
mod control;
mod file_info;
mod host;
mod server;
mod ssh_session;
mod state_store;
mod terminal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parsing degli argomenti da linea di comando
    let args = Args::parse();

    env_logger::builder().filter_level(args.log_level).init();

    let store = StateStore::load(&args.state_file)
        .with_context(|| format!("cannot load state file {:?}", args.state_file))?;
    info!("State file: {:?}", args.state_file);
    info!("Allowed users: {}", store.allowed_users().len());
    if store.verify_password(DEFAULT_PASSWORD) {
        warn!("The access password is still the default one, change it from the settings menu");
    }

    let limits = ListingLimits::new(args.inline_lines, args.selectable_controls);
    info!(
        "Listing limits: {} inline lines, {} selectable",
        limits.inline, limits.selectable
    );
    info!("Max transfer size: {} bytes", args.max_send_size);

    let host = ShellHost::new(Duration::from_secs(args.action_timeout_secs));
    let dispatcher = Dispatcher::new(
        ControlConfig {
            limits,
            max_send_size: args.max_send_size,
        },
        Arc::new(store),
        Arc::new(host),
    );

    let key = russh::keys::PrivateKey::random(&mut OsRng, russh::keys::Algorithm::Ed25519)
        .context("cannot generate host key")?;
    let config = russh::server::Config {
        auth_rejection_time: Duration::from_secs(3),
        auth_rejection_time_initial: Some(Duration::from_secs(0)),
        keys: vec![key],
        ..Default::default()
    };

    let mut server = Server {
        dispatcher: Arc::new(dispatcher),
        config: Arc::new(ServerConfig {
            max_upload_size: args.max_send_size,
        }),
    };

    info!("Starting remote control server on {}:{}", args.host, args.port);
    server
        .run_on_address(Arc::new(config), (args.host.as_str(), args.port))
        .await
        .context("ssh server stopped")?;
    Ok(())
}
