//! Notification Worker - Entry Point

use clap::Parser;
use core_config::tracing::install_color_eyre;
use estate_notification_worker::Cli;
use eyre::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Install color-eyre first for colored error output
    install_color_eyre();

    estate_notification_worker::run(Cli::parse()).await
}
