//! Schema CLI for the notification pipeline (`email_templates`).
//!
//! `cargo run -p migration -- up` applies pending migrations against `DATABASE_URL`.

use migration::Migrator;
use sea_orm_migration::cli;

#[tokio::main]
async fn main() {
    cli::run_cli(Migrator).await;
}
