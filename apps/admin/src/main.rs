//! Warden administrative CLI.

#![forbid(unsafe_code)]

mod admin_config;
mod admin_services;
mod commands;
mod output;

use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use warden_core::{AppError, ErrorKind};

use crate::admin_config::{AdminConfig, init_tracing};
use crate::admin_services::{
    build_in_memory_services, build_postgres_services, connect, run_migrations,
};
use crate::commands::{Cli, execute};
use crate::output::CommandOutput;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let json = cli.json;

    match run(cli).await {
        Ok(output) => {
            let rendered = if json {
                output.to_json()
            } else {
                Ok(output.to_text())
            };
            match rendered {
                Ok(text) => {
                    println!("{text}");
                    ExitCode::SUCCESS
                }
                Err(error) => report_error(&error, json),
            }
        }
        Err(error) => report_error(&error, json),
    }
}

async fn run(cli: Cli) -> Result<CommandOutput, AppError> {
    let config = AdminConfig::load()?;

    if cli.in_memory {
        let services = build_in_memory_services(&config).await?;
        return execute(&services, &config, cli.command).await;
    }

    let pool = connect(
        config.required_database_url()?,
        config.database_max_connections,
    )
    .await?;

    if cli.command.is_migrate() {
        run_migrations(&pool).await?;
        info!("database migrations applied");
        return Ok(CommandOutput::message("migrations applied"));
    }

    let services = build_postgres_services(pool, &config)?;
    execute(&services, &config, cli.command).await
}

fn report_error(error: &AppError, json: bool) -> ExitCode {
    let kind = error.kind();
    if json {
        eprintln!(
            "{}",
            serde_json::json!({ "error": { "kind": kind, "message": error.detail() } })
        );
    } else {
        eprintln!("error [{kind}]: {}", error.detail());
    }

    ExitCode::from(exit_code(kind))
}

fn exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Validation => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::Conflict => 4,
        ErrorKind::Forbidden => 5,
    }
}
