//! Tidemark CLI - offline-first notes from the command line
//!
//! Every command works against the local store; `tidemark sync` reconciles
//! with the remote notes API when one is configured.

mod cli;
mod commands;
mod config_profiles;
mod error;


use clap::{CommandFactory, Parser};

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::common::CliContext;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::edit::{run_edit, EditArgs};
use crate::commands::export::run_export;
use crate::commands::list::run_list;
use crate::commands::search::run_search;
use crate::commands::show::run_show;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "tidemark=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Completions { shell, output }) => run_completions(shell, output.as_deref()),
        Some(Commands::Config { command }) => {
            run_config(command, cli.db_path, cli.owner, cli.profile.as_deref())
        }
        command => {
            let context = CliContext::resolve(cli.db_path, cli.owner, cli.profile.as_deref())?;
            run_with_context(command, &cli.note, &context).await
        }
    }
}

async fn run_with_context(
    command: Option<Commands>,
    quick_note: &[String],
    context: &CliContext,
) -> Result<(), CliError> {
    match command {
        Some(Commands::Add {
            content,
            title,
            tags,
        }) => run_add(&content, title.as_deref(), &tags, context).await?,
        Some(Commands::List { limit, tag, json }) => {
            run_list(limit, tag.as_deref(), json, context).await?;
        }
        Some(Commands::Search { query, limit, json }) => {
            run_search(&query, limit, json, context).await?;
        }
        Some(Commands::Show { id, json }) => run_show(&id, json, context).await?,
        Some(Commands::Edit {
            id,
            title,
            body,
            tags,
            clear_tags,
        }) => {
            let args = EditArgs {
                title,
                body,
                tags,
                clear_tags,
            };
            run_edit(&id, args, context).await?;
        }
        Some(Commands::Delete { id }) => run_delete(&id, context).await?,
        Some(Commands::Export { format, output }) => {
            run_export(format, output.as_deref(), context).await?;
        }
        Some(Commands::Sync { watch }) => run_sync(watch, context).await?,
        Some(Commands::Status { retry_parked, json }) => {
            run_status(retry_parked, json, context).await?;
        }
        Some(Commands::Completions { .. } | Commands::Config { .. }) => {}
        None => {
            // Quick capture mode: tidemark "my note"
            if quick_note.is_empty() {
                Cli::command().print_help().map_err(CliError::Io)?;
                println!();
            } else {
                run_add(quick_note, None, &[], context).await?;
            }
        }
    }

    Ok(())
}
