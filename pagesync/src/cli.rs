///
/// This module implements the CLI interface for pagesync: command parsing, argument
/// validation and the async entrypoint shared by `main` and the integration tests.
///
/// All synchronisation logic (site map, element tree, engine) lives in the
/// [`pagesync-core`] crate. This module is strictly glue: it loads the config, builds
/// the concrete collaborators and reports the outcome.
///
/// ## How To Use
/// - For command-line users: run the installed `pagesync` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`pagesync-core`]: ../../pagesync-core/
/// [`Cli`]: struct.Cli.html
/// [`run`]: fn.run.html
use crate::load_config::load_config;
use crate::notion::NotionClient;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pagesync_core::markdown::MarkdownConverter;
use pagesync_core::source::LocalSource;
use pagesync_core::synchronise::{build_site_map, SyncContext, Synchroniser};
use std::path::PathBuf;

/// CLI for pagesync: mirror a local documentation tree into Notion.
#[derive(Parser)]
#[clap(
    name = "pagesync",
    version,
    about = "Synchronise a local markdown/html tree into a Notion page hierarchy"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronise the configured source tree under the destination page
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Print the page hierarchy a sync would create, without contacting the destination
    Preview {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        #[clap(long, value_enum, default_value_t = PreviewFormat::Text)]
        format: PreviewFormat,
        /// Also write the serialized site map to this file
        #[clap(long)]
        save: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PreviewFormat {
    Text,
    Json,
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync { config } => {
            let config = load_config(config)?;
            tracing::info!(command = "sync", source = ?config.source.dir, "Starting synchronisation process");
            let destination = NotionClient::new_from_env()
                .map_err(|e| anyhow::Error::msg(format!("Failed to construct Notion client: {e}")))?;

            let synchroniser = Synchroniser::new(SyncContext {
                source: LocalSource::new(),
                destination,
                converter: MarkdownConverter::new(),
            });
            match synchroniser
                .execute(&config.source_args(), &config.destination.parent_url, config.options)
                .await
            {
                Ok(report) => {
                    tracing::info!(command = "sync", ?report, "Synchronisation complete");
                    if report.clean_sync_failed {
                        println!("warning: clean sync failed, existing content was kept");
                    }
                    println!(
                        "Synchronised {} page(s) under {}",
                        report.pages.len(),
                        report.parent_id
                    );
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "sync", error = %e, path = ?e.path(), "Synchronisation failed");
                    Err(anyhow::Error::new(e).context("Synchronisation failed"))
                }
            }
        }
        Commands::Preview {
            config,
            format,
            save,
        } => {
            let config = load_config(config)?;
            tracing::info!(command = "preview", source = ?config.source.dir, ?format, "Building site map preview");
            let site_map = build_site_map(&LocalSource::new(), &config.source_args())
                .await
                .context("Failed to build site map")?;

            match format {
                PreviewFormat::Text => print!("{}", site_map.render_text_tree()),
                PreviewFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&site_map.preview_json())?
                ),
            }

            if let Some(path) = save {
                std::fs::write(&path, site_map.to_json()?)
                    .with_context(|| format!("Failed to write site map to {}", path.display()))?;
                tracing::info!(command = "preview", path = ?path, "Site map saved");
            }
            Ok(())
        }
    }
}
