//! ngsild-federate - Command-line tool for federated NGSI-LD queries
//!
//! Loads a registration catalogue and optional local entities from a TOML
//! file, then queries or retrieves entities across every matching context
//! source.

mod commands;
mod config;
mod output;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use ngsild_core::{InMemoryCatalogue, InMemoryLocalStore};
use ngsild_federation::{CancelToken, EntitiesQuery, FederationService, RequestContext};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;
use crate::output::{OutputContext, OutputFormat};

const DEFAULT_LOG_FILTER: &str = "ngsild_federate=info,ngsild_federation=info,ngsild_client=info";

#[derive(Parser)]
#[command(name = "ngsild-federate")]
#[command(author, version, about = "Federated NGSI-LD entity queries")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "NGSILD_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Maximum remote calls in flight per request
    #[arg(long, env = "NGSILD_MAX_CONCURRENT_SOURCES")]
    max_concurrent_sources: Option<usize>,

    /// Per-source timeout in milliseconds
    #[arg(long, env = "NGSILD_SOURCE_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query entities across all matching sources
    Query {
        #[command(flatten)]
        selection: SelectionArgs,

        /// Entity id(s)
        #[arg(long = "id", value_delimiter = ',')]
        ids: Vec<String>,

        /// Regular expression over entity ids
        #[arg(long)]
        id_pattern: Option<String>,

        /// Page size
        #[arg(long)]
        limit: Option<usize>,

        /// Page offset
        #[arg(long, default_value = "0")]
        offset: usize,

        #[command(flatten)]
        request: RequestArgs,
    },

    /// Retrieve one entity, merged across sources
    Retrieve {
        /// Entity id
        entity_id: String,

        #[command(flatten)]
        selection: SelectionArgs,

        #[command(flatten)]
        request: RequestArgs,
    },

    /// List the context sources a query would reach
    Sources {
        #[command(flatten)]
        selection: SelectionArgs,

        /// Call the sources once so their health is known
        #[arg(long)]
        probe: bool,

        #[command(flatten)]
        request: RequestArgs,
    },
}

#[derive(Args)]
struct SelectionArgs {
    /// Type selection, e.g. "Beehive" or "(Beehive;Device)|Apiary"
    #[arg(short = 't', long = "type")]
    entity_type: Option<String>,

    /// Attributes to return
    #[arg(long, value_delimiter = ',')]
    attrs: Vec<String>,
}

#[derive(Args)]
struct RequestArgs {
    /// Tenant
    #[arg(long, env = "NGSILD_TENANT")]
    tenant: Option<String>,

    /// JSON-LD context URL
    #[arg(long)]
    context: Option<String>,

    /// Header to forward to sources, as NAME:VALUE (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,
}

impl SelectionArgs {
    fn to_query(&self) -> EntitiesQuery {
        EntitiesQuery {
            type_selection: self.entity_type.clone(),
            attrs: self.attrs.clone(),
            ..Default::default()
        }
    }
}

impl RequestArgs {
    fn to_context(&self) -> Result<RequestContext> {
        let mut request = RequestContext::new();
        if let Some(ref tenant) = self.tenant {
            request = request.with_tenant(tenant);
        }
        if let Some(ref context) = self.context {
            request = request.with_context(context);
        }
        for header in &self.headers {
            let Some((name, value)) = header.split_once(':') else {
                bail!("Invalid header '{}', expected NAME:VALUE", header);
            };
            request = request.with_header(name.trim(), value.trim());
        }
        Ok(request)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load config file
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::default(),
    }
    .with_overrides(cli.max_concurrent_sources, cli.timeout_ms);

    let local = InMemoryLocalStore::with_entities(config.local_entities()?);
    let catalogue = InMemoryCatalogue::with_registrations(config.registration.clone());
    info!(
        registrations = config.registration.len(),
        local_entities = local.len(),
        "Loaded catalogue"
    );

    let service = FederationService::new(&config.federation, Arc::new(local), Arc::new(catalogue))
        .context("Failed to create federation service")?;

    // Ctrl-C cancels the request in flight
    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    let ctx = OutputContext::new(cli.output, cli.no_color);

    // Execute command
    match &cli.command {
        Commands::Query {
            selection,
            ids,
            id_pattern,
            limit,
            offset,
            request,
        } => {
            let query = EntitiesQuery {
                ids: ids.clone(),
                id_pattern: id_pattern.clone(),
                limit: *limit,
                offset: *offset,
                ..selection.to_query()
            };
            commands::query(&service, &request.to_context()?, &query, &cancel, &ctx).await?;
        }

        Commands::Retrieve {
            entity_id,
            selection,
            request,
        } => {
            commands::retrieve(
                &service,
                &request.to_context()?,
                entity_id,
                &selection.to_query(),
                &cancel,
                &ctx,
            )
            .await?;
        }

        Commands::Sources {
            selection,
            probe,
            request,
        } => {
            commands::sources(
                &service,
                &request.to_context()?,
                &selection.to_query(),
                *probe,
                &cancel,
                &ctx,
            )
            .await?;
        }
    }

    Ok(())
}
