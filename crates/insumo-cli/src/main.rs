use std::process;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use insumo_api_types::{BatchItemSpec, CreateRecipientRequest, UpdateRecipientRequest};
use insumo_cli::{ApiClient, CliError, client::DEFAULT_API_BASE};

#[derive(Debug, Parser)]
#[command(name = "insumo-cli", version, about = "Client for the insumo consumption-monitoring API")]
struct Cli {
    /// Base URL of the API.
    #[arg(
        long = "api-base",
        env = "INSUMO_API_BASE",
        default_value = DEFAULT_API_BASE,
        value_name = "URL"
    )]
    api_base: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch one named report.
    Report {
        /// Report endpoint name, e.g. `materials` or `six-month-average`.
        endpoint: String,
        /// Restrict filterable reports to one material.
        #[arg(long = "material-code", value_name = "CODE")]
        material_code: Option<i32>,
    },
    /// Fetch several reports in one round trip.
    Batch {
        /// Endpoint names, at most ten.
        #[arg(required = true)]
        endpoints: Vec<String>,
        /// Shared material filter applied to every filterable endpoint.
        #[arg(long = "material-code", value_name = "CODE")]
        material_code: Option<i32>,
    },
    /// Warm the server cache for the standard dashboard load.
    Preload {
        #[arg(long = "material-code", value_name = "CODE")]
        material_code: Option<i32>,
    },
    /// Probe service liveness.
    Health {
        /// Also exercise the database connection.
        #[arg(long)]
        check: bool,
    },
    /// Manage growth-alert recipients.
    Recipients {
        #[command(subcommand)]
        command: RecipientsCommand,
    },
    /// Growth-alert operations.
    Alerts {
        #[command(subcommand)]
        command: AlertsCommand,
    },
    /// Server cache introspection and invalidation.
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Debug, Subcommand)]
enum RecipientsCommand {
    /// List active recipients.
    List,
    /// Register a recipient.
    Add(AddRecipientArgs),
    /// Change a recipient's name, email, or active flag.
    Update(UpdateRecipientArgs),
    /// Deactivate a recipient.
    Remove { id: i32 },
}

#[derive(Debug, Args)]
struct AddRecipientArgs {
    name: String,
    email: String,
    /// Register without subscribing to dispatches.
    #[arg(long)]
    inactive: bool,
}

#[derive(Debug, Args)]
struct UpdateRecipientArgs {
    id: i32,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    active: Option<bool>,
}

#[derive(Debug, Subcommand)]
enum AlertsCommand {
    /// Run the growth-alert dispatch now.
    Dispatch,
}

#[derive(Debug, Subcommand)]
enum CacheCommand {
    /// Hit/miss counters and current size.
    Stats,
    /// Stats plus a sample of resident keys.
    Info,
    /// Invalidate entries: one key, one endpoint's variants, or everything.
    Clear {
        #[arg(long, value_name = "KEY", conflicts_with = "endpoint")]
        key: Option<String>,
        #[arg(long, value_name = "ENDPOINT")]
        endpoint: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli).await {
        eprintln!("error: {error}");
        if let CliError::Api {
            hint: Some(hint), ..
        } = &error
        {
            eprintln!("hint: {hint}");
        }
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let client = ApiClient::new(&cli.api_base)?;

    match cli.command {
        Command::Report {
            endpoint,
            material_code,
        } => print_json(&client.report(&endpoint, material_code).await?),
        Command::Batch {
            endpoints,
            material_code,
        } => {
            let requests = endpoints
                .into_iter()
                .map(|endpoint| BatchItemSpec {
                    endpoint,
                    params: material_code
                        .map(|code| {
                            [("material_code".to_string(), code.into())]
                                .into_iter()
                                .collect()
                        })
                        .unwrap_or_default(),
                })
                .collect();
            print_json(&client.batch(requests).await?)
        }
        Command::Preload { material_code } => print_json(&client.preload(material_code).await?),
        Command::Health { check } => {
            if check {
                print_json(&client.health_check().await?)
            } else {
                print_json(&client.health().await?)
            }
        }
        Command::Recipients { command } => match command {
            RecipientsCommand::List => print_json(&client.list_recipients().await?),
            RecipientsCommand::Add(args) => {
                let request = CreateRecipientRequest {
                    name: args.name,
                    email: args.email,
                    active: args.inactive.then_some(false),
                };
                print_json(&client.create_recipient(request).await?)
            }
            RecipientsCommand::Update(args) => {
                let request = UpdateRecipientRequest {
                    name: args.name,
                    email: args.email,
                    active: args.active,
                };
                print_json(&client.update_recipient(args.id, request).await?)
            }
            RecipientsCommand::Remove { id } => {
                client.remove_recipient(id).await?;
                println!("recipient {id} deactivated");
                Ok(())
            }
        },
        Command::Alerts { command } => match command {
            AlertsCommand::Dispatch => print_json(&client.dispatch_alerts().await?),
        },
        Command::Cache { command } => match command {
            CacheCommand::Stats => print_json(&client.cache_stats().await?),
            CacheCommand::Info => print_json(&client.cache_info().await?),
            CacheCommand::Clear { key, endpoint } => print_json(
                &client
                    .cache_clear(key.as_deref(), endpoint.as_deref())
                    .await?,
            ),
        },
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
