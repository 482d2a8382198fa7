mod clients;
mod config;
mod error;
mod record;
mod report_client;
mod runner;
mod trigger;
mod warehouse;

use clap::{Parser, Subcommand};
use clients::Clients;
use config::Config;
use error::Error;
use log::{error, info};
use runner::Pipeline;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use trigger::{BackfillParams, DEFAULT_DATE};

#[derive(Parser)]
struct Args {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the backfill trigger over HTTP
    Serve {
        #[arg(long, env = "PORT", default_value_t = 8080)]
        port: u16,
    },
    /// Run a single backfill locally and print the status payload
    Backfill {
        #[arg(long, default_value = DEFAULT_DATE, help = "Date should be in the form YYYY-MM-DD")]
        start_date: String,

        #[arg(long, default_value = DEFAULT_DATE, help = "Date should be in the form YYYY-MM-DD")]
        end_date: String,
    },
}

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                buf.timestamp(),
                record.level(),
                record.args()
            )
        })
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    init_logging();

    let clients = match Clients::init(&args.config).await {
        Ok(clients) => clients,
        Err(err) => {
            error!("failed to initialise clients: {}", err);
            std::process::exit(1);
        }
    };

    let table = args.config.dest_table_path();
    info!(
        "Loading property {} into {}",
        args.config.ga4_property_id, table
    );

    let pipeline = Arc::new(Pipeline::new(
        Arc::new(clients.reporting),
        Arc::new(clients.warehouse),
        &args.config.ga4_property_id,
        table,
    ));

    match args.command {
        Command::Serve { port } => serve(pipeline, port).await?,
        Command::Backfill {
            start_date,
            end_date,
        } => {
            let params = BackfillParams {
                start_date,
                end_date,
            };
            match trigger::backfill(&pipeline, &params).await {
                Ok(payload) => println!("{}", serde_json::to_string(&payload)?),
                Err(err) => {
                    error!("failed to run backfill: {}", err);
                    std::process::exit(1);
                }
            }
        }
    };

    Ok(())
}

async fn serve(pipeline: Arc<Pipeline>, port: u16) -> Result<(), Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, trigger::router(pipeline))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("received shutdown signal, shutting down");
}
