pub mod pages;
pub mod routes;
pub mod state;

use std::{future::IntoFuture, net::SocketAddr};

use clap::Parser;
use color_eyre::eyre;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use rag_cli::ConfigArgs;

use crate::state::AppState;

#[derive(Debug, Parser)]
#[command(
	version = rag_cli::VERSION,
	rename_all = "kebab",
	styles = rag_cli::styles(),
)]
pub struct Args {
	#[command(flatten)]
	pub config: ConfigArgs,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = rag_config::load(&args.config.config)?;

	init_tracing(&config);

	let http_addr: SocketAddr = config.service.http_bind.parse()?;
	let admin_addr: SocketAddr = config.service.admin_bind.parse()?;

	if !admin_addr.ip().is_loopback() {
		return Err(eyre::eyre!("admin_bind must be a loopback address."));
	}

	let state = AppState::new(config).await?;
	let app = routes::router(state.clone());
	let admin_app = routes::admin_router(state);
	let shutdown = CancellationToken::new();
	let http_listener = TcpListener::bind(http_addr).await?;

	tracing::info!(%http_addr, "HTTP server listening.");

	let http_server = axum::serve(http_listener, app)
		.with_graceful_shutdown(shutdown.clone().cancelled_owned());
	let admin_listener = TcpListener::bind(admin_addr).await?;

	tracing::info!(%admin_addr, "Admin server listening.");

	let admin_server = axum::serve(admin_listener, admin_app)
		.with_graceful_shutdown(shutdown.clone().cancelled_owned());

	tokio::spawn(shutdown_on_ctrl_c(shutdown));
	tokio::try_join!(http_server.into_future(), admin_server.into_future())?;

	tracing::info!("Servers stopped.");

	Ok(())
}

async fn shutdown_on_ctrl_c(shutdown: CancellationToken) {
	if let Err(err) = tokio::signal::ctrl_c().await {
		tracing::error!(error = %err, "Failed to listen for Ctrl-C.");

		return;
	}

	tracing::info!("Shutdown requested.");

	shutdown.cancel();
}

fn init_tracing(config: &rag_config::Config) {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();
}
