//! `sponsor-server`: serve `/sponsor` and `/execute` for one sponsor key.

use clap::Parser as _;
use sponsor_server::{ServerConfig, ServerError, serve};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_err| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    serve(ServerConfig::parse()).await
}
