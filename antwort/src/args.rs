use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "antwort", version, about = "OpenResponses translation and orchestration gateway")]
pub struct Args {
    /// Path to the YAML configuration file. Falls back to `ANTWORT_CONFIG`,
    /// `./config.yaml`, `/etc/antwort/config.yaml`, then defaults.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// The address to listen on, overriding the configuration.
    #[arg(short, long)]
    pub listen_address: Option<SocketAddr>,

    /// Log filter, e.g. "info" or "server=debug,llm=debug".
    #[arg(long, env = "ANTWORT_LOG", default_value = "info")]
    pub log_filter: String,
}
