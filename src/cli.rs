use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "muninn")]
#[command(version)]
#[command(about = "Terminal client and WebSocket gateway for text-based multi-user worlds")]
pub struct Args {
    /// World to connect to, as host:port. Appended to the relay path in
    /// client mode; ignored by the gateway
    pub world: Option<String>,

    /// Run the gateway relay server instead of the terminal client
    #[arg(long)]
    pub serve: bool,

    /// Address the gateway binds to
    #[arg(long)]
    pub address: Option<String>,

    /// Path to a TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Origin the client derives its relay endpoint from (e.g. http://localhost:3001)
    #[arg(long)]
    pub origin: Option<String>,

    /// Relay route on the gateway
    #[arg(long)]
    pub relay_path: Option<String>,

    /// Upstream world the gateway dials when a client names none
    #[arg(long)]
    pub upstream: Option<String>,

    /// Log filter directive (e.g. "muninn=debug")
    #[arg(long)]
    pub log: Option<String>,
}
