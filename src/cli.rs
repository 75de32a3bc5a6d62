//! Command-line interface

use std::path::PathBuf;

use clap::Parser;

/// Tenant token gateway - signed tenant tokens, upload forwarding, and an
/// identity-provider mount
#[derive(Parser, Debug)]
#[command(name = "tenant-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "TENANT_GATEWAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "TENANT_GATEWAY_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "TENANT_GATEWAY_HOST")]
    pub host: Option<String>,

    /// Path to the service-account key file
    #[arg(short, long, env = "TENANT_GATEWAY_KEY_FILE")]
    pub key_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "TENANT_GATEWAY_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "TENANT_GATEWAY_LOG_FORMAT")]
    pub log_format: Option<String>,
}
