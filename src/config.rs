//! CLI arguments and server configuration defaults.

use clap::{Parser, ValueEnum};
use shadow_rs::formatcp;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_PORT_ATTEMPTS: u16 = 10;
pub const DEFAULT_UPLOAD_MAX_SIZE: u64 = 1024 * 1024 * 1024;
pub const UPLOAD_FIELD_NAME: &str = "file";
pub const UPLOADS_ROUTE_PREFIX: &str = "/uploads";
pub const SHUTDOWN_GRACE_SECS: u64 = 10;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Command line arguments, each with an environment variable fallback.
#[derive(Parser, Debug)]
#[command(name = "fileshare", version = VERSION_INFO, about = "Upload a file, get a share link")]
pub struct Args {
    #[arg(
        short = 's',
        long,
        env = "FILESHARE_STORAGE_DIR",
        default_value = "uploads",
        help = "Directory holding uploaded blobs"
    )]
    pub storage_dir: String,
    #[arg(
        short = 'd',
        long,
        env = "FILESHARE_DATABASE",
        default_value = "fileshare.db",
        help = "SQLite database file for upload records"
    )]
    pub database: String,
    #[arg(
        short = 'b',
        long = "bind",
        env = "FILESHARE_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "PORT",
        default_value_t = DEFAULT_PORT,
        help = "First port to try"
    )]
    pub port: u16,
    #[arg(
        long,
        env = "FILESHARE_PORT_ATTEMPTS",
        default_value_t = DEFAULT_PORT_ATTEMPTS,
        value_parser = clap::value_parser!(u16).range(1..),
        help = "How many consecutive ports to try when the port is taken"
    )]
    pub port_attempts: u16,
    #[arg(
        long,
        env = "FILESHARE_UPLOAD_MAX_SIZE",
        default_value_t = DEFAULT_UPLOAD_MAX_SIZE,
        help = "Max upload request size in bytes (0 to disable)"
    )]
    pub upload_max_size: u64,
    #[arg(
        long,
        env = "FILESHARE_TRUST_PROXY",
        help = "Honour X-Forwarded-Proto/X-Forwarded-Host when building links"
    )]
    pub trust_proxy: bool,
    #[arg(
        long,
        env = "FILESHARE_CORS_ORIGINS",
        help = "Comma separated CORS origins"
    )]
    pub cors_origins: Option<String>,
    #[arg(
        long,
        env = "FILESHARE_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Text,
        help = "Log output format"
    )]
    pub log_format: LogFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let args = Args::try_parse_from(["fileshare"]).expect("parse defaults");
        assert_eq!(args.storage_dir, "uploads");
        assert_eq!(args.database, "fileshare.db");
        assert_eq!(args.port_attempts, DEFAULT_PORT_ATTEMPTS);
        assert_eq!(args.log_format, LogFormat::Text);
        assert!(!args.trust_proxy);
    }

    #[test]
    fn zero_port_attempts_is_rejected() {
        let result = Args::try_parse_from(["fileshare", "--port-attempts", "0"]);
        assert!(result.is_err());
    }
}
