//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Send HTTP requests, download files and upload files or images.
///
/// Responses are printed to stdout as JSON envelopes.
#[derive(Parser, Debug)]
#[command(name = "transfer")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/native-transfer/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Maximum concurrent uploads (1-16); overrides the config file
    #[arg(short = 'w', long, global = true, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub workers: Option<u8>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a request and print the response envelope
    Request(RequestArgs),
    /// Download a response body to a file
    Download(DownloadArgs),
    /// Upload a file as multipart/form-data
    Upload(UploadArgs),
}

/// Options shared by every subcommand that talks to a URL.
#[derive(ClapArgs, Debug)]
pub struct TargetArgs {
    /// Absolute URL to contact
    pub url: String,

    /// Request header as `Name: value` (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Query parameter as `name=value` (repeatable; repeated names become lists)
    #[arg(short = 'p', long = "param", value_parser = parse_pair)]
    pub params: Vec<(String, String)>,

    /// Connect timeout in milliseconds
    #[arg(long)]
    pub connect_timeout: Option<u64>,

    /// Read timeout in milliseconds
    #[arg(long)]
    pub read_timeout: Option<u64>,
}

#[derive(ClapArgs, Debug)]
pub struct RequestArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// Request payload as JSON (a bare string is sent as text)
    #[arg(short = 'd', long)]
    pub data: Option<String>,

    /// How to decode the body: Text, Json, ArrayBuffer, Blob or Document
    #[arg(short = 't', long)]
    pub response_type: Option<String>,

    /// Return 3xx responses instead of following them
    #[arg(long)]
    pub no_redirects: bool,

    /// Append query parameters without percent-encoding them
    #[arg(long)]
    pub raw_params: bool,
}

#[derive(ClapArgs, Debug)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Destination file
    #[arg(short = 'o', long)]
    pub output: String,

    /// HTTP method
    #[arg(short = 'X', long)]
    pub method: Option<String>,
}

#[derive(ClapArgs, Debug)]
pub struct UploadArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// File to upload
    pub file: String,

    /// HTTP method (defaults to POST)
    #[arg(short = 'X', long)]
    pub method: Option<String>,

    /// Form field as `name=value` (repeatable)
    #[arg(short = 'F', long = "field", value_parser = parse_pair)]
    pub fields: Vec<(String, String)>,

    /// Form field name of the file part
    #[arg(long)]
    pub name: Option<String>,

    /// Downscale images wider than this before upload
    #[arg(long)]
    pub max_width: Option<u32>,

    /// Downscale images taller than this before upload
    #[arg(long)]
    pub max_height: Option<u32>,

    /// Re-encoding quality (1-100)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: Option<u8>,

    /// Re-encoding format: jpg or png
    #[arg(long)]
    pub format: Option<String>,

    /// How to decode the body: Text, Json, ArrayBuffer, Blob or Document
    #[arg(short = 't', long)]
    pub response_type: Option<String>,
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once(':')
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected 'Name: value', got '{raw}'"))
}
