//! CLI entry point for the transfer tool.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use transfer_core::transfer::{FieldMap, FieldValue, ResizeOptions};
use transfer_core::{
    DownloadOptions, HttpOptions, ResponseType, TransferConfig, TransferEngine, TransferError,
    UploadOptions, WorkerSizing,
};

mod app_config;
mod cli;

use cli::{Args, Command, DownloadArgs, RequestArgs, TargetArgs, UploadArgs};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let loaded = app_config::load_config(args.config.as_deref())?;
    let mut config = match &loaded.config {
        Some(file_config) => {
            debug!(path = ?loaded.path, "loaded config file");
            file_config.apply(TransferConfig::default())
        }
        None => TransferConfig::default(),
    };
    if let Some(workers) = args.workers {
        config = config.with_workers(WorkerSizing::Fixed(usize::from(workers)));
    }

    let engine = TransferEngine::new(&config)?;

    match args.command {
        Command::Request(request) => run_request(&engine, request).await,
        Command::Download(download) => run_download(&engine, download).await,
        Command::Upload(upload) => run_upload(&engine, upload).await,
    }
}

async fn run_request(engine: &TransferEngine, args: RequestArgs) -> Result<()> {
    let mut options = HttpOptions::new(args.target.url.clone());
    options.method = Some(args.method);
    options.data = args.data.as_deref().map(parse_data);
    options.disable_redirects = args.no_redirects;
    options.should_encode_url_params = !args.raw_params;
    options.response_type = ResponseType::parse(args.response_type.as_deref());
    apply_target(&args.target, &mut options.headers, &mut options.params);
    options.connect_timeout = args.target.connect_timeout;
    options.read_timeout = args.target.read_timeout;

    let envelope = engine.request(options).await.map_err(rejected)?;
    print_json(&envelope)
}

async fn run_download(engine: &TransferEngine, args: DownloadArgs) -> Result<()> {
    let mut options = DownloadOptions::new(args.target.url.clone(), args.output);
    options.method = args.method;
    apply_target(&args.target, &mut options.headers, &mut options.params);
    options.connect_timeout = args.target.connect_timeout;
    options.read_timeout = args.target.read_timeout;

    let progress: Arc<transfer_core::transfer::ProgressFn> = Arc::new(|written, total| {
        debug!(written, total, "download progress");
    });
    let result = engine
        .download_file(options, Some(progress))
        .await
        .map_err(rejected)?;
    info!(
        path = %result.path.display(),
        bytes = result.bytes_written,
        "download saved"
    );
    print_json(&result)
}

async fn run_upload(engine: &TransferEngine, args: UploadArgs) -> Result<()> {
    let mut options = UploadOptions::new(args.target.url.clone(), args.file);
    options.method = args.method;
    options.name = args.name;
    options.data = field_map(&args.fields);
    options.response_type = ResponseType::parse(args.response_type.as_deref());
    apply_target(&args.target, &mut options.headers, &mut options.params);
    options.connect_timeout = args.target.connect_timeout;
    options.read_timeout = args.target.read_timeout;

    if args.max_width.is_some() || args.max_height.is_some() {
        let mut resize = ResizeOptions {
            max_width: args.max_width,
            max_height: args.max_height,
            ..ResizeOptions::default()
        };
        if let Some(quality) = args.quality {
            resize.quality = quality;
        }
        if let Some(format) = args.format {
            resize.format = format;
        }
        options.resize = Some(resize);
    } else if args.quality.is_some() || args.format.is_some() {
        warn!("--quality and --format only apply together with --max-width or --max-height");
    }

    let handle = engine.upload_file(options).await.map_err(rejected)?;
    let id = handle.id().to_string();
    let envelope = handle
        .await
        .with_context(|| format!("upload {id} failed"))?;
    print_json(&envelope)
}

fn apply_target(
    target: &TargetArgs,
    headers: &mut indexmap::IndexMap<String, String>,
    params: &mut FieldMap,
) {
    for (name, value) in &target.headers {
        headers.insert(name.clone(), value.clone());
    }
    *params = field_map(&target.params);
}

/// Groups repeated names into lists, keeping first-seen order.
fn field_map(pairs: &[(String, String)]) -> FieldMap {
    let mut map = FieldMap::new();
    for (name, value) in pairs {
        match map.get_mut(name) {
            Some(slot) => {
                let mut values = match std::mem::replace(slot, FieldValue::Many(Vec::new())) {
                    FieldValue::Single(first) => vec![first],
                    FieldValue::Many(values) => values,
                };
                values.push(value.clone());
                *slot = FieldValue::Many(values);
            }
            None => {
                map.insert(name.clone(), FieldValue::from(value.as_str()));
            }
        }
    }
    map
}

/// JSON when it parses, otherwise the raw text.
fn parse_data(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn rejected(error: TransferError) -> anyhow::Error {
    let category = error.category();
    anyhow::Error::new(error).context(category)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
