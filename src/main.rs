//! Main entry point for the streamzip CLI application.
//!
//! This binary streams a ZIP archive of local files and HTTP URLs to a file
//! or to stdout, announcing the exact archive size before the first byte.

use anyhow::{Result, bail};
use clap::Parser;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use streamzip::{
    ArchiveMember, Cli, HttpSource, LocalFileSource, Manifest, MemberSource, ZipOptions,
    calculate_size, save_to_file, stream_to, zip_files,
};

/// Application entry point.
///
/// Collects members from the manifest and positional inputs, then either
/// prints the predicted size or streams the archive.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let members = collect_members(&cli).await?;

    if cli.size_only {
        let estimate = calculate_size(
            members.iter().map(|m| (m.name.as_str(), m.source.size())),
            cli.zip64,
        )?;
        println!("{}", serde_json::to_string(&estimate)?);
        return Ok(());
    }

    let sources: Vec<Arc<dyn MemberSource>> = members.iter().map(|m| m.source.clone()).collect();
    let options = ZipOptions {
        high_water_mark: cli.buffer,
        ..ZipOptions::default()
    };
    let job = zip_files(members, options, cli.zip64)?;

    if !cli.is_quiet() {
        eprintln!(
            "Archive size: {} ({}){}",
            job.estimate.total,
            format_size(job.estimate.total),
            if job.estimate.zip64 { ", zip64" } else { "" }
        );
    }

    let written = match &cli.output {
        Some(path) => save_to_file(job, path).await?,
        None => stream_to(job, tokio::io::stdout()).await?,
    };

    if !cli.is_quiet() {
        eprintln!("Total bytes written: {}", format_size(written));
        let transferred: u64 = sources.iter().map(|s| s.transferred_bytes()).sum();
        if transferred > 0 {
            eprintln!("Total bytes transferred: {}", format_size(transferred));
        }
    }

    Ok(())
}

/// Route library logs to stderr; stdout may carry the archive itself.
fn init_logging(cli: &Cli) {
    let default = if cli.is_very_quiet() {
        "error"
    } else if cli.is_quiet() {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Build the member list from the manifest and positional inputs.
///
/// Manifest members come first, in manifest order, followed by the
/// positional inputs in command-line order.
async fn collect_members(cli: &Cli) -> Result<Vec<ArchiveMember>> {
    let mut members = match &cli.manifest {
        Some(path) => Manifest::load(path)?.into_members(cli.retries).await?,
        None => Vec::new(),
    };

    for spec in cli.input_specs() {
        let member = if spec.is_http_url() {
            let source = HttpSource::new(spec.source).await?.with_max_retry(cli.retries);
            ArchiveMember::new(spec.name, source)
        } else {
            ArchiveMember::new(spec.name, LocalFileSource::new(Path::new(&spec.source))?)
        };
        members.push(member);
    }

    if members.is_empty() {
        bail!("Nothing to archive: give input files or a manifest");
    }

    let mut seen = HashSet::new();
    for member in &members {
        if !seen.insert(member.name.as_str()) {
            bail!("Duplicate archive name: {}", member.name);
        }
    }

    Ok(members)
}

/// Format a byte size into a human-readable string.
///
/// Automatically selects the appropriate unit (bytes, KB, MB, GB)
/// based on the size magnitude.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
