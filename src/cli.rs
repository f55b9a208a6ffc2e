use clap::Parser;
use std::path::{Path, PathBuf};

use crate::io::DEFAULT_MAX_RETRY;
use crate::zip::DEFAULT_HIGH_WATER_MARK;

#[derive(Parser, Debug)]
#[command(name = "streamzip")]
#[command(version)]
#[command(about = "Stream a ZIP archive of remote or local files", long_about = None)]
#[command(after_help = "Examples:\n  \
  streamzip -o out.zip a.txt b.txt                 archive two local files\n  \
  streamzip photo.jpg=https://example.com/1.jpg    archive a URL under a chosen name\n  \
  streamzip -m manifest.json | ssh host 'cat > x.zip'   stream to stdout\n  \
  streamzip --size-only -m manifest.json           print the predicted archive size")]
pub struct Cli {
    /// Files or HTTP URLs to archive, optionally as NAME=SOURCE
    #[arg(value_name = "INPUTS")]
    pub inputs: Vec<String>,

    /// JSON manifest of members
    #[arg(short = 'm', long = "manifest", value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Write the archive to FILE instead of stdout
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Always write ZIP64 records
    #[arg(long = "zip64")]
    pub zip64: bool,

    /// Print the predicted archive size and exit
    #[arg(long = "size-only")]
    pub size_only: bool,

    /// Output buffer size in bytes before payload reads pause
    #[arg(long = "buffer", value_name = "BYTES", default_value_t = DEFAULT_HIGH_WATER_MARK)]
    pub buffer: usize,

    /// GET attempts per HTTP source on connection errors
    #[arg(long = "retries", value_name = "N", default_value_t = DEFAULT_MAX_RETRY)]
    pub retries: u32,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

/// One positional input, split into archive name and source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    pub name: String,
    pub source: String,
}

impl InputSpec {
    pub fn parse(input: &str) -> Self {
        // NAME=SOURCE, unless the '=' belongs to a URL query string or to an
        // existing file name
        if Path::new(input).exists() {
            return Self {
                name: default_name(input),
                source: input.to_string(),
            };
        }
        if let Some((name, source)) = input.split_once('=') {
            if !name.is_empty() && !name.contains("://") && !name.contains('?') {
                return Self {
                    name: name.to_string(),
                    source: source.to_string(),
                };
            }
        }

        Self {
            name: default_name(input),
            source: input.to_string(),
        }
    }

    pub fn is_http_url(&self) -> bool {
        is_http_url(&self.source)
    }
}

pub fn is_http_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Base name of a path, or the last path segment of a URL.
fn default_name(source: &str) -> String {
    if is_http_url(source) {
        let without_query = source.split(['?', '#']).next().unwrap_or(source);
        let after_scheme = without_query.split_once("://").map_or(without_query, |(_, r)| r);
        return match after_scheme.split_once('/') {
            Some((_, path)) => path
                .rsplit('/')
                .find(|s| !s.is_empty())
                .unwrap_or("download")
                .to_string(),
            None => "download".to_string(),
        };
    }

    Path::new(source)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| source.to_string())
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    pub fn input_specs(&self) -> Vec<InputSpec> {
        self.inputs.iter().map(|i| InputSpec::parse(i)).collect()
    }
}
