//! citeproc CLI - format citations and bibliographies from CSL styles

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use citeproc::{Cite, FilesystemLocales, InitOptions, OutputFormat, Processor, Reference};

mod diagnostics;

#[derive(Parser)]
#[command(name = "citeproc")]
#[command(version)]
#[command(about = "Format citations with CSL styles", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Format a citation of the given references
    Cite {
        #[command(flatten)]
        input: Input,

        /// Reference id to cite; repeat for a multi-cite citation
        #[arg(long = "id")]
        ids: Vec<String>,
    },

    /// Format bibliography entries
    Bibliography {
        #[command(flatten)]
        input: Input,

        /// Limit the bibliography to these ids
        #[arg(long = "id")]
        ids: Vec<String>,
    },

    /// Validate a style
    Check {
        /// CSL style file
        #[arg(long)]
        style: PathBuf,
    },
}

#[derive(Args)]
struct Input {
    /// CSL style file
    #[arg(long)]
    style: PathBuf,

    /// CSL-JSON file holding an array of references
    #[arg(long)]
    references: PathBuf,

    /// Directory of locales-<lang>.xml files
    #[arg(long)]
    locales: Option<PathBuf>,

    /// Output format (plain, html, rtf)
    #[arg(long, default_value = "plain")]
    format: OutputFormat,

    /// Override the style's default locale
    #[arg(long)]
    locale: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "citeproc=debug"
    } else {
        "citeproc=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Cite { input, ids } => {
            let mut processor = load(&input)?;
            for line in cite(&mut processor, &ids)? {
                println!("{}", line);
            }
            Ok(())
        }
        Commands::Bibliography { input, ids } => {
            let mut processor = load(&input)?;
            let ids = (!ids.is_empty()).then_some(ids.as_slice());
            for entry in processor.format_bibliography(ids)? {
                println!("{}", entry.value);
            }
            Ok(())
        }
        Commands::Check { style } => check(&style),
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn load(input: &Input) -> Result<Processor> {
    let style = read(&input.style)?;

    let mut options = InitOptions::new(style.as_str()).format(input.format);
    if let Some(dir) = &input.locales {
        options = options.fetcher(FilesystemLocales::new(dir));
    }
    if let Some(lang) = &input.locale {
        options = options.locale_override(lang);
    }

    let mut processor = match Processor::new(options) {
        Ok(processor) => processor,
        Err(citeproc::Error::MalformedStyle(err)) => {
            diagnostics::eprint_style_error(&input.style, &style, &err);
            bail!("Invalid style {}", input.style.display());
        }
        Err(err) => return Err(err.into()),
    };

    let json = read(&input.references)?;
    let references: Vec<Reference> = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse references in {}", input.references.display()))?;
    debug!(count = references.len(), "loaded references");
    processor.set_references(references);

    Ok(processor)
}

/// One line per stored reference, or a single citation of `ids`.
fn cite(processor: &mut Processor, ids: &[String]) -> Result<Vec<String>> {
    if ids.is_empty() {
        let all: Vec<String> = processor.reference_ids().map(str::to_string).collect();
        let mut lines = Vec::with_capacity(all.len());
        for id in &all {
            lines.push(processor.format_one(id)?.into_string());
        }
        return Ok(lines);
    }
    let cites: Vec<Cite> = ids.iter().map(Cite::basic).collect();
    Ok(vec![processor.format_citation(&cites)?.into_string()])
}

fn check(path: &Path) -> Result<()> {
    let style = read(path)?;
    match citeproc_csl::parse_style(&style) {
        Ok(parsed) => {
            let title = parsed
                .info
                .as_ref()
                .and_then(|info| info.title.as_deref())
                .unwrap_or("untitled");
            println!(
                "{}: ok ({}, bibliography: {})",
                path.display(),
                title,
                if parsed.bibliography.is_some() { "yes" } else { "no" }
            );
            Ok(())
        }
        Err(err) => {
            diagnostics::eprint_style_error(path, &style, &err);
            bail!("Invalid style {}", path.display());
        }
    }
}
