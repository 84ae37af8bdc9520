use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use dsi_split::logging::init_logging;
use dsi_split::{watch, Config, DocumentProcessor};

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about,
    long_about = "Split PDF batches into stamped per-account documents.",
    arg_required_else_help = true
)]
pub struct Args {
    /// JSON configuration file. Defaults apply to anything it leaves out.
    #[clap(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for a daily rolling log file
    #[clap(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Overlay image stamped on the last page of each block
    #[clap(long, global = true)]
    pub overlay: Option<PathBuf>,

    /// Root directory for the split documents
    #[clap(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Process a single PDF and print a report
    Process {
        /// Path to the PDF file to process
        pdf_path: PathBuf,

        /// Print the report as pretty JSON
        #[clap(long)]
        json: bool,
    },
    /// Watch a folder and process every PDF dropped into it
    Watch {
        /// Folder to watch. Defaults to the configured watch directory.
        dir: Option<PathBuf>,
    },
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(overlay) = &self.overlay {
            config.paths.overlay_image = overlay.clone();
        }
        if let Some(output) = &self.output {
            config.paths.output_dir = output.clone();
        }
        if let Some(log_dir) = &self.log_dir {
            config.logging.log_dir = Some(log_dir.clone());
        }
        // Flag values get the same `~`/`$VAR` treatment as the config file
        config.expand_paths()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse_args();
    let config = args.load_config().context("Failed to load configuration")?;

    // Keep the guard alive so the file log is flushed on exit
    let _guard = init_logging(
        &config.logging.filter,
        config.logging.log_dir.as_deref(),
        None,
    );

    let watch_dir = config.paths.watch_dir.clone();
    let processor = DocumentProcessor::new(config)?;

    match args.command {
        Command::Process { pdf_path, json } => {
            let report = processor.process(&pdf_path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for artifact in &report.split.artifacts {
                    println!(
                        "{} <- pages {:?}",
                        artifact.path.display(),
                        artifact.pages.iter().map(|p| p + 1).collect::<Vec<_>>()
                    );
                }
                for skipped in &report.split.skipped {
                    eprintln!(
                        "skipped {} pages {:?}: {}",
                        skipped.identifier,
                        skipped.pages.iter().map(|p| p + 1).collect::<Vec<_>>(),
                        skipped.error
                    );
                }
                if let Some(archived) = &report.archived_to {
                    println!("source archived to {}", archived.display());
                }
            }
        }
        Command::Watch { dir } => {
            let dir = dir.unwrap_or(watch_dir);
            watch::watch(&processor, &dir)?;
        }
    }

    Ok(())
}
