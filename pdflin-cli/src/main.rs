use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pdflin::linearization::check;
use pdflin::{PdfProcessor, WriteOptions};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "pdflin",
    about = "Rewrite, repair and linearize PDF files",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite a PDF, repairing its cross-reference data
    Rewrite {
        /// Input PDF file
        input: PathBuf,

        /// Output file path
        output: PathBuf,

        /// Write a cross-reference stream instead of a table
        #[arg(long)]
        xref_stream: bool,

        /// Keep objects nothing refers to
        #[arg(long)]
        preserve_unreferenced: bool,

        /// Use a fixed /ID for reproducible output
        #[arg(long)]
        static_id: bool,
    },

    /// Write a linearized ("fast web view") copy of a PDF
    Linearize {
        /// Input PDF file
        input: PathBuf,

        /// Output file path
        output: PathBuf,

        /// Use a fixed /ID for reproducible output
        #[arg(long)]
        static_id: bool,
    },

    /// Check the linearization data of a PDF
    Check {
        /// Input PDF file
        input: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the library version
    Version,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdflin=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Rewrite {
            input,
            output,
            xref_stream,
            preserve_unreferenced,
            static_id,
        } => {
            let options = WriteOptions::default()
                .with_xref_stream(xref_stream)
                .with_preserve_unreferenced(preserve_unreferenced)
                .with_static_id(static_id);
            process(&input, &output, options)?;
            println!("Wrote {}", output.display());
        }

        Commands::Linearize {
            input,
            output,
            static_id,
        } => {
            let options = WriteOptions::default()
                .with_linearize(true)
                .with_static_id(static_id);
            process(&input, &output, options)?;
            println!("Wrote linearized {}", output.display());
        }

        Commands::Check { input, json } => {
            let data = std::fs::read(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let report = check(&data);

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Linearization check for: {}", input.display());
                println!("==========================================");
                if let Some(params) = &report.parameters {
                    println!("File length:       {}", params.file_length);
                    println!("Pages:             {}", params.page_count);
                    println!("First page object: {}", params.first_page_object);
                    println!("First page end:    {}", params.first_page_end);
                    println!(
                        "Hint stream:       offset {} length {}",
                        params.hint_offset, params.hint_length
                    );
                }
                for problem in &report.problems {
                    println!("Problem: {problem}");
                }
                if report.is_ok() {
                    println!("No linearization errors");
                }
            }

            if !report.is_ok() {
                bail!("{} failed the linearization check", input.display());
            }
        }

        Commands::Version => {
            println!("pdflin {}", pdflin::version());
        }
    }

    Ok(())
}

/// Open, write, then inspect the error slot
fn process(input: &Path, output: &Path, options: WriteOptions) -> Result<()> {
    debug!(
        "Processing {} -> {} with {:?}",
        input.display(),
        output.display(),
        options
    );
    let mut processor = PdfProcessor::new();
    processor.set_write_options(options);

    if processor.read(input).is_ok() && processor.init_write(output).is_ok() {
        let _ = processor.write();
    }

    while let Some(warning) = processor.next_warning() {
        eprintln!("Warning: {warning}");
    }
    if let Some(detail) = processor.drain_last_error() {
        bail!("{detail}");
    }
    Ok(())
}
