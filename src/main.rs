use clap::{Parser, Subcommand};
use pattern_review::Result;
use pattern_review::commands::{
    OutputFormat, delete_index, init_config, learn, list_indexes, review, show_config,
    show_index, show_status,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pattern-review")]
#[command(about = "Learns the patterns of a repository and reviews new code against them")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or create the configuration file
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Write the default configuration file if none exists
        #[arg(long, conflicts_with = "show")]
        init: bool,
    },
    /// Learn a repository's patterns into a named index
    Learn {
        /// Local directory or git URL
        source: String,
        /// Name of the index, defaults to the last segment of the source
        #[arg(long)]
        name: Option<String>,
        /// File extensions to index, e.g. "py" (repeatable, overrides the config)
        #[arg(long = "ext")]
        extensions: Vec<String>,
    },
    /// Review files against a learned index
    Review {
        /// Files or directories to review
        #[arg(required = true)]
        files: Vec<String>,
        /// Name of the learned index to compare against
        #[arg(long)]
        index: String,
        /// File extensions reviewed inside directories (repeatable, overrides the config)
        #[arg(long = "ext")]
        extensions: Vec<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Write the report to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List all learned indexes
    List,
    /// Show one learned index and the files it skipped
    Show {
        /// Index name
        name: String,
    },
    /// Delete a learned index
    Delete {
        /// Index name
        name: String,
    },
    /// Show the status of the stores and backends
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show, init } => {
            if init {
                init_config()?;
            } else if show {
                show_config()?;
            } else {
                show_config()?;
                eprintln!("Use 'pattern-review config --init' to write an editable config file.");
            }
        }
        Commands::Learn {
            source,
            name,
            extensions,
        } => {
            learn(source, name, extensions).await?;
        }
        Commands::Review {
            files,
            index,
            extensions,
            format,
            output,
        } => {
            review(files, index, extensions, format, output).await?;
        }
        Commands::List => {
            list_indexes().await?;
        }
        Commands::Show { name } => {
            show_index(&name).await?;
        }
        Commands::Delete { name } => {
            delete_index(&name).await?;
        }
        Commands::Status => {
            show_status().await?;
        }
    }

    Ok(())
}
