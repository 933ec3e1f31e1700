use std::{env, path::PathBuf};

use anyhow::Error;
use bank::BANK_PATH;
use clap::{Parser, Subcommand};
use process::{
    BuildOptions,
    models::{DEFAULT_DATASET, DEFAULT_OUT_DIR},
    utils::resolve_method,
};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect signatures from a dataset and write a fresh database.
    Build {
        #[arg(long, env = "DNA_DATASET", default_value = DEFAULT_DATASET)]
        dataset: String,

        #[arg(long, env = "DNA_OUT_DIR", default_value = DEFAULT_OUT_DIR)]
        root: PathBuf,

        #[arg(long, default_value = BANK_PATH)]
        output: PathBuf,

        /// `pca` or `random`.
        #[arg(long)]
        method: Option<String>,
    },

    /// Project an existing database (path or URL) again.
    Reproject {
        input: String,

        #[arg(long)]
        method: Option<String>,

        /// Defaults to overwriting a local input, or the bank path for a URL.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn lookup(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    match Args::parse().command {
        Command::Build {
            dataset,
            root,
            output,
            method,
        } => {
            let method = resolve_method(method.as_deref(), Some(&dataset), lookup).unwrap_or_default();

            process::load_models(&BuildOptions {
                dataset_dir: root.join(&dataset),
                dataset,
                output,
                method,
            })?;
        }
        Command::Reproject {
            input,
            method,
            output,
        } => {
            let output = output.unwrap_or_else(|| {
                if input.starts_with("http://") || input.starts_with("https://") {
                    PathBuf::from(BANK_PATH)
                } else {
                    PathBuf::from(&input)
                }
            });

            process::reproject(&input, &output, |metadata| {
                resolve_method(method.as_deref(), metadata.dataset.as_deref(), lookup)
                    .unwrap_or(metadata.projection_method)
            })
            .await?;
        }
    }

    Ok(())
}
