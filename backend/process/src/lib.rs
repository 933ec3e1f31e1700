//! # DNA Database Build
//!
//! Offline step that turns raw extraction output into the
//! `dna_database.json` bank served by the backend.
//!
//! ## Steps
//! 1. Walk `<root>/<dataset>` for `*_dna.json` files (dry runs skipped).
//! 2. Keep one signature per model id, preferring outputs found under an
//!    `embed` folder.
//! 3. Parse organization, family, parameter count and instruct flag from the
//!    raw id.
//! 4. Project every signature to 2D with the configured method (`pca` unless
//!    overridden, see [`utils::resolve_method`]).
//! 5. Write the models plus build metadata.
//!
//! Re-running the build on the same input writes the same coordinates.
//!
//! ## Reprojecting
//! An existing bank, local or remote, can be reprojected with another method
//! without re-reading the raw outputs.
use std::path::{Path, PathBuf};

use anyhow::{Error, bail};
use bank::{
    get_bank, get_bank_remote,
    models::{Database, DatabaseMetadata, ModelRecord, ProjectionMethod},
    store::SignatureStore,
    write_bank,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

pub mod models;
pub mod projection;
pub mod utils;

use projection::{ProjectionEngine, ProjectionSummary};
use utils::{collect_signatures, today_formatted};

pub struct BuildOptions {
    pub dataset: String,
    pub dataset_dir: PathBuf,
    pub output: PathBuf,
    pub method: ProjectionMethod,
}

pub fn load_models(options: &BuildOptions) -> Result<Database, Error> {
    let bank = build_database(&options.dataset_dir, &options.dataset, options.method)?;

    println!("Models: {}", bank.metadata.total_models);
    println!("Dimension: {}", bank.metadata.dna_dimension);
    println!("Projection: {}\n", bank.metadata.projection_method);

    write_bank(&options.output, &bank)?;
    println!("Database written to {}", options.output.display());

    Ok(bank)
}

pub fn build_database(dataset_dir: &Path, dataset: &str, method: ProjectionMethod) -> Result<Database, Error> {
    if !dataset_dir.is_dir() {
        bail!("Dataset directory not found: {}", dataset_dir.display());
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {pos} files {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );

    let records = collect_signatures(dataset_dir, |path| {
        pb.set_message(path.display().to_string());
        pb.inc(1);
    })?;
    pb.finish_with_message("Done");

    info!("Found {} models in {}", records.len(), dataset_dir.display());
    if records.len() < 2 {
        warn!("Fewer than 2 models found, coordinates will be random");
    }

    let mut bank = project_models(records, method);
    bank.metadata.dataset = Some(dataset.to_string());

    Ok(bank)
}

/// Projects `records` and wraps them with fresh build metadata.
pub fn project_models(records: Vec<ModelRecord>, method: ProjectionMethod) -> Database {
    let mut store = SignatureStore::new(records);
    let summary = ProjectionEngine::new(method).project(store.records_mut());
    log_summary(&summary);

    let metadata = DatabaseMetadata::new(
        store.len(),
        method,
        summary.dimension.unwrap_or_default(),
        &today_formatted(),
    );

    Database {
        models: store.into_records(),
        metadata,
    }
}

/// Reads a bank from a path or `http(s)` URL and projects it again.
pub async fn reproject(
    input: &str,
    output: &Path,
    method: impl FnOnce(&DatabaseMetadata) -> ProjectionMethod,
) -> Result<Database, Error> {
    let existing = if input.starts_with("http://") || input.starts_with("https://") {
        get_bank_remote(input).await?
    } else {
        get_bank(input)?
    };

    let method = method(&existing.metadata);
    let dataset = existing.metadata.dataset.clone();

    let mut bank = project_models(existing.models, method);
    bank.metadata.dataset = dataset;

    write_bank(output, &bank)?;
    println!("Reprojected {} models with {method} into {}", bank.metadata.total_models, output.display());

    Ok(bank)
}

fn log_summary(summary: &ProjectionSummary) {
    info!(
        "Projection {}: {} projected, {} randomized, dimension {:?}",
        summary.method, summary.projected, summary.randomized, summary.dimension
    );
}
