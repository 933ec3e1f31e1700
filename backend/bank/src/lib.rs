//! # Signature Bank
//!
//! Shared data layer for the DNA atlas.
//!
//! The bank is the `dna_database.json` file written by the offline `process`
//! build and read by the server at startup. It holds every model record with
//! its signature and its 2D display coordinates.
//!
//! ## Modules
//! - [`models`]: serde model of the database file
//! - [`identity`]: descriptive fields parsed from raw model ids
//! - [`store`]: in-memory [`store::SignatureStore`] with id lookups
//! - [`similarity`]: Euclidean distance and similarity ranking
use std::{fs, path::Path};

use anyhow::{Context, Error};
use reqwest::get;

pub mod identity;
pub mod models;
pub mod similarity;
pub mod store;

use models::Database;

pub const BANK_PATH: &str = "public/dna_database.json";

pub fn get_bank(path: impl AsRef<Path>) -> Result<Database, Error> {
    let path = path.as_ref();
    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;

    serde_json::from_slice(&data).with_context(|| format!("decoding {}", path.display()))
}

pub async fn get_bank_remote(url: &str) -> Result<Database, Error> {
    let response = get(url).await?.error_for_status()?;
    let bytes = response.bytes().await?;

    serde_json::from_slice(&bytes).with_context(|| format!("decoding database from {url}"))
}

pub fn write_bank(path: impl AsRef<Path>, bank: &Database) -> Result<(), Error> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_vec_pretty(bank)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}
