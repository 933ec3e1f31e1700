use std::{
    collections::{HashMap, hash_map::Entry},
    fs,
    path::Path,
};

use anyhow::{Context, Error};
use bank::models::{ModelRecord, ProjectionMethod};
use chrono::prelude::*;
use tracing::warn;
use walkdir::WalkDir;

use crate::models::{DNA_SUFFIX, DRYRUN_SUFFIX, RawDna};

pub fn today_formatted() -> String {
    let today = Local::now().date_naive();
    today.format("%Y-%m-%d").to_string()
}

/// Environment key for a per-dataset projection override.
pub fn dataset_method_key(dataset: &str) -> String {
    let suffix: String = dataset
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();

    format!("PROJECTION_METHOD_{suffix}")
}

/// Picks the projection method: flag, then per-dataset key, then `PROJECTION_METHOD`.
///
/// Returns `None` when nothing is configured so the caller can pick its own
/// default. Unknown values resolve to PCA with a warning.
pub fn resolve_method<F>(flag: Option<&str>, dataset: Option<&str>, lookup: F) -> Option<ProjectionMethod>
where
    F: Fn(&str) -> Option<String>,
{
    flag.map(str::to_string)
        .or_else(|| dataset.and_then(|d| lookup(&dataset_method_key(d))))
        .or_else(|| lookup("PROJECTION_METHOD"))
        .map(|value| ProjectionMethod::parse_or_default(&value))
}

pub fn is_dna_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(DNA_SUFFIX) && !name.ends_with(DRYRUN_SUFFIX))
}

pub fn model_id_from_path(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    name.strip_suffix(DNA_SUFFIX).map(str::to_string)
}

/// Preference for duplicate model ids: outputs under an `embed` folder win.
pub fn source_score(path: &Path) -> u8 {
    u8::from(path.to_string_lossy().to_lowercase().contains("embed"))
}

fn read_dna(path: &Path) -> Result<Option<RawDna>, Error> {
    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let dna: RawDna =
        serde_json::from_slice(&data).with_context(|| format!("decoding {}", path.display()))?;

    let usable = dna.signature.as_ref().is_some_and(|s| !s.is_empty());
    Ok(usable.then_some(dna))
}

/// Collects one record per display id from every `*_dna.json` under `dataset_dir`.
///
/// `on_file` is called once per candidate file.
pub fn collect_signatures(
    dataset_dir: &Path,
    mut on_file: impl FnMut(&Path),
) -> Result<Vec<ModelRecord>, Error> {
    let mut records: Vec<(u8, ModelRecord)> = Vec::new();
    let mut id_to_index: HashMap<String, usize> = HashMap::new();

    let walker = WalkDir::new(dataset_dir).sort_by_file_name().into_iter();
    for entry in walker {
        let entry = entry.with_context(|| format!("walking {}", dataset_dir.display()))?;
        let path = entry.path();

        if !entry.file_type().is_file() || !is_dna_file(path) {
            continue;
        }
        on_file(path);

        let Some(model_id) = model_id_from_path(path) else {
            continue;
        };

        let dna = match read_dna(path) {
            Ok(Some(dna)) => dna,
            Ok(None) => continue,
            Err(e) => {
                warn!("Skipping {}: {e:#}", path.display());
                continue;
            }
        };

        let score = source_score(path.strip_prefix(dataset_dir).unwrap_or(path));
        let mut record = ModelRecord::from_raw_id(&model_id, dna.signature);
        if let Some(extra) = dna.metadata {
            for (key, value) in extra {
                record.metadata.extra.entry(key).or_insert(value);
            }
        }

        match id_to_index.entry(record.id.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(records.len());
                records.push((score, record));
            }
            Entry::Occupied(entry) => {
                let slot = &mut records[*entry.get()];
                if score > slot.0 {
                    *slot = (score, record);
                }
            }
        }
    }

    Ok(records.into_iter().map(|(_, record)| record).collect())
}
