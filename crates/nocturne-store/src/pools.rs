//! Content pool files.
//!
//! Pools are TOML arrays of `[[entry]]` tables. A default pool ships inside
//! the binary so a fresh install can be seeded without any files on disk.

use std::path::Path;

use serde::Deserialize;

use nocturne_core::{PoolEntry, TimeScope};

use crate::error::{Result, StoreError};
use crate::store::Store;

pub const DEFAULT_POOLS: &str = include_str!("../data/default_pools.toml");

#[derive(Debug, Deserialize)]
struct PoolFile {
    #[serde(default)]
    entry: Vec<PoolRow>,
}

#[derive(Debug, Deserialize)]
struct PoolRow {
    category: String,
    #[serde(default = "any_time")]
    time: String,
    #[serde(default)]
    min: f64,
    #[serde(default = "one")]
    max: f64,
    #[serde(default = "one")]
    weight: f64,
    template: String,
}

fn any_time() -> String {
    "*".to_string()
}

fn one() -> f64 {
    1.0
}

/// Parse and validate a pool file.
pub fn parse_pools(text: &str) -> Result<Vec<PoolEntry>> {
    let file: PoolFile = toml::from_str(text)?;

    file.entry
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            let time_scope = TimeScope::parse(&row.time).ok_or_else(|| {
                StoreError::InvalidData(format!("entry {i}: unknown time '{}'", row.time))
            })?;
            if !(row.min.is_finite() && row.max.is_finite() && row.min <= row.max) {
                return Err(StoreError::InvalidData(format!(
                    "entry {i}: range [{}, {}] is empty",
                    row.min, row.max
                )));
            }
            if !row.weight.is_finite() || row.weight < 0.0 {
                return Err(StoreError::InvalidData(format!(
                    "entry {i}: weight {} is negative",
                    row.weight
                )));
            }
            if row.template.trim().is_empty() {
                return Err(StoreError::InvalidData(format!("entry {i}: empty template")));
            }
            Ok(PoolEntry {
                category: row.category,
                time_scope,
                min_value: row.min,
                max_value: row.max,
                weight: row.weight,
                template: row.template.trim().to_string(),
            })
        })
        .collect()
}

pub fn default_pools() -> Result<Vec<PoolEntry>> {
    parse_pools(DEFAULT_POOLS)
}

/// Replace the store's pool with the entries in `path`, or with the built-in
/// pool when `path` is `None`.
pub fn seed(store: &Store, path: Option<&Path>) -> Result<usize> {
    let entries = match path {
        Some(p) => parse_pools(&std::fs::read_to_string(p)?)?,
        None => default_pools()?,
    };
    let n = store.replace_pool(&entries)?;
    tracing::info!("seeded {n} pool entries");
    Ok(n)
}
