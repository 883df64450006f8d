//! Candidate intake: pull every address-shaped value out of a CSV export.
//!
//! Holder exports come from explorers with unpredictable column names (or no
//! header row at all), so the address format itself is the column
//! discriminator: the first field of each row that parses as an address wins.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use ethers::types::Address;

/// Deduplicated candidates in first-seen order. Malformed rows and fields
/// are dropped silently; parsing normalizes case.
pub fn extract_addresses(path: &Path) -> Result<Vec<Address>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open recipient list {}", path.display()))?;

    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    for record in reader.records() {
        let Ok(record) = record else { continue };
        for field in record.iter() {
            if let Some(addr) = parse_address(field) {
                if seen.insert(addr) {
                    ordered.push(addr);
                }
                break;
            }
        }
    }
    Ok(ordered)
}

fn parse_address(field: &str) -> Option<Address> {
    let body = field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))?;
    if body.len() != 40 {
        return None;
    }
    field.parse().ok()
}
