use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::combinations::combination_count;

const MIB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SizeEstimate {
    pub file_count: usize,
    pub subset_size: usize,
    pub combination_count: u128,
    /// Mean byte size of one combination.
    pub per_combination_bytes: u64,
    pub total_estimated_bytes: u128,
    pub formatted_total: String,
}

/// Size of `path` in bytes, or 0 when it vanished or cannot be read.
pub fn file_size_or_zero(path: &Path) -> u64 {
    fs::metadata(path)
        .ok()
        .filter(|metadata| metadata.is_file())
        .map(|metadata| metadata.len())
        .unwrap_or(0)
}

pub fn combination_bytes<P: AsRef<Path>>(paths: &[P]) -> u64 {
    paths
        .iter()
        .map(|path| file_size_or_zero(path.as_ref()))
        .fold(0_u64, u64::saturating_add)
}

/// Estimated output size of materializing every r-combination of `files`.
///
/// Every file lands in exactly C(N-1, r-1) combinations, so the total is the
/// pool size times that count rather than a sampled guess.
pub fn estimate(files: &[PathBuf], subset_size: usize) -> SizeEstimate {
    let file_count = files.len();
    if subset_size == 0 || subset_size > file_count {
        return SizeEstimate {
            file_count,
            subset_size,
            combination_count: 0,
            per_combination_bytes: 0,
            total_estimated_bytes: 0,
            formatted_total: format_size(0),
        };
    }

    let pool_bytes = files
        .iter()
        .map(|path| file_size_or_zero(path) as u128)
        .sum::<u128>();
    let count = combination_count(file_count, subset_size);
    let occurrences = combination_count(file_count - 1, subset_size - 1);
    let total = pool_bytes.saturating_mul(occurrences);
    let per_combination = (total / count.max(1)).min(u64::MAX as u128) as u64;

    SizeEstimate {
        file_count,
        subset_size,
        combination_count: count,
        per_combination_bytes: per_combination,
        total_estimated_bytes: total,
        formatted_total: format_size(total),
    }
}

/// Renders bytes as `"{:.2} MB"` below one GiB and `"{:.2} GB"` from there on.
pub fn format_size(bytes: u128) -> String {
    let mb = bytes as f64 / MIB;
    let gb = mb / 1024.0;
    if gb >= 1.0 {
        format!("{gb:.2} GB")
    } else {
        format!("{mb:.2} MB")
    }
}
