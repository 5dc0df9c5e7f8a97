//! Exact-count quota initialization.
//!
//! Quotas come from the per-item `count` of every exact-count layer. When a
//! layer's counts do not add up to the requested export total they are
//! rescaled with the largest-remainder method, so each layer's quotas always
//! sum to exactly the total.

use crate::models::{QuotaState, TraitCatalog};

/// Rescales `counts` so they sum to exactly `total`.
///
/// Each entry receives `floor(count * total / sum)`; the units still missing go
/// to the entries with the largest fractional remainders (lower index wins
/// ties). Counts summing to zero are spread evenly instead.
#[must_use]
pub fn scale_counts_to_total(counts: &[u32], total: u32) -> Vec<u32> {
    if counts.is_empty() {
        return Vec::new();
    }

    let sum: u64 = counts.iter().map(|count| u64::from(*count)).sum();
    let total_wide = u64::from(total);

    if sum == 0 {
        let len = counts.len() as u64;
        let base = total_wide / len;
        let extra = total_wide % len;
        return (0..len)
            .map(|index| (base + u64::from(index < extra)) as u32)
            .collect();
    }

    if sum == total_wide {
        return counts.to_vec();
    }

    let mut scaled: Vec<u32> = Vec::with_capacity(counts.len());
    let mut remainders: Vec<(usize, u64)> = Vec::with_capacity(counts.len());
    for (index, count) in counts.iter().enumerate() {
        let product = u64::from(*count) * total_wide;
        scaled.push((product / sum) as u32);
        remainders.push((index, product % sum));
    }

    let assigned: u64 = scaled.iter().map(|count| u64::from(*count)).sum();
    let missing = (total_wide - assigned) as usize;

    remainders.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    for (index, _) in remainders.into_iter().take(missing) {
        scaled[index] += 1;
    }

    scaled
}

/// Builds the quota state for an export of `total` combinations.
///
/// Only layers in exact-count mode with at least one item are tracked.
#[must_use]
pub fn initialize_quotas(catalog: &TraitCatalog, total: u32) -> QuotaState {
    let mut quotas = QuotaState::new();

    for layer in catalog.non_empty_layers() {
        if !layer.exact_count_mode {
            continue;
        }

        let counts: Vec<u32> = layer.items.iter().map(|item| item.count).collect();
        let scaled = scale_counts_to_total(&counts, total);
        if layer.count_total() != u64::from(total) {
            tracing::debug!(
                "Rescaled quotas of layer '{}' from {} to {}",
                layer.name,
                layer.count_total(),
                total
            );
        }

        for (item, remaining) in layer.items.iter().zip(scaled) {
            quotas.set(layer.id, item.id, remaining);
        }
    }

    quotas
}
