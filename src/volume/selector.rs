//! Volume selection
//!
//! Pure filter-and-rank over monitor snapshots. A candidate must share at
//! least one tag with the request, have enough physical free space, and
//! have enough remaining virtual budget. Candidates are ranked by most free
//! space, ties broken by name, so placement is deterministic.

use super::monitor::VolumeState;

/// Bytes per gigabyte, decimal convention
pub const BYTES_PER_GB: f64 = 1e9;

/// Pick the best volume for a request, if any qualifies
///
/// A `required_size_gb` of 0 (unknown estimate) still applies the filter
/// with a zero threshold, so any matching-tag volume with nonzero free space
/// qualifies. A deliberately permissive default for size-unknown
/// acquisitions; the overcommit risk is accepted, not mitigated.
pub fn select_volume(
    states: &[VolumeState],
    required_size_gb: f64,
    tags: &[String],
) -> Option<VolumeState> {
    let required_bytes = required_size_gb * BYTES_PER_GB;

    let mut suitable: Vec<&VolumeState> = states
        .iter()
        .filter(|vol| {
            let has_matching_tag = tags.iter().any(|tag| vol.config.tags.contains(tag));
            let has_physical_space = vol.free_space_bytes as f64 >= required_bytes;
            let virtual_budget =
                vol.config.max_size_gb * BYTES_PER_GB - vol.current_usage_bytes as f64;
            let has_virtual_space = virtual_budget >= required_bytes;

            has_matching_tag && has_physical_space && has_virtual_space
        })
        .collect();

    suitable.sort_by(|a, b| {
        b.free_space_bytes
            .cmp(&a.free_space_bytes)
            .then_with(|| a.config.name.cmp(&b.config.name))
    });

    suitable.first().map(|vol| (*vol).clone())
}
