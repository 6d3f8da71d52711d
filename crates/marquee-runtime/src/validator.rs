//! Picking one composition out of a discovery result.

use marquee_core::{CompositionMetadata, DimensionOverrides, RawComposition};

use crate::errors::DiscoveryError;

/// Find `id` in `compositions`, apply `overrides` and validate the result.
///
/// Only the dimensions are overridden; fps, duration, id and props pass
/// through as the bundle reported them.
pub fn select_composition(
    mut compositions: Vec<RawComposition>,
    id: &str,
    overrides: &DimensionOverrides,
) -> Result<CompositionMetadata, DiscoveryError> {
    let Some(index) = compositions.iter().position(|c| c.id == id) else {
        return Err(DiscoveryError::CompositionNotFound {
            id: id.to_owned(),
            available: compositions.into_iter().map(|c| c.id).collect(),
        });
    };
    let found = compositions.swap_remove(index);
    if !overrides.is_empty() {
        tracing::debug!(composition_id = id, ?overrides, "applying dimension overrides");
    }
    Ok(found.with_overrides(overrides).validate()?)
}

/// Validate every composition of a discovery result.
pub fn validate_all(compositions: Vec<RawComposition>) -> Result<Vec<CompositionMetadata>, DiscoveryError> {
    compositions
        .into_iter()
        .map(|c| c.validate().map_err(DiscoveryError::from))
        .collect()
}
