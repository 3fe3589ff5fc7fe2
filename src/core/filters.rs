use crate::models::ProviderListing;
use uuid::Uuid;

/// Check if a provider is a search candidate for a category
///
/// A candidate is in the requested category, not soft-deleted, not blocked
/// (regardless of how long ago it was blocked), and has a location.
/// Verification status never filters; it only travels with the result.
#[inline]
pub fn is_candidate(provider: &ProviderListing, category_id: Uuid) -> bool {
    if provider.category_id != Some(category_id) {
        return false;
    }

    if provider.deleted_at.is_some() || provider.is_blocked {
        return false;
    }

    // Without a location the provider cannot be placed on the map
    provider.location.is_some()
}

/// Keep only the search candidates for a category
pub fn filter_candidates(
    providers: impl IntoIterator<Item = ProviderListing>,
    category_id: Uuid,
) -> Vec<ProviderListing> {
    providers
        .into_iter()
        .filter(|provider| is_candidate(provider, category_id))
        .collect()
}
