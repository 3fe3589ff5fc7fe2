use std::cmp::Ordering;

use crate::core::{
    distance::{haversine_distance, round_distance},
    filters::is_candidate,
};
use crate::models::{NearbyQuery, ProviderListing, ProviderResult};

/// Highest rating a provider can hold
pub const MAX_RATING: f64 = 5.0;

/// Result of the in-process ranking pipeline
#[derive(Debug)]
pub struct RankResult {
    pub providers: Vec<ProviderResult>,
    pub total_candidates: usize,
}

/// Run the in-process search pipeline over raw provider listings
///
/// # Pipeline Stages
/// 1. Candidate filter (category, deleted, blocked, location)
/// 2. Distance annotation from the query origin
/// 3. Max-distance cut on the reported (rounded) distance
/// 4. Ordering and optional truncation
pub fn rank_nearby(
    query: &NearbyQuery,
    listings: impl IntoIterator<Item = ProviderListing>,
) -> RankResult {
    let mut total_candidates = 0;

    let mut providers: Vec<ProviderResult> = listings
        .into_iter()
        .filter(|listing| is_candidate(listing, query.category_id))
        .inspect(|_| total_candidates += 1)
        .filter_map(|listing| annotate(query, listing))
        .collect();

    providers.sort_by(compare_results);

    if let Some(limit) = query.limit {
        providers.truncate(limit);
    }

    RankResult {
        providers,
        total_candidates,
    }
}

/// Compute the reported distance for a candidate and drop it if out of range
fn annotate(query: &NearbyQuery, listing: ProviderListing) -> Option<ProviderResult> {
    let location = listing.location?;

    let distance_km = round_distance(haversine_distance(
        query.origin.latitude,
        query.origin.longitude,
        location.latitude,
        location.longitude,
    ));

    // Compare on the reported value so no row ever shows a distance over the limit
    if distance_km > query.max_distance_km {
        return None;
    }

    Some(ProviderResult {
        id: listing.id,
        username: listing.username,
        business_name: listing.business_name,
        category_name: listing.category_name.unwrap_or_default(),
        average_rating: clamp_rating(listing.average_rating),
        distance_km,
        whatsapp_number: listing.whatsapp_number,
        phone_number: listing.phone_number,
        profile_image_url: listing.profile_image_url,
        is_verified: listing.is_verified,
        location_text: listing.location_text,
    })
}

/// Ordering of search results
///
/// Nearest first; equal distances put the higher rated provider first, and
/// the provider id settles whatever remains so output is deterministic.
pub fn compare_results(a: &ProviderResult, b: &ProviderResult) -> Ordering {
    a.distance_km
        .total_cmp(&b.distance_km)
        .then_with(|| b.average_rating.total_cmp(&a.average_rating))
        .then_with(|| a.id.cmp(&b.id))
}

/// Ratings are reported within [0, 5]; anything unparseable reads as 0
#[inline]
pub fn clamp_rating(rating: f64) -> f64 {
    if rating.is_nan() {
        return 0.0;
    }
    rating.clamp(0.0, MAX_RATING)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Coordinates;
    use uuid::Uuid;

    fn create_listing(category_id: Uuid, lat: f64, lon: f64, rating: f64) -> ProviderListing {
        ProviderListing {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            username: "provider".to_string(),
            business_name: None,
            category_id: Some(category_id),
            category_name: Some("Plumbing".to_string()),
            average_rating: rating,
            is_verified: false,
            is_blocked: false,
            blocked_at: None,
            location: Some(Coordinates::new(lat, lon)),
            location_text: None,
            whatsapp_number: None,
            phone_number: None,
            profile_image_url: None,
            deleted_at: None,
        }
    }

    fn create_query(category_id: Uuid, max_distance_km: f64) -> NearbyQuery {
        NearbyQuery {
            category_id,
            origin: Coordinates::new(6.5244, 3.3792), // Lagos
            max_distance_km,
            limit: None,
        }
    }

    #[test]
    fn test_rank_sorted_by_distance() {
        let category = Uuid::new_v4();
        let listings = vec![
            create_listing(category, 6.60, 3.38, 5.0),
            create_listing(category, 6.53, 3.38, 1.0),
            create_listing(category, 6.56, 3.38, 3.0),
        ];

        let result = rank_nearby(&create_query(category, 50.0), listings);

        assert_eq!(result.providers.len(), 3);
        for pair in result.providers.windows(2) {
            assert!(pair[0].distance_km <= pair[1].distance_km);
        }
    }

    #[test]
    fn test_equal_distance_prefers_higher_rating() {
        let category = Uuid::new_v4();
        let listings = vec![
            create_listing(category, 6.55, 3.38, 2.5),
            create_listing(category, 6.55, 3.38, 4.5),
            create_listing(category, 6.55, 3.38, 3.0),
        ];

        let result = rank_nearby(&create_query(category, 50.0), listings);
        let ratings: Vec<f64> = result.providers.iter().map(|p| p.average_rating).collect();

        assert_eq!(ratings, vec![4.5, 3.0, 2.5]);
    }

    #[test]
    fn test_full_ties_ordered_by_id() {
        let category = Uuid::new_v4();
        let mut first = create_listing(category, 6.55, 3.38, 4.0);
        let mut second = create_listing(category, 6.55, 3.38, 4.0);
        first.id = Uuid::from_u128(2);
        second.id = Uuid::from_u128(1);

        let result = rank_nearby(&create_query(category, 50.0), vec![first, second]);

        assert_eq!(result.providers[0].id, Uuid::from_u128(1));
        assert_eq!(result.providers[1].id, Uuid::from_u128(2));
    }

    #[test]
    fn test_max_distance_excludes_far_providers() {
        let category = Uuid::new_v4();
        let listings = vec![
            create_listing(category, 6.53, 3.38, 4.0),
            create_listing(category, 7.5, 3.38, 4.0), // ~108km
        ];

        let result = rank_nearby(&create_query(category, 50.0), listings);

        assert_eq!(result.providers.len(), 1);
        assert!(result.providers.iter().all(|p| p.distance_km <= 50.0));
        assert_eq!(result.total_candidates, 2);
    }

    #[test]
    fn test_identical_location_distance_zero() {
        let category = Uuid::new_v4();
        let listings = vec![create_listing(category, 6.5244, 3.3792, 4.0)];

        let result = rank_nearby(&create_query(category, 50.0), listings);

        assert_eq!(result.providers[0].distance_km, 0.0);
    }

    #[test]
    fn test_limit_truncates_after_sorting() {
        let category = Uuid::new_v4();
        let listings = vec![
            create_listing(category, 6.60, 3.38, 5.0),
            create_listing(category, 6.53, 3.38, 1.0),
        ];
        let mut query = create_query(category, 50.0);
        query.limit = Some(1);

        let result = rank_nearby(&query, listings);

        assert_eq!(result.providers.len(), 1);
        assert!(result.providers[0].distance_km < 2.0);
    }

    #[test]
    fn test_rating_clamped() {
        assert_eq!(clamp_rating(7.2), 5.0);
        assert_eq!(clamp_rating(-1.0), 0.0);
        assert_eq!(clamp_rating(f64::NAN), 0.0);
        assert_eq!(clamp_rating(3.75), 3.75);
    }
}
