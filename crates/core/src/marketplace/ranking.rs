use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::business::{Business, BusinessId, BusinessProduct, Coordinates, RatingSummary};
use crate::marketplace::geo::distance_miles;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MarketplaceQuery {
    pub search: Option<String>,
    pub origin: Option<Coordinates>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BusinessListing {
    #[serde(flatten)]
    pub business: Business,
    pub products: Vec<BusinessProduct>,
    pub avg_rating: f64,
    pub review_count: u32,
    pub distance_miles: Option<f64>,
}

impl BusinessListing {
    /// `needle` must already be lowercase.
    fn matches(&self, needle: &str) -> bool {
        self.business.name.to_lowercase().contains(needle)
            || self
                .business
                .category
                .as_deref()
                .is_some_and(|category| category.to_lowercase().contains(needle))
            || self.products.iter().any(|product| product.name.to_lowercase().contains(needle))
    }
}

/// Joins active storefronts with their available products and review ratings.
pub fn build_listings(
    businesses: Vec<Business>,
    products: Vec<BusinessProduct>,
    ratings: &[(BusinessId, u8)],
) -> Vec<BusinessListing> {
    let mut products_by_business: HashMap<BusinessId, Vec<BusinessProduct>> = HashMap::new();
    for product in products.into_iter().filter(|product| product.is_available) {
        products_by_business.entry(product.business_id.clone()).or_default().push(product);
    }

    businesses
        .into_iter()
        .filter(|business| business.is_active)
        .map(|business| {
            let summary = RatingSummary::from_ratings(
                ratings.iter().filter(|(id, _)| *id == business.id).map(|(_, rating)| *rating),
            );
            BusinessListing {
                products: products_by_business.remove(&business.id).unwrap_or_default(),
                avg_rating: summary.average,
                review_count: summary.count,
                distance_miles: None,
                business,
            }
        })
        .collect()
}

/// Filters by search text, then orders nearest first. Listings without a
/// distance follow, best rated first.
pub fn rank_listings(
    listings: Vec<BusinessListing>,
    query: &MarketplaceQuery,
) -> Vec<BusinessListing> {
    let needle = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_lowercase);

    let mut ranked: Vec<BusinessListing> = listings
        .into_iter()
        .map(|mut listing| {
            listing.distance_miles = query.origin.and_then(|origin| {
                listing.business.coordinates().map(|target| distance_miles(origin, target))
            });
            listing
        })
        .filter(|listing| needle.as_deref().map_or(true, |needle| listing.matches(needle)))
        .collect();

    ranked.sort_by(compare_listings);
    ranked
}

fn compare_listings(a: &BusinessListing, b: &BusinessListing) -> Ordering {
    let by_distance = match (a.distance_miles, b.distance_miles) {
        (Some(left), Some(right)) => left.total_cmp(&right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };

    by_distance
        .then_with(|| b.avg_rating.total_cmp(&a.avg_rating))
        .then_with(|| a.business.name.cmp(&b.business.name))
}
