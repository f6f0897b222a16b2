//! Storefront discovery: search filtering and distance ranking.

pub mod geo;
pub mod ranking;

pub use geo::{distance_miles, EARTH_RADIUS_MILES};
pub use ranking::{build_listings, rank_listings, BusinessListing, MarketplaceQuery};
