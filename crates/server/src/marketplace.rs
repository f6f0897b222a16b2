use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use tracing::info;

use connecthub_core::domain::business::Coordinates;
use connecthub_core::marketplace::{build_listings, rank_listings, BusinessListing, MarketplaceQuery};
use connecthub_db::repositories::BusinessRepository;

use crate::auth::RequestContext;
use crate::error::{ApiError, ApiResultExt};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct MarketplaceParams {
    pub q: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl MarketplaceParams {
    fn into_query(self, correlation_id: &str) -> Result<MarketplaceQuery, ApiError> {
        let origin = match (self.lat, self.lng) {
            (Some(latitude), Some(longitude)) => {
                Some(Coordinates::new(latitude, longitude).or_api(correlation_id)?)
            }
            (None, None) => None,
            _ => {
                return Err(ApiError::bad_request(
                    "lat and lng must be supplied together",
                    correlation_id,
                ))
            }
        };
        Ok(MarketplaceQuery { search: self.q, origin })
    }
}

/// `GET /api/v1/marketplace?q=&lat=&lng=`
pub async fn list_marketplace(
    State(state): State<AppState>,
    context: RequestContext,
    Query(params): Query<MarketplaceParams>,
) -> Result<Json<Vec<BusinessListing>>, ApiError> {
    let cid = context.correlation_id.as_str();
    let query = params.into_query(cid)?;

    let businesses = state.businesses.list_active().await.or_api(cid)?;
    let products = state.businesses.list_available_products().await.or_api(cid)?;
    let ratings = state.businesses.list_ratings().await.or_api(cid)?;
    let ranked = rank_listings(build_listings(businesses, products, &ratings), &query);

    info!(
        event_name = "marketplace.listed",
        correlation_id = %cid,
        results = ranked.len(),
        located = query.origin.is_some(),
        "marketplace listings ranked"
    );
    Ok(Json(ranked))
}
