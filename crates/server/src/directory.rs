//! Storefront management: registration, profile edits, catalog and reviews.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use connecthub_core::domain::business::{
    Business, BusinessId, BusinessPatch, BusinessProduct, BusinessRegistration, NewProduct,
    NewReview, ProductId, RatingSummary, Review,
};
use connecthub_core::domain::user::UserId;
use connecthub_core::errors::ApplicationError;
use connecthub_db::repositories::BusinessRepository;

use crate::auth::{Caller, RequestContext};
use crate::error::{ApiError, ApiResultExt};
use crate::state::AppState;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BusinessDetail {
    #[serde(flatten)]
    pub business: Business,
    pub products: Vec<BusinessProduct>,
    pub reviews: Vec<Review>,
    pub rating: RatingSummary,
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct ProductAvailability {
    pub is_available: bool,
}

pub async fn register_business(
    State(state): State<AppState>,
    caller: Caller,
    Json(registration): Json<BusinessRegistration>,
) -> Result<(StatusCode, Json<Business>), ApiError> {
    let cid = caller.correlation_id.as_str();
    let business = registration.into_business(caller.user_id.clone(), Utc::now()).or_api(cid)?;
    state.businesses.save(business.clone()).await.or_api(cid)?;

    info!(
        event_name = "directory.business.registered",
        correlation_id = %cid,
        business_id = %business.id,
        owner_id = %caller.user_id,
        "business registered"
    );
    Ok((StatusCode::CREATED, Json(business)))
}

/// `PATCH /api/v1/businesses/{id}`; `is_active` in the patch toggles visibility.
pub async fn update_business(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(patch): Json<BusinessPatch>,
) -> Result<Json<Business>, ApiError> {
    let cid = caller.correlation_id.as_str();
    let mut business = owned_business(&state, &caller.user_id, &BusinessId(id), cid).await?;

    patch.apply(&mut business, Utc::now()).or_api(cid)?;
    state.businesses.save(business.clone()).await.or_api(cid)?;

    info!(
        event_name = "directory.business.updated",
        correlation_id = %cid,
        business_id = %business.id,
        is_active = business.is_active,
        "business updated"
    );
    Ok(Json(business))
}

pub async fn my_businesses(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<Business>>, ApiError> {
    let businesses =
        state.businesses.list_by_owner(&caller.user_id).await.or_api(&caller.correlation_id)?;
    Ok(Json(businesses))
}

/// Inactive storefronts and unavailable products are only shown to the owner.
pub async fn business_detail(
    State(state): State<AppState>,
    context: RequestContext,
    Path(id): Path<String>,
) -> Result<Json<BusinessDetail>, ApiError> {
    let cid = context.correlation_id.as_str();
    let id = BusinessId(id);
    let business = visible_business(&state, context.user_id.as_ref(), &id, cid).await?;
    let is_owner = context.user_id.as_ref().is_some_and(|user| business.is_owned_by(user));

    let products = state
        .businesses
        .list_products(&id)
        .await
        .or_api(cid)?
        .into_iter()
        .filter(|product| is_owner || product.is_available)
        .collect();
    let reviews = state.businesses.list_reviews(&id).await.or_api(cid)?;
    let rating = RatingSummary::from_ratings(reviews.iter().map(|review| review.rating));

    Ok(Json(BusinessDetail { business, products, reviews, rating }))
}

pub async fn add_product(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(product): Json<NewProduct>,
) -> Result<(StatusCode, Json<BusinessProduct>), ApiError> {
    let cid = caller.correlation_id.as_str();
    let business = owned_business(&state, &caller.user_id, &BusinessId(id), cid).await?;

    let product = product.into_product(business.id.clone(), Utc::now()).or_api(cid)?;
    state.businesses.save_product(product.clone()).await.or_api(cid)?;

    info!(
        event_name = "directory.product.added",
        correlation_id = %cid,
        business_id = %business.id,
        product_id = %product.id,
        "product added"
    );
    Ok((StatusCode::CREATED, Json(product)))
}

/// `PATCH /api/v1/products/{id}`
pub async fn set_product_availability(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(availability): Json<ProductAvailability>,
) -> Result<Json<BusinessProduct>, ApiError> {
    let cid = caller.correlation_id.as_str();
    let id = ProductId(id);
    let mut product = state
        .businesses
        .find_product(&id)
        .await
        .or_api(cid)?
        .ok_or_else(|| ApiError::not_found("product", id.as_str(), cid))?;
    owned_business(&state, &caller.user_id, &product.business_id, cid).await?;

    product.is_available = availability.is_available;
    state.businesses.save_product(product.clone()).await.or_api(cid)?;

    info!(
        event_name = "directory.product.availability_changed",
        correlation_id = %cid,
        product_id = %product.id,
        is_available = product.is_available,
        "product availability changed"
    );
    Ok(Json(product))
}

/// Reviews may be left anonymously; signed-in reviewers are linked by id.
pub async fn add_review(
    State(state): State<AppState>,
    context: RequestContext,
    Path(id): Path<String>,
    Json(review): Json<NewReview>,
) -> Result<(StatusCode, Json<Review>), ApiError> {
    let cid = context.correlation_id.as_str();
    let business = visible_business(&state, None, &BusinessId(id), cid).await?;

    let review =
        review.into_review(business.id.clone(), context.user_id.clone(), Utc::now()).or_api(cid)?;
    state.businesses.add_review(review.clone()).await.or_api(cid)?;

    info!(
        event_name = "directory.review.added",
        correlation_id = %cid,
        business_id = %business.id,
        rating = review.rating,
        "review added"
    );
    Ok((StatusCode::CREATED, Json(review)))
}

async fn owned_business(
    state: &AppState,
    owner: &UserId,
    id: &BusinessId,
    correlation_id: &str,
) -> Result<Business, ApiError> {
    let business = state
        .businesses
        .find_by_id(id)
        .await
        .or_api(correlation_id)?
        .ok_or_else(|| ApiError::not_found("business", id.as_str(), correlation_id))?;

    if !business.is_owned_by(owner) {
        return Err(ApiError::from_application(
            ApplicationError::Forbidden(format!("{owner} does not own business {id}")),
            correlation_id,
        ));
    }
    Ok(business)
}

async fn visible_business(
    state: &AppState,
    viewer: Option<&UserId>,
    id: &BusinessId,
    correlation_id: &str,
) -> Result<Business, ApiError> {
    state
        .businesses
        .find_by_id(id)
        .await
        .or_api(correlation_id)?
        .filter(|business| {
            business.is_active || viewer.is_some_and(|user| business.is_owned_by(user))
        })
        .ok_or_else(|| ApiError::not_found("business", id.as_str(), correlation_id))
}

#[cfg(test)]
mod tests {
    use axum::{
        extract::{Path, State},
        http::StatusCode,
        Json,
    };
    use rust_decimal::Decimal;

    use connecthub_core::domain::business::{
        BusinessPatch, BusinessRegistration, NewProduct, NewReview,
    };
    use connecthub_core::domain::user::UserId;

    use super::{
        add_product, add_review, business_detail, my_businesses, register_business,
        set_product_availability, update_business, ProductAvailability,
    };
    use crate::auth::{Caller, RequestContext};
    use crate::state::test_support::{seeded_state, sqlite_state};

    fn caller(user: &str) -> Caller {
        Caller { user_id: UserId::from(user), correlation_id: format!("req-{user}") }
    }

    fn visitor(user: Option<&str>) -> RequestContext {
        RequestContext { user_id: user.map(UserId::from), correlation_id: "req-visitor".to_owned() }
    }

    #[tokio::test]
    async fn registered_business_is_listed_for_its_owner() {
        let state = sqlite_state().await;

        let (status, Json(business)) = register_business(
            State(state.clone()),
            caller("owner-9"),
            Json(BusinessRegistration {
                name: "Harbor Signs".to_owned(),
                description: "Neon and vinyl".to_owned(),
                category: "Signage".to_owned(),
                ..BusinessRegistration::default()
            }),
        )
        .await
        .expect("register");
        assert_eq!(status, StatusCode::CREATED);

        let Json(mine) = my_businesses(State(state), caller("owner-9")).await.expect("mine");
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, business.id);
    }

    #[tokio::test]
    async fn registration_without_category_is_a_bad_request() {
        let state = sqlite_state().await;

        let error = register_business(
            State(state),
            caller("owner-9"),
            Json(BusinessRegistration {
                name: "Harbor Signs".to_owned(),
                description: "Neon and vinyl".to_owned(),
                ..BusinessRegistration::default()
            }),
        )
        .await
        .expect_err("category missing");

        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn only_the_owner_may_update_or_deactivate() {
        let (state, _) = seeded_state().await;

        let error = update_business(
            State(state.clone()),
            caller("owner-demo-002"),
            Path("biz-demo-mugs".to_owned()),
            Json(BusinessPatch { is_active: Some(false), ..BusinessPatch::default() }),
        )
        .await
        .expect_err("not the owner");
        assert_eq!(error.status(), StatusCode::FORBIDDEN);

        let Json(updated) = update_business(
            State(state.clone()),
            caller("owner-demo-001"),
            Path("biz-demo-mugs".to_owned()),
            Json(BusinessPatch { is_active: Some(false), ..BusinessPatch::default() }),
        )
        .await
        .expect("owner update");
        assert!(!updated.is_active);

        let error = business_detail(State(state), visitor(None), Path("biz-demo-mugs".to_owned()))
            .await
            .expect_err("hidden from visitors");
        assert_eq!(error.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn detail_hides_unavailable_products_from_visitors() {
        let (state, _) = seeded_state().await;

        let Json(public) =
            business_detail(State(state.clone()), visitor(None), Path("biz-demo-wood".to_owned()))
                .await
                .expect("detail");
        assert_eq!(public.products.len(), 1);
        assert_eq!(public.reviews.len(), 1);
        assert_eq!(public.rating.count, 1);

        let Json(owner_view) = business_detail(
            State(state),
            visitor(Some("owner-demo-002")),
            Path("biz-demo-wood".to_owned()),
        )
        .await
        .expect("owner detail");
        assert_eq!(owner_view.products.len(), 2);
    }

    #[tokio::test]
    async fn products_are_added_and_toggled_by_the_owner() {
        let (state, _) = seeded_state().await;

        let (_, Json(product)) = add_product(
            State(state.clone()),
            caller("owner-demo-001"),
            Path("biz-demo-mugs".to_owned()),
            Json(NewProduct {
                name: "Enamel Pins".to_owned(),
                price_min: Some(Decimal::new(300, 2)),
                price_max: Some(Decimal::new(900, 2)),
                ..NewProduct::default()
            }),
        )
        .await
        .expect("add product");
        assert!(product.is_available);

        let error = set_product_availability(
            State(state.clone()),
            caller("owner-demo-002"),
            Path(product.id.0.clone()),
            Json(ProductAvailability { is_available: false }),
        )
        .await
        .expect_err("other owner");
        assert_eq!(error.status(), StatusCode::FORBIDDEN);

        let Json(hidden) = set_product_availability(
            State(state),
            caller("owner-demo-001"),
            Path(product.id.0.clone()),
            Json(ProductAvailability { is_available: false }),
        )
        .await
        .expect("toggle");
        assert!(!hidden.is_available);
    }

    #[tokio::test]
    async fn reviews_validate_rating_and_reach_the_detail_page() {
        let (state, _) = seeded_state().await;

        let error = add_review(
            State(state.clone()),
            visitor(None),
            Path("biz-demo-bakery".to_owned()),
            Json(NewReview { customer_name: "Lee".to_owned(), rating: 6, comment: None }),
        )
        .await
        .expect_err("rating out of range");
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);

        let (status, Json(review)) = add_review(
            State(state.clone()),
            visitor(Some("customer-demo-001")),
            Path("biz-demo-bakery".to_owned()),
            Json(NewReview { customer_name: "Dana Reyes".to_owned(), rating: 3, comment: None }),
        )
        .await
        .expect("review");
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(review.customer_id, Some(UserId::from("customer-demo-001")));

        let Json(detail) =
            business_detail(State(state), visitor(None), Path("biz-demo-bakery".to_owned()))
                .await
                .expect("detail");
        assert_eq!(detail.rating.count, 2);
        assert_eq!(detail.rating.average, 4.0);
        assert_eq!(detail.reviews[0].id, review.id);
    }
}
