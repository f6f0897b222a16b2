use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;
use crate::domain::{non_blank, string_id};
use crate::errors::DomainError;

string_id!(BusinessId);
string_id!(ProductId);
string_id!(ReviewId);

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, DomainError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(DomainError::Validation(format!(
                "latitude must be within -90..=90, got {latitude}"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(DomainError::Validation(format!(
                "longitude must be within -180..=180, got {longitude}"
            )));
        }
        Ok(Self { latitude, longitude })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Business {
    pub id: BusinessId,
    pub owner_id: Option<UserId>,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Business {
    /// Both coordinates are required for distance ranking.
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates { latitude, longitude }),
            _ => None,
        }
    }

    pub fn is_owned_by(&self, user: &UserId) -> bool {
        self.owner_id.as_ref() == Some(user)
    }
}

/// Storefront registration form as submitted by an owner.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessRegistration {
    pub name: String,
    pub description: String,
    pub category: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl BusinessRegistration {
    pub fn into_business(self, owner: UserId, now: DateTime<Utc>) -> Result<Business, DomainError> {
        let name = self.name.trim();
        let description = self.description.trim();
        let category = self.category.trim();

        let mut missing = Vec::new();
        if name.is_empty() {
            missing.push("name");
        }
        if description.is_empty() {
            missing.push("description");
        }
        if category.is_empty() {
            missing.push("category");
        }
        if !missing.is_empty() {
            return Err(DomainError::Validation(format!(
                "missing required business fields: {}",
                missing.join(", ")
            )));
        }

        if let (Some(latitude), Some(longitude)) = (self.latitude, self.longitude) {
            Coordinates::new(latitude, longitude)?;
        }

        Ok(Business {
            id: BusinessId::generate(),
            owner_id: Some(owner),
            name: name.to_owned(),
            description: Some(description.to_owned()),
            category: Some(category.to_owned()),
            phone: non_blank(self.phone.as_deref()),
            email: non_blank(self.email.as_deref()),
            address: non_blank(self.address.as_deref()),
            city: non_blank(self.city.as_deref()),
            state: non_blank(self.state.as_deref()),
            latitude: self.latitude,
            longitude: self.longitude,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial update of a storefront. `None` leaves a field untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_active: Option<bool>,
}

impl BusinessPatch {
    pub fn apply(self, business: &mut Business, now: DateTime<Utc>) -> Result<(), DomainError> {
        if let Some(name) = self.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(DomainError::Validation("business name cannot be blank".to_owned()));
            }
            business.name = name.to_owned();
        }
        if let Some(description) = self.description {
            business.description = non_blank(Some(&description));
        }
        if let Some(category) = self.category {
            business.category = non_blank(Some(&category));
        }
        if let Some(phone) = self.phone {
            business.phone = non_blank(Some(&phone));
        }
        if let Some(email) = self.email {
            business.email = non_blank(Some(&email));
        }
        if let Some(address) = self.address {
            business.address = non_blank(Some(&address));
        }
        if let Some(city) = self.city {
            business.city = non_blank(Some(&city));
        }
        if let Some(state) = self.state {
            business.state = non_blank(Some(&state));
        }
        if self.latitude.is_some() || self.longitude.is_some() {
            let latitude = self.latitude.or(business.latitude);
            let longitude = self.longitude.or(business.longitude);
            if let (Some(lat), Some(lng)) = (latitude, longitude) {
                Coordinates::new(lat, lng)?;
            }
            business.latitude = latitude;
            business.longitude = longitude;
        }
        if let Some(is_active) = self.is_active {
            business.is_active = is_active;
        }
        business.updated_at = now;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BusinessProduct {
    pub id: ProductId,
    pub business_id: BusinessId,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price_min: Option<Decimal>,
    pub price_max: Option<Decimal>,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price_min: Option<Decimal>,
    pub price_max: Option<Decimal>,
}

impl NewProduct {
    pub fn into_product(
        self,
        business_id: BusinessId,
        now: DateTime<Utc>,
    ) -> Result<BusinessProduct, DomainError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(DomainError::Validation("product name cannot be blank".to_owned()));
        }
        for price in [self.price_min, self.price_max].into_iter().flatten() {
            if price.is_sign_negative() {
                return Err(DomainError::Validation("product prices cannot be negative".to_owned()));
            }
        }
        if let (Some(min), Some(max)) = (self.price_min, self.price_max) {
            if min > max {
                return Err(DomainError::Validation(format!(
                    "price_min ({min}) cannot exceed price_max ({max})"
                )));
            }
        }

        Ok(BusinessProduct {
            id: ProductId::generate(),
            business_id,
            name: name.to_owned(),
            description: non_blank(self.description.as_deref()),
            category: non_blank(self.category.as_deref()),
            price_min: self.price_min,
            price_max: self.price_max,
            is_available: true,
            created_at: now,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub business_id: BusinessId,
    pub customer_id: Option<UserId>,
    pub customer_name: String,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReview {
    pub customer_name: String,
    pub rating: u8,
    pub comment: Option<String>,
}

impl NewReview {
    pub fn into_review(
        self,
        business_id: BusinessId,
        customer_id: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Review, DomainError> {
        if !(MIN_RATING..=MAX_RATING).contains(&self.rating) {
            return Err(DomainError::Validation(format!(
                "rating must be within {MIN_RATING}..={MAX_RATING}, got {}",
                self.rating
            )));
        }
        let customer_name = self.customer_name.trim();
        if customer_name.is_empty() {
            return Err(DomainError::Validation("reviewer name cannot be blank".to_owned()));
        }

        Ok(Review {
            id: ReviewId::generate(),
            business_id,
            customer_id,
            customer_name: customer_name.to_owned(),
            rating: self.rating,
            comment: non_blank(self.comment.as_deref()),
            created_at: now,
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    pub average: f64,
    pub count: u32,
}

impl RatingSummary {
    /// Average of all ratings; zero when there are no reviews.
    pub fn from_ratings<I>(ratings: I) -> Self
    where
        I: IntoIterator<Item = u8>,
    {
        let (sum, count) =
            ratings.into_iter().fold((0u32, 0u32), |(sum, count), r| (sum + u32::from(r), count + 1));
        let average = if count == 0 { 0.0 } else { f64::from(sum) / f64::from(count) };
        Self { average, count }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{BusinessPatch, BusinessRegistration, NewProduct, NewReview, RatingSummary};
    use crate::domain::business::BusinessId;
    use crate::domain::user::UserId;
    use crate::errors::DomainError;

    fn registration() -> BusinessRegistration {
        BusinessRegistration {
            name: "  Lakeside Print Shop ".to_owned(),
            description: "Custom mugs and shirts".to_owned(),
            category: "Printing".to_owned(),
            phone: Some("   ".to_owned()),
            city: Some("Austin".to_owned()),
            latitude: Some(30.2672),
            longitude: Some(-97.7431),
            ..BusinessRegistration::default()
        }
    }

    #[test]
    fn registration_trims_and_activates_business() {
        let business = registration()
            .into_business(UserId::from("owner-1"), Utc::now())
            .expect("valid registration");

        assert_eq!(business.name, "Lakeside Print Shop");
        assert!(business.is_active);
        assert_eq!(business.phone, None);
        assert_eq!(business.city.as_deref(), Some("Austin"));
        assert!(business.is_owned_by(&UserId::from("owner-1")));
        assert!(business.coordinates().is_some());
    }

    #[test]
    fn registration_lists_every_missing_required_field() {
        let error = BusinessRegistration { name: " ".to_owned(), ..BusinessRegistration::default() }
            .into_business(UserId::from("owner-1"), Utc::now())
            .expect_err("blank registration must fail");

        let DomainError::Validation(message) = error else {
            panic!("expected validation error");
        };
        assert!(message.contains("name"));
        assert!(message.contains("description"));
        assert!(message.contains("category"));
    }

    #[test]
    fn registration_rejects_out_of_range_coordinates() {
        let mut form = registration();
        form.latitude = Some(123.0);
        assert!(form.into_business(UserId::from("owner-1"), Utc::now()).is_err());
    }

    #[test]
    fn patch_keeps_untouched_fields_and_blanks_clear_optionals() {
        let mut business =
            registration().into_business(UserId::from("owner-1"), Utc::now()).expect("business");

        BusinessPatch {
            city: Some(String::new()),
            is_active: Some(false),
            ..BusinessPatch::default()
        }
        .apply(&mut business, Utc::now())
        .expect("patch");

        assert_eq!(business.city, None);
        assert!(!business.is_active);
        assert_eq!(business.name, "Lakeside Print Shop");
    }

    #[test]
    fn product_price_range_must_be_ordered() {
        let error = NewProduct {
            name: "Custom Mugs".to_owned(),
            price_min: Some(Decimal::new(2000, 2)),
            price_max: Some(Decimal::new(1000, 2)),
            ..NewProduct::default()
        }
        .into_product(BusinessId::from("biz-1"), Utc::now());

        assert!(error.is_err());
    }

    #[test]
    fn review_rating_must_be_one_to_five() {
        let review = |rating| {
            NewReview { customer_name: "Dana".to_owned(), rating, comment: None }.into_review(
                BusinessId::from("biz-1"),
                None,
                Utc::now(),
            )
        };

        assert!(review(0).is_err());
        assert!(review(6).is_err());
        assert_eq!(review(5).expect("five stars").rating, 5);
    }

    #[test]
    fn rating_summary_averages_and_handles_empty() {
        assert_eq!(RatingSummary::from_ratings(Vec::<u8>::new()), RatingSummary { average: 0.0, count: 0 });

        let summary = RatingSummary::from_ratings([5, 4, 3]);
        assert_eq!(summary.count, 3);
        assert!((summary.average - 4.0).abs() < f64::EPSILON);
    }
}
