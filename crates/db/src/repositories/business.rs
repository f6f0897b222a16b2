use sqlx::{sqlite::SqliteRow, Row};

use connecthub_core::domain::business::{
    Business, BusinessId, BusinessProduct, ProductId, Review, ReviewId,
};
use connecthub_core::domain::user::UserId;

use super::codec::{
    encode_timestamp, parse_optional_decimal, parse_timestamp, parse_u8,
};
use super::{BusinessRepository, RepositoryError};
use crate::DbPool;

const BUSINESS_COLUMNS: &str = "id, owner_id, name, description, category, phone, email, address,
    city, state, latitude, longitude, is_active, created_at, updated_at";

const PRODUCT_COLUMNS: &str =
    "id, business_id, name, description, category, price_min, price_max, is_available, created_at";

pub struct SqlBusinessRepository {
    pool: DbPool,
}

impl SqlBusinessRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl BusinessRepository for SqlBusinessRepository {
    async fn find_by_id(&self, id: &BusinessId) -> Result<Option<Business>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {BUSINESS_COLUMNS} FROM businesses WHERE id = ?"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(business_from_row).transpose()
    }

    async fn save(&self, business: Business) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO businesses (
                id, owner_id, name, description, category, phone, email, address,
                city, state, latitude, longitude, is_active, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                name = excluded.name,
                description = excluded.description,
                category = excluded.category,
                phone = excluded.phone,
                email = excluded.email,
                address = excluded.address,
                city = excluded.city,
                state = excluded.state,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at",
        )
        .bind(business.id.as_str())
        .bind(business.owner_id.as_ref().map(UserId::as_str))
        .bind(&business.name)
        .bind(business.description.as_deref())
        .bind(business.category.as_deref())
        .bind(business.phone.as_deref())
        .bind(business.email.as_deref())
        .bind(business.address.as_deref())
        .bind(business.city.as_deref())
        .bind(business.state.as_deref())
        .bind(business.latitude)
        .bind(business.longitude)
        .bind(business.is_active)
        .bind(encode_timestamp(&business.created_at))
        .bind(encode_timestamp(&business.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<Business>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {BUSINESS_COLUMNS} FROM businesses WHERE is_active = 1 ORDER BY name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(business_from_row).collect()
    }

    async fn list_by_owner(&self, owner: &UserId) -> Result<Vec<Business>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {BUSINESS_COLUMNS} FROM businesses WHERE owner_id = ? ORDER BY created_at DESC"
        ))
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(business_from_row).collect()
    }

    async fn find_product(
        &self,
        id: &ProductId,
    ) -> Result<Option<BusinessProduct>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM business_products WHERE id = ?"))
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        row.map(product_from_row).transpose()
    }

    async fn save_product(&self, product: BusinessProduct) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO business_products (
                id, business_id, name, description, category, price_min, price_max,
                is_available, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                category = excluded.category,
                price_min = excluded.price_min,
                price_max = excluded.price_max,
                is_available = excluded.is_available",
        )
        .bind(product.id.as_str())
        .bind(product.business_id.as_str())
        .bind(&product.name)
        .bind(product.description.as_deref())
        .bind(product.category.as_deref())
        .bind(product.price_min.map(|price| price.to_string()))
        .bind(product.price_max.map(|price| price.to_string()))
        .bind(product.is_available)
        .bind(encode_timestamp(&product.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_products(
        &self,
        business_id: &BusinessId,
    ) -> Result<Vec<BusinessProduct>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM business_products
             WHERE business_id = ?
             ORDER BY created_at ASC"
        ))
        .bind(business_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(product_from_row).collect()
    }

    async fn list_available_products(&self) -> Result<Vec<BusinessProduct>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM business_products
             WHERE is_available = 1
             ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(product_from_row).collect()
    }

    async fn add_review(&self, review: Review) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO reviews (
                id, business_id, customer_id, customer_name, rating, comment, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(review.id.as_str())
        .bind(review.business_id.as_str())
        .bind(review.customer_id.as_ref().map(UserId::as_str))
        .bind(&review.customer_name)
        .bind(i64::from(review.rating))
        .bind(review.comment.as_deref())
        .bind(encode_timestamp(&review.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_reviews(&self, business_id: &BusinessId) -> Result<Vec<Review>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, business_id, customer_id, customer_name, rating, comment, created_at
             FROM reviews
             WHERE business_id = ?
             ORDER BY created_at DESC",
        )
        .bind(business_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(review_from_row).collect()
    }

    async fn list_ratings(&self) -> Result<Vec<(BusinessId, u8)>, RepositoryError> {
        let rows = sqlx::query("SELECT business_id, rating FROM reviews")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| -> Result<(BusinessId, u8), RepositoryError> {
                Ok((
                    BusinessId(row.try_get("business_id")?),
                    parse_u8("rating", row.try_get("rating")?)?,
                ))
            })
            .collect()
    }
}

pub(crate) fn business_from_row(row: SqliteRow) -> Result<Business, RepositoryError> {
    Ok(Business {
        id: BusinessId(row.try_get("id")?),
        owner_id: row.try_get::<Option<String>, _>("owner_id")?.map(UserId),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
        address: row.try_get("address")?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        is_active: row.try_get("is_active")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn product_from_row(row: SqliteRow) -> Result<BusinessProduct, RepositoryError> {
    Ok(BusinessProduct {
        id: ProductId(row.try_get("id")?),
        business_id: BusinessId(row.try_get("business_id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        price_min: parse_optional_decimal("price_min", row.try_get("price_min")?)?,
        price_max: parse_optional_decimal("price_max", row.try_get("price_max")?)?,
        is_available: row.try_get("is_available")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn review_from_row(row: SqliteRow) -> Result<Review, RepositoryError> {
    Ok(Review {
        id: ReviewId(row.try_get("id")?),
        business_id: BusinessId(row.try_get("business_id")?),
        customer_id: row.try_get::<Option<String>, _>("customer_id")?.map(UserId),
        customer_name: row.try_get("customer_name")?,
        rating: parse_u8("rating", row.try_get("rating")?)?,
        comment: row.try_get("comment")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
