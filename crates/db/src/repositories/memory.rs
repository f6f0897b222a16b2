use std::collections::HashMap;

use tokio::sync::RwLock;

use connecthub_core::domain::business::{
    Business, BusinessId, BusinessProduct, ProductId, Review,
};
use connecthub_core::domain::notification::NotificationSettings;
use connecthub_core::domain::user::UserId;

use super::{BusinessRepository, NotificationSettingsRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryBusinessRepository {
    businesses: RwLock<HashMap<BusinessId, Business>>,
    products: RwLock<HashMap<ProductId, BusinessProduct>>,
    reviews: RwLock<Vec<Review>>,
}

#[async_trait::async_trait]
impl BusinessRepository for InMemoryBusinessRepository {
    async fn find_by_id(&self, id: &BusinessId) -> Result<Option<Business>, RepositoryError> {
        let businesses = self.businesses.read().await;
        Ok(businesses.get(id).cloned())
    }

    async fn save(&self, business: Business) -> Result<(), RepositoryError> {
        let mut businesses = self.businesses.write().await;
        businesses.insert(business.id.clone(), business);
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<Business>, RepositoryError> {
        let businesses = self.businesses.read().await;
        let mut active: Vec<Business> =
            businesses.values().filter(|business| business.is_active).cloned().collect();
        active.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(active)
    }

    async fn list_by_owner(&self, owner: &UserId) -> Result<Vec<Business>, RepositoryError> {
        let businesses = self.businesses.read().await;
        let mut owned: Vec<Business> =
            businesses.values().filter(|business| business.is_owned_by(owner)).cloned().collect();
        owned.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(owned)
    }

    async fn find_product(
        &self,
        id: &ProductId,
    ) -> Result<Option<BusinessProduct>, RepositoryError> {
        let products = self.products.read().await;
        Ok(products.get(id).cloned())
    }

    async fn save_product(&self, product: BusinessProduct) -> Result<(), RepositoryError> {
        let mut products = self.products.write().await;
        products.insert(product.id.clone(), product);
        Ok(())
    }

    async fn list_products(
        &self,
        business_id: &BusinessId,
    ) -> Result<Vec<BusinessProduct>, RepositoryError> {
        let products = self.products.read().await;
        let mut listed: Vec<BusinessProduct> =
            products.values().filter(|product| product.business_id == *business_id).cloned().collect();
        listed.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(listed)
    }

    async fn list_available_products(&self) -> Result<Vec<BusinessProduct>, RepositoryError> {
        let products = self.products.read().await;
        let mut listed: Vec<BusinessProduct> =
            products.values().filter(|product| product.is_available).cloned().collect();
        listed.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(listed)
    }

    async fn add_review(&self, review: Review) -> Result<(), RepositoryError> {
        self.reviews.write().await.push(review);
        Ok(())
    }

    async fn list_reviews(&self, business_id: &BusinessId) -> Result<Vec<Review>, RepositoryError> {
        let reviews = self.reviews.read().await;
        Ok(reviews.iter().rev().filter(|review| review.business_id == *business_id).cloned().collect())
    }

    async fn list_ratings(&self) -> Result<Vec<(BusinessId, u8)>, RepositoryError> {
        let reviews = self.reviews.read().await;
        Ok(reviews.iter().map(|review| (review.business_id.clone(), review.rating)).collect())
    }
}

#[derive(Default)]
pub struct InMemoryNotificationSettingsRepository {
    settings: RwLock<HashMap<UserId, NotificationSettings>>,
}

#[async_trait::async_trait]
impl NotificationSettingsRepository for InMemoryNotificationSettingsRepository {
    async fn get(&self, user: &UserId) -> Result<NotificationSettings, RepositoryError> {
        let settings = self.settings.read().await;
        Ok(settings
            .get(user)
            .cloned()
            .unwrap_or_else(|| NotificationSettings::defaults_for(user.clone())))
    }

    async fn save(&self, settings: NotificationSettings) -> Result<(), RepositoryError> {
        let mut stored = self.settings.write().await;
        stored.insert(settings.user_id.clone(), settings);
        Ok(())
    }
}
