use std::sync::Arc;

use connecthub_core::config::{AppConfig, AuthConfig};
use connecthub_core::notifications::NotificationDispatcher;
use connecthub_db::repositories::{
    BusinessRepository, MessageRepository, NotificationSettingsRepository, QuoteRepository,
    SqlBusinessRepository, SqlMessageRepository, SqlNotificationSettingsRepository,
    SqlQuoteRepository,
};
use connecthub_db::DbPool;

use crate::changes::ChangeFeed;
use crate::notify::{LoggingDispatcher, Notifier};

#[derive(Clone)]
pub struct AppState {
    pub businesses: Arc<dyn BusinessRepository>,
    pub quotes: Arc<dyn QuoteRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub notification_settings: Arc<dyn NotificationSettingsRepository>,
    pub notifier: Notifier,
    pub changes: ChangeFeed,
    pub auth: AuthConfig,
}

impl AppState {
    /// SQL-backed state with the logging dispatcher.
    pub fn from_pool(pool: DbPool, config: &AppConfig) -> Result<Self, tera::Error> {
        let dispatcher = Arc::new(LoggingDispatcher::new(config.notifications.sender_name.clone()));
        Self::with_dispatcher(pool, config, dispatcher)
    }

    pub fn with_dispatcher(
        pool: DbPool,
        config: &AppConfig,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Result<Self, tera::Error> {
        Ok(Self {
            businesses: Arc::new(SqlBusinessRepository::new(pool.clone())),
            quotes: Arc::new(SqlQuoteRepository::new(pool.clone())),
            messages: Arc::new(SqlMessageRepository::new(pool.clone())),
            notification_settings: Arc::new(SqlNotificationSettingsRepository::new(pool)),
            notifier: Notifier::new(dispatcher, config.notifications.enabled)?,
            changes: ChangeFeed::default(),
            auth: config.auth.clone(),
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use connecthub_core::config::AppConfig;
    use connecthub_core::notifications::InMemoryNotificationDispatcher;
    use connecthub_db::{connect_with_settings, migrations, DemoMarketplace, DbPool};

    use super::AppState;

    pub(crate) async fn migrated_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    pub(crate) async fn sqlite_state() -> AppState {
        AppState::from_pool(migrated_pool().await, &AppConfig::default()).expect("state")
    }

    /// Demo marketplace loaded, with a recording dispatcher.
    pub(crate) async fn seeded_state() -> (AppState, InMemoryNotificationDispatcher) {
        let pool = migrated_pool().await;
        DemoMarketplace::load(&pool).await.expect("seed");
        let dispatcher = InMemoryNotificationDispatcher::default();
        let state =
            AppState::with_dispatcher(pool, &AppConfig::default(), Arc::new(dispatcher.clone()))
                .expect("state");
        (state, dispatcher)
    }
}
