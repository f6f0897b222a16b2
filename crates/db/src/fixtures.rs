use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Row counts the demo marketplace must produce, keyed by table.
const SEED_TABLES: &[SeedTableContract] = &[
    SeedTableContract { table: "businesses", id_prefix: "biz-demo-", expected_rows: 4 },
    SeedTableContract { table: "business_products", id_prefix: "prod-demo-", expected_rows: 5 },
    SeedTableContract { table: "reviews", id_prefix: "rev-demo-", expected_rows: 4 },
    SeedTableContract { table: "quote_requests", id_prefix: "qr-demo-", expected_rows: 2 },
    SeedTableContract { table: "quote_responses", id_prefix: "qresp-demo-", expected_rows: 1 },
    SeedTableContract { table: "messages", id_prefix: "msg-demo-", expected_rows: 3 },
    SeedTableContract { table: "message_tags", id_prefix: "tag-demo-", expected_rows: 1 },
    SeedTableContract { table: "message_replies", id_prefix: "reply-demo-", expected_rows: 1 },
    SeedTableContract { table: "audit_event", id_prefix: "ae-demo-", expected_rows: 1 },
];

/// Deletion order respects foreign keys.
const CLEAN_ORDER: &[&str] = &[
    "audit_event",
    "message_replies",
    "message_tags",
    "messages",
    "quote_responses",
    "quote_requests",
    "reviews",
    "business_products",
    "businesses",
];

/// Quote requests seeded in a known lifecycle state.
const SEED_QUOTES: &[(&str, &str)] = &[("qr-demo-pending", "pending"), ("qr-demo-quoted", "quoted")];

/// Small deterministic marketplace: four storefronts (one inactive, one without coordinates),
/// a pending and a quoted request, and an inbox with a starred, a read and an archived message.
pub struct DemoMarketplace;

impl DemoMarketplace {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_marketplace.sql");

    pub const OWNER_ID: &str = "owner-demo-001";
    pub const CUSTOMER_ID: &str = "customer-demo-001";

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            tables_seeded: SEED_TABLES
                .iter()
                .map(|contract| (contract.table, contract.expected_rows))
                .collect(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for contract in SEED_TABLES {
            let count: i64 = sqlx::query_scalar(&format!(
                "SELECT COUNT(1) FROM {} WHERE id LIKE ?1 || '%'",
                contract.table
            ))
            .bind(contract.id_prefix)
            .fetch_one(pool)
            .await?;
            checks.push((contract.table, count == contract.expected_rows));
        }

        for (quote_id, status) in SEED_QUOTES {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM quote_requests WHERE id = ?1 AND status = ?2)",
            )
            .bind(*quote_id)
            .bind(*status)
            .fetch_one(pool)
            .await?;
            checks.push((*quote_id, present == 1));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        for table in CLEAN_ORDER {
            let Some(contract) = SEED_TABLES.iter().find(|contract| contract.table == *table)
            else {
                continue;
            };
            sqlx::query(&format!("DELETE FROM {table} WHERE id LIKE ?1 || '%'"))
                .bind(contract.id_prefix)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedTableContract {
    table: &'static str,
    id_prefix: &'static str,
    expected_rows: i64,
}

#[derive(Debug, Clone)]
pub struct SeedResult {
    pub tables_seeded: Vec<(&'static str, i64)>,
}

#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
