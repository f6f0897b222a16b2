use std::future::Future;
use std::time::Instant;

use anyhow::{ensure, Context};
use chrono::Utc;
use connecthub_core::audit::AuditContext;
use connecthub_core::config::{AppConfig, LoadOptions};
use connecthub_core::domain::business::{BusinessId, ProductId};
use connecthub_core::domain::quote::{NewQuoteRequest, NewQuoteResponse, QuoteStatus};
use connecthub_core::domain::user::UserId;
use connecthub_core::marketplace::{build_listings, rank_listings, MarketplaceQuery};
use connecthub_db::repositories::{
    BusinessRepository, QuoteRepository, SqlBusinessRepository, SqlQuoteRepository,
};
use connecthub_db::{connect_with_settings, migrations, DbPool, DemoMarketplace};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::commands::CommandResult;

/// Smoke runs never touch the configured database.
const SMOKE_DATABASE_URL: &str = "sqlite::memory:";
const SMOKE_CORRELATION_ID: &str = "smoke";
const FLOW_CHECKS: [&str; 5] =
    ["db_connectivity", "migration_visibility", "demo_seed", "marketplace_search", "quote_to_order"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(LoadOptions::default())) {
        Ok((elapsed_ms, config)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Pass,
                elapsed_ms,
                message: "configuration loaded and validated".to_string(),
            });
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Fail,
                elapsed_ms,
                message: error.to_string(),
            });
            skip_all(&mut checks, &FLOW_CHECKS);
            return finalize_report(checks, elapsed_since(started));
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Fail,
                elapsed_ms: 0,
                message: format!("failed to initialize async runtime: {error}"),
            });
            skip_all(&mut checks, &FLOW_CHECKS[1..]);
            return finalize_report(checks, elapsed_since(started));
        }
    };

    runtime.block_on(run_flow(&config, &mut checks));
    finalize_report(checks, elapsed_since(started))
}

async fn run_flow(config: &AppConfig, checks: &mut Vec<SmokeCheck>) {
    let (elapsed_ms, connected) =
        timed(connect_with_settings(SMOKE_DATABASE_URL, 1, config.database.timeout_secs)).await;
    let pool = match connected {
        Ok(pool) => {
            let message = format!("connected using `{SMOKE_DATABASE_URL}`");
            record(checks, FLOW_CHECKS[0], elapsed_ms, Ok(message));
            pool
        }
        Err(error) => {
            record(checks, FLOW_CHECKS[0], elapsed_ms, Err(anyhow::Error::new(error)));
            skip_all(checks, &FLOW_CHECKS[1..]);
            return;
        }
    };

    run_steps(&pool, checks).await;
    pool.close().await;
}

async fn run_steps(pool: &DbPool, checks: &mut Vec<SmokeCheck>) {
    let (elapsed_ms, result) = timed(apply_migrations(pool)).await;
    if !record(checks, FLOW_CHECKS[1], elapsed_ms, result) {
        return skip_all(checks, &FLOW_CHECKS[2..]);
    }

    let (elapsed_ms, result) = timed(load_demo_marketplace(pool)).await;
    if !record(checks, FLOW_CHECKS[2], elapsed_ms, result) {
        return skip_all(checks, &FLOW_CHECKS[3..]);
    }

    let (elapsed_ms, result) = timed(search_marketplace(pool)).await;
    if !record(checks, FLOW_CHECKS[3], elapsed_ms, result) {
        return skip_all(checks, &FLOW_CHECKS[4..]);
    }

    let (elapsed_ms, result) = timed(quote_to_order(pool)).await;
    record(checks, FLOW_CHECKS[4], elapsed_ms, result);
}

async fn apply_migrations(pool: &DbPool) -> anyhow::Result<String> {
    migrations::run_pending(pool).await.context("migration execution failed")?;
    Ok(format!("{} migrations are visible and executable", migrations::MIGRATOR.iter().count()))
}

async fn load_demo_marketplace(pool: &DbPool) -> anyhow::Result<String> {
    DemoMarketplace::load(pool).await.context("demo marketplace failed to load")?;
    let verification = DemoMarketplace::verify(pool).await?;
    ensure!(verification.all_present, "demo marketplace rows are missing after load");
    Ok(format!("{} seed checks verified", verification.checks.len()))
}

async fn search_marketplace(pool: &DbPool) -> anyhow::Result<String> {
    let businesses = SqlBusinessRepository::new(pool.clone());
    let listings = build_listings(
        businesses.list_active().await?,
        businesses.list_available_products().await?,
        &businesses.list_ratings().await?,
    );
    let query = MarketplaceQuery { search: Some("mugs".to_owned()), origin: None };
    let ranked = rank_listings(listings, &query);

    ensure!(ranked.len() == 1, "expected one storefront for `mugs`, found {}", ranked.len());
    Ok(format!("`mugs` matched `{}`", ranked[0].business.name))
}

/// Five custom mugs quoted at 49.99 and accepted once; the second accept must be refused.
async fn quote_to_order(pool: &DbPool) -> anyhow::Result<String> {
    let quotes = SqlQuoteRepository::new(pool.clone());
    let owner = UserId::from(DemoMarketplace::OWNER_ID);
    let customer = UserId::from(DemoMarketplace::CUSTOMER_ID);
    let price = Decimal::new(4999, 2);

    let request = NewQuoteRequest {
        business_id: BusinessId::from("biz-demo-mugs"),
        product_id: Some(ProductId::from("prod-demo-mugs")),
        product_name: "Custom Mugs".to_owned(),
        quantity: Some(5),
        ..NewQuoteRequest::default()
    }
    .into_request(customer.clone(), Utc::now())?;
    quotes.submit(request.clone()).await?;

    let owner_audit =
        AuditContext::new(Some(request.id.clone()), SMOKE_CORRELATION_ID, owner.as_str());
    let (quoted, response) = quotes
        .respond(
            &owner,
            &request.id,
            NewQuoteResponse { price_estimate: price, ..NewQuoteResponse::default() },
            &owner_audit,
        )
        .await
        .context("owner response was refused")?;
    ensure!(
        quoted.status == QuoteStatus::Quoted,
        "request is {} after responding",
        quoted.status.as_str()
    );

    let customer_audit =
        AuditContext::new(Some(request.id.clone()), SMOKE_CORRELATION_ID, customer.as_str());
    let (accepted, order) = quotes
        .accept(&customer, &request.id, &response.id, &customer_audit)
        .await
        .context("customer acceptance was refused")?;
    ensure!(
        accepted.status == QuoteStatus::Accepted,
        "request is {} after accepting",
        accepted.status.as_str()
    );
    ensure!(order.final_price == price, "order priced at {} instead of {price}", order.final_price);

    let second = quotes.accept(&customer, &request.id, &response.id, &customer_audit).await;
    ensure!(second.is_err(), "a second accept was allowed");

    let orders = quotes.orders_for_customer(&customer).await?;
    let placed = orders.iter().filter(|order| order.quote_request_id == request.id).count();
    ensure!(placed == 1, "expected exactly one order, found {placed}");

    Ok(format!("order {} placed at {}", order.id, order.final_price))
}

fn record(
    checks: &mut Vec<SmokeCheck>,
    name: &'static str,
    elapsed_ms: u64,
    result: anyhow::Result<String>,
) -> bool {
    let (status, message) = match result {
        Ok(message) => (SmokeStatus::Pass, message),
        Err(error) => (SmokeStatus::Fail, format!("{error:#}")),
    };
    checks.push(SmokeCheck { name, status, elapsed_ms, message });
    status == SmokeStatus::Pass
}

async fn timed<T>(future: impl Future<Output = T>) -> (u64, T) {
    let started = Instant::now();
    let output = future.await;
    (elapsed_since(started), output)
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((elapsed_since(started), value)),
        Err(error) => Err((elapsed_since(started), error)),
    }
}

fn elapsed_since(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn skip_all(checks: &mut Vec<SmokeCheck>, names: &[&'static str]) {
    checks.extend(names.iter().map(|&name| SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due previous failure".to_string(),
    }));
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult { exit_code: if failed { 6 } else { 0 }, output: format!("{human}\n{machine}") }
}
