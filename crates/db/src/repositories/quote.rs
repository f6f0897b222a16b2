use std::collections::HashMap;

use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, Sqlite, SqliteConnection, Transaction};

use connecthub_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
};
use connecthub_core::domain::business::{BusinessId, ProductId};
use connecthub_core::domain::order::{Order, OrderId, OrderStatus};
use connecthub_core::domain::quote::{
    NewQuoteResponse, QuoteRequest, QuoteRequestId, QuoteResponse, QuoteResponseId, QuoteStatus,
    QuoteThread,
};
use connecthub_core::domain::user::UserId;
use connecthub_core::errors::DomainError;
use connecthub_core::flows::{FlowContext, FlowEngine, FlowEvent, QuoteLifecycleFlow};

use super::audit::insert_event;
use super::codec::{
    encode_timestamp, parse_decimal, parse_label, parse_optional_date, parse_timestamp, parse_u32,
};
use super::{QuoteRepository, RepositoryError};
use crate::DbPool;

const REQUEST_SELECT: &str = "SELECT
        qr.id AS id,
        qr.customer_id AS customer_id,
        qr.business_id AS business_id,
        qr.product_id AS product_id,
        qr.product_name AS product_name,
        qr.quantity AS quantity,
        qr.customization_details AS customization_details,
        qr.deadline AS deadline,
        qr.status AS status,
        qr.created_at AS created_at,
        qr.updated_at AS updated_at,
        b.name AS business_name,
        b.owner_id AS business_owner_id
     FROM quote_requests qr
     JOIN businesses b ON b.id = qr.business_id";

const RESPONSE_COLUMNS: &str = "r.id AS id,
        r.quote_request_id AS quote_request_id,
        r.business_id AS business_id,
        r.price_estimate AS price_estimate,
        r.message AS message,
        r.delivery_time AS delivery_time,
        r.valid_until AS valid_until,
        r.created_at AS created_at";

const ORDER_COLUMNS: &str = "o.id AS id,
        o.quote_request_id AS quote_request_id,
        o.quote_response_id AS quote_response_id,
        o.customer_id AS customer_id,
        o.business_id AS business_id,
        o.final_price AS final_price,
        o.status AS status,
        o.created_at AS created_at,
        o.updated_at AS updated_at";

/// A request row joined with the business it was sent to.
struct RequestRecord {
    request: QuoteRequest,
    business_name: String,
    business_owner: Option<UserId>,
}

pub struct SqlQuoteRepository {
    pool: DbPool,
    engine: FlowEngine<QuoteLifecycleFlow>,
}

impl SqlQuoteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, engine: FlowEngine::default() }
    }

    /// Takes the write lock up front so a competing lifecycle write waits on `busy_timeout`
    /// and then re-reads the committed status.
    async fn begin_lifecycle(&self) -> Result<Transaction<'static, Sqlite>, RepositoryError> {
        self.pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(|error| RepositoryError::from_write(error, "quote request is being updated"))
    }

    /// Rejected transitions are recorded after the lifecycle transaction has rolled back.
    async fn record_rejection(&self, sink: InMemoryAuditSink) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        for event in sink.drain() {
            insert_event(&mut conn, &event).await?;
        }
        Ok(())
    }

    async fn threads(
        &self,
        records: Vec<RequestRecord>,
        responses_sql: &str,
        subject: &UserId,
    ) -> Result<Vec<QuoteThread>, RepositoryError> {
        let rows = sqlx::query(responses_sql).bind(subject.as_str()).fetch_all(&self.pool).await?;

        let mut responses: HashMap<QuoteRequestId, Vec<QuoteResponse>> = HashMap::new();
        for row in rows {
            let response = response_from_row(row)?;
            responses.entry(response.quote_request_id.clone()).or_default().push(response);
        }

        Ok(records
            .into_iter()
            .map(|record| QuoteThread {
                responses: responses.remove(&record.request.id).unwrap_or_default(),
                business_name: record.business_name,
                request: record.request,
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl QuoteRepository for SqlQuoteRepository {
    async fn submit(&self, request: QuoteRequest) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO quote_requests (
                id, customer_id, business_id, product_id, product_name, quantity,
                customization_details, deadline, status, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(request.id.as_str())
        .bind(request.customer_id.as_str())
        .bind(request.business_id.as_str())
        .bind(request.product_id.as_ref().map(ProductId::as_str))
        .bind(&request.product_name)
        .bind(i64::from(request.quantity))
        .bind(request.customization_details.as_deref())
        .bind(request.deadline.map(|deadline| deadline.to_string()))
        .bind(request.status.as_str())
        .bind(encode_timestamp(&request.created_at))
        .bind(encode_timestamp(&request.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|error| {
            RepositoryError::from_write(error, format!("quote request {} already exists", request.id))
        })?;

        Ok(())
    }

    async fn find_request(
        &self,
        id: &QuoteRequestId,
    ) -> Result<Option<QuoteRequest>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(load_request(&mut conn, id).await?.map(|record| record.request))
    }

    async fn list_responses(
        &self,
        id: &QuoteRequestId,
    ) -> Result<Vec<QuoteResponse>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {RESPONSE_COLUMNS}
             FROM quote_responses r
             WHERE r.quote_request_id = ?
             ORDER BY r.created_at ASC, r.rowid ASC"
        ))
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(response_from_row).collect()
    }

    async fn respond(
        &self,
        owner: &UserId,
        id: &QuoteRequestId,
        response: NewQuoteResponse,
        audit: &AuditContext,
    ) -> Result<(QuoteRequest, QuoteResponse), RepositoryError> {
        let mut tx = self.begin_lifecycle().await?;
        let record = load_request(&mut tx, id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("quote request", id))?;
        ensure_business_owner(&record, owner)?;
        let mut request = record.request;
        let previous = request.status;

        let sink = InMemoryAuditSink::default();
        let outcome = match self.engine.apply_with_audit(
            &previous,
            &FlowEvent::ResponseSubmitted,
            &FlowContext::default(),
            &sink,
            audit,
        ) {
            Ok(outcome) => outcome,
            Err(error) => {
                tx.rollback().await?;
                self.record_rejection(sink).await?;
                return Err(DomainError::from(error).into());
            }
        };

        let now = Utc::now();
        let response = response.into_response(&request, now)?;
        request.transition_to(outcome.to, now)?;
        compare_and_set_status(&mut tx, &request, previous).await?;
        insert_response(&mut tx, &response).await?;

        sink.emit(
            AuditEvent::new(
                audit,
                "quote.response_recorded",
                AuditCategory::Persistence,
                AuditOutcome::Success,
            )
            .with_metadata("quote_response_id", response.id.as_str())
            .with_metadata("price_estimate", response.price_estimate.to_string()),
        );
        for event in sink.drain() {
            insert_event(&mut tx, &event).await?;
        }
        tx.commit().await?;

        Ok((request, response))
    }

    async fn reject(
        &self,
        owner: &UserId,
        id: &QuoteRequestId,
        audit: &AuditContext,
    ) -> Result<QuoteRequest, RepositoryError> {
        let mut tx = self.begin_lifecycle().await?;
        let record = load_request(&mut tx, id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("quote request", id))?;
        ensure_business_owner(&record, owner)?;
        let mut request = record.request;
        let previous = request.status;

        let sink = InMemoryAuditSink::default();
        let outcome = match self.engine.apply_with_audit(
            &previous,
            &FlowEvent::RejectRequested,
            &FlowContext::default(),
            &sink,
            audit,
        ) {
            Ok(outcome) => outcome,
            Err(error) => {
                tx.rollback().await?;
                self.record_rejection(sink).await?;
                return Err(DomainError::from(error).into());
            }
        };

        request.transition_to(outcome.to, Utc::now())?;
        compare_and_set_status(&mut tx, &request, previous).await?;
        for event in sink.drain() {
            insert_event(&mut tx, &event).await?;
        }
        tx.commit().await?;

        Ok(request)
    }

    async fn accept(
        &self,
        customer: &UserId,
        id: &QuoteRequestId,
        response_id: &QuoteResponseId,
        audit: &AuditContext,
    ) -> Result<(QuoteRequest, Order), RepositoryError> {
        let mut tx = self.begin_lifecycle().await?;
        let record = load_request(&mut tx, id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("quote request", id))?;
        let mut request = record.request;
        if request.customer_id != *customer {
            return Err(RepositoryError::Forbidden(format!(
                "quote request {id} belongs to another customer"
            )));
        }

        let response = load_response(&mut tx, response_id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("quote response", response_id))?;
        let context = FlowContext {
            foreign_response_id: (response.quote_request_id != request.id)
                .then(|| response.id.to_string()),
        };
        let previous = request.status;

        let sink = InMemoryAuditSink::default();
        let outcome = match self.engine.apply_with_audit(
            &previous,
            &FlowEvent::OrderPlaced,
            &context,
            &sink,
            audit,
        ) {
            Ok(outcome) => outcome,
            Err(error) => {
                tx.rollback().await?;
                self.record_rejection(sink).await?;
                return Err(DomainError::from(error).into());
            }
        };

        let now = Utc::now();
        let order = Order::from_acceptance(&request, &response, now)?;
        request.transition_to(outcome.to, now)?;
        compare_and_set_status(&mut tx, &request, previous).await?;
        insert_order(&mut tx, &order).await?;

        sink.emit(
            AuditEvent::new(audit, "order.created", AuditCategory::Persistence, AuditOutcome::Success)
                .with_metadata("order_id", order.id.as_str())
                .with_metadata("final_price", order.final_price.to_string()),
        );
        for event in sink.drain() {
            insert_event(&mut tx, &event).await?;
        }
        tx.commit().await?;

        Ok((request, order))
    }

    async fn list_for_customer(
        &self,
        customer: &UserId,
    ) -> Result<Vec<QuoteThread>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{REQUEST_SELECT}
             WHERE qr.customer_id = ?
             ORDER BY qr.created_at DESC, qr.rowid DESC"
        ))
        .bind(customer.as_str())
        .fetch_all(&self.pool)
        .await?;
        let records = rows.into_iter().map(record_from_row).collect::<Result<Vec<_>, _>>()?;

        self.threads(
            records,
            &format!(
                "SELECT {RESPONSE_COLUMNS}
                 FROM quote_responses r
                 JOIN quote_requests qr ON qr.id = r.quote_request_id
                 WHERE qr.customer_id = ?
                 ORDER BY r.created_at ASC, r.rowid ASC"
            ),
            customer,
        )
        .await
    }

    async fn list_for_owner(&self, owner: &UserId) -> Result<Vec<QuoteThread>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{REQUEST_SELECT}
             WHERE b.owner_id = ?
             ORDER BY qr.created_at DESC, qr.rowid DESC"
        ))
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await?;
        let records = rows.into_iter().map(record_from_row).collect::<Result<Vec<_>, _>>()?;

        self.threads(
            records,
            &format!(
                "SELECT {RESPONSE_COLUMNS}
                 FROM quote_responses r
                 JOIN businesses b ON b.id = r.business_id
                 WHERE b.owner_id = ?
                 ORDER BY r.created_at ASC, r.rowid ASC"
            ),
            owner,
        )
        .await
    }

    async fn orders_for_customer(&self, customer: &UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS}
             FROM orders o
             WHERE o.customer_id = ?
             ORDER BY o.created_at DESC, o.rowid DESC"
        ))
        .bind(customer.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(order_from_row).collect()
    }

    async fn orders_for_owner(&self, owner: &UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS}
             FROM orders o
             JOIN businesses b ON b.id = o.business_id
             WHERE b.owner_id = ?
             ORDER BY o.created_at DESC, o.rowid DESC"
        ))
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(order_from_row).collect()
    }
}

fn ensure_business_owner(record: &RequestRecord, owner: &UserId) -> Result<(), RepositoryError> {
    if record.business_owner.as_ref() == Some(owner) {
        Ok(())
    } else {
        Err(RepositoryError::Forbidden(format!(
            "quote request {} was sent to a business you do not own",
            record.request.id
        )))
    }
}

/// Writes the new status only if the row still holds `previous`; a concurrent writer that got
/// there first turns this into a conflict.
async fn compare_and_set_status(
    conn: &mut SqliteConnection,
    request: &QuoteRequest,
    previous: QuoteStatus,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE quote_requests
         SET status = ?, updated_at = ?
         WHERE id = ? AND status = ?",
    )
    .bind(request.status.as_str())
    .bind(encode_timestamp(&request.updated_at))
    .bind(request.id.as_str())
    .bind(previous.as_str())
    .execute(&mut *conn)
    .await
    .map_err(|error| {
        let conflict = format!("quote request {} is no longer {previous}", request.id);
        RepositoryError::from_write(error, conflict)
    })?;

    if result.rows_affected() == 1 {
        Ok(())
    } else {
        Err(RepositoryError::Conflict(format!(
            "quote request {} is no longer {previous}",
            request.id
        )))
    }
}

async fn load_request(
    conn: &mut SqliteConnection,
    id: &QuoteRequestId,
) -> Result<Option<RequestRecord>, RepositoryError> {
    let row = sqlx::query(&format!("{REQUEST_SELECT} WHERE qr.id = ?"))
        .bind(id.as_str())
        .fetch_optional(&mut *conn)
        .await?;

    row.map(record_from_row).transpose()
}

async fn load_response(
    conn: &mut SqliteConnection,
    id: &QuoteResponseId,
) -> Result<Option<QuoteResponse>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {RESPONSE_COLUMNS} FROM quote_responses r WHERE r.id = ?"))
        .bind(id.as_str())
        .fetch_optional(&mut *conn)
        .await?;

    row.map(response_from_row).transpose()
}

async fn insert_response(
    conn: &mut SqliteConnection,
    response: &QuoteResponse,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO quote_responses (
            id, quote_request_id, business_id, price_estimate, message,
            delivery_time, valid_until, created_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(response.id.as_str())
    .bind(response.quote_request_id.as_str())
    .bind(response.business_id.as_str())
    .bind(response.price_estimate.to_string())
    .bind(response.message.as_deref())
    .bind(response.delivery_time.as_deref())
    .bind(response.valid_until.map(|date| date.to_string()))
    .bind(encode_timestamp(&response.created_at))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_order(conn: &mut SqliteConnection, order: &Order) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO orders (
            id, quote_request_id, quote_response_id, customer_id, business_id,
            final_price, status, created_at, updated_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(order.id.as_str())
    .bind(order.quote_request_id.as_str())
    .bind(order.quote_response_id.as_str())
    .bind(order.customer_id.as_str())
    .bind(order.business_id.as_str())
    .bind(order.final_price.to_string())
    .bind(order.status.as_str())
    .bind(encode_timestamp(&order.created_at))
    .bind(encode_timestamp(&order.updated_at))
    .execute(&mut *conn)
    .await
    .map_err(|error| {
        RepositoryError::from_write(
            error,
            format!("quote request {} already has an order", order.quote_request_id),
        )
    })?;

    Ok(())
}

fn record_from_row(row: SqliteRow) -> Result<RequestRecord, RepositoryError> {
    Ok(RequestRecord {
        business_name: row.try_get("business_name")?,
        business_owner: row.try_get::<Option<String>, _>("business_owner_id")?.map(UserId),
        request: QuoteRequest {
            id: QuoteRequestId(row.try_get("id")?),
            customer_id: UserId(row.try_get("customer_id")?),
            business_id: BusinessId(row.try_get("business_id")?),
            product_id: row.try_get::<Option<String>, _>("product_id")?.map(ProductId),
            product_name: row.try_get("product_name")?,
            quantity: parse_u32("quantity", row.try_get("quantity")?)?,
            customization_details: row.try_get("customization_details")?,
            deadline: parse_optional_date("deadline", row.try_get("deadline")?)?,
            status: parse_label::<QuoteStatus>("status", row.try_get("status")?)?,
            created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
            updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
        },
    })
}

fn response_from_row(row: SqliteRow) -> Result<QuoteResponse, RepositoryError> {
    Ok(QuoteResponse {
        id: QuoteResponseId(row.try_get("id")?),
        quote_request_id: QuoteRequestId(row.try_get("quote_request_id")?),
        business_id: BusinessId(row.try_get("business_id")?),
        price_estimate: parse_decimal("price_estimate", row.try_get("price_estimate")?)?,
        message: row.try_get("message")?,
        delivery_time: row.try_get("delivery_time")?,
        valid_until: parse_optional_date("valid_until", row.try_get("valid_until")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn order_from_row(row: SqliteRow) -> Result<Order, RepositoryError> {
    Ok(Order {
        id: OrderId(row.try_get("id")?),
        quote_request_id: QuoteRequestId(row.try_get("quote_request_id")?),
        quote_response_id: QuoteResponseId(row.try_get("quote_response_id")?),
        customer_id: UserId(row.try_get("customer_id")?),
        business_id: BusinessId(row.try_get("business_id")?),
        final_price: parse_decimal("final_price", row.try_get("final_price")?)?,
        status: parse_label::<OrderStatus>("status", row.try_get("status")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use connecthub_core::audit::AuditContext;
    use connecthub_core::domain::business::{Business, BusinessRegistration};
    use connecthub_core::domain::quote::{
        NewQuoteRequest, NewQuoteResponse, QuoteRequest, QuoteStatus,
    };
    use connecthub_core::domain::user::UserId;
    use connecthub_core::errors::DomainError;
    use connecthub_core::flows::FlowTransitionError;

    use super::SqlQuoteRepository;
    use crate::repositories::{
        AuditRepository, BusinessRepository, QuoteRepository, RepositoryError,
        SqlAuditRepository, SqlBusinessRepository,
    };
    use crate::{connect_with_settings, migrations, DbPool};

    const OWNER: &str = "owner-1";
    const CUSTOMER: &str = "customer-1";

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    async fn seed_business(pool: &DbPool) -> Business {
        let business = BusinessRegistration {
            name: "Lakeside Print Shop".to_owned(),
            description: "Custom mugs and shirts".to_owned(),
            category: "Printing".to_owned(),
            ..BusinessRegistration::default()
        }
        .into_business(UserId::from(OWNER), Utc::now())
        .expect("business");
        SqlBusinessRepository::new(pool.clone()).save(business.clone()).await.expect("save");
        business
    }

    async fn submit_mugs(repo: &SqlQuoteRepository, business: &Business) -> QuoteRequest {
        let request = NewQuoteRequest {
            business_id: business.id.clone(),
            product_name: "Custom Mugs".to_owned(),
            quantity: Some(5),
            ..NewQuoteRequest::default()
        }
        .into_request(UserId::from(CUSTOMER), Utc::now())
        .expect("request");
        repo.submit(request.clone()).await.expect("submit");
        request
    }

    fn price(cents: i64) -> NewQuoteResponse {
        NewQuoteResponse { price_estimate: Decimal::new(cents, 2), ..NewQuoteResponse::default() }
    }

    fn audit(request: &QuoteRequest, actor: &str) -> AuditContext {
        AuditContext::new(Some(request.id.clone()), "req-test", actor)
    }

    fn is_flow_rejection(error: &RepositoryError) -> bool {
        matches!(error, RepositoryError::Domain(DomainError::FlowTransition(_)))
    }

    #[tokio::test]
    async fn accepting_custom_mugs_quote_creates_exactly_one_order() {
        let pool = setup_pool().await;
        let business = seed_business(&pool).await;
        let repo = SqlQuoteRepository::new(pool.clone());
        let owner = UserId::from(OWNER);
        let customer = UserId::from(CUSTOMER);

        let request = submit_mugs(&repo, &business).await;
        assert_eq!(request.status, QuoteStatus::Pending);
        assert_eq!(request.quantity, 5);

        let (quoted, response) = repo
            .respond(&owner, &request.id, price(4999), &audit(&request, OWNER))
            .await
            .expect("respond");
        assert_eq!(quoted.status, QuoteStatus::Quoted);

        let (accepted, order) = repo
            .accept(&customer, &request.id, &response.id, &audit(&request, CUSTOMER))
            .await
            .expect("accept");
        assert_eq!(accepted.status, QuoteStatus::Accepted);
        assert_eq!(order.final_price, Decimal::new(4999, 2));
        assert_eq!(order.quote_response_id, response.id);

        let second = repo
            .accept(&customer, &request.id, &response.id, &audit(&request, CUSTOMER))
            .await
            .expect_err("second accept must fail");
        assert!(is_flow_rejection(&second));

        let orders = repo.orders_for_customer(&customer).await.expect("orders");
        assert_eq!(orders.len(), 1);
        assert_eq!(repo.orders_for_owner(&owner).await.expect("owner orders").len(), 1);

        let stored = repo.find_request(&request.id).await.expect("find").expect("present");
        assert_eq!(stored.status, QuoteStatus::Accepted);

        let events = SqlAuditRepository::new(pool.clone())
            .list_for_quote_request(&request.id)
            .await
            .expect("audit");
        assert!(events.iter().any(|event| event.event_type == "order.created"));
        assert!(events.iter().any(|event| event.event_type == "flow.transition_rejected"));

        pool.close().await;
    }

    #[tokio::test]
    async fn responding_to_closed_requests_writes_nothing() {
        let pool = setup_pool().await;
        let business = seed_business(&pool).await;
        let repo = SqlQuoteRepository::new(pool.clone());
        let owner = UserId::from(OWNER);

        let rejected = submit_mugs(&repo, &business).await;
        repo.reject(&owner, &rejected.id, &audit(&rejected, OWNER)).await.expect("reject");
        let error = repo
            .respond(&owner, &rejected.id, price(1000), &audit(&rejected, OWNER))
            .await
            .expect_err("respond to rejected");
        assert!(is_flow_rejection(&error));
        assert!(repo.list_responses(&rejected.id).await.expect("responses").is_empty());
        assert_eq!(
            repo.find_request(&rejected.id).await.expect("find").map(|request| request.status),
            Some(QuoteStatus::Rejected)
        );

        let accepted = submit_mugs(&repo, &business).await;
        let (_, response) = repo
            .respond(&owner, &accepted.id, price(2500), &audit(&accepted, OWNER))
            .await
            .expect("respond");
        repo.accept(&UserId::from(CUSTOMER), &accepted.id, &response.id, &audit(&accepted, CUSTOMER))
            .await
            .expect("accept");
        assert!(repo
            .respond(&owner, &accepted.id, price(2000), &audit(&accepted, OWNER))
            .await
            .is_err());
        assert_eq!(repo.list_responses(&accepted.id).await.expect("responses").len(), 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn reject_is_only_allowed_while_pending() {
        let pool = setup_pool().await;
        let business = seed_business(&pool).await;
        let repo = SqlQuoteRepository::new(pool.clone());
        let owner = UserId::from(OWNER);

        let request = submit_mugs(&repo, &business).await;
        repo.respond(&owner, &request.id, price(4999), &audit(&request, OWNER))
            .await
            .expect("respond");
        let (_, second) = repo
            .respond(&owner, &request.id, price(4500), &audit(&request, OWNER))
            .await
            .expect("quoted requests accept further responses");
        assert_eq!(second.price_estimate, Decimal::new(4500, 2));

        let error =
            repo.reject(&owner, &request.id, &audit(&request, OWNER)).await.expect_err("reject");
        assert!(is_flow_rejection(&error));
        assert_eq!(repo.list_responses(&request.id).await.expect("responses").len(), 2);

        pool.close().await;
    }

    #[tokio::test]
    async fn lifecycle_calls_check_ownership() {
        let pool = setup_pool().await;
        let business = seed_business(&pool).await;
        let repo = SqlQuoteRepository::new(pool.clone());
        let request = submit_mugs(&repo, &business).await;

        let error = repo
            .respond(&UserId::from("intruder"), &request.id, price(100), &audit(&request, "intruder"))
            .await
            .expect_err("stranger cannot respond");
        assert!(matches!(error, RepositoryError::Forbidden(_)));

        let (_, response) = repo
            .respond(&UserId::from(OWNER), &request.id, price(100), &audit(&request, OWNER))
            .await
            .expect("owner responds");
        let error = repo
            .accept(&UserId::from("intruder"), &request.id, &response.id, &audit(&request, "intruder"))
            .await
            .expect_err("stranger cannot accept");
        assert!(matches!(error, RepositoryError::Forbidden(_)));

        let missing = repo
            .reject(&UserId::from(OWNER), &"missing".into(), &audit(&request, OWNER))
            .await
            .expect_err("unknown request");
        assert!(matches!(missing, RepositoryError::NotFound { entity: "quote request", .. }));

        pool.close().await;
    }

    #[tokio::test]
    async fn accepting_a_response_from_another_request_is_refused() {
        let pool = setup_pool().await;
        let business = seed_business(&pool).await;
        let repo = SqlQuoteRepository::new(pool.clone());
        let owner = UserId::from(OWNER);

        let first = submit_mugs(&repo, &business).await;
        let second = submit_mugs(&repo, &business).await;
        repo.respond(&owner, &first.id, price(1000), &audit(&first, OWNER)).await.expect("first");
        let (_, foreign) = repo
            .respond(&owner, &second.id, price(2000), &audit(&second, OWNER))
            .await
            .expect("second");

        let error = repo
            .accept(&UserId::from(CUSTOMER), &first.id, &foreign.id, &audit(&first, CUSTOMER))
            .await
            .expect_err("foreign response");
        assert!(matches!(
            error,
            RepositoryError::Domain(DomainError::FlowTransition(
                FlowTransitionError::ForeignResponse { .. }
            ))
        ));
        assert!(repo.orders_for_customer(&UserId::from(CUSTOMER)).await.expect("orders").is_empty());

        pool.close().await;
    }

    #[tokio::test]
    async fn threads_carry_business_name_and_responses() {
        let pool = setup_pool().await;
        let business = seed_business(&pool).await;
        let repo = SqlQuoteRepository::new(pool.clone());
        let owner = UserId::from(OWNER);

        let older = submit_mugs(&repo, &business).await;
        let newer = submit_mugs(&repo, &business).await;
        repo.respond(&owner, &older.id, price(1500), &audit(&older, OWNER)).await.expect("respond");

        let threads = repo.list_for_customer(&UserId::from(CUSTOMER)).await.expect("threads");
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].request.id, newer.id);
        assert_eq!(threads[1].business_name, "Lakeside Print Shop");
        assert_eq!(threads[1].responses.len(), 1);
        assert!(threads[0].responses.is_empty());

        let incoming = repo.list_for_owner(&owner).await.expect("incoming");
        assert_eq!(incoming.len(), 2);
        assert!(repo.list_for_owner(&UserId::from("nobody")).await.expect("empty").is_empty());

        pool.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_accepts_place_one_order_and_conflict_the_other() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("race.db").display());
        let pool = connect_with_settings(&url, 4, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        let business = seed_business(&pool).await;
        let repo = Arc::new(SqlQuoteRepository::new(pool.clone()));

        let request = submit_mugs(&repo, &business).await;
        let (_, response) = repo
            .respond(&UserId::from(OWNER), &request.id, price(4999), &audit(&request, OWNER))
            .await
            .expect("respond");

        let attempts = (0..2).map(|_| {
            let repo = Arc::clone(&repo);
            let request = request.clone();
            let response_id = response.id.clone();
            tokio::spawn(async move {
                repo.accept(
                    &UserId::from(CUSTOMER),
                    &request.id,
                    &response_id,
                    &audit(&request, CUSTOMER),
                )
                .await
            })
        });
        let mut results = Vec::new();
        for attempt in attempts.collect::<Vec<_>>() {
            results.push(attempt.await.expect("join"));
        }

        assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
        let loser = results.into_iter().find_map(Result::err).expect("one accept must lose");
        assert!(
            is_flow_rejection(&loser) || matches!(loser, RepositoryError::Conflict(_)),
            "loser should conflict, got {loser:?}"
        );

        let (orders,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM orders WHERE quote_request_id = ?")
                .bind(request.id.as_str())
                .fetch_one(&pool)
                .await
                .expect("count orders");
        assert_eq!(orders, 1);

        pool.close().await;
    }
}
