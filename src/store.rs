//! Request store: one interface, polymorphic only over backing medium.
//!
//! [`PgRequestStore`] is the production implementation, delegating to the
//! repository in [`crate::db::handlers`]. [`MemoryRequestStore`] is a test
//! double with the same semantics, including the active-slot uniqueness
//! invariant, so handler-level tests can run without PostgreSQL.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::{
    crypto,
    db::{
        errors::{DbError, Result},
        handlers::BattleRequests,
        models::battle_requests::{ACTIVE_SLOT_CONSTRAINT, BattleRequest, BattleRequestCreateDBRequest, RequestStatus},
    },
    scheduling,
};

#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Persist a new pending request with a freshly issued token.
    ///
    /// Fails with a unique violation on [`ACTIVE_SLOT_CONSTRAINT`] when an
    /// active request already holds the same `(date, time)` slot.
    async fn create(&self, request: &BattleRequestCreateDBRequest) -> Result<BattleRequest>;

    async fn get_by_id(&self, id: i32) -> Result<Option<BattleRequest>>;

    async fn get_by_token(&self, token: &str) -> Result<Option<BattleRequest>>;

    /// All requests, ordered by date then catalog slot order.
    async fn list(&self) -> Result<Vec<BattleRequest>>;

    /// Persist `status` on the request holding `token`; `None` if no request
    /// holds it. Terminal states may be re-applied.
    async fn update_status(&self, token: &str, status: RequestStatus) -> Result<Option<BattleRequest>>;
}

/// PostgreSQL-backed store.
pub struct PgRequestStore {
    pool: PgPool,
}

impl PgRequestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RequestStore for PgRequestStore {
    async fn create(&self, request: &BattleRequestCreateDBRequest) -> Result<BattleRequest> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        BattleRequests::new(&mut conn).create(request).await
    }

    async fn get_by_id(&self, id: i32) -> Result<Option<BattleRequest>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        BattleRequests::new(&mut conn).get_by_id(id).await
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<BattleRequest>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        BattleRequests::new(&mut conn).get_by_token(token).await
    }

    async fn list(&self) -> Result<Vec<BattleRequest>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        BattleRequests::new(&mut conn).list().await
    }

    async fn update_status(&self, token: &str, status: RequestStatus) -> Result<Option<BattleRequest>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        BattleRequests::new(&mut conn).update_status(token, status).await
    }
}

/// In-memory store with the same contract as the PostgreSQL implementation.
#[derive(Default)]
pub struct MemoryRequestStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    requests: Vec<BattleRequest>,
    next_id: i32,
}

impl MemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequestStore for MemoryRequestStore {
    async fn create(&self, request: &BattleRequestCreateDBRequest) -> Result<BattleRequest> {
        let mut inner = self.inner.lock().await;

        // Mirror the partial unique index: at most one active request per slot.
        let slot_taken = inner.requests.iter().any(|existing| {
            existing.requested_date == request.requested_date
                && existing.requested_time == request.requested_time
                && existing.status.occupies_slot()
        });
        if slot_taken {
            return Err(DbError::UniqueViolation {
                constraint: Some(ACTIVE_SLOT_CONSTRAINT.to_string()),
                table: Some("battle_requests".to_string()),
                message: format!(
                    "duplicate key value violates unique index for ({}, {})",
                    request.requested_date, request.requested_time
                ),
            });
        }

        inner.next_id += 1;
        let created = BattleRequest {
            id: inner.next_id,
            name: request.name.clone(),
            email: request.email.clone(),
            twitch_username: request.twitch_username.clone(),
            game: request.game.clone(),
            notes: request.notes.clone(),
            requested_date: request.requested_date,
            requested_time: request.requested_time.clone(),
            status: RequestStatus::Pending,
            token: crypto::generate_request_token(),
            created_at: Utc::now(),
        };
        inner.requests.push(created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: i32) -> Result<Option<BattleRequest>> {
        let inner = self.inner.lock().await;
        Ok(inner.requests.iter().find(|r| r.id == id).cloned())
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<BattleRequest>> {
        let inner = self.inner.lock().await;
        Ok(inner.requests.iter().find(|r| r.token == token).cloned())
    }

    async fn list(&self) -> Result<Vec<BattleRequest>> {
        let inner = self.inner.lock().await;
        let mut requests = inner.requests.clone();
        requests.sort_by_key(|r| {
            (
                r.requested_date,
                scheduling::slot_index(&r.requested_time).unwrap_or(usize::MAX),
                r.created_at,
            )
        });
        Ok(requests)
    }

    async fn update_status(&self, token: &str, status: RequestStatus) -> Result<Option<BattleRequest>> {
        let mut inner = self.inner.lock().await;
        let Some(request) = inner.requests.iter_mut().find(|r| r.token == token) else {
            return Ok(None);
        };
        request.status = status;
        Ok(Some(request.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn create_request(date: NaiveDate, time: &str) -> BattleRequestCreateDBRequest {
        BattleRequestCreateDBRequest {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            twitch_username: "ada_plays".to_string(),
            game: "Street Fighter 6".to_string(),
            notes: Some("first time".to_string()),
            requested_date: date,
            requested_time: time.to_string(),
        }
    }

    fn june_first() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[tokio::test]
    async fn create_issues_unique_tokens() {
        let store = MemoryRequestStore::new();
        let first = store.create(&create_request(june_first(), "2:00 PM")).await.unwrap();
        let second = store.create(&create_request(june_first(), "3:00 PM")).await.unwrap();

        assert_eq!(first.status, RequestStatus::Pending);
        assert_ne!(first.token, second.token);
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn double_booking_a_slot_is_a_unique_violation() {
        let store = MemoryRequestStore::new();
        store.create(&create_request(june_first(), "5:00 PM")).await.unwrap();

        let err = store.create(&create_request(june_first(), "5:00 PM")).await.unwrap_err();
        assert!(err.is_unique_violation_on(ACTIVE_SLOT_CONSTRAINT), "got {err:?}");
    }

    #[tokio::test]
    async fn concurrent_submissions_for_one_slot_yield_one_winner() {
        let store = std::sync::Arc::new(MemoryRequestStore::new());

        let first_request = create_request(june_first(), "7:00 PM");
        let second_request = create_request(june_first(), "7:00 PM");
        let (first, second) = tokio::join!(
            store.create(&first_request),
            store.create(&second_request),
        );

        let successes = first.is_ok() as u8 + second.is_ok() as u8;
        assert_eq!(successes, 1, "exactly one racing submission may claim a slot");
    }

    #[tokio::test]
    async fn rejected_slot_can_be_rebooked() {
        let store = MemoryRequestStore::new();
        let first = store.create(&create_request(june_first(), "5:00 PM")).await.unwrap();
        store.update_status(&first.token, RequestStatus::Rejected).await.unwrap();

        assert!(store.create(&create_request(june_first(), "5:00 PM")).await.is_ok());
    }

    #[tokio::test]
    async fn requests_are_findable_by_id_and_token() {
        let store = MemoryRequestStore::new();
        let created = store.create(&create_request(june_first(), "6:00 PM")).await.unwrap();

        let by_id = store.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.token, created.token);

        let by_token = store.get_by_token(&created.token).await.unwrap().unwrap();
        assert_eq!(by_token.id, created.id);

        assert!(store.get_by_id(999).await.unwrap().is_none());
        assert!(store.get_by_token("brq-unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_status_unknown_token_returns_none() {
        let store = MemoryRequestStore::new();
        let updated = store.update_status("brq-missing", RequestStatus::Confirmed).await.unwrap();
        assert!(updated.is_none());
    }

    #[tokio::test]
    async fn list_orders_by_date_then_catalog_slot() {
        let store = MemoryRequestStore::new();
        store.create(&create_request(june_first(), "10:00 PM")).await.unwrap();
        store.create(&create_request(june_first(), "2:00 PM")).await.unwrap();
        let earlier = NaiveDate::from_ymd_opt(2024, 5, 30).unwrap();
        store.create(&create_request(earlier, "11:00 PM")).await.unwrap();

        let listed = store.list().await.unwrap();
        let keys: Vec<(NaiveDate, &str)> = listed.iter().map(|r| (r.requested_date, r.requested_time.as_str())).collect();
        assert_eq!(
            keys,
            vec![(earlier, "11:00 PM"), (june_first(), "2:00 PM"), (june_first(), "10:00 PM")]
        );
    }
}
