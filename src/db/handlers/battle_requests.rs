//! Database repository for battle requests.

use sqlx::PgConnection;
use tracing::instrument;

use crate::{
    crypto,
    db::{
        errors::Result,
        models::battle_requests::{BattleRequest, BattleRequestCreateDBRequest, RequestStatus},
    },
    scheduling,
};

const COLUMNS: &str = "id, name, email, twitch_username, game, notes, requested_date, requested_time, status, token, created_at";

pub struct BattleRequests<'c> {
    db: &'c mut PgConnection,
}

impl<'c> BattleRequests<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Insert a new request with a freshly issued token and pending status.
    ///
    /// The partial unique index on active `(requested_date, requested_time)`
    /// pairs rejects a second active booking for the same slot; callers map
    /// that violation to a slot conflict.
    #[instrument(skip(self, request), err)]
    pub async fn create(&mut self, request: &BattleRequestCreateDBRequest) -> Result<BattleRequest> {
        let token = crypto::generate_request_token();

        let created = sqlx::query_as::<_, BattleRequest>(&format!(
            "INSERT INTO battle_requests (name, email, twitch_username, game, notes, requested_date, requested_time, token) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        ))
        .bind(&request.name)
        .bind(&request.email)
        .bind(&request.twitch_username)
        .bind(&request.game)
        .bind(&request.notes)
        .bind(request.requested_date)
        .bind(&request.requested_time)
        .bind(&token)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(created)
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_id(&mut self, id: i32) -> Result<Option<BattleRequest>> {
        let request = sqlx::query_as::<_, BattleRequest>(&format!(
            "SELECT {COLUMNS} FROM battle_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(request)
    }

    #[instrument(skip_all, err)]
    pub async fn get_by_token(&mut self, token: &str) -> Result<Option<BattleRequest>> {
        let request = sqlx::query_as::<_, BattleRequest>(&format!(
            "SELECT {COLUMNS} FROM battle_requests WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(request)
    }

    /// List all requests ordered by date, then by the slot catalog order.
    #[instrument(skip(self), err)]
    pub async fn list(&mut self) -> Result<Vec<BattleRequest>> {
        let catalog: Vec<String> = scheduling::SLOT_CATALOG.iter().map(|s| s.to_string()).collect();

        let requests = sqlx::query_as::<_, BattleRequest>(&format!(
            "SELECT {COLUMNS} FROM battle_requests \
             ORDER BY requested_date ASC, array_position($1, requested_time) ASC, created_at ASC"
        ))
        .bind(&catalog)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(requests)
    }

    /// Persist a status transition on the request holding `token`.
    ///
    /// A single UPDATE statement: statement-level atomicity is the only
    /// ordering guarantee for concurrent updates on one token (last write
    /// wins). Returns `None` when no request holds the token.
    #[instrument(skip_all, fields(status = %status), err)]
    pub async fn update_status(&mut self, token: &str, status: RequestStatus) -> Result<Option<BattleRequest>> {
        let updated = sqlx::query_as::<_, BattleRequest>(&format!(
            "UPDATE battle_requests SET status = $2 WHERE token = $1 RETURNING {COLUMNS}"
        ))
        .bind(token)
        .bind(status)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::battle_requests::ACTIVE_SLOT_CONSTRAINT;
    use chrono::NaiveDate;
    use sqlx::PgPool;

    fn june_first() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn create_request(time: &str) -> BattleRequestCreateDBRequest {
        BattleRequestCreateDBRequest {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            twitch_username: "ada_plays".to_string(),
            game: "Street Fighter 6".to_string(),
            notes: None,
            requested_date: june_first(),
            requested_time: time.to_string(),
        }
    }

    #[sqlx::test]
    async fn create_assigns_token_and_pending_status(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = BattleRequests::new(&mut conn);

        let created = repo.create(&create_request("5:00 PM")).await.unwrap();

        assert_eq!(created.status, RequestStatus::Pending);
        assert_eq!(created.requested_date, june_first());
        assert!(!created.token.is_empty());

        let fetched = repo.get_by_token(&created.token).await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);

        let by_id = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.token, created.token);
    }

    #[sqlx::test]
    async fn second_active_booking_for_same_slot_is_rejected(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = BattleRequests::new(&mut conn);

        repo.create(&create_request("5:00 PM")).await.unwrap();
        let err = repo.create(&create_request("5:00 PM")).await.unwrap_err();

        assert!(err.is_unique_violation_on(ACTIVE_SLOT_CONSTRAINT), "got {err:?}");
    }

    #[sqlx::test]
    async fn rejected_request_frees_its_slot(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = BattleRequests::new(&mut conn);

        let first = repo.create(&create_request("5:00 PM")).await.unwrap();
        repo.update_status(&first.token, RequestStatus::Rejected)
            .await
            .unwrap()
            .unwrap();

        // Same slot can be booked again once the previous request is rejected.
        let second = repo.create(&create_request("5:00 PM")).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_ne!(first.token, second.token);
    }

    #[sqlx::test]
    async fn update_status_returns_none_for_unknown_token(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = BattleRequests::new(&mut conn);

        let updated = repo
            .update_status("nonexistent-token", RequestStatus::Confirmed)
            .await
            .unwrap();
        assert!(updated.is_none());
    }

    #[sqlx::test]
    async fn update_status_is_idempotent_on_terminal_states(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = BattleRequests::new(&mut conn);

        let created = repo.create(&create_request("8:00 PM")).await.unwrap();

        let first = repo
            .update_status(&created.token, RequestStatus::Confirmed)
            .await
            .unwrap()
            .unwrap();
        let second = repo
            .update_status(&created.token, RequestStatus::Confirmed)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first.status, RequestStatus::Confirmed);
        assert_eq!(second.status, RequestStatus::Confirmed);
        assert_eq!(first.id, second.id);
    }

    #[sqlx::test]
    async fn list_orders_by_date_then_catalog_slot(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = BattleRequests::new(&mut conn);

        // "10:00 PM" sorts before "2:00 PM" lexically; catalog order must win.
        repo.create(&create_request("10:00 PM")).await.unwrap();
        repo.create(&create_request("2:00 PM")).await.unwrap();

        let mut later = create_request("2:00 PM");
        later.requested_date = NaiveDate::from_ymd_opt(2024, 5, 30).unwrap();
        repo.create(&later).await.unwrap();

        let listed = repo.list().await.unwrap();
        let keys: Vec<(NaiveDate, &str)> = listed
            .iter()
            .map(|r| (r.requested_date, r.requested_time.as_str()))
            .collect();

        assert_eq!(
            keys,
            vec![
                (NaiveDate::from_ymd_opt(2024, 5, 30).unwrap(), "2:00 PM"),
                (june_first(), "2:00 PM"),
                (june_first(), "10:00 PM"),
            ]
        );
    }
}
