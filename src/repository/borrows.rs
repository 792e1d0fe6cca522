//! Borrow records repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::borrow::{BorrowDetails, BorrowQuery, BorrowRecord, BorrowStatus},
    query::{FilterColumn, QuerySpec},
};

use super::{unique_violation, EntityRepository};

const RECORD_COLUMNS: &str = "id, book_id, user_id, borrow_date, due_date, return_date, \
                              status, total_price, created_at";

/// Records joined with their borrower and book. Books may be deleted once
/// every copy is back, so both joins are outer joins.
pub const BORROW_QUERY: QuerySpec = QuerySpec {
    base: "SELECT br.id, br.book_id, br.user_id, br.borrow_date, br.due_date, \
           br.return_date, br.status, br.total_price, br.created_at, \
           COALESCE(u.full_name, '') AS user_name, COALESCE(b.title, '') AS book_title \
           FROM borrow_records br \
           LEFT JOIN users u ON u.id = br.user_id \
           LEFT JOIN books b ON b.id = br.book_id",
    count_column: "id",
    searchable: &["u.full_name", "b.title"],
    filters: &[
        FilterColumn::eq("user_id", "br.user_id"),
        FilterColumn::eq("book_id", "br.book_id"),
        FilterColumn::eq("status", "br.status"),
        FilterColumn::gte("start_date", "br.borrow_date"),
        FilterColumn::lte("end_date", "br.borrow_date"),
    ],
    sorts: &[
        ("borrow_date", "br.borrow_date"),
        ("due_date", "br.due_date"),
        ("return_date", "br.return_date"),
        ("status", "br.status"),
        ("user_name", "u.full_name"),
        ("book_title", "b.title"),
        ("created_at", "br.created_at"),
        ("price", "br.total_price"),
    ],
    default_sort: "-borrow_date",
    wrap_subquery: false,
};

const ACTIVE_LOAN_EXISTS: &str = "User has already borrowed one of the requested books";

#[derive(Clone)]
pub struct BorrowsRepository {
    pool: Pool<Postgres>,
}

impl BorrowsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Active (`BORROWED`) records of a user
    pub async fn find_active_by_user(&self, user_id: Uuid) -> AppResult<Vec<BorrowRecord>> {
        let filter = BorrowQuery {
            user_id: Some(user_id),
            status: Some(BorrowStatus::Borrowed),
            ..BorrowQuery::default()
        };

        let records = self
            .find_all(&filter)
            .await?
            .into_iter()
            .map(|details| details.record)
            .collect();

        Ok(records)
    }

    /// Number of active loans of a user
    pub async fn count_active_by_user(&self, user_id: Uuid) -> AppResult<i64> {
        let filter = BorrowQuery {
            user_id: Some(user_id),
            status: Some(BorrowStatus::Borrowed),
            ..BorrowQuery::default()
        };
        self.count(&filter).await
    }

    /// Insert every record in one statement
    pub async fn create_many(&self, conn: &mut PgConnection, records: &[BorrowRecord]) -> AppResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut builder = sqlx::QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO borrow_records ({}) ",
            RECORD_COLUMNS
        ));
        builder.push_values(records, |mut row, record| {
            row.push_bind(record.id)
                .push_bind(record.book_id)
                .push_bind(record.user_id)
                .push_bind(record.borrow_date)
                .push_bind(record.due_date)
                .push_bind(record.returned_date)
                .push_bind(record.status)
                .push_bind(record.total_price)
                .push_bind(record.created_at);
        });

        builder
            .build()
            .execute(&mut *conn)
            .await
            .map_err(|e| unique_violation(e, ACTIVE_LOAN_EXISTS))?;

        Ok(())
    }

    /// Close an active record. Returns false if it was not active anymore.
    pub async fn mark_returned(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        returned_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE borrow_records SET return_date = $2, status = 'RETURNED'
            WHERE id = $1 AND status = 'BORROWED'
            "#,
        )
        .bind(id)
        .bind(returned_at)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl EntityRepository for BorrowsRepository {
    type Entity = BorrowRecord;
    type Row = BorrowDetails;
    type Filter = BorrowQuery;

    const QUERY: QuerySpec = BORROW_QUERY;

    fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<BorrowRecord>> {
        let record = sqlx::query_as::<_, BorrowRecord>(&format!(
            "SELECT {} FROM borrow_records WHERE id = $1",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn create(&self, conn: &mut PgConnection, record: &BorrowRecord) -> AppResult<()> {
        self.create_many(conn, std::slice::from_ref(record)).await
    }

    async fn update(&self, conn: &mut PgConnection, record: &BorrowRecord) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE borrow_records SET
                due_date = $2,
                return_date = $3,
                status = $4,
                total_price = $5
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(record.due_date)
        .bind(record.returned_date)
        .bind(record.status)
        .bind(record.total_price)
        .execute(&mut *conn)
        .await
        .map_err(|e| unique_violation(e, ACTIVE_LOAN_EXISTS))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Borrow record not found".to_string()));
        }

        Ok(())
    }
}
