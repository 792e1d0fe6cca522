//! Repository layer for database operations

pub mod books;
pub mod borrows;
pub mod users;

use async_trait::async_trait;
use sqlx::{postgres::PgRow, FromRow, PgConnection, Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    query::{Filter, QuerySpec},
};

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub books: books::BooksRepository,
    pub users: users::UsersRepository,
    pub borrows: borrows::BorrowsRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: books::BooksRepository::new(pool.clone()),
            users: users::UsersRepository::new(pool.clone()),
            borrows: borrows::BorrowsRepository::new(pool.clone()),
            pool,
        }
    }
}

/// Data access shared by every entity.
///
/// Reads go through the pool; writes take the connection of the caller's
/// transaction so several of them can commit together.
#[async_trait]
pub trait EntityRepository: Send + Sync {
    /// Model written by `create` and `update`
    type Entity: Send + Sync;
    /// Model returned by list queries
    type Row: for<'r> FromRow<'r, PgRow> + Send + Unpin;
    type Filter: Filter + Send + Sync;

    /// Base statement, filter whitelist and sort keys for list queries
    const QUERY: QuerySpec;

    fn pool(&self) -> &Pool<Postgres>;

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Self::Entity>>;

    async fn create(&self, conn: &mut PgConnection, entity: &Self::Entity) -> AppResult<()>;

    async fn update(&self, conn: &mut PgConnection, entity: &Self::Entity) -> AppResult<()>;

    /// One page of rows matching `filter`, sorted by its sort token
    async fn find_all(&self, filter: &Self::Filter) -> AppResult<Vec<Self::Row>> {
        let statement = Self::QUERY.select(filter)?;
        let rows = sqlx::query_as_with::<_, Self::Row, _>(&statement.sql, statement.arguments())
            .fetch_all(self.pool())
            .await?;
        Ok(rows)
    }

    /// Number of rows matching `filter`, ignoring pagination
    async fn count(&self, filter: &Self::Filter) -> AppResult<i64> {
        let statement = Self::QUERY.count(filter);
        let total = sqlx::query_scalar_with::<_, i64, _>(&statement.sql, statement.arguments())
            .fetch_one(self.pool())
            .await?;
        Ok(total)
    }
}

/// Entities that can be removed. Returns whether a row was affected.
#[async_trait]
pub trait Deletable {
    async fn delete(&self, conn: &mut PgConnection, id: Uuid) -> AppResult<bool>;
}

/// Map a unique-constraint violation to a client error, leave the rest as is
pub(crate) fn unique_violation(error: sqlx::Error, message: &str) -> AppError {
    match error {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            AppError::BadRequest(message.to_string())
        }
        other => AppError::Database(other),
    }
}
