//! Users repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::user::{User, UserQuery},
    query::{FilterColumn, QuerySpec},
};

use super::{unique_violation, Deletable, EntityRepository};

const USER_COLUMNS: &str = "id, full_name, email, password_hash, role, \
                            last_activity_date, created_at, deleted_at";

/// Soft-deleted users never show up; the base is wrapped so its own WHERE
/// stays intact
pub const USER_QUERY: QuerySpec = QuerySpec {
    base: "SELECT id, full_name, email, password_hash, role, last_activity_date, \
           created_at, deleted_at FROM users WHERE deleted_at IS NULL",
    count_column: "id",
    searchable: &["full_name", "email"],
    filters: &[FilterColumn::eq("role", "role")],
    sorts: &[
        ("name", "full_name"),
        ("created_at", "created_at"),
        ("role", "role"),
    ],
    default_sort: "-created_at",
    wrap_subquery: true,
};

#[derive(Clone)]
pub struct UsersRepository {
    pool: Pool<Postgres>,
}

impl UsersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get an active user by email
    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE LOWER(email) = LOWER($1) AND deleted_at IS NULL",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Whether any user, deleted or not, holds this email
    pub async fn email_exists(&self, email: &str) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1))",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Record activity, e.g. a successful login
    pub async fn touch_activity(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        sqlx::query("UPDATE users SET last_activity_date = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl EntityRepository for UsersRepository {
    type Entity = User;
    type Row = User;
    type Filter = UserQuery;

    const QUERY: QuerySpec = USER_QUERY;

    fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1 AND deleted_at IS NULL",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create(&self, conn: &mut PgConnection, user: &User) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, full_name, email, password_hash, role,
                               last_activity_date, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.id)
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(user.last_activity_date)
        .bind(user.created_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| unique_violation(e, "Email already exists"))?;

        Ok(())
    }

    async fn update(&self, conn: &mut PgConnection, user: &User) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                full_name = $2,
                email = $3,
                password_hash = $4,
                role = $5,
                last_activity_date = $6
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(user.id)
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(user.last_activity_date)
        .execute(&mut *conn)
        .await
        .map_err(|e| unique_violation(e, "Email already exists"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl Deletable for UsersRepository {
    /// Soft delete: the row stays for the borrow history
    async fn delete(&self, conn: &mut PgConnection, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::Role;

    #[test]
    fn test_list_query_wraps_active_users() {
        let query = UserQuery {
            role: Some(Role::Admin),
            search: Some("ada".to_string()),
            sort: Some("name".to_string()),
            ..UserQuery::default()
        };

        let statement = USER_QUERY.select(&query).unwrap();
        assert!(statement.sql.starts_with("SELECT * FROM (SELECT id, full_name"));
        assert!(statement.sql.contains("WHERE deleted_at IS NULL) AS s WHERE role = $1"));
        assert!(statement
            .sql
            .ends_with("AND (full_name ILIKE $2 OR email ILIKE $3) ORDER BY full_name ASC"));
    }

    #[test]
    fn test_count_ignores_pagination() {
        let query = UserQuery {
            page: Some(4),
            limit: Some(25),
            ..UserQuery::default()
        };

        let statement = USER_QUERY.count(&query);
        assert!(statement.sql.starts_with("SELECT COUNT(id) FROM (SELECT * FROM ("));
        assert!(!statement.sql.contains("LIMIT"));
    }
}
