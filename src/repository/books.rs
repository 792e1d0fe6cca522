//! Books repository for database operations

use async_trait::async_trait;
use sqlx::{PgConnection, Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookQuery},
    query::{FilterColumn, QuerySpec},
};

use super::{Deletable, EntityRepository};

const BOOK_COLUMNS: &str = "id, title, author, genre, rating, description, \
                            total_copies, available_copies, price, created_at";

pub const BOOK_QUERY: QuerySpec = QuerySpec {
    base: "SELECT id, title, author, genre, rating, description, total_copies, \
           available_copies, price, created_at FROM books",
    count_column: "id",
    searchable: &["title", "author"],
    filters: &[
        FilterColumn::eq("genre", "genre"),
        FilterColumn::eq("author", "author"),
    ],
    sorts: &[
        ("title", "title"),
        ("author", "author"),
        ("genre", "genre"),
        ("rating", "rating"),
        ("price", "price"),
        ("created_at", "created_at"),
    ],
    default_sort: "-created_at",
    wrap_subquery: false,
};

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get books by ID, in no particular order. Missing IDs are left out.
    pub async fn find_many(&self, ids: &[Uuid]) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books WHERE id = ANY($1)",
            BOOK_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(books)
    }

    /// Get a book and lock its row until the transaction ends
    pub async fn find_for_update(&self, conn: &mut PgConnection, id: Uuid) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books WHERE id = $1 FOR UPDATE",
            BOOK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(book)
    }

    /// Lend out one copy. Returns false when no copy is left.
    pub async fn take_copy(&self, conn: &mut PgConnection, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE books SET available_copies = available_copies - 1
            WHERE id = $1 AND available_copies > 0
            "#,
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Put one copy back. Returns false when every copy is already on the shelf.
    pub async fn restore_copy(&self, conn: &mut PgConnection, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE books SET available_copies = available_copies + 1
            WHERE id = $1 AND available_copies < total_copies
            "#,
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl EntityRepository for BooksRepository {
    type Entity = Book;
    type Row = Book;
    type Filter = BookQuery;

    const QUERY: QuerySpec = BOOK_QUERY;

    fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books WHERE id = $1",
            BOOK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(book)
    }

    async fn create(&self, conn: &mut PgConnection, book: &Book) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO books (id, title, author, genre, rating, description,
                               total_copies, available_copies, price, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(book.id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.genre)
        .bind(book.rating)
        .bind(&book.description)
        .bind(book.total_copies)
        .bind(book.available_copies)
        .bind(book.price)
        .bind(book.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    async fn update(&self, conn: &mut PgConnection, book: &Book) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE books SET
                title = $2,
                author = $3,
                genre = $4,
                rating = $5,
                description = $6,
                total_copies = $7,
                available_copies = $8,
                price = $9
            WHERE id = $1
            "#,
        )
        .bind(book.id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.genre)
        .bind(book.rating)
        .bind(&book.description)
        .bind(book.total_copies)
        .bind(book.available_copies)
        .bind(book.price)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Book not found".to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl Deletable for BooksRepository {
    /// Hard delete, only while no copy is on loan
    async fn delete(&self, conn: &mut PgConnection, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            "DELETE FROM books WHERE id = $1 AND available_copies = total_copies",
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
