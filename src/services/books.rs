//! Book catalog service

use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookQuery, CreateBook, UpdateBook},
    repository::{Deletable, EntityRepository, Repository},
    transaction::TxManager,
};

const MAX_TEXT_LENGTH: usize = 255;

#[derive(Clone)]
pub struct BooksService {
    repository: Repository,
    tx: TxManager,
}

impl BooksService {
    pub fn new(repository: Repository, tx: TxManager) -> Self {
        Self { repository, tx }
    }

    /// List books with filters, search, sort and pagination
    pub async fn find_all(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        super::find_page(
            &self.repository.books,
            query,
            "Failed to get books",
            "Failed to get total books",
        )
        .await
    }

    /// Get book by ID
    pub async fn get_by_id(&self, id: Uuid) -> AppResult<Book> {
        self.repository
            .books
            .find_by_id(id)
            .await
            .map_err(|e| e.or_unexpected("Failed to get book"))?
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))
    }

    /// Add a book to the catalog
    pub async fn create(&self, request: CreateBook) -> AppResult<Book> {
        let book = new_book(request);
        validate_book(&book)?;

        let books = self.repository.books.clone();
        let created = book.clone();
        self.tx
            .with_tx(move |conn| Box::pin(async move { books.create(conn, &created).await }))
            .await
            .map_err(|e| e.or_unexpected("Failed to create book"))?;

        tracing::info!(book_id = %book.id, title = %book.title, "Book created");
        Ok(book)
    }

    /// Update a book; the row stays locked while the new stock is computed
    pub async fn update(&self, id: Uuid, request: UpdateBook) -> AppResult<Book> {
        let books = self.repository.books.clone();
        let book = self
            .tx
            .with_tx(move |conn| {
                Box::pin(async move {
                    let current = books
                        .find_for_update(conn, id)
                        .await?
                        .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;

                    let updated = apply_update(current, request)?;
                    validate_book(&updated)?;
                    books.update(conn, &updated).await?;
                    Ok::<_, AppError>(updated)
                })
            })
            .await
            .map_err(|e| e.or_unexpected("Failed to update book"))?;

        tracing::info!(book_id = %book.id, "Book updated");
        Ok(book)
    }

    /// Delete a book; refused while any copy is on loan
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let book = self.get_by_id(id).await?;
        if book.on_loan() != 0 {
            return Err(AppError::BadRequest("Book has been borrowed".to_string()));
        }

        let books = self.repository.books.clone();
        let deleted = self
            .tx
            .with_tx(move |conn| Box::pin(async move { books.delete(conn, id).await }))
            .await
            .map_err(|e| e.or_unexpected("Failed to delete book"))?;

        // A copy went out between the check and the delete
        if !deleted {
            return Err(AppError::BadRequest("Book has been borrowed".to_string()));
        }

        tracing::info!(book_id = %id, "Book deleted");
        Ok(())
    }
}

fn new_book(request: CreateBook) -> Book {
    Book {
        id: Uuid::new_v4(),
        available_copies: request.available_copies.unwrap_or(request.total_copies),
        title: request.title,
        author: request.author,
        genre: request.genre,
        rating: request.rating,
        description: request.description,
        total_copies: request.total_copies,
        price: request.price,
        created_at: Utc::now(),
    }
}

/// Merge an update into a book, keeping the copies on loan accounted for
fn apply_update(mut book: Book, update: UpdateBook) -> AppResult<Book> {
    let on_loan = book.on_loan();

    if let Some(title) = update.title {
        book.title = title;
    }
    if let Some(author) = update.author {
        book.author = author;
    }
    if let Some(genre) = update.genre {
        book.genre = genre;
    }
    if let Some(rating) = update.rating {
        book.rating = rating;
    }
    if let Some(description) = update.description {
        book.description = description;
    }
    if let Some(price) = update.price {
        book.price = price;
    }

    if let Some(total) = update.total_copies {
        if total < on_loan {
            return Err(AppError::BadRequest(format!(
                "total_copies must be greater than or equal to the {} copies on loan",
                on_loan
            )));
        }
        book.total_copies = total;
    }
    // Copies on loan must stay restorable by their returns
    let shelved = book.total_copies - on_loan;
    match update.available_copies {
        Some(available) if available > shelved => {
            return Err(AppError::BadRequest(format!(
                "available_copies must be less than or equal to the {} copies not on loan",
                shelved
            )));
        }
        Some(available) => book.available_copies = available,
        None => book.available_copies = shelved,
    }

    Ok(book)
}

fn validate_book(book: &Book) -> AppResult<()> {
    for (key, value) in [
        ("title", &book.title),
        ("author", &book.author),
        ("genre", &book.genre),
        ("description", &book.description),
    ] {
        if value.chars().count() > MAX_TEXT_LENGTH {
            return Err(AppError::BadRequest(format!(
                "{} must be less than {} characters",
                key, MAX_TEXT_LENGTH
            )));
        }
    }

    if !(1..=5).contains(&book.rating) {
        return Err(AppError::BadRequest("rating must be between 1 and 5".to_string()));
    }
    if book.total_copies < 1 {
        return Err(AppError::BadRequest("total_copies must be greater than 0".to_string()));
    }
    if book.available_copies < 0 {
        return Err(AppError::BadRequest(
            "available_copies must be greater than or equal to 0".to_string(),
        ));
    }
    if book.available_copies > book.total_copies {
        return Err(AppError::BadRequest(
            "available_copies must be less than or equal to total_copies".to_string(),
        ));
    }
    if book.price < 0 {
        return Err(AppError::BadRequest("price must be greater than or equal to 0".to_string()));
    }

    Ok(())
}
