//! Borrow and return of books
//!
//! Every request is validated against a snapshot of the user's active loans
//! and the requested books before any write. The writes then run in one
//! transaction, where guarded updates re-check availability so concurrent
//! requests cannot push stock below zero.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::Book,
        borrow::{
            BorrowDetails, BorrowQuery, BorrowRecord, BorrowRequest, BorrowStatus, BorrowSummary,
            BorrowedBook, ReturnRequest,
        },
    },
    repository::{EntityRepository, Repository},
    transaction::TxManager,
};

/// Most distinct books a single borrow may include
pub const MAX_BOOKS_PER_BORROW: usize = 5;

#[derive(Clone)]
pub struct BorrowsService {
    repository: Repository,
    tx: TxManager,
}

impl BorrowsService {
    pub fn new(repository: Repository, tx: TxManager) -> Self {
        Self { repository, tx }
    }

    /// Lend the requested books to a user until `due_date`
    pub async fn borrow(&self, user_id: Uuid, request: BorrowRequest) -> AppResult<BorrowSummary> {
        let now = Utc::now();
        let (book_ids, due_date) = validate_borrow_request(&request, now)?;

        self.ensure_user(user_id).await?;
        let active = self.active_loans(user_id).await?;
        let books = self.books_by_id(&book_ids).await?;

        let plan = plan_borrow(user_id, &book_ids, due_date, now, &active, &books)?;

        let books_repo = self.repository.books.clone();
        let borrows_repo = self.repository.borrows.clone();
        let records = plan.records;
        self.tx
            .with_tx(move |conn| {
                Box::pin(async move {
                    for record in &records {
                        if !books_repo.take_copy(conn, record.book_id).await? {
                            return Err(AppError::BadRequest(format!(
                                "Book with ID {} is not available",
                                record.book_id
                            )));
                        }
                    }
                    borrows_repo.create_many(conn, &records).await
                })
            })
            .await
            .map_err(|e| e.or_unexpected("Failed to borrow book"))?;

        tracing::info!(
            %user_id,
            books = plan.summary.books.len(),
            total_price = plan.summary.total_price,
            "Books borrowed"
        );
        Ok(plan.summary)
    }

    /// Take back the requested books from a user
    pub async fn return_books(&self, user_id: Uuid, request: ReturnRequest) -> AppResult<()> {
        if request.book_ids.is_empty() {
            return Err(AppError::BadRequest("book_ids is required".to_string()));
        }

        self.ensure_user(user_id).await?;
        let book_ids = dedupe(&request.book_ids);
        let active = self.active_loans(user_id).await?;
        let books = self.books_by_id(&book_ids).await?;

        let returns = plan_return(&book_ids, &active, &books)?;

        let now = Utc::now();
        let books_repo = self.repository.books.clone();
        let borrows_repo = self.repository.borrows.clone();
        let count = returns.len();
        self.tx
            .with_tx(move |conn| {
                Box::pin(async move {
                    for item in &returns {
                        if !borrows_repo.mark_returned(conn, item.record_id, now).await? {
                            return Err(AppError::BadRequest(format!(
                                "User has not borrowed the book with ID {}",
                                item.book_id
                            )));
                        }
                        if !books_repo.restore_copy(conn, item.book_id).await? {
                            return Err(AppError::Internal(format!(
                                "Book with ID {} has no copy on loan",
                                item.book_id
                            )));
                        }
                    }
                    Ok(())
                })
            })
            .await
            .map_err(|e| e.or_unexpected("Failed to return book"))?;

        tracing::info!(%user_id, books = count, "Books returned");
        Ok(())
    }

    /// List borrow records with filters, search, sort and pagination
    pub async fn find_all(&self, query: &BorrowQuery) -> AppResult<(Vec<BorrowDetails>, i64)> {
        super::find_page(
            &self.repository.borrows,
            query,
            "Failed to get borrow records",
            "Failed to get total borrow records",
        )
        .await
    }

    async fn ensure_user(&self, user_id: Uuid) -> AppResult<()> {
        self.repository
            .users
            .find_by_id(user_id)
            .await
            .map_err(|e| e.or_unexpected("Failed to get user"))?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        Ok(())
    }

    async fn active_loans(&self, user_id: Uuid) -> AppResult<Vec<BorrowRecord>> {
        self.repository
            .borrows
            .find_active_by_user(user_id)
            .await
            .map_err(|e| e.or_unexpected("Failed to get borrowed books"))
    }

    async fn books_by_id(&self, ids: &[Uuid]) -> AppResult<HashMap<Uuid, Book>> {
        let books = self
            .repository
            .books
            .find_many(ids)
            .await
            .map_err(|e| e.or_unexpected("Failed to get books"))?;
        Ok(books.into_iter().map(|book| (book.id, book)).collect())
    }
}

/// Records to insert and the summary handed back to the borrower
#[derive(Debug)]
pub struct BorrowPlan {
    pub records: Vec<BorrowRecord>,
    pub summary: BorrowSummary,
}

/// An active record to close and the book to restock
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnItem {
    pub book_id: Uuid,
    pub record_id: Uuid,
}

/// Drop repeated IDs, keeping the first occurrence order
pub fn dedupe(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Whole rental days between `now` and `due_date`, truncated
pub fn rental_days(now: DateTime<Utc>, due_date: DateTime<Utc>) -> i64 {
    (due_date - now).num_hours() / 24
}

/// Checks that need no database: book list, due date and batch size
pub fn validate_borrow_request(
    request: &BorrowRequest,
    now: DateTime<Utc>,
) -> AppResult<(Vec<Uuid>, DateTime<Utc>)> {
    if request.book_ids.is_empty() {
        return Err(AppError::BadRequest("book_ids is required".to_string()));
    }

    let due_date = request
        .due_date
        .ok_or_else(|| AppError::BadRequest("Due date is required".to_string()))?;
    if due_date - now < Duration::hours(24) {
        return Err(AppError::BadRequest(
            "Due date must be at least 1 day from now".to_string(),
        ));
    }

    let book_ids = dedupe(&request.book_ids);
    if book_ids.len() > MAX_BOOKS_PER_BORROW {
        return Err(AppError::BadRequest(format!(
            "Cannot borrow more than {} books",
            MAX_BOOKS_PER_BORROW
        )));
    }

    Ok((book_ids, due_date))
}

/// Check every requested book, in request order, and price the new records
pub fn plan_borrow(
    user_id: Uuid,
    book_ids: &[Uuid],
    due_date: DateTime<Utc>,
    now: DateTime<Utc>,
    active: &[BorrowRecord],
    books: &HashMap<Uuid, Book>,
) -> AppResult<BorrowPlan> {
    let on_loan: HashSet<Uuid> = active
        .iter()
        .filter(|record| record.is_active())
        .map(|record| record.book_id)
        .collect();
    let days = rental_days(now, due_date);

    let mut records = Vec::with_capacity(book_ids.len());
    let mut borrowed = Vec::with_capacity(book_ids.len());
    let mut total_price: i64 = 0;

    for id in book_ids {
        let book = books
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("Book with ID {} not found", id)))?;

        if !book.is_available() {
            return Err(AppError::BadRequest(format!("Book with ID {} is not available", id)));
        }
        if on_loan.contains(id) {
            return Err(AppError::BadRequest(format!(
                "User has borrowed the book with ID {}",
                id
            )));
        }

        let price = book
            .price
            .checked_mul(days)
            .and_then(|price| total_price.checked_add(price).map(|total| (price, total)));
        let Some((price, total)) = price else {
            return Err(AppError::BadRequest("Due date is too far in the future".to_string()));
        };
        total_price = total;

        records.push(BorrowRecord {
            id: Uuid::new_v4(),
            book_id: book.id,
            user_id,
            borrow_date: now,
            due_date,
            returned_date: None,
            status: BorrowStatus::Borrowed,
            total_price: price,
            created_at: now,
        });
        borrowed.push(BorrowedBook {
            id: book.id,
            title: book.title.clone(),
        });
    }

    Ok(BorrowPlan {
        records,
        summary: BorrowSummary {
            borrow_date: now,
            due_date,
            total_price,
            books: borrowed,
        },
    })
}

/// Match every requested book with the user's active record for it
pub fn plan_return(
    book_ids: &[Uuid],
    active: &[BorrowRecord],
    books: &HashMap<Uuid, Book>,
) -> AppResult<Vec<ReturnItem>> {
    let by_book: HashMap<Uuid, &BorrowRecord> = active
        .iter()
        .filter(|record| record.is_active())
        .map(|record| (record.book_id, record))
        .collect();

    book_ids
        .iter()
        .map(|id| {
            if !books.contains_key(id) {
                return Err(AppError::NotFound(format!("Book with ID {} not found", id)));
            }
            let record = by_book.get(id).ok_or_else(|| {
                AppError::BadRequest(format!("User has not borrowed the book with ID {}", id))
            })?;
            Ok(ReturnItem {
                book_id: *id,
                record_id: record.id,
            })
        })
        .collect()
}
