//! Business logic services

pub mod books;
pub mod borrows;
pub mod users;

use crate::{
    config::AuthConfig,
    error::AppResult,
    query::Filter,
    repository::{EntityRepository, Repository},
    transaction::TxManager,
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub books: books::BooksService,
    pub users: users::UsersService,
    pub borrows: borrows::BorrowsService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, auth_config: AuthConfig) -> Self {
        let tx = TxManager::new(repository.pool.clone());
        Self {
            books: books::BooksService::new(repository.clone(), tx.clone()),
            users: users::UsersService::new(repository.clone(), tx.clone(), auth_config),
            borrows: borrows::BorrowsService::new(repository, tx),
        }
    }
}

/// One page of rows and the total matching the same filter.
///
/// An invalid sort token is reported before any query runs.
pub(crate) async fn find_page<R: EntityRepository>(
    repository: &R,
    filter: &R::Filter,
    rows_message: &str,
    total_message: &str,
) -> AppResult<(Vec<R::Row>, i64)> {
    R::QUERY.validate_sort(filter.params().sort.as_deref())?;

    let rows = repository
        .find_all(filter)
        .await
        .map_err(|e| e.or_unexpected(rows_message))?;
    let total = repository
        .count(filter)
        .await
        .map_err(|e| e.or_unexpected(total_message))?;

    Ok((rows, total))
}
