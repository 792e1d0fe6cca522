//! Database tests for the transaction manager and the borrow workflow

use chrono::{Duration, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use library_server::{
    config::{AuthConfig, DatabaseConfig},
    error::AppError,
    models::{
        book::{Book, BookQuery, CreateBook},
        borrow::{BorrowQuery, BorrowRequest, BorrowStatus, ReturnRequest},
        user::{SignUp, User},
    },
    repository::{EntityRepository, Repository},
    services::Services,
    transaction::TxManager,
};

/// Connect to DATABASE_URL (or the default config) and apply migrations
async fn setup() -> (PgPool, Repository, Services) {
    let url = std::env::var("DATABASE_URL").unwrap_or_else(|_| DatabaseConfig::default().url);
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("Failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let repository = Repository::new(pool.clone());
    let services = Services::new(repository.clone(), AuthConfig::default());
    (pool, repository, services)
}

async fn new_reader(services: &Services) -> User {
    services
        .users
        .sign_up(SignUp {
            name: "Flow Reader".to_string(),
            email: format!("flow-{}@example.com", Uuid::new_v4()),
            password: "secret-password".to_string(),
        })
        .await
        .expect("Failed to sign up")
}

async fn new_book(services: &Services, genre: &str, total_copies: i32, price: i64) -> Book {
    services
        .books
        .create(CreateBook {
            title: format!("Book {}", Uuid::new_v4()),
            author: "Flow Author".to_string(),
            genre: genre.to_string(),
            rating: 4,
            description: String::new(),
            total_copies,
            available_copies: None,
            price,
        })
        .await
        .expect("Failed to create book")
}

fn unsaved_book() -> Book {
    Book {
        id: Uuid::new_v4(),
        title: "Transient".to_string(),
        author: "Nobody".to_string(),
        genre: "Test".to_string(),
        rating: 3,
        description: String::new(),
        total_copies: 1,
        available_copies: 1,
        price: 0,
        created_at: Utc::now(),
    }
}

#[tokio::test]
#[ignore] // Needs a database: DATABASE_URL=... cargo test -- --ignored
async fn test_borrow_and_return_round_trip() {
    let (_pool, repository, services) = setup().await;
    let reader = new_reader(&services).await;
    let book = new_book(&services, "Round Trip", 3, 150).await;

    let summary = services
        .borrows
        .borrow(
            reader.id,
            BorrowRequest {
                book_ids: vec![book.id, book.id],
                due_date: Some(Utc::now() + Duration::hours(48) + Duration::minutes(5)),
            },
        )
        .await
        .expect("Borrow failed");

    assert_eq!(summary.total_price, 300);
    assert_eq!(summary.books.len(), 1);
    assert_eq!(summary.books[0].id, book.id);

    let stock = repository.books.find_by_id(book.id).await.unwrap().unwrap();
    assert_eq!(stock.available_copies, 2);

    // Second loan of the same book while the first is active
    let again = services
        .borrows
        .borrow(
            reader.id,
            BorrowRequest {
                book_ids: vec![book.id],
                due_date: Some(Utc::now() + Duration::days(3)),
            },
        )
        .await;
    assert!(matches!(again, Err(AppError::BadRequest(_))));

    // A copy is out, so the book stays
    let delete = services.books.delete(book.id).await;
    assert!(matches!(delete, Err(AppError::BadRequest(ref m)) if m == "Book has been borrowed"));

    services
        .borrows
        .return_books(reader.id, ReturnRequest { book_ids: vec![book.id] })
        .await
        .expect("Return failed");

    let stock = repository.books.find_by_id(book.id).await.unwrap().unwrap();
    assert_eq!(stock.available_copies, 3);

    let (records, total) = services
        .borrows
        .find_all(&BorrowQuery {
            user_id: Some(reader.id),
            ..BorrowQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(records[0].record.status, BorrowStatus::Returned);
    assert!(records[0].record.returned_date.is_some());
    assert_eq!(records[0].record.total_price, 300);
    assert_eq!(records[0].book_title, book.title);

    // Returning twice is refused
    let twice = services
        .borrows
        .return_books(reader.id, ReturnRequest { book_ids: vec![book.id] })
        .await;
    assert!(matches!(twice, Err(AppError::BadRequest(_))));

    services.books.delete(book.id).await.expect("Delete failed");
}

#[tokio::test]
#[ignore]
async fn test_last_copy_goes_to_one_reader_only() {
    let (_pool, repository, services) = setup().await;
    let first = new_reader(&services).await;
    let second = new_reader(&services).await;
    let book = new_book(&services, "Last Copy", 1, 100).await;

    let request = || BorrowRequest {
        book_ids: vec![book.id],
        due_date: Some(Utc::now() + Duration::days(2)),
    };

    let (a, b) = tokio::join!(
        services.borrows.borrow(first.id, request()),
        services.borrows.borrow(second.id, request()),
    );
    assert!(a.is_ok() ^ b.is_ok(), "exactly one borrow must succeed");

    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(loser, Err(AppError::BadRequest(ref m)) if m.contains("is not available")));

    let stock = repository.books.find_by_id(book.id).await.unwrap().unwrap();
    assert_eq!(stock.available_copies, 0);
}

#[tokio::test]
#[ignore]
async fn test_failed_borrow_changes_nothing() {
    let (_pool, repository, services) = setup().await;
    let reader = new_reader(&services).await;
    let available = new_book(&services, "Partial", 2, 100).await;

    let result = services
        .borrows
        .borrow(
            reader.id,
            BorrowRequest {
                book_ids: vec![available.id, Uuid::new_v4()],
                due_date: Some(Utc::now() + Duration::days(2)),
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    let stock = repository.books.find_by_id(available.id).await.unwrap().unwrap();
    assert_eq!(stock.available_copies, 2);
    assert_eq!(
        repository.borrows.count_active_by_user(reader.id).await.unwrap(),
        0
    );
}

#[tokio::test]
#[ignore]
async fn test_transaction_commits_on_success() {
    let (pool, repository, _services) = setup().await;
    let tx = TxManager::new(pool);
    let book = unsaved_book();
    let id = book.id;

    let books = repository.books.clone();
    tx.with_tx(move |conn| Box::pin(async move { books.create(conn, &book).await }))
        .await
        .expect("Transaction failed");

    assert!(repository.books.find_by_id(id).await.unwrap().is_some());
}

#[tokio::test]
#[ignore]
async fn test_transaction_rolls_back_on_error() {
    let (pool, repository, _services) = setup().await;
    let tx = TxManager::new(pool);
    let book = unsaved_book();
    let id = book.id;

    let books = repository.books.clone();
    let result = tx
        .with_tx(move |conn| {
            Box::pin(async move {
                books.create(conn, &book).await?;
                Err::<(), _>(AppError::BadRequest("abort".to_string()))
            })
        })
        .await;

    assert!(matches!(result, Err(AppError::BadRequest(ref m)) if m == "abort"));
    assert!(repository.books.find_by_id(id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_transaction_rolls_back_and_repanics() {
    let (pool, repository, _services) = setup().await;
    let tx = TxManager::new(pool);
    let book = unsaved_book();
    let id = book.id;

    let books = repository.books.clone();
    let handle = tokio::spawn(async move {
        tx.with_tx::<(), _>(move |conn| {
            Box::pin(async move {
                books.create(conn, &book).await?;
                if book.price == 0 {
                    panic!("callback failure");
                }
                Ok::<_, AppError>(())
            })
        })
        .await
    });

    let join = handle.await;
    assert!(join.unwrap_err().is_panic());
    assert!(repository.books.find_by_id(id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_transaction_survives_callback_panicking_before_its_future() {
    let (pool, _repository, _services) = setup().await;
    let tx = TxManager::new(pool);
    let fail = !Uuid::new_v4().is_nil();

    let failing = tx.clone();
    let handle = tokio::spawn(async move {
        failing
            .with_tx::<(), _>(move |conn| {
                if fail {
                    panic!("could not build the unit of work");
                }
                Box::pin(async move {
                    sqlx::query("SELECT 1").execute(conn).await?;
                    Ok::<_, AppError>(())
                })
            })
            .await
    });
    assert!(handle.await.unwrap_err().is_panic());

    // The connection went back to the pool with no transaction left open
    let value = tx
        .with_tx(|conn| {
            Box::pin(async move {
                let value: i32 = sqlx::query_scalar("SELECT 1").fetch_one(conn).await?;
                Ok::<_, AppError>(value)
            })
        })
        .await
        .unwrap();
    assert_eq!(value, 1);
}

#[tokio::test]
#[ignore]
async fn test_book_pagination_and_count() {
    let (_pool, _repository, services) = setup().await;
    let genre = format!("Paged {}", Uuid::new_v4());
    for price in [300, 100, 200] {
        new_book(&services, &genre, 1, price).await;
    }

    let query = BookQuery {
        genre: Some(genre.clone()),
        sort: Some("-price".to_string()),
        page: Some(2),
        limit: Some(2),
        ..BookQuery::default()
    };
    let (books, total) = services.books.find_all(&query).await.unwrap();

    assert_eq!(total, 3);
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].price, 100);

    let unknown = BookQuery {
        sort: Some("isbn".to_string()),
        ..BookQuery::default()
    };
    assert!(matches!(
        services.books.find_all(&unknown).await,
        Err(AppError::BadRequest(_))
    ));
}
