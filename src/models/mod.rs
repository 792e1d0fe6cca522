//! Data models for the library server

pub mod book;
pub mod borrow;
pub mod user;

// Re-export commonly used types
pub use book::Book;
pub use borrow::{BorrowDetails, BorrowRecord, BorrowStatus};
pub use user::{Role, User};
