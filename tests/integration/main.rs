//! Integration tests. The router tests run in-process without a database;
//! the HTTP and database-backed tests are ignored by default.

mod api_tests;
mod borrow_flow;
mod router_tests;
