//! Book model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::query::{Filter, FilterValue, QueryParams};

/// Full book model from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub genre: String,
    /// Rating from 1 to 5
    pub rating: i32,
    pub description: String,
    pub total_copies: i32,
    pub available_copies: i32,
    /// Rental price per day
    pub price: i64,
    pub created_at: DateTime<Utc>,
}

impl Book {
    /// Copies currently lent out
    pub fn on_loan(&self) -> i32 {
        self.total_copies - self.available_copies
    }

    pub fn is_available(&self) -> bool {
        self.available_copies > 0
    }
}

/// Create book request
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateBook {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub rating: i32,
    #[serde(default)]
    pub description: String,
    pub total_copies: i32,
    /// Defaults to `total_copies`
    pub available_copies: Option<i32>,
    pub price: i64,
}

/// Update book request, absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateBook {
    pub title: Option<String>,
    pub author: Option<String>,
    pub genre: Option<String>,
    pub rating: Option<i32>,
    pub description: Option<String>,
    pub total_copies: Option<i32>,
    /// Defaults to `total_copies` minus the copies on loan
    pub available_copies: Option<i32>,
    pub price: Option<i64>,
}

/// Book list query parameters
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BookQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    /// Matches title or author
    pub search: Option<String>,
    /// One of title, author, genre, rating, price, created_at
    pub sort: Option<String>,
    pub genre: Option<String>,
    pub author: Option<String>,
}

impl Filter for BookQuery {
    fn params(&self) -> QueryParams {
        QueryParams {
            page: self.page,
            limit: self.limit,
            search: self.search.clone(),
            sort: self.sort.clone(),
        }
    }

    fn fields(&self) -> Vec<(&'static str, FilterValue)> {
        let mut fields = Vec::new();
        if let Some(ref genre) = self.genre {
            fields.push(("genre", FilterValue::Text(genre.clone())));
        }
        if let Some(ref author) = self.author {
            fields.push(("author", FilterValue::Text(author.clone())));
        }
        fields
    }
}
