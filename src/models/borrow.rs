//! Borrow record model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::query::{Filter, FilterValue, QueryParams};

/// Borrow record status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum BorrowStatus {
    Borrowed,
    Returned,
}

impl BorrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowStatus::Borrowed => "BORROWED",
            BorrowStatus::Returned => "RETURNED",
        }
    }
}

impl std::str::FromStr for BorrowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BORROWED" => Ok(BorrowStatus::Borrowed),
            "RETURNED" => Ok(BorrowStatus::Returned),
            _ => Err(format!("Invalid borrow status: {}", s)),
        }
    }
}

impl sqlx::Type<Postgres> for BorrowStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for BorrowStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for BorrowStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

/// One copy of one book lent to one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BorrowRecord {
    pub id: Uuid,
    pub book_id: Uuid,
    pub user_id: Uuid,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    /// Set exactly once, when the book comes back
    #[sqlx(rename = "return_date")]
    pub returned_date: Option<DateTime<Utc>>,
    pub status: BorrowStatus,
    pub total_price: i64,
    pub created_at: DateTime<Utc>,
}

impl BorrowRecord {
    pub fn is_active(&self) -> bool {
        self.status == BorrowStatus::Borrowed
    }
}

/// Borrow record joined with the borrower and book names
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct BorrowDetails {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub record: BorrowRecord,
    pub user_name: String,
    pub book_title: String,
}

/// Borrow request
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct BorrowRequest {
    #[serde(default)]
    pub book_ids: Vec<Uuid>,
    /// At least 24 hours from now
    pub due_date: Option<DateTime<Utc>>,
}

/// Return request
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ReturnRequest {
    #[serde(default)]
    pub book_ids: Vec<Uuid>,
}

/// Book listed in a borrow summary
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct BorrowedBook {
    pub id: Uuid,
    pub title: String,
}

/// Result of a successful borrow
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BorrowSummary {
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    /// Sum of the price of every new record
    pub total_price: i64,
    pub books: Vec<BorrowedBook>,
}

/// Borrow record list query parameters
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BorrowQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    /// Matches user name or book title
    pub search: Option<String>,
    /// One of borrow_date, due_date, return_date, status, user_name,
    /// book_title, created_at, price
    pub sort: Option<String>,
    pub user_id: Option<Uuid>,
    pub book_id: Option<Uuid>,
    #[param(value_type = Option<String>)]
    pub status: Option<BorrowStatus>,
    /// Borrowed on or after
    pub start_date: Option<DateTime<Utc>>,
    /// Borrowed on or before
    pub end_date: Option<DateTime<Utc>>,
    /// Only active loans past their due date
    pub overdue: Option<bool>,
}

impl Filter for BorrowQuery {
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
        if let Some(id) = self.user_id {
            fields.push(("user_id", FilterValue::Uuid(id)));
        }
        if let Some(id) = self.book_id {
            fields.push(("book_id", FilterValue::Uuid(id)));
        }
        if let Some(status) = self.status {
            fields.push(("status", FilterValue::Text(status.as_str().to_string())));
        }
        if let Some(date) = self.start_date {
            fields.push(("start_date", FilterValue::Timestamp(date)));
        }
        if let Some(date) = self.end_date {
            fields.push(("end_date", FilterValue::Timestamp(date)));
        }
        if self.overdue == Some(true) {
            fields.push((
                "overdue__",
                FilterValue::Raw("br.due_date < NOW() AND br.status = 'BORROWED'".to_string()),
            ));
        }
        fields
    }
}
