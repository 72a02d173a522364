//! Book model, availability rules and related types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::error::LoanError;

/// Book model from database.
///
/// `available_copies` always equals `total_copies` minus the number of
/// unreturned loans for the book, and stays within `0..=total_copies`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author_id: i32,
    pub isbn: Option<String>,
    pub published_date: Option<NaiveDate>,
    pub total_copies: i32,
    pub available_copies: i32,
}

impl Book {
    /// Checks that at least one copy can be lent out
    pub fn ensure_lendable(&self) -> Result<(), LoanError> {
        if self.available_copies < 1 {
            return Err(LoanError::NoAvailableCopies);
        }
        Ok(())
    }

    /// Available copies after a copy comes back, never above the total
    pub fn copies_after_return(&self) -> i32 {
        (self.available_copies + 1).min(self.total_copies)
    }

    /// Available copies once the stock changes to `new_total` with `on_loan` copies out
    pub fn copies_after_restock(new_total: i32, on_loan: i64) -> Option<i32> {
        let on_loan = i32::try_from(on_loan).ok()?;
        (new_total >= on_loan).then(|| new_total - on_loan)
    }
}

/// Book with its author's display name, as returned by listings
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BookDetails {
    pub id: i32,
    pub title: String,
    pub author_id: i32,
    pub author_name: String,
    pub isbn: Option<String>,
    pub published_date: Option<NaiveDate>,
    pub total_copies: i32,
    pub available_copies: i32,
}

/// Book search query
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct BookQuery {
    /// Case-insensitive title fragment
    pub title: Option<String>,
    pub author_id: Option<i32>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Create book request; every copy starts available
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,
    pub author_id: i32,
    #[validate(length(min = 10, max = 20, message = "ISBN must be 10-20 characters"))]
    pub isbn: Option<String>,
    pub published_date: Option<NaiveDate>,
    #[validate(range(min = 0, message = "Total copies cannot be negative"))]
    pub total_copies: i32,
}

/// Update book request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: Option<String>,
    pub author_id: Option<i32>,
    #[validate(length(min = 10, max = 20, message = "ISBN must be 10-20 characters"))]
    pub isbn: Option<String>,
    pub published_date: Option<NaiveDate>,
    #[validate(range(min = 0, message = "Total copies cannot be negative"))]
    pub total_copies: Option<i32>,
}
