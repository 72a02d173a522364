//! Member (borrower) model and related types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// Library member; contact details are what notifications are sent to
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Member {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub membership_date: NaiveDate,
}

/// Member together with its number of active loans (top-active ranking row)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct MemberActivity {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub active_loans: i64,
}

/// Create member request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateMember {
    #[validate(length(min = 3, max = 150, message = "Username must be 3-150 characters"))]
    pub username: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

/// Update member request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateMember {
    #[validate(length(min = 3, max = 150, message = "Username must be 3-150 characters"))]
    pub username: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
}
