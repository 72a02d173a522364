//! Loan endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::loan::{Loan, LoanQuery},
    AppState,
};

/// Extend due date request
#[derive(Deserialize, ToSchema)]
pub struct ExtendDueDateRequest {
    /// Positive whole number of days, as a number or a string of digits
    #[serde(default)]
    #[schema(value_type = Object)]
    pub additional_days: serde_json::Value,
}

#[derive(Serialize, ToSchema)]
pub struct ExtendDueDateResponse {
    pub message: String,
    pub new_due_date: NaiveDate,
}

/// List loans
#[utoipa::path(
    get,
    path = "/loans",
    tag = "loans",
    params(LoanQuery),
    responses(
        (status = 200, description = "Matching loans, newest first", body = Vec<Loan>)
    )
)]
pub async fn list_loans(State(state): State<AppState>, Query(query): Query<LoanQuery>) -> AppResult<Json<Vec<Loan>>> {
    let loans = state.services.loan_queries.list_loans(&query).await?;
    Ok(Json(loans))
}

/// Get loan by ID
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan details", body = Loan),
        (status = 404, description = "Loan not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_loan(State(state): State<AppState>, Path(id): Path<i32>) -> AppResult<Json<Loan>> {
    let loan = state.services.loan_queries.get_loan(id).await?;
    Ok(Json(loan))
}

/// Push back the due date of an active loan
#[utoipa::path(
    post,
    path = "/loans/{id}/extend-due-date",
    tag = "loans",
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    request_body = ExtendDueDateRequest,
    responses(
        (status = 200, description = "Due date extended", body = ExtendDueDateResponse),
        (status = 400, description = "Unknown, returned or overdue loan, or invalid day count", body = crate::error::ErrorResponse)
    )
)]
pub async fn extend_due_date(
    State(state): State<AppState>,
    Path(loan_id): Path<i32>,
    Json(request): Json<ExtendDueDateRequest>,
) -> AppResult<Json<ExtendDueDateResponse>> {
    let loan = state
        .services
        .loans
        .extend_due_date(loan_id, &request.additional_days)
        .await?;

    Ok(Json(ExtendDueDateResponse {
        message: "Due date extended".to_string(),
        new_due_date: loan.due_date,
    }))
}
