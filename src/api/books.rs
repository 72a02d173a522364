//! Book endpoints, including lending and returning copies

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookDetails, BookQuery, CreateBook, UpdateBook},
        loan::Loan,
    },
    AppState,
};

/// Paginated response wrapper
#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T>
where
    T: for<'a> ToSchema<'a>,
{
    /// Page content
    pub items: Vec<T>,
    /// Total number of matching rows
    pub total: i64,
    /// Current page number
    pub page: i64,
    /// Rows per page
    pub per_page: i64,
}

/// Borrower of a lend or return request
#[derive(Deserialize, ToSchema)]
pub struct MemberRequest {
    pub member_id: Option<i32>,
}

impl MemberRequest {
    fn member_id(&self) -> AppResult<i32> {
        self.member_id
            .ok_or_else(|| AppError::Validation("member_id is required".to_string()))
    }
}

/// Loan state after a lend or return
#[derive(Serialize, ToSchema)]
pub struct LoanStatusResponse {
    pub status: String,
    pub loan: Loan,
}

/// List books with search and pagination
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    params(BookQuery),
    responses(
        (status = 200, description = "List of books", body = PaginatedResponse<BookDetails>)
    )
)]
pub async fn list_books(
    State(state): State<AppState>,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<PaginatedResponse<BookDetails>>> {
    let (items, total) = state.services.catalog.search_books(&query).await?;

    Ok(Json(PaginatedResponse {
        items,
        total,
        page: query.page.unwrap_or(1).max(1),
        per_page: query.per_page.unwrap_or(20).clamp(1, 100),
    }))
}

/// Get book details by ID
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = BookDetails),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(State(state): State<AppState>, Path(id): Path<i32>) -> AppResult<Json<BookDetails>> {
    let book = state.services.catalog.get_book(id).await?;
    Ok(Json(book))
}

/// Create a new book
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 400, description = "Invalid input or unknown author"),
        (status = 409, description = "ISBN already exists")
    )
)]
pub async fn create_book(
    State(state): State<AppState>,
    Json(book): Json<CreateBook>,
) -> AppResult<(StatusCode, Json<Book>)> {
    let created = state.services.catalog.create_book(book).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Update a book
#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 404, description = "Book not found"),
        (status = 422, description = "Fewer copies than currently on loan")
    )
)]
pub async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(book): Json<UpdateBook>,
) -> AppResult<Json<Book>> {
    let updated = state.services.catalog.update_book(id, book).await?;
    Ok(Json(updated))
}

/// Delete a book
#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 404, description = "Book not found"),
        (status = 422, description = "Book has active loans")
    )
)]
pub async fn delete_book(State(state): State<AppState>, Path(id): Path<i32>) -> AppResult<StatusCode> {
    state.services.catalog.delete_book(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Lend a copy of a book to a member
#[utoipa::path(
    post,
    path = "/books/{id}/loan",
    tag = "loans",
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    request_body = MemberRequest,
    responses(
        (status = 201, description = "Book loaned", body = LoanStatusResponse),
        (status = 400, description = "Unknown book or member, no copy available, or already borrowed", body = crate::error::ErrorResponse),
        (status = 503, description = "Book is busy, retry")
    )
)]
pub async fn loan_book(
    State(state): State<AppState>,
    Path(book_id): Path<i32>,
    Json(request): Json<MemberRequest>,
) -> AppResult<(StatusCode, Json<LoanStatusResponse>)> {
    let loan = state.services.loans.checkout(book_id, request.member_id()?).await?;

    Ok((
        StatusCode::CREATED,
        Json(LoanStatusResponse {
            status: "loaned".to_string(),
            loan,
        }),
    ))
}

/// Return a member's copy of a book
#[utoipa::path(
    post,
    path = "/books/{id}/return",
    tag = "loans",
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    request_body = MemberRequest,
    responses(
        (status = 200, description = "Book returned", body = LoanStatusResponse),
        (status = 400, description = "Unknown book or no active loan", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_book(
    State(state): State<AppState>,
    Path(book_id): Path<i32>,
    Json(request): Json<MemberRequest>,
) -> AppResult<Json<LoanStatusResponse>> {
    let loan = state.services.loans.return_book(book_id, request.member_id()?).await?;

    Ok(Json(LoanStatusResponse {
        status: "returned".to_string(),
        loan,
    }))
}
