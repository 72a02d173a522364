//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{authors, books, health, loans, members};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Libris API",
        version = "0.3.0",
        description = "Library lending REST API: catalog, members and loans"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Authors
        authors::list_authors,
        authors::get_author,
        authors::create_author,
        authors::update_author,
        authors::delete_author,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        books::loan_book,
        books::return_book,
        // Members
        members::list_members,
        members::get_member,
        members::create_member,
        members::update_member,
        members::delete_member,
        members::top_active_members,
        members::get_member_loans,
        // Loans
        loans::list_loans,
        loans::get_loan,
        loans::extend_due_date,
    ),
    components(
        schemas(
            // Authors
            crate::models::author::Author,
            crate::models::author::CreateAuthor,
            crate::models::author::UpdateAuthor,
            // Books
            crate::models::book::Book,
            crate::models::book::BookDetails,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            books::MemberRequest,
            books::LoanStatusResponse,
            // Members
            crate::models::member::Member,
            crate::models::member::MemberActivity,
            crate::models::member::CreateMember,
            crate::models::member::UpdateMember,
            // Loans
            crate::models::loan::Loan,
            loans::ExtendDueDateRequest,
            loans::ExtendDueDateResponse,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "authors", description = "Author management"),
        (name = "books", description = "Book catalog"),
        (name = "members", description = "Member management"),
        (name = "loans", description = "Lending, returns and due dates")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_lending_routes() {
        let doc = ApiDoc::openapi();
        for path in ["/books/{id}/loan", "/books/{id}/return", "/loans/{id}/extend-due-date", "/members/top-active"] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing");
        }
    }
}
