//! Member endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    error::AppResult,
    models::{
        loan::Loan,
        member::{CreateMember, Member, MemberActivity, UpdateMember},
    },
    AppState,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct TopActiveQuery {
    /// Number of members to return (default 5, at most 50)
    pub limit: Option<i64>,
}

/// List all members
#[utoipa::path(
    get,
    path = "/members",
    tag = "members",
    responses(
        (status = 200, description = "List of members", body = Vec<Member>)
    )
)]
pub async fn list_members(State(state): State<AppState>) -> AppResult<Json<Vec<Member>>> {
    let members = state.services.members.list().await?;
    Ok(Json(members))
}

/// Get member by ID
#[utoipa::path(
    get,
    path = "/members/{id}",
    tag = "members",
    params(
        ("id" = i32, Path, description = "Member ID")
    ),
    responses(
        (status = 200, description = "Member details", body = Member),
        (status = 404, description = "Member not found")
    )
)]
pub async fn get_member(State(state): State<AppState>, Path(id): Path<i32>) -> AppResult<Json<Member>> {
    let member = state.services.members.get(id).await?;
    Ok(Json(member))
}

/// Register a new member
#[utoipa::path(
    post,
    path = "/members",
    tag = "members",
    request_body = CreateMember,
    responses(
        (status = 201, description = "Member created", body = Member),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Username already exists")
    )
)]
pub async fn create_member(
    State(state): State<AppState>,
    Json(member): Json<CreateMember>,
) -> AppResult<(StatusCode, Json<Member>)> {
    let created = state.services.members.create(member).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Update a member
#[utoipa::path(
    put,
    path = "/members/{id}",
    tag = "members",
    params(
        ("id" = i32, Path, description = "Member ID")
    ),
    request_body = UpdateMember,
    responses(
        (status = 200, description = "Member updated", body = Member),
        (status = 404, description = "Member not found"),
        (status = 409, description = "Username already exists")
    )
)]
pub async fn update_member(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(member): Json<UpdateMember>,
) -> AppResult<Json<Member>> {
    let updated = state.services.members.update(id, member).await?;
    Ok(Json(updated))
}

/// Delete a member
#[utoipa::path(
    delete,
    path = "/members/{id}",
    tag = "members",
    params(
        ("id" = i32, Path, description = "Member ID")
    ),
    responses(
        (status = 204, description = "Member deleted"),
        (status = 404, description = "Member not found"),
        (status = 422, description = "Member has active loans")
    )
)]
pub async fn delete_member(State(state): State<AppState>, Path(id): Path<i32>) -> AppResult<StatusCode> {
    state.services.members.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Members with the most active loans
#[utoipa::path(
    get,
    path = "/members/top-active",
    tag = "members",
    params(TopActiveQuery),
    responses(
        (status = 200, description = "Most active members first", body = Vec<MemberActivity>)
    )
)]
pub async fn top_active_members(
    State(state): State<AppState>,
    Query(query): Query<TopActiveQuery>,
) -> AppResult<Json<Vec<MemberActivity>>> {
    let members = state.services.stats.top_active_members(query.limit).await?;
    Ok(Json(members))
}

/// Active loans of a member
#[utoipa::path(
    get,
    path = "/members/{id}/loans",
    tag = "members",
    params(
        ("id" = i32, Path, description = "Member ID")
    ),
    responses(
        (status = 200, description = "Member's active loans", body = Vec<Loan>),
        (status = 404, description = "Member not found")
    )
)]
pub async fn get_member_loans(State(state): State<AppState>, Path(id): Path<i32>) -> AppResult<Json<Vec<Loan>>> {
    let loans = state.services.loan_queries.member_loans(id).await?;
    Ok(Json(loans))
}
