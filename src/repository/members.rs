//! Members repository for database operations

use sqlx::{Pool, Postgres};

use crate::{
    error::{conflict_on_unique_violation, AppError, AppResult},
    models::member::{CreateMember, Member, UpdateMember},
};

const USERNAME_TAKEN: &str = "Username already exists";

#[derive(Clone)]
pub struct MembersRepository {
    pool: Pool<Postgres>,
}

impl MembersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> AppResult<Vec<Member>> {
        let members = sqlx::query_as::<_, Member>("SELECT * FROM members ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(members)
    }

    /// Get member by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Member> {
        sqlx::query_as::<_, Member>("SELECT * FROM members WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Member with id {} not found", id)))
    }

    /// Check if username already exists
    pub async fn username_exists(&self, username: &str, exclude_id: Option<i32>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM members WHERE LOWER(username) = LOWER($1) AND ($2::INTEGER IS NULL OR id != $2))",
        )
        .bind(username)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    pub async fn create(&self, member: &CreateMember) -> AppResult<Member> {
        let created = sqlx::query_as::<_, Member>(
            "INSERT INTO members (username, email) VALUES ($1, $2) RETURNING *",
        )
        .bind(&member.username)
        .bind(&member.email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique_violation(e, USERNAME_TAKEN))?;
        Ok(created)
    }

    pub async fn update(&self, id: i32, member: &UpdateMember) -> AppResult<Member> {
        sqlx::query_as::<_, Member>(
            r#"
            UPDATE members SET
                username = COALESCE($2, username),
                email = COALESCE($3, email)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&member.username)
        .bind(&member.email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_on_unique_violation(e, USERNAME_TAKEN))?
        .ok_or_else(|| AppError::NotFound(format!("Member with id {} not found", id)))
    }

    /// Delete a member and its loan history; refused while it still holds books.
    ///
    /// The member row lock conflicts with the share lock a checkout takes, so a loan
    /// cannot be created for a member that is being deleted.
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i32> = sqlx::query_scalar("SELECT id FROM members WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(AppError::NotFound(format!("Member with id {} not found", id)));
        }

        let active: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE member_id = $1 AND NOT is_returned")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if active > 0 {
            return Err(AppError::BusinessRule(format!(
                "Member with id {} has {} active loan(s)",
                id, active
            )));
        }

        sqlx::query("DELETE FROM members WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
