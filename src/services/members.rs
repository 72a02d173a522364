//! Member management service

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::member::{CreateMember, Member, UpdateMember},
    repository::Repository,
};

#[derive(Clone)]
pub struct MembersService {
    repository: Repository,
}

impl MembersService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn list(&self) -> AppResult<Vec<Member>> {
        self.repository.members.list().await
    }

    pub async fn get(&self, id: i32) -> AppResult<Member> {
        self.repository.members.get_by_id(id).await
    }

    /// Register a member; usernames are unique regardless of case
    pub async fn create(&self, member: CreateMember) -> AppResult<Member> {
        member.validate()?;

        if self.repository.members.username_exists(&member.username, None).await? {
            return Err(AppError::Conflict("Username already exists".to_string()));
        }

        let created = self.repository.members.create(&member).await?;
        tracing::info!(member_id = created.id, username = %created.username, "Member registered");
        Ok(created)
    }

    pub async fn update(&self, id: i32, member: UpdateMember) -> AppResult<Member> {
        member.validate()?;

        if let Some(ref username) = member.username {
            if self.repository.members.username_exists(username, Some(id)).await? {
                return Err(AppError::Conflict("Username already exists".to_string()));
            }
        }

        self.repository.members.update(id, &member).await
    }

    pub async fn delete(&self, id: i32) -> AppResult<()> {
        self.repository.members.delete(id).await?;
        tracing::info!(member_id = id, "Member deleted");
        Ok(())
    }
}
