//! Authors repository for database operations

use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::author::{Author, CreateAuthor, UpdateAuthor},
};

#[derive(Clone)]
pub struct AuthorsRepository {
    pool: Pool<Postgres>,
}

impl AuthorsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// List all authors
    pub async fn list(&self) -> AppResult<Vec<Author>> {
        let authors = sqlx::query_as::<_, Author>(
            "SELECT * FROM authors ORDER BY last_name, first_name, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(authors)
    }

    /// Get author by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Author> {
        sqlx::query_as::<_, Author>("SELECT * FROM authors WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Author with id {} not found", id)))
    }

    pub async fn create(&self, author: &CreateAuthor) -> AppResult<Author> {
        let created = sqlx::query_as::<_, Author>(
            r#"
            INSERT INTO authors (first_name, last_name, biography, birth_date)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&author.first_name)
        .bind(&author.last_name)
        .bind(&author.biography)
        .bind(author.birth_date)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    pub async fn update(&self, id: i32, author: &UpdateAuthor) -> AppResult<Author> {
        sqlx::query_as::<_, Author>(
            r#"
            UPDATE authors SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                biography = COALESCE($4, biography),
                birth_date = COALESCE($5, birth_date)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&author.first_name)
        .bind(&author.last_name)
        .bind(&author.biography)
        .bind(author.birth_date)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Author with id {} not found", id)))
    }

    /// Delete an author; refused while books still reference it
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let has_books: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE author_id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        if has_books {
            return Err(AppError::Conflict(format!(
                "Author with id {} still has books in the catalog",
                id
            )));
        }

        let result = sqlx::query("DELETE FROM authors WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Author with id {} not found", id)));
        }
        Ok(())
    }
}
