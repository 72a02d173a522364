//! Books repository for database operations

use sqlx::{Pool, Postgres, QueryBuilder};

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookDetails, BookQuery, CreateBook, UpdateBook},
};

const BOOK_DETAILS_SELECT: &str = r#"
    SELECT b.id, b.title, b.author_id,
           CONCAT_WS(' ', a.first_name, a.last_name) AS author_name,
           b.isbn, b.published_date, b.total_copies, b.available_copies
    FROM books b
    JOIN authors a ON a.id = b.author_id
"#;

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Search books with pagination, joined with their author
    pub async fn search(&self, query: &BookQuery) -> AppResult<(Vec<BookDetails>, i64)> {
        let page = query.page.unwrap_or(1).max(1);
        let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) * per_page;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM books b WHERE TRUE");
        push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(BOOK_DETAILS_SELECT);
        select.push(" WHERE TRUE");
        push_filters(&mut select, query);
        select
            .push(" ORDER BY b.title, b.id LIMIT ")
            .push_bind(per_page)
            .push(" OFFSET ")
            .push_bind(offset);

        let books = select
            .build_query_as::<BookDetails>()
            .fetch_all(&self.pool)
            .await?;

        Ok((books, total))
    }

    /// Get book by ID with its author name
    pub async fn get_by_id(&self, id: i32) -> AppResult<BookDetails> {
        sqlx::query_as::<_, BookDetails>(&format!("{} WHERE b.id = $1", BOOK_DETAILS_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    pub async fn create(&self, book: &CreateBook) -> AppResult<Book> {
        self.ensure_author_exists(book.author_id).await?;
        self.ensure_isbn_free(book.isbn.as_deref(), None).await?;

        let created = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (title, author_id, isbn, published_date, total_copies, available_copies)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING *
            "#,
        )
        .bind(&book.title)
        .bind(book.author_id)
        .bind(&book.isbn)
        .bind(book.published_date)
        .bind(book.total_copies)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    /// Update a book. A new `total_copies` re-derives `available_copies` from the
    /// number of copies currently on loan, under the same row lock checkouts take.
    pub async fn update(&self, id: i32, update: &UpdateBook) -> AppResult<Book> {
        if let Some(author_id) = update.author_id {
            self.ensure_author_exists(author_id).await?;
        }
        self.ensure_isbn_free(update.isbn.as_deref(), Some(id)).await?;

        let mut tx = self.pool.begin().await?;

        let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        let (total_copies, available_copies) = match update.total_copies {
            Some(new_total) if new_total != book.total_copies => {
                let on_loan: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM loans WHERE book_id = $1 AND NOT is_returned",
                )
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;

                let available = Book::copies_after_restock(new_total, on_loan).ok_or_else(|| {
                    AppError::BusinessRule(format!(
                        "Cannot reduce total copies to {}: {} copies are on loan",
                        new_total, on_loan
                    ))
                })?;
                (new_total, available)
            }
            _ => (book.total_copies, book.available_copies),
        };

        let updated = sqlx::query_as::<_, Book>(
            r#"
            UPDATE books SET
                title = COALESCE($2, title),
                author_id = COALESCE($3, author_id),
                isbn = COALESCE($4, isbn),
                published_date = COALESCE($5, published_date),
                total_copies = $6,
                available_copies = $7
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.title)
        .bind(update.author_id)
        .bind(&update.isbn)
        .bind(update.published_date)
        .bind(total_copies)
        .bind(available_copies)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(updated)
    }

    /// Delete a book and its loan history; refused while copies are on loan
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i32> = sqlx::query_scalar("SELECT id FROM books WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }

        let on_loan: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE book_id = $1 AND NOT is_returned")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if on_loan > 0 {
            return Err(AppError::BusinessRule(format!(
                "Book with id {} has {} active loan(s)",
                id, on_loan
            )));
        }

        sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn ensure_author_exists(&self, author_id: i32) -> AppResult<()> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM authors WHERE id = $1)")
            .bind(author_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(AppError::BadRequest(format!("Author with id {} does not exist", author_id)));
        }
        Ok(())
    }

    async fn ensure_isbn_free(&self, isbn: Option<&str>, exclude_id: Option<i32>) -> AppResult<()> {
        let Some(isbn) = isbn else {
            return Ok(());
        };
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM books WHERE isbn = $1 AND ($2::INTEGER IS NULL OR id != $2))",
        )
        .bind(isbn)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        if taken {
            return Err(AppError::Conflict(format!("A book with ISBN {} already exists", isbn)));
        }
        Ok(())
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &BookQuery) {
    if let Some(ref title) = query.title {
        builder
            .push(" AND LOWER(b.title) LIKE ")
            .push_bind(format!("%{}%", title.to_lowercase()));
    }
    if let Some(author_id) = query.author_id {
        builder.push(" AND b.author_id = ").push_bind(author_id);
    }
}
