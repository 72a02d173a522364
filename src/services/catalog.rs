//! Catalog management service: authors and books

use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        author::{Author, CreateAuthor, UpdateAuthor},
        book::{Book, BookDetails, BookQuery, CreateBook, UpdateBook},
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn list_authors(&self) -> AppResult<Vec<Author>> {
        self.repository.authors.list().await
    }

    pub async fn get_author(&self, id: i32) -> AppResult<Author> {
        self.repository.authors.get_by_id(id).await
    }

    pub async fn create_author(&self, author: CreateAuthor) -> AppResult<Author> {
        author.validate()?;
        let created = self.repository.authors.create(&author).await?;
        tracing::info!(author_id = created.id, "Author created");
        Ok(created)
    }

    pub async fn update_author(&self, id: i32, author: UpdateAuthor) -> AppResult<Author> {
        author.validate()?;
        self.repository.authors.update(id, &author).await
    }

    /// Delete an author; refused while books still reference it
    pub async fn delete_author(&self, id: i32) -> AppResult<()> {
        self.repository.authors.delete(id).await?;
        tracing::info!(author_id = id, "Author deleted");
        Ok(())
    }

    /// Search books with filters
    pub async fn search_books(&self, query: &BookQuery) -> AppResult<(Vec<BookDetails>, i64)> {
        self.repository.books.search(query).await
    }

    pub async fn get_book(&self, id: i32) -> AppResult<BookDetails> {
        self.repository.books.get_by_id(id).await
    }

    pub async fn create_book(&self, book: CreateBook) -> AppResult<Book> {
        book.validate()?;
        let created = self.repository.books.create(&book).await?;
        tracing::info!(book_id = created.id, copies = created.total_copies, "Book created");
        Ok(created)
    }

    pub async fn update_book(&self, id: i32, book: UpdateBook) -> AppResult<Book> {
        book.validate()?;
        self.repository.books.update(id, &book).await
    }

    /// Delete a book and its returned loans; refused while copies are out
    pub async fn delete_book(&self, id: i32) -> AppResult<()> {
        self.repository.books.delete(id).await?;
        tracing::info!(book_id = id, "Book deleted");
        Ok(())
    }
}
