//! In-memory `LoanStore` for tests.
//!
//! A single mutex guards the whole catalog, which gives every operation the same
//! all-or-nothing, per-book serialized behaviour the PostgreSQL store gets from
//! its row locks.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use crate::{
    error::{AppError, AppResult, LoanError},
    models::{
        book::Book,
        loan::{Loan, LoanNotice, NewLoan},
        member::{Member, MemberActivity},
    },
};

use super::LoanStore;

#[derive(Default)]
struct Catalog {
    books: BTreeMap<i32, Book>,
    members: BTreeMap<i32, Member>,
    loans: BTreeMap<i32, Loan>,
    next_loan_id: i32,
}

#[derive(Default)]
pub struct MemoryLoanStore {
    catalog: Mutex<Catalog>,
}

impl MemoryLoanStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, Catalog>> {
        self.catalog
            .lock()
            .map_err(|_| AppError::Internal("catalog mutex poisoned".to_string()))
    }

    pub fn add_book(&self, id: i32, title: &str, total_copies: i32) {
        let mut catalog = self.catalog.lock().unwrap();
        catalog.books.insert(
            id,
            Book {
                id,
                title: title.to_string(),
                author_id: 1,
                isbn: None,
                published_date: None,
                total_copies,
                available_copies: total_copies,
            },
        );
    }

    pub fn add_member(&self, id: i32, username: &str) {
        let mut catalog = self.catalog.lock().unwrap();
        catalog.members.insert(
            id,
            Member {
                id,
                username: username.to_string(),
                email: format!("{}@example.org", username),
                membership_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            },
        );
    }

    /// Records an existing active loan, taking a copy off the shelf
    pub fn seed_loan(&self, book_id: i32, member_id: i32, loan_date: NaiveDate, due_date: NaiveDate) -> Loan {
        let mut catalog = self.catalog.lock().unwrap();
        catalog.next_loan_id += 1;
        let loan = Loan {
            id: catalog.next_loan_id,
            book_id,
            member_id,
            loan_date,
            due_date,
            is_returned: false,
            return_date: None,
        };
        catalog.loans.insert(loan.id, loan.clone());
        let book = catalog.books.get_mut(&book_id).expect("seeded loan for unknown book");
        book.available_copies -= 1;
        loan
    }

    pub fn book(&self, id: i32) -> Book {
        self.catalog.lock().unwrap().books[&id].clone()
    }

    pub fn loan(&self, id: i32) -> Loan {
        self.catalog.lock().unwrap().loans[&id].clone()
    }

    pub fn active_loans(&self, book_id: i32) -> usize {
        self.catalog
            .lock()
            .unwrap()
            .loans
            .values()
            .filter(|l| l.book_id == book_id && l.is_active())
            .count()
    }
}

#[async_trait]
impl LoanStore for MemoryLoanStore {
    async fn checkout(&self, new_loan: NewLoan) -> AppResult<Loan> {
        let mut catalog = self.lock()?;

        let book = catalog
            .books
            .get(&new_loan.book_id)
            .ok_or(LoanError::BookNotFound(new_loan.book_id))?;
        book.ensure_lendable()?;

        if !catalog.members.contains_key(&new_loan.member_id) {
            return Err(LoanError::MemberNotFound(new_loan.member_id).into());
        }
        if catalog
            .loans
            .values()
            .any(|l| l.book_id == new_loan.book_id && l.member_id == new_loan.member_id && l.is_active())
        {
            return Err(LoanError::DuplicateActiveLoan.into());
        }

        catalog.next_loan_id += 1;
        let loan = Loan {
            id: catalog.next_loan_id,
            book_id: new_loan.book_id,
            member_id: new_loan.member_id,
            loan_date: new_loan.loan_date,
            due_date: new_loan.due_date,
            is_returned: false,
            return_date: None,
        };
        catalog.loans.insert(loan.id, loan.clone());
        if let Some(book) = catalog.books.get_mut(&new_loan.book_id) {
            book.available_copies -= 1;
        }
        Ok(loan)
    }

    async fn return_loan(&self, book_id: i32, member_id: i32, return_date: NaiveDate) -> AppResult<Loan> {
        let mut catalog = self.lock()?;

        let restocked = catalog
            .books
            .get(&book_id)
            .ok_or(LoanError::BookNotFound(book_id))?
            .copies_after_return();

        let loan_id = catalog
            .loans
            .values()
            .filter(|l| l.book_id == book_id && l.member_id == member_id && l.is_active())
            .max_by_key(|l| (l.loan_date, l.id))
            .map(|l| l.id)
            .ok_or(LoanError::NoActiveLoan)?;

        let loan = catalog.loans.get_mut(&loan_id).ok_or(LoanError::NoActiveLoan)?;
        loan.is_returned = true;
        loan.return_date = Some(return_date);
        let returned = loan.clone();

        if let Some(book) = catalog.books.get_mut(&book_id) {
            book.available_copies = restocked;
        }
        Ok(returned)
    }

    async fn extend_due_date(&self, loan_id: i32, raw_days: &Value, today: NaiveDate) -> AppResult<Loan> {
        let mut catalog = self.lock()?;
        let loan = catalog.loans.get_mut(&loan_id).ok_or(LoanError::LoanNotFound(loan_id))?;
        loan.due_date = loan.extension(raw_days, today)?;
        Ok(loan.clone())
    }

    async fn find_overdue(&self, today: NaiveDate) -> AppResult<Vec<Loan>> {
        let catalog = self.lock()?;
        Ok(catalog.loans.values().filter(|l| l.is_overdue(today)).cloned().collect())
    }

    async fn top_active_members(&self, limit: i64) -> AppResult<Vec<MemberActivity>> {
        let catalog = self.lock()?;
        let mut ranking: Vec<MemberActivity> = catalog
            .members
            .values()
            .map(|m| MemberActivity {
                id: m.id,
                username: m.username.clone(),
                email: m.email.clone(),
                active_loans: catalog
                    .loans
                    .values()
                    .filter(|l| l.member_id == m.id && l.is_active())
                    .count() as i64,
            })
            .filter(|m| m.active_loans > 0)
            .collect();
        ranking.sort_by(|a, b| b.active_loans.cmp(&a.active_loans).then(a.id.cmp(&b.id)));
        ranking.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(ranking)
    }

    async fn loan_notice(&self, loan_id: i32) -> AppResult<Option<LoanNotice>> {
        let catalog = self.lock()?;
        let Some(loan) = catalog.loans.get(&loan_id) else {
            return Ok(None);
        };
        let (Some(member), Some(book)) = (catalog.members.get(&loan.member_id), catalog.books.get(&loan.book_id))
        else {
            return Ok(None);
        };
        Ok(Some(LoanNotice {
            loan_id,
            username: member.username.clone(),
            email: member.email.clone(),
            book_title: book.title.clone(),
            loan_date: loan.loan_date,
            due_date: loan.due_date,
            is_returned: loan.is_returned,
            return_date: loan.return_date,
        }))
    }
}
