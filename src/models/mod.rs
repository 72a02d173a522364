//! Data models for Libris

pub mod author;
pub mod book;
pub mod loan;
pub mod member;

// Re-export commonly used types
pub use author::Author;
pub use book::{Book, BookDetails};
pub use loan::{DayCount, Loan, LoanNotice, NewLoan};
pub use member::{Member, MemberActivity};
