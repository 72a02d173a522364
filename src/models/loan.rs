//! Loan model, lifecycle rules and related types

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use crate::error::LoanError;

/// Loan model from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Loan {
    pub id: i32,
    pub book_id: i32,
    pub member_id: i32,
    pub loan_date: NaiveDate,
    pub due_date: NaiveDate,
    pub is_returned: bool,
    pub return_date: Option<NaiveDate>,
}

impl Loan {
    pub fn is_active(&self) -> bool {
        !self.is_returned
    }

    /// An active loan whose due date has passed
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.is_active() && self.due_date < today
    }

    /// Checks that the due date may still be pushed back
    pub fn ensure_extendable(&self, today: NaiveDate) -> Result<(), LoanError> {
        if self.is_returned {
            return Err(LoanError::LoanAlreadyReturned);
        }
        if self.due_date < today {
            return Err(LoanError::LoanAlreadyOverdue);
        }
        Ok(())
    }

    /// New due date for an extension request: the loan must be extendable first,
    /// then `raw_days` must be a valid day count
    pub fn extension(&self, raw_days: &Value, today: NaiveDate) -> Result<NaiveDate, LoanError> {
        self.ensure_extendable(today)?;
        let days = DayCount::parse(raw_days)?;
        self.extended_due_date(days)
    }

    pub fn extended_due_date(&self, days: DayCount) -> Result<NaiveDate, LoanError> {
        self.due_date
            .checked_add_days(Days::new(u64::from(days.get())))
            .ok_or_else(|| LoanError::InvalidDayCount(days.get().to_string()))
    }
}

/// Everything the store needs to record a checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewLoan {
    pub book_id: i32,
    pub member_id: i32,
    pub loan_date: NaiveDate,
    pub due_date: NaiveDate,
}

/// Strictly positive number of days
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DayCount(u32);

impl DayCount {
    pub fn new(days: u32) -> Result<Self, LoanError> {
        if days == 0 {
            return Err(LoanError::InvalidDayCount(days.to_string()));
        }
        Ok(Self(days))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Parses a day count sent as a JSON number or as a string of digits.
    ///
    /// Signs, decimals, whitespace and any other JSON type are rejected.
    pub fn parse(raw: &Value) -> Result<Self, LoanError> {
        let invalid = || LoanError::InvalidDayCount(raw.to_string());
        let digits = match raw {
            Value::Number(n) => n.as_u64().map(|n| n.to_string()).ok_or_else(invalid)?,
            Value::String(s) => s.clone(),
            _ => return Err(invalid()),
        };
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let days: u32 = digits.parse().map_err(|_| invalid())?;
        Self::new(days).map_err(|_| invalid())
    }
}

/// Loan listing filters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct LoanQuery {
    pub member_id: Option<i32>,
    pub book_id: Option<i32>,
    /// Only unreturned (true) or only returned (false) loans
    pub active: Option<bool>,
    /// Only loans that are active and past their due date
    pub overdue: Option<bool>,
}

/// Data needed to write a notification about one loan
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct LoanNotice {
    pub loan_id: i32,
    pub username: String,
    pub email: String,
    pub book_title: String,
    pub loan_date: NaiveDate,
    pub due_date: NaiveDate,
    pub is_returned: bool,
    pub return_date: Option<NaiveDate>,
}
