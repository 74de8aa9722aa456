//! Persistence seam. Every mutation that carries a precondition (open a day,
//! close a day, add an IP) is a single conditional write so that racing
//! requests cannot both observe the old state.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::Conflict;
use crate::model::{
    attendance::{AttendanceRecord, AttendanceStatus},
    role::Role,
    shift_policy::ShiftPolicy,
    user::{User, UserStatus},
};

pub mod memory;
pub mod mysql;

pub use memory::MemoryStore;
pub use mysql::MySqlStore;

#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    Conflict(Conflict),
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub designation: String,
    pub department: String,
    pub mobile: Option<String>,
    pub allowed_ips: Vec<String>,
    pub daily_wage: f64,
    pub created_at: DateTime<Utc>,
}

impl NewUser {
    pub fn into_user(self) -> User {
        User {
            id: self.id,
            display_name: self.display_name,
            email: self.email,
            password_hash: self.password_hash,
            role: self.role,
            designation: self.designation,
            department: self.department,
            mobile: self.mobile,
            allowed_ips: self.allowed_ips,
            status: UserStatus::Active,
            daily_wage: self.daily_wage,
            created_at: self.created_at,
        }
    }
}

/// Fields left as `None` are not touched.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub role: Option<Role>,
    pub designation: Option<String>,
    pub department: Option<String>,
    pub mobile: Option<String>,
    pub allowed_ips: Option<Vec<String>>,
    pub status: Option<UserStatus>,
    pub daily_wage: Option<f64>,
}

impl UserPatch {
    pub fn apply(self, user: &mut User) {
        if let Some(v) = self.display_name {
            user.display_name = v;
        }
        if let Some(v) = self.email {
            user.email = v;
        }
        if let Some(v) = self.password_hash {
            user.password_hash = v;
        }
        if let Some(v) = self.role {
            user.role = v;
        }
        if let Some(v) = self.designation {
            user.designation = v;
        }
        if let Some(v) = self.department {
            user.department = v;
        }
        if let Some(v) = self.mobile {
            user.mobile = Some(v);
        }
        if let Some(v) = self.allowed_ips {
            user.allowed_ips = v;
        }
        if let Some(v) = self.status {
            user.status = v;
        }
        if let Some(v) = self.daily_wage {
            user.daily_wage = v;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    /// Case-insensitive substring of id, name, email or designation.
    pub search: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub limit: u32,
    pub offset: u32,
}

impl UserQuery {
    pub fn matches(&self, user: &User) -> bool {
        if self.role.is_some_and(|r| r != user.role) {
            return false;
        }
        if self.status.is_some_and(|s| s != user.status) {
            return false;
        }
        match &self.search {
            Some(term) => {
                let term = term.to_lowercase();
                [&user.id, &user.display_name, &user.email, &user.designation]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&term))
            }
            None => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserPage {
    pub users: Vec<User>,
    pub total: u64,
}

/// Values written when an open record is closed.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutUpdate {
    pub check_out: DateTime<Utc>,
    pub worked_hours: f64,
    pub status: AttendanceStatus,
    pub loss_of_pay: f64,
}

#[async_trait]
pub trait Store: Send + Sync {
    // users
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError>;
    async fn list_users(&self, query: &UserQuery) -> Result<UserPage, StoreError>;
    async fn active_users(&self, role: Role) -> Result<Vec<User>, StoreError>;
    async fn update_user(&self, id: &str, patch: UserPatch) -> Result<Option<User>, StoreError>;

    // global allowlist, in insertion order
    async fn global_allowlist(&self) -> Result<Vec<String>, StoreError>;
    /// Inserts `ip` unless present and returns the resulting list.
    async fn add_global_ip(&self, ip: &str) -> Result<Vec<String>, StoreError>;

    // shift policy singleton; the default policy until one is saved
    async fn shift_policy(&self) -> Result<ShiftPolicy, StoreError>;
    async fn save_shift_policy(&self, policy: &ShiftPolicy) -> Result<(), StoreError>;

    // attendance
    /// Fails with `Conflict::DuplicateCheckIn` if any record exists for the same user and date.
    async fn insert_open_record(&self, record: &AttendanceRecord) -> Result<(), StoreError>;
    async fn find_record(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError>;
    /// Returns `false` when there was no open record to close.
    async fn close_record(
        &self,
        user_id: &str,
        date: NaiveDate,
        update: &CheckOutUpdate,
    ) -> Result<bool, StoreError>;
    /// Returns `false` when a record for the user and date already exists.
    async fn insert_absent_if_missing(&self, record: &AttendanceRecord) -> Result<bool, StoreError>;
    async fn records_on(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError>;
    /// Inclusive date range, oldest first.
    async fn records_for_user(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError>;
    /// Most recent first.
    async fn recent_records(&self, limit: u32) -> Result<Vec<AttendanceRecord>, StoreError>;
    /// Records still open on a day before `before`, oldest first.
    async fn open_records_before(&self, before: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError>;

    // reconciliation bookkeeping
    async fn is_day_reconciled(&self, date: NaiveDate) -> Result<bool, StoreError>;
    async fn mark_day_reconciled(&self, date: NaiveDate, at: DateTime<Utc>) -> Result<(), StoreError>;

    // token deny-list
    async fn revoke_token(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<(), StoreError>;
    async fn revoked_tokens(&self, now: DateTime<Utc>) -> Result<Vec<(String, DateTime<Utc>)>, StoreError>;

    // password reset
    async fn insert_reset_token(
        &self,
        token: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    /// Marks the token used and returns its user if it was unused and unexpired.
    async fn consume_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, StoreError>;

    /// Deletes deny-list entries and reset tokens expired at `now`; returns how many.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}
