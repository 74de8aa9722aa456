use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::{FromRow, MySql, MySqlPool, Transaction};
use tracing::debug;

use super::{CheckOutUpdate, NewUser, Store, StoreError, UserPage, UserPatch, UserQuery};
use crate::error::Conflict;
use crate::model::{
    attendance::{AttendanceRecord, AttendanceStatus},
    role::Role,
    shift_policy::ShiftPolicy,
    user::{User, UserStatus},
};

const USER_COLUMNS: &str = "id, display_name, email, password_hash, role, designation, department, mobile, status, daily_wage, created_at";
const ATTENDANCE_COLUMNS: &str =
    "user_id, date, check_in, check_out, worked_hours, status, loss_of_pay";

#[derive(FromRow)]
struct UserRow {
    id: String,
    display_name: String,
    email: String,
    password_hash: String,
    role: String,
    designation: String,
    department: String,
    mobile: Option<String>,
    status: String,
    daily_wage: f64,
    created_at: NaiveDateTime,
}

impl UserRow {
    fn into_user(self, allowed_ips: Vec<String>) -> Result<User, StoreError> {
        let role = Role::from_str(&self.role)
            .map_err(|_| StoreError::Backend(format!("unknown role `{}`", self.role)))?;
        let status = UserStatus::from_str(&self.status)
            .map_err(|_| StoreError::Backend(format!("unknown user status `{}`", self.status)))?;
        Ok(User {
            id: self.id,
            display_name: self.display_name,
            email: self.email,
            password_hash: self.password_hash,
            role,
            designation: self.designation,
            department: self.department,
            mobile: self.mobile,
            allowed_ips,
            status,
            daily_wage: self.daily_wage,
            created_at: self.created_at.and_utc(),
        })
    }
}

#[derive(FromRow)]
struct AttendanceRow {
    user_id: String,
    date: NaiveDate,
    check_in: Option<NaiveDateTime>,
    check_out: Option<NaiveDateTime>,
    worked_hours: f64,
    status: String,
    loss_of_pay: f64,
}

impl TryFrom<AttendanceRow> for AttendanceRecord {
    type Error = StoreError;

    fn try_from(row: AttendanceRow) -> Result<Self, Self::Error> {
        let status = AttendanceStatus::from_str(&row.status).map_err(|_| {
            StoreError::Backend(format!("unknown attendance status `{}`", row.status))
        })?;
        Ok(AttendanceRecord {
            user_id: row.user_id,
            date: row.date,
            check_in: row.check_in.map(|t| t.and_utc()),
            check_out: row.check_out.map(|t| t.and_utc()),
            worked_hours: row.worked_hours,
            status,
            loss_of_pay: row.loss_of_pay,
        })
    }
}

#[derive(FromRow)]
struct PolicyRow {
    start_time: NaiveTime,
    grace_minutes: u32,
    expected_hours: f64,
    workdays: String,
}

/// Returns the server message when `e` is a duplicate-key violation.
fn duplicate_key(e: &sqlx::Error) -> Option<String> {
    if let sqlx::Error::Database(db_err) = e {
        if db_err.code().as_deref() == Some("23000") {
            return Some(db_err.message().to_string());
        }
    }
    None
}

/// Escapes `LIKE` wildcards so a search term only matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn rows_into_records(rows: Vec<AttendanceRow>) -> Result<Vec<AttendanceRecord>, StoreError> {
    rows.into_iter().map(AttendanceRecord::try_from).collect()
}

pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn allowed_ips_for(&self, ids: &[String]) -> Result<HashMap<String, Vec<String>>, StoreError> {
        let mut by_user: HashMap<String, Vec<String>> = HashMap::new();
        if ids.is_empty() {
            return Ok(by_user);
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT user_id, ip FROM user_allowed_ips WHERE user_id IN ({}) ORDER BY user_id, position",
            placeholders
        );
        let mut query = sqlx::query_as::<_, (String, String)>(&sql);
        for id in ids {
            query = query.bind(id);
        }
        for (user_id, ip) in query.fetch_all(&self.pool).await? {
            by_user.entry(user_id).or_default().push(ip);
        }
        Ok(by_user)
    }

    async fn attach_ips(&self, rows: Vec<UserRow>) -> Result<Vec<User>, StoreError> {
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let mut ips = self.allowed_ips_for(&ids).await?;
        rows.into_iter()
            .map(|row| {
                let allowed = ips.remove(&row.id).unwrap_or_default();
                row.into_user(allowed)
            })
            .collect()
    }

    async fn replace_allowed_ips(
        tx: &mut Transaction<'_, MySql>,
        user_id: &str,
        ips: &[String],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM user_allowed_ips WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut **tx)
            .await?;
        for (position, ip) in ips.iter().enumerate() {
            sqlx::query("INSERT INTO user_allowed_ips (user_id, position, ip) VALUES (?, ?, ?)")
                .bind(user_id)
                .bind(position as i32)
                .bind(ip)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MySqlStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO users
            (id, display_name, email, password_hash, role, designation, department, mobile, status, daily_wage, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.display_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_ref())
        .bind(&user.designation)
        .bind(&user.department)
        .bind(&user.mobile)
        .bind(UserStatus::Active.as_ref())
        .bind(user.daily_wage)
        .bind(user.created_at.naive_utc())
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            return Err(match duplicate_key(&e) {
                Some(msg) if msg.contains("uq_users_email") => StoreError::Conflict(Conflict::EmailTaken),
                Some(_) => StoreError::Conflict(Conflict::UserIdTaken),
                None => e.into(),
            });
        }

        Self::replace_allowed_ips(&mut tx, &user.id, &user.allowed_ips).await?;
        tx.commit().await?;

        debug!(user_id = %user.id, "User inserted");
        Ok(user.into_user())
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(self.attach_ips(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_users(&self, query: &UserQuery) -> Result<UserPage, StoreError> {
        let mut conditions = Vec::new();
        let mut bindings: Vec<String> = Vec::new();

        if let Some(role) = query.role {
            conditions.push("role = ?");
            bindings.push(role.to_string());
        }

        if let Some(status) = query.status {
            conditions.push("status = ?");
            bindings.push(status.to_string());
        }

        if let Some(search) = &query.search {
            conditions.push("(id LIKE ? OR display_name LIKE ? OR email LIKE ? OR designation LIKE ?)");
            let like = format!("%{}%", escape_like(search));
            for _ in 0..4 {
                bindings.push(like.clone());
            }
        }

        let where_clause = if conditions.is_empty() {
            "".to_string()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM users {}", where_clause);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for b in &bindings {
            count_query = count_query.bind(b);
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let data_sql = format!(
            "SELECT {} FROM users {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            USER_COLUMNS, where_clause
        );
        debug!(sql = %data_sql, bindings = ?bindings, "Fetching users");

        let mut data_query = sqlx::query_as::<_, UserRow>(&data_sql);
        for b in &bindings {
            data_query = data_query.bind(b);
        }
        let rows = data_query
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(UserPage {
            users: self.attach_ips(rows).await?,
            total: total.max(0) as u64,
        })
    }

    async fn active_users(&self, role: Role) -> Result<Vec<User>, StoreError> {
        let sql = format!(
            "SELECT {} FROM users WHERE role = ? AND status = ? ORDER BY id",
            USER_COLUMNS
        );
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(role.as_ref())
            .bind(UserStatus::Active.as_ref())
            .fetch_all(&self.pool)
            .await?;
        self.attach_ips(rows).await
    }

    async fn update_user(&self, id: &str, patch: UserPatch) -> Result<Option<User>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {} FROM users WHERE id = ? FOR UPDATE", USER_COLUMNS);
        let row = match sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        {
            Some(row) => row,
            None => return Ok(None),
        };

        let current_ips: Vec<String> = sqlx::query_scalar(
            "SELECT ip FROM user_allowed_ips WHERE user_id = ? ORDER BY position",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let mut user = row.into_user(current_ips)?;
        let replaces_ips = patch.allowed_ips.is_some();
        patch.apply(&mut user);

        let updated = sqlx::query(
            r#"
            UPDATE users
            SET display_name = ?, email = ?, password_hash = ?, role = ?, designation = ?,
                department = ?, mobile = ?, status = ?, daily_wage = ?
            WHERE id = ?
            "#,
        )
        .bind(&user.display_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_ref())
        .bind(&user.designation)
        .bind(&user.department)
        .bind(&user.mobile)
        .bind(user.status.as_ref())
        .bind(user.daily_wage)
        .bind(id)
        .execute(&mut *tx)
        .await;

        if let Err(e) = updated {
            return Err(match duplicate_key(&e) {
                Some(_) => StoreError::Conflict(Conflict::EmailTaken),
                None => e.into(),
            });
        }

        if replaces_ips {
            Self::replace_allowed_ips(&mut tx, id, &user.allowed_ips).await?;
        }
        tx.commit().await?;
        Ok(Some(user))
    }

    async fn global_allowlist(&self) -> Result<Vec<String>, StoreError> {
        Ok(sqlx::query_scalar("SELECT ip FROM global_allowlist ORDER BY seq")
            .fetch_all(&self.pool)
            .await?)
    }

    async fn add_global_ip(&self, ip: &str) -> Result<Vec<String>, StoreError> {
        sqlx::query("INSERT IGNORE INTO global_allowlist (ip) VALUES (?)")
            .bind(ip)
            .execute(&self.pool)
            .await?;
        self.global_allowlist().await
    }

    async fn shift_policy(&self) -> Result<ShiftPolicy, StoreError> {
        let row = sqlx::query_as::<_, PolicyRow>(
            "SELECT start_time, grace_minutes, expected_hours, workdays FROM shift_policy WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(row) => ShiftPolicy {
                start_time: row.start_time,
                grace_minutes: row.grace_minutes,
                expected_hours: row.expected_hours,
                workdays: ShiftPolicy::parse_workdays(&row.workdays),
            },
            None => ShiftPolicy::default(),
        })
    }

    async fn save_shift_policy(&self, policy: &ShiftPolicy) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO shift_policy (id, start_time, grace_minutes, expected_hours, workdays)
            VALUES (1, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                start_time = VALUES(start_time),
                grace_minutes = VALUES(grace_minutes),
                expected_hours = VALUES(expected_hours),
                workdays = VALUES(workdays)
            "#,
        )
        .bind(policy.start_time)
        .bind(policy.grace_minutes)
        .bind(policy.expected_hours)
        .bind(policy.workdays_csv())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_open_record(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance (user_id, date, check_in, worked_hours, status, loss_of_pay)
            VALUES (?, ?, ?, 0, ?, 0)
            "#,
        )
        .bind(&record.user_id)
        .bind(record.date)
        .bind(record.check_in.map(|t| t.naive_utc()))
        .bind(record.status.as_ref())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if duplicate_key(&e).is_some() => {
                Err(StoreError::Conflict(Conflict::DuplicateCheckIn))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_record(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let sql = format!(
            "SELECT {} FROM attendance WHERE user_id = ? AND date = ?",
            ATTENDANCE_COLUMNS
        );
        sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(user_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?
            .map(AttendanceRecord::try_from)
            .transpose()
    }

    async fn close_record(
        &self,
        user_id: &str,
        date: NaiveDate,
        update: &CheckOutUpdate,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE attendance
            SET check_out = ?, worked_hours = ?, status = ?, loss_of_pay = ?
            WHERE user_id = ?
            AND date = ?
            AND check_in IS NOT NULL
            AND check_out IS NULL
            "#,
        )
        .bind(update.check_out.naive_utc())
        .bind(update.worked_hours)
        .bind(update.status.as_ref())
        .bind(update.loss_of_pay)
        .bind(user_id)
        .bind(date)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_absent_if_missing(&self, record: &AttendanceRecord) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT IGNORE INTO attendance (user_id, date, check_in, check_out, worked_hours, status, loss_of_pay)
            VALUES (?, ?, NULL, NULL, 0, ?, ?)
            "#,
        )
        .bind(&record.user_id)
        .bind(record.date)
        .bind(record.status.as_ref())
        .bind(record.loss_of_pay)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn records_on(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError> {
        let sql = format!(
            "SELECT {} FROM attendance WHERE date = ? ORDER BY user_id",
            ATTENDANCE_COLUMNS
        );
        let rows = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(date)
            .fetch_all(&self.pool)
            .await?;
        rows_into_records(rows)
    }

    async fn records_for_user(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let sql = format!(
            "SELECT {} FROM attendance WHERE user_id = ? AND date BETWEEN ? AND ? ORDER BY date",
            ATTENDANCE_COLUMNS
        );
        let rows = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(user_id)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;
        rows_into_records(rows)
    }

    async fn recent_records(&self, limit: u32) -> Result<Vec<AttendanceRecord>, StoreError> {
        let sql = format!(
            "SELECT {} FROM attendance ORDER BY date DESC, check_in DESC LIMIT ?",
            ATTENDANCE_COLUMNS
        );
        let rows = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows_into_records(rows)
    }

    async fn open_records_before(
        &self,
        before: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let sql = format!(
            "SELECT {} FROM attendance WHERE date < ? AND check_in IS NOT NULL AND check_out IS NULL ORDER BY date, user_id",
            ATTENDANCE_COLUMNS
        );
        let rows = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(before)
            .fetch_all(&self.pool)
            .await?;
        rows_into_records(rows)
    }

    async fn is_day_reconciled(&self, date: NaiveDate) -> Result<bool, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM reconciled_days WHERE day = ?")
            .bind(date)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn mark_day_reconciled(&self, date: NaiveDate, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("INSERT IGNORE INTO reconciled_days (day, completed_at) VALUES (?, ?)")
            .bind(date)
            .bind(at.naive_utc())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn revoke_token(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("INSERT IGNORE INTO revoked_tokens (jti, expires_at) VALUES (?, ?)")
            .bind(jti)
            .bind(expires_at.naive_utc())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn revoked_tokens(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, DateTime<Utc>)>, StoreError> {
        let rows = sqlx::query_as::<_, (String, NaiveDateTime)>(
            "SELECT jti, expires_at FROM revoked_tokens WHERE expires_at > ?",
        )
        .bind(now.naive_utc())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(jti, exp)| (jti, exp.and_utc())).collect())
    }

    async fn insert_reset_token(
        &self,
        token: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO password_resets (token, user_id, expires_at) VALUES (?, ?, ?)")
            .bind(token)
            .bind(user_id)
            .bind(expires_at.naive_utc())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let user_id: Option<String> = sqlx::query_scalar(
            r#"
            SELECT user_id FROM password_resets
            WHERE token = ? AND used = FALSE AND expires_at > ?
            FOR UPDATE
            "#,
        )
        .bind(token)
        .bind(now.naive_utc())
        .fetch_optional(&mut *tx)
        .await?;

        if user_id.is_some() {
            sqlx::query("UPDATE password_resets SET used = TRUE WHERE token = ?")
                .bind(token)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(user_id)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let revoked = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at <= ?")
            .bind(now.naive_utc())
            .execute(&self.pool)
            .await?;
        let resets = sqlx::query("DELETE FROM password_resets WHERE expires_at <= ?")
            .bind(now.naive_utc())
            .execute(&self.pool)
            .await?;
        Ok(revoked.rows_affected() + resets.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
        assert_eq!(escape_like("jane"), "jane");
    }
}
