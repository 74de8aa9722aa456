use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::{CheckOutUpdate, NewUser, Store, StoreError, UserPage, UserPatch, UserQuery};
use crate::error::Conflict;
use crate::model::{
    attendance::AttendanceRecord, role::Role, shift_policy::ShiftPolicy, user::User,
};

#[derive(Default)]
struct Inner {
    users: HashMap<String, User>,
    allowlist: Vec<String>,
    policy: Option<ShiftPolicy>,
    attendance: BTreeMap<(String, NaiveDate), AttendanceRecord>,
    reconciled: BTreeSet<NaiveDate>,
    revoked: HashMap<String, DateTime<Utc>>,
    resets: HashMap<String, ResetEntry>,
    #[cfg(test)]
    failing_user: Option<String>,
}

struct ResetEntry {
    user_id: String,
    expires_at: DateTime<Utc>,
    used: bool,
}

/// Process-local store. Each call holds the lock for its whole body, which
/// makes every conditional write atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }

    /// Makes absent-record inserts for `user_id` fail, to exercise partial failures.
    #[cfg(test)]
    pub fn fail_absent_inserts_for(&self, user_id: Option<&str>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing_user = user_id.map(str::to_string);
        }
    }
}

fn email_taken(inner: &Inner, email: &str, except: Option<&str>) -> bool {
    inner
        .users
        .values()
        .any(|u| u.email.eq_ignore_ascii_case(email) && Some(u.id.as_str()) != except)
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut inner = self.lock()?;
        if inner.users.contains_key(&user.id) {
            return Err(StoreError::Conflict(Conflict::UserIdTaken));
        }
        if email_taken(&inner, &user.email, None) {
            return Err(StoreError::Conflict(Conflict::EmailTaken));
        }
        let user = user.into_user();
        inner.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.users.get(id).cloned())
    }

    async fn list_users(&self, query: &UserQuery) -> Result<UserPage, StoreError> {
        let inner = self.lock()?;
        let mut matching: Vec<&User> = inner.users.values().filter(|u| query.matches(u)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        let total = matching.len() as u64;
        let users = matching
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .cloned()
            .collect();
        Ok(UserPage { users, total })
    }

    async fn active_users(&self, role: Role) -> Result<Vec<User>, StoreError> {
        let inner = self.lock()?;
        let mut users: Vec<User> = inner
            .users
            .values()
            .filter(|u| u.role == role && u.is_active())
            .cloned()
            .collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }

    async fn update_user(&self, id: &str, patch: UserPatch) -> Result<Option<User>, StoreError> {
        let mut inner = self.lock()?;
        if let Some(email) = &patch.email {
            if email_taken(&inner, email, Some(id)) {
                return Err(StoreError::Conflict(Conflict::EmailTaken));
            }
        }
        Ok(inner.users.get_mut(id).map(|user| {
            patch.apply(user);
            user.clone()
        }))
    }

    async fn global_allowlist(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock()?.allowlist.clone())
    }

    async fn add_global_ip(&self, ip: &str) -> Result<Vec<String>, StoreError> {
        let mut inner = self.lock()?;
        if !inner.allowlist.iter().any(|existing| existing == ip) {
            inner.allowlist.push(ip.to_string());
        }
        Ok(inner.allowlist.clone())
    }

    async fn shift_policy(&self) -> Result<ShiftPolicy, StoreError> {
        Ok(self.lock()?.policy.clone().unwrap_or_default())
    }

    async fn save_shift_policy(&self, policy: &ShiftPolicy) -> Result<(), StoreError> {
        self.lock()?.policy = Some(policy.clone());
        Ok(())
    }

    async fn insert_open_record(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let key = (record.user_id.clone(), record.date);
        if inner.attendance.contains_key(&key) {
            return Err(StoreError::Conflict(Conflict::DuplicateCheckIn));
        }
        inner.attendance.insert(key, record.clone());
        Ok(())
    }

    async fn find_record(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(self
            .lock()?
            .attendance
            .get(&(user_id.to_string(), date))
            .cloned())
    }

    async fn close_record(
        &self,
        user_id: &str,
        date: NaiveDate,
        update: &CheckOutUpdate,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        match inner.attendance.get_mut(&(user_id.to_string(), date)) {
            Some(record) if record.is_open() => {
                record.check_out = Some(update.check_out);
                record.worked_hours = update.worked_hours;
                record.status = update.status;
                record.loss_of_pay = update.loss_of_pay;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_absent_if_missing(&self, record: &AttendanceRecord) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        #[cfg(test)]
        {
            if inner.failing_user.as_deref() == Some(record.user_id.as_str()) {
                return Err(StoreError::Backend("injected failure".to_string()));
            }
        }
        let key = (record.user_id.clone(), record.date);
        if inner.attendance.contains_key(&key) {
            return Ok(false);
        }
        inner.attendance.insert(key, record.clone());
        Ok(true)
    }

    async fn records_on(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError> {
        Ok(self
            .lock()?
            .attendance
            .values()
            .filter(|r| r.date == date)
            .cloned()
            .collect())
    }

    async fn records_for_user(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let inner = self.lock()?;
        let range = (user_id.to_string(), from)..=(user_id.to_string(), to);
        Ok(inner.attendance.range(range).map(|(_, r)| r.clone()).collect())
    }

    async fn recent_records(&self, limit: u32) -> Result<Vec<AttendanceRecord>, StoreError> {
        let inner = self.lock()?;
        let mut records: Vec<&AttendanceRecord> = inner.attendance.values().collect();
        records.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.check_in.cmp(&a.check_in)));
        Ok(records
            .into_iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn open_records_before(
        &self,
        before: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let inner = self.lock()?;
        let mut records: Vec<AttendanceRecord> = inner
            .attendance
            .values()
            .filter(|r| r.date < before && r.is_open())
            .cloned()
            .collect();
        records.sort_by_key(|r| r.date);
        Ok(records)
    }

    async fn is_day_reconciled(&self, date: NaiveDate) -> Result<bool, StoreError> {
        Ok(self.lock()?.reconciled.contains(&date))
    }

    async fn mark_day_reconciled(&self, date: NaiveDate, _at: DateTime<Utc>) -> Result<(), StoreError> {
        self.lock()?.reconciled.insert(date);
        Ok(())
    }

    async fn revoke_token(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.lock()?.revoked.insert(jti.to_string(), expires_at);
        Ok(())
    }

    async fn revoked_tokens(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, DateTime<Utc>)>, StoreError> {
        Ok(self
            .lock()?
            .revoked
            .iter()
            .filter(|(_, exp)| **exp > now)
            .map(|(jti, exp)| (jti.clone(), *exp))
            .collect())
    }

    async fn insert_reset_token(
        &self,
        token: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.lock()?.resets.insert(
            token.to_string(),
            ResetEntry {
                user_id: user_id.to_string(),
                expires_at,
                used: false,
            },
        );
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, StoreError> {
        let mut inner = self.lock()?;
        match inner.resets.get_mut(token) {
            Some(entry) if !entry.used && entry.expires_at > now => {
                entry.used = true;
                Ok(Some(entry.user_id.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut inner = self.lock()?;
        let before = inner.revoked.len() + inner.resets.len();
        inner.revoked.retain(|_, exp| *exp > now);
        inner.resets.retain(|_, entry| entry.expires_at > now);
        Ok((before - inner.revoked.len() - inner.resets.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attendance::AttendanceStatus;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn open(user: &str, date: NaiveDate) -> AttendanceRecord {
        AttendanceRecord {
            user_id: user.to_string(),
            date,
            check_in: date.and_hms_opt(9, 0, 0).map(|t| t.and_utc()),
            check_out: None,
            worked_hours: 0.0,
            status: AttendanceStatus::Present,
            loss_of_pay: 0.0,
        }
    }

    #[actix_web::test]
    async fn allowlist_keeps_insertion_order_without_duplicates() {
        let store = MemoryStore::new();
        store.add_global_ip("10.0.0.2").await.unwrap();
        store.add_global_ip("10.0.0.1").await.unwrap();
        let list = store.add_global_ip("10.0.0.2").await.unwrap();
        assert_eq!(list, vec!["10.0.0.2", "10.0.0.1"]);
    }

    #[actix_web::test]
    async fn second_open_record_for_same_day_conflicts() {
        let store = MemoryStore::new();
        store.insert_open_record(&open("EMP-1", day(2))).await.unwrap();
        let err = store.insert_open_record(&open("EMP-1", day(2))).await.unwrap_err();
        assert_eq!(err, StoreError::Conflict(Conflict::DuplicateCheckIn));
        store.insert_open_record(&open("EMP-1", day(3))).await.unwrap();
    }

    #[actix_web::test]
    async fn close_only_applies_to_open_records() {
        let store = MemoryStore::new();
        let update = CheckOutUpdate {
            check_out: day(2).and_hms_opt(17, 0, 0).unwrap().and_utc(),
            worked_hours: 8.0,
            status: AttendanceStatus::Present,
            loss_of_pay: 0.0,
        };
        assert!(!store.close_record("EMP-1", day(2), &update).await.unwrap());
        store.insert_open_record(&open("EMP-1", day(2))).await.unwrap();
        assert!(store.close_record("EMP-1", day(2), &update).await.unwrap());
        assert!(!store.close_record("EMP-1", day(2), &update).await.unwrap());
    }

    #[actix_web::test]
    async fn records_for_user_stays_within_range() {
        let store = MemoryStore::new();
        for d in [1, 2, 3] {
            store.insert_open_record(&open("EMP-1", day(d))).await.unwrap();
        }
        store.insert_open_record(&open("EMP-2", day(2))).await.unwrap();
        let records = store.records_for_user("EMP-1", day(2), day(3)).await.unwrap();
        assert_eq!(records.iter().map(|r| r.date).collect::<Vec<_>>(), vec![day(2), day(3)]);
    }

    #[actix_web::test]
    async fn reset_tokens_are_single_use() {
        let store = MemoryStore::new();
        let now = day(2).and_hms_opt(9, 0, 0).unwrap().and_utc();
        store
            .insert_reset_token("tok", "EMP-1", now + chrono::Duration::minutes(30))
            .await
            .unwrap();
        assert_eq!(store.consume_reset_token("tok", now).await.unwrap().as_deref(), Some("EMP-1"));
        assert_eq!(store.consume_reset_token("tok", now).await.unwrap(), None);
    }

    #[actix_web::test]
    async fn purge_drops_only_expired_entries() {
        let store = MemoryStore::new();
        let now = day(2).and_hms_opt(9, 0, 0).unwrap().and_utc();
        let hour = chrono::Duration::hours(1);
        store.revoke_token("old", now - hour).await.unwrap();
        store.revoke_token("live", now + hour).await.unwrap();
        store.insert_reset_token("stale", "EMP-1", now).await.unwrap();
        store.insert_reset_token("fresh", "EMP-1", now + hour).await.unwrap();

        assert_eq!(store.purge_expired(now).await.unwrap(), 2);
        assert_eq!(store.purge_expired(now).await.unwrap(), 0);
        let revoked = store.revoked_tokens(now - hour * 2).await.unwrap();
        assert_eq!(revoked.len(), 1);
        assert_eq!(revoked[0].0, "live");
        assert_eq!(store.consume_reset_token("fresh", now).await.unwrap().as_deref(), Some("EMP-1"));
    }

    #[actix_web::test]
    async fn open_records_before_skips_closed_and_current() {
        let store = MemoryStore::new();
        let update = CheckOutUpdate {
            check_out: day(1).and_hms_opt(17, 0, 0).unwrap().and_utc(),
            worked_hours: 8.0,
            status: AttendanceStatus::Present,
            loss_of_pay: 0.0,
        };
        for d in [1, 2, 3] {
            store.insert_open_record(&open("EMP-1", day(d))).await.unwrap();
        }
        store.close_record("EMP-1", day(1), &update).await.unwrap();
        let open = store.open_records_before(day(3)).await.unwrap();
        assert_eq!(open.iter().map(|r| r.date).collect::<Vec<_>>(), vec![day(2)]);
    }
}
