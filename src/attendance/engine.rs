use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use tracing::{debug, info, warn};

use crate::access::{Admission, gate::Action};
use crate::error::{AppError, Conflict};
use crate::model::attendance::{AttendanceRecord, AttendanceStatus, AttendanceTotals, round2};
use crate::model::role::Role;
use crate::model::shift_policy::ShiftPolicy;
use crate::models::{DashboardStats, MonthlyAttendance};
use crate::store::{CheckOutUpdate, Store};

/// Where a user stands for one local day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoSession,
    CheckedIn,
    CheckedOut,
}

impl SessionState {
    pub fn of(record: Option<&AttendanceRecord>) -> Self {
        match record {
            None => SessionState::NoSession,
            Some(record) if record.is_open() => SessionState::CheckedIn,
            Some(_) => SessionState::CheckedOut,
        }
    }
}

/// Open sessions of the previous local day can still be closed, for at most
/// this long after check-in.
pub const OVERNIGHT_SESSION_HOURS: i64 = 24;

pub fn is_late(policy: &ShiftPolicy, local_check_in: NaiveDateTime) -> bool {
    local_check_in > policy.late_after(local_check_in.date())
}

/// Hours between the two instants, never negative, to two decimals.
pub fn worked_hours(check_in: DateTime<Utc>, check_out: DateTime<Utc>) -> f64 {
    let seconds = (check_out - check_in).num_seconds().max(0) as f64;
    round2(seconds / 3600.0)
}

/// Deduction proportional to the shortfall against the expected hours.
pub fn loss_of_pay(daily_wage: f64, expected_hours: f64, worked: f64) -> f64 {
    if expected_hours <= 0.0 || worked >= expected_hours {
        return 0.0;
    }
    round2(daily_wage * (expected_hours - worked) / expected_hours)
}

/// First and last day of a month.
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next.pred_opt()?))
}

/// Parses `YYYY-MM`.
pub fn parse_month(raw: &str) -> Result<(i32, u32), AppError> {
    let invalid = || AppError::validation(format!("Invalid month `{}`, expected YYYY-MM", raw));
    let (year, month) = raw.trim().split_once('-').ok_or_else(invalid)?;
    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    month_bounds(year, month).ok_or_else(invalid)?;
    Ok((year, month))
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("Invalid date `{}`, expected YYYY-MM-DD", raw)))
}

/// Per user and local day: `NoSession -> CheckedIn -> CheckedOut`.
#[derive(Clone)]
pub struct AttendanceEngine {
    store: Arc<dyn Store>,
    offset: FixedOffset,
}

impl AttendanceEngine {
    pub fn new(store: Arc<dyn Store>, offset: FixedOffset) -> Self {
        Self { store, offset }
    }

    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    pub async fn state(&self, user_id: &str, date: NaiveDate) -> Result<SessionState, AppError> {
        let record = self.store.find_record(user_id, date).await?;
        Ok(SessionState::of(record.as_ref()))
    }

    /// Opens the day for the admitted user. The insert itself is the
    /// `NoSession` check, so of two racing calls exactly one succeeds.
    pub async fn check_in(
        &self,
        admission: &Admission,
        now: DateTime<Utc>,
    ) -> Result<AttendanceRecord, AppError> {
        if admission.action() != Action::CheckIn {
            return Err(AppError::Unauthorized);
        }
        let user = admission.user();
        let policy = self.store.shift_policy().await?;
        let local = now.with_timezone(&self.offset);

        let status = if is_late(&policy, local.naive_local()) {
            AttendanceStatus::Late
        } else {
            AttendanceStatus::Present
        };

        let record = AttendanceRecord {
            user_id: user.id.clone(),
            date: local.date_naive(),
            check_in: Some(now),
            check_out: None,
            worked_hours: 0.0,
            status,
            loss_of_pay: 0.0,
        };

        match self.store.insert_open_record(&record).await {
            Ok(()) => {
                info!(user_id = %user.id, date = %record.date, status = %status, "Checked in");
                Ok(record)
            }
            Err(e) => {
                let err = AppError::from(e);
                if err == AppError::Conflict(Conflict::DuplicateCheckIn) {
                    debug!(user_id = %user.id, date = %record.date, "Duplicate check-in");
                }
                Err(err)
            }
        }
    }

    /// Closes the open record of the current local day, or of the previous
    /// one when today has no record and the session started less than
    /// `OVERNIGHT_SESSION_HOURS` ago.
    pub async fn check_out(
        &self,
        admission: &Admission,
        now: DateTime<Utc>,
    ) -> Result<AttendanceRecord, AppError> {
        if admission.action() != Action::CheckOut {
            return Err(AppError::Unauthorized);
        }
        let user = admission.user();
        let today = self.local_date(now);

        let open = match self.store.find_record(&user.id, today).await? {
            Some(record) => Some(record),
            None => match today.pred_opt() {
                Some(prev) => self.store.find_record(&user.id, prev).await?.filter(|r| {
                    r.check_in.is_some_and(|t| {
                        now - t <= chrono::Duration::hours(OVERNIGHT_SESSION_HOURS)
                    })
                }),
                None => None,
            },
        };
        let open = match open {
            Some(record) if SessionState::of(Some(&record)) == SessionState::CheckedIn => record,
            _ => return Err(AppError::Conflict(Conflict::NoOpenSession)),
        };
        let date = open.date;
        let check_in = open.check_in.ok_or(AppError::Conflict(Conflict::NoOpenSession))?;

        let policy = self.store.shift_policy().await?;
        let worked = worked_hours(check_in, now);
        let update = CheckOutUpdate {
            check_out: now,
            worked_hours: worked,
            // lateness was decided at check-in
            status: open.status,
            loss_of_pay: loss_of_pay(user.daily_wage, policy.expected_hours, worked),
        };

        if !self.store.close_record(&user.id, date, &update).await? {
            warn!(user_id = %user.id, %date, "Record closed concurrently");
            return Err(AppError::Conflict(Conflict::NoOpenSession));
        }

        info!(
            user_id = %user.id,
            %date,
            worked_hours = worked,
            loss_of_pay = update.loss_of_pay,
            "Checked out"
        );

        Ok(AttendanceRecord {
            check_out: Some(update.check_out),
            worked_hours: update.worked_hours,
            status: update.status,
            loss_of_pay: update.loss_of_pay,
            ..open
        })
    }

    pub async fn report(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, AppError> {
        Ok(self.store.records_on(date).await?)
    }

    pub async fn recent(&self, limit: Option<u32>) -> Result<Vec<AttendanceRecord>, AppError> {
        let limit = limit.unwrap_or(10).clamp(1, 100);
        Ok(self.store.recent_records(limit).await?)
    }

    /// Head counts for one day over active employees. Anyone without a
    /// present or late record counts as absent, reconciled or not.
    pub async fn day_stats(&self, date: NaiveDate) -> Result<DashboardStats, AppError> {
        let employees = self.store.active_users(Role::Employee).await?;
        let ids: HashSet<&str> = employees.iter().map(|u| u.id.as_str()).collect();
        let records = self.store.records_on(date).await?;

        let (mut present, mut late) = (0u32, 0u32);
        for record in records.iter().filter(|r| ids.contains(r.user_id.as_str())) {
            match record.status {
                AttendanceStatus::Present => present += 1,
                AttendanceStatus::Late => late += 1,
                AttendanceStatus::Absent => {}
            }
        }
        let total = employees.len() as u32;

        Ok(DashboardStats {
            date: date.to_string(),
            total_employees: total,
            present,
            late,
            absent: total.saturating_sub(present + late),
        })
    }

    /// Records of one month with totals derived from them on every call.
    pub async fn month(
        &self,
        user_id: &str,
        year: i32,
        month: u32,
    ) -> Result<MonthlyAttendance, AppError> {
        let (from, to) = month_bounds(year, month)
            .ok_or_else(|| AppError::validation("Invalid month"))?;
        let records = self.store.records_for_user(user_id, from, to).await?;
        let totals = AttendanceTotals::from_records(&records);
        Ok(MonthlyAttendance {
            month: format!("{:04}-{:02}", year, month),
            records,
            totals,
        })
    }

    /// `month=YYYY-MM` or the current local month.
    pub fn resolve_month(&self, raw: Option<&str>, now: DateTime<Utc>) -> Result<(i32, u32), AppError> {
        match raw {
            Some(raw) => parse_month(raw),
            None => {
                let today = self.local_date(now);
                Ok((today.year(), today.month()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::user::{User, UserStatus};
    use crate::store::{MemoryStore, NewUser};
    use chrono::TimeZone;

    fn user(daily_wage: f64) -> User {
        User {
            id: "EMP-001".into(),
            display_name: "John".into(),
            email: "john@example.com".into(),
            password_hash: String::new(),
            role: Role::Employee,
            designation: "Engineer".into(),
            department: "General".into(),
            mobile: None,
            allowed_ips: vec!["10.0.0.5".into()],
            status: UserStatus::Active,
            daily_wage,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn engine() -> (AttendanceEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let offset = FixedOffset::east_opt(0).unwrap();
        (AttendanceEngine::new(store.clone(), offset), store)
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, h, m, 0).unwrap()
    }

    fn admit(action: Action) -> Admission {
        Admission::granted(user(800.0), action)
    }

    fn local(d: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap().and_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn lateness_respects_grace_period() {
        let policy = ShiftPolicy::default();
        assert!(!is_late(&policy, local(5, 9, 15, 0)));
        assert!(is_late(&policy, local(5, 9, 15, 1)));
        assert!(!is_late(&policy, local(5, 7, 0, 0)));
    }

    #[test]
    fn grace_running_past_midnight_is_not_late() {
        let policy = ShiftPolicy {
            start_time: chrono::NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
            grace_minutes: 120,
            ..ShiftPolicy::default()
        };
        assert!(!is_late(&policy, local(5, 23, 30, 0)));
        assert!(!is_late(&policy, local(5, 22, 0, 0)));
        assert!(!is_late(&policy, local(6, 0, 30, 0)));
    }

    #[actix_web::test]
    async fn late_start_with_long_grace_checks_in_on_time() {
        let (engine, store) = engine();
        store
            .save_shift_policy(&ShiftPolicy {
                start_time: chrono::NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
                grace_minutes: 120,
                ..ShiftPolicy::default()
            })
            .await
            .unwrap();
        let record = engine.check_in(&admit(Action::CheckIn), at(23, 30)).await.unwrap();
        assert_eq!(record.status, AttendanceStatus::Present);
    }

    #[test]
    fn loss_of_pay_is_proportional_to_shortfall() {
        assert_eq!(loss_of_pay(800.0, 8.0, 8.0), 0.0);
        assert_eq!(loss_of_pay(800.0, 8.0, 9.5), 0.0);
        assert_eq!(loss_of_pay(800.0, 8.0, 6.0), 200.0);
        assert_eq!(loss_of_pay(800.0, 8.0, 0.0), 800.0);
    }

    #[test]
    fn worked_hours_never_negative() {
        assert_eq!(worked_hours(at(9, 0), at(17, 30)), 8.5);
        assert_eq!(worked_hours(at(17, 0), at(9, 0)), 0.0);
    }

    #[test]
    fn month_helpers() {
        let (from, to) = month_bounds(2024, 2).unwrap();
        assert_eq!(to, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(from.day(), 1);
        assert_eq!(month_bounds(2026, 12).unwrap().1.day(), 31);
        assert_eq!(parse_month("2026-03").unwrap(), (2026, 3));
        assert!(parse_month("2026-13").is_err());
        assert!(parse_month("March").is_err());
        assert!(parse_date("2026-02-30").is_err());
    }

    #[actix_web::test]
    async fn full_day_round_trip() {
        let (engine, _) = engine();
        let opened = engine.check_in(&admit(Action::CheckIn), at(9, 5)).await.unwrap();
        assert_eq!(opened.status, AttendanceStatus::Present);
        assert!(opened.is_open());
        assert_eq!(
            engine.state("EMP-001", opened.date).await.unwrap(),
            SessionState::CheckedIn
        );

        let closed = engine.check_out(&admit(Action::CheckOut), at(17, 35)).await.unwrap();
        assert_eq!(closed.worked_hours, 8.5);
        assert_eq!(closed.status, AttendanceStatus::Present);
        assert_eq!(closed.loss_of_pay, 0.0);
        assert_eq!(
            engine.state("EMP-001", opened.date).await.unwrap(),
            SessionState::CheckedOut
        );
    }

    #[actix_web::test]
    async fn late_arrival_stays_late_and_short_day_costs_pay() {
        let (engine, _) = engine();
        let opened = engine.check_in(&admit(Action::CheckIn), at(10, 0)).await.unwrap();
        assert_eq!(opened.status, AttendanceStatus::Late);
        let closed = engine.check_out(&admit(Action::CheckOut), at(16, 0)).await.unwrap();
        assert_eq!(closed.status, AttendanceStatus::Late);
        assert_eq!(closed.worked_hours, 6.0);
        assert_eq!(closed.loss_of_pay, 200.0);
    }

    #[actix_web::test]
    async fn second_check_in_is_a_duplicate() {
        let (engine, _) = engine();
        engine.check_in(&admit(Action::CheckIn), at(9, 0)).await.unwrap();
        let err = engine.check_in(&admit(Action::CheckIn), at(9, 1)).await.unwrap_err();
        assert_eq!(err, AppError::Conflict(Conflict::DuplicateCheckIn));

        engine.check_out(&admit(Action::CheckOut), at(17, 0)).await.unwrap();
        let err = engine.check_in(&admit(Action::CheckIn), at(18, 0)).await.unwrap_err();
        assert_eq!(err, AppError::Conflict(Conflict::DuplicateCheckIn));
    }

    #[actix_web::test]
    async fn check_out_needs_an_open_session() {
        let (engine, _) = engine();
        let err = engine.check_out(&admit(Action::CheckOut), at(17, 0)).await.unwrap_err();
        assert_eq!(err, AppError::Conflict(Conflict::NoOpenSession));

        engine.check_in(&admit(Action::CheckIn), at(9, 0)).await.unwrap();
        engine.check_out(&admit(Action::CheckOut), at(17, 0)).await.unwrap();
        let err = engine.check_out(&admit(Action::CheckOut), at(18, 0)).await.unwrap_err();
        assert_eq!(err, AppError::Conflict(Conflict::NoOpenSession));
    }

    #[actix_web::test]
    async fn session_crossing_midnight_closes_on_the_next_day() {
        let (engine, _) = engine();
        let opened = engine.check_in(&admit(Action::CheckIn), at(22, 0)).await.unwrap();
        let after_midnight = Utc.with_ymd_and_hms(2026, 1, 6, 0, 30, 0).unwrap();
        let closed = engine
            .check_out(&admit(Action::CheckOut), after_midnight)
            .await
            .unwrap();
        assert_eq!(closed.date, opened.date);
        assert_eq!(closed.worked_hours, 2.5);
        assert_eq!(closed.loss_of_pay, 550.0);

        let month = engine.month("EMP-001", 2026, 1).await.unwrap();
        assert_eq!(month.totals.total_hours, 2.5);
        assert_eq!(month.totals.loss_of_pay, 550.0);
    }

    #[actix_web::test]
    async fn previous_day_session_is_bounded() {
        let (engine, _) = engine();
        engine.check_in(&admit(Action::CheckIn), at(9, 0)).await.unwrap();
        let next_day_late = Utc.with_ymd_and_hms(2026, 1, 6, 9, 30, 0).unwrap();
        let err = engine
            .check_out(&admit(Action::CheckOut), next_day_late)
            .await
            .unwrap_err();
        assert_eq!(err, AppError::Conflict(Conflict::NoOpenSession));
    }

    #[actix_web::test]
    async fn todays_record_shadows_yesterdays_open_session() {
        let (engine, store) = engine();
        engine.check_in(&admit(Action::CheckIn), at(20, 0)).await.unwrap();
        let next = |h, m| Utc.with_ymd_and_hms(2026, 1, 6, h, m, 0).unwrap();
        engine.check_in(&admit(Action::CheckIn), next(9, 0)).await.unwrap();
        engine.check_out(&admit(Action::CheckOut), next(10, 0)).await.unwrap();

        let err = engine
            .check_out(&admit(Action::CheckOut), next(11, 0))
            .await
            .unwrap_err();
        assert_eq!(err, AppError::Conflict(Conflict::NoOpenSession));
        assert!(store
            .find_record("EMP-001", at(20, 0).date_naive())
            .await
            .unwrap()
            .unwrap()
            .is_open());
    }

    #[actix_web::test]
    async fn admission_for_another_action_is_refused() {
        let (engine, store) = engine();
        let err = engine.check_in(&admit(Action::CheckOut), at(9, 0)).await.unwrap_err();
        assert_eq!(err, AppError::Unauthorized);
        assert!(store.records_on(at(9, 0).date_naive()).await.unwrap().is_empty());
    }

    #[test]
    fn concurrent_check_ins_yield_exactly_one_success() {
        let (engine, _) = engine();
        let results: Vec<Result<AttendanceRecord, AppError>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let engine = engine.clone();
                    s.spawn(move || {
                        futures::executor::block_on(
                            engine.check_in(&admit(Action::CheckIn), at(9, i)),
                        )
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| *e == AppError::Conflict(Conflict::DuplicateCheckIn)));
    }

    #[actix_web::test]
    async fn local_day_follows_the_configured_offset() {
        let store = Arc::new(MemoryStore::new());
        let offset = FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap();
        let engine = AttendanceEngine::new(store, offset);
        // 20:00 UTC on the 4th is 01:30 on the 5th in UTC+05:30
        let instant = Utc.with_ymd_and_hms(2026, 1, 4, 20, 0, 0).unwrap();
        assert_eq!(engine.local_date(instant), NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
        let record = engine.check_in(&admit(Action::CheckIn), instant).await.unwrap();
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
        assert_eq!(record.status, AttendanceStatus::Present);
    }

    #[actix_web::test]
    async fn monthly_totals_are_recomputed_from_records() {
        let (engine, store) = engine();
        engine.check_in(&admit(Action::CheckIn), at(10, 0)).await.unwrap();
        engine.check_out(&admit(Action::CheckOut), at(16, 0)).await.unwrap();
        store
            .insert_absent_if_missing(&AttendanceRecord {
                user_id: "EMP-001".into(),
                date: NaiveDate::from_ymd_opt(2026, 1, 6).unwrap(),
                check_in: None,
                check_out: None,
                worked_hours: 0.0,
                status: AttendanceStatus::Absent,
                loss_of_pay: 800.0,
            })
            .await
            .unwrap();

        let month = engine.month("EMP-001", 2026, 1).await.unwrap();
        assert_eq!(month.month, "2026-01");
        assert_eq!(month.records.len(), 2);
        assert_eq!(month.totals.total_hours, 6.0);
        assert_eq!(month.totals.late_count, 1);
        assert_eq!(month.totals.loss_of_pay, 1000.0);
        assert_eq!(month.totals.absent_days, 1);

        assert!(engine.month("EMP-001", 2026, 2).await.unwrap().records.is_empty());
    }

    #[actix_web::test]
    async fn day_stats_count_missing_employees_as_absent() {
        let (engine, store) = engine();
        for id in ["EMP-001", "EMP-002", "EMP-003"] {
            let u = user(800.0);
            store
                .insert_user(NewUser {
                    id: id.into(),
                    display_name: u.display_name,
                    email: format!("{}@example.com", id.to_lowercase()),
                    password_hash: u.password_hash,
                    role: Role::Employee,
                    designation: u.designation,
                    department: u.department,
                    mobile: None,
                    allowed_ips: u.allowed_ips,
                    daily_wage: u.daily_wage,
                    created_at: u.created_at,
                })
                .await
                .unwrap();
        }
        engine.check_in(&admit(Action::CheckIn), at(10, 0)).await.unwrap();

        let stats = engine.day_stats(at(10, 0).date_naive()).await.unwrap();
        assert_eq!(stats.date, "2026-01-05");
        assert_eq!(stats.total_employees, 3);
        assert_eq!((stats.present, stats.late, stats.absent), (0, 1, 2));
    }

    #[actix_web::test]
    async fn recent_limit_is_clamped() {
        let (engine, _) = engine();
        engine.check_in(&admit(Action::CheckIn), at(9, 0)).await.unwrap();
        assert_eq!(engine.recent(Some(0)).await.unwrap().len(), 1);
        assert_eq!(engine.recent(None).await.unwrap().len(), 1);
    }
}
