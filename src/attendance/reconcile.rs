use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc};
use tracing::{debug, error, info, warn};

use super::engine::loss_of_pay;
use crate::error::AppError;
use crate::model::attendance::{AttendanceRecord, AttendanceStatus};
use crate::model::role::Role;
use crate::store::{CheckOutUpdate, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayOutcome {
    /// Absent records were written (possibly zero) and the day is marked done.
    Reconciled { inserted: usize },
    AlreadyDone,
    NotAWorkday,
}

/// Materialises `absent` records for past workdays nobody checked in on.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn Store>,
    offset: FixedOffset,
    lookback_days: u32,
}

impl Reconciler {
    pub fn new(store: Arc<dyn Store>, offset: FixedOffset, lookback_days: u32) -> Self {
        Self {
            store,
            offset,
            lookback_days,
        }
    }

    fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    pub fn yesterday(&self, now: DateTime<Utc>) -> Option<NaiveDate> {
        self.today(now).pred_opt()
    }

    pub async fn reconcile_day(
        &self,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<DayOutcome, AppError> {
        if date >= self.today(now) {
            return Err(AppError::validation("Only past days can be reconciled"));
        }
        if self.store.is_day_reconciled(date).await? {
            return Ok(DayOutcome::AlreadyDone);
        }

        let policy = self.store.shift_policy().await?;
        if !policy.is_workday(date.weekday()) {
            self.store.mark_day_reconciled(date, now).await?;
            return Ok(DayOutcome::NotAWorkday);
        }

        let employees = self.store.active_users(Role::Employee).await?;
        let mut inserted = 0;
        let mut failed = 0;
        for user in employees {
            if user.created_at.with_timezone(&self.offset).date_naive() > date {
                continue;
            }
            let absent = AttendanceRecord {
                user_id: user.id.clone(),
                date,
                check_in: None,
                check_out: None,
                worked_hours: 0.0,
                status: AttendanceStatus::Absent,
                loss_of_pay: user.daily_wage,
            };
            match self.store.insert_absent_if_missing(&absent).await {
                Ok(true) => inserted += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(user_id = %user.id, %date, error = ?e, "Failed to record absence");
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            return Err(AppError::Internal);
        }
        self.store.mark_day_reconciled(date, now).await?;
        info!(%date, inserted, "Day reconciled");
        Ok(DayOutcome::Reconciled { inserted })
    }

    /// Walks the lookback window oldest first. Failed days stay unmarked and
    /// are picked up again by the next run.
    pub async fn run_pending(&self, now: DateTime<Utc>) -> usize {
        let today = self.today(now);
        let mut reconciled = 0;
        for back in (1..=self.lookback_days as u64).rev() {
            let Some(date) = today.checked_sub_days(chrono::Days::new(back)) else {
                continue;
            };
            match self.reconcile_day(date, now).await {
                Ok(DayOutcome::Reconciled { .. }) => reconciled += 1,
                Ok(outcome) => debug!(%date, ?outcome, "Skipped"),
                Err(e) => error!(%date, error = %e, "Reconciliation failed, retrying next run"),
            }
        }
        reconciled
    }

    /// Closes sessions that can no longer be checked out, i.e. opened before
    /// yesterday, as zero hours worked with the full day's pay lost.
    pub async fn close_stale_sessions(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let Some(cutoff) = self.yesterday(now) else {
            return Ok(0);
        };
        let stale = self.store.open_records_before(cutoff).await?;
        if stale.is_empty() {
            return Ok(0);
        }
        let policy = self.store.shift_policy().await?;

        let mut closed = 0;
        for record in stale {
            let Some(check_in) = record.check_in else {
                continue;
            };
            let wage = self
                .store
                .find_user(&record.user_id)
                .await?
                .map(|u| u.daily_wage)
                .unwrap_or(0.0);
            let update = CheckOutUpdate {
                check_out: check_in,
                worked_hours: 0.0,
                status: record.status,
                loss_of_pay: loss_of_pay(wage, policy.expected_hours, 0.0),
            };
            if self.store.close_record(&record.user_id, record.date, &update).await? {
                warn!(
                    user_id = %record.user_id,
                    date = %record.date,
                    loss_of_pay = update.loss_of_pay,
                    "Session never checked out, closed"
                );
                closed += 1;
            }
        }
        Ok(closed)
    }

    /// One scheduled pass: stale sessions, pending days, expired tokens.
    pub async fn tick(&self, now: DateTime<Utc>) {
        match self.close_stale_sessions(now).await {
            Ok(0) => {}
            Ok(closed) => info!(closed, "Stale sessions closed"),
            Err(e) => error!(error = %e, "Closing stale sessions failed"),
        }
        let done = self.run_pending(now).await;
        debug!(days = done, "Reconciliation pass finished");
        match self.store.purge_expired(now).await {
            Ok(purged) => debug!(purged, "Expired tokens purged"),
            Err(e) => error!(error = ?e, "Purging expired tokens failed"),
        }
    }

    pub fn spawn_schedule(self, period: Duration) {
        actix_web::rt::spawn(async move {
            let mut ticker = actix_web::rt::time::interval(period);
            loop {
                ticker.tick().await;
                self.tick(Utc::now()).await;
            }
        });
    }
}
