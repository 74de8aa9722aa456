use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(
    example = json!({
        "userId": "EMP-001",
        "date": "2026-01-05",
        "checkIn": "2026-01-05T09:02:11Z",
        "checkOut": "2026-01-05T17:30:00Z",
        "workedHours": 8.46,
        "status": "present",
        "lossOfPay": 0.0
    })
)]
pub struct AttendanceRecord {
    pub user_id: String,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    /// Absent for records materialised by reconciliation.
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_in: Option<DateTime<Utc>>,
    /// `None` while the session is open.
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_out: Option<DateTime<Utc>>,
    pub worked_hours: f64,
    pub status: AttendanceStatus,
    pub loss_of_pay: f64,
}

impl AttendanceRecord {
    pub fn is_open(&self) -> bool {
        self.check_in.is_some() && self.check_out.is_none()
    }
}

/// Totals over a set of records; always recomputed from the records themselves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceTotals {
    pub total_hours: f64,
    pub late_count: u32,
    pub loss_of_pay: f64,
    pub present_days: u32,
    pub absent_days: u32,
}

impl AttendanceTotals {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a AttendanceRecord>) -> Self {
        let mut totals = Self::default();
        for record in records {
            totals.total_hours += record.worked_hours;
            totals.loss_of_pay += record.loss_of_pay;
            match record.status {
                AttendanceStatus::Late => {
                    totals.late_count += 1;
                    totals.present_days += 1;
                }
                AttendanceStatus::Present => totals.present_days += 1,
                AttendanceStatus::Absent => totals.absent_days += 1,
            }
        }
        totals.total_hours = round2(totals.total_hours);
        totals.loss_of_pay = round2(totals.loss_of_pay);
        totals
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: AttendanceStatus, hours: f64, lop: f64) -> AttendanceRecord {
        AttendanceRecord {
            user_id: "EMP-001".into(),
            date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            check_in: None,
            check_out: None,
            worked_hours: hours,
            status,
            loss_of_pay: lop,
        }
    }

    #[test]
    fn totals_count_late_days_as_attended() {
        let records = vec![
            record(AttendanceStatus::Present, 8.0, 0.0),
            record(AttendanceStatus::Late, 7.5, 75.0),
            record(AttendanceStatus::Absent, 0.0, 1200.0),
        ];
        let totals = AttendanceTotals::from_records(&records);
        assert_eq!(totals.total_hours, 15.5);
        assert_eq!(totals.late_count, 1);
        assert_eq!(totals.present_days, 2);
        assert_eq!(totals.absent_days, 1);
        assert_eq!(totals.loss_of_pay, 1275.0);
    }

    #[test]
    fn empty_month_has_zero_totals() {
        assert_eq!(AttendanceTotals::from_records(&Vec::<AttendanceRecord>::new()), AttendanceTotals::default());
    }
}
