use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShiftPolicy {
    #[schema(example = "09:00:00", value_type = String, format = "time")]
    pub start_time: NaiveTime,
    #[schema(example = 15)]
    pub grace_minutes: u32,
    #[schema(example = 8.0)]
    pub expected_hours: f64,
    #[schema(example = json!(["Mon", "Tue", "Wed", "Thu", "Fri"]), value_type = Vec<String>)]
    pub workdays: Vec<Weekday>,
}

impl Default for ShiftPolicy {
    fn default() -> Self {
        Self {
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            grace_minutes: 15,
            expected_hours: 8.0,
            workdays: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
        }
    }
}

impl ShiftPolicy {
    pub fn is_workday(&self, day: Weekday) -> bool {
        self.workdays.contains(&day)
    }

    /// Latest local instant of `day` that still counts as on time. May fall
    /// on the next calendar day when the grace runs past midnight.
    pub fn late_after(&self, day: NaiveDate) -> NaiveDateTime {
        day.and_time(self.start_time) + chrono::Duration::minutes(self.grace_minutes as i64)
    }

    /// Workdays encoded for storage, e.g. `Mon,Tue,Wed`.
    pub fn workdays_csv(&self) -> String {
        self.workdays
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn parse_workdays(csv: &str) -> Vec<Weekday> {
        csv.split(',')
            .filter_map(|d| d.trim().parse::<Weekday>().ok())
            .collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.expected_hours > 0.0 && self.expected_hours <= 24.0) {
            return Err("expectedHours must be within (0, 24]".to_string());
        }
        if self.grace_minutes > 24 * 60 {
            return Err("graceMinutes must not exceed a day".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grace_extends_start_time() {
        let policy = ShiftPolicy::default();
        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert_eq!(policy.late_after(day), day.and_hms_opt(9, 15, 0).unwrap());
    }

    #[test]
    fn grace_may_cross_midnight() {
        let policy = ShiftPolicy {
            start_time: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
            grace_minutes: 120,
            ..ShiftPolicy::default()
        };
        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let next = day.succ_opt().unwrap();
        assert_eq!(policy.late_after(day), next.and_hms_opt(1, 0, 0).unwrap());
    }

    #[test]
    fn workdays_survive_csv_encoding() {
        let policy = ShiftPolicy::default();
        assert_eq!(policy.workdays_csv(), "Mon,Tue,Wed,Thu,Fri");
        assert_eq!(ShiftPolicy::parse_workdays(&policy.workdays_csv()), policy.workdays);
        assert!(!policy.is_workday(Weekday::Sat));
    }

    #[test]
    fn rejects_zero_expected_hours() {
        let policy = ShiftPolicy {
            expected_hours: 0.0,
            ..ShiftPolicy::default()
        };
        assert!(policy.validate().is_err());
    }
}
