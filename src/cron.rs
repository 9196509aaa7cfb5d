use chrono::{DateTime, Datelike, Duration, DurationRound, Timelike, Utc};

/// Parsed 5-field cron schedule: `minute hour day-of-month month day-of-week`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    pub minutes: Vec<u32>,
    pub hours: Vec<u32>,
    pub days_of_month: Vec<u32>,
    pub months: Vec<u32>,
    pub days_of_week: Vec<u32>,
}

impl std::str::FromStr for CronSchedule {
    type Err = String;

    fn from_str(expr: &str) -> Result<Self, String> {
        parse_cron(expr)
    }
}

pub fn parse_cron(expr: &str) -> Result<CronSchedule, String> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(format!("Expected 5 fields, got {}", fields.len()));
    }
    Ok(CronSchedule {
        minutes: parse_field(fields[0], 0, 59)?,
        hours: parse_field(fields[1], 0, 23)?,
        days_of_month: parse_field(fields[2], 1, 31)?,
        months: parse_field(fields[3], 1, 12)?,
        days_of_week: parse_field(fields[4], 0, 6)?,
    })
}

/// One field: `*`, `*/N`, `N`, `N-M`, `N-M/S`, `N/S` and comma lists of those.
fn parse_field(field: &str, min: u32, max: u32) -> Result<Vec<u32>, String> {
    let mut values = Vec::new();
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step.parse().map_err(|_| format!("Invalid step: {}", step))?;
                if step == 0 {
                    return Err("Step cannot be zero".into());
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (lo, hi) = if range == "*" {
            (min, max)
        } else if let Some((lo, hi)) = range.split_once('-') {
            let lo = parse_value(lo, min, max)?;
            let hi = parse_value(hi, min, max)?;
            if lo > hi {
                return Err(format!("Range {}-{} is reversed", lo, hi));
            }
            (lo, hi)
        } else {
            let v = parse_value(range, min, max)?;
            // "5/15" means starting at 5 through the end of the range
            if step.is_some() {
                (v, max)
            } else {
                (v, v)
            }
        };

        values.extend((lo..=hi).step_by(step.unwrap_or(1) as usize));
    }
    values.sort_unstable();
    values.dedup();
    if values.is_empty() {
        return Err("Empty field".into());
    }
    Ok(values)
}

fn parse_value(s: &str, min: u32, max: u32) -> Result<u32, String> {
    let v: u32 = s.parse().map_err(|_| format!("Invalid value: {}", s))?;
    if v < min || v > max {
        return Err(format!("Value {} out of range {}-{}", v, min, max));
    }
    Ok(v)
}

impl CronSchedule {
    fn matches_day(&self, dt: &DateTime<Utc>) -> bool {
        self.months.contains(&dt.month())
            && self.days_of_month.contains(&dt.day())
            && self.days_of_week.contains(&dt.weekday().num_days_from_sunday())
    }

    /// The first matching minute strictly after `from`, searching up to four
    /// years ahead (`0 0 30 2 *` never fires).
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut current = from.duration_trunc(Duration::minutes(1)).ok()? + Duration::minutes(1);
        let horizon = from + Duration::days(4 * 366);

        while current <= horizon {
            if !self.matches_day(&current) {
                current = current.duration_trunc(Duration::days(1)).ok()? + Duration::days(1);
                continue;
            }
            if !self.hours.contains(&current.hour()) {
                current = current.duration_trunc(Duration::hours(1)).ok()? + Duration::hours(1);
                continue;
            }
            if self.minutes.contains(&current.minute()) {
                return Some(current);
            }
            current += Duration::minutes(1);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_parse_star_and_steps() {
        let s = parse_cron("*/15 * * * *").unwrap();
        assert_eq!(s.minutes, vec![0, 15, 30, 45]);
        assert_eq!(s.hours.len(), 24);
        assert_eq!(s.days_of_week.len(), 7);
    }

    #[test]
    fn test_parse_lists_and_ranges() {
        let s = parse_cron("0 1-3,12 1 */3 1-5/2").unwrap();
        assert_eq!(s.hours, vec![1, 2, 3, 12]);
        assert_eq!(s.months, vec![1, 4, 7, 10]);
        assert_eq!(s.days_of_week, vec![1, 3, 5]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_cron("* * * *").is_err());
        assert!(parse_cron("60 * * * *").is_err());
        assert!(parse_cron("*/0 * * * *").is_err());
        assert!(parse_cron("5-1 * * * *").is_err());
        assert!("0 0 * * x".parse::<CronSchedule>().is_err());
    }

    #[test]
    fn test_next_after_daily() {
        let s = parse_cron("30 2 * * *").unwrap();
        assert_eq!(s.next_after(at(2024, 3, 10, 1, 0)), Some(at(2024, 3, 10, 2, 30)));
        assert_eq!(s.next_after(at(2024, 3, 10, 2, 30)), Some(at(2024, 3, 11, 2, 30)));
    }

    #[test]
    fn test_next_after_every_minute_is_strictly_later() {
        let s = parse_cron("* * * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 10, 5, 42).unwrap();
        assert_eq!(s.next_after(from), Some(at(2024, 1, 1, 10, 6)));
    }

    #[test]
    fn test_next_after_weekday_and_month() {
        // 2024-06-01 is a Saturday; first Monday in June is the 3rd
        let s = parse_cron("0 9 * 6 1").unwrap();
        assert_eq!(s.next_after(at(2024, 5, 20, 0, 0)), Some(at(2024, 6, 3, 9, 0)));
    }

    #[test]
    fn test_impossible_date_never_fires() {
        let s = parse_cron("0 0 30 2 *").unwrap();
        assert_eq!(s.next_after(at(2024, 1, 1, 0, 0)), None);
    }
}
