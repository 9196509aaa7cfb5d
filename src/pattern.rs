use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::errors::{Result, RollError};

/// A Joda-style timestamp pattern (`yyyy-MM-dd-HH-mm`) compiled to a chrono
/// format string. Suffixes are formatted and parsed in UTC.
#[derive(Debug, Clone)]
pub struct TimestampPattern {
    source: String,
    format: String,
    // Components the pattern leaves out, filled with fixed values when parsing
    // so that coarse patterns (daily, monthly) still resolve to a single instant.
    parse_padding: Vec<(&'static str, &'static str)>,
}

#[derive(Default)]
struct Components {
    year: bool,
    month: bool,
    day: bool,
    hour: bool,
    minute: bool,
}

impl TimestampPattern {
    pub fn compile(pattern: &str) -> Result<Self> {
        let invalid = |reason: String| RollError::InvalidTimestampPattern {
            pattern: pattern.to_string(),
            reason,
        };

        let chars: Vec<char> = pattern.chars().collect();
        let mut format = String::new();
        let mut seen = Components::default();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];

            if c == '\'' {
                // '' is an escaped quote, otherwise everything up to the next quote is literal
                if chars.get(i + 1) == Some(&'\'') {
                    format.push('\'');
                    i += 2;
                    continue;
                }
                let end = chars[i + 1..]
                    .iter()
                    .position(|&q| q == '\'')
                    .map(|p| i + 1 + p)
                    .ok_or_else(|| invalid("unterminated quoted literal".to_string()))?;
                for &lit in &chars[i + 1..end] {
                    push_literal(&mut format, lit);
                }
                i = end + 1;
                continue;
            }

            if !c.is_ascii_alphabetic() {
                push_literal(&mut format, c);
                i += 1;
                continue;
            }

            let run = chars[i..].iter().take_while(|&&n| n == c).count();
            let item = match (c, run) {
                ('y', 2) => {
                    seen.year = true;
                    "%y"
                }
                ('y', _) => {
                    seen.year = true;
                    "%Y"
                }
                ('M', 1) => {
                    seen.month = true;
                    "%-m"
                }
                ('M', 2) => {
                    seen.month = true;
                    "%m"
                }
                ('M', 3) => {
                    seen.month = true;
                    "%b"
                }
                ('M', _) => {
                    seen.month = true;
                    "%B"
                }
                ('d', 1) => {
                    seen.day = true;
                    "%-d"
                }
                ('d', 2) => {
                    seen.day = true;
                    "%d"
                }
                ('H', 1) => {
                    seen.hour = true;
                    "%-H"
                }
                ('H', 2) => {
                    seen.hour = true;
                    "%H"
                }
                ('m', 1) => {
                    seen.minute = true;
                    "%-M"
                }
                ('m', 2) => {
                    seen.minute = true;
                    "%M"
                }
                ('s', 1) => "%-S",
                ('s', 2) => "%S",
                ('S', 3) => "%3f",
                ('E', 1..=3) => "%a",
                ('E', _) => "%A",
                _ => {
                    return Err(invalid(format!(
                        "unsupported pattern field '{}'",
                        c.to_string().repeat(run)
                    )))
                }
            };
            format.push_str(item);
            i += run;
        }

        if !seen.year {
            return Err(invalid("pattern must contain a year field".to_string()));
        }

        let mut parse_padding = Vec::new();
        if !seen.month {
            parse_padding.push(("%m", "01"));
        }
        if !seen.day {
            parse_padding.push(("%d", "01"));
        }
        if !seen.hour {
            parse_padding.push(("%H", "00"));
        }
        if !seen.minute {
            parse_padding.push(("%M", "00"));
        }

        Ok(Self {
            source: pattern.to_string(),
            format,
            parse_padding,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn format(&self, at: DateTime<Utc>) -> String {
        at.format(&self.format).to_string()
    }

    /// Parses an index suffix into epoch milliseconds. `None` if it does not match.
    pub fn parse_millis(&self, suffix: &str) -> Option<i64> {
        let mut input = suffix.to_string();
        let mut format = self.format.clone();
        for (item, value) in &self.parse_padding {
            input.push('|');
            input.push_str(value);
            format.push('|');
            format.push_str(item);
        }
        NaiveDateTime::parse_from_str(&input, &format)
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive).timestamp_millis())
    }
}

fn push_literal(format: &mut String, c: char) {
    if c == '%' {
        format.push_str("%%");
    } else {
        format.push(c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_default_pattern_formats_and_parses() {
        let pattern = TimestampPattern::compile("yyyy-MM-dd-HH-mm").unwrap();
        let now = at(2020, 1, 2, 3, 4);
        assert_eq!(pattern.format(now), "2020-01-02-03-04");
        assert_eq!(pattern.parse_millis("2020-01-02-03-04"), Some(now.timestamp_millis()));
    }

    #[test]
    fn test_rejects_non_matching_suffix() {
        let pattern = TimestampPattern::compile("yyyy-MM-dd-HH-mm").unwrap();
        assert_eq!(pattern.parse_millis("old"), None);
        assert_eq!(pattern.parse_millis("2020-01-02"), None);
        assert_eq!(pattern.parse_millis("2020-01-02-03-04-extra"), None);
        assert_eq!(pattern.parse_millis("2020-13-02-03-04"), None);
    }

    #[test]
    fn test_daily_pattern_parses_to_midnight() {
        let pattern = TimestampPattern::compile("yyyy.MM.dd").unwrap();
        assert_eq!(pattern.format(at(2021, 6, 30, 23, 59)), "2021.06.30");
        assert_eq!(
            pattern.parse_millis("2021.06.30"),
            Some(at(2021, 6, 30, 0, 0).timestamp_millis())
        );
    }

    #[test]
    fn test_quoted_literals() {
        let pattern = TimestampPattern::compile("yyyyMMdd'T'HHmm").unwrap();
        let now = at(2022, 2, 3, 4, 5);
        assert_eq!(pattern.format(now), "20220203T0405");
        assert_eq!(pattern.parse_millis("20220203T0405"), Some(now.timestamp_millis()));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(matches!(
            TimestampPattern::compile("MM-dd"),
            Err(RollError::InvalidTimestampPattern { .. })
        ));
        assert!(TimestampPattern::compile("yyyy-QQ").is_err());
        assert!(TimestampPattern::compile("yyyy-'open").is_err());
    }
}
