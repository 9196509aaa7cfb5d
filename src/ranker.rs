use std::collections::BTreeMap;

use crate::errors::{Result, RollError};
use crate::model::Generation;
use crate::pattern::TimestampPattern;

/// Ordering key of a generation.
///
/// Every `Synthetic` key sorts below every `Parsed` key, so indices whose
/// suffix cannot be parsed always rank as the oldest of the series and are
/// the first to expire. Synthetic keys are handed out in lexical order of the
/// index name, which keeps malformed names ordered among themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RankKey {
    Synthetic(u64),
    Parsed(i64),
}

/// Orders the indices currently holding the roll alias, most recent first.
///
/// Fails with `DuplicateGenerationTime` when two names resolve to the same
/// timestamp; nothing may be mutated in that case.
pub fn rank<I, S>(indices: I, pattern: &TimestampPattern) -> Result<Vec<Generation>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut names: Vec<String> = indices.into_iter().map(Into::into).collect();
    names.sort();
    names.dedup();

    let mut sorted: BTreeMap<RankKey, String> = BTreeMap::new();
    let mut next_synthetic = 0u64;

    for name in names {
        let key = match rank_key(&name, pattern) {
            Some(millis) => RankKey::Parsed(millis),
            None => {
                tracing::warn!(
                    "index {} is not in the format {}",
                    name,
                    pattern.source()
                );
                let key = RankKey::Synthetic(next_synthetic);
                next_synthetic += 1;
                key
            }
        };

        if let Some(existing) = sorted.get(&key) {
            return Err(RollError::DuplicateGenerationTime {
                first: existing.clone(),
                second: name,
            });
        }
        sorted.insert(key, name);
    }

    Ok(sorted
        .into_iter()
        .rev()
        .map(|(rank_key, name)| Generation { name, rank_key })
        .collect())
}

/// Timestamp encoded after the first `_` of an index name.
fn rank_key(name: &str, pattern: &TimestampPattern) -> Option<i64> {
    let (_, suffix) = name.split_once('_')?;
    pattern.parse_millis(suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_pattern() -> TimestampPattern {
        TimestampPattern::compile("yyyy-MM-dd-HH-mm").unwrap()
    }

    fn names(generations: &[Generation]) -> Vec<&str> {
        generations.iter().map(|g| g.name.as_str()).collect()
    }

    #[test]
    fn test_orders_most_recent_first() {
        let ranked = rank(
            [
                "logs_2019-12-01-00-00",
                "logs_2020-01-01-00-00",
                "logs_2019-12-15-12-30",
            ],
            &default_pattern(),
        )
        .unwrap();
        assert_eq!(
            names(&ranked),
            vec![
                "logs_2020-01-01-00-00",
                "logs_2019-12-15-12-30",
                "logs_2019-12-01-00-00"
            ]
        );
        assert!(matches!(ranked[0].rank_key, RankKey::Parsed(_)));
    }

    #[test]
    fn test_unparseable_names_rank_oldest() {
        // "logs_zzz" would sort after every date lexically, yet still ranks oldest
        let ranked = rank(
            [
                "logs_zzz",
                "logs_1970-01-01-00-00",
                "logs",
                "logs_aaa",
                "logs_2020-01-01-00-00",
            ],
            &default_pattern(),
        )
        .unwrap();
        assert_eq!(
            names(&ranked),
            vec![
                "logs_2020-01-01-00-00",
                "logs_1970-01-01-00-00",
                "logs_zzz",
                "logs_aaa",
                "logs"
            ]
        );
        assert_eq!(ranked[2].rank_key, RankKey::Synthetic(2));
        assert_eq!(ranked[4].rank_key, RankKey::Synthetic(0));
    }

    #[test]
    fn test_pre_epoch_timestamps_still_outrank_malformed_names() {
        let ranked = rank(["logs_1960-05-01-00-00", "logs_broken"], &default_pattern()).unwrap();
        assert_eq!(names(&ranked), vec!["logs_1960-05-01-00-00", "logs_broken"]);
    }

    #[test]
    fn test_duplicate_timestamps_are_fatal() {
        let pattern = TimestampPattern::compile("yyyy-MM-dd").unwrap();
        let err = rank(["a_2020-01-01", "b_2020-01-01"], &pattern).unwrap_err();
        match err {
            RollError::DuplicateGenerationTime { first, second } => {
                assert_eq!(first, "a_2020-01-01");
                assert_eq!(second, "b_2020-01-01");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_suffix_starts_after_first_separator() {
        // my_logs_... splits at the first '_' so the suffix is "logs_2020-..."
        let ranked = rank(["my_logs_2020-01-01-00-00", "my_2020-01-01-00-00"], &default_pattern()).unwrap();
        assert_eq!(ranked[0].name, "my_2020-01-01-00-00");
        assert_eq!(ranked[1].rank_key, RankKey::Synthetic(0));
    }

    #[test]
    fn test_empty_input() {
        assert!(rank(Vec::<String>::new(), &default_pattern()).unwrap().is_empty());
    }
}
