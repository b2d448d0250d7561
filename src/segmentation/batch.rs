//! Offline flow grouping over a complete batch of activities.
//!
//! Unlike the streaming segmenter this sees the whole range up front, so it
//! splits on idle gaps and on changes of activity class instead of waiting
//! out hysteresis counters. Every input activity lands in exactly one group
//! and groups never overlap in time.

use chrono::{DateTime, Utc};

use crate::db::models::Activity;
use crate::segmentation::config::BatchConfig;

/// A run of activities that will become one session, ordered by start.
pub type ActivityGroup = Vec<Activity>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityClass {
    Productive,
    Neutral,
    Unproductive,
}

/// Missing scores are neutral.
pub fn classify(score: Option<i32>, config: &BatchConfig) -> ActivityClass {
    match score {
        Some(s) if s >= config.productive_min_score => ActivityClass::Productive,
        Some(s) if s <= config.unproductive_max_score => ActivityClass::Unproductive,
        _ => ActivityClass::Neutral,
    }
}

/// Split `activities` into maximal flow groups.
///
/// Input order does not matter; activities are sorted by `(timestamp_start, id)`
/// first. A boundary is only placed where the next activity starts at or
/// after the running end of the current group, so overlapping captures are
/// kept together and the resulting session spans stay disjoint.
pub fn partition(mut activities: Vec<Activity>, config: &BatchConfig) -> Vec<ActivityGroup> {
    activities.sort_by_key(|a| (a.timestamp_start, a.id));

    let mut groups: Vec<ActivityGroup> = Vec::new();
    let mut current: ActivityGroup = Vec::new();
    let mut group_end: Option<DateTime<Utc>> = None;

    for activity in activities {
        let split = match (current.first(), current.last(), group_end) {
            (Some(opening), Some(prev), Some(end)) => {
                should_split(opening, prev, end, &activity, config)
            }
            _ => false,
        };

        if split {
            groups.push(std::mem::take(&mut current));
            group_end = None;
        }

        let end = activity.end_time();
        group_end = Some(group_end.map_or(end, |e| e.max(end)));
        current.push(activity);
    }

    if !current.is_empty() {
        groups.push(current);
    }

    groups
}

fn should_split(
    opening: &Activity,
    prev: &Activity,
    group_end: DateTime<Utc>,
    next: &Activity,
    config: &BatchConfig,
) -> bool {
    if group_end > next.timestamp_start {
        return false;
    }

    let gap_secs = (next.timestamp_start - group_end).num_seconds();
    if gap_secs > config.gap_threshold_secs {
        return true;
    }

    let opening_class = classify(opening.productivity_score, config);
    let prev_class = classify(prev.productivity_score, config);
    let next_class = classify(next.productivity_score, config);

    if prev_class == next_class {
        return false;
    }

    // A short excursion in either direction is absorbed when the other side
    // still matches what the group opened with.
    let micro = config.micro_break_threshold_secs;
    if next.duration_sec <= micro && prev_class == opening_class {
        return false;
    }
    if prev.duration_sec <= micro && next_class == opening_class {
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap()
    }

    fn activity(id: i64, start_sec: i64, duration_sec: i64, score: i32) -> Activity {
        Activity {
            id,
            timestamp_start: base() + Duration::seconds(start_sec),
            duration_sec,
            details: format!("activity {id}"),
            productivity_score: Some(score),
            user_provided: false,
            reasoning: None,
            session_id: None,
        }
    }

    fn ids(groups: &[ActivityGroup]) -> Vec<Vec<i64>> {
        groups
            .iter()
            .map(|g| g.iter().map(|a| a.id).collect())
            .collect()
    }

    #[test]
    fn test_empty_input() {
        assert!(partition(Vec::new(), &BatchConfig::default()).is_empty());
    }

    #[test]
    fn test_same_class_run_stays_together() {
        let acts = (0..5).map(|i| activity(i + 1, i * 60, 60, 7)).collect();
        let groups = partition(acts, &BatchConfig::default());
        assert_eq!(ids(&groups), vec![vec![1, 2, 3, 4, 5]]);
    }

    #[test]
    fn test_long_idle_gap_splits() {
        let acts = vec![
            activity(1, 0, 600, 7),
            activity(2, 600, 600, 7),
            // 1801 s after the previous end
            activity(3, 1200 + 1801, 600, 7),
        ];
        let groups = partition(acts, &BatchConfig::default());
        assert_eq!(ids(&groups), vec![vec![1, 2], vec![3]]);
    }

    #[test]
    fn test_gap_at_threshold_does_not_split() {
        let acts = vec![activity(1, 0, 600, 7), activity(2, 600 + 1800, 600, 7)];
        let groups = partition(acts, &BatchConfig::default());
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn test_class_change_splits() {
        let acts = vec![
            activity(1, 0, 900, 8),
            activity(2, 900, 900, 8),
            activity(3, 1800, 900, -7),
            activity(4, 2700, 900, -6),
        ];
        let groups = partition(acts, &BatchConfig::default());
        assert_eq!(ids(&groups), vec![vec![1, 2], vec![3, 4]]);
    }

    #[test]
    fn test_micro_break_is_absorbed() {
        let acts = vec![
            activity(1, 0, 900, 8),
            activity(2, 900, 120, -8),
            activity(3, 1020, 900, 8),
        ];
        let groups = partition(acts, &BatchConfig::default());
        assert_eq!(ids(&groups), vec![vec![1, 2, 3]]);
    }

    #[test]
    fn test_long_excursion_is_not_absorbed() {
        let acts = vec![
            activity(1, 0, 900, 8),
            activity(2, 900, 600, -8),
            activity(3, 1500, 900, 8),
        ];
        let groups = partition(acts, &BatchConfig::default());
        assert_eq!(ids(&groups), vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn test_unsorted_input_is_ordered() {
        let acts = vec![activity(3, 120, 60, 5), activity(1, 0, 60, 5), activity(2, 60, 60, 5)];
        let groups = partition(acts, &BatchConfig::default());
        assert_eq!(ids(&groups), vec![vec![1, 2, 3]]);
    }

    #[test]
    fn test_overlapping_capture_is_never_cut() {
        // Activity 1 runs past the start of the unproductive activity 2, so
        // there is no clean boundary between them.
        let acts = vec![activity(1, 0, 1200, 8), activity(2, 600, 900, -8)];
        let groups = partition(acts, &BatchConfig::default());
        assert_eq!(ids(&groups), vec![vec![1, 2]]);
    }

    fn arb_activities() -> impl Strategy<Value = Vec<Activity>> {
        prop::collection::vec((0i64..20_000, 1i64..2_400, -10i32..=10), 0..60).prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, (start, dur, score))| activity(i as i64 + 1, start, dur, score))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_partition_is_exhaustive(acts in arb_activities()) {
            let mut expected: Vec<i64> = acts.iter().map(|a| a.id).collect();
            let groups = partition(acts, &BatchConfig::default());

            let mut seen: Vec<i64> = groups.iter().flatten().map(|a| a.id).collect();
            expected.sort_unstable();
            seen.sort_unstable();
            prop_assert_eq!(seen, expected);
            prop_assert!(groups.iter().all(|g| !g.is_empty()));
        }

        #[test]
        fn prop_group_spans_are_disjoint(acts in arb_activities()) {
            let groups = partition(acts, &BatchConfig::default());
            let spans: Vec<(DateTime<Utc>, DateTime<Utc>)> = groups
                .iter()
                .map(|g| {
                    let start = g.iter().map(|a| a.timestamp_start).min().unwrap();
                    let end = g.iter().map(|a| a.end_time()).max().unwrap();
                    (start, end)
                })
                .collect();

            for pair in spans.windows(2) {
                prop_assert!(pair[0].1 <= pair[1].0);
            }
        }
    }
}
