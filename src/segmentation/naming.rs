use crate::db::models::Activity;
use crate::segmentation::batch::{classify, ActivityClass};
use crate::segmentation::config::BatchConfig;

/// Share of meaningful time one class needs to label the whole session.
const DOMINANCE_RATIO: f64 = 0.75;

/// Activities shorter than this are ignored when naming, unless nothing
/// longer exists.
const NOISE_THRESHOLD_SECS: i64 = 120;

const CODING_HINTS: &[&str] = &["code", "terminal", "vscode", "localhost", "xcode", "vim"];
const RESEARCH_HINTS: &[&str] = &["github", "stackoverflow", "docs", "documentation", "api"];

/// Short human label for a session, derived from its members' classes and
/// details.
pub fn name_session<'a, I>(members: I, config: &BatchConfig) -> String
where
    I: IntoIterator<Item = &'a Activity>,
{
    let all: Vec<&Activity> = members.into_iter().collect();
    if all.is_empty() {
        return "Empty Session".to_string();
    }

    let meaningful: Vec<&Activity> = {
        let long: Vec<&Activity> = all
            .iter()
            .copied()
            .filter(|a| a.duration_sec >= NOISE_THRESHOLD_SECS)
            .collect();
        if long.is_empty() {
            all
        } else {
            long
        }
    };

    let mut productive = 0i64;
    let mut unproductive = 0i64;
    let mut total = 0i64;
    for activity in &meaningful {
        total += activity.duration_sec;
        match classify(activity.productivity_score, config) {
            ActivityClass::Productive => productive += activity.duration_sec,
            ActivityClass::Unproductive => unproductive += activity.duration_sec,
            ActivityClass::Neutral => {}
        }
    }

    if total <= 0 {
        return "Mixed Session".to_string();
    }

    let productive_ratio = productive as f64 / total as f64;
    let unproductive_ratio = unproductive as f64 / total as f64;

    let label = if productive_ratio >= DOMINANCE_RATIO {
        if mentions_any(&meaningful, CODING_HINTS) {
            "Coding Session"
        } else if mentions_any(&meaningful, RESEARCH_HINTS) {
            "Research Session"
        } else {
            "Work Session"
        }
    } else if unproductive_ratio >= DOMINANCE_RATIO {
        "Break Session"
    } else {
        "Mixed Session"
    };

    label.to_string()
}

fn mentions_any(activities: &[&Activity], hints: &[&str]) -> bool {
    activities.iter().any(|a| {
        let details = a.details.to_lowercase();
        hints.iter().any(|hint| details.contains(hint))
    })
}
