use chrono::{DateTime, Utc};

use shared::types::{Impact, RealTimeUpdate};

/// "just now", "42s ago", "5m ago", "3h ago", "2d ago".
///
/// Anything under ten seconds old, or stamped in the future, reads as
/// "just now". A timestamp that can't be parsed is shown as sent.
pub fn relative_time(update: &RealTimeUpdate, now: DateTime<Utc>) -> String {
    let Some(at) = update.parsed_timestamp() else {
        return update.timestamp.clone();
    };

    let secs = (now - at).num_seconds();
    match secs {
        s if s < 10 => "just now".to_string(),
        s if s < 60 => format!("{}s ago", s),
        s if s < 3_600 => format!("{}m ago", s / 60),
        s if s < 86_400 => format!("{}h ago", s / 3_600),
        s => format!("{}d ago", s / 86_400),
    }
}

pub fn impact_icon(impact: Impact) -> &'static str {
    match impact {
        Impact::Positive => "▲",
        Impact::Negative => "▼",
        Impact::Neutral => "●",
    }
}
