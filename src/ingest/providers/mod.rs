//! Source adapters. Each one inspects its third-party payload shape here and
//! hands `NormalizedItem`s to the pipeline; nothing downstream knows about raw
//! field names.

pub mod apify;
pub mod github;
pub mod reddit;
pub mod twitter;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// Walk a dotted path (`"author.userName"`) through nested objects.
fn lookup<'a>(v: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(v, |cur, key| cur.get(key))
}

/// First non-empty string (or number, stringified) among `paths`.
pub(crate) fn first_str(v: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|p| match lookup(v, p)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

pub(crate) fn first_u64(v: &Value, paths: &[&str]) -> Option<u64> {
    paths.iter().find_map(|p| match lookup(v, p)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// RFC 3339, the classic Twitter format (`Wed Oct 10 20:19:24 +0000 2018`),
/// or unix seconds.
pub(crate) fn parse_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::Number(n) => {
            let secs = n.as_f64()?;
            Utc.timestamp_opt(secs as i64, 0).single()
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(dt) = DateTime::parse_from_str(s, "%a %b %d %H:%M:%S %z %Y") {
                return Some(dt.with_timezone(&Utc));
            }
            s.parse::<i64>()
                .ok()
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        }
        _ => None,
    }
}

pub(crate) fn first_timestamp(v: &Value, paths: &[&str]) -> Option<DateTime<Utc>> {
    paths
        .iter()
        .find_map(|p| lookup(v, p).and_then(parse_timestamp))
}
