//! Crash id minting and validation.
//!
//! Crash ids look like `de1bb258-cbbf-4589-a673-34f800160918` where the last
//! seven characters encode a throttle digit followed by a two-digit
//! year/month/day:
//!
//! ```text
//! de1bb258-cbbf-4589-a673-34f800160918
//!                              ^^^^^^^
//!                              ||____|
//!                              |  yymmdd
//!                              |
//!                              throttle result
//! ```

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

static CRASH_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{6}[0-9]{6}$",
    )
    .expect("crash id regex is valid")
});

/// Mint a crash id for the given submission time and throttle digit.
///
/// `throttle_digit` is conventionally `0` (accept) or `1` (defer), but any
/// single ASCII digit is accepted by this function; callers that need the
/// strict accept/defer invariant should validate with `validate(_, true)`.
pub fn mint(timestamp: DateTime<Utc>, throttle_digit: u8) -> String {
    let uuid = Uuid::new_v4().to_string();
    // uuid is 36 chars; keep the first 29 and replace the rest.
    let prefix = &uuid[..29];
    format!(
        "{prefix}{throttle}{yy:02}{mm:02}{dd:02}",
        throttle = throttle_digit % 10,
        yy = timestamp.year() % 100,
        mm = timestamp.month(),
        dd = timestamp.day(),
    )
}

/// Validate a crash id's shape and, in strict mode, its throttle digit.
pub fn validate(crash_id: &str, strict: bool) -> bool {
    if !CRASH_ID_RE.is_match(crash_id) {
        return false;
    }
    if strict {
        let throttle_char = crash_id.as_bytes()[crash_id.len() - 7];
        if throttle_char != b'0' && throttle_char != b'1' {
            return false;
        }
    }
    true
}

/// Extract the `YYYYMMDD` date embedded in a crash id.
pub fn date_of(crash_id: &str) -> String {
    format!("20{}", &crash_id[crash_id.len() - 6..])
}

/// Extract the `YYYYMMDD` date embedded in a crash id as a calendar date.
pub fn naive_date_of(crash_id: &str) -> Option<NaiveDate> {
    let s = date_of(crash_id);
    NaiveDate::parse_from_str(&s, "%Y%m%d").ok()
}

/// Extract the throttle digit embedded in a crash id.
pub fn throttle_of(crash_id: &str) -> u8 {
    crash_id.as_bytes()[crash_id.len() - 7] - b'0'
}
