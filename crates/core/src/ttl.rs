//! Relative TTL string parsing.
//!
//! Cache freshness is configured with compact duration strings such as
//! `"24h"` or `"1d12h18m9s"`. Tokens are `<integer><unit>` pairs with unit
//! one of `d`, `h`, `m`, `s` (case-insensitive), in any order. Parsing is
//! lenient: anything that is not a recognized token is ignored, and an
//! empty string yields a zero duration.

use std::sync::LazyLock;

use chrono::Duration;
use regex::Regex;

static TTL_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(\d+)([dhms])").expect("valid ttl pattern"));

/// Parse a relative TTL string into a duration.
///
/// Unrecognized tokens are skipped rather than rejected; callers that need
/// strict validation must pre-check the string themselves.
pub fn parse_ttl(spec: &str) -> Duration {
    let mut total = Duration::zero();

    for caps in TTL_TOKEN.captures_iter(spec) {
        let Ok(amount) = caps[1].parse::<i64>() else {
            continue;
        };

        total = total
            + match caps[2].to_ascii_lowercase().as_str() {
                "d" => Duration::days(amount),
                "h" => Duration::hours(amount),
                "m" => Duration::minutes(amount),
                "s" => Duration::seconds(amount),
                _ => Duration::zero(),
            };
    }

    total
}
