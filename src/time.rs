// Copyright 2023 KAISER+KRAFT EUROPA GmbH
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

//! Timestamp parsing and rendering. Three input forms are accepted: absolute
//! `YYYY-MM-DD[ HH:MM:SS]` (UTC), signed integer seconds (negative meaning
//! relative to now), and the DNS-TTL form `%dw%dd%dh%dm%ds`.

use anyhow::{anyhow, Context, Result};
use hifitime::Epoch;

pub fn now_unix() -> Result<u64> {
    let now = Epoch::now().map_err(|e| anyhow!("cannot read the system clock: {e}"))?;
    Ok(now.to_unix_seconds().max(0.0) as u64)
}

/// Parse one (possibly relative) timestamp into Unix seconds.
pub fn time_get(src: &str) -> Result<u64> {
    if let Some(t) = parse_absolute(src) {
        return Ok(t);
    }
    if let Ok(seconds) = src.parse::<i64>() {
        if seconds < 0 {
            return Ok(now_unix()
                .context("relative timestamp")?
                .saturating_sub(seconds.unsigned_abs()));
        }
        return Ok(seconds as u64);
    }
    if let Some(ttl) = parse_ttl(src) {
        return Ok(now_unix().context("relative timestamp")?.saturating_sub(ttl));
    }
    Err(anyhow!("unrecognized timestamp '{src}'"))
}

/// Render a Unix timestamp for diagnostics and presentation. Zero renders
/// as "0" since it stands for "unset" throughout the pipeline.
pub fn time_str(t: u64, iso8601: bool) -> String {
    if t == 0 {
        return "0".to_string();
    }
    let (y, mo, d, h, mi, s, _) = Epoch::from_unix_seconds(t as f64).to_gregorian_utc();
    if iso8601 {
        format!("{y:04}-{mo:02}-{d:02}T{h:02}:{mi:02}:{s:02}Z")
    } else {
        format!("{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:{s:02}")
    }
}

fn parse_absolute(src: &str) -> Option<u64> {
    let (date, time) = match src.split_once(' ') {
        Some((date, time)) => (date, Some(time)),
        None => (src, None),
    };
    let mut fields = date.splitn(3, '-');
    let year: i32 = fields.next()?.parse().ok()?;
    let month: u8 = fields.next()?.parse().ok()?;
    let day: u8 = fields.next()?.parse().ok()?;
    let (hour, minute, second) = match time {
        Some(time) => {
            let mut fields = time.splitn(3, ':');
            (
                fields.next()?.parse().ok()?,
                fields.next()?.parse().ok()?,
                fields.next()?.parse().ok()?,
            )
        }
        None => (0, 0, 0),
    };
    let epoch = Epoch::maybe_from_gregorian_utc(year, month, day, hour, minute, second, 0).ok()?;
    let seconds = epoch.to_unix_seconds();
    if seconds < 0.0 {
        return None;
    }
    Some(seconds.round() as u64)
}

fn parse_ttl(src: &str) -> Option<u64> {
    let mut total: u64 = 0;
    let mut digits = String::new();
    let mut saw_unit = false;
    for ch in src.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let mult: u64 = match ch.to_ascii_lowercase() {
            'w' => 604_800,
            'd' => 86_400,
            'h' => 3_600,
            'm' => 60,
            's' => 1,
            _ => return None,
        };
        if digits.is_empty() {
            return None;
        }
        total = total.checked_add(digits.parse::<u64>().ok()?.checked_mul(mult)?)?;
        digits.clear();
        saw_unit = true;
    }
    if !saw_unit {
        // a pure number is handled by the integer form, not as a TTL.
        return None;
    }
    if !digits.is_empty() {
        total = total.checked_add(digits.parse::<u64>().ok()?)?;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_date_only() {
        assert_eq!(time_get("1970-01-02").unwrap(), 86_400);
        assert_eq!(time_get("2018-09-06").unwrap(), 1_536_192_000);
    }

    #[test]
    fn absolute_date_and_time() {
        assert_eq!(time_get("1970-01-01 01:02:03").unwrap(), 3_723);
        assert_eq!(time_get("2018-09-06 00:00:30").unwrap(), 1_536_192_030);
    }

    #[test]
    fn plain_seconds() {
        assert_eq!(time_get("1536192000").unwrap(), 1_536_192_000);
        assert_eq!(time_get("0").unwrap(), 0);
    }

    #[test]
    fn negative_seconds_are_relative() {
        let now = now_unix().unwrap();
        let got = time_get("-3600").unwrap();
        assert!(now - got >= 3_600 && now - got < 3_610);
    }

    #[test]
    fn ttl_form_is_relative() {
        let now = now_unix().unwrap();
        let got = time_get("1w2d3h4m5s").unwrap();
        let expect = 604_800 + 2 * 86_400 + 3 * 3_600 + 4 * 60 + 5;
        assert!(now - got >= expect && now - got < expect + 10);
    }

    #[test]
    fn rejects_garbage() {
        assert!(time_get("yesterday").is_err());
        assert!(time_get("2018-13-01").is_err());
        assert!(time_get("1x").is_err());
        assert!(time_get("w").is_err());
    }

    #[test]
    fn renders_both_formats() {
        assert_eq!(time_str(0, false), "0");
        assert_eq!(time_str(1_536_192_030, false), "2018-09-06 00:00:30");
        assert_eq!(time_str(1_536_192_030, true), "2018-09-06T00:00:30Z");
    }
}
