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

//! One passive-DNS observation parsed from an NDJSON record, and the
//! time-fence decision applied to it.

use serde::Deserialize;

/// A tuple carries two pairs of timestamps: on-the-wire observation times and
/// zone-file synthesis times. At least one pair is populated; the wire pair
/// is preferred when both are.
#[derive(Debug, Deserialize)]
pub struct Tuple {
    #[serde(default)]
    pub time_first: u64,
    #[serde(default)]
    pub time_last: u64,
    #[serde(default, rename = "zone_time_first")]
    pub zone_first: u64,
    #[serde(default, rename = "zone_time_last")]
    pub zone_last: u64,
    #[serde(default)]
    pub bailiwick: Option<String>,
    #[serde(default)]
    pub rrname: Option<String>,
    #[serde(default)]
    pub rrtype: Option<String>,
    #[serde(default)]
    pub rdata: Option<Rdata>,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub num_results: u64,
}

/// Rdata arrives either as one string or as a list; list slots are not
/// guaranteed to be strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Rdata {
    Single(String),
    Set(Vec<serde_json::Value>),
}

impl Rdata {
    /// Each slot in order; `None` marks a non-string slot.
    pub fn slots(&self) -> Vec<Option<&str>> {
        match self {
            Rdata::Single(datum) => vec![Some(datum.as_str())],
            Rdata::Set(slots) => slots.iter().map(|slot| slot.as_str()).collect(),
        }
    }
}

impl Tuple {
    pub fn from_json(buf: &[u8]) -> Result<Tuple, serde_json::Error> {
        serde_json::from_slice(buf)
    }

    /// The effective observation interval for fencing and sorting.
    pub fn interval(&self) -> (u64, u64) {
        if self.time_first != 0 && self.time_last != 0 {
            (self.time_first, self.time_last)
        } else {
            (self.zone_first, self.zone_last)
        }
    }
}

/// Decide whether a record's interval passes the time fence. Returns the
/// reason for rejection, or `None` when the record is selected. In complete
/// mode the whole interval must lie inside the fence; otherwise overlapping
/// the fence is enough.
pub fn fence_verdict(
    first: u64,
    last: u64,
    after: u64,
    before: u64,
    complete: bool,
) -> Option<&'static str> {
    let mut whynot = None;
    if after != 0 {
        if complete {
            if first < after {
                whynot = Some("first is too early");
            }
        } else if last < after {
            whynot = Some("last is too early");
        }
    }
    if before != 0 {
        if complete {
            if last > before {
                whynot = Some("last is too late");
            }
        } else if first > before {
            whynot = Some("first is too late");
        }
    }
    whynot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_fields() {
        let raw = br#"{"count":6350,"time_first":1278920585,"time_last":1379064983,
            "rrname":"www.example.com.","rrtype":"A","bailiwick":"example.com.",
            "rdata":["192.0.2.1","192.0.2.2"]}"#;
        let tup = Tuple::from_json(raw).unwrap();
        assert_eq!(tup.count, 6350);
        assert_eq!(tup.interval(), (1_278_920_585, 1_379_064_983));
        assert_eq!(
            tup.rdata.unwrap().slots(),
            vec![Some("192.0.2.1"), Some("192.0.2.2")]
        );
    }

    #[test]
    fn zone_pair_is_the_fallback() {
        let raw = br#"{"zone_time_first":100,"zone_time_last":200,
            "rrname":"example.com.","rrtype":"NS","rdata":"ns.example.com."}"#;
        let tup = Tuple::from_json(raw).unwrap();
        assert_eq!(tup.interval(), (100, 200));

        let raw = br#"{"time_first":50,"time_last":0,"zone_time_first":100,"zone_time_last":200}"#;
        let tup = Tuple::from_json(raw).unwrap();
        // a half-populated wire pair does not win.
        assert_eq!(tup.interval(), (100, 200));
    }

    #[test]
    fn rejects_non_object_records() {
        assert!(Tuple::from_json(b"\"hello\"").is_err());
        assert!(Tuple::from_json(b"Problem: mid-body error").is_err());
    }

    #[test]
    fn loose_fence_selects_overlap() {
        // inside, entirely before, entirely after, straddling.
        assert_eq!(fence_verdict(150, 180, 100, 200, false), None);
        assert_eq!(
            fence_verdict(50, 90, 100, 200, false),
            Some("last is too early")
        );
        assert_eq!(
            fence_verdict(250, 300, 100, 200, false),
            Some("first is too late")
        );
        assert_eq!(fence_verdict(50, 250, 100, 200, false), None);
    }

    #[test]
    fn complete_fence_requires_envelopment() {
        assert_eq!(fence_verdict(150, 180, 100, 200, true), None);
        assert_eq!(
            fence_verdict(150, 250, 100, 200, true),
            Some("last is too late")
        );
        assert_eq!(
            fence_verdict(50, 180, 100, 200, true),
            Some("first is too early")
        );
        // boundary values are inside the fence.
        assert_eq!(fence_verdict(100, 200, 100, 200, true), None);
    }

    #[test]
    fn one_sided_fences() {
        assert_eq!(fence_verdict(50, 150, 100, 0, false), None);
        assert_eq!(fence_verdict(50, 150, 100, 0, true), Some("first is too early"));
        assert_eq!(fence_verdict(150, 250, 0, 200, false), None);
        assert_eq!(fence_verdict(150, 250, 0, 200, true), Some("last is too late"));
        assert_eq!(fence_verdict(1, 2, 0, 0, false), None);
    }
}
