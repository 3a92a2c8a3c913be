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

//! The query intent: search mode plus key, optional rrtype, bailiwick and
//! prefix length, and the time fence. Also the RESTful path builder and the
//! batch-line parser, both of which URL-escape each component exactly once.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Escape everything except ASCII alphanumerics and `-_.~`.
const PATH_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub fn escape(component: &str) -> String {
    utf8_percent_encode(component, PATH_ESCAPE).to_string()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    RrsetName,
    RrsetRaw,
    RdataName,
    RdataRaw,
    RdataIp,
}

impl Mode {
    pub fn is_rrset(self) -> bool {
        matches!(self, Mode::RrsetName | Mode::RrsetRaw)
    }
}

/// One search intent, immutable once built. `bailiwick` only accompanies
/// rrset modes, `pfxlen` only `RdataIp`; zero time fields mean "unset".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    pub mode: Mode,
    pub thing: String,
    pub rrtype: Option<String>,
    pub bailiwick: Option<String>,
    pub pfxlen: Option<String>,
    pub after: u64,
    pub before: u64,
}

impl Query {
    /// The RESTful path fragment for this query. Components were escaped at
    /// construction time and are used verbatim here.
    pub fn path(&self) -> String {
        match self.mode {
            Mode::RrsetName => self.rrset_path("rrset/name"),
            Mode::RrsetRaw => self.rrset_path("rrset/raw"),
            Mode::RdataName => self.rdata_path("rdata/name"),
            Mode::RdataRaw => self.rdata_path("rdata/raw"),
            Mode::RdataIp => match &self.pfxlen {
                Some(pfxlen) => format!("rdata/ip/{},{}", self.thing, pfxlen),
                None => format!("rdata/ip/{}", self.thing),
            },
        }
    }

    fn rrset_path(&self, prefix: &str) -> String {
        match (&self.rrtype, &self.bailiwick) {
            (Some(rrtype), Some(bailiwick)) => {
                format!("{prefix}/{}/{rrtype}/{bailiwick}", self.thing)
            }
            (Some(rrtype), None) => format!("{prefix}/{}/{rrtype}", self.thing),
            // a bailiwick without an rrtype needs a placeholder in between.
            (None, Some(bailiwick)) => format!("{prefix}/{}/ANY/{bailiwick}", self.thing),
            (None, None) => format!("{prefix}/{}", self.thing),
        }
    }

    fn rdata_path(&self, prefix: &str) -> String {
        match &self.rrtype {
            Some(rrtype) => format!("{prefix}/{}/{rrtype}", self.thing),
            None => format!("{prefix}/{}", self.thing),
        }
    }
}

/// Turn one line of a batch file into a `Query`. The grammar is strict and
/// every failure names the missing or surplus piece; time-fence defaults are
/// the caller's concern.
pub fn batch_parse(line: &str) -> Result<Query, &'static str> {
    let mut terms = line.split('/').filter(|term| !term.is_empty());
    let family = terms.next().ok_or("too few terms")?;
    let query = match family {
        "rrset" => {
            let (mode, missing) = match terms.next().ok_or("missing term after 'rrset/'")? {
                "name" => (Mode::RrsetName, "missing term after 'rrset/name/'"),
                "raw" => (Mode::RrsetRaw, "missing term after 'rrset/raw/'"),
                _ => return Err("unrecognized term after 'rrset/'"),
            };
            let thing = terms.next().ok_or(missing)?;
            let rrtype = terms.next();
            let bailiwick = if rrtype.is_some() { terms.next() } else { None };
            Query {
                mode,
                thing: escape(thing),
                rrtype: rrtype.map(escape),
                bailiwick: bailiwick.map(escape),
                pfxlen: None,
                after: 0,
                before: 0,
            }
        }
        "rdata" => match terms.next().ok_or("missing term after 'rdata/'")? {
            "name" => {
                let thing = terms.next().ok_or("missing term after 'rdata/name/'")?;
                Query {
                    mode: Mode::RdataName,
                    thing: escape(thing),
                    rrtype: terms.next().map(escape),
                    bailiwick: None,
                    pfxlen: None,
                    after: 0,
                    before: 0,
                }
            }
            "raw" => {
                let thing = terms.next().ok_or("missing term after 'rdata/raw/'")?;
                Query {
                    mode: Mode::RdataRaw,
                    thing: escape(thing),
                    rrtype: terms.next().map(escape),
                    bailiwick: None,
                    pfxlen: None,
                    after: 0,
                    before: 0,
                }
            }
            "ip" => {
                let thing = terms.next().ok_or("missing term after 'rdata/ip/'")?;
                let (addr, pfxlen) = match thing.split_once(',') {
                    Some((addr, pfxlen)) => (addr, Some(pfxlen)),
                    None => (thing, None),
                };
                Query {
                    mode: Mode::RdataIp,
                    thing: escape(addr),
                    rrtype: None,
                    bailiwick: None,
                    pfxlen: pfxlen.map(escape),
                    after: 0,
                    before: 0,
                }
            }
            _ => return Err("unrecognized term after 'rdata/'"),
        },
        _ => return Err("unrecognized initial term"),
    };
    if terms.next().is_some() {
        return Err("extra garbage");
    }
    Ok(query)
}
