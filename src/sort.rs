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

//! Deduplicating order-by: a POSIX `sort -u` subprocess keyed on five
//! derived fields prefixed to each record, and the lossy collation-key
//! derivation for DNS names and rdata.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::process::Stdio;

use anyhow::{Context as _, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};

use crate::context::Context;
use crate::tuple::{Rdata, Tuple};

pub const MAX_KEYS: usize = 5;

const SORT_PATH: &str = "/usr/bin/sort";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    None,
    Ascending,
    Descending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KeyName {
    First,
    Last,
    Count,
    Name,
    Data,
}

impl KeyName {
    fn parse(token: &str) -> Option<KeyName> {
        match token.to_ascii_lowercase().as_str() {
            "first" => Some(KeyName::First),
            "last" => Some(KeyName::Last),
            "count" => Some(KeyName::Count),
            "name" => Some(KeyName::Name),
            "data" => Some(KeyName::Data),
            _ => None,
        }
    }

    /// The sort(1) key flag for the prefix field this key lives in. The
    /// three numeric fields compare numerically.
    fn flag(self) -> &'static str {
        match self {
            KeyName::First => "-k1n",
            KeyName::Last => "-k2n",
            KeyName::Count => "-k3n",
            KeyName::Name => "-k4",
            KeyName::Data => "-k5",
        }
    }
}

/// The user-selected sort keys, in order. Once sorting is enabled all five
/// keys are made effectively present so that `sort -u` collapses exact
/// duplicates across the whole derived prefix.
#[derive(Clone, Debug, Default)]
pub struct SortSpec {
    order: SortOrder,
    keys: Vec<(String, KeyName)>,
    pub by_name: bool,
    pub by_data: bool,
}

impl SortSpec {
    pub fn new(order: SortOrder) -> SortSpec {
        SortSpec {
            order,
            ..SortSpec::default()
        }
    }

    pub fn enabled(&self) -> bool {
        self.order != SortOrder::None
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }

    pub fn add_key(&mut self, token: &str) -> Result<(), &'static str> {
        if self.keys.len() == MAX_KEYS {
            return Err("too many sort keys given.");
        }
        if self.keys.iter().any(|(specified, _)| specified == token) {
            return Err("Each sort key may only be specified once");
        }
        let name = KeyName::parse(token)
            .ok_or("key must be one of first, last, count, name, or data")?;
        match name {
            KeyName::Name => self.by_name = true,
            KeyName::Data => self.by_data = true,
            _ => {}
        }
        self.keys.push((token.to_string(), name));
        Ok(())
    }

    /// Append whichever keys the user left out, in canonical order.
    pub fn fill_missing(&mut self) {
        for token in ["first", "last", "count", "name", "data"] {
            if self.keys.len() == MAX_KEYS {
                break;
            }
            if !self.keys.iter().any(|(specified, _)| specified == token) {
                let _ = self.add_key(token);
            }
        }
    }

    pub fn sort_args(&self) -> Vec<String> {
        let reverse = if self.order == SortOrder::Descending {
            "r"
        } else {
            ""
        };
        self.keys
            .iter()
            .map(|(_, name)| format!("{}{reverse}", name.flag()))
            .collect()
    }
}

/// A collatable rendition of the owner name, or `None` when there is none.
pub fn sortable_rrname(tup: &Tuple) -> Option<String> {
    let mut out = String::new();
    sortable_dnsname(&mut out, tup.rrname.as_deref()?);
    Some(out)
}

/// A collatable rendition of the whole rdata set, slots keyed independently
/// and concatenated in array order.
pub fn sortable_rdata(tup: &Tuple) -> Option<String> {
    let rrtype = tup.rrtype.as_deref().unwrap_or("");
    let mut out = String::new();
    match tup.rdata.as_ref()? {
        Rdata::Single(datum) => sortable_rdatum(&mut out, rrtype, datum),
        Rdata::Set(slots) => {
            for slot in slots {
                match slot.as_str() {
                    Some(datum) => sortable_rdatum(&mut out, rrtype, datum),
                    None => tracing::warn!("rdata slot is not a string"),
                }
            }
        }
    }
    Some(out)
}

/// To collate lexicographically a DNS name is rewritten TLD-first with each
/// label lower-cased and hex-expanded, label boundaries kept as literal dots.
/// Escaped dots and backslashes in presentation form are not honoured; the
/// rendition is irreversibly lossy and used only for ordering.
fn sortable_dnsname(out: &mut String, name: &str) {
    if name.is_empty() {
        // the DNS root zone.
        out.push('.');
        return;
    }
    let mut first = true;
    for label in name.split('.').rev() {
        if !first {
            out.push('.');
        }
        first = false;
        out.push_str(&hex::encode(label.to_ascii_lowercase()));
    }
}

/// Addresses become their raw bytes, a few host-bearing types collate on the
/// embedded name, everything else is hexified verbatim. Knowing what to sort
/// a TXT or SOA by is not worth guessing at.
fn sortable_rdatum(out: &mut String, rrtype: &str, rdatum: &str) {
    match rrtype {
        "A" => {
            let octets = rdatum
                .parse::<Ipv4Addr>()
                .map(|addr| addr.octets())
                .unwrap_or([0; 4]);
            out.push_str(&hex::encode(octets));
        }
        "AAAA" => {
            let octets = rdatum
                .parse::<Ipv6Addr>()
                .map(|addr| addr.octets())
                .unwrap_or([0; 16]);
            out.push_str(&hex::encode(octets));
        }
        "NS" | "PTR" | "CNAME" => sortable_dnsname(out, rdatum),
        "MX" | "RP" => match rdatum.rsplit_once(' ') {
            Some((_, host)) => sortable_dnsname(out, host),
            None => out.push_str(&hex::encode(rdatum)),
        },
        _ => out.push_str(&hex::encode(rdatum)),
    }
}

/// The external sort subprocess. It buffers its whole input before emitting
/// anything, so the writer can stream every record to stdin, close it, and
/// only then read the sorted output back without risking deadlock.
pub struct SortProc {
    child: Child,
    stdin: Option<ChildStdin>,
    killed: bool,
}

impl SortProc {
    pub fn spawn(spec: &SortSpec) -> Result<SortProc> {
        let args = spec.sort_args();
        tracing::debug!("spawning {SORT_PATH} -u {}", args.join(" "));
        let mut child = Command::new(SORT_PATH)
            .arg("-u")
            .args(&args)
            .env("LC_ALL", "C")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn {SORT_PATH}"))?;
        let stdin = child.stdin.take();
        Ok(SortProc {
            child,
            stdin,
            killed: false,
        })
    }

    /// Spool one record, prefixed with the five collation fields.
    pub async fn put_record(
        &mut self,
        first: u64,
        last: u64,
        count: u64,
        name_key: Option<String>,
        data_key: Option<String>,
        raw: &[u8],
    ) -> Result<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Ok(());
        };
        let prefix = format!(
            "{first} {last} {count} {} {} ",
            name_key.as_deref().unwrap_or("n/a"),
            data_key.as_deref().unwrap_or("n/a"),
        );
        stdin.write_all(prefix.as_bytes()).await?;
        stdin.write_all(raw).await?;
        stdin.write_all(b"\n").await?;
        Ok(())
    }

    /// Close stdin, read the sorted stream back, strip the collation prefix
    /// and present each surviving record. When the output cap is reached the
    /// subprocess is terminated once and the remainder drained to EOF, so it
    /// exits without taking a SIGPIPE.
    pub async fn finish(mut self, ctx: &Context) -> Result<u64> {
        drop(self.stdin.take());
        let stdout = self.child.stdout.take().context("sort stdout was lost")?;
        let mut lines = BufReader::new(stdout).lines();
        let mut presented: u64 = 0;
        while let Some(line) = lines.next_line().await? {
            if let Some(cap) = ctx.opts.output_limit {
                if presented >= cap {
                    if !self.killed {
                        tracing::debug!("hit output limit {cap}, terminating sort");
                        let _ = self.child.start_kill();
                        self.killed = true;
                    }
                    continue;
                }
            }
            let Some(rest) = strip_collation_prefix(&line) else {
                tracing::warn!("malformed sort output line '{line}'");
                continue;
            };
            match Tuple::from_json(rest.as_bytes()) {
                Ok(tup) => {
                    ctx.present(&tup, rest.as_bytes())?;
                    presented += 1;
                }
                Err(err) => tracing::warn!("could not parse sorted record: {err}"),
            }
        }
        let status = self.child.wait().await?;
        if !self.killed && !status.success() {
            tracing::warn!("sort exit status is {status}");
        }
        tracing::debug!("closed sort stdout, read {presented} objs");
        Ok(presented)
    }
}

/// Skip the five space-separated fields prefixed at spool time, leaving the
/// original record bytes.
fn strip_collation_prefix(line: &str) -> Option<&str> {
    let mut rest = line;
    for _ in 0..5 {
        let space = rest.find(' ')?;
        rest = rest[space..].trim_start_matches(' ');
    }
    Some(rest)
}
