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

//! The command-line surface, and the reconciliation of its many
//! interrelated options into one validated invocation.

use anyhow::{anyhow, bail, Result};
use clap::{ArgAction, Parser, ValueEnum};

use crate::backend::{find_system, Verb, DEFAULT_SYSTEM};
use crate::batch::Batching;
use crate::config::Config;
use crate::context::{Context, GlobalOpts};
use crate::present::{Format, Presenter};
use crate::query::{escape, Mode, Query};
use crate::sort::{SortOrder, SortSpec};
use crate::time::time_get;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Dns,
    Text,
    Json,
    Csv,
}

/// Query passive-DNS services.
#[derive(Debug, Parser)]
#[command(name = "pdnsq", author, about, disable_version_flag = true)]
pub struct Cli {
    /// rrset query by owner name: OWNER[/TYPE[/BAILIWICK]]
    #[arg(short = 'r', value_name = "OWNER")]
    pub rrset: Option<String>,
    /// rdata query by resource-data name: NAME[/TYPE]
    #[arg(short = 'n', value_name = "NAME")]
    pub rdata_name: Option<String>,
    /// rdata query by IP address or prefix: IP[/PFXLEN]
    #[arg(short = 'i', value_name = "IP")]
    pub rdata_ip: Option<String>,
    /// rdata query by raw hex pairs: HEX[/TYPE]
    #[arg(short = 'N', value_name = "HEX")]
    pub raw_rdata: Option<String>,
    /// rrset query by raw hex pairs: HEX[/TYPE[/BAILIWICK]]
    #[arg(short = 'R', value_name = "HEX")]
    pub raw_rrset: Option<String>,

    /// restrict results to this resource record type
    #[arg(short = 't', value_name = "RRTYPE")]
    pub rrtype: Option<String>,
    /// restrict results to this bailiwick
    #[arg(short = 'b', value_name = "BAILIWICK")]
    pub bailiwick: Option<String>,

    /// only results seen after this time
    #[arg(short = 'A', value_name = "WHEN")]
    pub after: Option<String>,
    /// only results seen before this time
    #[arg(short = 'B', value_name = "WHEN")]
    pub before: Option<String>,
    /// complete (strict) time matching: the whole interval must fit the fence
    #[arg(short = 'c')]
    pub complete: bool,

    /// server-side result limit
    #[arg(short = 'l', value_name = "LIMIT")]
    pub query_limit: Option<u64>,
    /// client-side output cap
    #[arg(short = 'L', value_name = "LIMIT")]
    pub output_limit: Option<u64>,
    /// end a summarize operation when the count exceeds this threshold
    #[arg(short = 'M', value_name = "COUNT")]
    pub max_count: Option<u64>,
    /// skip this many results in what is returned
    #[arg(short = 'O', value_name = "OFFSET", default_value_t = 0)]
    pub offset: u64,

    /// sort output in ascending order
    #[arg(short = 's', overrides_with_all = ["ascending", "descending"])]
    pub ascending: bool,
    /// sort output in descending order
    #[arg(short = 'S', overrides_with_all = ["ascending", "descending"])]
    pub descending: bool,
    /// sort keys, from: first, last, count, name, data
    #[arg(short = 'k', value_name = "KEYS", value_delimiter = ',')]
    pub keys: Vec<String>,

    /// presentation format
    #[arg(short = 'p', value_name = "FORMAT", value_enum)]
    pub format: Option<FormatArg>,
    /// synonym for -p json
    #[arg(short = 'j')]
    pub json: bool,

    /// batch mode, reading query lines from stdin; repeat for verbose framing
    #[arg(short = 'f', action = ArgAction::Count)]
    pub batch: u8,
    /// with -f, merge all answers into a single result
    #[arg(short = 'm')]
    pub merge: bool,
    /// read newline-separated JSON from this file ('-' for stdin), no network
    #[arg(short = 'J', value_name = "FILE")]
    pub json_input: Option<String>,

    /// passive-DNS system to query
    #[arg(short = 'u', value_name = "SYSTEM")]
    pub system: Option<String>,
    /// operation verb: lookup or summarize
    #[arg(short = 'V', value_name = "VERB")]
    pub verb: Option<String>,
    /// show a system-specific account/key summary
    #[arg(short = 'I')]
    pub info: bool,

    /// request un-aggregated (graveled) results
    #[arg(short = 'g')]
    pub gravel: bool,
    /// raise diagnostic verbosity; repeatable
    #[arg(short = 'd', action = ArgAction::Count)]
    pub debug: u8,
    /// warning reticence
    #[arg(short = 'q')]
    pub quiet: bool,
    /// do not verify TLS certificates
    #[arg(short = 'U')]
    pub donotverify: bool,
    /// print the program version
    #[arg(short = 'v', long = "version")]
    pub version: bool,
}

#[derive(Debug)]
pub enum Action {
    Query(Query),
    Batch { batching: Batching, merge: bool },
    Ruminate { source: String },
    Info,
}

#[derive(Debug)]
pub struct Invocation {
    pub action: Action,
    pub after: u64,
    pub before: u64,
    pub ctx: Context,
}

impl Cli {
    /// Reconcile the parsed options into one validated invocation, or fail
    /// with a one-line usage diagnostic.
    pub fn into_invocation(self) -> Result<Invocation> {
        let iso8601 = std::env::var("DNSDBQ_TIME_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("iso"))
            .unwrap_or(false);

        let after = match &self.after {
            Some(src) => match time_get(src) {
                Ok(t) if t != 0 => t,
                _ => bail!("bad -A timestamp: '{src}'"),
            },
            None => 0,
        };
        let before = match &self.before {
            Some(src) => match time_get(src) {
                Ok(t) if t != 0 => t,
                _ => bail!("bad -B timestamp: '{src}'"),
            },
            None => 0,
        };

        // at most one of the mutually-exclusive search modes.
        let mut selected: Vec<(Mode, char, String)> = Vec::new();
        if let Some(value) = self.rrset {
            selected.push((Mode::RrsetName, 'r', value));
        }
        if let Some(value) = self.rdata_name {
            selected.push((Mode::RdataName, 'n', value));
        }
        if let Some(value) = self.rdata_ip {
            selected.push((Mode::RdataIp, 'i', value));
        }
        if let Some(value) = self.raw_rdata {
            selected.push((Mode::RdataRaw, 'N', value));
        }
        if let Some(value) = self.raw_rrset {
            selected.push((Mode::RrsetRaw, 'R', value));
        }
        if selected.len() > 1 {
            bail!("-r, -n, -i, -N, or -R can only appear once");
        }

        // crack embedded /TYPE[/BAILIWICK] (or /PFXLEN for -i) qualifiers.
        let mut thing = None;
        let mut rrtype = self.rrtype;
        let mut bailiwick = self.bailiwick;
        let mut pfxlen = None;
        let mode = match selected.pop() {
            None => None,
            Some((mode, flag, value)) => {
                if mode == Mode::RdataIp {
                    match value.split_once('/') {
                        Some((addr, pfx)) => {
                            thing = Some(addr.to_string());
                            pfxlen = Some(pfx.to_string());
                        }
                        None => thing = Some(value),
                    }
                } else if let Some((head, qualifiers)) = value.split_once('/') {
                    if rrtype.is_some() || bailiwick.is_some() {
                        bail!("if -b or -t are specified then -{flag} cannot contain a slash");
                    }
                    match qualifiers.split_once('/') {
                        Some((embedded_type, embedded_bailiwick)) => {
                            rrtype = Some(embedded_type.to_string());
                            bailiwick = Some(embedded_bailiwick.to_string());
                        }
                        None => rrtype = Some(qualifiers.to_string()),
                    }
                    thing = Some(head.to_string());
                } else {
                    thing = Some(value);
                }
                Some(mode)
            }
        };

        let verb = match self.verb.as_deref() {
            None => Verb::Lookup,
            Some(name) => {
                Verb::parse(name).ok_or_else(|| anyhow!("Unsupported verb for -V argument"))?
            }
        };
        let system_name = self.system.as_deref().unwrap_or(DEFAULT_SYSTEM);
        let backend =
            find_system(system_name).ok_or_else(|| anyhow!("-u must refer to a pdns system"))?;
        let nondefault_system = !system_name.eq_ignore_ascii_case(DEFAULT_SYSTEM);

        let format = if self.json {
            Format::Json
        } else {
            match self.format.unwrap_or(FormatArg::Dns) {
                FormatArg::Dns | FormatArg::Text => Format::Text,
                FormatArg::Json => Format::Json,
                FormatArg::Csv => Format::Csv,
            }
        };

        if self.output_limit == Some(0) {
            bail!("-L must be positive");
        }
        if self.max_count == Some(0) {
            bail!("-M must be positive");
        }
        let mut output_limit = self.output_limit;
        if output_limit.is_none() && self.query_limit.is_some() && !self.merge {
            output_limit = self.query_limit;
        }

        let mut order = if self.descending {
            SortOrder::Descending
        } else if self.ascending {
            SortOrder::Ascending
        } else {
            SortOrder::None
        };

        if let Some(thing) = &thing {
            tracing::debug!("thing = '{thing}'");
        }
        if let Some(rrtype) = &rrtype {
            tracing::debug!("type = '{rrtype}'");
        }
        if let Some(bailiwick) = &bailiwick {
            tracing::debug!("bailiwick = '{bailiwick}'");
        }

        if after != 0 && before != 0 {
            if after > before {
                bail!("-A -B requires after <= before (for now)");
            }
            if order == SortOrder::None
                && self.json_input.is_none()
                && !self.complete
                && !self.quiet
            {
                tracing::warn!(
                    "-A and -B w/o -c requires sorting for dedup, so turning on -S here."
                );
                order = SortOrder::Descending;
            }
        }
        if self.complete && after == 0 && before == 0 {
            bail!("-c without -A or -B makes no sense.");
        }

        let batching = match self.batch {
            0 => None,
            1 => Some(Batching::Original),
            2 => Some(Batching::Verbose),
            _ => bail!("too many -f options"),
        };
        if self.merge {
            match batching {
                None => bail!("using -m without -f makes no sense."),
                Some(Batching::Verbose) => {
                    bail!("using -m with more than one -f makes no sense.")
                }
                Some(Batching::Original) => {}
            }
        }

        if !self.keys.is_empty() && order == SortOrder::None {
            bail!("using -k without -s or -S makes no sense.");
        }
        let mut sort = SortSpec::new(order);
        for token in &self.keys {
            sort.add_key(token).map_err(|msg| anyhow!(msg))?;
        }
        if sort.enabled() {
            // all five keys must be present for -u to dedup whole prefixes.
            sort.fill_missing();
        }

        match verb {
            Verb::Lookup => {
                if self.max_count.is_some() {
                    bail!("max_count only allowed for a summarize verb");
                }
            }
            Verb::Summarize => {
                if sort.enabled() {
                    bail!("Sorting with a summarize verb makes no sense");
                }
            }
        }
        backend.validate_verb(verb)?;
        let presenter = Presenter::select(format, verb);

        let action = if let Some(source) = self.json_input {
            if mode.is_some() {
                bail!("can't mix -n, -r, -i, or -R with -J");
            }
            if batching.is_some() {
                bail!("can't mix -f with -J");
            }
            if bailiwick.is_some() {
                bail!("can't mix -b with -J");
            }
            if self.info {
                bail!("can't mix -I with -J");
            }
            if rrtype.is_some() {
                bail!("can't mix -t with -J");
            }
            if verb != Verb::Lookup {
                bail!("can't mix -V with -J");
            }
            if nondefault_system {
                bail!("can't mix -u with -J");
            }
            if self.max_count.is_some() {
                bail!("can't mix -M with -J");
            }
            if self.gravel {
                bail!("can't mix -g with -J");
            }
            if self.offset != 0 {
                bail!("can't mix -O with -J");
            }
            Action::Ruminate { source }
        } else if let Some(batching) = batching {
            if mode.is_some() {
                bail!("can't mix -n, -r, -i, or -R with -f");
            }
            if bailiwick.is_some() {
                bail!("can't mix -b with -f");
            }
            if rrtype.is_some() {
                bail!("can't mix -t with -f");
            }
            if self.info {
                bail!("can't mix -I with -f");
            }
            Action::Batch {
                batching,
                merge: self.merge,
            }
        } else if self.info {
            if mode.is_some() {
                bail!("can't mix -n, -r, -i, or -R with -I");
            }
            if format == Format::Csv {
                bail!("info must be presented in json or text format");
            }
            if bailiwick.is_some() {
                bail!("can't mix -b with -I");
            }
            if rrtype.is_some() {
                bail!("can't mix -t with -I");
            }
            Action::Info
        } else {
            let Some(mode) = mode else {
                bail!("must specify -r, -n, -i, or -R unless -f or -J is used");
            };
            if bailiwick.is_some() {
                match mode {
                    Mode::RdataIp => bail!("can't mix -b with -i"),
                    Mode::RrsetRaw => bail!("can't mix -b with -R"),
                    Mode::RdataRaw => bail!("can't mix -b with -N"),
                    Mode::RdataName => bail!("can't mix -b with -n"),
                    Mode::RrsetName => {}
                }
            }
            if mode == Mode::RdataIp && rrtype.is_some() {
                bail!("can't mix -i with -t");
            }
            let thing = thing.ok_or_else(|| anyhow!("missing query value"))?;
            Action::Query(Query {
                mode,
                thing: escape(&thing),
                rrtype: rrtype.as_deref().map(escape),
                bailiwick: bailiwick.as_deref().map(escape),
                pfxlen: pfxlen.as_deref().map(escape),
                after,
                before,
            })
        };

        let opts = GlobalOpts {
            verb,
            complete: self.complete,
            quiet: self.quiet,
            gravel: self.gravel,
            donotverify: self.donotverify,
            iso8601,
            query_limit: self.query_limit,
            output_limit,
            offset: self.offset,
            max_count: self.max_count,
        };

        // the offline path has no use for server credentials.
        let config = if matches!(action, Action::Ruminate { .. }) {
            Config::default()
        } else {
            Config::load()
        };

        let ctx = Context::new(config, backend, opts, sort, presenter)?;
        Ok(Invocation {
            action,
            after,
            before,
            ctx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(args: &[&str]) -> Result<Invocation> {
        let mut full = vec!["pdnsq"];
        full.extend_from_slice(args);
        Cli::try_parse_from(full).unwrap().into_invocation()
    }

    fn query_of(inv: Invocation) -> Query {
        match inv.action {
            Action::Query(q) => q,
            _ => panic!("expected a single-query action"),
        }
    }

    #[test]
    fn embedded_qualifiers_are_cracked() {
        let q = query_of(invocation(&["-r", "example.com/NS/com."]).unwrap());
        assert_eq!(q.mode, Mode::RrsetName);
        assert_eq!(q.thing, "example.com");
        assert_eq!(q.rrtype.as_deref(), Some("NS"));
        assert_eq!(q.bailiwick.as_deref(), Some("com."));

        let q = query_of(invocation(&["-i", "198.51.100.0/24"]).unwrap());
        assert_eq!(q.mode, Mode::RdataIp);
        assert_eq!(q.pfxlen.as_deref(), Some("24"));

        let err = invocation(&["-r", "example.com/NS", "-t", "A"]).unwrap_err();
        assert!(err
            .to_string()
            .contains("-r cannot contain a slash"));
    }

    #[test]
    fn query_components_are_escaped_once() {
        let q = query_of(invocation(&["-r", "a b.com"]).unwrap());
        assert_eq!(q.thing, "a%20b.com");
    }

    #[test]
    fn mode_flags_are_mutually_exclusive() {
        let err = invocation(&["-r", "a.com", "-n", "b.com"]).unwrap_err();
        assert!(err.to_string().contains("can only appear once"));
    }

    #[test]
    fn fence_rules() {
        let err = invocation(&["-r", "a.com", "-A", "200", "-B", "100"]).unwrap_err();
        assert!(err.to_string().contains("after <= before"));
        let err = invocation(&["-r", "a.com", "-c"]).unwrap_err();
        assert!(err.to_string().contains("-c without -A or -B"));
        let err = invocation(&["-r", "a.com", "-A", "nonsense"]).unwrap_err();
        assert!(err.to_string().contains("bad -A timestamp"));
    }

    #[test]
    fn loose_two_sided_fence_turns_on_sorting() {
        let inv = invocation(&["-r", "a.com", "-A", "100", "-B", "200"]).unwrap();
        assert!(inv.ctx.sort.enabled());
        assert_eq!(inv.ctx.sort.order(), SortOrder::Descending);
        // -q suppresses the auto-enable along with the warning.
        let inv = invocation(&["-r", "a.com", "-A", "100", "-B", "200", "-q"]).unwrap();
        assert!(!inv.ctx.sort.enabled());
        // -c needs no dedup sort.
        let inv = invocation(&["-r", "a.com", "-A", "100", "-B", "200", "-c"]).unwrap();
        assert!(!inv.ctx.sort.enabled());
    }

    #[test]
    fn merge_and_key_rules() {
        let err = invocation(&["-m"]).unwrap_err();
        assert!(err.to_string().contains("-m without -f"));
        let err = invocation(&["-m", "-f", "-f"]).unwrap_err();
        assert!(err.to_string().contains("more than one -f"));
        let err = invocation(&["-r", "a.com", "-k", "name"]).unwrap_err();
        assert!(err.to_string().contains("-k without -s or -S"));
        let err = invocation(&["-r", "a.com", "-s", "-k", "name,name"]).unwrap_err();
        assert!(err.to_string().contains("only be specified once"));
        let err = invocation(&["-r", "a.com", "-s", "-k", "middle"]).unwrap_err();
        assert!(err.to_string().contains("key must be one of"));
    }

    #[test]
    fn bailiwick_goes_with_rrset_modes_only() {
        let err = invocation(&["-i", "198.51.100.1", "-b", "com."]).unwrap_err();
        assert!(err.to_string().contains("can't mix -b with -i"));
        let err = invocation(&["-n", "a.com", "-b", "com."]).unwrap_err();
        assert!(err.to_string().contains("can't mix -b with -n"));
        let err = invocation(&["-i", "198.51.100.1", "-t", "A"]).unwrap_err();
        assert!(err.to_string().contains("can't mix -i with -t"));
    }

    #[test]
    fn json_input_excludes_network_options() {
        let err = invocation(&["-J", "x.json", "-r", "a.com"]).unwrap_err();
        assert!(err.to_string().contains("with -J"));
        let err = invocation(&["-J", "x.json", "-f"]).unwrap_err();
        assert!(err.to_string().contains("can't mix -f with -J"));
        let err = invocation(&["-J", "x.json", "-u", "circl"]).unwrap_err();
        assert!(err.to_string().contains("can't mix -u with -J"));
        let err = invocation(&["-J", "x.json", "-O", "5"]).unwrap_err();
        assert!(err.to_string().contains("can't mix -O with -J"));
        // -J with sorting is fine.
        let inv = invocation(&["-J", "x.json", "-s"]).unwrap();
        assert!(matches!(inv.action, Action::Ruminate { .. }));
    }

    #[test]
    fn summarize_rules() {
        let err =
            invocation(&["-r", "a.com", "-V", "summarize", "-s"]).unwrap_err();
        assert!(err.to_string().contains("Sorting with a summarize verb"));
        let err = invocation(&["-r", "a.com", "-M", "100"]).unwrap_err();
        assert!(err.to_string().contains("summarize verb"));
        let inv = invocation(&["-r", "a.com", "-V", "summarize", "-M", "100"]).unwrap();
        assert_eq!(inv.ctx.presenter, Presenter::TextSummarize);
        let err = invocation(&["-r", "a.com", "-u", "circl", "-V", "summarize"]).unwrap_err();
        assert!(err.to_string().contains("not supported by circl"));
    }

    #[test]
    fn output_limit_defaults_to_query_limit() {
        let inv = invocation(&["-r", "a.com", "-l", "10"]).unwrap();
        assert_eq!(inv.ctx.opts.output_limit, Some(10));
        let inv = invocation(&["-f", "-m", "-l", "10"]).unwrap();
        assert_eq!(inv.ctx.opts.output_limit, None);
        let err = invocation(&["-r", "a.com", "-L", "0"]).unwrap_err();
        assert!(err.to_string().contains("-L must be positive"));
    }
}
