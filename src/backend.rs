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

//! Passive-DNS back-ends. Each adapter knows how to turn a RESTful path
//! fragment into a full URL, which credentials to attach, and how to label a
//! non-success HTTP status; the query pipeline is otherwise agnostic.

use anyhow::{anyhow, bail, Result};
use reqwest::header::ACCEPT;
use reqwest::{RequestBuilder, StatusCode};

use crate::config::Config;
use crate::context::{Context, GlobalOpts};

pub const DEFAULT_SYSTEM: &str = "dnsdb";

/// The operation family to run against the back-end.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Verb {
    #[default]
    Lookup,
    Summarize,
}

impl Verb {
    pub fn parse(name: &str) -> Option<Verb> {
        if name.eq_ignore_ascii_case("lookup") {
            Some(Verb::Lookup)
        } else if name.eq_ignore_ascii_case("summarize") {
            Some(Verb::Summarize)
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Verb::Lookup => "lookup",
            Verb::Summarize => "summarize",
        }
    }

    pub fn url_fragment(self) -> &'static str {
        match self {
            Verb::Lookup => "/lookup",
            Verb::Summarize => "/summarize",
        }
    }
}

pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Prepend the configured base to a path fragment. Returns the full URL
    /// and the separator the caller must use for its first added parameter.
    fn build_url(&self, path: &str, config: &Config, opts: &GlobalOpts) -> Result<(String, char)>;

    /// Attach whatever credentials this back-end requires.
    fn attach_auth(&self, request: RequestBuilder, config: &Config) -> RequestBuilder;

    /// A human label for a non-success HTTP status.
    fn status_label(&self, status: StatusCode) -> &'static str;

    /// Reject unsupported verb/back-end combinations before any work starts.
    fn validate_verb(&self, verb: Verb) -> Result<()>;

    /// The account/key summary endpoint, if this back-end has one.
    fn info_url(&self, config: &Config) -> Option<String>;
}

pub fn find_system(name: &str) -> Option<Box<dyn Backend>> {
    if name.eq_ignore_ascii_case("dnsdb") {
        Some(Box::new(Dnsdb))
    } else if name.eq_ignore_ascii_case("circl") {
        Some(Box::new(Circl))
    } else {
        None
    }
}

pub struct Dnsdb;

const DNSDB_BASE_URL: &str = "https://api.dnsdb.info";

impl Dnsdb {
    fn base<'c>(config: &'c Config) -> &'c str {
        config.dnsdb_server.as_deref().unwrap_or(DNSDB_BASE_URL)
    }
}

impl Backend for Dnsdb {
    fn name(&self) -> &'static str {
        "dnsdb"
    }

    fn build_url(&self, path: &str, config: &Config, opts: &GlobalOpts) -> Result<(String, char)> {
        let mut url = format!("{}{}/{path}", Self::base(config), opts.verb.url_fragment());
        let mut sep = '?';
        if opts.gravel {
            url.push(sep);
            url.push_str("aggr=f");
            sep = '&';
        }
        if opts.offset > 0 {
            url.push(sep);
            url.push_str(&format!("offset={}", opts.offset));
            sep = '&';
        }
        if opts.verb == Verb::Summarize {
            if let Some(max_count) = opts.max_count {
                url.push(sep);
                url.push_str(&format!("max_count={max_count}"));
                sep = '&';
            }
        }
        Ok((url, sep))
    }

    fn attach_auth(&self, request: RequestBuilder, config: &Config) -> RequestBuilder {
        match &config.api_key {
            Some(key) => request.header("X-API-Key", key),
            None => request,
        }
    }

    fn status_label(&self, status: StatusCode) -> &'static str {
        // dnsdb answers 404 when a query matches nothing at all.
        if status == StatusCode::NOT_FOUND {
            "NOERROR"
        } else {
            "ERROR"
        }
    }

    fn validate_verb(&self, _verb: Verb) -> Result<()> {
        Ok(())
    }

    fn info_url(&self, config: &Config) -> Option<String> {
        Some(format!("{}/lookup/rate_limit", Self::base(config)))
    }
}

pub struct Circl;

const CIRCL_BASE_URL: &str = "https://www.circl.lu/pdns/query";

impl Backend for Circl {
    fn name(&self) -> &'static str {
        "circl"
    }

    fn build_url(&self, path: &str, config: &Config, _opts: &GlobalOpts) -> Result<(String, char)> {
        let value = path
            .strip_prefix("rrset/name/")
            .or_else(|| path.strip_prefix("rdata/name/"))
            .or_else(|| path.strip_prefix("rdata/ip/"))
            .ok_or_else(|| anyhow!("unsupported type of query for circl"))?;
        if value.contains('/') {
            bail!("qualifiers are not supported by circl");
        }
        let base = config.circl_server.as_deref().unwrap_or(CIRCL_BASE_URL);
        Ok((format!("{base}/{value}"), '?'))
    }

    fn attach_auth(&self, request: RequestBuilder, config: &Config) -> RequestBuilder {
        match &config.circl_auth {
            Some(auth) => match auth.split_once(':') {
                Some((user, password)) => request.basic_auth(user, Some(password)),
                None => request.basic_auth(auth, None::<&str>),
            },
            None => request,
        }
    }

    fn status_label(&self, _status: StatusCode) -> &'static str {
        "ERROR"
    }

    fn validate_verb(&self, verb: Verb) -> Result<()> {
        match verb {
            Verb::Lookup => Ok(()),
            Verb::Summarize => bail!("verb 'summarize' is not supported by circl"),
        }
    }

    fn info_url(&self, _config: &Config) -> Option<String> {
        None
    }
}

/// Fetch and emit the back-end's account/key summary (`-I`). The body is
/// JSON either way, so it is passed through verbatim.
pub async fn request_info(ctx: &Context) -> Result<()> {
    let url = ctx
        .backend
        .info_url(&ctx.config)
        .ok_or_else(|| anyhow!("there is no 'info' for this service"))?;
    tracing::debug!("info url [{url}]");
    let request = ctx
        .backend
        .attach_auth(ctx.http.get(&url).header(ACCEPT, "application/json"), &ctx.config);
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;
    if status != StatusCode::OK {
        let first_line = body.lines().next().unwrap_or("");
        bail!(
            "info request failed: {} ({first_line})",
            ctx.backend.status_label(status)
        );
    }
    ctx.write_out(&body)?;
    if !body.ends_with('\n') {
        ctx.write_out("\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> GlobalOpts {
        GlobalOpts::default()
    }

    #[test]
    fn dnsdb_urls_carry_the_verb_fragment() {
        let config = Config::default();
        let (url, sep) = Dnsdb
            .build_url("rrset/name/example.com", &config, &opts())
            .unwrap();
        assert_eq!(url, "https://api.dnsdb.info/lookup/rrset/name/example.com");
        assert_eq!(sep, '?');
    }

    #[test]
    fn dnsdb_adapter_parameters_shift_the_separator() {
        let config = Config {
            dnsdb_server: Some("https://api.example.net".to_string()),
            ..Config::default()
        };
        let mut o = opts();
        o.gravel = true;
        o.offset = 100;
        let (url, sep) = Dnsdb.build_url("rdata/ip/198.51.100.0", &config, &o).unwrap();
        assert_eq!(
            url,
            "https://api.example.net/lookup/rdata/ip/198.51.100.0?aggr=f&offset=100"
        );
        assert_eq!(sep, '&');
    }

    #[test]
    fn dnsdb_max_count_is_summarize_only() {
        let config = Config::default();
        let mut o = opts();
        o.max_count = Some(200);
        let (url, _) = Dnsdb.build_url("rrset/name/x", &config, &o).unwrap();
        assert!(!url.contains("max_count"));
        o.verb = Verb::Summarize;
        let (url, sep) = Dnsdb.build_url("rrset/name/x", &config, &o).unwrap();
        assert_eq!(
            url,
            "https://api.dnsdb.info/summarize/rrset/name/x?max_count=200"
        );
        assert_eq!(sep, '&');
    }

    #[test]
    fn circl_takes_only_bare_name_queries() {
        let config = Config::default();
        let (url, sep) = Circl
            .build_url("rrset/name/example.com", &config, &opts())
            .unwrap();
        assert_eq!(url, "https://www.circl.lu/pdns/query/example.com");
        assert_eq!(sep, '?');
        assert!(Circl
            .build_url("rrset/name/example.com/A", &config, &opts())
            .is_err());
        assert!(Circl.build_url("rrset/raw/0b1000", &config, &opts()).is_err());
    }

    #[test]
    fn status_labels() {
        assert_eq!(Dnsdb.status_label(StatusCode::NOT_FOUND), "NOERROR");
        assert_eq!(Dnsdb.status_label(StatusCode::FORBIDDEN), "ERROR");
        assert_eq!(Circl.status_label(StatusCode::NOT_FOUND), "ERROR");
    }

    #[test]
    fn verbs() {
        assert_eq!(Verb::parse("LOOKUP"), Some(Verb::Lookup));
        assert_eq!(Verb::parse("summarize"), Some(Verb::Summarize));
        assert_eq!(Verb::parse("explode"), None);
        assert!(Circl.validate_verb(Verb::Summarize).is_err());
        assert!(Dnsdb.validate_verb(Verb::Summarize).is_ok());
    }
}
