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

//! Back-end credentials and base URLs, discovered from a shell-assignment
//! style configuration file and overridden by the environment. Missing keys
//! are not fatal; unauthenticated requests simply fail at the back-end.

use std::env;
use std::path::PathBuf;

/// Searched in order; the first readable file wins.
const CONF_FILES: [&str; 4] = [
    "~/.isc-dnsdb-query.conf",
    "~/.dnsdb-query.conf",
    "/etc/isc-dnsdb-query.conf",
    "/etc/dnsdb-query.conf",
];

#[derive(Clone, Debug, Default)]
pub struct Config {
    pub api_key: Option<String>,
    pub dnsdb_server: Option<String>,
    pub circl_auth: Option<String>,
    pub circl_server: Option<String>,
}

impl Config {
    pub fn load() -> Config {
        let mut config = Config::default();
        for conf in CONF_FILES {
            let path = expand_tilde(conf);
            if let Ok(text) = std::fs::read_to_string(&path) {
                tracing::debug!("conf found: '{}'", path.display());
                config.apply_file(&text);
                break;
            }
        }
        config.apply_env();
        config
    }

    fn apply_file(&mut self, text: &str) {
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = unquote(value.trim()).to_string();
            match key.trim() {
                "APIKEY" => self.api_key = Some(value),
                "DNSDB_SERVER" => self.dnsdb_server = Some(value),
                "CIRCL_AUTH" => self.circl_auth = Some(value),
                "CIRCL_SERVER" => self.circl_server = Some(value),
                // other assignments in the file are none of our business.
                _ => {}
            }
        }
    }

    fn apply_env(&mut self) {
        if let Ok(value) = env::var("DNSDB_API_KEY") {
            self.api_key = Some(value);
        }
        if let Ok(value) = env::var("DNSDB_SERVER") {
            self.dnsdb_server = Some(value);
        }
        if let Ok(value) = env::var("CIRCL_AUTH") {
            self.circl_auth = Some(value);
        }
        if let Ok(value) = env::var("CIRCL_SERVER") {
            self.circl_server = Some(value);
        }
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => match env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(rest),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}
