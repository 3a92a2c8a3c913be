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

//! The long-lived invocation context: configuration, the selected back-end,
//! verb and presentation, sort keys, the HTTP client, and the output stream.
//! Passing this one value through the pipeline keeps the single-query and
//! batch paths symmetric, and lets tests capture the output.

use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;

use anyhow::{anyhow, Context as _, Result};

use crate::backend::{Backend, Verb};
use crate::config::Config;
use crate::present::Presenter;
use crate::sort::SortSpec;
use crate::tuple::Tuple;

/// Knobs that apply to every query of the invocation.
#[derive(Clone, Debug, Default)]
pub struct GlobalOpts {
    pub verb: Verb,
    pub complete: bool,
    pub quiet: bool,
    pub gravel: bool,
    pub donotverify: bool,
    pub iso8601: bool,
    pub query_limit: Option<u64>,
    pub output_limit: Option<u64>,
    pub offset: u64,
    pub max_count: Option<u64>,
}

pub struct Context {
    pub config: Config,
    pub backend: Box<dyn Backend>,
    pub opts: GlobalOpts,
    pub sort: SortSpec,
    pub presenter: Presenter,
    pub http: reqwest::Client,
    out: Mutex<Box<dyn Write + Send>>,
    pub csv_headers_done: AtomicBool,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("opts", &self.opts)
            .field("sort", &self.sort)
            .field("presenter", &self.presenter)
            .field("csv_headers_done", &self.csv_headers_done)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn new(
        config: Config,
        backend: Box<dyn Backend>,
        opts: GlobalOpts,
        sort: SortSpec,
        presenter: Presenter,
    ) -> Result<Context> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(opts.donotverify)
            .build()
            .context("failed to build the HTTP client")?;
        Ok(Context {
            config,
            backend,
            opts,
            sort,
            presenter,
            http,
            out: Mutex::new(Box::new(std::io::stdout())),
            csv_headers_done: AtomicBool::new(false),
        })
    }

    /// Redirect record and framing output, e.g. into a test buffer.
    pub fn with_output(mut self, out: Box<dyn Write + Send>) -> Context {
        self.out = Mutex::new(out);
        self
    }

    /// Render one record through the selected presenter.
    pub fn present(&self, tup: &Tuple, raw: &[u8]) -> Result<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow!("output stream poisoned"))?;
        self.presenter.present(tup, raw, self, &mut **out)
    }

    /// Emit framing or passthrough text on the record stream.
    pub fn write_out(&self, text: &str) -> Result<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow!("output stream poisoned"))?;
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    pub fn flush_out(&self) -> Result<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow!("output stream poisoned"))?;
        out.flush()?;
        Ok(())
    }
}
