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

//! The sink for one logical query. A writer owns the time-fence defaults for
//! its readers, counts accepted records, remembers the first abnormal status
//! any reader observed, and feeds records to either the presenter or the
//! sort subprocess.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;

use crate::context::Context;
use crate::sort::{sortable_rdata, sortable_rrname, SortProc};
use crate::time::time_str;
use crate::tuple::{fence_verdict, Tuple};

/// First abnormal status observed on a writer; label and message travel
/// together or not at all.
#[derive(Clone, Debug)]
pub struct Status {
    pub label: String,
    pub message: String,
}

enum Sink {
    Direct,
    Sort(SortProc),
}

pub struct Writer {
    pub after: u64,
    pub before: u64,
    sink: Sink,
    pub count: u64,
    status: Option<Status>,
    /// Set once the first non-success response has been reported, so later
    /// readers on the same writer stay silent.
    pub once: bool,
}

/// Readers run as tasks and share their writer.
pub type SharedWriter = Arc<Mutex<Writer>>;

/// What became of one record offered to the writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    Accepted,
    Skipped,
    /// The unsorted output cap is in force; the reader should stop offering
    /// records but let its transfer run out.
    Capped,
}

impl Writer {
    pub fn init(ctx: &Context, after: u64, before: u64) -> Result<SharedWriter> {
        let sink = if ctx.sort.enabled() {
            Sink::Sort(SortProc::spawn(&ctx.sort)?)
        } else {
            Sink::Direct
        };
        Ok(Arc::new(Mutex::new(Writer {
            after,
            before,
            sink,
            count: 0,
            status: None,
            once: false,
        })))
    }

    /// Record a status; only the first one sticks.
    pub fn set_status(&mut self, label: &str, message: &str) {
        if self.status.is_none() {
            self.status = Some(Status {
                label: label.to_string(),
                message: message.to_string(),
            });
        }
    }

    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    /// Run one deframed record through parse, fence, cap, and sink.
    pub async fn input_record(&mut self, raw: &[u8], ctx: &Context) -> Result<Disposition> {
        if matches!(self.sink, Sink::Direct) {
            if let Some(cap) = ctx.opts.output_limit {
                if self.count >= cap {
                    tracing::debug!("hit output limit {cap}");
                    return Ok(Disposition::Capped);
                }
            }
        }

        let tup = match Tuple::from_json(raw) {
            Ok(tup) => tup,
            Err(err) => {
                tracing::warn!("could not parse record: {err}");
                return Ok(Disposition::Skipped);
            }
        };

        let (first, last) = tup.interval();
        tracing::trace!(
            "filtering F..L = {} .. {} against A..B = {} .. {}",
            time_str(first, ctx.opts.iso8601),
            time_str(last, ctx.opts.iso8601),
            time_str(self.after, ctx.opts.iso8601),
            time_str(self.before, ctx.opts.iso8601),
        );
        if let Some(whynot) = fence_verdict(first, last, self.after, self.before, ctx.opts.complete)
        {
            tracing::debug!("skipped ({whynot})");
            return Ok(Disposition::Skipped);
        }

        match &mut self.sink {
            Sink::Direct => ctx.present(&tup, raw)?,
            Sink::Sort(sort) => {
                let name_key = if ctx.sort.by_name {
                    sortable_rrname(&tup)
                } else {
                    None
                };
                let data_key = if ctx.sort.by_data {
                    sortable_rdata(&tup)
                } else {
                    None
                };
                sort.put_record(first, last, tup.count, name_key, data_key, raw)
                    .await?;
            }
        }
        self.count += 1;
        Ok(Disposition::Accepted)
    }

    /// Stop the writer. With a sort sink this is where the subprocess's
    /// stdin closes and its sorted output is read back and presented.
    pub async fn finish(writer: SharedWriter, ctx: &Context) -> Result<()> {
        let sink = {
            let mut writer = writer.lock().await;
            tracing::debug!("finishing writer, wrote {} objs", writer.count);
            std::mem::replace(&mut writer.sink, Sink::Direct)
        };
        if let Sink::Sort(sort) = sink {
            sort.finish(ctx).await?;
        }
        ctx.flush_out()?;
        Ok(())
    }
}
