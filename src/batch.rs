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

//! Batch mode: one query per input line. Each line gets its own writer and
//! output framing, unless merging, in which case every line feeds a single
//! shared writer and the engine keeps at most `MAX_JOBS` transfers going
//! while lines are still arriving.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::context::Context;
use crate::engine::{IoEngine, MAX_JOBS};
use crate::planner::query_launcher;
use crate::query::batch_parse;
use crate::writer::Writer;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Batching {
    /// `--` between per-line outputs.
    Original,
    /// `++ <line>` before and `-- <status> (<message>)` after each line.
    Verbose,
}

pub async fn do_batch(
    input: impl AsyncBufRead + Unpin,
    batching: Batching,
    merge: bool,
    after: u64,
    before: u64,
    ctx: &Arc<Context>,
    engine: &mut IoEngine,
) -> Result<()> {
    let merged_writer = if merge {
        Some(Writer::init(ctx, after, before)?)
    } else {
        None
    };

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        tracing::debug!("batch line ({line})");

        let writer = match &merged_writer {
            Some(writer) => writer.clone(),
            None => {
                // only verbose batching shows query startups.
                if batching == Batching::Verbose {
                    ctx.write_out(&format!("++ {line}\n"))?;
                }
                Writer::init(ctx, after, before)?
            }
        };

        match batch_parse(&line) {
            Err(msg) => writer.lock().await.set_status("PARSE", msg),
            Ok(mut q) => {
                // batch lines inherit the invocation's fence defaults.
                if q.after == 0 {
                    q.after = after;
                }
                if q.before == 0 {
                    q.before = before;
                }
                query_launcher(&q, &writer, ctx, engine)?;
                if merge {
                    engine.drain_until(MAX_JOBS).await;
                } else {
                    engine.drain_until(0).await;
                }
            }
        }

        let status = {
            let writer = writer.lock().await;
            writer
                .status()
                .map(|status| (status.label.clone(), status.message.clone()))
        };
        if let Some((label, message)) = &status {
            if batching != Batching::Verbose {
                tracing::warn!("batch line status: {label} ({message})");
            }
        }

        if !merge {
            // a sorted writer emits on finish, so finish before framing.
            Writer::finish(writer, ctx).await?;
            match batching {
                Batching::Original => ctx.write_out("--\n")?,
                Batching::Verbose => {
                    let (label, message) =
                        status.unwrap_or(("NOERROR".to_string(), "no error".to_string()));
                    ctx.write_out(&format!("-- {label} ({message})\n"))?;
                }
            }
        }
    }

    if let Some(writer) = merged_writer {
        engine.drain_until(0).await;
        Writer::finish(writer, ctx).await?;
    }
    Ok(())
}
