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

//! Turn one query plus its time fence into one or two concurrent back-end
//! requests. The subtle case is a two-sided fence without complete matching:
//! the back-end cannot express overlap, so two disjoint server queries are
//! issued and the record pipeline re-filters their union.

use std::sync::Arc;

use anyhow::Result;

use crate::context::Context;
use crate::engine::IoEngine;
use crate::query::Query;
use crate::reader::Reader;
use crate::writer::{SharedWriter, Writer};

/// Server-side time parameters for one request; zero means "not sent".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeFence {
    pub first_after: u64,
    pub first_before: u64,
    pub last_after: u64,
    pub last_before: u64,
}

/// The decomposition table for `(after, before, complete)`.
pub fn decompose(after: u64, before: u64, complete: bool) -> Vec<TimeFence> {
    let fence = TimeFence::default();
    if after != 0 && before != 0 {
        if complete {
            // each db tuple must be enveloped by the fence.
            vec![TimeFence {
                first_after: after,
                last_before: before,
                ..fence
            }]
        } else {
            // tuples that end after the fence starts, united with tuples
            // that begin before the fence ends; the receipt-side filter
            // winnows the union down to actual overlaps.
            vec![
                TimeFence {
                    last_after: after,
                    ..fence
                },
                TimeFence {
                    first_before: before,
                    ..fence
                },
            ]
        }
    } else if after != 0 {
        if complete {
            vec![TimeFence {
                first_after: after,
                ..fence
            }]
        } else {
            vec![TimeFence {
                last_after: after,
                ..fence
            }]
        }
    } else if before != 0 {
        if complete {
            vec![TimeFence {
                last_before: before,
                ..fence
            }]
        } else {
            vec![TimeFence {
                first_before: before,
                ..fence
            }]
        }
    } else {
        vec![fence]
    }
}

fn push_param(url: &mut String, sep: &mut char, key: &str, value: u64) {
    url.push(*sep);
    url.push_str(key);
    url.push('=');
    url.push_str(&value.to_string());
    *sep = '&';
}

/// Append the per-query limit and the time parameters to a base URL, using
/// the separator the back-end adapter handed out.
pub fn assemble_url(
    base: &str,
    mut sep: char,
    query_limit: Option<u64>,
    fence: &TimeFence,
) -> String {
    let mut url = base.to_string();
    if let Some(limit) = query_limit {
        push_param(&mut url, &mut sep, "limit", limit);
    }
    if fence.first_after != 0 {
        push_param(&mut url, &mut sep, "time_first_after", fence.first_after);
    }
    if fence.first_before != 0 {
        push_param(&mut url, &mut sep, "time_first_before", fence.first_before);
    }
    if fence.last_after != 0 {
        push_param(&mut url, &mut sep, "time_last_after", fence.last_after);
    }
    if fence.last_before != 0 {
        push_param(&mut url, &mut sep, "time_last_before", fence.last_before);
    }
    url
}

/// Start one or two readers on the writer for this query.
pub fn query_launcher(
    q: &Query,
    writer: &SharedWriter,
    ctx: &Arc<Context>,
    engine: &mut IoEngine,
) -> Result<()> {
    let path = q.path();
    let (base, sep) = ctx.backend.build_url(&path, &ctx.config, &ctx.opts)?;
    for fence in decompose(q.after, q.before, ctx.opts.complete) {
        let url = assemble_url(&base, sep, ctx.opts.query_limit, &fence);
        tracing::debug!("url [{url}]");
        engine.launch(Reader::new(url, writer.clone()), ctx.clone());
    }
    Ok(())
}

/// The non-batch path: one query, run to completion.
pub async fn pdns_query(q: &Query, ctx: &Arc<Context>, engine: &mut IoEngine) -> Result<()> {
    let writer = Writer::init(ctx, q.after, q.before)?;
    query_launcher(q, &writer, ctx, engine)?;
    engine.drain_until(0).await;
    Writer::finish(writer, ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_fence_is_one_bare_request() {
        assert_eq!(decompose(0, 0, false), vec![TimeFence::default()]);
        assert_eq!(decompose(0, 0, true), vec![TimeFence::default()]);
    }

    #[test]
    fn one_sided_fences_pick_the_matching_parameter() {
        assert_eq!(
            decompose(100, 0, false),
            vec![TimeFence {
                last_after: 100,
                ..TimeFence::default()
            }]
        );
        assert_eq!(
            decompose(100, 0, true),
            vec![TimeFence {
                first_after: 100,
                ..TimeFence::default()
            }]
        );
        assert_eq!(
            decompose(0, 200, false),
            vec![TimeFence {
                first_before: 200,
                ..TimeFence::default()
            }]
        );
        assert_eq!(
            decompose(0, 200, true),
            vec![TimeFence {
                last_before: 200,
                ..TimeFence::default()
            }]
        );
    }

    #[test]
    fn two_sided_complete_is_one_enveloping_request() {
        let fences = decompose(100, 200, true);
        assert_eq!(fences.len(), 1);
        let url = assemble_url("http://b/x", '?', None, &fences[0]);
        assert_eq!(url, "http://b/x?time_first_after=100&time_last_before=200");
    }

    #[test]
    fn two_sided_loose_splits_into_disjoint_requests() {
        let fences = decompose(100, 200, false);
        assert_eq!(fences.len(), 2);
        let urls: Vec<String> = fences
            .iter()
            .map(|fence| assemble_url("http://b/x", '?', None, fence))
            .collect();
        assert!(urls.contains(&"http://b/x?time_last_after=100".to_string()));
        assert!(urls.contains(&"http://b/x?time_first_before=200".to_string()));
        for url in &urls {
            assert!(!(url.contains("time_last_after") && url.contains("time_first_before")));
        }
    }

    #[test]
    fn limit_always_precedes_time_parameters() {
        let fences = decompose(100, 0, false);
        let url = assemble_url("http://b/x", '?', Some(10), &fences[0]);
        assert_eq!(url, "http://b/x?limit=10&time_last_after=100");
        // an adapter that already appended parameters hands out '&'.
        let url = assemble_url("http://b/x?aggr=f", '&', Some(0), &fences[0]);
        assert_eq!(url, "http://b/x?aggr=f&limit=0&time_last_after=100");
    }
}
