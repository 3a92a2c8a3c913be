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

//! The only place that waits on the network: a set of in-flight reader
//! tasks, drained down to a requested level. Transport failures are reported
//! per class and make the whole run exit non-zero, but never abort the
//! remaining transfers.

use std::error::Error as _;
use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinSet;

use crate::context::Context;
use crate::reader::Reader;

/// Merge-mode fan-out cap while batch lines are still being added.
pub const MAX_JOBS: usize = 8;

pub struct IoEngine {
    tasks: JoinSet<Result<()>>,
    failed: bool,
}

impl IoEngine {
    pub fn new() -> IoEngine {
        IoEngine {
            tasks: JoinSet::new(),
            failed: false,
        }
    }

    pub fn launch(&mut self, reader: Reader, ctx: Arc<Context>) {
        self.tasks.spawn(reader.run(ctx));
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// True once any transfer has failed at the transport level.
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Run until at most `jobs` transfers remain in flight, reporting each
    /// completion that failed.
    pub async fn drain_until(&mut self, jobs: usize) {
        tracing::debug!("drain_until({jobs}), {} in flight", self.tasks.len());
        while self.tasks.len() > jobs {
            match self.tasks.join_next().await {
                None => break,
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(err))) => {
                    tracing::warn!("{}", classify(&err));
                    self.failed = true;
                }
                Some(Err(err)) => {
                    tracing::warn!("reader task failed: {err}");
                    self.failed = true;
                }
            }
        }
    }
}

impl Default for IoEngine {
    fn default() -> IoEngine {
        IoEngine::new()
    }
}

/// Map a failed transfer onto a class-specific diagnostic: name resolution,
/// connection, or other.
fn classify(err: &anyhow::Error) -> String {
    for cause in err.chain() {
        let Some(transport) = cause.downcast_ref::<reqwest::Error>() else {
            continue;
        };
        if transport.is_connect() {
            let mut source = transport.source();
            while let Some(cause) = source {
                let text = cause.to_string();
                if text.contains("dns") || text.contains("lookup") {
                    return "transfer failed: could not resolve host".to_string();
                }
                source = cause.source();
            }
            return "transfer failed: could not connect".to_string();
        }
        if transport.is_timeout() {
            return "transfer failed: timed out".to_string();
        }
        return format!("transfer failed: {transport}");
    }
    format!("{err:#}")
}
