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

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use pdnsq::backend::request_info;
use pdnsq::batch::do_batch;
use pdnsq::cli::{Action, Cli};
use pdnsq::engine::IoEngine;
use pdnsq::planner::pdns_query;
use pdnsq::reader::ruminate_json;
use tracing_subscriber::{
    filter::{
        EnvFilter,
        LevelFilter,
    },
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("pdnsq: version {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let default_level = if cli.quiet {
        LevelFilter::ERROR
    } else {
        match cli.debug {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .init();

    let invocation = cli.into_invocation()?;
    let ctx = Arc::new(invocation.ctx);
    let mut engine = IoEngine::new();

    match invocation.action {
        Action::Query(q) => pdns_query(&q, &ctx, &mut engine).await?,
        Action::Batch { batching, merge } => {
            do_batch(
                tokio::io::BufReader::new(tokio::io::stdin()),
                batching,
                merge,
                invocation.after,
                invocation.before,
                &ctx,
                &mut engine,
            )
            .await?;
        }
        Action::Ruminate { source } => {
            ruminate_json(&source, invocation.after, invocation.before, &ctx).await?;
        }
        Action::Info => request_info(&ctx).await?,
    }

    ctx.flush_out()?;
    if engine.failed() {
        std::process::exit(1);
    }
    Ok(())
}
