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

//! One HTTP transaction feeding one writer: stream the body, split it into
//! NDJSON records, and surface a non-success status exactly once per writer.
//! Also the offline variant that ruminates a JSON file instead of the
//! network.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::context::Context;
use crate::writer::{Disposition, SharedWriter, Writer};

/// Splits a byte stream on newlines. The buffer always holds the
/// unterminated suffix; bytes never followed by a newline are residue.
#[derive(Debug, Default)]
pub struct Deframer {
    buf: Vec<u8>,
}

impl Deframer {
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// The next complete record, without its newline.
    pub fn next_record(&mut self) -> Option<Vec<u8>> {
        let newline = self.buf.iter().position(|&b| b == b'\n')?;
        let mut record = {
            let rest = self.buf.split_off(newline + 1);
            std::mem::replace(&mut self.buf, rest)
        };
        record.pop();
        Some(record)
    }

    pub fn residue(&self) -> &[u8] {
        &self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

pub struct Reader {
    url: String,
    writer: SharedWriter,
}

impl Reader {
    pub fn new(url: String, writer: SharedWriter) -> Reader {
        Reader { url, writer }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Drive the transfer to completion. Transport failures propagate to the
    /// engine; back-end failures are recorded on the writer and the body is
    /// consumed as a message rather than as records.
    pub async fn run(self, ctx: Arc<Context>) -> Result<()> {
        tracing::debug!("reader launch [{}]", self.url);
        let request = ctx.backend.attach_auth(
            ctx.http.get(&self.url).header(ACCEPT, "application/json"),
            &ctx.config,
        );
        let response = request.send().await.context("transfer failed")?;
        let rcode = response.status();

        if rcode != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            let message = body.lines().next().unwrap_or("").to_string();
            let mut writer = self.writer.lock().await;
            if !writer.once {
                writer.once = true;
                writer.set_status(ctx.backend.status_label(rcode), &message);
                tracing::warn!("http {} [{}]", rcode.as_u16(), self.url);
                tracing::warn!("[{message}]");
            }
            return Ok(());
        }

        let mut stream = response.bytes_stream();
        let mut deframer = Deframer::default();
        let mut discarding = false;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("transfer failed")?;
            if discarding {
                // cap reached: drain the transfer without aborting it, so
                // the server side never sees a torn connection.
                continue;
            }
            deframer.push(&chunk);
            while let Some(record) = deframer.next_record() {
                let disposition = self
                    .writer
                    .lock()
                    .await
                    .input_record(&record, &ctx)
                    .await?;
                if disposition == Disposition::Capped {
                    discarding = true;
                    deframer.clear();
                    break;
                }
            }
        }
        if !deframer.residue().is_empty() {
            tracing::warn!("stranding {} octets!", deframer.residue().len());
        }
        Ok(())
    }
}

/// Process a file of newline-separated JSON, as from `-j` output, through
/// the very same record pipeline. Never touches the network.
pub async fn ruminate_json(source: &str, after: u64, before: u64, ctx: &Arc<Context>) -> Result<()> {
    let writer = Writer::init(ctx, after, before)?;
    let mut input: Box<dyn AsyncRead + Unpin> = if source == "-" {
        Box::new(tokio::io::stdin())
    } else {
        Box::new(
            tokio::fs::File::open(source)
                .await
                .with_context(|| format!("cannot open '{source}'"))?,
        )
    };

    let mut deframer = Deframer::default();
    let mut buf = vec![0u8; 64 * 1024];
    'ingest: loop {
        let n = input.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        deframer.push(&buf[..n]);
        while let Some(record) = deframer.next_record() {
            let disposition = writer.lock().await.input_record(&record, ctx).await?;
            if disposition == Disposition::Capped {
                deframer.clear();
                break 'ingest;
            }
        }
    }
    if !deframer.residue().is_empty() {
        tracing::warn!("stranding {} octets!", deframer.residue().len());
    }
    Writer::finish(writer, ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_survive_arbitrary_chunking() {
        let input = b"{\"a\":1}\n{\"b\":2}\n{\"c\":3}\n";
        for chunk_len in 1..input.len() {
            let mut deframer = Deframer::default();
            let mut records = Vec::new();
            for chunk in input.chunks(chunk_len) {
                deframer.push(chunk);
                while let Some(record) = deframer.next_record() {
                    records.push(record);
                }
            }
            assert_eq!(
                records,
                vec![
                    b"{\"a\":1}".to_vec(),
                    b"{\"b\":2}".to_vec(),
                    b"{\"c\":3}".to_vec(),
                ],
                "chunk_len {chunk_len}"
            );
            assert!(deframer.residue().is_empty());
        }
    }

    #[test]
    fn unterminated_suffix_is_residue_not_a_record() {
        let mut deframer = Deframer::default();
        deframer.push(b"{\"a\":1}\n{\"tail\":");
        assert_eq!(deframer.next_record(), Some(b"{\"a\":1}".to_vec()));
        assert_eq!(deframer.next_record(), None);
        assert_eq!(deframer.residue(), b"{\"tail\":");
    }

    #[test]
    fn empty_lines_are_empty_records() {
        let mut deframer = Deframer::default();
        deframer.push(b"\n\n");
        assert_eq!(deframer.next_record(), Some(Vec::new()));
        assert_eq!(deframer.next_record(), Some(Vec::new()));
        assert_eq!(deframer.next_record(), None);
    }
}
