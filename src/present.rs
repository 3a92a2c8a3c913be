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

//! Rendering of accepted records. Six concrete presenters (text, JSON, CSV,
//! each in lookup and summarize form), chosen once at startup.

use std::io::Write;
use std::sync::atomic::Ordering;

use anyhow::Result;

use crate::backend::Verb;
use crate::context::Context;
use crate::time::time_str;
use crate::tuple::Tuple;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
    Csv,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presenter {
    TextLookup,
    TextSummarize,
    JsonLookup,
    JsonSummarize,
    CsvLookup,
    CsvSummarize,
}

impl Presenter {
    pub fn select(format: Format, verb: Verb) -> Presenter {
        match (format, verb) {
            (Format::Text, Verb::Lookup) => Presenter::TextLookup,
            (Format::Text, Verb::Summarize) => Presenter::TextSummarize,
            (Format::Json, Verb::Lookup) => Presenter::JsonLookup,
            (Format::Json, Verb::Summarize) => Presenter::JsonSummarize,
            (Format::Csv, Verb::Lookup) => Presenter::CsvLookup,
            (Format::Csv, Verb::Summarize) => Presenter::CsvSummarize,
        }
    }

    pub fn format(self) -> Format {
        match self {
            Presenter::TextLookup | Presenter::TextSummarize => Format::Text,
            Presenter::JsonLookup | Presenter::JsonSummarize => Format::Json,
            Presenter::CsvLookup | Presenter::CsvSummarize => Format::Csv,
        }
    }

    pub fn present(
        self,
        tup: &Tuple,
        raw: &[u8],
        ctx: &Context,
        out: &mut dyn Write,
    ) -> Result<()> {
        match self {
            Presenter::TextLookup => text_lookup(tup, ctx, out),
            Presenter::TextSummarize => text_summarize(tup, ctx, out),
            // JSON output is the record itself, untouched.
            Presenter::JsonLookup | Presenter::JsonSummarize => {
                out.write_all(raw)?;
                out.write_all(b"\n")?;
                Ok(())
            }
            Presenter::CsvLookup => csv_lookup(tup, ctx, out),
            Presenter::CsvSummarize => csv_summarize(tup, ctx, out),
        }
    }
}

fn text_times(tup: &Tuple, iso8601: bool, out: &mut dyn Write) -> Result<()> {
    if tup.time_first != 0 && tup.time_last != 0 {
        writeln!(
            out,
            ";;  record times: {} .. {}",
            time_str(tup.time_first, iso8601),
            time_str(tup.time_last, iso8601)
        )?;
    }
    if tup.zone_first != 0 && tup.zone_last != 0 {
        writeln!(
            out,
            ";;    zone times: {} .. {}",
            time_str(tup.zone_first, iso8601),
            time_str(tup.zone_last, iso8601)
        )?;
    }
    Ok(())
}

fn text_lookup(tup: &Tuple, ctx: &Context, out: &mut dyn Write) -> Result<()> {
    text_times(tup, ctx.opts.iso8601, out)?;
    match &tup.bailiwick {
        Some(bailiwick) => writeln!(out, ";;  count: {}; bailiwick: {bailiwick};", tup.count)?,
        None => writeln!(out, ";;  count: {};", tup.count)?,
    }
    if let (Some(rrname), Some(rrtype), Some(rdata)) = (&tup.rrname, &tup.rrtype, &tup.rdata) {
        for slot in rdata.slots().into_iter().flatten() {
            writeln!(out, "{rrname}  {rrtype}  {slot}")?;
        }
    }
    writeln!(out)?;
    Ok(())
}

fn text_summarize(tup: &Tuple, ctx: &Context, out: &mut dyn Write) -> Result<()> {
    text_times(tup, ctx.opts.iso8601, out)?;
    writeln!(
        out,
        ";;  count: {}; num_results: {};",
        tup.count, tup.num_results
    )?;
    writeln!(out)?;
    Ok(())
}

fn csv_time(t: u64, iso8601: bool) -> String {
    if t == 0 {
        String::new()
    } else {
        time_str(t, iso8601)
    }
}

fn csv_lookup(tup: &Tuple, ctx: &Context, out: &mut dyn Write) -> Result<()> {
    let mut csv = csv::WriterBuilder::new().has_headers(false).from_writer(out);
    if !ctx.csv_headers_done.swap(true, Ordering::Relaxed) {
        csv.write_record([
            "time_first",
            "time_last",
            "zone_first",
            "zone_last",
            "count",
            "bailiwick",
            "rrname",
            "rrtype",
            "rdata",
        ])?;
    }
    let iso8601 = ctx.opts.iso8601;
    let fixed = [
        csv_time(tup.time_first, iso8601),
        csv_time(tup.time_last, iso8601),
        csv_time(tup.zone_first, iso8601),
        csv_time(tup.zone_last, iso8601),
        tup.count.to_string(),
        tup.bailiwick.clone().unwrap_or_default(),
        tup.rrname.clone().unwrap_or_default(),
        tup.rrtype.clone().unwrap_or_default(),
    ];
    let slots = match &tup.rdata {
        Some(rdata) => rdata
            .slots()
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect(),
        None => vec![String::new()],
    };
    for slot in slots {
        let mut row: Vec<&str> = fixed.iter().map(String::as_str).collect();
        row.push(&slot);
        csv.write_record(&row)?;
    }
    csv.flush()?;
    Ok(())
}

fn csv_summarize(tup: &Tuple, ctx: &Context, out: &mut dyn Write) -> Result<()> {
    let mut csv = csv::WriterBuilder::new().has_headers(false).from_writer(out);
    if !ctx.csv_headers_done.swap(true, Ordering::Relaxed) {
        csv.write_record([
            "time_first",
            "time_last",
            "zone_first",
            "zone_last",
            "count",
            "num_results",
        ])?;
    }
    let iso8601 = ctx.opts.iso8601;
    csv.write_record([
        csv_time(tup.time_first, iso8601),
        csv_time(tup.time_last, iso8601),
        csv_time(tup.zone_first, iso8601),
        csv_time(tup.zone_last, iso8601),
        tup.count.to_string(),
        tup.num_results.to_string(),
    ])?;
    csv.flush()?;
    Ok(())
}
