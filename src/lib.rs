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

//! Query passive-DNS services: plan RESTful queries with time fencing, stream
//! the newline-delimited JSON answers, filter and optionally sort-deduplicate
//! them, and render text, CSV, or JSON.

pub mod backend;
pub mod batch;
pub mod cli;
pub mod config;
pub mod context;
pub mod engine;
pub mod planner;
pub mod present;
pub mod query;
pub mod reader;
pub mod sort;
pub mod time;
pub mod tuple;
pub mod writer;
