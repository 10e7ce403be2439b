/*
 *  Copyright 2025-2026 Courier Contributors
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Sends a burst of notifications to one or more `courierd` gateways.

use anyhow::Result;
use clap::Parser;

use courier_server::load::{run_load, LoadPlan};

/// Courier load generator
#[derive(Parser, Debug)]
#[command(name = "courier-load")]
#[command(author, version, about, long_about = None)]
struct LoadArgs {
    /// Gateway endpoint; repeat to spread load over several instances
    #[arg(long = "target", default_value = "http://localhost:8090/notification")]
    targets: Vec<String>,

    /// Number of notifications to send
    #[arg(long, default_value_t = 10_000)]
    count: usize,

    /// Requests in flight at once
    #[arg(long, default_value_t = 100)]
    concurrency: usize,

    #[arg(long, default_value = "EMAIL")]
    destination: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = LoadArgs::parse();
    courier::init_logging(Some("warn"));

    let plan = LoadPlan {
        targets: args.targets,
        count: args.count,
        concurrency: args.concurrency,
        destination: args.destination,
    };
    let report = run_load(&reqwest::Client::new(), &plan).await?;

    println!(
        "{} accepted, {} rejected, {} failed in {:?}",
        report.accepted, report.rejected, report.failed, report.elapsed
    );
    Ok(())
}
