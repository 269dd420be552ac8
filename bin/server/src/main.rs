// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Demo subscription server.
//!
//! Serves `{ hello }` and `{ version }` as queries and
//! `subscription { onTick { tick } }`, which receives a tick published every
//! second. Configured through the
//! `GRAPHSUB_*` environment variables and `RUST_LOG`.

mod schema;

use std::{sync::Arc, time::Duration};

use graphsub_sub_api::Subsystem;
use graphsub_sub_server_ws::{EventPublisher, WsConfig, WsSubsystem};
use graphsub_sub_tracing::TracingBuilder;
use graphsub_type::Result;
use schema::{ON_TICK, SchemaRuntime};
use serde_json::json;
use tokio::{task::JoinHandle, time::interval};
use tracing::{Level, info, warn};

fn spawn_ticker(publisher: EventPublisher) -> JoinHandle<()> {
	tokio::spawn(async move {
		let mut ticks = interval(Duration::from_secs(1));
		let mut count: u64 = 0;
		loop {
			ticks.tick().await;
			count += 1;
			if let Err(err) = publisher.publish(ON_TICK, json!({"tick": count})).await {
				warn!(error = %err, "ticker stopped");
				break;
			}
		}
	})
}

#[tokio::main]
async fn main() -> Result<()> {
	let mut tracing = TracingBuilder::new().with_level(Level::INFO).build();
	tracing.start().await?;

	let config = WsConfig::from_env()?;
	let mut ws = WsSubsystem::new(config, Arc::new(SchemaRuntime::new()))?;
	ws.start().await?;
	if let Some(addr) = ws.local_addr() {
		info!(%addr, "subscription server listening");
	}

	let ticker = ws.publisher().map(spawn_ticker);

	if let Err(err) = tokio::signal::ctrl_c().await {
		warn!(error = %err, "waiting for ctrl-c failed");
	}

	info!("shutting down");
	if let Some(ticker) = ticker {
		ticker.abort();
	}
	ws.shutdown().await?;
	tracing.shutdown().await?;
	Ok(())
}
