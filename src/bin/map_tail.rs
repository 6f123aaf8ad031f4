// src/bin/map_tail.rs
//! Tails one map's change feed over HTTP and prints every event as a JSON
//! line. Offsets are logged as they are committed.
//!
//! Run with:
//!   RUST_LOG=info map_tail --map-id <id> --prefix <kv prefix>

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::Parser;
use serde_json::json;

use mapstream::events::{
    BufferCommandType, CommandPushedData, EventVisitor, MapEvent, NodeTaggedData,
    SearchQuerySavedData, UnknownEventPolicy,
};
use mapstream::feed::{HttpFeedConfig, HttpMapFeed};
use mapstream::listener::{EventConsumer, ListenerConfig, StreamRegistry};

#[derive(Parser, Debug)]
#[command(name = "map_tail", about = "Print the events of one map as they happen")]
struct Args {
    /// Map to follow
    #[arg(long, env = "MAPSTREAM_MAP_ID")]
    map_id: String,

    /// KV key prefix of the stream
    #[arg(long, env = "MAPSTREAM_PREFIX")]
    prefix: String,

    /// Resume after this offset instead of the current end of the feed
    #[arg(long)]
    offset: Option<String>,

    /// Entries fetched per request
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    batch_size: u64,

    /// Fail on unknown or malformed events instead of skipping them
    #[arg(long)]
    strict: bool,

    #[arg(long, default_value_t = 60)]
    retry_delay_secs: u64,

    #[arg(long, env = "MAPSTREAM_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "MAPSTREAM_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "MAPSTREAM_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

/// One-line description of the kinds that carry a typed payload.
struct Summary;

impl EventVisitor for Summary {
    type Output = Option<String>;

    fn default_result(&mut self, _event: &MapEvent) -> Option<String> {
        None
    }

    fn node_tagged(&mut self, _event: &MapEvent, data: &NodeTaggedData) -> Option<String> {
        Some(format!("tag {} on \"{}\"", data.tag_id, data.node.title))
    }

    fn search_query_saved(&mut self, _event: &MapEvent, data: &SearchQuerySavedData) -> Option<String> {
        Some(format!("saved query \"{}\": {}", data.title, data.query))
    }

    fn command_pushed(&mut self, _event: &MapEvent, data: &CommandPushedData) -> Option<String> {
        let verb = match data.cmd.command_type {
            BufferCommandType::Copy => "copy",
            BufferCommandType::Cut => "cut",
        };
        Some(format!("{} of {} node(s) at {}", verb, data.cmd.nodes.len(), data.position))
    }
}

struct PrintingConsumer {
    map_id: String,
}

#[async_trait]
impl EventConsumer for PrintingConsumer {
    async fn consume(&self, timestamp: DateTime<Utc>, event: MapEvent) -> anyhow::Result<()> {
        let line = json!({
            "timestamp": timestamp.to_rfc3339(),
            "kind": event.kind().as_str(),
            "summary": event.visit(&mut Summary),
            "event": event.to_value()?,
        });
        println!("{}", line);
        Ok(())
    }

    async fn commit(&self, offset: &str) -> anyhow::Result<()> {
        log::info!("[{}] Committed offset {}", self.map_id, offset);
        Ok(())
    }

    async fn close(&self) {
        log::info!("[{}] Consumer closed", self.map_id);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let defaults = HttpFeedConfig::default();
    let feed = HttpMapFeed::new(HttpFeedConfig {
        base_url: args.base_url.unwrap_or(defaults.base_url.clone()),
        username: args.username,
        password: args.password,
        ..defaults
    })?;

    let config = ListenerConfig {
        batch_size: usize::try_from(args.batch_size)?,
        retry_delay: Duration::from_secs(args.retry_delay_secs),
        unknown_events: if args.strict {
            UnknownEventPolicy::Strict
        } else {
            UnknownEventPolicy::SkipUnknown
        },
    };

    let registry = StreamRegistry::with_config(Arc::new(feed), config);
    let consumer = Arc::new(PrintingConsumer {
        map_id: args.map_id.clone(),
    });
    registry.add_stream(&args.map_id, &args.prefix, consumer, args.offset);

    tokio::signal::ctrl_c().await?;
    log::info!("[{}] Interrupted, shutting down", args.map_id);
    registry.shutdown().await;
    Ok(())
}
