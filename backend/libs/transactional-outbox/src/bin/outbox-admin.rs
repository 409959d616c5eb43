use std::env;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use db_pool::{create_pool, DbConfig};
use transactional_outbox::{OutboxEnvConfig, OutboxStore, PgOutboxStore};

const USAGE: &str = "Usage:
  outbox-admin pending
  outbox-admin replay-since <rfc3339_ts>
  outbox-admin replay-range <from_id> <to_id>

Connection comes from PG_DSN / DATABASE_URL, table from OUTBOX_TABLE.";

#[derive(Debug, PartialEq)]
enum Command {
    Pending,
    ReplaySince(DateTime<Utc>),
    ReplayRange(i64, i64),
}

fn parse_args(args: &[String]) -> Result<Command> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match args.as_slice() {
        ["pending"] => Ok(Command::Pending),
        ["replay-since", ts] => {
            let ts = DateTime::parse_from_rfc3339(ts)
                .with_context(|| format!("Invalid timestamp {ts:?}"))?;
            Ok(Command::ReplaySince(ts.with_timezone(&Utc)))
        }
        ["replay-range", from, to] => {
            let from: i64 = from.parse().with_context(|| format!("Invalid id {from:?}"))?;
            let to: i64 = to.parse().with_context(|| format!("Invalid id {to:?}"))?;
            if from > to {
                bail!("from_id must not exceed to_id");
            }
            Ok(Command::ReplayRange(from, to))
        }
        _ => bail!("Invalid arguments"),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    config_core::load_dotenv();
    let args: Vec<String> = env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{e}\n\n{USAGE}");
            std::process::exit(1);
        }
    };

    let settings = OutboxEnvConfig::from_env().context("Invalid outbox configuration")?;
    let db_config = DbConfig::from_env("outbox-admin").map_err(|e| anyhow::anyhow!(e))?;
    let pool = create_pool(db_config)
        .await
        .context("Failed to connect to PostgreSQL")?;
    let store = PgOutboxStore::new(pool, settings.outbox_table)?;

    match command {
        Command::Pending => {
            let (pending, age) = store.pending_stats().await?;
            println!("{pending} unpublished rows, oldest is {age}s old");
        }
        Command::ReplaySince(ts) => {
            let count = store.replay_since(ts).await?;
            println!("Replayed {count} rows with event_time >= {ts}");
        }
        Command::ReplayRange(from, to) => {
            let count = store.replay_range(from, to).await?;
            println!("Replayed {count} rows between {from} and {to}");
        }
    }

    store.pool().close().await;
    Ok(())
}
