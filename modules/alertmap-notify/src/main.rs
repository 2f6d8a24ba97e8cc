use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use alertmap_common::Config;
use alertmap_notify::{sender, MatchingPass, NotifyDeps};
use alertmap_store::PgDocumentStore;

#[derive(Parser)]
#[command(name = "alertmap-notify", about = "Match finalized announcements to user interests and notify")]
struct Cli {
    /// Only consider messages finalized after this RFC 3339 instant instead of the stored cursor
    #[arg(long)]
    since: Option<String>,

    /// Report matches without recording or sending anything
    #[arg(long)]
    dry_run: bool,
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("alertmap=info".parse()?);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;
    let cli = Cli::parse();

    let since = cli
        .since
        .as_deref()
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .with_context(|| format!("--since is not an RFC 3339 instant: {raw}"))
        })
        .transpose()?;

    let config = Config::notify_from_env();
    config.log_redacted();
    let locality = Arc::new(config.locality()?);

    let store = PgDocumentStore::connect(&config.database_url).await?;
    store.migrate().await?;

    let sender = sender::from_config(
        config.fcm_project_id.as_deref(),
        config.fcm_access_token.as_deref(),
        config.stage_timeout,
    )?;

    let deps = NotifyDeps::builder()
        .store(Arc::new(store))
        .sender(sender)
        .locality(locality)
        .build();
    let report = MatchingPass::new(deps)
        .with_dry_run(cli.dry_run)
        .run(since)
        .await?;

    info!(
        messages = report.messages,
        interests = report.interests,
        matches = report.matches.len(),
        recorded = report.recorded,
        delivered = report.dispatch.delivered,
        deregistered = report.dispatch.deregistered,
        dry_run = cli.dry_run,
        "Notify run complete"
    );
    Ok(())
}
