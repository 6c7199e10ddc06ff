mod display;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use phillip_core::config::groups;
use phillip_core::model::OSU_BASE_URL;
use phillip_core::{FeedFilter, GroupId, PollConfig, Watermark};
use phillip_host::{Dispatcher, MAP_EVENT, Runner, Shutdown, WebhookConsumer};
use phillip_store::StateDir;
use phillip_sync::{ClientConfig, OsuClient};

use display::ConsoleConsumer;

/// Watch the osu! beatmap review feed and reviewer group rosters.
#[derive(Debug, Parser)]
#[command(name = "phillip", version, about)]
struct Args {
    /// osu! v1 API key, used for beatmap and user lookups.
    #[arg(long, env = "PHILLIP_API_KEY", hide_env_values = true, default_value = "")]
    api_key: String,

    /// Discord webhook to post map events to.
    #[arg(long, env = "PHILLIP_WEBHOOK_URL", hide_env_values = true)]
    webhook_url: Option<String>,

    /// Print every notification to stdout.
    #[arg(long)]
    print: bool,

    /// Directory to keep the watermark and rosters in across restarts.
    #[arg(long, env = "PHILLIP_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Start the map feed at this RFC 3339 timestamp, ignoring any saved watermark.
    #[arg(long, value_parser = parse_since)]
    since: Option<DateTime<Utc>>,

    #[arg(long, default_value = OSU_BASE_URL)]
    base_url: String,

    /// Seconds between map feed polls.
    #[arg(long, default_value_t = 300)]
    map_interval: u64,

    /// Seconds between group roster polls.
    #[arg(long, default_value_t = 900)]
    roster_interval: u64,

    /// Minimum seconds between page requests.
    #[arg(long, default_value_t = 30)]
    request_interval: u64,

    /// Group ids to track, comma separated.
    #[arg(long, value_delimiter = ',', default_values_t = groups::DEFAULT.to_vec())]
    groups: Vec<GroupId>,

    #[arg(long)]
    no_map_feed: bool,

    #[arg(long)]
    no_group_feed: bool,

    /// Also notify about events triggered by the system account.
    #[arg(long)]
    keep_system_events: bool,

    #[arg(long)]
    no_nominate: bool,
    #[arg(long)]
    no_rank: bool,
    #[arg(long)]
    no_love: bool,
    #[arg(long)]
    no_reset: bool,
    #[arg(long)]
    no_disqualify: bool,
}

fn parse_since(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

impl Args {
    fn poll_config(&self) -> PollConfig {
        PollConfig {
            map_interval: Duration::from_secs(self.map_interval),
            roster_interval: Duration::from_secs(self.roster_interval),
            groups: self.groups.clone(),
            skip_system_actor: !self.keep_system_events,
            disable_map_feed: self.no_map_feed,
            disable_group_feed: self.no_group_feed,
            filter: FeedFilter {
                nominate: !self.no_nominate,
                rank: !self.no_rank,
                love: !self.no_love,
                nomination_reset: !self.no_reset,
                disqualify: !self.no_disqualify,
            },
            ..PollConfig::default()
        }
    }

    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            request_interval: Duration::from_secs(self.request_interval),
        }
    }

    fn dispatcher(&self) -> Dispatcher {
        let mut dispatcher = Dispatcher::new();
        if self.print {
            let console = Arc::new(ConsoleConsumer);
            for topic in [MAP_EVENT, "group_added", "group_removed"] {
                dispatcher.subscribe(topic, console.clone());
            }
        }
        if let Some(url) = &self.webhook_url {
            dispatcher.subscribe(MAP_EVENT, Arc::new(WebhookConsumer::new(url.clone())));
        }
        dispatcher
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "could not listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    tracing::info!("phillip v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    if args.api_key.is_empty() && !args.no_map_feed {
        tracing::warn!("no API key set; beatmap and user lookups will fail");
    }

    let source = Arc::new(OsuClient::new(args.client_config()));
    let mut runner = Runner::new(source, args.poll_config(), args.dispatcher());
    if let Some(dir) = &args.state_dir {
        let store = StateDir::open(dir).context("opening state directory")?;
        runner = runner.with_store(store)?;
    }
    if let Some(since) = args.since {
        tracing::info!(since = %since, "starting map feed from --since");
        runner = runner.with_watermark(Watermark::since(since));
    }

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("shutting down");
        trigger.trigger();
    });

    runner.run(&shutdown).await
}
