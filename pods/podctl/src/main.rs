use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::*;
use futures::future::AbortHandle;
use indicatif::{ProgressBar, ProgressStyle};
use pod_dashboard::{
    spawn_refresh_loop, Action, Backends, ChatSession, Dashboard, DashboardService, Debouncer,
    HtmlRenderer, SortKey,
};
use pod_net::{http_client, ChatClient, GeoClient, RetryPolicy, RpcClient};
use pod_types::chat::Rating;
use pod_types::events::PodEvent;
use pod_types::Theme;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod config;
mod prompt;
mod table;
mod theme;

use config::PodctlConfig;
use prompt::{parse_command, WatchCommand, HELP};
use theme::{system_prefers_dark, ThemeStore};

/// Pod network dashboard CLI
#[derive(Parser)]
#[clap(name = "podctl", version = "0.1.0", about = "Pod network dashboard")]
struct Cli {
    /// Path to the configuration file
    #[clap(short, long, default_value = "./podctl.toml")]
    config: PathBuf,

    /// Set the log level (info, debug, trace); overrides the config file
    #[clap(short, long)]
    log_level: Option<String>,

    /// RPC endpoint to query; overrides the config file
    #[clap(long)]
    rpc: Option<String>,

    /// Request extended stats (storage, uptime)
    #[clap(long)]
    stats: bool,

    /// Commands
    #[clap(subcommand)]
    command: Commands,
}

/// Sort and filter options shared by the table commands
#[derive(Args, Clone, Default)]
struct ViewArgs {
    /// Column to sort by
    #[clap(short, long)]
    sort: Option<SortKey>,

    /// Sort ascending instead of the column default
    #[clap(long, conflicts_with = "desc")]
    asc: bool,

    /// Sort descending instead of the column default
    #[clap(long)]
    desc: bool,

    /// Free-text filter over IP, pubkey, name and provider
    #[clap(short, long)]
    filter: Option<String>,

    /// Keep only pods running this version
    #[clap(long = "only-version")]
    only_version: Option<String>,

    /// Seconds to wait for geo lookups before rendering
    #[clap(long, default_value = "10")]
    settle: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch pods once and print the table
    List {
        #[clap(flatten)]
        view: ViewArgs,
    },

    /// Fetch pods once and write an HTML page
    Html {
        /// Output file
        #[clap(short, long, default_value = "pods.html")]
        out: PathBuf,

        #[clap(flatten)]
        view: ViewArgs,
    },

    /// Live table with periodic refresh and interactive commands
    Watch {
        #[clap(flatten)]
        view: ViewArgs,
    },

    /// Show everything known about one node
    Node {
        /// IP of the node
        ip: String,

        /// Write an HTML detail page instead of printing
        #[clap(long)]
        html: Option<PathBuf>,
    },

    /// Ask the chat assistant; interactive when no question is given
    Chat {
        question: Option<String>,
    },

    /// Rate a chat answer
    Feedback {
        /// Request ID printed with the answer
        request_id: String,

        /// up or down
        #[clap(value_parser = parse_rating)]
        rating: Rating,
    },

    /// Show or change the colour theme
    Theme {
        #[clap(value_enum, default_value = "show")]
        action: ThemeAction,
    },

    /// Write the default configuration file
    InitConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum ThemeAction {
    Show,
    Dark,
    Light,
    Toggle,
}

fn parse_rating(value: &str) -> Result<Rating, String> {
    match value.to_lowercase().as_str() {
        "up" | "+" => Ok(Rating::Up),
        "down" | "-" => Ok(Rating::Down),
        other => Err(format!("rating must be up or down, got '{}'", other)),
    }
}

/// Initialize logging
fn init_logging(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(style.tick_strings(&["◐", "◓", "◑", "◒", "●"]));
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = PodctlConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

    // Initialize logging
    let log_level = cli.log_level.clone().unwrap_or_else(|| config.logging.level.clone());
    init_logging(&log_level)?;

    let themes = ThemeStore::new(&config.ui.theme_path);
    let theme = themes.current(system_prefers_dark());

    match cli.command {
        Commands::List { ref view } => {
            let service = build_service(&config, cli.rpc.as_deref(), cli.stats)?;
            load(&service, view).await?;
            table::print_view(&service.view(Utc::now().timestamp()).await, theme);
        }
        Commands::Html { ref out, ref view } => {
            let service = build_service(&config, cli.rpc.as_deref(), cli.stats)?;
            load(&service, view).await?;
            let renderer = HtmlRenderer::new()?;
            let html = renderer.render_page(&service.view(Utc::now().timestamp()).await, theme)?;
            write_file(out, &html)?;
        }
        Commands::Watch { ref view } => {
            let service = build_service(&config, cli.rpc.as_deref(), cli.stats)?;
            apply_view_args(&service, view).await;
            run_watch(&config, &themes, service, cli.stats).await?;
        }
        Commands::Node { ref ip, ref html } => {
            let service = build_service(&config, cli.rpc.as_deref(), cli.stats)?;
            let args = ViewArgs {
                settle: 10,
                ..ViewArgs::default()
            };
            load(&service, &args).await?;
            let detail = service.detail(ip, Utc::now().timestamp()).await?;
            match html {
                Some(path) => {
                    let page = HtmlRenderer::new()?.render_node(&detail, theme)?;
                    write_file(path, &page)?;
                }
                None => {
                    table::render_detail(&detail, theme).printstd();
                }
            }
        }
        Commands::Chat { ref question } => {
            run_chat(&config, question.as_deref(), theme).await?;
        }
        Commands::Feedback { ref request_id, rating } => {
            let session = ChatSession::new(chat_backend(&config));
            session.feedback(request_id, rating).await;
            println!("Thanks for feedback!");
        }
        Commands::Theme { action } => {
            let theme = match action {
                ThemeAction::Show => theme,
                ThemeAction::Dark => {
                    themes.save(Theme::Dark)?;
                    Theme::Dark
                }
                ThemeAction::Light => {
                    themes.save(Theme::Light)?;
                    Theme::Light
                }
                ThemeAction::Toggle => themes.toggle(system_prefers_dark())?,
            };
            println!("Theme: {}", theme);
        }
        Commands::InitConfig => {
            config
                .save(&cli.config)
                .with_context(|| format!("Failed to write config to {:?}", cli.config))?;
            println!("Wrote configuration to {}", cli.config.display());
        }
    }

    Ok(())
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Wire the RPC and geo clients for the selected endpoint
fn build_service(config: &PodctlConfig, rpc: Option<&str>, stats: bool) -> Result<DashboardService> {
    let endpoint = config.rpc.endpoint(rpc)?;
    let (backends, geo_base_url) = build_backends(config, &endpoint, stats)?;

    let dashboard = Dashboard::new(endpoint, geo_base_url);
    Ok(DashboardService::new(dashboard, backends, config.enrichment.batch))
}

/// RPC and geo clients for `endpoint`, plus the geo base URL in use
fn build_backends(config: &PodctlConfig, endpoint: &str, stats: bool) -> Result<(Backends, String)> {
    let client = http_client(config.rpc.request_timeout());

    let retry = RetryPolicy {
        max_retries: config.rpc.max_retry_attempts,
        ..RetryPolicy::default()
    };
    let rpc_client = RpcClient::new(client.clone(), endpoint)
        .with_stats(stats || config.rpc.with_stats)
        .with_retry(retry);

    let geo = match &config.enrichment.base_url {
        Some(base_url) => GeoClient::new(client, base_url.clone()),
        None => GeoClient::for_rpc_endpoint(client, endpoint)
            .with_context(|| format!("Cannot derive geo service from {}", endpoint))?,
    };
    debug!("Using geo service at {}", geo.base_url());

    let geo_base_url = geo.base_url().to_string();
    let backends = Backends {
        pods: Arc::new(rpc_client),
        enrichment: Arc::new(geo),
    };
    Ok((backends, geo_base_url))
}

async fn list_endpoints(config: &PodctlConfig, service: &DashboardService) {
    let current = service.read(|state| state.rpc_endpoint().to_string()).await;
    for (position, endpoint) in config.rpc.endpoints.iter().enumerate() {
        let marker = if *endpoint == current { "*" } else { " " };
        println!("{} {} {}", marker, position + 1, endpoint);
    }
    if !config.rpc.endpoints.contains(&current) {
        println!("* - {}", current);
    }
}

async fn switch_endpoint(
    config: &PodctlConfig,
    service: &DashboardService,
    choice: &str,
    stats: bool,
) -> Result<()> {
    let endpoint = config.rpc.choose(choice)?;
    let (backends, geo_base_url) = build_backends(config, &endpoint, stats)?;
    service.select_endpoint(backends, geo_base_url).await;
    Ok(())
}

fn chat_backend(config: &PodctlConfig) -> Arc<ChatClient> {
    let client = http_client(Duration::from_secs(config.chat.request_timeout_seconds));
    Arc::new(ChatClient::new(client, config.chat.base_url.clone()))
}

async fn apply_view_args(service: &DashboardService, args: &ViewArgs) {
    if let Some(key) = args.sort {
        let direction = if args.asc {
            pod_dashboard::SortDirection::Ascending
        } else if args.desc {
            pod_dashboard::SortDirection::Descending
        } else {
            key.default_direction()
        };
        service.dispatch(Action::SetSort { key, direction }).await;
    }
    if let Some(text) = &args.filter {
        service.dispatch(Action::SetFilterText(text.clone())).await;
        service.dispatch(Action::SetTextFilterEnabled(true)).await;
    }
    if let Some(version) = &args.only_version {
        service
            .dispatch(Action::SetVersionFilter {
                enabled: true,
                version: version.clone(),
            })
            .await;
    }
}

/// Fetch once and give the geo lookups a chance to settle
async fn load(service: &DashboardService, args: &ViewArgs) -> Result<()> {
    apply_view_args(service, args).await;

    let progress = spinner("Fetching pods...");
    let result = service.reload().await;
    progress.finish_and_clear();
    let count = result.map_err(|e| match e {
        pod_dashboard::DashboardError::Net(net) => anyhow::anyhow!(net.user_message()),
        other => other.into(),
    })?;
    info!("Fetched {} unique pods", count);

    if args.settle > 0 && count > 0 {
        let progress = spinner("Looking up geo data...");
        let settled = service
            .wait_for_enrichment(Duration::from_secs(args.settle))
            .await;
        progress.finish_and_clear();
        if !settled {
            warn!("Some geo lookups were still pending after {}s", args.settle);
        }
    }
    Ok(())
}

async fn redraw(service: &DashboardService, theme: Theme) {
    // Clear screen and home the cursor
    print!("\x1B[2J\x1B[H");
    table::print_view(&service.view(Utc::now().timestamp()).await, theme);
    println!("{}", "type help for commands".dimmed());
}

async fn run_watch(
    config: &PodctlConfig,
    themes: &ThemeStore,
    service: DashboardService,
    stats: bool,
) -> Result<()> {
    let mut theme = themes.current(system_prefers_dark());
    let (visible_tx, visible_rx) = watch::channel(true);
    let refresh = spawn_refresh_loop(service.clone(), config.refresh.interval(), visible_rx);

    if let Err(e) = service.reload().await {
        warn!("Initial load failed: {}", e);
    }

    let (mut filter_input, mut filter_rx) = Debouncer::<String>::new(config.refresh.filter_debounce());
    let (mut resort, mut resort_rx) = Debouncer::<()>::new(config.refresh.resort_delay());
    let mut revisions = service.subscribe();
    let mut events = service.events();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    redraw(&service, theme).await;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match parse_command(&line) {
                    Ok(WatchCommand::Quit) => break,
                    Ok(WatchCommand::Filter(text)) => filter_input.schedule(text),
                    Ok(WatchCommand::Sort(key)) => {
                        service.dispatch(Action::SortBy(key)).await;
                    }
                    Ok(WatchCommand::TextFilter(enabled)) => {
                        service.dispatch(Action::SetTextFilterEnabled(enabled)).await;
                    }
                    Ok(WatchCommand::Version(version)) => {
                        service
                            .dispatch(Action::SetVersionFilter {
                                enabled: version.is_some(),
                                version: version.unwrap_or_default(),
                            })
                            .await;
                    }
                    Ok(WatchCommand::Reload) => {
                        if let Err(e) = service.reload().await {
                            warn!("Reload failed: {}", e);
                        }
                    }
                    Ok(WatchCommand::Pause) => {
                        visible_tx.send_replace(false);
                        println!("Automatic refresh paused");
                    }
                    Ok(WatchCommand::Resume) => {
                        visible_tx.send_replace(true);
                        println!("Automatic refresh resumed");
                    }
                    Ok(WatchCommand::Theme) => {
                        theme = themes.toggle(system_prefers_dark())?;
                        redraw(&service, theme).await;
                    }
                    Ok(WatchCommand::Node(ip)) => {
                        match service.detail(&ip, Utc::now().timestamp()).await {
                            Ok(detail) => {
                                table::render_detail(&detail, theme).printstd();
                            }
                            Err(e) => println!("{}", e.to_string().red()),
                        }
                    }
                    Ok(WatchCommand::Endpoint(None)) => list_endpoints(config, &service).await,
                    Ok(WatchCommand::Endpoint(Some(choice))) => {
                        match switch_endpoint(config, &service, &choice, stats).await {
                            Ok(()) => println!("Endpoint selected, type reload to fetch"),
                            Err(e) => println!("{}", format!("{:#}", e).red()),
                        }
                    }
                    Ok(WatchCommand::Help) => println!("{}", HELP),
                    Err(message) => println!("{}", message.red()),
                }
                // Every interaction is a render pass; failed lookups get another try
                service.render_pass().await;
            }
            Some(text) = filter_rx.recv() => {
                let enabled = !text.trim().is_empty();
                service.dispatch(Action::SetFilterText(text)).await;
                service.dispatch(Action::SetTextFilterEnabled(enabled)).await;
            }
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                resort.schedule(());
            }
            Some(()) = resort_rx.recv() => {
                redraw(&service, theme).await;
            }
            event = events.recv() => match event {
                Ok(PodEvent::CycleStarted { generation }) => {
                    println!("{}", format!("Fetching pods (cycle {})...", generation).dimmed());
                }
                Ok(PodEvent::FetchFailed { generation, message }) => {
                    warn!("Cycle {} failed: {}", generation, message);
                }
                Ok(PodEvent::EnrichmentDiscarded { ip, generation }) => {
                    debug!("Dropped stale lookup for {} from cycle {}", ip, generation);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Skipped {} dashboard events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    drop(visible_tx);
    refresh.abort();
    Ok(())
}

async fn run_chat(config: &PodctlConfig, question: Option<&str>, theme: Theme) -> Result<()> {
    let mut session = ChatSession::new(chat_backend(config));

    match question {
        Some(question) => ask_once(&mut session, question, theme).await,
        None => {
            println!("Ask a question, empty line to quit. Ctrl+C stops a running answer.");
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await? {
                if line.trim().is_empty() {
                    break;
                }
                ask_once(&mut session, &line, theme).await;
            }
        }
    }
    Ok(())
}

async fn ask_once(session: &mut ChatSession, question: &str, theme: Theme) {
    let (handle, registration) = AbortHandle::new_pair();
    let stop = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.abort();
        }
    });

    let progress = spinner("Thinking... Press Ctrl+C to stop");
    let reply = session.ask(question, registration).await.cloned();
    progress.finish_and_clear();
    stop.abort();

    if let Some(reply) = reply {
        println!("{}\n", table::render_message(&reply, theme));
    }
}
