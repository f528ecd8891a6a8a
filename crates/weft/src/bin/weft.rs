use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use clap::{Arg, Command};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use weft::config::ConfigError;
use weft::{
    BoundaryFailure, BoundaryOutput, Config, Node, OrderingMode, RenderConfig, RenderHooks,
    ShellTemplate, StreamingHtmlResponse,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let matches = Command::new("weft")
        .version(env!("CARGO_PKG_VERSION"))
        .about("weft streaming render demo server")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("host")
                .short('H')
                .long("host")
                .value_name("HOST")
                .help("Server host address"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Server port")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("concurrency")
                .long("concurrency")
                .value_name("N")
                .help("Maximum boundaries rendering at once")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("ordering")
                .long("ordering")
                .value_name("MODE")
                .help("Patch emission order")
                .value_parser(["fifo", "priority", "completion"]),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Reduce log output")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    init_logging(&matches)?;

    let config = load_configuration(&matches).map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;

    let address = config.server_address();
    let app = Router::new()
        .route("/", get(index))
        .route("/health", get(|| async { "ok" }))
        .with_state(Arc::new(config));

    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("weft demo listening on http://{}", address);

    axum::serve(listener, app).with_graceful_shutdown(setup_shutdown_signal()).await?;
    Ok(())
}

async fn index(State(config): State<Arc<Config>>) -> impl IntoResponse {
    let hooks = RenderHooks::default()
        .on_boundary_ready(|id| debug!("Boundary {} flushed", id))
        .on_complete(|stats| {
            info!("Streamed {} patches in {:.1}ms", stats.patches, stats.total_ms);
        });
    let render_config = RenderConfig::from_config(&config, demo_shell()).with_hooks(hooks);

    StreamingHtmlResponse::render(demo_page(), render_config)
}

fn demo_shell() -> ShellTemplate {
    ShellTemplate::new(
        concat!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>weft</title>",
            "<style>.skeleton{opacity:.5}[data-boundary-error]{color:#b00}</style>",
            "</head><body>"
        ),
        "</body></html>",
    )
}

fn demo_page() -> Node {
    Node::element("main")
        .child(Node::element("h1").child("weft streaming demo"))
        .child(Node::element("section").attr("className", "feed").children((0..6).map(story)))
        .child(sidebar())
        .child(Node::element("footer").child("Rendered out of order by weft"))
        .into()
}

/// Later stories resolve first; story 0 carries the highest priority.
fn story(index: u64) -> Node {
    let delay = Duration::from_millis(150 * (6 - index));
    let fallback = Node::element("p").attr("className", "skeleton").child("Loading story…");

    Node::boundary(fallback, move || async move {
        tokio::time::sleep(delay).await;
        if index == 4 {
            return Err(BoundaryFailure::task("story service unavailable"));
        }
        let article = Node::element("article")
            .attr("data-story", index as i64)
            .child(Node::element("h2").child(format!("Story #{}", index + 1)))
            .child(Node::element("button").child("Like"));
        Ok(BoundaryOutput::new(article).with_state(&json!({ "story": index, "likes": 0 })))
    })
    .priority(if index == 0 { 10 } else { 0 })
    .into()
}

fn sidebar() -> Node {
    Node::boundary("Loading sidebar…", || async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let recommendations = Node::boundary("Finding recommendations…", || async {
            tokio::time::sleep(Duration::from_millis(400)).await;
            Ok::<Node, BoundaryFailure>(
                Node::element("ul")
                    .child(Node::element("li").child("Streaming HTML"))
                    .child(Node::element("li").child("Selective activation"))
                    .into(),
            )
        })
        .needs_activation(false);

        Ok::<Node, BoundaryFailure>(
            Node::element("aside").child(Node::element("h3").child("For you")).child(recommendations).into(),
        )
    })
    .into()
}

fn init_logging(matches: &clap::ArgMatches) -> Result<(), BoxError> {
    let verbose = matches.get_flag("verbose");
    let quiet = matches.get_flag("quiet");

    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("weft={default_level}")))
        .map_err(|e| format!("Failed to create log filter: {e}"))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(verbose)
                .with_line_number(verbose)
                .compact(),
        )
        .init();

    Ok(())
}

fn load_configuration(matches: &clap::ArgMatches) -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env_vars()?;

    if let Some(host) = matches.get_one::<String>("host") {
        config.server.host = host.to_string();
    }

    if let Some(&port) = matches.get_one::<u16>("port") {
        config.server.port = port;
    }

    if let Some(&limit) = matches.get_one::<usize>("concurrency") {
        config.scheduler.concurrency_limit = limit;
    }

    if let Some(mode) = matches.get_one::<String>("ordering") {
        config.scheduler.ordering_mode = mode.parse::<OrderingMode>()?;
    }

    if config.server.port == 0 {
        return Err(ConfigError::InvalidPort("0".to_string()));
    }

    config.validate()?;
    Ok(config)
}

async fn setup_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let (Ok(mut sigterm), Ok(mut sigint)) =
            (signal(SignalKind::terminate()), signal(SignalKind::interrupt()))
        else {
            let _ = tokio::signal::ctrl_c().await;
            return;
        };

        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }

    #[cfg(windows)]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
