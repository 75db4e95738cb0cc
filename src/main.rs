use browser_surface::browser::chrome::{ChromeDriver, ConnectionMode};
use browser_surface::capture::CaptureConfig;
use browser_surface::session::{PageSession, SessionOptions};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use warp::Filter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 9669)]
    port: u16,

    /// Run Chrome without a window
    #[arg(long)]
    headless: bool,

    /// Pass --no-sandbox to Chrome (Linux AppArmor workaround)
    #[arg(long)]
    no_sandbox: bool,

    /// Chrome executable to launch instead of the downloaded one
    #[arg(long)]
    chrome_path: Option<String>,

    /// Attach to a Chrome already listening on this debug port
    #[arg(long)]
    debug_port: Option<u16>,

    /// Maximum number of entries per snapshot
    #[arg(long, default_value_t = 300)]
    snapshot_limit: usize,

    /// Pages taller than this (CSS px) are captured viewport-only
    #[arg(long, default_value_t = 10_000.0)]
    max_page_height: f64,
}

struct Session {
    // Keeps the browser alive for as long as the page session is used
    driver: ChromeDriver,
    page: Arc<PageSession>,
}

struct AppState {
    args: Args,
    session: Mutex<Option<Session>>,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();
    let port = args.port;

    log::info!("Starting browser-surface on port {}", port);

    let state = Arc::new(AppState {
        args,
        session: Mutex::new(None),
    });

    let health =
        warp::path("health").map(|| warp::reply::json(&serde_json::json!({ "status": "ok" })));

    let state_filter = warp::any().map(move || state.clone());

    let command = warp::path("command")
        .and(warp::post())
        .and(warp::body::json())
        .and(state_filter)
        .and_then(handle_command);

    let routes = health.or(command);

    // Bind manually to handle "port in use" error gracefully
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            log::info!("Listening on http://{}", addr);
            warp::serve(routes)
                .run_incoming(tokio_stream::wrappers::TcpListenerStream::new(listener))
                .await;
        }
        Err(e) => {
            log::error!("Failed to bind to port {}: {}", port, e);
            eprintln!("Error: Port {} is already in use or unavailable.", port);
            std::process::exit(1);
        }
    }
}

async fn handle_command(
    request: serde_json::Value,
    state: Arc<AppState>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let page = match page_session(&state).await {
        Ok(page) => page,
        Err(e) => {
            log::error!("No page session: {}", e);
            return Ok(warp::reply::json(&serde_json::json!({
                "success": false,
                "error": e.to_string(),
            })));
        }
    };

    let response = page.handle(&request).await;
    Ok(warp::reply::json(&response))
}

/// The live page session, launching (or relaunching) Chrome when needed.
async fn page_session(state: &AppState) -> anyhow::Result<Arc<PageSession>> {
    let mut guard = state.session.lock().await;

    if let Some(session) = guard.as_ref() {
        if session.driver.is_alive().await {
            return Ok(session.page.clone());
        }
        log::warn!("Chrome session DEAD, restarting...");
        *guard = None;
    }

    log::info!("Launching new Chrome session...");
    let driver = launch(&state.args).await?;
    let page = Arc::new(driver.page().await?);

    let options = SessionOptions {
        snapshot_limit: state.args.snapshot_limit,
        capture: CaptureConfig {
            max_page_height: state.args.max_page_height,
            ..CaptureConfig::default()
        },
        ..SessionOptions::default()
    };
    let session = Arc::new(PageSession::new(page.clone(), page, options));

    *guard = Some(Session {
        driver,
        page: session.clone(),
    });
    log::info!("Chrome session ready");
    Ok(session)
}

async fn launch(args: &Args) -> browser_surface::error::Result<ChromeDriver> {
    if let Some(port) = args.debug_port {
        return ChromeDriver::connect_debug_port(port).await;
    }
    if let Some(path) = &args.chrome_path {
        return ChromeDriver::launch_with_path(path.clone(), args.no_sandbox, args.headless).await;
    }
    if !args.headless && !args.no_sandbox {
        return ChromeDriver::launch_auto().await;
    }
    ChromeDriver::new(ConnectionMode::Sandboxed {
        chrome_path: None,
        no_sandbox: args.no_sandbox,
        headless: args.headless,
    })
    .await
}
