// # wagwd - WhatsApp Gateway Daemon
//
// The wagwd daemon is a thin integration layer. It is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Wiring the device store, client, webhook sink and engine together
// 4. Serving the HTTP facade until SIGTERM/SIGINT
//
// Session logic lives in wagw-core; HTTP handlers live in wagw-http.
//
// ## Configuration
//
// ### Webhook
// - `WAGW_WEBHOOK_URL`: Receiver of inbound messages (falls back to `N8N_WEBHOOK`)
// - `WAGW_WEBHOOK_TIMEOUT_SECS`: Per-request timeout
// - `WAGW_WEBHOOK_QUEUE_CAPACITY`: Pending deliveries before new ones are dropped
// - `WAGW_WEBHOOK_MAX_RETRIES`: Extra attempts after a failed delivery
// - `WAGW_WEBHOOK_RETRY_DELAY_MS`: Delay between attempts
//
// ### HTTP
// - `WAGW_BIND_ADDR`: Address to bind
// - `WAGW_PORT`: Port to listen on (falls back to `PORT`)
//
// ### Session
// - `WAGW_CLIENT`: WhatsApp client implementation (loopback)
// - `WAGW_DEVICE_STORE`: Device store type (file, memory)
// - `WAGW_DEVICE_STORE_PATH`: Path to the device file (for file store)
// - `WAGW_SEND_TIMEOUT_SECS`: Upper bound on one outbound transmit
// - `WAGW_RECONNECT`: Reconnect after transient disconnects (true, false)
// - `WAGW_RECONNECT_DELAY_MS`: Delay before reconnecting
// - `WAGW_CONNECT_TIMEOUT_MS`: Upper bound on one reconnect attempt
//
// ### Loopback client
// - `WAGW_LOOPBACK_ECHO`: Loop sent messages back as inbound messages
// - `WAGW_LOOPBACK_AUTO_PAIR_SECS`: Pair automatically after this many seconds
//
// ### Logging
// - `WAGW_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export WAGW_WEBHOOK_URL=http://localhost:5678/webhook/whatsapp
// export WAGW_DEVICE_STORE_PATH=/var/lib/wagw/device.json
// export WAGW_PORT=3000
//
// wagwd
// ```

use anyhow::Result;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use wagw_core::config::{DEFAULT_WEBHOOK_URL, GatewayConfig};
use wagw_core::store::{FileDeviceStore, MemoryDeviceStore};
use wagw_core::traits::{DeviceStore, WebhookSink, WhatsAppClient};
use wagw_core::{GatewayEngine, HttpWebhookSink, SendGateway, WebhookDispatcher};
use wagw_http::{AppState, create_router};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Time allowed for the engine, server and webhook queue to drain on shutdown
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum WagwExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<WagwExitCode> for ExitCode {
    fn from(code: WagwExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    webhook_url: String,
    webhook_timeout_secs: u64,
    webhook_queue_capacity: usize,
    webhook_max_retries: usize,
    webhook_retry_delay_ms: u64,
    bind_addr: String,
    port: u16,
    client_type: String,
    device_store_type: String,
    device_store_path: String,
    send_timeout_secs: u64,
    reconnect: bool,
    reconnect_delay_ms: u64,
    connect_timeout_ms: u64,
    loopback_echo: bool,
    loopback_auto_pair_secs: Option<u64>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |keys: &[&str]| keys.iter().find_map(|&key| lookup(key));
        let text = |keys: &[&str], default: &str| get(keys).unwrap_or_else(|| default.to_string());
        let num = |key: &str| get(&[key]);

        Ok(Self {
            webhook_url: text(&["WAGW_WEBHOOK_URL", "N8N_WEBHOOK"], DEFAULT_WEBHOOK_URL),
            webhook_timeout_secs: parse_num(
                "WAGW_WEBHOOK_TIMEOUT_SECS",
                num("WAGW_WEBHOOK_TIMEOUT_SECS"),
                10,
            )?,
            webhook_queue_capacity: parse_num(
                "WAGW_WEBHOOK_QUEUE_CAPACITY",
                num("WAGW_WEBHOOK_QUEUE_CAPACITY"),
                256,
            )?,
            webhook_max_retries: parse_num(
                "WAGW_WEBHOOK_MAX_RETRIES",
                num("WAGW_WEBHOOK_MAX_RETRIES"),
                0,
            )?,
            webhook_retry_delay_ms: parse_num(
                "WAGW_WEBHOOK_RETRY_DELAY_MS",
                num("WAGW_WEBHOOK_RETRY_DELAY_MS"),
                2000,
            )?,
            bind_addr: text(&["WAGW_BIND_ADDR"], "0.0.0.0"),
            port: parse_num("WAGW_PORT", get(&["WAGW_PORT", "PORT"]), 3000)?,
            client_type: text(&["WAGW_CLIENT"], "loopback"),
            device_store_type: text(&["WAGW_DEVICE_STORE"], "file"),
            device_store_path: text(&["WAGW_DEVICE_STORE_PATH"], "./wagw-device.json"),
            send_timeout_secs: parse_num(
                "WAGW_SEND_TIMEOUT_SECS",
                num("WAGW_SEND_TIMEOUT_SECS"),
                20,
            )?,
            reconnect: parse_bool("WAGW_RECONNECT", num("WAGW_RECONNECT"), true)?,
            reconnect_delay_ms: parse_num(
                "WAGW_RECONNECT_DELAY_MS",
                num("WAGW_RECONNECT_DELAY_MS"),
                3000,
            )?,
            connect_timeout_ms: parse_num(
                "WAGW_CONNECT_TIMEOUT_MS",
                num("WAGW_CONNECT_TIMEOUT_MS"),
                30_000,
            )?,
            loopback_echo: parse_bool("WAGW_LOOPBACK_ECHO", num("WAGW_LOOPBACK_ECHO"), false)?,
            loopback_auto_pair_secs: num("WAGW_LOOPBACK_AUTO_PAIR_SECS")
                .map(|raw| parse_num("WAGW_LOOPBACK_AUTO_PAIR_SECS", Some(raw), 0))
                .transpose()?,
            log_level: text(&["WAGW_LOG_LEVEL"], "info"),
        })
    }

    /// Validate the configuration
    ///
    /// Checks enumerations, paths and log level here; numeric and URL checks
    /// are shared with library users through `GatewayConfig::validate`.
    fn validate(&self) -> Result<()> {
        match self.client_type.as_str() {
            "loopback" => {}
            _ => anyhow::bail!(
                "WAGW_CLIENT '{}' is not supported. \
                Supported clients: loopback",
                self.client_type
            ),
        }

        match self.device_store_type.as_str() {
            "file" | "memory" => {}
            _ => anyhow::bail!(
                "WAGW_DEVICE_STORE '{}' is not supported. \
                Supported types: file, memory",
                self.device_store_type
            ),
        }

        if self.device_store_type == "file" && self.device_store_path.is_empty() {
            anyhow::bail!(
                "WAGW_DEVICE_STORE_PATH cannot be empty when WAGW_DEVICE_STORE=file. \
                Set it via: export WAGW_DEVICE_STORE_PATH=/var/lib/wagw/device.json"
            );
        }

        if self.webhook_url.starts_with("http://")
            && !self.webhook_url.starts_with("http://localhost")
            && !self.webhook_url.starts_with("http://127.0.0.1")
        {
            eprintln!(
                "WARNING: WAGW_WEBHOOK_URL uses HTTP (not HTTPS) for a remote host. \
                Inbound messages will be sent unencrypted."
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "WAGW_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        self.gateway_config().validate()?;
        Ok(())
    }

    /// Library configuration derived from the environment
    fn gateway_config(&self) -> GatewayConfig {
        let mut config = GatewayConfig::new();
        config.http.bind_addr = self.bind_addr.clone();
        config.http.port = self.port;
        config.webhook.url = self.webhook_url.clone();
        config.webhook.timeout_secs = self.webhook_timeout_secs;
        config.webhook.queue_capacity = self.webhook_queue_capacity;
        config.webhook.max_retries = self.webhook_max_retries;
        config.webhook.retry_delay_ms = self.webhook_retry_delay_ms;
        config.send.timeout_secs = self.send_timeout_secs;
        config.session.reconnect = self.reconnect;
        config.session.reconnect_delay_ms = self.reconnect_delay_ms;
        config.session.connect_timeout_ms = self.connect_timeout_ms;
        config
    }

    fn log_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer. Got: '{}'", key, raw)),
    }
}

fn parse_bool(key: &str, raw: Option<String>, default: bool) -> Result<bool> {
    match raw.as_deref().map(|s| s.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => anyhow::bail!("{} must be true or false. Got: '{}'", key, v),
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return WagwExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return WagwExitCode::ConfigError.into();
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level())
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return WagwExitCode::ConfigError.into();
    }

    info!("Starting wagwd daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return WagwExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {}", e);
            WagwExitCode::RuntimeError
        } else {
            WagwExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let gateway_config = config.gateway_config();

    let store: Arc<dyn DeviceStore> = match config.device_store_type.as_str() {
        "memory" => {
            warn!("Using in-memory device store: pairing is lost on restart");
            Arc::new(MemoryDeviceStore::new())
        }
        _ => {
            info!("Device store: {}", config.device_store_path);
            Arc::new(FileDeviceStore::new(&config.device_store_path).await?)
        }
    };

    let client = build_client(&config, store.clone())?;
    info!("WhatsApp client: {}", client.client_name());

    let sink: Arc<dyn WebhookSink> = Arc::new(HttpWebhookSink::with_timeout(
        gateway_config.webhook.url.clone(),
        gateway_config.webhook.timeout(),
    )?);
    let (dispatcher, webhook_worker) = WebhookDispatcher::spawn(
        sink,
        gateway_config.webhook.queue_capacity,
        gateway_config.webhook.policy(),
    );

    let (engine, mut engine_events) =
        GatewayEngine::new(client.clone(), store.as_ref(), dispatcher, &gateway_config).await?;
    let ctx = engine.context();

    let gateway = Arc::new(SendGateway::new(
        ctx.clone(),
        client,
        gateway_config.send.timeout(),
    ));
    let router = create_router(AppState::new(ctx, gateway, &gateway_config.http));

    let listen_addr = gateway_config.http.listen_addr();
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", listen_addr, e))?;

    info!("WhatsApp gateway listening on http://{}", listener.local_addr()?);
    info!("Webhook: {}", gateway_config.webhook.url);
    info!("");
    info!("Endpoints:");
    info!("  GET  /         - Service info");
    info!("  GET  /qr       - Current pairing code");
    info!("  GET  /status   - Connection status");
    info!("  POST /send     - Send a text message {{number, message}}");
    info!("  POST /webhook  - Send a text message {{to, message}}");

    tokio::spawn(async move {
        while let Some(event) = engine_events.recv().await {
            debug!("Gateway event: {:?}", event);
        }
    });

    let (engine_stop_tx, engine_stop_rx) = tokio::sync::oneshot::channel();
    let mut engine_task =
        tokio::spawn(async move { engine.run_with_shutdown(Some(engine_stop_rx)).await });

    let (http_stop_tx, http_stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server_task = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = http_stop_rx.await;
            })
            .await
    });

    tokio::select! {
        signal = wait_for_shutdown_signal() => {
            info!("Received shutdown signal: {}", signal?);
        }
        result = &mut engine_task => {
            let _ = http_stop_tx.send(());
            return match result {
                Ok(Ok(())) => Err(anyhow::anyhow!("Gateway engine stopped unexpectedly")),
                Ok(Err(e)) => Err(anyhow::anyhow!("Gateway engine failed: {}", e)),
                Err(e) => Err(anyhow::anyhow!("Gateway engine task panicked: {}", e)),
            };
        }
    }

    info!("Shutting down daemon");
    let _ = engine_stop_tx.send(());
    let _ = http_stop_tx.send(());

    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        match engine_task.await {
            Ok(Err(e)) => error!("Gateway engine error during shutdown: {}", e),
            Err(e) => error!("Gateway engine task failed: {}", e),
            Ok(Ok(())) => {}
        }
        match server_task.await {
            Ok(Err(e)) => error!("HTTP server error: {}", e),
            Err(e) => error!("HTTP server task failed: {}", e),
            Ok(Ok(())) => {}
        }
        // The engine owned the last dispatcher handle, so the worker now
        // drains what is queued and stops.
        match webhook_worker.await {
            Ok(stats) => info!(
                "Webhook queue drained ({} delivered, {} failed)",
                stats.delivered, stats.failed
            ),
            Err(e) => error!("Webhook worker failed: {}", e),
        }
    })
    .await;

    if drained.is_err() {
        warn!("Shutdown did not complete within {:?}", DRAIN_TIMEOUT);
    }

    Ok(())
}

#[cfg(feature = "loopback")]
fn build_client(config: &Config, store: Arc<dyn DeviceStore>) -> Result<Arc<dyn WhatsAppClient>> {
    use wagw_client_loopback::LoopbackClient;

    let mut client = LoopbackClient::new(store).with_echo(config.loopback_echo);
    if let Some(secs) = config.loopback_auto_pair_secs {
        info!("Loopback client will pair automatically after {}s", secs);
        client = client.with_auto_pair(Duration::from_secs(secs), "5500000000000:1@s.whatsapp.net");
    }
    Ok(Arc::new(client))
}

#[cfg(not(feature = "loopback"))]
fn build_client(config: &Config, _store: Arc<dyn DeviceStore>) -> Result<Arc<dyn WhatsAppClient>> {
    anyhow::bail!(
        "WAGW_CLIENT '{}' was not compiled in. Rebuild with --features {}",
        config.client_type,
        config.client_type
    )
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(signal)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
