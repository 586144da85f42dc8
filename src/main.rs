use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use panrouter::dispatcher::{HandlerRequest, HandlerResponse};
use panrouter::logging::{init_logging_with_config, LogConfig};
use panrouter::middleware::{MetricsMiddleware, TracingMiddleware};
use panrouter::router::Router;
use panrouter::runtime_config::{parse_size, RuntimeConfig};
use panrouter::server::{AppService, HttpServer, WsServer};
use panrouter::upgrade::{ConnectionHandler, EchoConnection};
use panrouter::ValidationError;

/// Command-line interface for the panrouter demo service
#[derive(Parser)]
#[command(name = "panrouter", version, about = "panrouter demo service", long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true, env = "PAN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and WebSocket listeners
    Serve {
        /// HTTP listen address (overrides config and PAN_HTTP_ADDR)
        #[arg(long)]
        http_addr: Option<String>,

        /// WebSocket listen address (overrides config and PAN_WS_ADDR)
        #[arg(long)]
        ws_addr: Option<String>,

        /// Coroutine stack size, decimal or 0x hex
        #[arg(long, value_parser = parse_stack_size)]
        stack_size: Option<usize>,
    },
    /// Print the routing table and exit
    Routes,
}

fn parse_stack_size(raw: &str) -> Result<usize, String> {
    parse_size(raw).ok_or_else(|| format!("invalid stack size '{raw}'"))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BroadcastPayload {
    message: String,
}

fn health(_req: &mut HandlerRequest, res: &mut HandlerResponse) -> anyhow::Result<()> {
    res.write_json(&json!({ "status": "ok" }))?;
    Ok(())
}

fn build_router() -> anyhow::Result<Router> {
    let mut router = Router::new();
    let sessions = router.sessions();

    router.get("/health", health)?;
    router.mount("/api", |api| {
        api.filter("", |req: &mut HandlerRequest, _res: &mut HandlerResponse| {
            req.set_attribute("api", "v1");
            Ok(())
        })?;
        api.get("/sessions", move |_req: &mut HandlerRequest, res: &mut HandlerResponse| {
            let ids: Vec<String> = sessions.ids().iter().map(ToString::to_string).collect();
            res.write_json(&json!({ "sessions": ids }))?;
            Ok(())
        })?;
        Ok(())
    })?;

    let sessions = router.sessions();
    router.post("/api/broadcast", move |req: &mut HandlerRequest, res: &mut HandlerResponse| {
        let payload: BroadcastPayload = req.body_json()?;
        if payload.message.is_empty() {
            return Err(ValidationError::new("message is empty").into());
        }
        let failed = sessions.broadcast(&payload.message);
        res.write_json(&json!({
            "delivered": sessions.len().saturating_sub(failed.len()),
            "failed": failed.len(),
        }))?;
        Ok(())
    })?;

    router.upgrade("/echo", || Box::new(EchoConnection::default()) as Box<dyn ConnectionHandler>)?;
    Ok(router)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging_with_config(&LogConfig::from_env())?;

    let mut config = RuntimeConfig::load(cli.config.as_deref())?;
    let router = build_router().context("Failed to register routes")?;

    match cli.command {
        Commands::Routes => {
            router.dump_routes();
            Ok(())
        }
        Commands::Serve {
            http_addr,
            ws_addr,
            stack_size,
        } => {
            if let Some(addr) = http_addr {
                config.http_addr = addr;
            }
            if let Some(addr) = ws_addr {
                config.ws_addr = addr;
            }
            if let Some(size) = stack_size {
                config.stack_size = size;
            }
            config.apply();

            let (mut dispatcher, bridge) = router.build();
            let metrics = Arc::new(MetricsMiddleware::new());
            dispatcher.add_middleware(metrics.clone());
            dispatcher.add_middleware(Arc::new(TracingMiddleware));

            let mut service = AppService::new(Arc::new(dispatcher));
            service.set_metrics_middleware(metrics);

            let ws = WsServer::new(Arc::new(bridge))
                .with_poll_interval(config.ws_poll_interval())
                .start(config.ws_addr.as_str())
                .with_context(|| format!("Failed to bind WebSocket listener on {}", config.ws_addr))?;
            let http = HttpServer(service)
                .start(config.http_addr.as_str())
                .with_context(|| format!("Failed to bind HTTP listener on {}", config.http_addr))?;

            info!(
                http_addr = %http.addr(),
                ws_addr = %ws.addr(),
                stack_size = config.stack_size,
                "panrouter listening"
            );

            http.join()
                .map_err(|_| anyhow::anyhow!("HTTP server coroutine panicked"))?;
            ws.stop();
            Ok(())
        }
    }
}
