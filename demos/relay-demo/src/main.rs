//! Relay server demo.
//!
//! Run with: cargo run -p relay-demo
//!
//! The issued token is logged on startup. Then:
//!
//! ```text
//! curl -H "Authorization: Bearer $TOKEN" -d '{"content":"hi"}' localhost:3000/mcp
//! curl -N -H "Authorization: Bearer $TOKEN" -H "Accept: text/event-stream" \
//!      -d '{"type":"progress","content":"5"}' localhost:3000/mcp
//! ```

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use futures::{StreamExt, stream};
use relay_auth::AuthProvider;
use relay_core::{Context, Memory, Message, MessageType, Progress, RelayConfig};
use relay_server::{
    Chunk, Flow, HandlerError, RelayRequest, RelayResponse, Reply, Server,
    protocol::SESSION_HEADER,
};
use serde_json::json;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const STEP_DELAY: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = RelayConfig::from_env();

    let auth = Arc::new(AuthProvider::from_config(&config.auth));
    let token = auth.generate_token(Some("demo"));
    tracing::info!(%token, expires_in = ?auth.expiry_time(), "Issued demo token");

    let server = Arc::new(Server::new(&config).with_auth(Arc::clone(&auth)));
    let context = Arc::new(Context::with_memory(Arc::new(Memory::new(
        config.memory.max_size,
    ))));
    register(&server, &context);

    Arc::clone(server.sessions()).spawn_sweeper(SWEEP_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let removed = auth.clear_expired_tokens();
            if removed > 0 {
                tracing::info!(removed, "Cleared expired tokens");
            }
        }
    });

    let app = relay_server::router(server).layer(cors(&config.server.allowed_origins));

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!("Relay listening on http://{addr}/mcp");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn register(server: &Server, context: &Arc<Context>) {
    // liveness probe, answered before authentication
    server.register_middleware(|request: &RelayRequest| {
        if request.header("x-relay-ping").is_some() {
            Flow::Respond(RelayResponse::json(StatusCode::OK, json!({"status": "ok"})))
        } else {
            Flow::Continue
        }
    });

    let ctx = Arc::clone(context);
    server.register_handler(MessageType::Text, move |message: Message| {
        let ctx = Arc::clone(&ctx);
        async move {
            let reply = Message::assistant(format!("Echo: {}", message.content()));
            ctx.set("last_message", message.content());
            ctx.add_message(message);
            ctx.add_message(reply.clone());
            Ok::<_, HandlerError>(Reply::Message(reply))
        }
    });

    let ctx = Arc::clone(context);
    server.register_handler(
        MessageType::Custom("history".into()),
        move |_: Message| {
            let ctx = Arc::clone(&ctx);
            async move {
                let snapshot = serde_json::to_value(ctx.snapshot()).map_err(anyhow::Error::from)?;
                Ok::<_, HandlerError>(Reply::Json(snapshot))
            }
        },
    );

    server.register_handler(MessageType::Custom("progress".into()), progress);
}

/// Count to the requested number of steps, reporting each one.
async fn progress(message: Message) -> Result<Reply, HandlerError> {
    let steps = message.content().trim().parse::<u32>().unwrap_or(5).clamp(1, 20);
    let progress =
        Arc::new(Progress::new(f64::from(steps)).map_err(|e| HandlerError::failed(e.to_string()))?);

    let updates = stream::iter(1..=steps).then(move |step| {
        let progress = Arc::clone(&progress);
        async move {
            tokio::time::sleep(STEP_DELAY).await;
            progress.update(f64::from(step), Some(&format!("step {step} of {steps}")), None);
            let snapshot =
                serde_json::to_value(progress.snapshot()).map_err(anyhow::Error::from)?;
            Ok::<_, HandlerError>(Chunk::new("progress", snapshot))
        }
    });
    let done = stream::once(async {
        Ok::<_, HandlerError>(Chunk::from_message(&Message::assistant("Done")))
    });

    Ok(Reply::stream(updates.chain(done)))
}

fn cors(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(SESSION_HEADER)])
}
