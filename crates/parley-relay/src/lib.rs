//! parley-relay: WebSocket server for parley voice rooms.
//!
//! Accepts WebSocket connections, hands each one to the room it joins, and
//! relays frames between the client and that room's actor.

pub mod connection;
pub mod room_source;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

use parley_ai::{
    LlmSummarizer, LlmSummarizerConfig, SummarizationService, Summarizer, WsRealtimeConnector,
};
use parley_config::ParleyConfig;
use parley_social::{RegistryHandle, RoomSettings, ServerServices};

pub use connection::handle_connection;
pub use room_source::HttpRoomSource;

/// Wire the production collaborators from `config`.
///
/// API keys come from the environment variables the config names. A missing
/// realtime key leaves the connector in place; connects then fail and the
/// room reports `ai:error`.
pub fn build_services(config: &ParleyConfig) -> Result<ServerServices, reqwest::Error> {
    let realtime_key = std::env::var(&config.ai.api_key_env).unwrap_or_default();
    if realtime_key.is_empty() {
        tracing::warn!(env = %config.ai.api_key_env, "No realtime API key; AI turns will fail");
    }
    let connector = WsRealtimeConnector::new(
        config.ai.realtime_url.clone(),
        config.ai.model.clone(),
        realtime_key,
        Duration::from_secs(config.ai.connect_timeout_secs),
    );

    let summarization = SummarizationService::new(llm_summarizer(config));
    let source = HttpRoomSource::new(
        &config.rooms.config_api_url,
        Duration::from_secs(config.rooms.config_api_timeout_secs),
    )?;

    Ok(ServerServices {
        connector: Arc::new(connector),
        summarization,
        source: Arc::new(source),
        settings: Arc::new(RoomSettings::from(config)),
    })
}

fn llm_summarizer(config: &ParleyConfig) -> Option<Arc<dyn Summarizer>> {
    let s = &config.summarization;
    if !s.enabled {
        return None;
    }
    let api_key = std::env::var(&s.api_key_env).ok().filter(|k| !k.is_empty())?;
    let summarizer = LlmSummarizer::new(LlmSummarizerConfig {
        url: s.llm_url.clone(),
        model: s.llm_model.clone(),
        api_key,
        timeout: Duration::from_secs(s.request_timeout_secs),
    });
    match summarizer {
        Ok(summarizer) => Some(Arc::new(summarizer)),
        Err(e) => {
            tracing::warn!(error = %e, "LLM summarizer unavailable; using heuristic summaries");
            None
        }
    }
}

/// Accept connections forever.
pub async fn serve(listener: TcpListener, registry: RegistryHandle, hello_timeout: Duration) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let registry = registry.clone();
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => handle_connection(ws, addr, registry, hello_timeout).await,
                        Err(e) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}
