//! Minimal standalone server: admits every peer and answers each request
//! envelope by echoing its params back as the result.
//!
//! Listens on `HAWSER_ADDR` (default `127.0.0.1:9000`); log level via
//! `RUST_LOG`.

use std::sync::Arc;

use serde_json::json;

use hawser_core::envelope::Request;
use hawser_core::logging::init_subscriber;
use hawser_server::admission::AcceptAll;
use hawser_server::config::RegistryConfig;
use hawser_server::registry::{RegistryEvent, SessionRegistry};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_subscriber("info");

    let addr = std::env::var("HAWSER_ADDR").unwrap_or_else(|_| "127.0.0.1:9000".to_owned());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let (registry, mut events) =
        SessionRegistry::new(RegistryConfig::default(), Arc::new(AcceptAll));

    let responder = Arc::clone(&registry);
    drop(tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let RegistryEvent::Message { session_id, frame } = event else {
                continue;
            };
            let Some(value) = frame.as_value() else {
                continue;
            };
            match serde_json::from_value::<Request>(value.clone()) {
                Ok(request) => {
                    let _ = responder.reply(
                        session_id,
                        Ok(json!({ "echo": request.params })),
                        request.id,
                    );
                }
                Err(error) => {
                    let _ = responder.reply(session_id, Err(error.to_string()), None);
                }
            }
        }
    }));

    registry.serve(listener).await
}
