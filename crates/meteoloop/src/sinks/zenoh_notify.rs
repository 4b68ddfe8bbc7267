//! Zenoh notification channel.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use zenoh::bytes::Encoding;

use super::{Notification, Notifier, Result, SinkError};

/// Router endpoint used when neither env nor config names one.
pub const DEFAULT_ZENOH_ENDPOINT: &str = "tcp/127.0.0.1:7447";

/// Resolve the router endpoint.
///
/// Resolution order:
/// 1. `ZENOH_ENDPOINT` env var
/// 2. `METEOLOOP_ZENOH_ENDPOINT` env var
/// 3. Provided `endpoint` argument
/// 4. Default: `tcp/127.0.0.1:7447`
pub fn resolve_endpoint(endpoint: Option<&str>) -> String {
    std::env::var("ZENOH_ENDPOINT")
        .or_else(|_| std::env::var("METEOLOOP_ZENOH_ENDPOINT"))
        .ok()
        .or_else(|| endpoint.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_ZENOH_ENDPOINT.to_string())
}

/// Open a Zenoh session in client mode with scouting disabled.
pub async fn open_session(endpoint: Option<&str>) -> Result<Arc<zenoh::Session>> {
    let endpoint = resolve_endpoint(endpoint);
    log::info!("Connecting to Zenoh at: {}", endpoint);

    let mut config = zenoh::Config::default();
    let settings = [
        ("mode", r#""client""#.to_string()),
        ("connect/endpoints", format!(r#"["{}"]"#, endpoint)),
        ("scouting/multicast/enabled", "false".to_string()),
        ("scouting/gossip/enabled", "false".to_string()),
    ];
    for (key, value) in settings {
        config
            .insert_json5(key, &value)
            .map_err(|e| SinkError::Zenoh(format!("failed to set {}: {}", key, e)))?;
    }

    let session = zenoh::open(config)
        .await
        .map_err(|e| SinkError::Zenoh(format!("failed to open session: {}", e)))?;

    log::info!("Connected to Zenoh");
    Ok(Arc::new(session))
}

/// Substitute `{machine_id}` in a key expression with the local hostname.
///
/// Dashes become underscores so the result stays a single clean chunk.
pub fn expand_key_expr(template: &str) -> String {
    if !template.contains("{machine_id}") {
        return template.to_string();
    }
    let machine_id = std::env::var("METEOLOOP_MACHINE_ID")
        .unwrap_or_else(|_| {
            hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string())
        })
        .replace('-', "_");
    template.replace("{machine_id}", &machine_id)
}

/// Publishes notifications as JSON `{subject, message}` on one key expression.
pub struct ZenohNotifier {
    session: Arc<zenoh::Session>,
    key_expr: String,
}

impl ZenohNotifier {
    pub fn new(session: Arc<zenoh::Session>, key_expr: &str) -> Result<Self> {
        let key_expr = expand_key_expr(key_expr);
        zenoh::key_expr::KeyExpr::try_from(key_expr.clone())
            .map_err(|e| SinkError::Zenoh(format!("invalid key expression '{}': {}", key_expr, e)))?;
        Ok(Self { session, key_expr })
    }

    pub fn key_expr(&self) -> &str {
        &self.key_expr
    }
}

/// Wire payload of a published notification.
pub fn encode_notification(notification: &Notification) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&json!({
        "subject": notification.subject,
        "message": notification.message,
    }))?)
}

#[async_trait]
impl Notifier for ZenohNotifier {
    async fn publish(&self, notification: &Notification) -> Result<()> {
        let payload = encode_notification(notification)?;
        self.session
            .put(self.key_expr.clone(), payload)
            .encoding(Encoding::APPLICATION_JSON)
            .await
            .map_err(|e| SinkError::Zenoh(format!("publish on '{}' failed: {}", self.key_expr, e)))?;
        log::debug!("Published notification on {}", self.key_expr);
        Ok(())
    }
}
