//! Identity-provider webhook
//!
//! The provider delivers user lifecycle events through svix. Each delivery
//! is signed with HMAC-SHA256 over `"{svix-id}.{svix-timestamp}.{body}"`
//! using the base64 key inside the `whsec_` secret.

use crate::core::config::AppState;
use crate::core::error::{Error, Result};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Deliveries older or newer than this are rejected (replay window).
const TIMESTAMP_TOLERANCE_SECS: i64 = 5 * 60;

const SECRET_PREFIX: &str = "whsec_";

pub struct WebhookVerifier {
    key: Vec<u8>,
}

impl WebhookVerifier {
    pub fn new(secret: &str) -> Result<Self> {
        let encoded = secret.strip_prefix(SECRET_PREFIX).unwrap_or(secret);
        if encoded.is_empty() {
            return Err(Error::WebhookInvalid("webhook secret not configured".into()));
        }
        let key = STANDARD
            .decode(encoded)
            .map_err(|e| Error::WebhookInvalid(format!("bad webhook secret: {}", e)))?;
        Ok(Self { key })
    }

    fn mac(&self, msg_id: &str, timestamp: &str, payload: &str) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| Error::Internal(e.to_string()))?;
        mac.update(format!("{}.{}.", msg_id, timestamp).as_bytes());
        mac.update(payload.as_bytes());
        Ok(mac)
    }

    /// Signature header value (`v1,<base64>`) for a delivery
    pub fn sign(&self, msg_id: &str, timestamp: i64, payload: &str) -> Result<String> {
        let mac = self.mac(msg_id, &timestamp.to_string(), payload)?;
        Ok(format!("v1,{}", STANDARD.encode(mac.finalize().into_bytes())))
    }

    pub fn verify(&self, headers: &HeaderMap, payload: &str, now_secs: i64) -> Result<()> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| Error::WebhookInvalid(format!("missing {} header", name)))
        };
        let msg_id = header("svix-id")?;
        let timestamp = header("svix-timestamp")?;
        let signatures = header("svix-signature")?;

        let sent_at: i64 = timestamp
            .parse()
            .map_err(|_| Error::WebhookInvalid("bad timestamp".into()))?;
        if (now_secs - sent_at).abs() > TIMESTAMP_TOLERANCE_SECS {
            return Err(Error::WebhookInvalid("timestamp outside tolerance".into()));
        }

        let mac = self.mac(msg_id, timestamp, payload)?;

        // Space-separated list of "version,signature"; any v1 match is enough.
        let matched = signatures
            .split_whitespace()
            .filter_map(|entry| entry.split_once(','))
            .filter(|(version, _)| *version == "v1")
            .filter_map(|(_, sig)| STANDARD.decode(sig).ok())
            .any(|sig| mac.clone().verify_slice(&sig).is_ok());

        if matched {
            Ok(())
        } else {
            Err(Error::WebhookInvalid("no matching signature".into()))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct EmailAddress {
    pub email_address: String,
}

/// The parts of the provider's user object we keep
#[derive(Debug, Deserialize)]
pub struct ProviderUser {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub email_addresses: Vec<EmailAddress>,
}

impl ProviderUser {
    pub fn display_name(&self) -> String {
        let name = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let name = name.trim();
        if name.is_empty() {
            "Unknown User".to_string()
        } else {
            name.to_string()
        }
    }

    pub fn primary_email(&self) -> &str {
        self.email_addresses
            .first()
            .map(|e| e.email_address.as_str())
            .unwrap_or("")
    }
}

/// POST /clerk-user-webhook
pub async fn clerk_user_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode> {
    let verifier = WebhookVerifier::new(&state.config.webhook_secret)?;
    if let Err(e) = verifier.verify(&headers, &body, chrono::Utc::now().timestamp()) {
        warn!("[Webhook] Rejected delivery: {}", e);
        return Err(e);
    }

    let event: WebhookEvent = serde_json::from_str(&body)
        .map_err(|e| Error::WebhookInvalid(format!("malformed payload: {}", e)))?;
    info!("[Webhook] Validated {} event", event.event_type);

    match event.event_type.as_str() {
        "user.created" | "user.updated" => {
            let user: ProviderUser = serde_json::from_value(event.data)
                .map_err(|e| Error::WebhookInvalid(format!("malformed user: {}", e)))?;
            info!("[Webhook] Creating/updating user {}", user.id);
            state
                .users
                .upsert(
                    &user.id,
                    &user.display_name(),
                    user.image_url.as_deref().unwrap_or(""),
                    user.primary_email(),
                )
                .await?;
        }
        other => info!("[Webhook] Unhandled event type: {}", other),
    }

    Ok(StatusCode::OK)
}
