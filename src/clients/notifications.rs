use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Connection, ConnectionStatus};

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionEvent {
    Requested,
    Resolved,
}

#[derive(Debug, Serialize)]
pub struct ConnectionEventPayload {
    pub event: ConnectionEvent,
    pub connection_id: Uuid,
    pub listing_id: Uuid,
    pub buyer_id: Uuid,
    pub status: ConnectionStatus,
    pub seller_initiated: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Client for the companion notifications service. Deliveries are
/// best-effort; callers log failures and move on.
#[derive(Clone)]
pub struct NotificationsClient {
    client: reqwest::Client,
    base_url: String,
}

impl NotificationsClient {
    pub fn new(base_url: String) -> Self {
        let normalized = normalize_base_url(&base_url);
        Self {
            client: reqwest::Client::new(),
            base_url: normalized,
        }
    }

    pub async fn connection_event(
        &self,
        event: ConnectionEvent,
        connection: &Connection,
    ) -> Result<(), String> {
        let payload = ConnectionEventPayload {
            event,
            connection_id: connection.id,
            listing_id: connection.listing_id,
            buyer_id: connection.buyer_id,
            status: connection.status,
            seller_initiated: connection.seller_initiated,
            occurred_at: Utc::now(),
        };

        let url = format!("{}/notifications/connection", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(format!("Failed to deliver notification: {}", text));
        }

        Ok(())
    }
}

fn normalize_base_url(value: &str) -> String {
    let trimmed = value.trim_end_matches('/');
    if trimmed.ends_with("/api/v1") {
        trimmed.to_string()
    } else {
        format!("{}/api/v1", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized_once() {
        assert_eq!(
            normalize_base_url("http://localhost:8084"),
            "http://localhost:8084/api/v1"
        );
        assert_eq!(
            normalize_base_url("http://localhost:8084/api/v1/"),
            "http://localhost:8084/api/v1"
        );
    }
}
