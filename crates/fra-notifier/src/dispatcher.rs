//! Notifier Dispatcher (spec §4.10).
//!
//! Fans an event out to every one of the owning user's active webhooks
//! whose platform/threshold/minute-window filters pass, POSTing each in
//! parallel with per-webhook failure isolation: one webhook erroring
//! never prevents delivery to the others.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Timelike, Utc};
use fra_core::repository::{NotificationWebhook, Repository};
use reqwest::Client;
use tracing::warn;

use crate::event::NotifiableEvent;
use crate::payload::format_payload;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one webhook delivery attempt, for callers that want to
/// observe dispatch results (tests, telemetry).
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub webhook_id: String,
    pub delivered: bool,
    pub error: Option<String>,
}

pub struct NotifierDispatcher<R: Repository> {
    repository: Arc<R>,
    http: Client,
}

impl<R: Repository> NotifierDispatcher<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            http: Client::builder()
                .timeout(DELIVERY_TIMEOUT)
                .build()
                .expect("reqwest client builder never fails with these settings"),
        }
    }

    /// Dispatch `event` to every eligible webhook of `event.user_id()`.
    pub async fn dispatch(&self, event: NotifiableEvent) -> Vec<DeliveryOutcome> {
        let webhooks = match self
            .repository
            .find_enabled_webhooks_by_user(event.user_id())
            .await
        {
            Ok(hooks) => hooks,
            Err(e) => {
                warn!(error = %e, user_id = event.user_id(), "failed to load webhooks for dispatch");
                return Vec::new();
            }
        };

        let eligible: Vec<&NotificationWebhook> = webhooks
            .iter()
            .filter(|hook| self.passes_filters(hook, &event))
            .collect();

        let deliveries = eligible
            .into_iter()
            .map(|hook| self.deliver(hook, &event));
        futures_util::future::join_all(deliveries).await
    }

    fn passes_filters(&self, hook: &NotificationWebhook, event: &NotifiableEvent) -> bool {
        if event.requires_opt_in() && !hook.notify_on_expiry {
            return false;
        }
        if let (Some(threshold), Some(actual)) = (hook.rate_threshold, event.rate_difference()) {
            if actual.inner() < threshold.inner() {
                return false;
            }
        }
        if !hook.allowed_minutes.is_empty() {
            let minute = Utc::now().minute() as u8;
            if !hook.allowed_minutes.contains(&minute) {
                return false;
            }
        }
        true
    }

    async fn deliver(&self, hook: &NotificationWebhook, event: &NotifiableEvent) -> DeliveryOutcome {
        let payload = format_payload(&hook.platform, event);
        match self.http.post(&hook.url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => DeliveryOutcome {
                webhook_id: hook.id.clone(),
                delivered: true,
                error: None,
            },
            Ok(response) => DeliveryOutcome {
                webhook_id: hook.id.clone(),
                delivered: false,
                error: Some(format!("webhook returned status {}", response.status())),
            },
            Err(e) => {
                warn!(webhook_id = %hook.id, error = %e, "webhook delivery failed");
                DeliveryOutcome {
                    webhook_id: hook.id.clone(),
                    delivered: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fra_core::decimal::Rate;
    use fra_core::ids::{OpportunityId, Venue};
    use fra_persistence::InMemoryRepository;
    use rust_decimal_macros::dec;

    fn webhook(id: &str, threshold: Option<Rate>, minutes: Vec<u8>) -> NotificationWebhook {
        NotificationWebhook {
            id: id.into(),
            user_id: "u1".into(),
            platform: "slack".into(),
            url: "https://example.invalid/hook".into(),
            enabled: true,
            rate_threshold: threshold,
            allowed_minutes: minutes,
            notify_on_expiry: false,
        }
    }

    #[test]
    fn threshold_filter_rejects_below_configured_minimum() {
        let dispatcher_hook = webhook("w1", Some(Rate::new(dec!(0.01))), vec![]);
        let event = NotifiableEvent::OpportunityDetected {
            user_id: "u1".into(),
            opportunity_id: OpportunityId::new(),
            symbol: "BTCUSDT".into(),
            long_venue: Venue::new("okx"),
            short_venue: Venue::new("bingx"),
            rate_difference: Rate::new(dec!(0.005)),
            at: Utc::now(),
        };
        let repo = Arc::new(InMemoryRepository::new());
        let dispatcher = NotifierDispatcher::new(repo);
        assert!(!dispatcher.passes_filters(&dispatcher_hook, &event));
    }

    #[test]
    fn expired_event_requires_explicit_opt_in() {
        let hook = webhook("w1", None, vec![]);
        let event = NotifiableEvent::OpportunityExpired {
            user_id: "u1".into(),
            opportunity_id: OpportunityId::new(),
            symbol: "BTCUSDT".into(),
            long_venue: Venue::new("okx"),
            short_venue: Venue::new("bingx"),
            reason: fra_core::model::DisappearReason::RateDropped,
            at: Utc::now(),
        };
        let repo = Arc::new(InMemoryRepository::new());
        let dispatcher = NotifierDispatcher::new(repo);
        assert!(!dispatcher.passes_filters(&hook, &event));

        let mut opted_in = hook;
        opted_in.notify_on_expiry = true;
        assert!(dispatcher.passes_filters(&opted_in, &event));
    }
}
