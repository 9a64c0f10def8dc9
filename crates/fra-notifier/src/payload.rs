//! Per-platform webhook payload formatting (spec §4.10).
//!
//! Each platform expects a different JSON shape; this module is the one
//! place that knows the mapping from a `NotifiableEvent` to wire bytes.

use serde_json::{json, Value};

use crate::event::NotifiableEvent;

fn describe(event: &NotifiableEvent) -> String {
    match event {
        NotifiableEvent::OpportunityDetected {
            symbol,
            long_venue,
            short_venue,
            rate_difference,
            ..
        } => format!(
            "Arbitrage opportunity on {symbol}: long {long_venue} / short {short_venue}, diff {}",
            rate_difference.as_percent()
        ),
        NotifiableEvent::OpportunityExpired { symbol, reason, .. } => {
            format!("Arbitrage opportunity on {symbol} expired ({reason:?})")
        }
        NotifiableEvent::ExitSuggested { symbol, reason, .. } => {
            format!("Exit suggested for {symbol} ({reason:?})")
        }
    }
}

/// Format `event` for delivery to `platform`. Unknown platforms fall
/// back to a generic JSON envelope.
pub fn format_payload(platform: &str, event: &NotifiableEvent) -> Value {
    let text = describe(event);
    match platform {
        "slack" => json!({ "text": text }),
        "discord" => json!({ "content": text }),
        "telegram" => json!({ "text": text, "parse_mode": "Markdown" }),
        _ => json!({ "kind": event.kind(), "message": text }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fra_core::decimal::Rate;
    use fra_core::ids::{OpportunityId, Venue};
    use rust_decimal_macros::dec;

    fn detected() -> NotifiableEvent {
        NotifiableEvent::OpportunityDetected {
            user_id: "u1".into(),
            opportunity_id: OpportunityId::new(),
            symbol: "BTCUSDT".into(),
            long_venue: Venue::new("okx"),
            short_venue: Venue::new("bingx"),
            rate_difference: Rate::new(dec!(0.006)),
            at: Utc::now(),
        }
    }

    #[test]
    fn slack_payload_has_text_field() {
        let payload = format_payload("slack", &detected());
        assert!(payload.get("text").is_some());
    }

    #[test]
    fn discord_payload_has_content_field() {
        let payload = format_payload("discord", &detected());
        assert!(payload.get("content").is_some());
    }

    #[test]
    fn unknown_platform_falls_back_to_generic_envelope() {
        let payload = format_payload("carrier-pigeon", &detected());
        assert_eq!(payload.get("kind").unwrap(), "opportunity_detected");
    }
}
