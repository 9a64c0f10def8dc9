//! Integration tests for subscription acknowledgement tracking and raw
//! message envelope round-tripping.

use fra_ws::{ReadyState, SubscriptionManager, WsMessage, WsRequest};

#[test]
fn payload_message_round_trips_through_json() {
    let raw = r#"{"e":"markPriceUpdate","s":"BTCUSDT","p":"61234.50"}"#;
    let value: serde_json::Value = serde_json::from_str(raw).expect("parse");
    let msg = WsMessage::Payload(value.clone());

    match msg {
        WsMessage::Payload(v) => assert_eq!(v, value),
        WsMessage::Pong => panic!("expected Payload"),
    }
}

#[test]
fn request_serializes_caller_supplied_payload_verbatim() {
    let payload = serde_json::json!({"method": "SUBSCRIBE", "params": ["btcusdt@markPrice"], "id": 1});
    let request = WsRequest::new(payload.clone());
    let text = request.to_text().expect("serialize");
    let round_tripped: serde_json::Value = serde_json::from_str(&text).expect("parse back");
    assert_eq!(round_tripped, payload);
}

#[test]
fn subscription_manager_tracks_ack_until_all_symbols_confirmed() {
    let manager = SubscriptionManager::new();
    manager.add_subscription("BTCUSDT");
    manager.add_subscription("ETHUSDT");
    assert_eq!(manager.ready_state(), ReadyState::Pending);

    manager.handle_message("BTCUSDT");
    assert_eq!(manager.ready_state(), ReadyState::Pending);

    manager.handle_message("ETHUSDT");
    assert_eq!(manager.ready_state(), ReadyState::Ready);
}

#[test]
fn subscription_manager_removal_drops_symbol_from_set() {
    let manager = SubscriptionManager::new();
    manager.add_subscription("BTCUSDT");
    manager.handle_message("BTCUSDT");
    assert_eq!(manager.ready_state(), ReadyState::Ready);

    manager.remove_subscription("BTCUSDT");
    assert_eq!(manager.count(), 0);
}
