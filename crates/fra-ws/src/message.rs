//! Wire-level WebSocket message envelope.
//!
//! `fra-ws` is transport-only: it does not know any venue's JSON schema.
//! Inbound frames are forwarded as raw `serde_json::Value` payloads;
//! `fra-adapter` is responsible for interpreting them into typed domain
//! events (spec §4.1's `fundingRate`/`markPrice`/... event channel).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A raw inbound message, tagged with whether it was recognized as a
/// transport-level pong (and therefore already consumed by the heartbeat
/// manager) or should be forwarded downstream.
#[derive(Debug, Clone)]
pub enum WsMessage {
    /// Application-level pong/heartbeat ack — consumed internally.
    Pong,
    /// Any other payload, forwarded to the adapter for interpretation.
    Payload(Value),
}

/// An outbound control request (subscribe/unsubscribe/ping). The payload
/// is venue-specific JSON built by the caller (fra-adapter); fra-ws only
/// serializes and sends it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsRequest {
    pub payload: Value,
}

impl WsRequest {
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }

    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.payload)
    }
}
