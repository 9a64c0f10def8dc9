//! Repository and Keystore contracts consumed by the core (spec §6).
//!
//! These are narrow traits; any conforming store (Postgres, SQLite, an
//! in-memory test double) may implement them. `fra-persistence` ships the
//! in-memory reference implementation and an audit-log writer.

use chrono::{DateTime, Utc};
use zeroize::Zeroizing;

use crate::error::Result;
use crate::ids::{OpportunityId, PositionId};
use crate::model::{ArbitrageOpportunity, OpportunityHistory, Position, Trade};

/// A sparse patch applied to a `Position`. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct PositionPatch {
    pub status: Option<crate::model::PositionStatus>,
    pub conditional_order_status: Option<crate::model::ConditionalOrderStatus>,
    pub exit_suggested: Option<bool>,
    pub exit_suggest_reason: Option<Option<crate::model::ExitSuggestReason>>,
    pub exit_suggested_at: Option<Option<DateTime<Utc>>>,
    pub cached_cumulative_funding_pnl: Option<crate::decimal::Money>,
}

/// A webhook subscription for notification delivery (spec §4.10, §6).
#[derive(Debug, Clone)]
pub struct NotificationWebhook {
    pub id: String,
    pub user_id: String,
    pub platform: String,
    pub url: String,
    pub enabled: bool,
    pub rate_threshold: Option<crate::decimal::Rate>,
    /// Allowed minute-of-hour values for delivery (spec §6
    /// `notificationMinuteWindows`).
    pub allowed_minutes: Vec<u8>,
    /// Whether this webhook receives `opportunityExpired` in addition to
    /// `opportunityDetected`/`exitSuggested` (spec §4.10).
    pub notify_on_expiry: bool,
}

/// Per-user trading settings relevant to the exit monitor (spec §4.7).
#[derive(Debug, Clone)]
pub struct TradingSettings {
    pub user_id: String,
    pub exit_suggestions_enabled: bool,
    pub apy_threshold: rust_decimal::Decimal,
}

/// A decrypted API credential for one venue, held only for the duration of
/// one call and zeroed on drop (spec §5, §9 credential handling).
#[derive(Debug)]
pub struct ApiCredential {
    pub venue: crate::ids::Venue,
    pub api_key: Zeroizing<String>,
    pub api_secret: Zeroizing<String>,
    pub passphrase: Option<Zeroizing<String>>,
}

/// The persistent-storage contract required by the core (spec §6).
///
/// Every method name below corresponds 1:1 to a bullet in spec §6's
/// Repository contract.
#[allow(async_fn_in_trait)]
pub trait Repository: Send + Sync {
    async fn find_position_by_id(&self, id: PositionId) -> Result<Option<Position>>;
    async fn find_positions_by_user_id(&self, user_id: &str) -> Result<Vec<Position>>;
    async fn find_open_positions_by_symbol(&self, symbol: &str) -> Result<Vec<Position>>;
    async fn update_position(&self, id: PositionId, patch: PositionPatch) -> Result<Position>;

    async fn create_trade(&self, trade: Trade) -> Result<()>;

    async fn find_api_keys_by_user(
        &self,
        user_id: &str,
        venues: &[crate::ids::Venue],
    ) -> Result<Vec<ApiCredential>>;

    async fn find_active_opportunity(
        &self,
        symbol: &str,
        long_venue: &crate::ids::Venue,
        short_venue: &crate::ids::Venue,
    ) -> Result<Option<ArbitrageOpportunity>>;
    async fn create_opportunity(&self, opportunity: ArbitrageOpportunity) -> Result<()>;
    async fn update_opportunity(&self, opportunity: ArbitrageOpportunity) -> Result<()>;
    async fn find_all_active_opportunities(&self, limit: usize) -> Result<Vec<ArbitrageOpportunity>>;

    async fn create_opportunity_history(&self, history: OpportunityHistory) -> Result<()>;

    async fn find_enabled_webhooks_by_user(&self, user_id: &str) -> Result<Vec<NotificationWebhook>>;

    async fn find_trading_settings_by_user(&self, user_id: &str) -> Result<Option<TradingSettings>>;

    async fn record_audit_event(&self, event: AuditEvent) -> Result<()>;
}

/// An entry written to the audit log (spec §9 "the audit log records every
/// decryption with the issuing user and purpose").
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub at: DateTime<Utc>,
    pub user_id: Option<String>,
    pub purpose: String,
    pub detail: String,
}

impl AuditEvent {
    pub fn new(purpose: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            user_id: None,
            purpose: purpose.into(),
            detail: detail.into(),
        }
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Keystore contract: hands out short-lived decrypted credentials (spec §5,
/// §9). Callers never cache the returned credential beyond the current
/// operation; the `Zeroizing` wrapper clears the buffer on drop.
#[allow(async_fn_in_trait)]
pub trait Keystore: Send + Sync {
    async fn decrypt_credential(
        &self,
        user_id: &str,
        venue: &crate::ids::Venue,
        purpose: &str,
    ) -> Result<Option<ApiCredential>>;
}
