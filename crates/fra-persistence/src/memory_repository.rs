//! In-memory reference implementation of the `Repository` contract
//! (spec §6). Suitable for tests and single-process deployments; a
//! conforming store backed by Postgres/SQLite/etc. can replace this
//! wholesale since every consumer depends only on the `Repository` trait.

use chrono::Utc;
use dashmap::DashMap;
use fra_core::ids::{OpportunityId, PositionId, Venue};
use fra_core::model::{ArbitrageOpportunity, OpportunityHistory, OpportunityStatus, Position, Trade};
use fra_core::repository::{
    ApiCredential, AuditEvent, NotificationWebhook, PositionPatch, Repository, TradingSettings,
};
use fra_core::{CoreError, Result};
use parking_lot::Mutex;

/// An in-memory store for positions, trades, opportunities, webhooks,
/// and trading settings. Credentials are never stored here; that is the
/// keystore's job (spec §9).
#[derive(Default)]
pub struct InMemoryRepository {
    positions: DashMap<PositionId, Position>,
    trades: Mutex<Vec<Trade>>,
    opportunities: DashMap<OpportunityId, ArbitrageOpportunity>,
    histories: Mutex<Vec<OpportunityHistory>>,
    webhooks: DashMap<String, Vec<NotificationWebhook>>,
    settings: DashMap<String, TradingSettings>,
    audit_log: Mutex<Vec<AuditEvent>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_position(&self, position: Position) {
        self.positions.insert(position.id, position);
    }

    pub fn seed_webhooks(&self, user_id: impl Into<String>, webhooks: Vec<NotificationWebhook>) {
        self.webhooks.insert(user_id.into(), webhooks);
    }

    pub fn seed_trading_settings(&self, settings: TradingSettings) {
        self.settings.insert(settings.user_id.clone(), settings);
    }

    pub fn trades(&self) -> Vec<Trade> {
        self.trades.lock().clone()
    }

    pub fn opportunity_histories(&self) -> Vec<OpportunityHistory> {
        self.histories.lock().clone()
    }

    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.audit_log.lock().clone()
    }
}

impl Repository for InMemoryRepository {
    async fn find_position_by_id(&self, id: PositionId) -> Result<Option<Position>> {
        Ok(self.positions.get(&id).map(|e| e.clone()))
    }

    async fn find_positions_by_user_id(&self, user_id: &str) -> Result<Vec<Position>> {
        Ok(self
            .positions
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn find_open_positions_by_symbol(&self, symbol: &str) -> Result<Vec<Position>> {
        use fra_core::model::PositionStatus;
        Ok(self
            .positions
            .iter()
            .filter(|e| e.symbol == symbol && e.status == PositionStatus::Open)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn update_position(&self, id: PositionId, patch: PositionPatch) -> Result<Position> {
        let mut entry = self
            .positions
            .get_mut(&id)
            .ok_or_else(|| CoreError::Conflict(format!("position {id} not found")))?;

        if let Some(status) = patch.status {
            entry.status = status;
        }
        if let Some(cos) = patch.conditional_order_status {
            entry.conditional_order_status = cos;
        }
        if let Some(suggested) = patch.exit_suggested {
            entry.exit_suggested = suggested;
        }
        if let Some(reason) = patch.exit_suggest_reason {
            entry.exit_suggest_reason = reason;
        }
        if let Some(at) = patch.exit_suggested_at {
            entry.exit_suggested_at = at;
        }
        if let Some(pnl) = patch.cached_cumulative_funding_pnl {
            entry.cached_cumulative_funding_pnl = pnl;
        }
        Ok(entry.clone())
    }

    async fn create_trade(&self, trade: Trade) -> Result<()> {
        self.trades.lock().push(trade);
        Ok(())
    }

    async fn find_api_keys_by_user(
        &self,
        _user_id: &str,
        _venues: &[Venue],
    ) -> Result<Vec<ApiCredential>> {
        // The in-memory repository never holds credentials; a real store
        // delegates to the keystore. Conforming stores that do keep an
        // encrypted-at-rest credential table override this method.
        Ok(Vec::new())
    }

    async fn find_active_opportunity(
        &self,
        symbol: &str,
        long_venue: &Venue,
        short_venue: &Venue,
    ) -> Result<Option<ArbitrageOpportunity>> {
        Ok(self
            .opportunities
            .iter()
            .find(|e| {
                e.symbol == symbol
                    && &e.long_venue == long_venue
                    && &e.short_venue == short_venue
                    && e.status == OpportunityStatus::Active
            })
            .map(|e| e.value().clone()))
    }

    async fn create_opportunity(&self, opportunity: ArbitrageOpportunity) -> Result<()> {
        self.opportunities.insert(opportunity.id, opportunity);
        Ok(())
    }

    async fn update_opportunity(&self, opportunity: ArbitrageOpportunity) -> Result<()> {
        self.opportunities.insert(opportunity.id, opportunity);
        Ok(())
    }

    async fn find_all_active_opportunities(&self, limit: usize) -> Result<Vec<ArbitrageOpportunity>> {
        Ok(self
            .opportunities
            .iter()
            .filter(|e| e.status == OpportunityStatus::Active)
            .take(limit)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn create_opportunity_history(&self, history: OpportunityHistory) -> Result<()> {
        self.histories.lock().push(history);
        Ok(())
    }

    async fn find_enabled_webhooks_by_user(&self, user_id: &str) -> Result<Vec<NotificationWebhook>> {
        Ok(self
            .webhooks
            .get(user_id)
            .map(|v| v.iter().filter(|w| w.enabled).cloned().collect())
            .unwrap_or_default())
    }

    async fn find_trading_settings_by_user(&self, user_id: &str) -> Result<Option<TradingSettings>> {
        Ok(self.settings.get(user_id).map(|e| e.clone()))
    }

    async fn record_audit_event(&self, event: AuditEvent) -> Result<()> {
        self.audit_log.lock().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fra_core::decimal::{Money, Price, Rate, Size};
    use fra_core::model::{ConditionalOrderStatus, Position, PositionLeg, PositionStatus};
    use rust_decimal_macros::dec;

    fn leg(venue: &str) -> PositionLeg {
        PositionLeg {
            venue: Venue::new(venue),
            entry_price: Price::new(dec!(100)),
            size: Size::new(dec!(1)),
            leverage: dec!(3),
            open_funding_rate: Rate::new(dec!(0.0001)),
            stop_loss_enabled: false,
            stop_loss_percent: None,
            stop_loss_trigger_price: None,
            take_profit_enabled: false,
            take_profit_percent: None,
            take_profit_trigger_price: None,
        }
    }

    fn position() -> Position {
        Position {
            id: PositionId::new(),
            user_id: "u1".into(),
            symbol: "BTCUSDT".into(),
            long: leg("okx"),
            short: leg("bingx"),
            conditional_order_status: ConditionalOrderStatus::Pending,
            status: PositionStatus::Open,
            exit_suggested: false,
            exit_suggest_reason: None,
            exit_suggested_at: None,
            cached_cumulative_funding_pnl: Money::ZERO,
            opened_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn update_position_applies_sparse_patch() {
        let repo = InMemoryRepository::new();
        let pos = position();
        let id = pos.id;
        repo.seed_position(pos);

        let patch = PositionPatch {
            exit_suggested: Some(true),
            ..Default::default()
        };
        let updated = repo.update_position(id, patch).await.unwrap();
        assert!(updated.exit_suggested);
        assert_eq!(updated.status, PositionStatus::Open);
    }

    #[tokio::test]
    async fn update_unknown_position_conflicts() {
        let repo = InMemoryRepository::new();
        let result = repo.update_position(PositionId::new(), PositionPatch::default()).await;
        assert!(matches!(result, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn find_open_positions_by_symbol_filters_status() {
        let repo = InMemoryRepository::new();
        let mut pos = position();
        pos.status = PositionStatus::Closed;
        repo.seed_position(pos);
        repo.seed_position(position());

        let open = repo.find_open_positions_by_symbol("BTCUSDT").await.unwrap();
        assert_eq!(open.len(), 1);
    }
}
