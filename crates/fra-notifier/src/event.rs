//! Notifiable events fanned out to user webhooks (spec §4.10).

use chrono::{DateTime, Utc};
use fra_core::decimal::Rate;
use fra_core::ids::{OpportunityId, Venue};
use fra_core::model::{DisappearReason, ExitSuggestReason};

/// One of the three event kinds spec §4.10 names as webhook-eligible:
/// opportunity detected, opportunity expired (only for webhooks that
/// opted in), and exit suggested.
#[derive(Debug, Clone)]
pub enum NotifiableEvent {
    OpportunityDetected {
        user_id: String,
        opportunity_id: OpportunityId,
        symbol: String,
        long_venue: Venue,
        short_venue: Venue,
        rate_difference: Rate,
        at: DateTime<Utc>,
    },
    OpportunityExpired {
        user_id: String,
        opportunity_id: OpportunityId,
        symbol: String,
        long_venue: Venue,
        short_venue: Venue,
        reason: DisappearReason,
        at: DateTime<Utc>,
    },
    ExitSuggested {
        user_id: String,
        position_id: fra_core::ids::PositionId,
        symbol: String,
        reason: ExitSuggestReason,
        at: DateTime<Utc>,
    },
}

impl NotifiableEvent {
    pub fn user_id(&self) -> &str {
        match self {
            Self::OpportunityDetected { user_id, .. }
            | Self::OpportunityExpired { user_id, .. }
            | Self::ExitSuggested { user_id, .. } => user_id,
        }
    }

    /// The rate-difference figure used against a webhook's configured
    /// `rate_threshold` filter (spec §4.10). Exit-suggested events carry
    /// no rate figure and are never threshold-filtered.
    pub fn rate_difference(&self) -> Option<Rate> {
        match self {
            Self::OpportunityDetected { rate_difference, .. } => Some(*rate_difference),
            Self::OpportunityExpired { .. } | Self::ExitSuggested { .. } => None,
        }
    }

    /// `true` for events a webhook must explicitly opt into beyond the
    /// default subscription (spec §4.10: "opportunity expired when the
    /// webhook opted in").
    pub fn requires_opt_in(&self) -> bool {
        matches!(self, Self::OpportunityExpired { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::OpportunityDetected { .. } => "opportunity_detected",
            Self::OpportunityExpired { .. } => "opportunity_expired",
            Self::ExitSuggested { .. } => "exit_suggested",
        }
    }
}
