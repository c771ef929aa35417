//! Configuration for the bounty court.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// A seconds setting as a signed span; `None` when chrono cannot represent it.
pub(crate) fn span(secs: u64) -> Option<Duration> {
    i64::try_from(secs).ok().and_then(Duration::try_seconds)
}

/// Who must accept an AI suggestion before it is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptancePolicy {
    /// Acceptance by either disputant applies the ruling
    EitherParty,
    /// Both disputants must accept
    BothParties,
}

/// Configuration for a [`crate::BountyCourt`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CourtConfig {
    pub bounty: BountyConfig,
    pub dispute: DisputeConfig,
    pub tribunal: TribunalConfig,
    pub settlement: SettlementConfig,
    pub reputation: ReputationConfig,
}

impl CourtConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Reject settings the court cannot honor.
    pub fn validate(&self) -> Result<(), String> {
        for (name, secs) in [
            ("bounty.default_deadline_secs", self.bounty.default_deadline_secs),
            ("dispute.negotiation_timeout_secs", self.dispute.negotiation_timeout_secs),
            ("dispute.ai_arbiter_timeout_secs", self.dispute.ai_arbiter_timeout_secs),
            ("reputation.decay_period_secs", self.reputation.decay_period_secs),
            ("reputation.inactivity_threshold_secs", self.reputation.inactivity_threshold_secs),
        ] {
            if span(secs).is_none() {
                return Err(format!("{} is out of range: {}", name, secs));
            }
        }

        let quorum = self.tribunal.quorum_fraction;
        if !(0.0..1.0).contains(&quorum) {
            return Err(format!("tribunal.quorum_fraction must be in [0, 1), got {}", quorum));
        }
        if self.settlement.split_guild_share_bps > 10_000 {
            return Err(format!(
                "settlement.split_guild_share_bps must be at most 10000, got {}",
                self.settlement.split_guild_share_bps
            ));
        }
        if !(0.0..=1.0).contains(&self.reputation.decay_rate) {
            return Err(format!(
                "reputation.decay_rate must be in [0, 1], got {}",
                self.reputation.decay_rate
            ));
        }
        if self.reputation.demurrage_bps > 10_000 {
            return Err(format!(
                "reputation.demurrage_bps must be at most 10000, got {}",
                self.reputation.demurrage_bps
            ));
        }
        Ok(())
    }
}

/// Bounty lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BountyConfig {
    /// Deadline applied when a bounty is posted without one (seconds)
    pub default_deadline_secs: u64,
    /// Smallest reward a bounty may offer
    pub min_reward: u64,
}

impl Default for BountyConfig {
    fn default() -> Self {
        Self {
            default_deadline_secs: 14 * 24 * 3600, // 2 weeks
            min_reward: 1,
        }
    }
}

/// Dispute engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisputeConfig {
    /// Response-time budget of the negotiation tier (seconds)
    pub negotiation_timeout_secs: u64,
    /// Response-time budget of the AI arbiter tier (seconds)
    pub ai_arbiter_timeout_secs: u64,
    /// Who must accept an AI suggestion
    pub ai_acceptance: AcceptancePolicy,
    /// Ledger account the arbiter stakes from
    pub arbiter_account: String,
}

impl Default for DisputeConfig {
    fn default() -> Self {
        Self {
            negotiation_timeout_secs: 72 * 3600,
            ai_arbiter_timeout_secs: 48 * 3600,
            ai_acceptance: AcceptancePolicy::EitherParty,
            arbiter_account: "ai-arbiter".to_string(),
        }
    }
}

/// Tribunal configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TribunalConfig {
    /// Jurors drawn per dispute
    pub panel_size: usize,
    /// Escalation fails when fewer eligible guilds exist
    pub min_panel_size: usize,
    /// Quorum is reached when strictly more than this fraction of jurors voted.
    /// Must be below 1.0, which no panel could exceed.
    pub quorum_fraction: f64,
    /// Smallest stake a juror may vote with
    pub min_juror_stake: u64,
    /// Guilds above this anomaly risk score are never empaneled
    pub max_risk_score: f64,
}

impl Default for TribunalConfig {
    fn default() -> Self {
        Self {
            panel_size: 5,
            min_panel_size: 3,
            quorum_fraction: 0.5,
            min_juror_stake: 1,
            max_risk_score: 0.8,
        }
    }
}

/// Settlement configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Guild share of the reward on a split ruling, in basis points
    pub split_guild_share_bps: u32,
    /// Trust gained by the winning party
    pub win_delta: f64,
    /// Trust lost by the losing party
    pub loss_delta: f64,
    /// Trust lost by each party on a split ruling
    pub split_penalty: f64,
    /// Trust gained by jurors who voted with the ruling
    pub juror_aligned_delta: f64,
    /// Trust lost by jurors who voted against the ruling
    pub juror_dissent_delta: f64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            split_guild_share_bps: 5_000,
            win_delta: 5.0,
            loss_delta: 10.0,
            split_penalty: 2.0,
            juror_aligned_delta: 1.0,
            juror_dissent_delta: 1.0,
        }
    }
}

/// Reputation decay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReputationConfig {
    /// Fraction of trust lost per decay period
    pub decay_rate: f64,
    /// Minimum time between two decays of one account (seconds)
    pub decay_period_secs: u64,
    /// Idle time before an account starts decaying (seconds)
    pub inactivity_threshold_secs: u64,
    /// Idle available credits moved to the treasury per decay, in basis points
    pub demurrage_bps: u32,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            decay_rate: 0.05,
            decay_period_secs: 7 * 24 * 3600,
            inactivity_threshold_secs: 30 * 24 * 3600,
            demurrage_bps: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_round_trip_keeps_overrides() {
        let mut config = CourtConfig::default();
        config.tribunal.panel_size = 7;
        config.dispute.ai_acceptance = AcceptancePolicy::BothParties;

        let yaml = config.to_yaml().unwrap();
        let parsed = CourtConfig::from_yaml(&yaml).unwrap();

        assert_eq!(parsed.tribunal.panel_size, 7);
        assert_eq!(parsed.dispute.ai_acceptance, AcceptancePolicy::BothParties);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "settlement:\n  split_guild_share_bps: 7000\n";
        let config = CourtConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.settlement.split_guild_share_bps, 7_000);
        assert_eq!(config.settlement.win_delta, 5.0);
        assert_eq!(config.tribunal.quorum_fraction, 0.5);
        assert_eq!(config.reputation.demurrage_bps, 0);
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert_eq!(CourtConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_unreachable_quorum() {
        let mut config = CourtConfig::default();
        config.tribunal.quorum_fraction = 1.0;
        assert!(config.validate().unwrap_err().contains("quorum_fraction"));
    }

    #[test]
    fn test_validate_rejects_huge_timeouts() {
        let mut config = CourtConfig::default();
        config.dispute.negotiation_timeout_secs = u64::MAX / 2;
        assert!(config.validate().unwrap_err().contains("negotiation_timeout_secs"));

        assert!(span(u64::MAX / 2).is_none());
        assert_eq!(span(60), Some(Duration::seconds(60)));
    }
}
