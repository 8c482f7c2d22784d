//! Per-kind decay policy.
//!
//! Built once from [`cairn_config::DecayConfig`] and shared read-only by the
//! relationship store and the decay engine.

use cairn_config::{DecayConfig, KindDecaySettings};
use chrono::Duration;

use crate::error::{MemoryError, Result};
use crate::types::RelationshipKind;

const SECS_PER_DAY: f64 = 86_400.0;

/// Decay and reinforcement parameters for one relationship kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KindPolicy {
    /// Seconds for strength to halve without reinforcement.
    pub half_life_secs: f64,
    /// Relationships weaker than this are pruned by a sweep.
    pub min_strength: f64,
    /// Strength added when an existing relationship is observed again.
    pub reinforcement_boost: f64,
    /// Strength of a relationship created by a plain observation.
    pub initial_strength: f64,
}

impl KindPolicy {
    /// Create a policy with the half-life expressed in days.
    pub fn new(
        half_life_days: f64,
        min_strength: f64,
        reinforcement_boost: f64,
        initial_strength: f64,
    ) -> Self {
        Self {
            half_life_secs: half_life_days * SECS_PER_DAY,
            min_strength,
            reinforcement_boost,
            initial_strength,
        }
    }

    /// Multiplier applied to strength after `elapsed` time: `0.5^(elapsed / half_life)`.
    ///
    /// Non-positive elapsed time yields 1.0.
    pub fn decay_factor(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.num_milliseconds() as f64 / 1000.0;
        if secs <= 0.0 {
            return 1.0;
        }
        0.5_f64.powf(secs / self.half_life_secs)
    }
}

impl From<KindDecaySettings> for KindPolicy {
    fn from(settings: KindDecaySettings) -> Self {
        Self::new(
            settings.half_life_days,
            settings.min_strength,
            settings.reinforcement_boost,
            settings.initial_strength,
        )
    }
}

/// Immutable decay table covering every [`RelationshipKind`].
#[derive(Debug, Clone, PartialEq)]
pub struct DecayPolicy {
    kinds: [KindPolicy; 4],
}

impl DecayPolicy {
    /// Build the policy from configuration.
    ///
    /// Kind names in the config must belong to the vocabulary; anything else
    /// is rejected with [`MemoryError::InvalidKind`].
    pub fn from_config(config: &DecayConfig) -> Result<Self> {
        for name in config.kinds.keys() {
            name.parse::<RelationshipKind>()?;
        }
        config.validate()?;

        Ok(Self {
            kinds: RelationshipKind::ALL.map(|kind| config.resolve(kind.as_str()).into()),
        })
    }

    /// Policy for a kind.
    pub fn for_kind(&self, kind: RelationshipKind) -> &KindPolicy {
        &self.kinds[Self::slot(kind)]
    }

    /// Replace the policy for one kind.
    pub fn with_kind(mut self, kind: RelationshipKind, policy: KindPolicy) -> Result<Self> {
        if !(policy.half_life_secs.is_finite() && policy.half_life_secs > 0.0) {
            return Err(MemoryError::InvalidData(format!(
                "half-life for {} must be positive",
                kind
            )));
        }
        self.kinds[Self::slot(kind)] = policy;
        Ok(self)
    }

    fn slot(kind: RelationshipKind) -> usize {
        match kind {
            RelationshipKind::References => 0,
            RelationshipKind::TaggedWith => 1,
            RelationshipKind::CoOccurs => 2,
            RelationshipKind::DerivedFrom => 3,
        }
    }
}

impl Default for DecayPolicy {
    fn default() -> Self {
        let config = DecayConfig::default();
        Self {
            kinds: RelationshipKind::ALL.map(|kind| config.resolve(kind.as_str()).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_config::KindDecayConfig;

    #[test]
    fn test_default_policy_covers_all_kinds() {
        let policy = DecayPolicy::default();
        for kind in RelationshipKind::ALL {
            let p = policy.for_kind(kind);
            assert!(p.half_life_secs > 0.0);
            assert_eq!(p.initial_strength, 0.5);
        }
        assert_eq!(
            policy.for_kind(RelationshipKind::CoOccurs).half_life_secs,
            7.0 * SECS_PER_DAY
        );
    }

    #[test]
    fn test_decay_factor_half_lives() {
        let p = KindPolicy::new(7.0, 0.05, 0.2, 0.5);
        assert!((p.decay_factor(Duration::days(7)) - 0.5).abs() < 1e-9);
        assert!((p.decay_factor(Duration::days(14)) - 0.25).abs() < 1e-9);
        assert_eq!(p.decay_factor(Duration::zero()), 1.0);
        assert_eq!(p.decay_factor(Duration::days(-3)), 1.0);
    }

    #[test]
    fn test_from_config_overrides() {
        let mut config = DecayConfig::default();
        config.kinds.insert(
            "tagged-with".to_string(),
            KindDecayConfig {
                half_life_days: Some(2.0),
                min_strength: Some(0.2),
                ..Default::default()
            },
        );

        let policy = DecayPolicy::from_config(&config).unwrap();
        let tagged = policy.for_kind(RelationshipKind::TaggedWith);
        assert_eq!(tagged.half_life_secs, 2.0 * SECS_PER_DAY);
        assert_eq!(tagged.min_strength, 0.2);
        assert_eq!(tagged.reinforcement_boost, 0.2);
    }

    #[test]
    fn test_from_config_rejects_unknown_kind() {
        let mut config = DecayConfig::default();
        config
            .kinds
            .insert("contradicts".to_string(), KindDecayConfig::default());

        let err = DecayPolicy::from_config(&config).unwrap_err();
        assert!(matches!(err, MemoryError::InvalidKind(ref k) if k == "contradicts"));
    }

    #[test]
    fn test_from_config_rejects_bad_values() {
        let mut config = DecayConfig::default();
        config.kinds.insert(
            "references".to_string(),
            KindDecayConfig {
                min_strength: Some(1.5),
                ..Default::default()
            },
        );

        let err = DecayPolicy::from_config(&config).unwrap_err();
        assert!(matches!(err, MemoryError::Config(_)));
    }

    #[test]
    fn test_with_kind_rejects_zero_half_life() {
        let result = DecayPolicy::default().with_kind(
            RelationshipKind::References,
            KindPolicy::new(0.0, 0.05, 0.2, 0.5),
        );
        assert!(result.is_err());
    }
}
