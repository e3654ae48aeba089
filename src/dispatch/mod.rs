//! Tier-determination policy.
//!
//! The dispatcher consults, in priority order: the frequency detector's
//! debounced decision, a caller-supplied tiering strategy, the frequency
//! detector's load classification, the adaptive threshold manager (once
//! trusted), and finally the static size thresholds. The final decision is
//! stored back into the frequency detector for debounced reuse.

use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use crate::adaptive::AdaptiveThresholdManager;
use crate::characteristics::enhanced::{enhance, ProcessingStrategy};
use crate::characteristics::{analyze, Characteristics};
use crate::frequency::FrequencyDetector;
use crate::tier::{OperationKey, StaticThresholds, Tier};

/// Caller-supplied override hook. Returning `None` defers to the engine's
/// own policy.
pub trait TieringStrategy: Send + Sync {
    fn determine(&self, characteristics: &Characteristics) -> Option<Tier>;
}

impl<F> TieringStrategy for F
where
    F: Fn(&Characteristics) -> Option<Tier> + Send + Sync,
{
    fn determine(&self, characteristics: &Characteristics) -> Option<Tier> {
        self(characteristics)
    }
}

/// Ready-made strategy built on the enhanced analyzer's decision table.
/// Demonstrates the hook; the advice stays advisory because the caller
/// chooses whether to install it.
pub struct CharacteristicsStrategy;

impl TieringStrategy for CharacteristicsStrategy {
    fn determine(&self, characteristics: &Characteristics) -> Option<Tier> {
        let enhanced = enhance(characteristics.clone());
        match enhanced.recommended {
            ProcessingStrategy::Js => Some(Tier::JsPreferred),
            ProcessingStrategy::Wasm => Some(Tier::Conditional),
            ProcessingStrategy::Simd
            | ProcessingStrategy::Parallel
            | ProcessingStrategy::Hybrid => Some(Tier::HighValue),
        }
    }
}

/// Per call-site tier policy. One dispatcher per registered accelerator.
pub struct BaseDispatcher {
    key: OperationKey,
    static_thresholds: StaticThresholds,
    frequency: Arc<FrequencyDetector>,
    adaptive: Arc<AdaptiveThresholdManager>,
    strategy: Option<Box<dyn TieringStrategy>>,
    adaptive_enabled: bool,
}

impl BaseDispatcher {
    pub fn new(
        key: OperationKey,
        static_thresholds: StaticThresholds,
        frequency: Arc<FrequencyDetector>,
        adaptive: Arc<AdaptiveThresholdManager>,
    ) -> Self {
        Self {
            key,
            static_thresholds,
            frequency,
            adaptive,
            strategy: None,
            adaptive_enabled: true,
        }
    }

    pub fn with_strategy(mut self, strategy: Box<dyn TieringStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn set_strategy(&mut self, strategy: Box<dyn TieringStrategy>) {
        self.strategy = Some(strategy);
    }

    pub fn with_adaptive_enabled(mut self, enabled: bool) -> Self {
        self.adaptive_enabled = enabled;
        self
    }

    pub fn key(&self) -> &OperationKey {
        &self.key
    }

    pub fn frequency(&self) -> &Arc<FrequencyDetector> {
        &self.frequency
    }

    pub fn adaptive(&self) -> &Arc<AdaptiveThresholdManager> {
        &self.adaptive
    }

    /// Pick the execution tier for one input.
    pub fn determine_tier(&self, input: &[Value]) -> Tier {
        // 1. Debounced decision from the frequency detector
        if let Some(tier) = self.frequency.fresh_decision(&self.key) {
            trace!(key = %self.key, %tier, "tier from debounced decision");
            return tier;
        }

        let characteristics = analyze(input);
        let tier = self.decide(&characteristics);
        self.frequency.store_decision(&self.key, tier);
        tier
    }

    /// Like `determine_tier`, for callers that already analyzed the input.
    pub fn determine_tier_for(&self, characteristics: &Characteristics) -> Tier {
        if let Some(tier) = self.frequency.fresh_decision(&self.key) {
            return tier;
        }
        let tier = self.decide(characteristics);
        self.frequency.store_decision(&self.key, tier);
        tier
    }

    fn decide(&self, characteristics: &Characteristics) -> Tier {
        // 2. Caller-supplied strategy
        if let Some(strategy) = &self.strategy {
            if let Some(tier) = strategy.determine(characteristics) {
                trace!(key = %self.key, %tier, "tier from caller strategy");
                return tier;
            }
        }

        // 3. Load classification: a hot or slow call-site overrides size
        let by_load = self.frequency.classify(&self.key);
        if by_load != Tier::JsPreferred {
            trace!(key = %self.key, tier = %by_load, "tier from call pattern");
            return by_load;
        }

        // 4. Learned thresholds once trusted, else static size thresholds
        if self.adaptive_enabled && self.adaptive.trusted() {
            let tier = self.adaptive.determine_tier(characteristics.size);
            trace!(key = %self.key, %tier, "tier from adaptive thresholds");
            return tier;
        }
        self.static_thresholds.classify(characteristics.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptive::AdaptiveConfig;
    use crate::frequency::FrequencyConfig;
    use crate::tier::clock::{Clock, ManualClock};
    use serde_json::json;

    fn input_of(size: usize) -> Vec<Value> {
        (0..size).map(|i| json!(i as u64)).collect()
    }

    struct Fixture {
        dispatcher: BaseDispatcher,
        clock: Arc<ManualClock>,
        frequency: Arc<FrequencyDetector>,
    }

    fn fixture(strategy: Option<Box<dyn TieringStrategy>>) -> Fixture {
        let clock = Arc::new(ManualClock::new(0));
        let frequency = Arc::new(FrequencyDetector::with_clock(
            FrequencyConfig::default(),
            Arc::clone(&clock) as Arc<dyn Clock>,
        ));
        let adaptive = Arc::new(AdaptiveThresholdManager::with_clock(
            AdaptiveConfig {
                min_samples: 2,
                adaptation_frequency: 2,
                ..Default::default()
            },
            Arc::clone(&clock) as Arc<dyn Clock>,
        ));
        let mut dispatcher = BaseDispatcher::new(
            OperationKey::new("ds", "list", "map"),
            StaticThresholds::new(10_000, 1_000),
            Arc::clone(&frequency),
            adaptive,
        );
        if let Some(s) = strategy {
            dispatcher = dispatcher.with_strategy(s);
        }
        Fixture {
            dispatcher,
            clock,
            frequency,
        }
    }

    #[test]
    fn test_static_bands() {
        let f = fixture(None);
        assert_eq!(f.dispatcher.determine_tier(&input_of(10)), Tier::JsPreferred);
        f.clock.advance(1_001);
        assert_eq!(
            f.dispatcher.determine_tier(&input_of(1_000)),
            Tier::Conditional
        );
        f.clock.advance(1_001);
        assert_eq!(
            f.dispatcher.determine_tier(&input_of(10_000)),
            Tier::HighValue
        );
    }

    #[test]
    fn test_debounced_decision_wins() {
        let f = fixture(None);
        assert_eq!(f.dispatcher.determine_tier(&input_of(10)), Tier::JsPreferred);
        // A huge input inside the debounce window still gets the stale tier
        assert_eq!(
            f.dispatcher.determine_tier(&input_of(50_000)),
            Tier::JsPreferred
        );
        f.clock.advance(1_001);
        assert_eq!(
            f.dispatcher.determine_tier(&input_of(50_000)),
            Tier::HighValue
        );
    }

    #[test]
    fn test_strategy_overrides_size() {
        let always_high: Box<dyn TieringStrategy> =
            Box::new(|_: &Characteristics| Some(Tier::HighValue));
        let f = fixture(Some(always_high));
        assert_eq!(f.dispatcher.determine_tier(&input_of(3)), Tier::HighValue);
    }

    #[test]
    fn test_strategy_none_defers() {
        let noop: Box<dyn TieringStrategy> = Box::new(|_: &Characteristics| None);
        let f = fixture(Some(noop));
        assert_eq!(f.dispatcher.determine_tier(&input_of(3)), Tier::JsPreferred);
    }

    #[test]
    fn test_hot_call_site_overrides_small_size() {
        let f = fixture(None);
        let key = f.dispatcher.key().clone();
        let input = input_of(20);
        for _ in 0..20 {
            f.frequency.record_call(&key, &input);
        }
        assert_eq!(f.dispatcher.determine_tier(&input), Tier::HighValue);
    }

    #[test]
    fn test_adaptive_takes_over_once_trusted() {
        let f = fixture(None);
        // Learn that acceleration pays off from ~775 elements up
        f.dispatcher.adaptive().add_sample(100, 10.0, 20.0);
        f.dispatcher.adaptive().add_sample(1_000, 10.0, 4.0);
        assert!(f.dispatcher.adaptive().trusted());

        // 2000 elements: static says Conditional, learned says HighValue
        assert_eq!(
            f.dispatcher.determine_tier(&input_of(2_000)),
            Tier::HighValue
        );
    }

    #[test]
    fn test_characteristics_strategy_maps_table() {
        let c = analyze(&input_of(5));
        assert_eq!(
            CharacteristicsStrategy.determine(&c),
            Some(Tier::JsPreferred)
        );
        let c = analyze(&input_of(5_000));
        assert_eq!(CharacteristicsStrategy.determine(&c), Some(Tier::HighValue));
    }
}
