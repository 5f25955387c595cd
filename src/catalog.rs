use crate::Result;
use anyhow::anyhow;
use rand::{
    Rng,
    distr::{
        Distribution,
        weighted::WeightedIndex,
    },
};
use serde::{
    Deserialize,
    Serialize,
};

fn default_weight() -> u32 {
    1
}

fn default_visible() -> bool {
    true
}

/// A configured reward. Immutable once the catalog is built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardDefinition {
    pub shortname: String,
    pub min_amount: u32,
    pub max_amount: u32,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

impl RewardDefinition {
    pub fn new(shortname: impl Into<String>, min_amount: u32, max_amount: u32) -> Self {
        Self {
            shortname: shortname.into(),
            min_amount,
            max_amount,
            weight: default_weight(),
            visible: default_visible(),
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Quantity drawn uniformly from `[min_amount, max_amount)`. A collapsed
    /// range yields `min_amount`.
    pub fn roll_amount<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        if self.max_amount > self.min_amount {
            rng.random_range(self.min_amount..self.max_amount)
        } else {
            self.min_amount
        }
    }

    fn is_drawable(&self) -> bool {
        self.visible && self.weight > 0
    }
}

/// Rewards available for the session.
///
/// The drawable subset is computed once at construction; later draws never
/// re-evaluate visibility.
#[derive(Clone, Debug)]
pub struct RewardCatalog {
    entries: Vec<RewardDefinition>,
    drawable: Vec<usize>,
    index: Option<WeightedIndex<u32>>,
}

impl RewardCatalog {
    pub fn new(entries: Vec<RewardDefinition>) -> Result<Self> {
        let drawable: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_drawable())
            .map(|(position, _)| position)
            .collect();
        let index = if drawable.is_empty() {
            None
        } else {
            let weights = drawable.iter().map(|&position| entries[position].weight);
            let index = WeightedIndex::new(weights)
                .map_err(|e| anyhow!("invalid reward weights: {e}"))?;
            Some(index)
        };
        tracing::debug!(
            configured = entries.len(),
            drawable = drawable.len(),
            "reward catalog built"
        );
        Ok(Self {
            entries,
            drawable,
            index,
        })
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            drawable: Vec::new(),
            index: None,
        }
    }

    /// Weighted draw over the visible entries. With default weights this is
    /// uniform. Returns `None` when nothing is visible.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&RewardDefinition> {
        let index = self.index.as_ref()?;
        let position = self.drawable[index.sample(rng)];
        self.entries.get(position)
    }

    pub fn entries(&self) -> &[RewardDefinition] {
        &self.entries
    }

    pub fn drawable_len(&self) -> usize {
        self.drawable.len()
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use proptest::prelude::*;
    use rand::{
        SeedableRng,
        rngs::StdRng,
    };

    #[test]
    fn draw__all_entries_hidden__returns_none() {
        // given
        let catalog = RewardCatalog::new(vec![
            RewardDefinition::new("scrap", 10, 20).hidden(),
            RewardDefinition::new("rifle.ak", 1, 2).hidden(),
        ])
        .unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        // when
        let drawn = catalog.draw(&mut rng);

        // then
        assert!(drawn.is_none());
        assert_eq!(catalog.entries().len(), 2);
    }

    #[test]
    fn draw__empty_catalog__returns_none() {
        let catalog = RewardCatalog::empty();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(catalog.draw(&mut rng).is_none());
    }

    #[test]
    fn draw__zero_weight_entries__are_never_drawn() {
        // given
        let catalog = RewardCatalog::new(vec![
            RewardDefinition::new("scrap", 1, 2).with_weight(0),
            RewardDefinition::new("wood", 100, 200),
        ])
        .unwrap();
        let mut rng = StdRng::seed_from_u64(99);

        // when
        let drawn: Vec<&str> = (0..200)
            .filter_map(|_| catalog.draw(&mut rng))
            .map(|entry| entry.shortname.as_str())
            .collect();

        // then
        assert_eq!(drawn.len(), 200);
        assert!(drawn.iter().all(|name| *name == "wood"));
        assert_eq!(catalog.drawable_len(), 1);
    }

    #[test]
    fn draw__several_visible_entries__reaches_each_of_them() {
        // given
        let catalog = RewardCatalog::new(vec![
            RewardDefinition::new("scrap", 1, 5),
            RewardDefinition::new("stones", 1, 5),
            RewardDefinition::new("metal.fragments", 1, 5),
            RewardDefinition::new("rifle.ak", 1, 2).hidden(),
        ])
        .unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        // when
        let mut seen: Vec<String> = (0..500)
            .filter_map(|_| catalog.draw(&mut rng))
            .map(|entry| entry.shortname.clone())
            .collect();
        seen.sort();
        seen.dedup();

        // then
        assert_eq!(seen, vec!["metal.fragments", "scrap", "stones"]);
    }

    #[test]
    fn roll_amount__collapsed_range__returns_min() {
        let reward = RewardDefinition::new("supply.signal", 1, 1);
        let mut rng = StdRng::seed_from_u64(5);
        assert_eq!(reward.roll_amount(&mut rng), 1);
    }

    #[test]
    fn deserialize__missing_optional_fields__uses_defaults() {
        // given
        let json = r#"{"shortname":"scrap","min_amount":5,"max_amount":10}"#;

        // when
        let reward: RewardDefinition = serde_json::from_str(json).unwrap();

        // then
        assert_eq!(reward, RewardDefinition::new("scrap", 5, 10));
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

        #[test]
        fn draw__single_visible_entry__always_returns_it_within_range(
            seed in any::<u64>(),
            min in 1u32..1_000,
            span in 0u32..1_000,
        ) {
            let max = min + span;
            let catalog = RewardCatalog::new(vec![
                RewardDefinition::new("hidden.thing", 1, 2).hidden(),
                RewardDefinition::new("scrap", min, max),
            ])
            .unwrap();
            let mut rng = StdRng::seed_from_u64(seed);

            let drawn = catalog.draw(&mut rng).unwrap();
            let amount = drawn.roll_amount(&mut rng);

            prop_assert_eq!(drawn.shortname.as_str(), "scrap");
            if max > min {
                prop_assert!(amount >= min && amount < max);
            } else {
                prop_assert_eq!(amount, min);
            }
        }
    }
}
