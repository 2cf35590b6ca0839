//! Per-block item randomization.
//!
//! Modes: `none` keeps list order, `true` shuffles uniformly, `pseudo`
//! shuffles under the constraint that no two adjacent items originate
//! from the same non-filler materials set.
//!
//! Pseudo-randomization runs in two bounded stages:
//!
//! 1. A master slot sequence of materials identities is drawn by
//!    shuffling and repairing collisions with random insertions.
//! 2. Each materials set's items are ordered (plain shuffle for
//!    fillers and single-condition sets, alternating conditions
//!    otherwise) and popped into their slots.
//!
//! Both stages retry up to a fixed budget and fail with
//! [`CoreError::PseudoRandomizationTimeout`] on exhaustion.

use std::collections::VecDeque;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::CoreError;

/// Block randomization mode, stored as `none` / `true` / `pseudo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Randomization {
    Pseudo,
    True,
    None,
}

impl Randomization {
    pub fn as_str(&self) -> &'static str {
        match self {
            Randomization::Pseudo => "pseudo",
            Randomization::True => "true",
            Randomization::None => "none",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pseudo" => Some(Randomization::Pseudo),
            "true" => Some(Randomization::True),
            "none" => Some(Randomization::None),
            _ => None,
        }
    }
}

/// An item chosen for one questionnaire, tagged with what the
/// randomizer needs to know about its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockItem {
    pub materials_index: usize,
    /// Index into the materials set's item vector.
    pub item_index: usize,
    /// Effective block (example items are 0).
    pub block: i32,
    pub condition: String,
    pub is_filler: bool,
    /// Condition count of the originating materials set.
    pub condition_count: usize,
}

const PSEUDO_RANDOMIZE_TRIES: usize = 1000;

/// Order the items of one block according to the block's mode.
///
/// Input order is the list order (materials, number, condition).
pub fn order_block<R: Rng + ?Sized>(
    items: Vec<BlockItem>,
    randomization: Randomization,
    rng: &mut R,
) -> Result<Vec<BlockItem>, CoreError> {
    match randomization {
        Randomization::None => Ok(items),
        Randomization::True => {
            let mut items = items;
            items.shuffle(rng);
            Ok(items)
        }
        Randomization::Pseudo => order_block_pseudo(items, rng),
    }
}

fn order_block_pseudo<R: Rng + ?Sized>(
    items: Vec<BlockItem>,
    rng: &mut R,
) -> Result<Vec<BlockItem>, CoreError> {
    let slots = compute_block_slots(&items, rng)?;
    let mut by_materials = pseudo_randomized_materials_items(items, rng)?;
    let mut ordered = Vec::with_capacity(slots.len());
    for materials_index in slots {
        let Some(item) = by_materials
            .get_mut(&materials_index)
            .and_then(|items| items.pop())
        else {
            return Err(CoreError::Structural(
                "Block does not match master slots.".into(),
            ));
        };
        ordered.push(item);
    }
    Ok(ordered)
}

/// Draw the master sequence of materials identities for one block.
///
/// A shuffled pass accepts an item's identity whenever it is a filler,
/// follows a filler, or differs from its predecessor; colliding items
/// are repaired afterwards by random insertion at a position where
/// neither neighbor shares their identity.
fn compute_block_slots<R: Rng + ?Sized>(
    items: &[BlockItem],
    rng: &mut R,
) -> Result<Vec<usize>, CoreError> {
    let mut n_tries = PSEUDO_RANDOMIZE_TRIES;
    while n_tries > 0 {
        let mut shuffled: Vec<&BlockItem> = items.iter().collect();
        shuffled.shuffle(rng);

        let mut slots: Vec<usize> = Vec::with_capacity(items.len());
        let mut colliding: Vec<&BlockItem> = Vec::new();
        let mut last: Option<&BlockItem> = None;
        for item in shuffled {
            let separated = item.is_filler
                || last.is_none()
                || last.map(|l| l.is_filler).unwrap_or(false)
                || last.map(|l| l.materials_index != item.materials_index).unwrap_or(true);
            if separated {
                slots.push(item.materials_index);
            } else {
                colliding.push(item);
            }
            last = Some(item);
        }

        let mut resolution_failed = false;
        for item in colliding {
            let slot_size = slots.len();
            if slot_size < 2 {
                resolution_failed = true;
                break;
            }
            let mut n_insert_tries = slot_size / 4;
            let mut inserted = false;
            while n_insert_tries > 0 {
                let pos = rng.random_range(0..slot_size - 1);
                if item.materials_index != slots[pos] && item.materials_index != slots[pos + 1] {
                    slots.insert(pos + 1, item.materials_index);
                    inserted = true;
                    break;
                }
                n_insert_tries -= 1;
            }
            if !inserted {
                resolution_failed = true;
            }
        }
        if !resolution_failed {
            return Ok(slots);
        }
        n_tries -= 1;
        trace!(remaining = n_tries, "slot computation retry");
    }
    Err(CoreError::PseudoRandomizationTimeout)
}

/// Order each materials set's items for slot filling.
fn pseudo_randomized_materials_items<R: Rng + ?Sized>(
    items: Vec<BlockItem>,
    rng: &mut R,
) -> Result<std::collections::BTreeMap<usize, Vec<BlockItem>>, CoreError> {
    let mut grouped: std::collections::BTreeMap<usize, Vec<BlockItem>> = Default::default();
    for item in items {
        grouped.entry(item.materials_index).or_default().push(item);
    }
    for materials_items in grouped.values_mut() {
        let plain_shuffle =
            materials_items[0].is_filler || materials_items[0].condition_count <= 1;
        if plain_shuffle {
            materials_items.shuffle(rng);
        } else {
            *materials_items = items_with_alternating_conditions(materials_items, rng)?;
        }
    }
    Ok(grouped)
}

/// Shuffle one materials set's items so that no two neighbors share a
/// condition, by bubbling colliding items back onto the queue.
fn items_with_alternating_conditions<R: Rng + ?Sized>(
    materials_items: &[BlockItem],
    rng: &mut R,
) -> Result<Vec<BlockItem>, CoreError> {
    let mut n_tries = PSEUDO_RANDOMIZE_TRIES;
    while n_tries > 0 {
        let mut shuffled: Vec<BlockItem> = materials_items.to_vec();
        shuffled.shuffle(rng);
        let mut items: VecDeque<BlockItem> = shuffled.into();
        let mut ordered: Vec<BlockItem> = Vec::with_capacity(items.len());
        let mut last_condition: Option<String> = None;
        let mut bubble_fails = 0usize;
        while bubble_fails <= items.len() {
            let Some(item) = items.pop_front() else {
                break;
            };
            if last_condition.as_deref() != Some(item.condition.as_str()) {
                last_condition = Some(item.condition.clone());
                ordered.push(item);
                bubble_fails = 0;
            } else {
                last_condition = Some(item.condition.clone());
                items.push_back(item);
                bubble_fails += 1;
            }
        }
        if items.is_empty() {
            return Ok(ordered);
        }
        n_tries -= 1;
    }
    Err(CoreError::PseudoRandomizationTimeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn block_item(materials_index: usize, item_index: usize, condition: &str, is_filler: bool) -> BlockItem {
        BlockItem {
            materials_index,
            item_index,
            block: 1,
            condition: condition.into(),
            is_filler,
            condition_count: 2,
        }
    }

    fn experimental_and_filler(n: usize) -> Vec<BlockItem> {
        let mut items = Vec::new();
        for i in 0..n {
            items.push(block_item(0, i, if i % 2 == 0 { "a" } else { "b" }, false));
        }
        for i in 0..n {
            let mut filler = block_item(1, i, "f", true);
            filler.condition_count = 1;
            items.push(filler);
        }
        items
    }

    #[test]
    fn none_preserves_order() {
        let items = experimental_and_filler(3);
        let mut rng = StdRng::seed_from_u64(7);
        let ordered = order_block(items.clone(), Randomization::None, &mut rng).unwrap();
        assert_eq!(ordered, items);
    }

    #[test]
    fn true_randomization_is_a_permutation() {
        let items = experimental_and_filler(5);
        let mut rng = StdRng::seed_from_u64(7);
        let ordered = order_block(items.clone(), Randomization::True, &mut rng).unwrap();
        assert_eq!(ordered.len(), items.len());
        for item in &items {
            assert!(ordered.contains(item));
        }
    }

    #[test]
    fn pseudo_separates_experimental_items() {
        // 10 experimental + 10 filler items; no two adjacent slots may
        // come from the non-filler materials set.
        let items = experimental_and_filler(10);
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let ordered = order_block(items.clone(), Randomization::Pseudo, &mut rng).unwrap();
            assert_eq!(ordered.len(), items.len());
            for pair in ordered.windows(2) {
                assert!(
                    pair[0].is_filler
                        || pair[1].is_filler
                        || pair[0].materials_index != pair[1].materials_index,
                    "adjacent experimental items (seed {seed})"
                );
            }
        }
    }

    #[test]
    fn pseudo_is_a_permutation() {
        let items = experimental_and_filler(8);
        let mut rng = StdRng::seed_from_u64(42);
        let ordered = order_block(items.clone(), Randomization::Pseudo, &mut rng).unwrap();
        let mut sorted_in: Vec<_> = items.iter().map(|i| (i.materials_index, i.item_index)).collect();
        let mut sorted_out: Vec<_> = ordered.iter().map(|i| (i.materials_index, i.item_index)).collect();
        sorted_in.sort_unstable();
        sorted_out.sort_unstable();
        assert_eq!(sorted_in, sorted_out);
    }

    #[test]
    fn alternating_conditions_hold_for_experimental_items() {
        let items: Vec<BlockItem> = (0..10)
            .map(|i| block_item(0, i, if i % 2 == 0 { "a" } else { "b" }, false))
            .collect();
        let mut rng = StdRng::seed_from_u64(3);
        let ordered = items_with_alternating_conditions(&items, &mut rng).unwrap();
        for pair in ordered.windows(2) {
            assert_ne!(pair[0].condition, pair[1].condition);
        }
    }

    #[test]
    fn pseudo_times_out_when_unsolvable() {
        // Two items from the same non-filler set can never be separated.
        let items = vec![block_item(0, 0, "a", false), block_item(0, 1, "b", false)];
        let mut rng = StdRng::seed_from_u64(1);
        let result = order_block(items, Randomization::Pseudo, &mut rng);
        assert!(matches!(result, Err(CoreError::PseudoRandomizationTimeout)));
    }
}
