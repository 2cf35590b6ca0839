//! Item-list distribution.
//!
//! Latin-square assignment guarantees each participant sees exactly
//! one condition per item number; all-to-all puts every item on a
//! single shared list.

use crate::error::CoreError;
use crate::materials::{ItemList, ListDistribution, Materials};

/// Compute the item lists for a validated materials set.
///
/// Latin-square: with C conditions, create lists 0..C-1 and place the
/// item at sorted index `i` onto list `(i - (number - 1)) mod C`. The
/// j-th list then uses condition `conditions[(j + number - 1) mod C]`
/// for item `number`.
///
/// All-to-all: one list holding every item, ordered by effective block
/// then `(number, condition)`.
pub fn compute_item_lists(materials: &Materials) -> Result<Vec<ItemList>, CoreError> {
    if !materials.items_validated {
        return Err(CoreError::NotAllowed(
            "validate the items before generating lists".into(),
        ));
    }
    match materials.list_distribution {
        ListDistribution::LatinSquare => Ok(latin_square_lists(materials)),
        ListDistribution::AllToAll => Ok(all_to_all_lists(materials)),
    }
}

fn latin_square_lists(materials: &Materials) -> Vec<ItemList> {
    let condition_count = materials.condition_count();
    let mut lists: Vec<ItemList> = (0..condition_count)
        .map(|number| ItemList {
            number,
            items: Vec::new(),
        })
        .collect();
    for (i, &index) in materials.item_order().iter().enumerate() {
        let number = materials.items[index].number as usize;
        let shift = (i + condition_count - ((number - 1) % condition_count)) % condition_count;
        lists[shift].items.push(index);
    }
    lists
}

fn all_to_all_lists(materials: &Materials) -> Vec<ItemList> {
    let mut order = materials.item_order();
    order.sort_by_key(|&index| materials.effective_block(&materials.items[index]));
    vec![ItemList {
        number: 0,
        items: order,
    }]
}
