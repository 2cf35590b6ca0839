//! Materials sets: item containers with structural validation.
//!
//! A materials set owns items grouped by `(number, condition)` and the
//! item lists computed from them. Validation establishes the canonical
//! condition order, checks the grid is regular, and emits
//! duplicate-content warnings before lists may be generated.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CoreError;
use crate::item::{Item, ItemContent, ItemType};
use crate::listing::split_list_string;
use crate::study::Question;

/// How items are assigned to lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ListDistribution {
    LatinSquare,
    AllToAll,
}

impl ListDistribution {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListDistribution::LatinSquare => "latin-square",
            ListDistribution::AllToAll => "all-to-all",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "latin-square" => Some(ListDistribution::LatinSquare),
            "all-to-all" => Some(ListDistribution::AllToAll),
            _ => None,
        }
    }
}

/// One assignment of items to a participant group. Items are stored as
/// indices into the owning materials set's item vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemList {
    pub number: usize,
    pub items: Vec<usize>,
}

/// A set of experimental materials belonging to a study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Materials {
    pub title: String,
    pub list_distribution: ListDistribution,
    /// Fillers satisfy the adjacency constraints of pseudo-randomization.
    pub is_filler: bool,
    /// Example items all land in block 0, before everything else.
    pub is_example: bool,
    /// Block override; -1 means blocks come from the items themselves.
    pub block: i32,
    pub items_validated: bool,
    pub items: Vec<Item>,
    pub lists: Vec<ItemList>,
}

impl Materials {
    pub fn new(title: impl Into<String>) -> Self {
        Materials {
            title: title.into(),
            list_distribution: ListDistribution::LatinSquare,
            is_filler: false,
            is_example: false,
            block: -1,
            items_validated: false,
            items: Vec::new(),
            lists: Vec::new(),
        }
    }

    /// Items sorted by `(number, condition)`, as indices.
    pub fn item_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.items.len()).collect();
        order.sort_by(|&a, &b| {
            let (ia, ib) = (&self.items[a], &self.items[b]);
            ia.number
                .cmp(&ib.number)
                .then_with(|| ia.condition.cmp(&ib.condition))
        });
        order
    }

    /// Canonical condition order: walk items sorted by
    /// `(number, condition)` and collect each new condition until one
    /// repeats.
    pub fn conditions(&self) -> Vec<String> {
        let mut conditions: Vec<String> = Vec::new();
        for &index in &self.item_order() {
            let condition = &self.items[index].condition;
            if conditions.contains(condition) {
                break;
            }
            conditions.push(condition.clone());
        }
        conditions
    }

    pub fn condition_count(&self) -> usize {
        self.conditions().len()
    }

    /// Number of distinct item numbers, meaningful once validated.
    pub fn item_count(&self) -> usize {
        if self.items_validated && !self.items.is_empty() {
            self.items.len() / self.condition_count().max(1)
        } else {
            0
        }
    }

    /// The block a given item effectively belongs to.
    pub fn effective_block(&self, item: &Item) -> i32 {
        if self.is_example {
            0
        } else if self.block > 0 {
            self.block
        } else {
            item.block
        }
    }

    /// The distinct blocks this materials set occupies.
    pub fn item_blocks(&self) -> Vec<i32> {
        if self.is_example {
            return vec![0];
        }
        if self.block > 0 {
            return vec![self.block];
        }
        let mut blocks: Vec<i32> = self.items.iter().map(|item| item.block).collect();
        blocks.sort_unstable();
        blocks.dedup();
        blocks
    }

    pub fn has_lists(&self) -> bool {
        !self.lists.is_empty()
    }

    /// Items created, validated, and lists generated.
    pub fn is_complete(&self) -> bool {
        self.has_lists()
    }

    /// Look up an item index by its `(number, condition)` identity.
    pub fn find_item(&self, number: u32, condition: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.number == number && item.condition == condition)
    }
}

const WARN_ITEMS_MAX: usize = 10;

fn warn_items_string(labels: &[String]) -> String {
    let mut joined = labels
        .iter()
        .take(WARN_ITEMS_MAX)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if labels.len() > WARN_ITEMS_MAX {
        joined.push_str(",...");
    }
    joined
}

/// Validate the structural regularity of a materials set.
///
/// On success returns informational warnings (duplicate contents, the
/// final item/condition summary). Fails with [`CoreError::Structural`]
/// when the item grid is irregular; the caller must not generate lists
/// from an unvalidated set.
pub fn validate_items(
    materials: &Materials,
    item_type: ItemType,
    questions: &[Question],
) -> Result<Vec<String>, CoreError> {
    let mut warnings = Vec::new();

    if materials.items.is_empty() {
        return Err(CoreError::Structural("No items.".into()));
    }

    let order = materials.item_order();
    let conditions = materials.conditions();
    let condition_count = conditions.len();
    let n_items = materials.items.len();

    if materials.list_distribution == ListDistribution::LatinSquare
        && n_items % condition_count != 0
    {
        let listed = conditions
            .iter()
            .map(|condition| format!("\"{condition}\""))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(CoreError::Structural(format!(
            "Number of stimuli is not a multiple of the number of conditions \
             (stimuli: {n_items}, conditions: {listed})"
        )));
    }

    let mut item_number = 0u32;
    for (i, &index) in order.iter().enumerate() {
        let item = &materials.items[index];
        if item.content.is_empty() {
            let what = match item_type {
                ItemType::AudioLinks => "URLs",
                _ => "text",
            };
            return Err(CoreError::Structural(format!(
                "Item {} has no {what}.",
                item.label()
            )));
        }

        if i % condition_count == 0 {
            item_number += 1;
        }
        if item.number != item_number || item.condition != conditions[i % condition_count] {
            return Err(CoreError::Structural(format!(
                "Item \"{}\" was not expected. Check whether item number/condition is correct.",
                item.label()
            )));
        }

        for item_question in &item.item_questions {
            let Some(question) = questions.iter().find(|q| q.number == item_question.number)
            else {
                return Err(CoreError::Structural(
                    "For item question validation the study question(s) must be defined first."
                        .into(),
                ));
            };
            if let Some(scale_labels) = &item_question.scale_labels {
                if split_list_string(scale_labels).len() != question.scale_count() {
                    return Err(CoreError::Structural(format!(
                        "Scale of the item question \"{}\" does not match the study question {} scale.",
                        item.label(),
                        item_question.number + 1,
                    )));
                }
            }
        }
    }

    warnings.extend(duplicate_content_warnings(materials, item_type));

    let listed = conditions
        .iter()
        .map(|condition| format!("\"{condition}\""))
        .collect::<Vec<_>>()
        .join(", ");
    warnings.push(format!(
        "Detected {item_number} items with following conditions: {listed} (sum: {n_items} stimuli)."
    ));
    debug!(materials = %materials.title, items = n_items, conditions = condition_count, "items validated");
    Ok(warnings)
}

/// Create empty placeholder items: numbers `1..=n_items`, each with
/// conditions `a, b, c, ...`. They replace whatever items exist and
/// still need content before validation.
pub fn pregenerate_items(n_items: usize, n_conditions: usize, item_type: ItemType) -> Vec<Item> {
    let condition_count = n_conditions.min(26);
    let mut items = Vec::with_capacity(n_items * condition_count);
    for number in 1..=n_items {
        for index in 0..condition_count {
            let condition = char::from(b'a' + index as u8);
            items.push(Item::new(
                number as u32,
                condition.to_string(),
                ItemContent::from_cell(item_type, ""),
            ));
        }
    }
    items
}

fn duplicate_content_warnings(materials: &Materials, item_type: ItemType) -> Vec<String> {
    let mut warnings = Vec::new();
    match item_type {
        ItemType::PlainText | ItemType::Markdown => {
            let mut by_text: Vec<(String, Vec<String>)> = Vec::new();
            for item in &materials.items {
                let key = item.content.comparison_key();
                match by_text.iter_mut().find(|(text, _)| *text == key) {
                    Some((_, labels)) => labels.push(item.label()),
                    None => by_text.push((key, vec![item.label()])),
                }
            }
            for (_, labels) in by_text {
                if labels.len() > 1 {
                    warnings.push(format!(
                        "Items {} have the same text.",
                        warn_items_string(&labels)
                    ));
                }
            }
        }
        ItemType::AudioLinks => {
            let mut by_url: Vec<(String, Vec<String>)> = Vec::new();
            for item in &materials.items {
                for url in item.content.urls() {
                    match by_url.iter_mut().find(|(u, _)| u == url) {
                        Some((_, labels)) => labels.push(item.label()),
                        None => by_url.push((url.clone(), vec![item.label()])),
                    }
                }
            }
            for (_, labels) in by_url {
                let mut unique: Vec<String> = Vec::new();
                for label in &labels {
                    if !unique.contains(label) {
                        unique.push(label.clone());
                    }
                }
                if unique.len() > 1 {
                    warnings.push(format!(
                        "Items {} have the same URL.",
                        warn_items_string(&unique)
                    ));
                }
                let mut repeated: Vec<String> = Vec::new();
                for label in &labels {
                    if labels.iter().filter(|l| *l == label).count() > 1
                        && !repeated.contains(label)
                    {
                        repeated.push(label.clone());
                    }
                }
                if !repeated.is_empty() {
                    warnings.push(format!(
                        "Items {} use the same URL multiple times.",
                        warn_items_string(&repeated)
                    ));
                }
            }
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn text_item(number: u32, condition: &str, text: &str) -> Item {
        Item::new(number, condition, ItemContent::Text(text.into()))
    }

    fn two_by_two() -> Materials {
        let mut materials = Materials::new("exp");
        for number in 1..=2 {
            for condition in ["a", "b"] {
                materials.items.push(text_item(
                    number,
                    condition,
                    &format!("item {number}{condition}"),
                ));
            }
        }
        materials
    }

    #[test]
    fn pregenerate_creates_empty_numbered_items() {
        let items = pregenerate_items(3, 2, ItemType::PlainText);
        assert_eq!(items.len(), 6);
        assert_eq!(items[0].label(), "1a");
        assert_eq!(items[5].label(), "3b");
        assert!(items.iter().all(|item| item.content.as_cell().is_empty()));
    }

    #[test]
    fn conditions_in_canonical_order() {
        let materials = two_by_two();
        assert_eq!(materials.conditions(), vec!["a", "b"]);
    }

    #[test]
    fn validate_accepts_regular_grid() {
        let materials = two_by_two();
        let warnings = validate_items(&materials, ItemType::PlainText, &[]).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Detected 2 items"));
    }

    #[test]
    fn validate_rejects_empty_set() {
        let materials = Materials::new("empty");
        assert_matches!(
            validate_items(&materials, ItemType::PlainText, &[]),
            Err(CoreError::Structural(msg)) if msg == "No items."
        );
    }

    #[test]
    fn validate_rejects_ragged_conditions() {
        let mut materials = two_by_two();
        materials.items.pop();
        assert_matches!(
            validate_items(&materials, ItemType::PlainText, &[]),
            Err(CoreError::Structural(msg))
                if msg.contains("not a multiple of the number of conditions")
        );
    }

    #[test]
    fn validate_rejects_gap_in_numbers() {
        let mut materials = two_by_two();
        materials.items[2].number = 5;
        materials.items[3].number = 5;
        assert_matches!(
            validate_items(&materials, ItemType::PlainText, &[]),
            Err(CoreError::Structural(msg)) if msg.contains("was not expected")
        );
    }

    #[test]
    fn validate_rejects_empty_content() {
        let mut materials = two_by_two();
        materials.items[1].content = ItemContent::Text("  ".into());
        assert_matches!(
            validate_items(&materials, ItemType::PlainText, &[]),
            Err(CoreError::Structural(msg)) if msg.contains("has no text")
        );
    }

    #[test]
    fn validate_warns_on_duplicate_text() {
        let mut materials = two_by_two();
        materials.items[3].content = materials.items[0].content.clone();
        let warnings = validate_items(&materials, ItemType::PlainText, &[]).unwrap();
        assert!(warnings.iter().any(|w| w.contains("have the same text")));
    }

    #[test]
    fn validate_checks_item_question_scale_length() {
        use crate::item::ItemQuestion;
        use crate::study::{Question, RatingCommentMode, ScaleValue};

        let question = Question {
            number: 0,
            prompt: "How natural?".into(),
            legend: None,
            randomize_scale: false,
            rating_comment: RatingCommentMode::None,
            scale_values: (0..5)
                .map(|number| ScaleValue {
                    number,
                    label: format!("{}", number + 1),
                })
                .collect(),
        };
        let mut materials = two_by_two();
        materials.items[0].item_questions.push(ItemQuestion {
            number: 0,
            prompt: None,
            scale_labels: Some("1,2,3".into()),
            legend: None,
        });
        assert_matches!(
            validate_items(&materials, ItemType::PlainText, std::slice::from_ref(&question)),
            Err(CoreError::Structural(msg)) if msg.contains("does not match the study question")
        );

        materials.items[0].item_questions[0].scale_labels = Some("1,2,3,4,5".into());
        assert!(validate_items(&materials, ItemType::PlainText, &[question]).is_ok());
    }

    #[test]
    fn effective_block_precedence() {
        let mut materials = two_by_two();
        materials.items[0].block = 3;
        assert_eq!(materials.effective_block(&materials.items[0]), 3);
        materials.block = 2;
        assert_eq!(materials.effective_block(&materials.items[0]), 2);
        materials.is_example = true;
        assert_eq!(materials.effective_block(&materials.items[0]), 0);
    }
}
