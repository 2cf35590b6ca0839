//! Questionnaire construction.
//!
//! A questionnaire combines one item list per materials set. The base
//! set of Q questionnaires rotates each materials set's chosen list by
//! one position per successor, so over Q = lcm(condition counts) each
//! Latin-square list is used equally often. Additional permutation
//! questionnaires reuse the same lists with fresh block-internal
//! ordering and fresh per-slot properties, to let designers measure
//! residual order effects.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CoreError;
use crate::materials::ListDistribution;
use crate::properties::draw_permutations;
use crate::randomize::{order_block, BlockItem, Randomization};
use crate::study::Study;

/// Default number of order permutations per base questionnaire.
pub const DEFAULT_PERMUTATIONS: u32 = 4;

/// Block-level settings: instructions and the randomization mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionnaireBlockSettings {
    pub block: i32,
    pub instructions: Option<String>,
    /// Optional shorter reminder shown again during participation.
    pub short_instructions: Option<String>,
    pub randomization: Randomization,
}

/// Scale presentation order for one question at one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionProperty {
    pub question: usize,
    pub scale_order: Vec<usize>,
}

/// A single questionnaire position holding one item plus its
/// presentation metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// 0-based position.
    pub number: usize,
    pub materials_index: usize,
    pub item_number: u32,
    pub condition: String,
    /// Permutation of question numbers, when the study randomizes
    /// question order.
    pub question_order: Option<Vec<usize>>,
    pub question_properties: Vec<QuestionProperty>,
}

impl Slot {
    pub fn scale_order(&self, question: usize) -> Option<&[usize]> {
        self.question_properties
            .iter()
            .find(|property| property.question == question)
            .map(|property| property.scale_order.as_slice())
    }
}

/// One generated questionnaire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Questionnaire {
    /// 1-based questionnaire number.
    pub number: u32,
    pub slug: String,
    /// Chosen list number per materials set, indexed like
    /// `study.materials`.
    pub list_numbers: Vec<usize>,
    pub slots: Vec<Slot>,
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn lcm(a: u64, b: u64) -> u64 {
    a / gcd(a, b) * b
}

/// Number of base questionnaires: the lcm of the Latin-square
/// condition counts. All-to-all sets contribute a single reused list.
pub fn questionnaire_count(study: &Study) -> u32 {
    let mut count = 1u64;
    for materials in &study.materials {
        if materials.list_distribution == ListDistribution::LatinSquare {
            count = lcm(count, materials.condition_count().max(1) as u64);
        }
    }
    count as u32
}

/// The randomization mode per block; blocks without explicit settings
/// keep their list order.
pub fn block_randomization(study: &Study) -> BTreeMap<i32, Randomization> {
    let mut modes = BTreeMap::new();
    for block in study.item_blocks() {
        let mode = study
            .blocks
            .iter()
            .find(|settings| settings.block == block)
            .map(|settings| settings.randomization)
            .unwrap_or(Randomization::None);
        modes.insert(block, mode);
    }
    modes
}

/// Generate the full questionnaire set for a study.
///
/// Produces Q base questionnaires plus, when any block randomizes,
/// `permutations - 1` derived rounds numbered `Q·p + q` that reuse the
/// same lists. Refuses when a materials set has no lists yet, or when
/// pseudo-randomization is requested without filler materials.
pub fn generate_questionnaires<R: Rng + ?Sized>(
    study: &Study,
    study_slug: &str,
    permutations: u32,
    rng: &mut R,
) -> Result<Vec<Questionnaire>, CoreError> {
    if study.materials.is_empty() {
        return Err(CoreError::NotAllowed(
            "create materials before generating questionnaires".into(),
        ));
    }
    for materials in &study.materials {
        if !materials.is_complete() {
            return Err(CoreError::NotAllowed(format!(
                "materials \"{}\" has no item lists yet",
                materials.title
            )));
        }
    }
    let modes = block_randomization(study);
    let uses_pseudo = modes.values().any(|mode| *mode == Randomization::Pseudo);
    if uses_pseudo && !study.has_filler_materials() {
        return Err(CoreError::NotAllowed(
            "pseudo-randomization requires at least one filler materials set".into(),
        ));
    }
    let has_randomization = modes.values().any(|mode| *mode != Randomization::None);
    let rounds = if has_randomization {
        permutations.max(1)
    } else {
        1
    };

    let base_count = questionnaire_count(study);
    let mut questionnaires = Vec::with_capacity((base_count * rounds) as usize);
    for round in 0..rounds {
        for q in 1..=base_count {
            let number = base_count * round + q;
            let list_numbers: Vec<usize> = study
                .materials
                .iter()
                .map(|materials| ((q - 1) as usize) % materials.lists.len())
                .collect();
            let slots = generate_slots(study, &modes, &list_numbers, rng)?;
            questionnaires.push(Questionnaire {
                number,
                slug: format!("{study_slug}-{number}"),
                list_numbers,
                slots,
            });
        }
    }
    info!(
        study = %study.settings.title,
        base = base_count,
        total = questionnaires.len(),
        "questionnaires generated"
    );
    Ok(questionnaires)
}

/// Build the ordered slot sequence for one questionnaire.
fn generate_slots<R: Rng + ?Sized>(
    study: &Study,
    modes: &BTreeMap<i32, Randomization>,
    list_numbers: &[usize],
    rng: &mut R,
) -> Result<Vec<Slot>, CoreError> {
    // Items grouped by effective block, in (materials, list) order.
    let mut by_block: BTreeMap<i32, Vec<BlockItem>> = BTreeMap::new();
    for (materials_index, materials) in study.materials.iter().enumerate() {
        let list = &materials.lists[list_numbers[materials_index]];
        let condition_count = materials.condition_count();
        for &item_index in &list.items {
            let item = &materials.items[item_index];
            let block = materials.effective_block(item);
            by_block.entry(block).or_default().push(BlockItem {
                materials_index,
                item_index,
                block,
                condition: item.condition.clone(),
                is_filler: materials.is_filler,
                condition_count,
            });
        }
    }

    let mut slots = Vec::new();
    let mut offset = 0usize;
    for (block, items) in by_block {
        let mode = modes.get(&block).copied().unwrap_or(Randomization::None);
        let ordered = order_block(items, mode, rng)?;
        for (i, block_item) in ordered.into_iter().enumerate() {
            let materials = &study.materials[block_item.materials_index];
            let item = &materials.items[block_item.item_index];
            slots.push(Slot {
                number: offset + i,
                materials_index: block_item.materials_index,
                item_number: item.number,
                condition: item.condition.clone(),
                question_order: None,
                question_properties: Vec::new(),
            });
        }
        offset = slots.len();
    }

    attach_slot_properties(study, &mut slots, rng);
    Ok(slots)
}

/// Attach question-order and scale-order permutations per §4.7.
fn attach_slot_properties<R: Rng + ?Sized>(study: &Study, slots: &mut [Slot], rng: &mut R) {
    let n_questions = study.question_count();
    if study.settings.pseudo_randomize_question_order && n_questions > 1 {
        let orders = draw_permutations(n_questions, slots.len(), rng);
        for (slot, order) in slots.iter_mut().zip(orders) {
            slot.question_order = Some(order);
        }
    }
    for question in &study.questions {
        if !question.randomize_scale {
            continue;
        }
        let orders = draw_permutations(question.scale_count(), slots.len(), rng);
        for (slot, order) in slots.iter_mut().zip(orders) {
            slot.question_properties.push(QuestionProperty {
                question: question.number,
                scale_order: order,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::compute_item_lists;
    use crate::item::{Item, ItemContent};
    use crate::materials::Materials;
    use crate::study::{Question, RatingCommentMode, ScaleValue, StudySettings};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn materials_with(title: &str, n_items: u32, conditions: &[&str]) -> Materials {
        let mut materials = Materials::new(title);
        for number in 1..=n_items {
            for condition in conditions {
                materials.items.push(Item::new(
                    number,
                    *condition,
                    ItemContent::Text(format!("{title} {number}{condition}")),
                ));
            }
        }
        materials.items_validated = true;
        materials.lists = compute_item_lists(&materials).unwrap();
        materials
    }

    fn question(number: usize, scale: usize, randomize_scale: bool) -> Question {
        Question {
            number,
            prompt: format!("q{number}"),
            legend: None,
            randomize_scale,
            rating_comment: RatingCommentMode::None,
            scale_values: (0..scale)
                .map(|n| ScaleValue {
                    number: n,
                    label: format!("{}", n + 1),
                })
                .collect(),
        }
    }

    fn study_with(materials: Vec<Materials>) -> Study {
        Study {
            settings: StudySettings {
                title: "test".into(),
                ..StudySettings::default()
            },
            questions: vec![question(0, 5, false)],
            demographic_fields: Vec::new(),
            materials,
            questionnaires: Vec::new(),
            blocks: Vec::new(),
        }
    }

    #[test]
    fn lcm_combination() {
        // 2 and 3 conditions combine to 6 base questionnaires; each
        // list of the first set appears 3 times, of the second twice.
        let study = study_with(vec![
            materials_with("m1", 4, &["a", "b"]),
            materials_with("m2", 3, &["a", "b", "c"]),
        ]);
        assert_eq!(questionnaire_count(&study), 6);

        let mut rng = StdRng::seed_from_u64(1);
        let questionnaires = generate_questionnaires(&study, "test", 4, &mut rng).unwrap();
        assert_eq!(questionnaires.len(), 6);
        for list in 0..2 {
            let uses = questionnaires
                .iter()
                .filter(|q| q.list_numbers[0] == list)
                .count();
            assert_eq!(uses, 3);
        }
        for list in 0..3 {
            let uses = questionnaires
                .iter()
                .filter(|q| q.list_numbers[1] == list)
                .count();
            assert_eq!(uses, 2);
        }
    }

    #[test]
    fn all_to_all_reuses_single_list() {
        let mut m2 = materials_with("m2", 3, &["a", "b"]);
        m2.list_distribution = crate::materials::ListDistribution::AllToAll;
        m2.lists = compute_item_lists(&m2).unwrap();
        let study = study_with(vec![materials_with("m1", 4, &["a", "b"]), m2]);
        assert_eq!(questionnaire_count(&study), 2);
        let mut rng = StdRng::seed_from_u64(1);
        let questionnaires = generate_questionnaires(&study, "test", 4, &mut rng).unwrap();
        assert!(questionnaires.iter().all(|q| q.list_numbers[1] == 0));
        // All-to-all slots carry every condition of m2.
        for questionnaire in &questionnaires {
            let m2_slots = questionnaire
                .slots
                .iter()
                .filter(|slot| slot.materials_index == 1)
                .count();
            assert_eq!(m2_slots, 6);
        }
    }

    #[test]
    fn slots_match_chosen_lists() {
        let study = study_with(vec![
            materials_with("m1", 4, &["a", "b"]),
            materials_with("m2", 3, &["a", "b", "c"]),
        ]);
        let mut rng = StdRng::seed_from_u64(2);
        let questionnaires = generate_questionnaires(&study, "test", 4, &mut rng).unwrap();
        for questionnaire in &questionnaires {
            let mut expected: Vec<(usize, u32, String)> = Vec::new();
            for (materials_index, materials) in study.materials.iter().enumerate() {
                let list = &materials.lists[questionnaire.list_numbers[materials_index]];
                for &item_index in &list.items {
                    let item = &materials.items[item_index];
                    expected.push((materials_index, item.number, item.condition.clone()));
                }
            }
            let mut actual: Vec<(usize, u32, String)> = questionnaire
                .slots
                .iter()
                .map(|slot| (slot.materials_index, slot.item_number, slot.condition.clone()))
                .collect();
            expected.sort();
            actual.sort();
            assert_eq!(expected, actual);
        }
    }

    #[test]
    fn permutation_rounds_reuse_lists() {
        let mut study = study_with(vec![materials_with("m1", 4, &["a", "b"])]);
        study.blocks.push(QuestionnaireBlockSettings {
            block: 1,
            instructions: None,
            short_instructions: None,
            randomization: Randomization::True,
        });
        let mut rng = StdRng::seed_from_u64(3);
        let questionnaires = generate_questionnaires(&study, "test", 4, &mut rng).unwrap();
        assert_eq!(questionnaires.len(), 8); // Q=2 base, 4 rounds
        for (i, questionnaire) in questionnaires.iter().enumerate() {
            assert_eq!(questionnaire.number as usize, i + 1);
            let base = &questionnaires[i % 2];
            assert_eq!(questionnaire.list_numbers, base.list_numbers);
        }
    }

    #[test]
    fn no_randomization_means_single_round() {
        let study = study_with(vec![materials_with("m1", 4, &["a", "b"])]);
        let mut rng = StdRng::seed_from_u64(4);
        let questionnaires = generate_questionnaires(&study, "test", 4, &mut rng).unwrap();
        assert_eq!(questionnaires.len(), 2);
        // Keep-order blocks preserve list order.
        let slots: Vec<String> = questionnaires[0]
            .slots
            .iter()
            .map(|slot| format!("{}{}", slot.item_number, slot.condition))
            .collect();
        assert_eq!(slots, vec!["1a", "2b", "3a", "4b"]);
    }

    #[test]
    fn pseudo_without_filler_is_refused() {
        let mut study = study_with(vec![materials_with("m1", 4, &["a", "b"])]);
        study.blocks.push(QuestionnaireBlockSettings {
            block: 1,
            instructions: None,
            short_instructions: None,
            randomization: Randomization::Pseudo,
        });
        let mut rng = StdRng::seed_from_u64(5);
        let result = generate_questionnaires(&study, "test", 4, &mut rng);
        assert!(matches!(result, Err(CoreError::NotAllowed(_))));
    }

    #[test]
    fn question_order_permutations_attached() {
        let mut study = study_with(vec![materials_with("m1", 4, &["a", "b"])]);
        study.settings.pseudo_randomize_question_order = true;
        study.questions = vec![question(0, 5, false), question(1, 3, true)];
        let mut rng = StdRng::seed_from_u64(6);
        let questionnaires = generate_questionnaires(&study, "test", 4, &mut rng).unwrap();
        for questionnaire in &questionnaires {
            for slot in &questionnaire.slots {
                let order = slot.question_order.as_ref().expect("question order");
                let mut sorted = order.clone();
                sorted.sort_unstable();
                assert_eq!(sorted, vec![0, 1]);

                let scale_order = slot.scale_order(1).expect("scale order");
                let mut sorted = scale_order.to_vec();
                sorted.sort_unstable();
                assert_eq!(sorted, vec![0, 1, 2]);
                assert!(slot.scale_order(0).is_none());
            }
        }
    }

    #[test]
    fn example_items_lead_in_block_zero() {
        let mut example = materials_with("examples", 2, &["a"]);
        example.is_example = true;
        let study = study_with(vec![materials_with("m1", 4, &["a", "b"]), example]);
        let mut rng = StdRng::seed_from_u64(7);
        let questionnaires = generate_questionnaires(&study, "test", 4, &mut rng).unwrap();
        for questionnaire in &questionnaires {
            assert_eq!(questionnaire.slots[0].materials_index, 1);
            assert_eq!(questionnaire.slots[1].materials_index, 1);
            let numbers: Vec<usize> = questionnaire.slots.iter().map(|s| s.number).collect();
            assert_eq!(numbers, (0..questionnaire.slots.len()).collect::<Vec<_>>());
        }
    }
}
