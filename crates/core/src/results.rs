//! Result tables.
//!
//! Ratings join with item, questionnaire, and scale metadata into a
//! long-format table (one row per rating), a wide-format table (one
//! row per subject × item × condition with per-question columns), and
//! group-by aggregations with per-question scale offsets.

use serde::{Deserialize, Serialize};

use crate::listing::to_list_string;
use crate::study::Study;

/// One stored rating, resolved to its slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingInput {
    pub slot_number: usize,
    pub question: usize,
    pub scale_value: usize,
    pub comment: Option<String>,
}

/// All ratings of one (non-test) trial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialRatings {
    /// Subject number: 1 + the count of earlier non-test trials.
    pub subject: u32,
    pub questionnaire_number: u32,
    pub ratings: Vec<RatingInput>,
    /// Demographic answers in field order.
    pub demographics: Vec<String>,
}

/// One long-format row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongRow {
    pub materials_index: usize,
    pub subject: u32,
    pub item_number: u32,
    pub condition: String,
    /// 1-based slot index.
    pub position: usize,
    pub question: usize,
    pub rating_number: usize,
    pub label: String,
    pub content: String,
    pub comment: Option<String>,
    /// User-facing question order (1-based), when randomized.
    pub question_order: Option<String>,
    /// Per-question scale label order, newline-joined, when any
    /// question randomizes its scale.
    pub random_scale: Option<String>,
    pub demographics: Vec<String>,
}

/// Long-format results: one row per rating of a non-test trial,
/// sorted by (subject, item number, condition).
pub fn results_long(study: &Study, trials: &[TrialRatings]) -> Vec<LongRow> {
    let mut rows = Vec::new();
    for trial in trials {
        let Some(questionnaire) = study
            .questionnaires
            .iter()
            .find(|q| q.number == trial.questionnaire_number)
        else {
            continue;
        };
        for rating in &trial.ratings {
            let Some(slot) = questionnaire.slots.get(rating.slot_number) else {
                continue;
            };
            let Some(materials) = study.materials.get(slot.materials_index) else {
                continue;
            };
            let Some(item_index) = materials.find_item(slot.item_number, &slot.condition) else {
                continue;
            };
            let item = &materials.items[item_index];
            let label = study
                .question(rating.question)
                .and_then(|question| question.scale_values.get(rating.scale_value))
                .map(|value| value.label.clone())
                .unwrap_or_default();

            let question_order = if study.settings.pseudo_randomize_question_order {
                slot.question_order.as_ref().map(|order| {
                    order
                        .iter()
                        .map(|number| (number + 1).to_string())
                        .collect::<Vec<_>>()
                        .join(",")
                })
            } else {
                None
            };
            let random_scale = if study.has_question_with_random_scale() {
                Some(
                    slot.question_properties
                        .iter()
                        .filter_map(|property| {
                            let question = study.question(property.question)?;
                            let labels = question.scale_labels();
                            let reordered: Vec<&str> = property
                                .scale_order
                                .iter()
                                .filter_map(|&pos| labels.get(pos).copied())
                                .collect();
                            Some(to_list_string(reordered))
                        })
                        .collect::<Vec<_>>()
                        .join("\n"),
                )
            } else {
                None
            };

            rows.push(LongRow {
                materials_index: slot.materials_index,
                subject: trial.subject,
                item_number: slot.item_number,
                condition: slot.condition.clone(),
                position: slot.number + 1,
                question: rating.question,
                rating_number: rating.scale_value,
                label,
                content: item.content.as_cell(),
                comment: rating.comment.clone(),
                question_order,
                random_scale,
                demographics: trial.demographics.clone(),
            });
        }
    }
    rows.sort_by(|a, b| {
        (a.subject, a.item_number, &a.condition, a.question).cmp(&(
            b.subject,
            b.item_number,
            &b.condition,
            b.question,
        ))
    });
    rows
}

/// One wide-format row: the long rows of a (subject, item, condition)
/// cell collapsed, with per-question rating and comment vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WideRow {
    pub materials_index: usize,
    pub subject: u32,
    pub item_number: u32,
    pub condition: String,
    pub position: usize,
    pub content: String,
    /// Rating number per question, -1 when unrated.
    pub ratings: Vec<i64>,
    /// Scale label per question, empty when unrated.
    pub labels: Vec<String>,
    pub comments: Vec<Option<String>>,
    pub question_order: Option<String>,
    pub random_scale: Option<String>,
    pub demographics: Vec<String>,
}

/// Collapse long rows into one row per (subject, item, condition).
pub fn result_lists_for_questions(study: &Study, rows: &[LongRow]) -> Vec<WideRow> {
    let n_questions = study.question_count();
    let mut wide: Vec<WideRow> = Vec::new();
    for row in rows {
        let key = (row.materials_index, row.subject, row.item_number, &row.condition);
        let entry = wide.iter_mut().find(|w| {
            (w.materials_index, w.subject, w.item_number, &w.condition) == key
        });
        let entry = match entry {
            Some(entry) => entry,
            None => {
                wide.push(WideRow {
                    materials_index: row.materials_index,
                    subject: row.subject,
                    item_number: row.item_number,
                    condition: row.condition.clone(),
                    position: row.position,
                    content: row.content.clone(),
                    ratings: vec![-1; n_questions],
                    labels: vec![String::new(); n_questions],
                    comments: vec![None; n_questions],
                    question_order: row.question_order.clone(),
                    random_scale: row.random_scale.clone(),
                    demographics: row.demographics.clone(),
                });
                wide.last_mut().expect("just pushed")
            }
        };
        if row.question < n_questions {
            entry.ratings[row.question] = row.rating_number as i64;
            entry.labels[row.question] = row.label.clone();
            entry.comments[row.question] = row.comment.clone();
        }
    }
    wide
}

/// A grouping dimension of the aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKey {
    Subject,
    Item,
    Condition,
}

/// One aggregated cell. Blanked (`None`) columns are the chosen
/// grouping dimensions; `ratings` is indexed by
/// `offset(question) + rating_number` with per-question offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRow {
    pub materials_index: usize,
    pub subject: Option<u32>,
    pub item_number: Option<u32>,
    pub condition: Option<String>,
    /// Number of distinct respondents in the cell.
    pub rating_count: f64,
    /// Fraction of respondents per scale value of each question.
    pub ratings: Vec<f64>,
}

/// Offset of a question's scale values in the flat `ratings` vector.
pub fn scale_offset(study: &Study, question: usize) -> usize {
    study
        .questions
        .iter()
        .filter(|q| q.number < question)
        .map(|q| q.scale_count())
        .sum()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Aggregate long rows over the chosen grouping dimensions.
///
/// The remaining columns form the aggregation key; `ratings[j]` counts
/// are normalized to fractions of the distinct respondents per cell.
pub fn aggregated_results(
    study: &Study,
    rows: &[LongRow],
    group_keys: &[GroupKey],
) -> Vec<AggregatedRow> {
    let n_questions = study.question_count();
    if n_questions == 0 {
        return Vec::new();
    }
    let total_scale: usize = study.questions.iter().map(|q| q.scale_count()).sum();
    let group_subject = group_keys.contains(&GroupKey::Subject);
    let group_item = group_keys.contains(&GroupKey::Item);
    let group_condition = group_keys.contains(&GroupKey::Condition);

    let mut aggregated: Vec<AggregatedRow> = Vec::new();
    for row in rows {
        let subject = (!group_subject).then_some(row.subject);
        let item_number = (!group_item).then_some(row.item_number);
        let condition = (!group_condition).then(|| row.condition.clone());

        let position = aggregated.iter().position(|agg| {
            agg.materials_index == row.materials_index
                && agg.subject == subject
                && agg.item_number == item_number
                && agg.condition == condition
        });
        let index = match position {
            Some(index) => index,
            None => {
                aggregated.push(AggregatedRow {
                    materials_index: row.materials_index,
                    subject,
                    item_number,
                    condition,
                    rating_count: 0.0,
                    ratings: vec![0.0; total_scale],
                });
                aggregated.len() - 1
            }
        };
        let offset = scale_offset(study, row.question);
        aggregated[index].ratings[offset + row.rating_number] += 1.0;
        aggregated[index].rating_count += 1.0;
    }

    for agg in &mut aggregated {
        agg.rating_count /= n_questions as f64;
        if agg.rating_count > 0.0 {
            for rating in &mut agg.ratings {
                *rating = round2(*rating / agg.rating_count);
            }
        }
    }
    aggregated.sort_by(|a, b| {
        (a.materials_index, a.subject, a.item_number, &a.condition).partial_cmp(&(
            b.materials_index,
            b.subject,
            b.item_number,
            &b.condition,
        ))
        .unwrap_or(std::cmp::Ordering::Equal)
    });
    aggregated
}
