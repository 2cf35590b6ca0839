//! CSV surfaces.
//!
//! Every table the engine exchanges with the outside world is CSV with
//! `;` delimiters, minimal quoting, and `\n` line terminators. Uploads
//! are sniffed first (see [`crate::dialect`]); parse errors always
//! carry the offending row number.

use csv::StringRecord;

use crate::dialect::{decode_upload, detect_dialect, DEFAULT_DELIMITER};
use crate::error::CoreError;
use crate::item::{Item, ItemContent, ItemFeedback, ItemQuestion, ItemType};
use crate::listing::{split_int_list, split_list_string, to_int_list, to_list_string};
use crate::randomize::Randomization;
use crate::results::{result_lists_for_questions, LongRow};
use crate::study::Study;

fn writer(buffer: &mut Vec<u8>) -> csv::Writer<&mut Vec<u8>> {
    csv::WriterBuilder::new()
        .delimiter(DEFAULT_DELIMITER)
        .from_writer(buffer)
}

fn finish(buffer: Vec<u8>) -> Result<String, CoreError> {
    String::from_utf8(buffer).map_err(|err| CoreError::Structural(err.to_string()))
}

fn emit_error(err: csv::Error) -> CoreError {
    CoreError::Structural(err.to_string())
}

fn record_line(record: &StringRecord, fallback: usize) -> usize {
    record
        .position()
        .map(|position| position.line() as usize)
        .unwrap_or(fallback)
}

fn cell<'r>(record: &'r StringRecord, column: usize, line: usize) -> Result<&'r str, CoreError> {
    record
        .get(column - 1)
        .ok_or_else(|| CoreError::unexpected_entry(line))
}

fn optional_cell<'r>(record: &'r StringRecord, column: Option<usize>) -> Option<&'r str> {
    column
        .and_then(|column| record.get(column - 1))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Sniff an upload and hand back row records with their line numbers.
fn read_records(
    data: &[u8],
    int_columns: &[usize],
    forced_delimiter: Option<u8>,
) -> Result<Vec<(usize, StringRecord)>, CoreError> {
    let text = decode_upload(data);
    let dialect = detect_dialect(&text, int_columns, forced_delimiter)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(dialect.delimiter)
        .has_headers(dialect.has_header)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut records = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let fallback = index + 1 + usize::from(dialect.has_header);
        let record = result.map_err(|_| CoreError::unexpected_entry(fallback))?;
        if record.iter().all(|value| value.trim().is_empty()) {
            continue;
        }
        let line = record_line(&record, fallback);
        records.push((line, record));
    }
    Ok(records)
}

/// 1-based column layout of an items upload.
#[derive(Debug, Clone)]
pub struct ItemColumns {
    pub materials: Option<usize>,
    pub number: usize,
    pub condition: usize,
    pub content: usize,
    pub block: Option<usize>,
    pub audio_description: Option<usize>,
    pub questions: Vec<ItemQuestionColumns>,
}

/// Optional per-question override columns.
#[derive(Debug, Clone)]
pub struct ItemQuestionColumns {
    pub question: usize,
    pub prompt: Option<usize>,
    pub scale_labels: Option<usize>,
    pub legend: Option<usize>,
}

impl ItemColumns {
    /// The archive layout: materials, item, condition, content, block,
    /// audio description for audio studies, then prompt/scale/legend
    /// per question.
    pub fn archive(study: &Study) -> Self {
        let mut next = 6;
        let audio_description = if study.settings.item_type == ItemType::AudioLinks {
            next += 1;
            Some(next - 1)
        } else {
            None
        };
        let questions = study
            .questions
            .iter()
            .map(|question| {
                let columns = ItemQuestionColumns {
                    question: question.number,
                    prompt: Some(next),
                    scale_labels: Some(next + 1),
                    legend: Some(next + 2),
                };
                next += 3;
                columns
            })
            .collect();
        ItemColumns {
            materials: Some(1),
            number: 2,
            condition: 3,
            content: 4,
            block: Some(5),
            audio_description,
            questions,
        }
    }

    /// Per-materials uploads: no materials column, same tail layout.
    pub fn materials_upload(study: &Study) -> Self {
        let mut columns = Self::archive(study);
        columns.materials = None;
        columns.number = 1;
        columns.condition = 2;
        columns.content = 3;
        columns.block = Some(4);
        let mut next = 5;
        if columns.audio_description.is_some() {
            columns.audio_description = Some(next);
            next += 1;
        }
        for question in &mut columns.questions {
            question.prompt = Some(next);
            question.scale_labels = Some(next + 1);
            question.legend = Some(next + 2);
            next += 3;
        }
        columns
    }
}

/// One row of an items upload; the materials title is present only in
/// study-wide files.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedItem {
    pub materials: Option<String>,
    pub item: Item,
}

/// Emit all items of a study in archive layout.
pub fn emit_items_csv(study: &Study) -> Result<String, CoreError> {
    let mut buffer = Vec::new();
    {
        let mut writer = writer(&mut buffer);
        let mut header = vec![
            "materials".to_string(),
            "item".to_string(),
            "condition".to_string(),
            "content".to_string(),
            "block".to_string(),
        ];
        if study.settings.item_type == ItemType::AudioLinks {
            header.push("audio_description".to_string());
        }
        for question in &study.questions {
            header.push(format!("question{}", question.number + 1));
            header.push(format!("scale{}", question.number + 1));
            header.push(format!("legend{}", question.number + 1));
        }
        writer.write_record(&header).map_err(emit_error)?;

        for materials in &study.materials {
            for &index in &materials.item_order() {
                let item = &materials.items[index];
                let mut row = vec![
                    materials.title.clone(),
                    item.number.to_string(),
                    item.condition.clone(),
                    item.content.as_cell(),
                    item.block.to_string(),
                ];
                if study.settings.item_type == ItemType::AudioLinks {
                    row.push(item.audio_description.clone().unwrap_or_default());
                }
                for question in &study.questions {
                    let item_question = item.item_question(question.number);
                    row.push(
                        item_question
                            .and_then(|iq| iq.prompt.clone())
                            .unwrap_or_default(),
                    );
                    row.push(
                        item_question
                            .and_then(|iq| iq.scale_labels.clone())
                            .unwrap_or_default(),
                    );
                    row.push(
                        item_question
                            .and_then(|iq| iq.legend.clone())
                            .unwrap_or_default(),
                    );
                }
                writer.write_record(&row).map_err(emit_error)?;
            }
        }
        writer.flush().map_err(|err| CoreError::Structural(err.to_string()))?;
    }
    finish(buffer)
}

/// Parse an items upload with the given column layout.
pub fn parse_items(
    data: &[u8],
    columns: &ItemColumns,
    item_type: ItemType,
    forced_delimiter: Option<u8>,
) -> Result<Vec<ParsedItem>, CoreError> {
    let records = read_records(data, &[columns.number], forced_delimiter)?;
    let mut items = Vec::with_capacity(records.len());
    for (line, record) in records {
        let number: u32 = cell(&record, columns.number, line)?
            .trim()
            .parse()
            .map_err(|_| CoreError::validation(line, "item number is not a number"))?;
        let condition = cell(&record, columns.condition, line)?.trim().to_string();
        if condition.is_empty() {
            return Err(CoreError::validation(line, "condition must not be empty"));
        }
        let content = ItemContent::from_cell(item_type, cell(&record, columns.content, line)?);
        let block = match optional_cell(&record, columns.block) {
            Some(value) => value
                .parse()
                .map_err(|_| CoreError::validation(line, "block is not a number"))?,
            None => 1,
        };
        let audio_description = optional_cell(&record, columns.audio_description)
            .map(str::to_string);

        let mut item_questions = Vec::new();
        for question in &columns.questions {
            let prompt = optional_cell(&record, question.prompt).map(str::to_string);
            let scale_labels = optional_cell(&record, question.scale_labels).map(str::to_string);
            let legend = optional_cell(&record, question.legend).map(str::to_string);
            if prompt.is_some() || scale_labels.is_some() || legend.is_some() {
                item_questions.push(ItemQuestion {
                    number: question.question,
                    prompt,
                    scale_labels,
                    legend,
                });
            }
        }

        let materials = columns
            .materials
            .and_then(|column| record.get(column - 1))
            .map(str::to_string);
        items.push(ParsedItem {
            materials,
            item: Item {
                number,
                condition,
                block,
                content,
                audio_description,
                item_questions,
                feedbacks: Vec::new(),
            },
        });
    }
    Ok(items)
}

/// One row of a lists file: items referenced by `<number><condition>`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedList {
    pub materials: String,
    pub number: usize,
    pub items: Vec<(u32, String)>,
}

pub fn emit_lists_csv(study: &Study) -> Result<String, CoreError> {
    let mut buffer = Vec::new();
    {
        let mut writer = writer(&mut buffer);
        writer
            .write_record(["materials", "list", "items"])
            .map_err(emit_error)?;
        for materials in &study.materials {
            for list in &materials.lists {
                let labels: Vec<String> = list
                    .items
                    .iter()
                    .map(|&index| materials.items[index].label())
                    .collect();
                writer
                    .write_record([
                        materials.title.as_str(),
                        &list.number.to_string(),
                        &labels.join(","),
                    ])
                    .map_err(emit_error)?;
            }
        }
        writer.flush().map_err(|err| CoreError::Structural(err.to_string()))?;
    }
    finish(buffer)
}

pub fn parse_lists(
    data: &[u8],
    forced_delimiter: Option<u8>,
) -> Result<Vec<ParsedList>, CoreError> {
    let records = read_records(data, &[2], forced_delimiter)?;
    let mut lists = Vec::with_capacity(records.len());
    for (line, record) in records {
        let materials = cell(&record, 1, line)?.trim().to_string();
        let number: usize = cell(&record, 2, line)?
            .trim()
            .parse()
            .map_err(|_| CoreError::validation(line, "list number is not a number"))?;
        let mut items = Vec::new();
        for label in cell(&record, 3, line)?.split(',') {
            let label = label.trim();
            if label.is_empty() {
                continue;
            }
            let parsed = crate::item::parse_item_label(label)
                .ok_or_else(|| CoreError::validation(line, format!("bad item label {label:?}")))?;
            items.push(parsed);
        }
        lists.push(ParsedList {
            materials,
            number,
            items,
        });
    }
    Ok(lists)
}

/// One row of a questionnaires file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuestionnaire {
    pub number: u32,
    /// `<materials>-<listnumber>` references.
    pub lists: Vec<(String, usize)>,
    /// `<materials>-<number><condition>` references in slot order.
    pub items: Vec<(String, u32, String)>,
    /// Question order per slot; empty when the study keeps question
    /// order fixed.
    pub question_orders: Vec<Vec<usize>>,
}

pub fn emit_questionnaires_csv(study: &Study) -> Result<String, CoreError> {
    let mut buffer = Vec::new();
    {
        let mut writer = writer(&mut buffer);
        writer
            .write_record(["questionnaire", "lists", "items", "question_order"])
            .map_err(emit_error)?;
        for questionnaire in &study.questionnaires {
            let lists: Vec<String> = questionnaire
                .list_numbers
                .iter()
                .enumerate()
                .map(|(materials_index, list_number)| {
                    format!("{}-{}", study.materials[materials_index].title, list_number)
                })
                .collect();
            let items: Vec<String> = questionnaire
                .slots
                .iter()
                .map(|slot| {
                    format!(
                        "{}-{}{}",
                        study.materials[slot.materials_index].title,
                        slot.item_number,
                        slot.condition
                    )
                })
                .collect();
            let question_order = if questionnaire
                .slots
                .iter()
                .any(|slot| slot.question_order.is_some())
            {
                to_list_string(
                    questionnaire
                        .slots
                        .iter()
                        .map(|slot| {
                            slot.question_order
                                .as_deref()
                                .map(to_int_list)
                                .unwrap_or_default()
                        })
                        .collect::<Vec<_>>(),
                )
            } else {
                String::new()
            };
            writer
                .write_record([
                    questionnaire.number.to_string().as_str(),
                    &lists.join(","),
                    &items.join(","),
                    &question_order,
                ])
                .map_err(emit_error)?;
        }
        writer.flush().map_err(|err| CoreError::Structural(err.to_string()))?;
    }
    finish(buffer)
}

pub fn parse_questionnaires(
    data: &[u8],
    forced_delimiter: Option<u8>,
) -> Result<Vec<ParsedQuestionnaire>, CoreError> {
    let records = read_records(data, &[1], forced_delimiter)?;
    let mut questionnaires = Vec::with_capacity(records.len());
    for (line, record) in records {
        let number: u32 = cell(&record, 1, line)?
            .trim()
            .parse()
            .map_err(|_| CoreError::validation(line, "questionnaire number is not a number"))?;

        let mut lists = Vec::new();
        for reference in cell(&record, 2, line)?.split(',') {
            let reference = reference.trim();
            if reference.is_empty() {
                continue;
            }
            let (materials, list_number) = reference
                .rsplit_once('-')
                .and_then(|(materials, tail)| {
                    Some((materials.to_string(), tail.parse::<usize>().ok()?))
                })
                .ok_or_else(|| {
                    CoreError::validation(line, format!("bad list reference {reference:?}"))
                })?;
            lists.push((materials, list_number));
        }

        let mut items = Vec::new();
        for reference in cell(&record, 3, line)?.split(',') {
            let reference = reference.trim();
            if reference.is_empty() {
                continue;
            }
            let (materials, label) = reference.rsplit_once('-').ok_or_else(|| {
                CoreError::validation(line, format!("bad item reference {reference:?}"))
            })?;
            let (item_number, condition) =
                crate::item::parse_item_label(label).ok_or_else(|| {
                    CoreError::validation(line, format!("bad item label {label:?}"))
                })?;
            items.push((materials.to_string(), item_number, condition));
        }

        let question_orders = match record.get(3).map(str::trim) {
            Some("") | None => Vec::new(),
            Some(value) => split_list_string(value)
                .iter()
                .map(|order| {
                    split_int_list(order).ok_or_else(|| {
                        CoreError::validation(line, "bad question order".to_string())
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
        };

        questionnaires.push(ParsedQuestionnaire {
            number,
            lists,
            items,
            question_orders,
        });
    }
    Ok(questionnaires)
}

/// One row of a blocks file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBlock {
    pub block: i32,
    pub randomization: Randomization,
    pub instructions: Option<String>,
}

pub fn emit_blocks_csv(study: &Study) -> Result<String, CoreError> {
    let mut buffer = Vec::new();
    {
        let mut writer = writer(&mut buffer);
        writer
            .write_record(["block", "randomization", "instructions"])
            .map_err(emit_error)?;
        for block in &study.blocks {
            writer
                .write_record([
                    block.block.to_string().as_str(),
                    block.randomization.as_str(),
                    block.instructions.as_deref().unwrap_or(""),
                ])
                .map_err(emit_error)?;
        }
        writer.flush().map_err(|err| CoreError::Structural(err.to_string()))?;
    }
    finish(buffer)
}

pub fn parse_blocks(
    data: &[u8],
    forced_delimiter: Option<u8>,
) -> Result<Vec<ParsedBlock>, CoreError> {
    let records = read_records(data, &[1], forced_delimiter)?;
    let mut blocks = Vec::with_capacity(records.len());
    for (line, record) in records {
        let block: i32 = cell(&record, 1, line)?
            .trim()
            .parse()
            .map_err(|_| CoreError::validation(line, "block number is not a number"))?;
        let randomization = Randomization::parse(cell(&record, 2, line)?.trim())
            .ok_or_else(|| CoreError::validation(line, "unknown randomization mode"))?;
        let instructions = record
            .get(2)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        blocks.push(ParsedBlock {
            block,
            randomization,
            instructions,
        });
    }
    Ok(blocks)
}

/// Emit the wide-format results table.
///
/// Columns grow with the study: a question-order column only when the
/// study randomizes question order, comment columns only when some
/// question accepts comments, one demographic column per field.
pub fn emit_results_csv(study: &Study, rows: &[LongRow]) -> Result<String, CoreError> {
    let n_questions = study.question_count();
    let with_comments = study.has_question_rating_comments();
    let mut buffer = Vec::new();
    {
        let mut writer = writer(&mut buffer);
        let mut header = vec![
            "materials".to_string(),
            "subject".to_string(),
            "item".to_string(),
            "condition".to_string(),
            "position".to_string(),
        ];
        if study.settings.pseudo_randomize_question_order {
            header.push("question order".to_string());
        }
        if study.has_question_with_random_scale() {
            header.push("random scale".to_string());
        }
        for question in 0..n_questions {
            header.push(format!("rating{}", question + 1));
        }
        if with_comments {
            for question in 0..n_questions {
                header.push(format!("comment{}", question + 1));
            }
        }
        header.push("content".to_string());
        for field in 0..study.demographic_fields.len() {
            header.push(format!("demographic{}", field + 1));
        }
        writer.write_record(&header).map_err(emit_error)?;

        for wide in result_lists_for_questions(study, rows) {
            let materials_title = study
                .materials
                .get(wide.materials_index)
                .map(|materials| materials.title.as_str())
                .unwrap_or("");
            let mut row = vec![
                materials_title.to_string(),
                wide.subject.to_string(),
                wide.item_number.to_string(),
                wide.condition.clone(),
                wide.position.to_string(),
            ];
            if study.settings.pseudo_randomize_question_order {
                row.push(wide.question_order.clone().unwrap_or_default());
            }
            if study.has_question_with_random_scale() {
                row.push(wide.random_scale.clone().unwrap_or_default());
            }
            for &rating in &wide.ratings {
                row.push(rating.to_string());
            }
            if with_comments {
                for comment in &wide.comments {
                    row.push(comment.clone().unwrap_or_default());
                }
            }
            row.push(wide.content.clone());
            for value in &wide.demographics {
                row.push(value.clone());
            }
            writer.write_record(&row).map_err(emit_error)?;
        }
        writer.flush().map_err(|err| CoreError::Structural(err.to_string()))?;
    }
    finish(buffer)
}

/// Emit per-item answer feedbacks.
pub fn emit_item_feedbacks_csv(study: &Study) -> Result<String, CoreError> {
    let mut buffer = Vec::new();
    {
        let mut writer = writer(&mut buffer);
        writer
            .write_record([
                "materials",
                "item_number",
                "item_condition",
                "question",
                "scale_values",
                "feedback",
            ])
            .map_err(emit_error)?;
        for materials in &study.materials {
            for &index in &materials.item_order() {
                let item = &materials.items[index];
                for feedback in &item.feedbacks {
                    writer
                        .write_record([
                            materials.title.as_str(),
                            &item.number.to_string(),
                            &item.condition,
                            &(feedback.question + 1).to_string(),
                            &feedback.scale_values,
                            &feedback.feedback,
                        ])
                        .map_err(emit_error)?;
                }
            }
        }
        writer.flush().map_err(|err| CoreError::Structural(err.to_string()))?;
    }
    finish(buffer)
}

/// One row of an item feedbacks upload, addressed by item identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFeedback {
    pub materials: Option<String>,
    pub item_number: u32,
    pub item_condition: String,
    pub feedback: ItemFeedback,
}

/// Parse item feedbacks. `question_count` bounds the 1-based question
/// column.
pub fn parse_item_feedbacks(
    data: &[u8],
    question_count: usize,
    with_materials_column: bool,
    forced_delimiter: Option<u8>,
) -> Result<Vec<ParsedFeedback>, CoreError> {
    let offset = usize::from(with_materials_column);
    let records = read_records(data, &[offset + 1, offset + 3], forced_delimiter)?;
    let mut feedbacks = Vec::with_capacity(records.len());
    for (line, record) in records {
        let materials = with_materials_column
            .then(|| cell(&record, 1, line).map(|value| value.trim().to_string()))
            .transpose()?;
        let item_number: u32 = cell(&record, offset + 1, line)?
            .trim()
            .parse()
            .map_err(|_| CoreError::validation(line, "item number is not a number"))?;
        let item_condition = cell(&record, offset + 2, line)?.trim().to_string();
        let question: usize = cell(&record, offset + 3, line)?
            .trim()
            .parse()
            .map_err(|_| CoreError::validation(line, "question is not a number"))?;
        if question == 0 || question > question_count {
            return Err(CoreError::validation(
                line,
                format!("question {question} is out of range"),
            ));
        }
        let scale_values = cell(&record, offset + 4, line)?.trim().to_string();
        let feedback = cell(&record, offset + 5, line)?.trim().to_string();
        feedbacks.push(ParsedFeedback {
            materials,
            item_number,
            item_condition,
            feedback: ItemFeedback {
                question: question - 1,
                scale_values,
                feedback,
            },
        });
    }
    Ok(feedbacks)
}

/// Emit the participation proof table for finished trials.
pub fn emit_rating_proofs_csv(proofs: &[(String, String)]) -> Result<String, CoreError> {
    let mut buffer = Vec::new();
    {
        let mut writer = writer(&mut buffer);
        writer
            .write_record(["Subject", "Proof code"])
            .map_err(emit_error)?;
        for (subject, code) in proofs {
            writer
                .write_record([subject.as_str(), code.as_str()])
                .map_err(emit_error)?;
        }
        writer.flush().map_err(|err| CoreError::Structural(err.to_string()))?;
    }
    finish(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::compute_item_lists;
    use crate::materials::Materials;
    use crate::questionnaire::{generate_questionnaires, QuestionnaireBlockSettings};
    use crate::study::{Question, RatingCommentMode, ScaleValue, StudySettings};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn study_fixture() -> Study {
        let mut materials = Materials::new("pairs");
        for number in 1..=4 {
            for condition in ["a", "b"] {
                let mut item = Item::new(
                    number,
                    condition,
                    ItemContent::Text(format!("sentence {number}{condition}")),
                );
                if number == 1 && condition == "a" {
                    item.item_questions.push(ItemQuestion {
                        number: 0,
                        prompt: Some("How natural is this one?".into()),
                        scale_labels: None,
                        legend: None,
                    });
                    item.feedbacks.push(ItemFeedback {
                        question: 0,
                        scale_values: "1,2".into(),
                        feedback: "Many readers disagree.".into(),
                    });
                }
                materials.items.push(item);
            }
        }
        materials.items_validated = true;
        materials.lists = compute_item_lists(&materials).unwrap();

        let mut study = Study {
            settings: StudySettings {
                title: "csv".into(),
                ..StudySettings::default()
            },
            questions: vec![Question {
                number: 0,
                prompt: "How natural?".into(),
                legend: None,
                randomize_scale: false,
                rating_comment: RatingCommentMode::Optional,
                scale_values: (0..5)
                    .map(|n| ScaleValue {
                        number: n,
                        label: format!("{}", n + 1),
                    })
                    .collect(),
            }],
            demographic_fields: Vec::new(),
            materials: vec![materials],
            questionnaires: Vec::new(),
            blocks: vec![QuestionnaireBlockSettings {
                block: 1,
                instructions: Some("Rate each sentence.".into()),
                short_instructions: None,
                randomization: Randomization::None,
            }],
        };
        let mut rng = StdRng::seed_from_u64(17);
        study.questionnaires = generate_questionnaires(&study, "csv", 4, &mut rng).unwrap();
        study
    }

    #[test]
    fn items_round_trip() {
        let study = study_fixture();
        let emitted = emit_items_csv(&study).unwrap();
        let columns = ItemColumns::archive(&study);
        let parsed = parse_items(
            emitted.as_bytes(),
            &columns,
            study.settings.item_type,
            None,
        )
        .unwrap();
        assert_eq!(parsed.len(), 8);
        for parsed_item in &parsed {
            assert_eq!(parsed_item.materials.as_deref(), Some("pairs"));
            let original = study.materials[0]
                .find_item(parsed_item.item.number, &parsed_item.item.condition)
                .map(|index| &study.materials[0].items[index])
                .unwrap();
            assert_eq!(parsed_item.item.content, original.content);
            assert_eq!(parsed_item.item.block, original.block);
            assert_eq!(parsed_item.item.item_questions, original.item_questions);
        }
    }

    #[test]
    fn items_bad_number_reports_line() {
        let data = b"materials;item;condition;content;block\npairs;x;a;text;1\n";
        let study = study_fixture();
        let columns = ItemColumns::archive(&study);
        let err = parse_items(data, &columns, ItemType::PlainText, Some(b';')).unwrap_err();
        match err {
            CoreError::Validation { line, .. } => assert_eq!(line, 2),
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn lists_round_trip() {
        let study = study_fixture();
        let emitted = emit_lists_csv(&study).unwrap();
        let parsed = parse_lists(emitted.as_bytes(), None).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].materials, "pairs");
        assert_eq!(parsed[0].number, 0);
        assert_eq!(
            parsed[0].items,
            study.materials[0].lists[0]
                .items
                .iter()
                .map(|&index| {
                    let item = &study.materials[0].items[index];
                    (item.number, item.condition.clone())
                })
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn questionnaires_round_trip() {
        let study = study_fixture();
        let emitted = emit_questionnaires_csv(&study).unwrap();
        let parsed = parse_questionnaires(emitted.as_bytes(), None).unwrap();
        assert_eq!(parsed.len(), study.questionnaires.len());
        for (parsed, original) in parsed.iter().zip(&study.questionnaires) {
            assert_eq!(parsed.number, original.number);
            assert_eq!(parsed.lists, vec![("pairs".into(), original.list_numbers[0])]);
            let slots: Vec<(String, u32, String)> = original
                .slots
                .iter()
                .map(|slot| ("pairs".into(), slot.item_number, slot.condition.clone()))
                .collect();
            assert_eq!(parsed.items, slots);
            assert!(parsed.question_orders.is_empty());
        }
    }

    #[test]
    fn question_orders_survive_round_trip() {
        let mut study = study_fixture();
        study.settings.pseudo_randomize_question_order = true;
        study.questions.push(Question {
            number: 1,
            prompt: "How funny?".into(),
            legend: None,
            randomize_scale: false,
            rating_comment: RatingCommentMode::None,
            scale_values: (0..5)
                .map(|n| ScaleValue {
                    number: n,
                    label: format!("{}", n + 1),
                })
                .collect(),
        });
        let mut rng = StdRng::seed_from_u64(23);
        study.questionnaires = generate_questionnaires(&study, "csv", 4, &mut rng).unwrap();

        let emitted = emit_questionnaires_csv(&study).unwrap();
        let parsed = parse_questionnaires(emitted.as_bytes(), None).unwrap();
        for (parsed, original) in parsed.iter().zip(&study.questionnaires) {
            let orders: Vec<Vec<usize>> = original
                .slots
                .iter()
                .map(|slot| slot.question_order.clone().unwrap())
                .collect();
            assert_eq!(parsed.question_orders, orders);
        }
    }

    #[test]
    fn blocks_round_trip() {
        let study = study_fixture();
        let emitted = emit_blocks_csv(&study).unwrap();
        let parsed = parse_blocks(emitted.as_bytes(), None).unwrap();
        assert_eq!(
            parsed,
            vec![ParsedBlock {
                block: 1,
                randomization: Randomization::None,
                instructions: Some("Rate each sentence.".into()),
            }]
        );
    }

    #[test]
    fn feedbacks_round_trip() {
        let study = study_fixture();
        let emitted = emit_item_feedbacks_csv(&study).unwrap();
        let parsed = parse_item_feedbacks(emitted.as_bytes(), 1, true, None).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].materials.as_deref(), Some("pairs"));
        assert_eq!(parsed[0].item_number, 1);
        assert_eq!(parsed[0].item_condition, "a");
        assert_eq!(parsed[0].feedback.question, 0);
        assert_eq!(parsed[0].feedback.scale_values, "1,2");
    }

    #[test]
    fn results_header_grows_with_study() {
        let mut study = study_fixture();
        study.demographic_fields.push(crate::study::DemographicField {
            number: 0,
            prompt: "Age".into(),
        });
        let emitted = emit_results_csv(&study, &[]).unwrap();
        let header = emitted.lines().next().unwrap();
        assert_eq!(
            header,
            "materials;subject;item;condition;position;rating1;comment1;content;demographic1"
        );
    }

    #[test]
    fn proofs_table() {
        let emitted =
            emit_rating_proofs_csv(&[("1".into(), "ABCDEF1234GHIJKL".into())]).unwrap();
        assert_eq!(emitted, "Subject;Proof code\n1;ABCDEF1234GHIJKL\n");
    }
}
