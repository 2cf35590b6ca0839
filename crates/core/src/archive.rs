//! Study archive bundles.
//!
//! A study serializes to a ZIP of six CSV members in numeric-prefix
//! order; restore reads them back in the same order. Results are
//! informational only and never re-imported. Restored studies always
//! come back unpublished and unarchived.

use std::io::{Cursor, Read, Write};

use tracing::{debug, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::csvio::{
    emit_blocks_csv, emit_items_csv, emit_lists_csv, emit_questionnaires_csv, emit_results_csv,
    parse_blocks, parse_items, parse_lists, parse_questionnaires, ItemColumns,
};
use crate::dialect::DEFAULT_DELIMITER;
use crate::error::CoreError;
use crate::item::ItemType;
use crate::listing::{split_list_string, to_list_string};
use crate::materials::{ItemList, Materials};
use crate::questionnaire::{Questionnaire, QuestionnaireBlockSettings, Slot};
use crate::results::LongRow;
use crate::study::{Question, RatingCommentMode, ScaleValue, Study};

const RESULTS_MEMBER: &str = "01_results.csv";
const SETTINGS_MEMBER: &str = "02_settings.csv";
const ITEMS_MEMBER: &str = "03_items.csv";
const LISTS_MEMBER: &str = "04_lists.csv";
const QUESTIONNAIRES_MEMBER: &str = "05_questionnaires.csv";
const BLOCKS_MEMBER: &str = "06_blocks.csv";

fn zip_error(err: zip::result::ZipError) -> CoreError {
    CoreError::Structural(err.to_string())
}

fn io_error(err: std::io::Error) -> CoreError {
    CoreError::Structural(err.to_string())
}

/// Serialize a study and its results into an archive bundle.
pub fn archive_study(study: &Study, results: &[LongRow]) -> Result<Vec<u8>, CoreError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let members = [
        (RESULTS_MEMBER, emit_results_csv(study, results)?),
        (SETTINGS_MEMBER, emit_settings_csv(study)?),
        (ITEMS_MEMBER, emit_items_csv(study)?),
        (LISTS_MEMBER, emit_lists_csv(study)?),
        (QUESTIONNAIRES_MEMBER, emit_questionnaires_csv(study)?),
        (BLOCKS_MEMBER, emit_blocks_csv(study)?),
    ];
    for (name, content) in members {
        writer.start_file(name, options).map_err(zip_error)?;
        writer.write_all(content.as_bytes()).map_err(io_error)?;
    }
    let cursor = writer.finish().map_err(zip_error)?;
    debug!(study = %study.settings.title, bytes = cursor.get_ref().len(), "study archived");
    Ok(cursor.into_inner())
}

fn member_bytes(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Option<Vec<u8>> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(_) => {
            warn!(member = name, "archive member missing, skipping");
            return None;
        }
    };
    let mut bytes = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut bytes).ok()?;
    Some(bytes)
}

/// Rebuild a study from an archive bundle.
///
/// Missing members are tolerated; unknown settings keys are ignored.
/// The returned study is always unpublished and unarchived; per-slot
/// scale orders are not part of the bundle and come back empty.
pub fn restore_study(bytes: &[u8]) -> Result<Study, CoreError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(zip_error)?;
    let mut study = Study::default();

    if let Some(data) = member_bytes(&mut archive, SETTINGS_MEMBER) {
        apply_settings(&mut study, &data)?;
    }
    if let Some(data) = member_bytes(&mut archive, ITEMS_MEMBER) {
        restore_items(&mut study, &data)?;
    }
    if let Some(data) = member_bytes(&mut archive, LISTS_MEMBER) {
        restore_lists(&mut study, &data)?;
    }
    if let Some(data) = member_bytes(&mut archive, QUESTIONNAIRES_MEMBER) {
        restore_questionnaires(&mut study, &data)?;
    }
    if let Some(data) = member_bytes(&mut archive, BLOCKS_MEMBER) {
        restore_blocks(&mut study, &data)?;
    }

    study.settings.is_published = false;
    study.settings.is_archived = false;
    Ok(study)
}

fn emit_settings_csv(study: &Study) -> Result<String, CoreError> {
    let settings = &study.settings;
    let question_prompts: Vec<&str> = study
        .questions
        .iter()
        .map(|question| question.prompt.as_str())
        .collect();
    let question_scales: Vec<String> = study
        .questions
        .iter()
        .map(|question| to_list_string(question.scale_labels()))
        .collect();
    let question_legends: Vec<&str> = study
        .questions
        .iter()
        .map(|question| question.legend.as_deref().unwrap_or(""))
        .collect();
    let materials_titles: Vec<&str> = study
        .materials
        .iter()
        .map(|materials| materials.title.as_str())
        .collect();
    let filler_titles: Vec<&str> = study
        .materials
        .iter()
        .filter(|materials| materials.is_filler)
        .map(|materials| materials.title.as_str())
        .collect();

    let rows: Vec<(&str, String)> = vec![
        ("title", settings.title.clone()),
        ("item_type", settings.item_type.as_str().to_string()),
        ("use_blocks", settings.use_blocks.to_string()),
        (
            "pseudo_randomize_question_order",
            settings.pseudo_randomize_question_order.to_string(),
        ),
        ("password", settings.password.clone().unwrap_or_default()),
        (
            "require_participant_id",
            settings.require_participant_id.to_string(),
        ),
        (
            "generate_participation_code",
            settings.generate_participation_code.to_string(),
        ),
        (
            "end_date",
            settings
                .end_date
                .map(|date| date.to_string())
                .unwrap_or_default(),
        ),
        (
            "trial_limit",
            settings
                .trial_limit
                .map(|limit| limit.to_string())
                .unwrap_or_default(),
        ),
        ("questions", to_list_string(question_prompts)),
        ("question_scales", to_list_string(question_scales)),
        ("question_legends", to_list_string(question_legends)),
        (
            "instructions",
            settings.instructions.clone().unwrap_or_default(),
        ),
        ("outro", settings.outro.clone().unwrap_or_default()),
        ("continue_label", settings.continue_label.clone()),
        ("materials", to_list_string(materials_titles)),
        ("filler", to_list_string(filler_titles)),
    ];

    let mut buffer = Vec::new();
    {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(DEFAULT_DELIMITER)
            .from_writer(&mut buffer);
        for (key, value) in rows {
            writer
                .write_record([key, value.as_str()])
                .map_err(|err| CoreError::Structural(err.to_string()))?;
        }
        writer
            .flush()
            .map_err(|err| CoreError::Structural(err.to_string()))?;
    }
    String::from_utf8(buffer).map_err(|err| CoreError::Structural(err.to_string()))
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim(), "true" | "True" | "1")
}

fn apply_settings(study: &mut Study, data: &[u8]) -> Result<(), CoreError> {
    let text = crate::dialect::decode_upload(data);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(DEFAULT_DELIMITER)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut prompts: Vec<String> = Vec::new();
    let mut scales: Vec<String> = Vec::new();
    let mut legends: Vec<String> = Vec::new();
    let mut materials_titles: Vec<String> = Vec::new();
    let mut filler_titles: Vec<String> = Vec::new();

    for (index, result) in reader.records().enumerate() {
        let record = result.map_err(|_| CoreError::unexpected_entry(index + 1))?;
        let Some(key) = record.get(0) else { continue };
        let value = record.get(1).unwrap_or("").to_string();
        let settings = &mut study.settings;
        match key {
            "title" => settings.title = value,
            "item_type" => {
                settings.item_type = ItemType::parse(value.trim()).unwrap_or(ItemType::PlainText)
            }
            "use_blocks" => settings.use_blocks = parse_bool(&value),
            "pseudo_randomize_question_order" => {
                settings.pseudo_randomize_question_order = parse_bool(&value)
            }
            "password" => settings.password = (!value.is_empty()).then_some(value),
            "require_participant_id" => settings.require_participant_id = parse_bool(&value),
            "generate_participation_code" => {
                settings.generate_participation_code = parse_bool(&value)
            }
            "end_date" => settings.end_date = value.trim().parse().ok(),
            "trial_limit" => settings.trial_limit = value.trim().parse().ok(),
            "questions" => prompts = split_list_string(&value),
            "question_scales" => scales = split_list_string(&value),
            "question_legends" => legends = split_list_string(&value),
            "instructions" => settings.instructions = (!value.is_empty()).then_some(value),
            "outro" => settings.outro = (!value.is_empty()).then_some(value),
            "continue_label" => settings.continue_label = value,
            "materials" => materials_titles = split_list_string(&value),
            "filler" => filler_titles = split_list_string(&value),
            _ => {}
        }
    }

    study.questions = prompts
        .into_iter()
        .enumerate()
        .map(|(number, prompt)| Question {
            number,
            prompt,
            legend: legends
                .get(number)
                .filter(|legend| !legend.is_empty())
                .cloned(),
            randomize_scale: false,
            rating_comment: RatingCommentMode::None,
            scale_values: scales
                .get(number)
                .map(|labels| {
                    split_list_string(labels)
                        .into_iter()
                        .enumerate()
                        .map(|(number, label)| ScaleValue { number, label })
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect();

    study.materials = materials_titles
        .into_iter()
        .map(|title| {
            let mut materials = Materials::new(title);
            materials.is_filler = filler_titles.contains(&materials.title);
            materials
        })
        .collect();
    Ok(())
}

fn materials_position(study: &Study, title: &str, line: usize) -> Result<usize, CoreError> {
    study
        .materials
        .iter()
        .position(|materials| materials.title == title)
        .ok_or_else(|| CoreError::validation(line, format!("unknown materials {title:?}")))
}

fn restore_items(study: &mut Study, data: &[u8]) -> Result<(), CoreError> {
    let columns = ItemColumns::archive(study);
    let parsed = parse_items(data, &columns, study.settings.item_type, Some(DEFAULT_DELIMITER))?;
    for parsed_item in parsed {
        let title = parsed_item.materials.unwrap_or_default();
        let position = materials_position(study, &title, 0)?;
        study.materials[position].items.push(parsed_item.item);
    }
    Ok(())
}

fn restore_lists(study: &mut Study, data: &[u8]) -> Result<(), CoreError> {
    for parsed in parse_lists(data, Some(DEFAULT_DELIMITER))? {
        let position = materials_position(study, &parsed.materials, 0)?;
        let materials = &mut study.materials[position];
        let mut items = Vec::with_capacity(parsed.items.len());
        for (number, condition) in parsed.items {
            let index = materials.find_item(number, &condition).ok_or_else(|| {
                CoreError::Structural(format!(
                    "list {} of {:?} references missing item {}{}",
                    parsed.number, materials.title, number, condition
                ))
            })?;
            items.push(index);
        }
        materials.lists.push(ItemList {
            number: parsed.number,
            items,
        });
    }
    for materials in &mut study.materials {
        materials.items_validated = !materials.items.is_empty();
    }
    Ok(())
}

fn restore_questionnaires(study: &mut Study, data: &[u8]) -> Result<(), CoreError> {
    for parsed in parse_questionnaires(data, Some(DEFAULT_DELIMITER))? {
        let mut list_numbers = vec![0usize; study.materials.len()];
        for (title, list_number) in parsed.lists {
            let position = materials_position(study, &title, 0)?;
            list_numbers[position] = list_number;
        }
        let mut slots = Vec::with_capacity(parsed.items.len());
        for (number, (title, item_number, condition)) in parsed.items.into_iter().enumerate() {
            let materials_index = materials_position(study, &title, 0)?;
            slots.push(Slot {
                number,
                materials_index,
                item_number,
                condition,
                question_order: parsed.question_orders.get(number).cloned().filter(|order| {
                    !order.is_empty()
                }),
                question_properties: Vec::new(),
            });
        }
        study.questionnaires.push(Questionnaire {
            number: parsed.number,
            slug: String::new(),
            list_numbers,
            slots,
        });
    }
    Ok(())
}

fn restore_blocks(study: &mut Study, data: &[u8]) -> Result<(), CoreError> {
    for parsed in parse_blocks(data, Some(DEFAULT_DELIMITER))? {
        study.blocks.push(QuestionnaireBlockSettings {
            block: parsed.block,
            instructions: parsed.instructions,
            short_instructions: None,
            randomization: parsed.randomization,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::compute_item_lists;
    use crate::item::{Item, ItemContent};
    use crate::questionnaire::generate_questionnaires;
    use crate::randomize::Randomization;
    use crate::study::StudySettings;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn study_fixture() -> Study {
        let mut target = Materials::new("targets");
        for number in 1..=4 {
            for condition in ["a", "b"] {
                target.items.push(Item::new(
                    number,
                    condition,
                    ItemContent::Text(format!("target {number}{condition}")),
                ));
            }
        }
        target.items_validated = true;
        target.lists = compute_item_lists(&target).unwrap();

        let mut filler = Materials::new("fillers");
        filler.is_filler = true;
        for number in 1..=4 {
            filler.items.push(Item::new(
                number,
                "f",
                ItemContent::Text(format!("filler {number}")),
            ));
        }
        filler.items_validated = true;
        filler.lists = compute_item_lists(&filler).unwrap();

        let mut study = Study {
            settings: StudySettings {
                title: "archive me".into(),
                is_published: true,
                instructions: Some("Please rate.".into()),
                outro: Some("Thanks!".into()),
                ..StudySettings::default()
            },
            questions: vec![Question {
                number: 0,
                prompt: "How natural?".into(),
                legend: Some("1 = awful".into()),
                randomize_scale: false,
                rating_comment: RatingCommentMode::None,
                scale_values: (0..5)
                    .map(|n| ScaleValue {
                        number: n,
                        label: format!("{}", n + 1),
                    })
                    .collect(),
            }],
            demographic_fields: Vec::new(),
            materials: vec![target, filler],
            questionnaires: Vec::new(),
            blocks: vec![QuestionnaireBlockSettings {
                block: 1,
                instructions: Some("Block one.".into()),
                short_instructions: None,
                randomization: Randomization::True,
            }],
        };
        let mut rng = StdRng::seed_from_u64(31);
        study.questionnaires = generate_questionnaires(&study, "archive-me", 4, &mut rng).unwrap();
        study
    }

    #[test]
    fn bundle_has_six_members_in_order() {
        let study = study_fixture();
        let bytes = archive_study(&study, &[]).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "01_results.csv",
                "02_settings.csv",
                "03_items.csv",
                "04_lists.csv",
                "05_questionnaires.csv",
                "06_blocks.csv",
            ]
        );
    }

    #[test]
    fn round_trip_reproduces_study() {
        let study = study_fixture();
        let bytes = archive_study(&study, &[]).unwrap();
        let restored = restore_study(&bytes).unwrap();

        // Published state never survives a restore.
        assert!(!restored.settings.is_published);
        assert!(!restored.settings.is_archived);
        assert_eq!(restored.settings.title, study.settings.title);
        assert_eq!(restored.settings.instructions, study.settings.instructions);
        assert_eq!(restored.settings.outro, study.settings.outro);

        assert_eq!(restored.questions.len(), 1);
        assert_eq!(restored.questions[0].prompt, study.questions[0].prompt);
        assert_eq!(restored.questions[0].legend, study.questions[0].legend);
        assert_eq!(
            restored.questions[0].scale_values,
            study.questions[0].scale_values
        );

        assert_eq!(restored.materials.len(), 2);
        for (restored_materials, original) in restored.materials.iter().zip(&study.materials) {
            assert_eq!(restored_materials.title, original.title);
            assert_eq!(restored_materials.is_filler, original.is_filler);
            assert_eq!(restored_materials.items.len(), original.items.len());
            assert_eq!(restored_materials.lists.len(), original.lists.len());
            for (restored_list, original_list) in
                restored_materials.lists.iter().zip(&original.lists)
            {
                let restored_labels: Vec<String> = restored_list
                    .items
                    .iter()
                    .map(|&index| restored_materials.items[index].label())
                    .collect();
                let original_labels: Vec<String> = original_list
                    .items
                    .iter()
                    .map(|&index| original.items[index].label())
                    .collect();
                assert_eq!(restored_labels, original_labels);
            }
        }

        assert_eq!(restored.questionnaires.len(), study.questionnaires.len());
        for (restored_q, original_q) in restored.questionnaires.iter().zip(&study.questionnaires) {
            assert_eq!(restored_q.number, original_q.number);
            assert_eq!(restored_q.list_numbers, original_q.list_numbers);
            let restored_slots: Vec<(usize, u32, String)> = restored_q
                .slots
                .iter()
                .map(|slot| (slot.materials_index, slot.item_number, slot.condition.clone()))
                .collect();
            let original_slots: Vec<(usize, u32, String)> = original_q
                .slots
                .iter()
                .map(|slot| (slot.materials_index, slot.item_number, slot.condition.clone()))
                .collect();
            assert_eq!(restored_slots, original_slots);
        }

        assert_eq!(restored.blocks.len(), 1);
        assert_eq!(restored.blocks[0].block, 1);
        assert_eq!(restored.blocks[0].randomization, Randomization::True);
        assert_eq!(
            restored.blocks[0].instructions.as_deref(),
            Some("Block one.")
        );
    }

    #[test]
    fn missing_members_are_tolerated() {
        let study = study_fixture();
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        writer.start_file(SETTINGS_MEMBER, options).unwrap();
        writer
            .write_all(emit_settings_csv(&study).unwrap().as_bytes())
            .unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let restored = restore_study(&bytes).unwrap();
        assert_eq!(restored.settings.title, "archive me");
        assert!(restored.questionnaires.is_empty());
        assert!(restored.blocks.is_empty());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(restore_study(b"not a zip").is_err());
    }
}
