//! End-to-end flow against a live database: study setup, item upload,
//! questionnaire generation, participation, and results.

use ratex_core::trial::Destination;
use ratex_db::models::materials::CreateMaterials;
use ratex_db::models::study::CreateQuestion;
use ratex_db::repositories::{
    MaterialsRepo, QuestionRepo, QuestionnaireRepo, RatingRepo, StudyRepo, TrialRepo,
};
use ratex_db::services::{
    MaterialsService, ParticipationService, QuestionnaireService, StudyService, StudySnapshot,
};
use sqlx::PgPool;

async fn seeded_study(pool: &PgPool) -> i64 {
    let study = StudyService::create(pool, "Test Study", "plain-text")
        .await
        .unwrap();
    QuestionRepo::replace_all(
        pool,
        study.id,
        &[CreateQuestion {
            number: 0,
            prompt: "How natural?".into(),
            legend: None,
            randomize_scale: false,
            rating_comment: "optional".into(),
            scale_labels: (1..=5).map(|n| n.to_string()).collect(),
        }],
    )
    .await
    .unwrap();

    let materials = MaterialsRepo::create(
        pool,
        study.id,
        &CreateMaterials {
            title: "pairs".into(),
            list_distribution: "latin-square".into(),
            is_filler: false,
            is_example: false,
            block: -1,
        },
    )
    .await
    .unwrap();

    let mut csv = String::from("item;condition;content\n");
    for number in 1..=4 {
        for condition in ["a", "b"] {
            csv.push_str(&format!("{number};{condition};sentence {number}{condition}\n"));
        }
    }
    MaterialsService::upload_items(pool, study.id, materials.id, csv.as_bytes(), None, None)
        .await
        .unwrap();
    MaterialsService::validate_and_generate_lists(pool, study.id, materials.id)
        .await
        .unwrap();
    QuestionnaireService::generate(pool, study.id).await.unwrap();
    study.id
}

#[sqlx::test(migrations = "./migrations")]
async fn setup_produces_two_questionnaires(pool: PgPool) {
    let study_id = seeded_study(&pool).await;
    let questionnaires = QuestionnaireRepo::list_by_study(&pool, study_id)
        .await
        .unwrap();
    assert_eq!(questionnaires.len(), 2);

    let snapshot = StudySnapshot::load(&pool, study_id).await.unwrap();
    for questionnaire in &snapshot.study.questionnaires {
        assert_eq!(questionnaire.slots.len(), 4);
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn participation_walks_all_slots(pool: PgPool) {
    let study_id = seeded_study(&pool).await;
    StudyService::publish(&pool, study_id).await.unwrap_err();
    // Publishing needs instructions.
    StudyRepo::update(
        &pool,
        study_id,
        &ratex_db::models::study::UpdateStudy {
            instructions: Some("Rate each sentence.".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    StudyService::publish(&pool, study_id).await.unwrap();

    let trial = ParticipationService::start_trial(&pool, study_id, None, false)
        .await
        .unwrap();
    assert_eq!(trial.participant_id.len(), 8);

    for slot in 0..4 {
        let destination = ParticipationService::deliver(&pool, trial.id, slot, true)
            .await
            .unwrap();
        assert_eq!(destination, Destination::Slot(slot));
        let (_, next) =
            ParticipationService::record_rating(&pool, trial.id, slot, 0, 2, None)
                .await
                .unwrap();
        if slot < 3 {
            assert_eq!(next, Destination::Slot(slot + 1));
        } else {
            assert_eq!(next, Destination::Outro);
        }
    }

    let trial = TrialRepo::find_by_id(&pool, trial.id).await.unwrap().unwrap();
    assert_eq!(trial.status, "finished");
    assert!(trial.ended_at.is_some());
}

#[sqlx::test(migrations = "./migrations")]
async fn rating_is_idempotent(pool: PgPool) {
    let study_id = seeded_study(&pool).await;
    StudyRepo::set_published(&pool, study_id, true).await.unwrap();
    let trial = ParticipationService::start_trial(&pool, study_id, Some("p1".into()), false)
        .await
        .unwrap();

    let (first, _) = ParticipationService::record_rating(&pool, trial.id, 0, 0, 2, None)
        .await
        .unwrap();
    let (second, _) = ParticipationService::record_rating(&pool, trial.id, 0, 0, 4, None)
        .await
        .unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.scale_value, 2);
    assert_eq!(RatingRepo::count_by_trial(&pool, trial.id).await.unwrap(), 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn out_of_order_rating_is_refused(pool: PgPool) {
    let study_id = seeded_study(&pool).await;
    StudyRepo::set_published(&pool, study_id, true).await.unwrap();
    let trial = ParticipationService::start_trial(&pool, study_id, Some("p1".into()), false)
        .await
        .unwrap();

    ParticipationService::record_rating(&pool, trial.id, 3, 0, 2, None)
        .await
        .unwrap_err();
    assert_eq!(RatingRepo::count_by_trial(&pool, trial.id).await.unwrap(), 0);

    let (_, next) = ParticipationService::record_rating(&pool, trial.id, 0, 0, 2, None)
        .await
        .unwrap();
    assert_eq!(next, Destination::Slot(1));
    ParticipationService::record_rating(&pool, trial.id, 2, 0, 2, None)
        .await
        .unwrap_err();
}

#[sqlx::test(migrations = "./migrations")]
async fn pregenerate_creates_placeholder_items(pool: PgPool) {
    let study_id = seeded_study(&pool).await;
    let snapshot = StudySnapshot::load(&pool, study_id).await.unwrap();
    let materials_id = snapshot.materials_ids[0];

    let count = MaterialsService::pregenerate(&pool, study_id, materials_id, 3, 2)
        .await
        .unwrap();
    assert_eq!(count, 6);

    let snapshot = StudySnapshot::load(&pool, study_id).await.unwrap();
    let materials = &snapshot.study.materials[0];
    assert_eq!(materials.items.len(), 6);
    assert!(!materials.items_validated);
    assert!(materials
        .items
        .iter()
        .all(|item| item.content.as_cell().is_empty()));
    assert!(snapshot.study.questionnaires.is_empty());
}

#[sqlx::test(migrations = "./migrations")]
async fn regeneration_is_refused_once_frozen(pool: PgPool) {
    let study_id = seeded_study(&pool).await;
    StudyRepo::set_published(&pool, study_id, true).await.unwrap();
    let trial = ParticipationService::start_trial(&pool, study_id, Some("p1".into()), false)
        .await
        .unwrap();
    ParticipationService::record_rating(&pool, trial.id, 0, 0, 1, None)
        .await
        .unwrap();

    StudyRepo::set_published(&pool, study_id, false).await.unwrap();
    assert!(QuestionnaireService::generate(&pool, study_id).await.is_err());

    // Deleting the results unfreezes the study.
    StudyService::delete_results(&pool, study_id).await.unwrap();
    QuestionnaireService::generate(&pool, study_id).await.unwrap();
}

#[sqlx::test(migrations = "./migrations")]
async fn archive_and_restore(pool: PgPool) {
    let study_id = seeded_study(&pool).await;
    let bytes = StudyService::archive(&pool, study_id).await.unwrap();

    let original = StudyRepo::find_by_id(&pool, study_id).await.unwrap().unwrap();
    assert!(original.is_archived);
    assert!(QuestionnaireRepo::list_by_study(&pool, study_id)
        .await
        .unwrap()
        .is_empty());

    let restored = StudyService::restore(&pool, &bytes).await.unwrap();
    assert_ne!(restored.id, study_id);
    assert!(!restored.is_published);
    assert!(!restored.is_archived);

    let snapshot = StudySnapshot::load(&pool, restored.id).await.unwrap();
    assert_eq!(snapshot.study.questions.len(), 1);
    assert_eq!(snapshot.study.materials.len(), 1);
    assert_eq!(snapshot.study.materials[0].items.len(), 8);
    assert_eq!(snapshot.study.questionnaires.len(), 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn results_exclude_test_trials(pool: PgPool) {
    let study_id = seeded_study(&pool).await;
    StudyRepo::set_published(&pool, study_id, true).await.unwrap();

    let test_trial = ParticipationService::start_trial(&pool, study_id, Some("t".into()), true)
        .await
        .unwrap();
    ParticipationService::record_rating(&pool, test_trial.id, 0, 0, 4, None)
        .await
        .unwrap();

    let trial = ParticipationService::start_trial(&pool, study_id, Some("p1".into()), false)
        .await
        .unwrap();
    for slot in 0..4 {
        ParticipationService::record_rating(&pool, trial.id, slot, 0, 2, None)
            .await
            .unwrap();
    }

    let snapshot = StudySnapshot::load(&pool, study_id).await.unwrap();
    let rows = StudyService::results(&pool, &snapshot).await.unwrap();
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|row| row.subject == 1));
}
