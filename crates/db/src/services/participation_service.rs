//! The participation flow: trial creation, slot delivery, rating
//! submission, and participation proofs.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use ratex_core::rating::validate_rating;
use ratex_core::trial::{
    after_submit, effective_status, next_destination, participation_code, random_participant_id,
    Destination, TrialStatus,
};
use ratex_core::types::DbId;
use ratex_core::CoreError;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::error::DbError;
use crate::models::trial::{CreateRating, CreateTrial, RatingRow, TrialRow};
use crate::repositories::{QuestionnaireRepo, RatingRepo, TrialRepo};
use crate::services::snapshot::StudySnapshot;

/// Orchestrates trials and ratings.
pub struct ParticipationService;

impl ParticipationService {
    /// Pick the questionnaire for the next participant: the least-used
    /// one, lowest number first, so questionnaires fill evenly.
    pub async fn next_questionnaire_id(pool: &PgPool, study_id: DbId) -> Result<DbId, DbError> {
        let questionnaires = QuestionnaireRepo::list_by_study(pool, study_id).await?;
        let mut best: Option<(i64, DbId)> = None;
        for questionnaire in &questionnaires {
            let count = TrialRepo::count_by_questionnaire(pool, questionnaire.id).await?;
            if best.map(|(best_count, _)| count < best_count).unwrap_or(true) {
                best = Some((count, questionnaire.id));
            }
        }
        best.map(|(_, id)| id)
            .ok_or(DbError::NotFound("questionnaire"))
    }

    /// Start a trial for a participant.
    ///
    /// A participant id is required when the study demands one and
    /// generated otherwise. Enforces the trial limit for real trials.
    pub async fn start_trial(
        pool: &PgPool,
        study_id: DbId,
        participant_id: Option<String>,
        is_test: bool,
    ) -> Result<TrialRow, DbError> {
        let snapshot = StudySnapshot::load(pool, study_id).await?;
        if !is_test && !snapshot.study.settings.is_published {
            return Err(CoreError::NotAllowed("the study is not published".into()).into());
        }
        let participant_id = match participant_id {
            Some(id) if !id.trim().is_empty() => id,
            _ if snapshot.study.settings.require_participant_id => {
                return Err(CoreError::NotAllowed("a participant ID is required".into()).into());
            }
            _ => {
                let mut rng = StdRng::from_os_rng();
                random_participant_id(&mut rng)
            }
        };
        if !is_test {
            if let Some(limit) = snapshot.study.settings.trial_limit {
                let count = TrialRepo::count_non_test_by_study(pool, study_id).await?;
                if count >= limit as i64 {
                    return Err(
                        CoreError::NotAllowed("the study is no longer accepting participants".into())
                            .into(),
                    );
                }
            }
        }

        let questionnaire_id = Self::next_questionnaire_id(pool, study_id).await?;
        let trial = TrialRepo::create(
            pool,
            &CreateTrial {
                questionnaire_id,
                participant_id,
                is_test,
            },
        )
        .await?;
        info!(trial = trial.id, questionnaire = questionnaire_id, "trial started");
        Ok(trial)
    }

    /// The status of a trial with abandonment derived from the last
    /// activity time.
    pub async fn trial_status(pool: &PgPool, trial: &TrialRow) -> Result<TrialStatus, DbError> {
        let stored = TrialStatus::parse(&trial.status).unwrap_or(TrialStatus::Created);
        let last_rating = RatingRepo::last_rating_time(pool, trial.id).await?;
        Ok(effective_status(stored, trial.created_at, last_rating, Utc::now()))
    }

    /// Decide what to serve for slot `requested` of a trial.
    pub async fn deliver(
        pool: &PgPool,
        trial_id: DbId,
        requested: usize,
        instructions_seen: bool,
    ) -> Result<Destination, DbError> {
        let trial = TrialRepo::find_by_id(pool, trial_id)
            .await?
            .ok_or(DbError::NotFound("trial"))?;
        let questionnaire = QuestionnaireRepo::find_by_id(pool, trial.questionnaire_id)
            .await?
            .ok_or(DbError::NotFound("questionnaire"))?;
        let snapshot = StudySnapshot::load(pool, questionnaire.study_id).await?;
        let questionnaire_index = snapshot
            .questionnaire_index(trial.questionnaire_id)
            .ok_or(DbError::NotFound("questionnaire"))?;

        let status = Self::trial_status(pool, &trial).await?;
        let completed = RatingRepo::count_first_question(pool, trial_id).await? as usize;
        let destination = next_destination(
            &snapshot.study,
            &snapshot.study.questionnaires[questionnaire_index],
            status,
            completed,
            requested,
            instructions_seen,
        );
        debug!(trial = trial_id, requested, ?destination, "slot delivery");
        Ok(destination)
    }

    /// Record one rating.
    ///
    /// Validates against the question, then writes idempotently: a
    /// repeated submission returns the stored row. Moves the trial
    /// `created → started` on the first rating and finishes it when
    /// every slot has every question rated.
    pub async fn record_rating(
        pool: &PgPool,
        trial_id: DbId,
        slot_number: usize,
        question: usize,
        scale_value: usize,
        comment: Option<String>,
    ) -> Result<(RatingRow, Destination), DbError> {
        let trial = TrialRepo::find_by_id(pool, trial_id)
            .await?
            .ok_or(DbError::NotFound("trial"))?;
        let questionnaire = QuestionnaireRepo::find_by_id(pool, trial.questionnaire_id)
            .await?
            .ok_or(DbError::NotFound("questionnaire"))?;
        let snapshot = StudySnapshot::load(pool, questionnaire.study_id).await?;
        let questionnaire_index = snapshot
            .questionnaire_index(trial.questionnaire_id)
            .ok_or(DbError::NotFound("questionnaire"))?;

        let status = Self::trial_status(pool, &trial).await?;
        if matches!(status, TrialStatus::Finished | TrialStatus::Abandoned) {
            return Err(CoreError::NotAllowed("the trial has ended".into()).into());
        }
        // Slots are rated strictly in order; a re-submission of an
        // already rated slot falls through to the idempotent write.
        let completed = RatingRepo::count_first_question(pool, trial_id).await? as usize;
        if slot_number > completed {
            return Err(
                CoreError::NotAllowed("ratings must be submitted in order".into()).into(),
            );
        }
        let question_row = snapshot
            .study
            .question(question)
            .ok_or(DbError::NotFound("question"))?;
        validate_rating(question_row, scale_value, comment.as_deref())?;
        let slot_id = snapshot
            .slot_id(questionnaire_index, slot_number)
            .ok_or(DbError::NotFound("slot"))?;

        let row = RatingRepo::record(
            pool,
            &CreateRating {
                trial_id,
                slot_id,
                question: question as i32,
                scale_value: scale_value as i32,
                comment,
            },
        )
        .await?;

        if status == TrialStatus::Created {
            TrialRepo::set_status(pool, trial_id, TrialStatus::Started.as_str()).await?;
        }
        let core_questionnaire = &snapshot.study.questionnaires[questionnaire_index];
        let expected = core_questionnaire.slots.len() * snapshot.study.question_count().max(1);
        let total = RatingRepo::count_by_trial(pool, trial_id).await? as usize;
        if total >= expected {
            TrialRepo::finish(pool, trial_id).await?;
            info!(trial = trial_id, "trial finished");
        }

        let completed = RatingRepo::count_first_question(pool, trial_id).await? as usize;
        Ok((row, after_submit(core_questionnaire, completed)))
    }

    /// The participation proof for a finished trial, when the study
    /// issues one.
    pub async fn proof(pool: &PgPool, trial_id: DbId) -> Result<Option<String>, DbError> {
        let trial = TrialRepo::find_by_id(pool, trial_id)
            .await?
            .ok_or(DbError::NotFound("trial"))?;
        let questionnaire = QuestionnaireRepo::find_by_id(pool, trial.questionnaire_id)
            .await?
            .ok_or(DbError::NotFound("questionnaire"))?;
        let snapshot = StudySnapshot::load(pool, questionnaire.study_id).await?;
        if !snapshot.study.settings.generate_participation_code {
            return Ok(None);
        }
        if TrialStatus::parse(&trial.status) != Some(TrialStatus::Finished) {
            return Ok(None);
        }
        Ok(Some(participation_code(trial.id, &snapshot.row.secret)))
    }
}
