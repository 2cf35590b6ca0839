//! Service layer: multi-table orchestration on top of the repositories.

pub mod materials_service;
pub mod participation_service;
pub mod questionnaire_service;
pub mod snapshot;
pub mod study_service;

pub use materials_service::MaterialsService;
pub use participation_service::ParticipationService;
pub use questionnaire_service::QuestionnaireService;
pub use snapshot::StudySnapshot;
pub use study_service::StudyService;
