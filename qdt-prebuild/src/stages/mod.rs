//! Pipeline stages

pub mod apply_overrides;
pub mod compose;
pub mod doctor;
pub mod dump_overrides;
pub mod question_comment;
pub mod translate;

pub use apply_overrides::OverrideStage;
pub use compose::{ComposeMode, ComposeStage};
pub use doctor::DoctorStage;
pub use dump_overrides::DumpOverridesStage;
pub use question_comment::{QuestionCommentService, QuestionCommentStage};
pub use translate::TranslateStage;
