//! qdt-prebuild library interface
//!
//! Staged, resumable pipeline turning a canonical (English) quiz dataset into
//! a multi-language prebuild store:
//! init (parse + compose) → override → translate → comment → doctor.
//! Each stage loads the store, transforms the state in memory and persists
//! the difference, so any stage can be re-run on its own.

pub mod builder;
pub mod db;
pub mod doctor;
pub mod llm;
pub mod overrides;
pub mod parser;
pub mod stable_text;
pub mod stage;
pub mod stages;
pub mod translation;
pub mod types;

pub use builder::{Pipeline, PipelineStep, PrebuildBuilder};
pub use db::{BootstrapMode, PrebuildStore, StoreOptions};
pub use types::{
    PrebuildAnswer, PrebuildQuestion, PrebuildTest, PrebuildText, PrebuildTextWarning, StageState,
};
