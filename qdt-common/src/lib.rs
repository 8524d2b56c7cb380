//! # QDT Common Library
//!
//! Shared code for the quiz dataset tools including:
//! - Language table and text localization model
//! - Common error type
//! - Configuration loading and directory resolution

pub mod config;
pub mod error;
pub mod language;

pub use error::{Error, Result};
pub use language::{Language, TextLocalization, TextLocalizations};
