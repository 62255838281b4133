pub mod cascade;
pub mod fields;
pub mod model_translator;

pub use cascade::{translate, translate_fields, TranslationReport, Translated};
pub use fields::{FieldDescriptor, FieldKind, Translatable};
pub use model_translator::{MockTranslator, ModelTranslator};

use async_trait::async_trait;
use thiserror::Error;

use crate::pipeline::provider::ProviderError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranslationError {
    #[error("Translation provider failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Translator returned empty text")]
    EmptyResult,

    #[error("Translator refused the text: {0}")]
    Rejected(String),

    #[error("Value cannot be translated structurally: {0}")]
    Shape(String),
}

/// Field translations in flight at once when the translator sets no limit.
pub const DEFAULT_MAX_CONCURRENT_FIELDS: usize = 4;

/// Translates one piece of prose.
#[async_trait]
pub trait TextTranslator: Send + Sync {
    async fn translate_text(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<String, TranslationError>;

    /// Upper bound on concurrent `translate_text` calls for one value.
    fn max_concurrent_fields(&self) -> usize {
        DEFAULT_MAX_CONCURRENT_FIELDS
    }
}

/// Languages the pipeline already produces. Translating into them is a no-op.
pub fn is_identity_language(language: &str) -> bool {
    let tag = language.trim().to_ascii_lowercase();
    tag.is_empty() || tag == "en" || tag.starts_with("en-") || tag.starts_with("en_") || tag == "english"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_variants_are_identity() {
        for tag in ["", " ", "en", "EN", "en-US", "en_GB", "English"] {
            assert!(is_identity_language(tag), "{tag:?}");
        }
        for tag in ["hi", "fr", "es-MX", "eng-x"] {
            assert!(!is_identity_language(tag), "{tag:?}");
        }
    }
}
