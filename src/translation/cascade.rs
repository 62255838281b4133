//! Field-by-field translation over a serialized value.
//!
//! Every descriptor path is resolved against the JSON form of the value into
//! concrete JSON pointers. Each pointer is translated independently, at most
//! `max_concurrent_fields` at a time; a failed field keeps its original text
//! and is listed in the report.

use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::fields::{segments, FieldDescriptor, FieldKind, Translatable};
use super::{is_identity_language, TextTranslator, TranslationError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranslationReport {
    pub target_language: String,
    /// Fields whose text was replaced.
    pub translated: usize,
    /// JSON pointers of fields left in the source language.
    pub failed: Vec<String>,
    /// True when the target language needs no translation.
    pub skipped: bool,
}

impl TranslationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Translated<T> {
    pub value: T,
    pub report: TranslationReport,
}

#[derive(Debug, Clone, PartialEq)]
struct TextSlot {
    pointer: String,
    text: String,
}

/// Translate every prose field of `value` into `target_language`.
///
/// Only a value that cannot round-trip through JSON is an error. Individual
/// field failures are reported, never raised.
pub async fn translate<T: Translatable>(
    value: &T,
    target_language: &str,
    translator: &dyn TextTranslator,
) -> Result<Translated<T>, TranslationError> {
    if is_identity_language(target_language) {
        return Ok(Translated {
            value: value.clone(),
            report: TranslationReport {
                target_language: target_language.to_string(),
                skipped: true,
                ..Default::default()
            },
        });
    }

    let mut json = serde_json::to_value(value).map_err(|e| TranslationError::Shape(e.to_string()))?;
    let report = translate_fields(&mut json, T::SECTIONS, target_language, translator).await;
    let value = serde_json::from_value(json).map_err(|e| TranslationError::Shape(e.to_string()))?;

    Ok(Translated { value, report })
}

/// Translate the described fields of a raw JSON value in place.
pub async fn translate_fields(
    value: &mut Value,
    sections: &[(&str, &[FieldDescriptor])],
    target_language: &str,
    translator: &dyn TextTranslator,
) -> TranslationReport {
    let mut slots = Vec::new();
    for (prefix, descriptors) in sections {
        for descriptor in descriptors.iter() {
            collect(value, &segments(prefix, descriptor.path), descriptor.kind, String::new(), &mut slots);
        }
    }

    tracing::debug!(
        target_language,
        fields = slots.len(),
        "Translating fields"
    );

    let limit = translator.max_concurrent_fields().max(1);
    let results: Vec<_> = stream::iter(slots.into_iter().map(|slot| async move {
        let result = translator.translate_text(&slot.text, target_language).await;
        (slot, result)
    }))
    .buffer_unordered(limit)
    .collect()
    .await;

    let mut report = TranslationReport {
        target_language: target_language.to_string(),
        ..Default::default()
    };

    for (slot, result) in results {
        match result {
            Ok(translated) => match value.pointer_mut(&slot.pointer) {
                Some(Value::String(text)) => {
                    *text = translated;
                    report.translated += 1;
                }
                _ => report.failed.push(slot.pointer),
            },
            Err(e) => {
                tracing::warn!(
                    field = %slot.pointer,
                    target_language,
                    error = %e,
                    "Field translation failed, keeping original text"
                );
                report.failed.push(slot.pointer);
            }
        }
    }

    report.failed.sort();
    if !report.failed.is_empty() {
        tracing::warn!(
            target_language,
            translated = report.translated,
            failed = report.failed.len(),
            "Translation incomplete"
        );
    }

    report
}

fn collect(
    value: &Value,
    segments: &[(&str, bool)],
    kind: FieldKind,
    pointer: String,
    out: &mut Vec<TextSlot>,
) {
    let Some(((key, iterate), rest)) = segments.split_first() else {
        collect_leaf(value, kind, pointer, out);
        return;
    };

    let Some(child) = value.get(*key) else { return };
    let pointer = format!("{pointer}/{}", escape(key));

    if *iterate {
        if let Value::Array(items) = child {
            for (i, item) in items.iter().enumerate() {
                collect(item, rest, kind, format!("{pointer}/{i}"), out);
            }
        }
    } else {
        collect(child, rest, kind, pointer, out);
    }
}

fn collect_leaf(value: &Value, kind: FieldKind, pointer: String, out: &mut Vec<TextSlot>) {
    match (kind, value) {
        (FieldKind::ScalarText, Value::String(text)) => push_text(text, pointer, out),
        (FieldKind::TextArray, Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                if let Value::String(text) = item {
                    push_text(text, format!("{pointer}/{i}"), out);
                }
            }
        }
        _ => {}
    }
}

fn push_text(text: &str, pointer: String, out: &mut Vec<TextSlot>) {
    if !text.trim().is_empty() {
        out.push(TextSlot {
            pointer,
            text: text.to_string(),
        });
    }
}

/// RFC 6901 token escaping.
fn escape(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}
