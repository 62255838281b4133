//! Per-run diagnostic dump.
//!
//! Disabled unless `CLINSIGHT_DUMP_DIR` is set. When enabled, each `analyze`
//! run writes its artifacts under `{dump_dir}/{document_id}/`:
//!
//! ```text
//! 00-source-info.json
//! 01-normalized.{png,jpg,...}
//! 02-classify-response.txt
//! 03-extract-prompt.txt
//! 03-extract-response.txt
//! 04-explain-prompt.txt
//! 04-explain-response.txt
//! 05-outcome.json
//! ```
//!
//! Every writer logs and swallows its own errors; a dump never fails a run.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::config;

/// Dump handle for one run. `None` inside means dumping is off.
#[derive(Debug, Clone, Default)]
pub struct DumpDir(Option<PathBuf>);

impl DumpDir {
    /// Resolve from the environment and create the run directory.
    pub fn for_run(document_id: &Uuid) -> Self {
        match config::dump_base_dir() {
            Some(base) => Self::under(&base, document_id),
            None => Self(None),
        }
    }

    /// Create the run directory under an explicit base.
    pub fn under(base: &Path, document_id: &Uuid) -> Self {
        let dir = base.join(document_id.to_string());
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!(
                path = %dir.display(),
                error = %e,
                "Diagnostic dump: failed to create directory"
            );
            return Self(None);
        }
        Self(Some(dir))
    }

    pub fn disabled() -> Self {
        Self(None)
    }

    pub fn path(&self) -> Option<&Path> {
        self.0.as_deref()
    }

    pub fn binary(&self, filename: &str, data: &[u8]) {
        if let Some(dir) = &self.0 {
            write_file(dir, filename, data, "binary");
        }
    }

    pub fn text(&self, filename: &str, text: &str) {
        if let Some(dir) = &self.0 {
            write_file(dir, filename, text.as_bytes(), "text");
        }
    }

    pub fn json<T: serde::Serialize>(&self, filename: &str, value: &T) {
        let Some(dir) = &self.0 else { return };
        match serde_json::to_string_pretty(value) {
            Ok(json) => write_file(dir, filename, json.as_bytes(), "JSON"),
            Err(e) => tracing::warn!(
                file = filename,
                error = %e,
                "Diagnostic dump: failed to serialize JSON"
            ),
        }
    }
}

fn write_file(dir: &Path, filename: &str, data: &[u8], kind: &str) {
    let path = dir.join(filename);
    match std::fs::write(&path, data) {
        Ok(()) => tracing::debug!(
            path = %path.display(),
            size = data.len(),
            kind,
            "Diagnostic dump: written"
        ),
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            kind,
            "Diagnostic dump: failed to write"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_under_run_directory() {
        let base = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        let dump = DumpDir::under(base.path(), &id);

        dump.text("a.txt", "hello");
        dump.json("b.json", &serde_json::json!({"k": 1}));
        dump.binary("c.bin", &[1, 2, 3]);

        let dir = base.path().join(id.to_string());
        assert_eq!(std::fs::read_to_string(dir.join("a.txt")).unwrap(), "hello");
        assert!(std::fs::read_to_string(dir.join("b.json")).unwrap().contains("\"k\": 1"));
        assert_eq!(std::fs::read(dir.join("c.bin")).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn disabled_dump_is_noop() {
        let dump = DumpDir::disabled();
        assert!(dump.path().is_none());
        dump.text("never.txt", "x");
    }

    #[test]
    fn unwritable_base_disables_dump() {
        let base = tempfile::tempdir().unwrap();
        let file = base.path().join("not-a-dir");
        std::fs::write(&file, "x").unwrap();
        let dump = DumpDir::under(&file, &Uuid::new_v4());
        assert!(dump.path().is_none());
    }
}
