use research_core::{ResearchError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::metadata::SessionExport;

/// Writes session exports as pretty-printed JSON under a data directory.
#[derive(Debug, Clone)]
pub struct ExportWriter {
    data_dir: PathBuf,
}

impl ExportWriter {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        debug!("ExportWriter initialized: data_dir={:?}", data_dir);
        Self { data_dir }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Write `export` and return where it landed.
    ///
    /// Without `destination` the file goes to the data directory under the
    /// export's suggested filename. A relative destination is resolved
    /// against the data directory.
    pub fn write(&self, export: &SessionExport, destination: Option<&Path>) -> Result<PathBuf> {
        let path = match destination {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => self.data_dir.join(path),
            None => self.data_dir.join(export.suggested_filename()),
        };

        let json = serde_json::to_string_pretty(export)?;
        write_file(&path, json.as_bytes()).map_err(|e| {
            error!("Export of session {} failed: {}", export.session.session_id, e);
            ResearchError::ExportIo(e)
        })?;

        info!("Exported session {} to {:?}", export.session.session_id, path);
        Ok(path)
    }

    pub fn read(path: &Path) -> Result<SessionExport> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

fn write_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ConversationSession, ConversationTurn};
    use chrono::Utc;
    use tempfile::TempDir;

    fn export() -> SessionExport {
        let mut session = ConversationSession::new(Utc::now());
        session.turns.push_back(ConversationTurn {
            user_query: "量子计算的最新突破".into(),
            ai_response: "answer".into(),
            timestamp: Utc::now(),
            turn_number: 1,
            processing_time: 3.2,
            error_occurred: false,
            error_message: String::new(),
        });
        SessionExport::new(&session, Utc::now())
    }

    #[test]
    fn test_write_to_default_location() {
        let temp_dir = TempDir::new().unwrap();
        let writer = ExportWriter::new(temp_dir.path().join("exports"));
        let export = export();

        let path = writer.write(&export, None).unwrap();
        assert_eq!(path, temp_dir.path().join("exports").join(export.suggested_filename()));

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("量子计算的最新突破"));
        assert!(contents.contains("\"export_timestamp\""));
    }

    #[test]
    fn test_relative_destination_resolves_under_data_dir() {
        let temp_dir = TempDir::new().unwrap();
        let writer = ExportWriter::new(temp_dir.path());

        let path = writer.write(&export(), Some(Path::new("custom.json"))).unwrap();
        assert_eq!(path, temp_dir.path().join("custom.json"));
        assert!(path.exists());
    }

    #[test]
    fn test_write_failure_is_export_error() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();

        let writer = ExportWriter::new(&blocker);
        let err = writer.write(&export(), None).unwrap_err();
        assert!(matches!(err, ResearchError::ExportIo(_)));
    }
}
