use std::path::PathBuf;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::severity::Priority;

/// A single tailed log file, immutable after config load (spec §3).
///
/// Hot reload (§4.8) replaces the whole file list: additions start new
/// Tailers, removals cancel existing ones, and a changed path or label is
/// treated as remove+add rather than an in-place mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MonitoredFileSpec {
    pub id: String,
    pub path: PathBuf,
    pub label: String,
    pub priority: Priority,
    pub enabled: bool,
}

impl MonitoredFileSpec {
    /// Derives a human label from the filename when the caller did not
    /// supply one, per spec §3 ("human label derived from filename if
    /// unspecified").
    pub fn new(id: impl Into<String>, path: PathBuf, label: Option<String>, priority: Priority, enabled: bool) -> Self {
        let label = label.unwrap_or_else(|| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string_lossy().into_owned())
        });
        Self { id: id.into(), path, label, priority, enabled }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_defaults_to_filename() {
        let spec = MonitoredFileSpec::new("a", PathBuf::from("/var/log/app/current.log"), None, Priority::High, true);
        assert_eq!(spec.label, "current.log");
    }

    #[test]
    fn explicit_label_is_kept() {
        let spec = MonitoredFileSpec::new(
            "a",
            PathBuf::from("/var/log/app/current.log"),
            Some("app".to_string()),
            Priority::Low,
            true,
        );
        assert_eq!(spec.label, "app");
    }
}
