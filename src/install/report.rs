use std::fmt;

use crate::actions::ActionOutcome;
use crate::conflicts::ConflictReport;

/// A payload file that could not be put in place.
#[derive(Debug, Clone, PartialEq)]
pub struct FileFailure {
    /// The path as the manifest spells it, `orgPath/orgName`.
    pub path: String,
    pub reason: String,
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

/// Everything one install did, including the parts that failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstallReport {
    pub ledger_id: i64,
    pub package_name: String,
    pub conflicts: ConflictReport,
    pub installed_files: Vec<String>,
    pub file_failures: Vec<FileFailure>,
    pub actions: Vec<ActionOutcome>,
}

impl InstallReport {
    /// True when every file was installed and no action failed.
    pub fn is_complete(&self) -> bool {
        self.file_failures.is_empty() && !self.actions.iter().any(ActionOutcome::is_failure)
    }

    pub fn failed_actions(&self) -> impl Iterator<Item = &ActionOutcome> {
        self.actions.iter().filter(|a| a.is_failure())
    }
}
