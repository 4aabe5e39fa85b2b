use std::path::PathBuf;

/// Fatal problems with a package manifest. Any of these aborts the install.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("package manifest not found at {0:?}")]
    NotFound(PathBuf),

    #[error("malformed package manifest: {0}")]
    Malformed(String),

    #[error("package manifest is missing required node '{0}'")]
    MissingNode(String),

    #[error("package manifest node '{path}' has an invalid value: '{value}'")]
    InvalidValue { path: String, value: String },
}
