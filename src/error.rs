use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ProvisionError {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("manifest I/O failed for {path}")]
    #[diagnostic(help("check that the manifest directory exists and is writable"))]
    ManifestIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest {path} is not valid JSON: {message}")]
    #[diagnostic(help("fix the file by hand or rerun with --on-corrupt backup"))]
    ManifestCorrupt { path: String, message: String },

    #[error("manifest {path} has an unexpected shape: {message}")]
    ManifestShape { path: String, message: String },

    #[error("manifest {path} could not be encoded: {message}")]
    ManifestEncode { path: String, message: String },

    #[error("prompt failed: {message}")]
    Prompt { message: String },
}
