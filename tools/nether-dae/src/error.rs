//! Library error type
//!
//! Only hard failures are errors: unreadable input, a document that is not
//! COLLADA, and broken internal invariants. Missing references, malformed
//! elements and infeasible derived data are logged and degrade to absent
//! features instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaeError {
    #[error("Failed to read document: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse XML: {0}")]
    Xml(#[from] xmltree::ParseError),

    #[error("Root element is <{0}>, expected <COLLADA>")]
    NotCollada(String),

    #[error("Bone '{name}' not found in the merged skeleton")]
    BoneNotFound { name: String },
}

pub type Result<T> = std::result::Result<T, DaeError>;
