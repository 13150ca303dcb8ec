use std::{error, fmt};

/// Unified error type
///
/// Failures in the import layer have their own `ImportError` type with
/// more detail. A `From` implementation folds those into this one so that
/// callers only need to handle a single error type.
#[derive(Debug)]
pub enum CaError {
    NotLoaded,
    InvalidFile,
    StdIoError(std::io::Error),
    SerdeYamlError(Box<serde_yaml::Error>),
    GltfError(Box<gltf::Error>),
    ImportError(crate::scene_import::ImportError),
}

impl error::Error for CaError {}

impl fmt::Display for CaError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NotLoaded => write!(f, "model is not loaded"),
            Self::InvalidFile => write!(f, "invalid file"),
            Self::StdIoError(e) => write!(f, "std::io::Error: {}", e.kind()),
            Self::SerdeYamlError(e) => {
                write!(f, "serde_yaml::Error: {e}")
            }
            Self::GltfError(e) => {
                write!(f, "gltf Error: {e}")
            }
            Self::ImportError(e) => write!(f, "import error: {e}"),
        }
    }
}

impl From<std::io::Error> for CaError {
    fn from(e: std::io::Error) -> Self {
        Self::StdIoError(e)
    }
}

impl From<serde_yaml::Error> for CaError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::SerdeYamlError(Box::new(e))
    }
}

impl From<gltf::Error> for CaError {
    fn from(e: gltf::Error) -> Self {
        Self::GltfError(Box::new(e))
    }
}

impl From<crate::scene_import::ImportError> for CaError {
    fn from(e: crate::scene_import::ImportError) -> Self {
        Self::ImportError(e)
    }
}
