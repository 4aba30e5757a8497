//! Method manifests
//!
//! A `.toml` location carries the method's metadata:
//!
//! ```toml
//! description = "Greets a user"
//! auth = false
//!
//! [validation]
//! email = "string.email.required"
//! ```

use std::fs;
use std::path::Path;

use super::{MethodOptions, RegistryError};

/// Whether a location should be read as a manifest.
pub(crate) fn is_manifest(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == "toml")
}

/// Read a manifest. DSL strings are compiled later, with the descriptor.
pub fn load_manifest(path: &Path) -> Result<MethodOptions, RegistryError> {
    let manifest_error = |message: String| RegistryError::Manifest {
        path: path.display().to_string(),
        message,
    };

    let contents = fs::read_to_string(path).map_err(|e| manifest_error(e.to_string()))?;
    toml::from_str(&contents).map_err(|e| manifest_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("_hello.toml");
        fs::write(
            &path,
            "description = \"Greets\"\nauth = true\n\n[validation]\nemail = \"string.email.required\"\n",
        )
        .unwrap();

        assert!(is_manifest(&path));
        let options = load_manifest(&path).unwrap();
        assert_eq!(options.description.as_deref(), Some("Greets"));
        assert!(options.auth);
        assert_eq!(options.validation.get("email"), Some("string.email.required"));
    }

    #[test]
    fn test_empty_manifest_is_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("_echo.toml");
        fs::write(&path, "").unwrap();

        assert_eq!(load_manifest(&path).unwrap(), MethodOptions::default());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("_bad.toml");
        fs::write(&path, "descripton = \"typo\"\n").unwrap();

        let err = load_manifest(&path).unwrap_err();
        assert!(matches!(err, RegistryError::Manifest { .. }));
    }

    #[test]
    fn test_non_toml_is_not_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("_hello.rs");
        fs::write(&path, "").unwrap();

        assert!(!is_manifest(&path));
        assert!(!is_manifest(Path::new("hello.toml")));
    }
}
