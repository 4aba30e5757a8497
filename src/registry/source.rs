//! Method sources and enumeration.

use std::future::Future;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use walkdir::WalkDir;

use super::RegistryError;

/// Where the method set comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodSource {
    /// Scan this directory for prefixed files.
    Directory(PathBuf),
    /// Use exactly these locations.
    Locations(Vec<PathBuf>),
    /// Use these method names verbatim; no files are consulted.
    Names(Vec<String>),
}

/// Supplies the method source. Called at most once per cache.
#[async_trait]
pub trait MethodEnumerator: Send + Sync {
    async fn enumerate(&self) -> Result<MethodSource, RegistryError>;
}

#[async_trait]
impl<F, Fut> MethodEnumerator for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<MethodSource, RegistryError>> + Send,
{
    async fn enumerate(&self) -> Result<MethodSource, RegistryError> {
        (self)().await
    }
}

#[async_trait]
impl MethodEnumerator for MethodSource {
    async fn enumerate(&self) -> Result<MethodSource, RegistryError> {
        Ok(self.clone())
    }
}

/// Regular files directly inside `dir` whose name starts with `prefix`,
/// sorted by name.
pub fn scan_directory(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, RegistryError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| RegistryError::Scan {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        if entry.file_name().to_string_lossy().starts_with(prefix) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

/// Expand a source into its locations.
pub fn locations(source: &MethodSource, prefix: &str) -> Result<Vec<PathBuf>, RegistryError> {
    match source {
        MethodSource::Directory(dir) => scan_directory(dir, prefix),
        MethodSource::Locations(paths) => Ok(paths.clone()),
        MethodSource::Names(names) => Ok(names.iter().map(PathBuf::from).collect()),
    }
}

/// Method name for a location: its file stem with a leading `prefix`
/// stripped. Only the path text is used.
pub fn method_key(location: &Path, prefix: &str) -> Option<String> {
    let name = location.file_stem()?.to_string_lossy();
    let key = name.strip_prefix(prefix).unwrap_or(name.as_ref());

    (!key.is_empty()).then(|| key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_keeps_prefixed_files_sorted() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("_zeta.toml"), "").unwrap();
        fs::write(dir.path().join("_alpha.toml"), "").unwrap();
        fs::write(dir.path().join("helper.toml"), "").unwrap();
        fs::create_dir(dir.path().join("_nested")).unwrap();
        fs::write(dir.path().join("_nested").join("_deep.toml"), "").unwrap();

        let files = scan_directory(dir.path(), "_").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["_alpha.toml", "_zeta.toml"]);
    }

    #[test]
    fn test_scan_missing_directory() {
        let err = scan_directory(Path::new("/no/such/methods"), "_").unwrap_err();
        assert!(matches!(err, RegistryError::Scan { .. }));
    }

    #[test]
    fn test_method_key() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("_hello.toml");
        fs::write(&file, "").unwrap();

        assert_eq!(method_key(&file, "_"), Some("hello".to_string()));
        assert_eq!(method_key(Path::new("_echo"), "_"), Some("echo".to_string()));
        assert_eq!(method_key(Path::new("_"), "_"), None);
    }

    #[test]
    fn test_method_key_ignores_filesystem() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("_hello.ts");
        assert!(!missing.exists());
        assert_eq!(method_key(&missing, "_"), Some("hello".to_string()));

        let present = dir.path().join("_hello.ts");
        fs::write(&present, "").unwrap();
        assert_eq!(method_key(&present, "_"), Some("hello".to_string()));
    }

    #[test]
    fn test_names_expand_verbatim() {
        let source = MethodSource::Names(vec!["users.get".to_string()]);
        assert_eq!(locations(&source, "_").unwrap(), vec![PathBuf::from("users.get")]);
    }

    #[tokio::test]
    async fn test_static_source_enumerates_itself() {
        let source = MethodSource::Locations(vec![PathBuf::from("echo")]);
        assert_eq!(source.enumerate().await.unwrap(), source);
    }
}
