//! On-disk cache backend: one JSON file per physical key.

use directories::ProjectDirs;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use super::entry::CacheEntry;
use super::{CacheProvider, namespace_prefix, physical_key};
use crate::error::Result;

const EXTENSION: &str = "json";

/// Stores each entry as `<sha256(physical key)>.json` under a directory.
///
/// Hashed names stay within file-name limits for any key length. Each file
/// carries its physical key, so `clear` can scan by prefix and the cache
/// needs no all-keys index.
#[derive(Clone, Debug)]
pub struct FileCacheProvider {
    dir: PathBuf,
}

impl FileCacheProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileCacheProvider { dir: dir.into() }
    }

    /// The per-user cache directory, if the platform has one.
    pub fn default_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "sheetql").map(|dirs| dirs.cache_dir().join("queries"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, namespace: &str, key: &str) -> PathBuf {
        let name = hex::encode(Sha256::digest(physical_key(namespace, key).as_bytes()));
        self.dir.join(format!("{}.{}", name, EXTENSION))
    }

    /// Physical keys of every stored file, skipping files that are not entries.
    pub fn physical_keys(&self) -> Result<Vec<(String, PathBuf)>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut keys = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            match serde_json::from_str::<CacheEntry>(&content) {
                Ok(CacheEntry { key: Some(key), .. }) => keys.push((key, path)),
                _ => debug!(path = %path.display(), "skipping unrecognised cache file"),
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

impl CacheProvider for FileCacheProvider {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        let path = self.path_for(namespace, key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: CacheEntry = serde_json::from_str(&content)?;
        if entry.is_expired() {
            remove_if_present(&path)?;
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    fn set(&self, namespace: &str, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let entry = CacheEntry::new(value, ttl).with_key(physical_key(namespace, key));
        fs::write(self.path_for(namespace, key), serde_json::to_string(&entry)?)?;
        Ok(())
    }

    fn del(&self, namespace: &str, key: &str) -> Result<()> {
        remove_if_present(&self.path_for(namespace, key))
    }

    fn clear(&self, namespace: &str) -> Result<()> {
        let prefix = namespace_prefix(namespace);
        let mut removed = 0usize;
        for (key, path) in self.physical_keys()? {
            if key.starts_with(&prefix) {
                remove_if_present(&path)?;
                removed += 1;
            }
        }
        debug!(namespace, removed, "cleared file cache namespace");
        Ok(())
    }

    fn supports_prefix_scan(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_get_del() {
        let dir = TempDir::new().unwrap();
        let provider = FileCacheProvider::new(dir.path());
        assert_eq!(provider.get("ns", "k").unwrap(), None);
        provider.set("ns", "k", "\"v\"", None).unwrap();
        assert_eq!(provider.get("ns", "k").unwrap().as_deref(), Some("\"v\""));
        provider.del("ns", "k").unwrap();
        assert_eq!(provider.get("ns", "k").unwrap(), None);
        provider.del("ns", "k").unwrap();
    }

    #[test]
    fn test_file_names_are_sha256_of_physical_key() {
        let dir = TempDir::new().unwrap();
        let provider = FileCacheProvider::new(dir.path());
        provider.set("ns", "a/b", "1", None).unwrap();
        let keys = provider.physical_keys().unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].0, "ns:a/b");
        assert_eq!(
            keys[0].1.file_name().and_then(|n| n.to_str()),
            Some(format!("{}.json", hex::encode(Sha256::digest(b"ns:a/b"))).as_str())
        );
    }

    #[test]
    fn test_long_keys_fit_file_name_limits() {
        let dir = TempDir::new().unwrap();
        let provider = FileCacheProvider::new(dir.path());
        let key = "k".repeat(1000);
        provider.set("ns", &key, "1", None).unwrap();
        assert_eq!(provider.get("ns", &key).unwrap().as_deref(), Some("1"));
        let keys = provider.physical_keys().unwrap();
        assert_eq!(keys[0].0, format!("ns:{}", key));
        assert_eq!(keys[0].1.file_name().map(|n| n.len()), Some(64 + ".json".len()));
    }

    #[test]
    fn test_foreign_files_are_ignored() {
        let dir = TempDir::new().unwrap();
        let provider = FileCacheProvider::new(dir.path());
        fs::write(dir.path().join("notes.json"), "[1, 2]").unwrap();
        fs::write(dir.path().join("keyless.json"), r#"{"value": "x"}"#).unwrap();
        provider.set("ns", "a", "1", None).unwrap();
        provider.clear("ns").unwrap();
        assert!(provider.physical_keys().unwrap().is_empty());
        assert!(dir.path().join("notes.json").exists());
    }

    #[test]
    fn test_clear_scans_by_prefix() {
        let dir = TempDir::new().unwrap();
        let provider = FileCacheProvider::new(dir.path());
        provider.set("ns", "a", "1", None).unwrap();
        provider.set("ns", "b", "2", None).unwrap();
        provider.set("other", "a", "3", None).unwrap();
        provider.clear("ns").unwrap();
        let keys: Vec<String> = provider
            .physical_keys()
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["other:a"]);
    }

    #[test]
    fn test_expired_file_is_removed() {
        let dir = TempDir::new().unwrap();
        let provider = FileCacheProvider::new(dir.path());
        provider.set("ns", "k", "v", Some(Duration::ZERO)).unwrap();
        assert_eq!(provider.get("ns", "k").unwrap(), None);
        assert!(provider.physical_keys().unwrap().is_empty());
    }

    #[test]
    fn test_missing_dir_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let provider = FileCacheProvider::new(dir.path().join("absent"));
        assert!(provider.physical_keys().unwrap().is_empty());
        provider.clear("ns").unwrap();
    }
}
