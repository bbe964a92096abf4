//! Flat, disk-backed file store.
//!
//! The [`FileStore`] performs the four client operations against its sandbox root.
//! Contents cross the wire as standard, padded base64 so a payload can never contain
//! the protocol terminator; encoding and decoding happen here, next to the disk I/O.
//!
//! # Example
//! ```rust,no_run
//! use fileserve::storage::FileStore;
//!
//! let store = FileStore::open("files").unwrap();
//! store.upload("hello.txt", "aGVsbG8=").unwrap();
//!
//! let file = store.get("hello.txt").unwrap();
//! assert_eq!(file.content, "aGVsbG8=");
//! ```
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use base64::{Engine, engine::general_purpose::STANDARD};
use log::{debug, info, warn};

use super::{StorageError, path::resolve};

/// A file read from the store, with its content base64-encoded for transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub name: String,
    pub content: String,
}

/// Handle to the sandbox root. Cheap to clone; holds no file state.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open the store at `root`, creating the directory if it does not exist.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref();
        if !root.exists() {
            fs::create_dir_all(root)?;
            warn!("created storage root at {}", root.display());
        }

        let root = root.canonicalize()?;
        if !root.is_dir() {
            return Err(StorageError::Io(io::Error::other(format!(
                "storage root {} is not a directory",
                root.display()
            ))));
        }

        info!("file store using root {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names of the regular files directly under the root, in enumeration order.
    pub fn list(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }

            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(name) => warn!("skipping file with non UTF-8 name {name:?}"),
            }
        }

        debug!("listed {} files", names.len());
        Ok(names)
    }

    pub fn get(&self, filename: &str) -> Result<StoredFile, StorageError> {
        let path = resolve(&self.root, filename)?;
        if !path.is_file() {
            return Err(StorageError::NotFound(filename.to_string()));
        }

        let bytes = fs::read(&path).map_err(|e| not_found_or_io(e, filename))?;
        debug!("read {} bytes from {}", bytes.len(), path.display());

        Ok(StoredFile {
            name: filename.to_string(),
            content: STANDARD.encode(bytes),
        })
    }

    /// Decode `content` and write it to `filename`, replacing any existing file.
    /// Returns the number of bytes written.
    pub fn upload(&self, filename: &str, content: &str) -> Result<usize, StorageError> {
        let path = resolve(&self.root, filename)?;
        let bytes = STANDARD.decode(content)?;

        fs::write(&path, &bytes)?;
        debug!("wrote {} bytes to {}", bytes.len(), path.display());

        Ok(bytes.len())
    }

    pub fn delete(&self, filename: &str) -> Result<(), StorageError> {
        let path = resolve(&self.root, filename)?;
        if !path.is_file() {
            return Err(StorageError::NotFound(filename.to_string()));
        }

        fs::remove_file(&path).map_err(|e| not_found_or_io(e, filename))?;
        debug!("removed {}", path.display());

        Ok(())
    }
}

// The file can vanish between the existence check and the operation.
fn not_found_or_io(err: io::Error, filename: &str) -> StorageError {
    match err.kind() {
        io::ErrorKind::NotFound => StorageError::NotFound(filename.to_string()),
        _ => StorageError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use tempdir::TempDir;

    use super::*;

    fn store(prefix: &str) -> (TempDir, FileStore) {
        let temp = TempDir::new(prefix).unwrap();
        let store = FileStore::open(temp.path().join("files")).unwrap();
        (temp, store)
    }

    #[test]
    fn store_open_creates_root() {
        let temp = TempDir::new("open").unwrap();
        let root = temp.path().join("nested").join("files");

        let store = FileStore::open(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(store.root(), root.canonicalize().unwrap());
    }

    #[test]
    fn store_open_rejects_file_root() {
        let temp = TempDir::new("open").unwrap();
        let root = temp.path().join("plain");
        fs::write(&root, b"x").unwrap();

        assert!(matches!(FileStore::open(&root), Err(StorageError::Io(_))));
    }

    #[test]
    fn store_upload_then_get() {
        let (_temp, store) = store("roundtrip");
        let payload: Vec<u8> = (0..=255).collect();
        let encoded = STANDARD.encode(&payload);

        assert_eq!(store.upload("bytes.bin", &encoded).unwrap(), 256);

        let file = store.get("bytes.bin").unwrap();
        assert_eq!(file.name, "bytes.bin");
        assert_eq!(STANDARD.decode(file.content).unwrap(), payload);
    }

    #[test]
    fn store_upload_overwrites() {
        let (_temp, store) = store("overwrite");

        store.upload("a.txt", &STANDARD.encode("first, longer")).unwrap();
        store.upload("a.txt", &STANDARD.encode("second")).unwrap();

        let on_disk = fs::read(store.root().join("a.txt")).unwrap();
        assert_eq!(on_disk, b"second");
    }

    #[test]
    fn store_upload_invalid_base64() {
        let (_temp, store) = store("encoding");

        let res = store.upload("a.txt", "not*base64!");
        assert!(matches!(res, Err(StorageError::InvalidEncoding(_))));
        assert!(!store.root().join("a.txt").exists());
    }

    #[test]
    fn store_empty_upload() {
        let (_temp, store) = store("empty");

        assert_eq!(store.upload("empty.txt", "").unwrap(), 0);
        assert_eq!(store.get("empty.txt").unwrap().content, "");
    }

    #[test]
    fn store_get_missing() {
        let (_temp, store) = store("missing");
        assert!(matches!(
            store.get("nothing.txt"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn store_delete_twice() {
        let (_temp, store) = store("delete");
        store.upload("a.txt", "YQ==").unwrap();

        store.delete("a.txt").unwrap();
        assert!(matches!(
            store.delete("a.txt"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn store_list_reflects_state() {
        let (_temp, store) = store("list");
        fs::create_dir(store.root().join("subdir")).unwrap();

        store.upload("a.txt", "YQ==").unwrap();
        store.upload("b.txt", "Yg==").unwrap();
        store.upload("no_extension", "").unwrap();
        store.delete("a.txt").unwrap();

        let names: HashSet<String> = store.list().unwrap().into_iter().collect();
        let expected: HashSet<String> = ["b.txt", "no_extension"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn store_rejects_traversal() {
        let temp = TempDir::new("traversal").unwrap();
        let store = FileStore::open(temp.path().join("files")).unwrap();
        fs::write(temp.path().join("secret.txt"), b"secret").unwrap();

        assert!(matches!(
            store.get("../secret.txt"),
            Err(StorageError::PathTraversal(_))
        ));
        assert!(matches!(
            store.upload("../../etc/passwd", "YQ=="),
            Err(StorageError::PathTraversal(_))
        ));
        assert!(matches!(
            store.upload("../escaped.txt", "YQ=="),
            Err(StorageError::PathTraversal(_))
        ));
        assert!(matches!(
            store.delete("../secret.txt"),
            Err(StorageError::PathTraversal(_))
        ));

        assert!(!temp.path().join("escaped.txt").exists());
        assert!(temp.path().join("secret.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn store_upload_through_dangling_symlink() {
        let (_temp, store) = store("dangling");
        let outside = TempDir::new("outside").unwrap();
        let planted = outside.path().join("planted.txt");
        std::os::unix::fs::symlink(&planted, store.root().join("link.txt")).unwrap();

        assert!(matches!(
            store.upload("link.txt", "cHduZWQ="),
            Err(StorageError::PathTraversal(_))
        ));
        assert!(!planted.exists());
    }

    #[test]
    fn store_directory_is_not_a_file() {
        let (_temp, store) = store("dir");
        fs::create_dir(store.root().join("subdir")).unwrap();

        assert!(matches!(store.get("subdir"), Err(StorageError::NotFound(_))));
        assert!(matches!(
            store.delete("subdir"),
            Err(StorageError::NotFound(_))
        ));
    }
}
