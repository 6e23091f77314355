/*
 * Copyright 2020 Nikhil Marathe <nsm.nikhil@gmail.com>
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! On-disk envelope shared by the persistent caches.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("decoding failed: {0}")]
    Decode(#[from] bincode::Error),
    #[error("not a {expected} cache file")]
    BadMagic { expected: &'static str },
    #[error("cache format version {found}, expected {expected}")]
    Version { found: u32, expected: u32 },
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    magic: [u8; 4],
    version: u32,
    data: T,
}

/// A cache format: the magic bytes identify the kind of cache, the version its layout.
#[derive(Debug, Clone, Copy)]
pub struct Format {
    pub name: &'static str,
    pub magic: [u8; 4],
    pub version: u32,
}

/// `Ok(None)` if there is no file at `path`.
pub fn load<T: DeserializeOwned>(path: &Path, format: Format) -> Result<Option<T>, CacheError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let envelope: Envelope<T> = bincode::deserialize(&bytes)?;
    if envelope.magic != format.magic {
        return Err(CacheError::BadMagic {
            expected: format.name,
        });
    }
    if envelope.version != format.version {
        return Err(CacheError::Version {
            found: envelope.version,
            expected: format.version,
        });
    }
    Ok(Some(envelope.data))
}

/// Writes through a sibling temporary file so a crash never leaves a truncated cache behind.
pub fn save<T: Serialize>(path: &Path, format: Format, data: &T) -> Result<(), CacheError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let bytes = bincode::serialize(&Envelope {
        magic: format.magic,
        version: format.version,
        data,
    })?;
    let mut tmp = PathBuf::from(path);
    tmp.set_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    const FORMAT: Format = Format {
        name: "test",
        magic: *b"TEST",
        version: 3,
    };

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loaded: Option<HashMap<String, String>> =
            load(&dir.path().join("absent.bin"), FORMAT).expect("no error");
        assert!(loaded.is_none());
    }

    #[test]
    fn save_creates_directories_and_loads_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/dir/cache.bin");
        let mut map = HashMap::new();
        map.insert("A".to_owned(), "b".to_owned());
        save(&path, FORMAT, &map).expect("save");
        let loaded: HashMap<String, String> = load(&path, FORMAT).expect("load").expect("present");
        assert_eq!(loaded, map);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn version_mismatch_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cache.bin");
        save(&path, FORMAT, &1u32).expect("save");
        let newer = Format {
            version: 4,
            ..FORMAT
        };
        assert!(matches!(
            load::<u32>(&path, newer),
            Err(CacheError::Version {
                found: 3,
                expected: 4
            })
        ));
    }

    #[test]
    fn garbage_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cache.bin");
        std::fs::write(&path, b"\x01").expect("write");
        assert!(load::<HashMap<String, String>>(&path, FORMAT).is_err());
    }
}
