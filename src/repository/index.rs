//! Per-repository persisted index
//!
//! A repository's Shabam and fact store are saved together in
//! `<git-dir>/gitver/index.bin.gz`: a gzip stream holding the bincode
//! encoding of the schema tag, the flattened Shabam and the flattened facts.
//! Anything unreadable is treated as a cache miss and rebuilt from history.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::facts::{FactStore, FlatFacts};
use super::shabam::{Shabam, ShabamFlat};

/// Bump whenever the persisted layout or the meaning of a fact changes
pub const SCHEMA_VERSION: &str = "gitver-index-3";

const INDEX_DIR: &str = "gitver";
const INDEX_FILE: &str = "index.bin.gz";

#[derive(Debug, Default, Clone)]
pub struct RepoIndex {
    pub shabam: Shabam,
    pub facts: FactStore,
}

/// Why a stored index was not used
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Loaded,
    Missing,
    SchemaMismatch(String),
    Corrupt(String),
}

impl RepoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Location of the index file for a repository's git directory
    pub fn path_for(git_dir: &Path) -> PathBuf {
        git_dir.join(INDEX_DIR).join(INDEX_FILE)
    }

    /// Load the index at `path`, falling back to an empty one
    pub fn load(path: &Path) -> Self {
        Self::load_with_status(path).0
    }

    pub fn load_with_status(path: &Path) -> (Self, LoadStatus) {
        let bytes = match read_gzip(path) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return (Self::new(), LoadStatus::Missing),
            Err(e) => {
                tracing::warn!("discarding unreadable index {}: {e:#}", path.display());
                return (Self::new(), LoadStatus::Corrupt(format!("{e:#}")));
            }
        };
        match Self::decode(&bytes) {
            Ok(Ok(index)) => (index, LoadStatus::Loaded),
            Ok(Err(found)) => {
                tracing::info!(
                    "index {} has schema {found:?}, expected {SCHEMA_VERSION:?}; rebuilding",
                    path.display()
                );
                (Self::new(), LoadStatus::SchemaMismatch(found))
            }
            Err(e) => {
                tracing::warn!("discarding undecodable index {}: {e:#}", path.display());
                (Self::new(), LoadStatus::Corrupt(format!("{e:#}")))
            }
        }
    }

    /// Decode an uncompressed index. The inner `Err` carries a foreign
    /// schema tag.
    fn decode(bytes: &[u8]) -> Result<std::result::Result<Self, String>> {
        let config = bincode::config::standard();
        let (schema, mut offset): (String, usize) =
            bincode::serde::decode_from_slice(bytes, config).context("reading schema tag")?;
        if schema != SCHEMA_VERSION {
            return Ok(Err(schema));
        }
        let (shabam, used): (ShabamFlat, usize) =
            bincode::serde::decode_from_slice(&bytes[offset..], config)
                .context("reading ancestry table")?;
        offset += used;
        let (facts, _): (FlatFacts, usize) =
            bincode::serde::decode_from_slice(&bytes[offset..], config)
                .context("reading facts")?;

        Ok(Ok(Self {
            shabam: Shabam::from_flat(shabam)?,
            facts: FactStore::from_flat(facts),
        }))
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let config = bincode::config::standard();
        let mut bytes = bincode::serde::encode_to_vec(SCHEMA_VERSION, config)?;
        bytes.extend(bincode::serde::encode_to_vec(self.shabam.flatten(), config)?);
        bytes.extend(bincode::serde::encode_to_vec(self.facts.flatten(), config)?);
        Ok(bytes)
    }

    /// Write the index, replacing any previous file in one rename
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let tmp = path.with_extension("gz.tmp");
        let bytes = self.encode()?;
        {
            let file = File::create(&tmp)
                .with_context(|| format!("Failed to create {}", tmp.display()))?;
            let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
            encoder.write_all(&bytes)?;
            encoder.finish()?.flush()?;
        }
        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to move index into place at {}", path.display()))?;
        tracing::debug!("saved index {} ({} bytes raw)", path.display(), bytes.len());
        Ok(())
    }
}

fn read_gzip(path: &Path) -> Result<Option<Vec<u8>>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("opening {}", path.display())),
    };
    let mut bytes = Vec::new();
    GzDecoder::new(BufReader::new(file))
        .read_to_end(&mut bytes)
        .context("decompressing")?;
    Ok(Some(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sha;
    use crate::repository::facts::Fact;

    fn sha(n: u8) -> Sha {
        Sha([n; 20])
    }

    fn sample() -> RepoIndex {
        let mut index = RepoIndex::new();
        index.shabam.add(sha(1), &[]);
        index.shabam.add(sha(2), &[sha(1)]);
        index.facts.insert(Fact::Commit { sha: sha(1), ctime: 10 });
        index.facts.insert(Fact::Commit { sha: sha(2), ctime: 20 });
        index.facts.insert(Fact::CommitParent { child: sha(2), ordinal: 0, parent: sha(1) });
        index.facts.insert(Fact::Branch { name: "main".into(), tip: sha(2) });
        index
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = RepoIndex::path_for(dir.path());
        sample().save(&path).unwrap();

        let (loaded, status) = RepoIndex::load_with_status(&path);
        assert_eq!(status, LoadStatus::Loaded);
        assert_eq!(loaded.facts.flatten(), sample().facts.flatten());
        assert_eq!(loaded.shabam.flatten(), sample().shabam.flatten());
        assert!(loaded.shabam.is_ancestor(&sha(1), &sha(2)));
    }

    #[test]
    fn test_saving_twice_gives_identical_bytes() {
        let dir = tempfile::TempDir::new().unwrap();
        let a = dir.path().join("a.bin.gz");
        let b = dir.path().join("b.bin.gz");
        sample().save(&a).unwrap();
        RepoIndex::load(&a).save(&b).unwrap();
        assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());
    }

    #[test]
    fn test_missing_file_is_fresh() {
        let dir = tempfile::TempDir::new().unwrap();
        let (index, status) = RepoIndex::load_with_status(&dir.path().join("nope.bin.gz"));
        assert_eq!(status, LoadStatus::Missing);
        assert!(index.shabam.is_empty());
    }

    #[test]
    fn test_schema_mismatch_is_fresh() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("old.bin.gz");
        let config = bincode::config::standard();
        let mut bytes = bincode::serde::encode_to_vec("gitver-index-0", config).unwrap();
        bytes.extend([1, 2, 3]);
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(&bytes).unwrap();
        encoder.finish().unwrap();

        let (index, status) = RepoIndex::load_with_status(&path);
        assert_eq!(status, LoadStatus::SchemaMismatch("gitver-index-0".into()));
        assert_eq!(index.facts.counts().commits, 0);
    }

    #[test]
    fn test_corrupt_file_is_fresh() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("junk.bin.gz");
        fs::write(&path, b"definitely not gzip").unwrap();
        let (index, status) = RepoIndex::load_with_status(&path);
        assert!(matches!(status, LoadStatus::Corrupt(_)));
        assert!(index.shabam.is_empty());
    }
}
