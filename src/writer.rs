use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::config::{CollisionPolicy, OutputConfig};
use crate::error::WriteError;
use crate::logging::WRITER;
use crate::parse::DocumentSource;
use crate::segment::PageBlock;

/// A block persisted to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputArtifact {
    pub path: PathBuf,
    pub identifier: String,
    pub group_key: Option<String>,
    pub pages: Vec<usize>,
}

/// Writes sealed blocks under `<root>/<identifier>/`. One writer per document run.
#[derive(Debug)]
pub struct BlockWriter {
    root: PathBuf,
    extension: String,
    on_collision: CollisionPolicy,
    written: HashSet<PathBuf>,
}

impl BlockWriter {
    pub fn new<P: Into<PathBuf>>(root: P, config: &OutputConfig) -> Self {
        BlockWriter {
            root: root.into(),
            extension: config.extension.clone(),
            on_collision: config.on_collision,
            written: HashSet::new(),
        }
    }

    /// File name without extension: the group key, or `Page_<n>` from the
    /// block's first page number when there is no key.
    pub fn file_stem(block: &PageBlock) -> String {
        match block.group_key.as_deref() {
            Some(key) if !key.trim().is_empty() => sanitize_component(key),
            _ => format!("Page_{}", block.start_index() + 1),
        }
    }

    pub fn write<S>(&mut self, block: &PageBlock, source: &S) -> Result<OutputArtifact, WriteError>
    where
        S: DocumentSource + ?Sized,
    {
        let bytes = source.serialize_block(block.pages())?;

        let dir = self.root.join(sanitize_component(&block.identifier));
        fs::create_dir_all(&dir).map_err(|source| WriteError::DestinationUnavailable {
            dir: dir.clone(),
            source,
        })?;
        if !dir.is_dir() {
            return Err(WriteError::DestinationUnavailable {
                dir,
                source: io::Error::new(io::ErrorKind::NotFound, "not a directory after creation"),
            });
        }

        let path = self.target_path(&dir, &Self::file_stem(block));
        write_atomically(&dir, &path, &bytes).map_err(|source| WriteError::Write {
            path: path.clone(),
            source,
        })?;
        self.written.insert(path.clone());

        info!(
            target: WRITER,
            path = %path.display(),
            first_page = block.start_index() + 1,
            pages = block.pages().len(),
            "block written"
        );
        Ok(OutputArtifact {
            path,
            identifier: block.identifier.clone(),
            group_key: block.group_key.clone(),
            pages: block.page_indices(),
        })
    }

    fn target_path(&self, dir: &Path, stem: &str) -> PathBuf {
        let path = dir.join(format!("{stem}.{}", self.extension));
        if !self.written.contains(&path) {
            return path;
        }
        match self.on_collision {
            CollisionPolicy::Overwrite => {
                warn!(target: WRITER, path = %path.display(), "name already written in this run, overwriting");
                path
            }
            CollisionPolicy::Suffix => (2..)
                .map(|n| dir.join(format!("{stem}_{n}.{}", self.extension)))
                .find(|candidate| !self.written.contains(candidate))
                .unwrap_or(path),
        }
    }
}

/// Either the whole file lands at `path` or nothing does.
fn write_atomically(dir: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}
