//! Folder watching: every PDF that appears in the watched folder is handed to
//! the processor, one document at a time.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use tracing::{error, info, warn};

use crate::logging::WATCH;
use crate::processor::DocumentProcessor;

pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Existing PDF files among `paths`, deduplicated, in first-seen order.
pub fn pdf_candidates<I>(paths: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|path| is_pdf(path) && path.is_file())
        .filter(|path| seen.insert(path.clone()))
        .collect()
}

/// PDFs already sitting in `dir`, sorted by name.
pub fn existing_pdfs(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut paths = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()?;
    paths.sort();
    Ok(pdf_candidates(paths))
}

fn dispatch(processor: &DocumentProcessor, path: &Path) {
    info!(target: WATCH, path = %path.display(), "new PDF detected");
    match processor.process(path) {
        Ok(report) => info!(
            target: WATCH,
            path = %path.display(),
            artifacts = report.split.artifacts.len(),
            "document done"
        ),
        Err(e) => error!(target: WATCH, path = %path.display(), error = %e, "document failed"),
    }
}

/// Watch `dir` (non-recursively) until the event channel closes.
pub fn watch(processor: &DocumentProcessor, dir: &Path) -> Result<()> {
    let settings = &processor.config().watch;
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create watch directory {}", dir.display()))?;

    let (tx, rx) = channel();
    let mut debouncer = new_debouncer(Duration::from_millis(settings.debounce_ms), tx)
        .context("Failed to create file watcher")?;
    debouncer
        .watcher()
        .watch(dir, RecursiveMode::NonRecursive)
        .context("Failed to watch directory")?;

    info!(target: WATCH, dir = %dir.display(), "watching for PDF documents");

    if settings.process_existing {
        for path in existing_pdfs(dir).context("Failed to list watch directory")? {
            dispatch(processor, &path);
        }
    }

    for result in rx {
        match result {
            Ok(events) => {
                for path in pdf_candidates(events.into_iter().map(|event| event.path)) {
                    dispatch(processor, &path);
                }
            }
            Err(e) => warn!(target: WATCH, error = %e, "watch error"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_extension_is_case_insensitive() {
        assert!(is_pdf(Path::new("in/lote.PDF")));
        assert!(is_pdf(Path::new("lote.pdf")));
        assert!(!is_pdf(Path::new("lote.pdf.part")));
        assert!(!is_pdf(Path::new("PROCESSED")));
    }

    #[test]
    fn candidates_skip_vanished_and_duplicate_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.pdf");
        let b = dir.path().join("b.txt");
        fs::write(&a, b"%PDF").unwrap();
        fs::write(&b, b"text").unwrap();
        fs::create_dir(dir.path().join("PROCESSED")).unwrap();

        let found = pdf_candidates(vec![
            a.clone(),
            b,
            dir.path().join("gone.pdf"),
            a.clone(),
            dir.path().join("PROCESSED"),
        ]);
        assert_eq!(found, vec![a]);
    }

    #[test]
    fn existing_pdfs_are_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "a.pdf", "notes.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let found = existing_pdfs(dir.path()).unwrap();
        assert_eq!(
            found,
            vec![dir.path().join("a.pdf"), dir.path().join("b.pdf")]
        );
    }
}
