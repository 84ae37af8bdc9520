//! The document pipeline: load, extract, segment, stamp, write, archive.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::{Config, RetryConfig};
use crate::error::{ConfigError, ProcessError, SourceError};
use crate::extract::FieldExtractor;
use crate::logging::PROCESSOR;
use crate::overlay::{Compositor, OverlayImage};
use crate::page::Page;
use crate::parse::{DocumentSource, PdfDocument};
use crate::segment::{Disposition, DropReason, PageBlock, Segmenter};
use crate::writer::{BlockWriter, OutputArtifact};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedPage {
    pub page: usize,
    pub reason: DropReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedBlock {
    pub identifier: String,
    pub group_key: Option<String>,
    pub pages: Vec<usize>,
    pub error: String,
}

/// What happened to the pages of one document.
#[derive(Debug, Default, Serialize)]
pub struct SplitReport {
    /// Pages visited, trailer excluded.
    pub pages_processed: usize,
    pub dropped: Vec<DroppedPage>,
    pub artifacts: Vec<OutputArtifact>,
    pub skipped: Vec<SkippedBlock>,
}

#[derive(Debug, Serialize)]
pub struct ProcessReport {
    pub run_id: Uuid,
    pub source: PathBuf,
    pub page_count: usize,
    pub attempts: u32,
    #[serde(flatten)]
    pub split: SplitReport,
    /// `None` when some block could not be written and the source was left in place.
    pub archived_to: Option<PathBuf>,
}

pub struct DocumentProcessor {
    config: Config,
    extractor: FieldExtractor,
    compositor: Compositor,
}

impl DocumentProcessor {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(DocumentProcessor {
            extractor: FieldExtractor::new(&config.extraction)?,
            compositor: Compositor::new(&config.overlay),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Process one source document with the configured overlay, output and
    /// archive locations.
    pub fn process(&self, path: &Path) -> Result<ProcessReport, ProcessError> {
        let run_id = Uuid::new_v4();
        let span = info_span!(target: PROCESSOR, "process_document", %run_id, path = %path.display());
        let _enter = span.enter();
        info!(target: PROCESSOR, "new document, splitting into blocks");

        let paths = &self.config.paths;
        let overlay = OverlayImage::open(&paths.overlay_image)
            .map(Arc::new)
            .map_err(|source| ProcessError::OverlayUnreadable {
                path: paths.overlay_image.clone(),
                source,
            })?;

        let (source, attempts) =
            with_retry(&self.config.retry, path, |_| PdfDocument::open(path))?;

        let mut writer = BlockWriter::new(&paths.output_dir, &self.config.output);
        let split = self.split(&source, &overlay, &mut writer);

        let archived_to = if split.skipped.is_empty() {
            Some(archive_document(path, paths.archive_dir.as_deref())?)
        } else {
            warn!(
                target: PROCESSOR,
                skipped = split.skipped.len(),
                "some blocks were not written, source left in place"
            );
            None
        };

        info!(
            target: PROCESSOR,
            artifacts = split.artifacts.len(),
            dropped = split.dropped.len(),
            "processing finished"
        );
        Ok(ProcessReport {
            run_id,
            source: path.to_path_buf(),
            page_count: source.page_count(),
            attempts,
            split,
            archived_to,
        })
    }

    /// Run every non-trailer page of `source` through extraction and
    /// segmentation, stamping and writing each sealed block.
    pub fn split<S>(
        &self,
        source: &S,
        overlay: &Arc<OverlayImage>,
        writer: &mut BlockWriter,
    ) -> SplitReport
    where
        S: DocumentSource + ?Sized,
    {
        // The last page is a summary without content
        let total = source.page_count().saturating_sub(1);
        let mut report = SplitReport {
            pages_processed: total,
            ..SplitReport::default()
        };
        let mut segmenter = Segmenter::new(self.config.segmentation.clone());

        for index in 0..total {
            // An unreadable page still takes its place in the sequence, with no text,
            // so blocks stay contiguous
            let page = source.page(index).unwrap_or_else(|e| {
                warn!(target: PROCESSOR, page = index + 1, error = %e, "page unreadable, using fallbacks");
                Page::new(index)
            });
            let text = source.page_text(index).unwrap_or_else(|e| {
                warn!(target: PROCESSOR, page = index + 1, error = %e, "no text for page, using fallbacks");
                String::new()
            });

            let fields = self.extractor.extract(&text);
            debug!(
                target: PROCESSOR,
                page = index + 1,
                identifier = ?fields.identifier,
                group_key = ?fields.group_key,
                rejected_key = ?fields.rejected_key,
                "fields extracted"
            );

            let step = segmenter.push(page, fields);
            if let Disposition::Dropped(reason) = step.disposition {
                report.dropped.push(DroppedPage {
                    page: index,
                    reason,
                });
            }
            if let Some(block) = step.sealed {
                self.emit(block, source, overlay, writer, &mut report);
            }
        }

        if let Some(block) = segmenter.finish() {
            self.emit(block, source, overlay, writer, &mut report);
        }
        if source.page_count() > 0 {
            info!(target: PROCESSOR, page = total + 1, "last page is the summary, skipped");
        }

        report
    }

    fn emit<S>(
        &self,
        block: PageBlock,
        source: &S,
        overlay: &Arc<OverlayImage>,
        writer: &mut BlockWriter,
        report: &mut SplitReport,
    ) where
        S: DocumentSource + ?Sized,
    {
        let block = block.map_last_page(|page| self.compositor.composite(page, overlay));
        match writer.write(&block, source) {
            Ok(artifact) => report.artifacts.push(artifact),
            Err(e) => {
                warn!(
                    target: PROCESSOR,
                    identifier = %block.identifier,
                    first_page = block.start_index() + 1,
                    error = %e,
                    "block skipped"
                );
                report.skipped.push(SkippedBlock {
                    identifier: block.identifier.clone(),
                    group_key: block.group_key.clone(),
                    pages: block.page_indices(),
                    error: e.to_string(),
                });
            }
        }
    }
}

/// Call `load` up to `retry.max_attempts` times, sleeping `retry.delay_ms`
/// between attempts. Returns the value and the attempt that produced it.
pub fn with_retry<T, F>(retry: &RetryConfig, path: &Path, mut load: F) -> Result<(T, u32), ProcessError>
where
    F: FnMut(u32) -> Result<T, SourceError>,
{
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match load(attempt) {
            Ok(value) => return Ok((value, attempt)),
            Err(source) if attempt >= max_attempts => {
                return Err(ProcessError::UnreadableDocument {
                    path: path.to_path_buf(),
                    attempts: attempt,
                    source,
                });
            }
            Err(e) => {
                warn!(
                    target: PROCESSOR,
                    attempt,
                    delay_ms = retry.delay_ms,
                    error = %e,
                    "document not readable yet, retrying"
                );
                thread::sleep(Duration::from_millis(retry.delay_ms));
                attempt += 1;
            }
        }
    }
}

/// Move `path` into `archive_dir` (default: `PROCESSED` next to it).
///
/// Falls back to copy and remove when a rename is not possible, e.g. across
/// filesystems.
pub fn archive_document(path: &Path, archive_dir: Option<&Path>) -> Result<PathBuf, ProcessError> {
    let dir = match archive_dir {
        Some(dir) => dir.to_path_buf(),
        None => path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("PROCESSED"),
    };
    let target = match path.file_name() {
        Some(name) => dir.join(name),
        None => dir.clone(),
    };
    let failure = |source: io::Error| ProcessError::ArchiveFailure {
        path: path.to_path_buf(),
        target: target.clone(),
        source,
    };

    if path.file_name().is_none() {
        return Err(failure(io::Error::new(
            io::ErrorKind::InvalidInput,
            "source path has no file name",
        )));
    }
    fs::create_dir_all(&dir).map_err(failure)?;
    if let Err(e) = fs::rename(path, &target) {
        debug!(target: PROCESSOR, error = %e, "rename failed, copying instead");
        fs::copy(path, &target).map_err(failure)?;
        fs::remove_file(path).map_err(failure)?;
    }

    info!(target: PROCESSOR, archived_to = %target.display(), "source archived");
    Ok(target)
}
