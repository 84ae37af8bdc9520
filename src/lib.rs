pub mod config;
pub mod error;
pub mod extract;
pub mod logging;
pub mod overlay;
pub mod page;
pub mod parse;
pub mod processor;
pub mod segment;
pub mod watch;
pub mod writer;

use std::path::Path;

pub use crate::config::Config;
pub use crate::error::ProcessError;
pub use crate::processor::{DocumentProcessor, ProcessReport};

/// Split one source PDF into stamped per-block PDFs under `dest_root`, then
/// archive it.
///
/// # Arguments
/// * `path` - The source document; its last page is a summary and is skipped
/// * `overlay_path` - The image stamped on the last page of every block
/// * `dest_root` - Blocks land in `<dest_root>/<identifier>/<key>.pdf`
/// * `config` - Everything else: extraction rules, placement, retry, archive
pub fn process_document(
    path: &Path,
    overlay_path: &Path,
    dest_root: &Path,
    config: &Config,
) -> Result<ProcessReport, ProcessError> {
    let mut config = config.clone();
    config.paths.overlay_image = overlay_path.to_path_buf();
    config.paths.output_dir = dest_root.to_path_buf();

    DocumentProcessor::new(config)?.process(path)
}
