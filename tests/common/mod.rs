#![allow(dead_code)]

use std::path::PathBuf;

use dsi_split::Config;
use tempfile::TempDir;

use crate::setup::{write_test_overlay, write_test_pdf, PdfConfig};

/// A throwaway watch/output/signature layout mirroring the default `temp/` tree.
pub struct Workspace {
    pub root: TempDir,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub overlay: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let input_dir = root.path().join("input_pdf");
        let output_dir = root.path().join("output_pdf");
        let signature_dir = root.path().join("signature");
        std::fs::create_dir_all(&input_dir).unwrap();
        std::fs::create_dir_all(&signature_dir).unwrap();

        let overlay = signature_dir.join("firma.png");
        write_test_overlay(&overlay, 120, 60);

        Workspace {
            root,
            input_dir,
            output_dir,
            overlay,
        }
    }

    pub fn add_pdf(&self, name: &str, config: &PdfConfig) -> PathBuf {
        let path = self.input_dir.join(name);
        write_test_pdf(config, &path).unwrap();
        path
    }

    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.paths.watch_dir = self.input_dir.clone();
        config.paths.output_dir = self.output_dir.clone();
        config.paths.overlay_image = self.overlay.clone();
        config.retry.delay_ms = 0;
        config
    }
}
