use std::path::PathBuf;
use std::process::Command;

use image::GrayImage;
use tempfile::NamedTempFile;

use super::setup::{find_tessdata_dir, find_tesseract_executable};
use crate::config::OcrConfig;
use crate::error::ExtractionError;

/// Something that turns a grayscale image into text.
pub trait OcrEngine {
    fn recognize(&self, image: &GrayImage) -> Result<String, ExtractionError>;
}

/// Tesseract command-line backend.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    executable: PathBuf,
    tessdata_dir: PathBuf,
    language: String,
    psm: u8,
    oem: u8,
}

impl TesseractEngine {
    /// Locates Tesseract and its trained data using the given settings.
    pub fn from_config(config: &OcrConfig) -> anyhow::Result<Self> {
        let executable = find_tesseract_executable(config)?;
        let tessdata_dir = find_tessdata_dir(config)?;
        log::info!(
            "Using Tesseract {} (tessdata: {})",
            executable.display(),
            tessdata_dir.display()
        );
        Ok(Self {
            executable,
            tessdata_dir,
            language: config.language.clone(),
            psm: config.psm,
            oem: config.oem,
        })
    }

    fn command(&self, input: &std::path::Path) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg(input)
            .arg("stdout")
            .arg("--tessdata-dir")
            .arg(&self.tessdata_dir)
            .arg("-l")
            .arg(&self.language)
            .arg("--oem")
            .arg(self.oem.to_string())
            .arg("--psm")
            .arg(self.psm.to_string());
        cmd
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, image: &GrayImage) -> Result<String, ExtractionError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ExtractionError::EmptyImage);
        }

        // Tesseract reads from a file, so stage the image as a temporary PNG
        let temp_input = NamedTempFile::with_suffix(".png")?;
        image
            .save(temp_input.path())
            .map_err(|e| ExtractionError::Ocr(format!("cannot stage image: {}", e)))?;

        let output = self.command(temp_input.path()).output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::Ocr(format!("Tesseract failed: {}", stderr.trim())));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}
