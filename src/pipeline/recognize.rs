//! Digit recognition for one table row.
//!
//! The recogniser returns raw text; [`parse_digits`] keeps only ASCII digits
//! and parses them as a count. A read with no digits (or one too large for a
//! `u32`) is reported as `None` so the caller can record `0` and flag the
//! category as unread. Only a failure of the engine itself is an error.

use crate::config::ExtractionConfig;
use crate::error::StageError;
use image::{DynamicImage, GrayImage, ImageFormat};
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::trace;

/// Reads the text printed in a single-line row image.
pub trait DigitRecognizer: Send + Sync {
    fn recognize_text(&self, row: &GrayImage) -> Result<String, StageError>;
}

/// Recognise `row` and parse it as a count.
pub fn read_count(recognizer: &dyn DigitRecognizer, row: &GrayImage) -> Result<Option<u32>, StageError> {
    let text = recognizer.recognize_text(row)?;
    let value = parse_digits(&text);
    trace!("OCR {:?} → {:?}", text.trim(), value);
    Ok(value)
}

/// Like [`read_count`], with an unreadable row counted as `0`.
pub fn recognize_int(recognizer: &dyn DigitRecognizer, row: &GrayImage) -> Result<u32, StageError> {
    Ok(read_count(recognizer, row)?.unwrap_or(0))
}

/// Keep the ASCII digits of `text` and parse them.
///
/// `None` when no digit survives or the number overflows `u32`.
pub fn parse_digits(text: &str) -> Option<u32> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// The `tesseract` command-line engine, one process per row.
///
/// The row is piped in as PNG and read in single-line mode (`--psm 7`) with a
/// digits-only whitelist.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    bin: PathBuf,
    language: String,
}

impl TesseractCli {
    pub fn new(bin: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            language: language.into(),
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(&config.tesseract_bin, &config.ocr_language)
    }

    fn encode_png(row: &GrayImage) -> Result<Vec<u8>, StageError> {
        let mut png = Vec::new();
        DynamicImage::ImageLuma8(row.clone())
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| StageError::Recognize(format!("PNG encode failed: {e}")))?;
        Ok(png)
    }
}

impl DigitRecognizer for TesseractCli {
    fn recognize_text(&self, row: &GrayImage) -> Result<String, StageError> {
        let png = Self::encode_png(row)?;

        let mut child = Command::new(&self.bin)
            .args(["stdin", "stdout", "--psm", "7", "-l"])
            .arg(&self.language)
            .args(["-c", "tessedit_char_whitelist=0123456789"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                StageError::Recognize(format!(
                    "failed to start '{}': {e}. Is tesseract installed and on PATH?",
                    self.bin.display()
                ))
            })?;

        // Dropping stdin at the end of the block closes the pipe.
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&png)
                .map_err(|e| StageError::Recognize(format!("writing to tesseract: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| StageError::Recognize(format!("waiting for tesseract: {e}")))?;

        if !output.status.success() {
            return Err(StageError::Recognize(format!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedText(&'static str);

    impl DigitRecognizer for FixedText {
        fn recognize_text(&self, _row: &GrayImage) -> Result<String, StageError> {
            Ok(self.0.to_string())
        }
    }

    struct Broken;

    impl DigitRecognizer for Broken {
        fn recognize_text(&self, _row: &GrayImage) -> Result<String, StageError> {
            Err(StageError::Recognize("engine crashed".into()))
        }
    }

    #[test]
    fn parses_noisy_digit_reads() {
        assert_eq!(parse_digits("478\n"), Some(478));
        assert_eq!(parse_digits(" 1 2 0 "), Some(120));
        assert_eq!(parse_digits("l2O5"), Some(25));
        assert_eq!(parse_digits("007"), Some(7));
    }

    #[test]
    fn empty_or_overflowing_reads_are_none() {
        assert_eq!(parse_digits(""), None);
        assert_eq!(parse_digits("--\n\x0c"), None);
        assert_eq!(parse_digits("99999999999"), None);
    }

    #[test]
    fn read_count_separates_unread_from_failure() {
        let row = GrayImage::new(10, 10);
        assert_eq!(read_count(&FixedText("340"), &row).unwrap(), Some(340));
        assert_eq!(read_count(&FixedText(""), &row).unwrap(), None);
        assert!(matches!(
            read_count(&Broken, &row),
            Err(StageError::Recognize(_))
        ));
    }

    #[test]
    fn recognize_int_defaults_to_zero() {
        let row = GrayImage::new(10, 10);
        assert_eq!(recognize_int(&FixedText("12"), &row).unwrap(), 12);
        assert_eq!(recognize_int(&FixedText("?"), &row).unwrap(), 0);
    }

    #[test]
    fn missing_binary_is_a_recognize_error() {
        let engine = TesseractCli::new("/nonexistent/tesseract-bin", "eng");
        let err = engine.recognize_text(&GrayImage::new(8, 8)).unwrap_err();
        assert!(matches!(err, StageError::Recognize(ref m) if m.contains("failed to start")));
    }

    #[test]
    fn png_encoding_of_row() {
        let png = TesseractCli::encode_png(&GrayImage::new(4, 2)).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
}
