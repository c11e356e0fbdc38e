//! Run outputs: the CSV score log, debug images, timestamp formatting.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::GrayImage;

use crate::error::StillscanError;

/// Append-per-batch `index,score` CSV writer.
///
/// The file is truncated when the log is created, at the start of the run;
/// batches then append in order, so the finished file covers every scored
/// frame with global indices and no gaps.
pub(crate) struct ScoreLog {
    writer: BufWriter<File>,
}

impl ScoreLog {
    pub(crate) fn create(path: &Path) -> Result<Self, StillscanError> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Write one batch of scores; `offset` is the global index of the
    /// batch's first frame.
    pub(crate) fn append(&mut self, offset: u64, scores: &[f32]) -> Result<(), StillscanError> {
        for (local, score) in scores.iter().enumerate() {
            writeln!(self.writer, "{},{}", offset + local as u64, score)?;
        }
        Ok(())
    }

    pub(crate) fn flush(&mut self) -> Result<(), StillscanError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Format whole seconds as `MM:SS`.
///
/// Minutes are not capped at 59: two hours formats as `120:00`.
///
/// # Example
///
/// ```
/// assert_eq!(stillscan::format_timestamp(65), "01:05");
/// ```
pub fn format_timestamp(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Best-effort save of a debug raster as a PNG under `dir`.
///
/// Debug artifacts never fail the run; errors are logged and swallowed.
pub(crate) fn save_debug_image(dir: &Path, name: &str, raster: &GrayImage) {
    let path = dir.join(name);
    if let Err(error) = std::fs::create_dir_all(dir) {
        log::warn!("failed to create debug directory {}: {error}", dir.display());
        return;
    }
    if let Err(error) = raster.save(&path) {
        log::warn!("failed to save debug image {}: {error}", path.display());
        return;
    }
    log::debug!("saved debug image {}", path.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_timestamp(0), "00:00");
        assert_eq!(format_timestamp(9), "00:09");
        assert_eq!(format_timestamp(65), "01:05");
        assert_eq!(format_timestamp(600), "10:00");
        assert_eq!(format_timestamp(3723), "62:03");
    }

    #[test]
    fn log_appends_batches_with_global_indices() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.csv");

        let mut log = ScoreLog::create(&path).unwrap();
        log.append(0, &[1.0, 0.5]).unwrap();
        log.append(2, &[0.25]).unwrap();
        log.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec!["0,1", "1,0.5", "2,0.25"]);
    }

    #[test]
    fn creating_the_log_truncates_previous_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.csv");
        std::fs::write(&path, "999,0.1\n").unwrap();

        let mut log = ScoreLog::create(&path).unwrap();
        log.append(0, &[0.75]).unwrap();
        log.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "0,0.75\n");
    }

    #[test]
    fn debug_image_lands_under_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let raster = GrayImage::from_pixel(4, 4, image::Luma([200]));
        save_debug_image(dir.path(), "reference_grayscale.png", &raster);

        let saved = image::open(dir.path().join("reference_grayscale.png"))
            .unwrap()
            .to_luma8();
        assert_eq!(saved.dimensions(), (4, 4));
        assert_eq!(saved.get_pixel(0, 0).0, [200]);
    }

    #[test]
    fn debug_image_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"file").unwrap();
        let raster = GrayImage::from_pixel(2, 2, image::Luma([1]));
        // The target "directory" is a file; saving must not panic.
        save_debug_image(&blocker, "frame.png", &raster);
    }
}
