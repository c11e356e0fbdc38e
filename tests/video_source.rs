//! FFmpeg-backed frame source tests.
//!
//! Tests require fixture files from `tests/fixtures/generate_fixtures.sh`
//! and only build with `--features ffmpeg`.

#![cfg(feature = "ffmpeg")]

use std::path::Path;

use stillscan::{FrameSource, StillscanError, VideoSource};

fn sample_video_path() -> &'static str {
    "tests/fixtures/sample_video.mp4"
}

#[test]
fn open_missing_file_reports_path() {
    let result = VideoSource::open(Path::new("definitely/not/here.mkv"), 64, 36);
    match result {
        Err(StillscanError::FileOpen { path, .. }) => {
            assert!(path.ends_with("here.mkv"));
        }
        other => panic!("Expected FileOpen error, got {other:?}"),
    }
}

#[test]
fn frames_come_out_at_reference_dimensions() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut source = VideoSource::open(Path::new(path), 320, 180).expect("Failed to open fixture");
    let frame = source
        .next_frame()
        .expect("Failed to decode")
        .expect("Fixture has no frames");
    assert_eq!(frame.dimensions(), (320, 180));
}

#[test]
fn source_reports_a_frame_rate() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let source = VideoSource::open(Path::new(path), 64, 36).expect("Failed to open fixture");
    assert!(source.frames_per_second() > 0.0);
}

#[test]
fn stream_exhausts_cleanly() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut source = VideoSource::open(Path::new(path), 64, 36).expect("Failed to open fixture");
    let mut decoded = 0u64;
    while source.next_frame().expect("Failed to decode").is_some() {
        decoded += 1;
        assert!(decoded < 100_000, "Fixture decode did not terminate");
    }
    assert!(decoded > 0);
    // Further calls stay at end-of-stream.
    assert!(source.next_frame().expect("Failed to decode").is_none());
}
