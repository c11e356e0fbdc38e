//! FFmpeg-backed frame source.
//!
//! [`VideoSource`] wraps an FFmpeg demux/decode pipeline as a
//! [`FrameSource`]: every call to [`next_frame`](FrameSource::next_frame)
//! reads just enough packets to decode one more frame, converts it to GRAY8
//! at the reference dimensions through a bilinear scaler, and strips any
//! row padding. Decoding is strictly sequential; there is no seeking.
//!
//! Available only with the `ffmpeg` cargo feature.
//!
//! # Example
//!
//! ```no_run
//! use stillscan::{BoundarySearch, SearchOptions, VideoSource};
//!
//! let reference = image::open("intro_last_frame.png")?.to_luma8();
//! let (width, height) = reference.dimensions();
//!
//! let mut source = VideoSource::open("episode.mkv", width, height)?;
//! let search = BoundarySearch::new(reference, SearchOptions::new());
//! let outcome = search.run(&mut source)?;
//! println!("{outcome:?}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::path::Path;

use ffmpeg_next::{
    Error as FfmpegError, Packet,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::GrayImage;

use crate::error::StillscanError;
use crate::source::FrameSource;

/// Sequential decoder over the best video stream of a container.
///
/// The scaler converts pixel format and resolution in one pass, so every
/// yielded raster already matches the reference dimensions and a shape
/// mismatch can never reach the metric.
pub struct VideoSource {
    input: Input,
    decoder: VideoDecoder,
    scaler: ScalingContext,
    stream_index: usize,
    fps: f64,
    target_width: u32,
    target_height: u32,
    decoded_frame: VideoFrame,
    scaled_frame: VideoFrame,
    eof_sent: bool,
    finished: bool,
}

impl VideoSource {
    /// Open `path` and prepare to decode grayscale frames at
    /// `reference_width` × `reference_height`.
    ///
    /// Picks the container's best video stream. The frame rate comes from
    /// the stream's average frame rate, falling back to its real base rate,
    /// and reads as `0.0` when the container reports neither.
    pub fn open<P: AsRef<Path>>(
        path: P,
        reference_width: u32,
        reference_height: u32,
    ) -> Result<Self, StillscanError> {
        let path = path.as_ref();
        let display_path = path.to_path_buf();

        // Safe to call repeatedly.
        ffmpeg_next::init().map_err(|error| StillscanError::FileOpen {
            path: display_path.clone(),
            reason: format!("FFmpeg initialisation failed: {error}"),
        })?;

        let input = ffmpeg_next::format::input(&path).map_err(|error| StillscanError::FileOpen {
            path: display_path.clone(),
            reason: error.to_string(),
        })?;

        let (stream_index, fps, parameters) = {
            let stream = input
                .streams()
                .best(Type::Video)
                .ok_or(StillscanError::NoVideoStream)?;

            let frame_rate = stream.avg_frame_rate();
            let fps = if frame_rate.denominator() != 0 {
                frame_rate.numerator() as f64 / frame_rate.denominator() as f64
            } else {
                let rate = stream.rate();
                if rate.denominator() != 0 {
                    rate.numerator() as f64 / rate.denominator() as f64
                } else {
                    0.0
                }
            };

            (stream.index(), fps, stream.parameters())
        };

        let decoder_context =
            CodecContext::from_parameters(parameters).map_err(|error| StillscanError::FileOpen {
                path: display_path.clone(),
                reason: format!("Failed to read video codec parameters: {error}"),
            })?;
        let decoder =
            decoder_context
                .decoder()
                .video()
                .map_err(|error| StillscanError::FileOpen {
                    path: display_path.clone(),
                    reason: format!("Failed to create video decoder: {error}"),
                })?;

        let scaler = ScalingContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::GRAY8,
            reference_width,
            reference_height,
            ScalingFlags::BILINEAR,
        )
        .map_err(|error| StillscanError::FileOpen {
            path: display_path,
            reason: format!("Failed to initialise the grayscale scaler: {error}"),
        })?;

        Ok(Self {
            input,
            decoder,
            scaler,
            stream_index,
            fps,
            target_width: reference_width,
            target_height: reference_height,
            decoded_frame: VideoFrame::empty(),
            scaled_frame: VideoFrame::empty(),
            eof_sent: false,
            finished: false,
        })
    }

    /// Scale and convert the current decoded frame to a [`GrayImage`].
    fn convert_current_frame(&mut self) -> Result<GrayImage, StillscanError> {
        self.scaler.run(&self.decoded_frame, &mut self.scaled_frame)?;

        let buffer = gray_plane(&self.scaled_frame, self.target_width, self.target_height);
        GrayImage::from_raw(self.target_width, self.target_height, buffer).ok_or_else(|| {
            StillscanError::DecodeError(
                "Scaled frame plane was shorter than the target dimensions".to_string(),
            )
        })
    }
}

impl FrameSource for VideoSource {
    fn next_frame(&mut self) -> Result<Option<GrayImage>, StillscanError> {
        if self.finished {
            return Ok(None);
        }

        loop {
            // Drain frames the decoder has already produced.
            if self.decoder.receive_frame(&mut self.decoded_frame).is_ok() {
                return self.convert_current_frame().map(Some);
            }

            if self.eof_sent {
                self.finished = true;
                return Ok(None);
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() == self.stream_index
                        && let Err(error) = self.decoder.send_packet(&packet)
                    {
                        self.finished = true;
                        return Err(error.into());
                    }
                    // Non-video packets are silently skipped.
                }
                Err(FfmpegError::Eof) => {
                    if let Err(error) = self.decoder.send_eof() {
                        self.finished = true;
                        return Err(error.into());
                    }
                    self.eof_sent = true;
                }
                Err(_) => {
                    // Transient read error; try the next packet.
                }
            }
        }
    }

    fn frames_per_second(&self) -> f64 {
        self.fps
    }
}

/// Copy the GRAY8 plane into a tightly-packed buffer.
///
/// FFmpeg frames frequently carry per-row padding (stride > width), which
/// [`GrayImage::from_raw`] does not accept.
fn gray_plane(frame: &VideoFrame, width: u32, height: u32) -> Vec<u8> {
    let stride = frame.stride(0);
    let expected_stride = width as usize;
    let data = frame.data(0);

    if stride == expected_stride {
        data[..expected_stride * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(expected_stride * (height as usize));
        for row in 0..(height as usize) {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + expected_stride]);
        }
        buffer
    }
}
