//! Frame, timestamp and media-format types shared across the sink.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timestamp representation for media frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    /// Microseconds on the presentation timeline
    pub micros: i64,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp { micros: 0 };

    /// Create a new timestamp from microseconds
    pub fn from_micros(micros: i64) -> Self {
        Self { micros }
    }

    /// Create a timestamp from a duration since the timeline origin
    pub fn from_duration(duration: Duration) -> Self {
        Self {
            micros: duration.as_micros() as i64,
        }
    }

    /// Convert to duration
    pub fn as_duration(&self) -> Duration {
        Duration::from_micros(self.micros.max(0) as u64)
    }

    /// Calculate the absolute difference between two timestamps
    pub fn diff(&self, other: Timestamp) -> Duration {
        let diff_micros = (self.micros - other.micros).abs();
        Duration::from_micros(diff_micros as u64)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}µs", self.micros)
    }
}

/// Major type of a media stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    /// Video frame data
    Video,
    /// Audio sample data
    Audio,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Video => write!(f, "Video"),
            MediaKind::Audio => write!(f, "Audio"),
        }
    }
}

/// Pixel layout of an uncompressed or lightly compressed capture frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Yv12,
    Yuy2,
    Iyuv,
    Rgb24,
    Argb,
    Mjpeg,
    Nv12,
    Unknown,
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PixelFormat::Yv12 => "YV12",
            PixelFormat::Yuy2 => "YUY2",
            PixelFormat::Iyuv => "IYUV",
            PixelFormat::Rgb24 => "RGB24",
            PixelFormat::Argb => "ARGB",
            PixelFormat::Mjpeg => "MJPEG",
            PixelFormat::Nv12 => "NV12",
            PixelFormat::Unknown => "Unknown",
        };
        write!(f, "{name}")
    }
}

/// Negotiated media type of a stream: major type, subtype and frame
/// geometry. The sink accepts one at a time; replacing it mid-stream is
/// ordered against in-flight samples (see
/// [`StreamSink::set_media_type`](crate::sink::stream::StreamSink::set_media_type)).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFormat {
    pub kind: MediaKind,
    pub subtype: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl VideoFormat {
    /// Create a video-major format
    pub fn video(subtype: PixelFormat, width: u32, height: u32, frame_rate: u32) -> Self {
        Self {
            kind: MediaKind::Video,
            subtype,
            width,
            height,
            frame_rate,
        }
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }
}

impl std::fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}x{}@{} {}",
            self.kind, self.width, self.height, self.frame_rate, self.subtype
        )
    }
}

/// A single captured video frame with timing information
#[derive(Clone)]
pub struct MediaFrame {
    /// Raw frame data
    pub data: Bytes,

    /// Presentation timestamp - when this frame should be displayed
    pub pts: Timestamp,

    /// Decode timestamp - may differ from PTS due to B-frames
    pub dts: Timestamp,

    /// Whether this is a keyframe / sync point
    pub keyframe: bool,

    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,
}

impl MediaFrame {
    /// Create a new video frame
    pub fn video(
        data: Bytes,
        pts: Timestamp,
        dts: Timestamp,
        keyframe: bool,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            data,
            pts,
            dts,
            keyframe,
            width,
            height,
        }
    }

    /// Get the size of the frame data in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Debug for MediaFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaFrame")
            .field("pts", &self.pts)
            .field("dts", &self.dts)
            .field("keyframe", &self.keyframe)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("size", &self.size())
            .finish()
    }
}
