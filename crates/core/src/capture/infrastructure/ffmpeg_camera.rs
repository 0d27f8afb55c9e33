use crate::capture::domain::camera_device::{CameraDevice, CaptureConfig};
use crate::capture::domain::capture_error::CaptureError;
use crate::shared::frame::Frame;

#[cfg(target_os = "linux")]
const INPUT_FORMAT: &str = "v4l2";
#[cfg(target_os = "macos")]
const INPUT_FORMAT: &str = "avfoundation";
#[cfg(target_os = "windows")]
const INPUT_FORMAT: &str = "dshow";
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const INPUT_FORMAT: &str = "v4l2";

/// Captures from a platform camera through libavdevice.
///
/// Decodes whatever the device delivers (MJPEG, YUYV, ...) and converts each
/// picture to packed BGR24 before wrapping it in a [`Frame`].
pub struct FfmpegCamera {
    open: Option<OpenCapture>,
}

struct OpenCapture {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
    next_index: u64,
}

// Safety: FfmpegCamera is only used from a single thread at a time (the
// capture thread). The raw pointers inside ffmpeg types are not shared.
unsafe impl Send for FfmpegCamera {}

impl FfmpegCamera {
    pub fn new() -> Self {
        Self { open: None }
    }
}

impl Default for FfmpegCamera {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps a user-facing device name ("0", "/dev/video2", "FaceTime HD") to
/// the URL the platform input format expects.
pub fn device_url(device: &str) -> String {
    match INPUT_FORMAT {
        "v4l2" if device.chars().all(|c| c.is_ascii_digit()) => format!("/dev/video{device}"),
        "dshow" if !device.starts_with("video=") => format!("video={device}"),
        _ => device.to_string(),
    }
}

fn unavailable(config: &CaptureConfig, reason: impl std::fmt::Display) -> CaptureError {
    CaptureError::DeviceUnavailable {
        device: config.device.clone(),
        reason: reason.to_string(),
    }
}

fn open_capture(config: &CaptureConfig) -> Result<OpenCapture, CaptureError> {
    ffmpeg_next::init().map_err(|e| unavailable(config, e))?;
    ffmpeg_next::device::register_all();

    let input_format = ffmpeg_next::device::input::video()
        .find(|f| f.name() == INPUT_FORMAT)
        .ok_or_else(|| unavailable(config, format!("input format {INPUT_FORMAT} not available")))?;

    let mut options = ffmpeg_next::Dictionary::new();
    options.set("video_size", &format!("{}x{}", config.width, config.height));
    options.set("framerate", &config.fps.to_string());

    let url = device_url(&config.device);
    let ctx = ffmpeg_next::format::open_with(
        &url,
        &ffmpeg_next::format::format::Format::Input(input_format),
        options,
    )
    .map_err(|e| unavailable(config, e))?;

    let ictx = match ctx {
        ffmpeg_next::format::context::Context::Input(ictx) => ictx,
        ffmpeg_next::format::context::Context::Output(_) => {
            return Err(unavailable(config, "device opened as output"))
        }
    };

    let stream = ictx
        .streams()
        .best(ffmpeg_next::media::Type::Video)
        .ok_or_else(|| unavailable(config, "no video stream"))?;
    let stream_index = stream.index();

    let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
        .map_err(|e| unavailable(config, e))?;
    let decoder = codec_ctx.decoder().video().map_err(|e| unavailable(config, e))?;

    let width = decoder.width();
    let height = decoder.height();

    let scaler = ffmpeg_next::software::scaling::Context::get(
        decoder.format(),
        width,
        height,
        ffmpeg_next::format::Pixel::BGR24,
        width,
        height,
        ffmpeg_next::software::scaling::Flags::BILINEAR,
    )
    .map_err(|e| unavailable(config, e))?;

    if (width, height) != (config.width, config.height) {
        log::warn!(
            "Camera delivers {width}x{height} instead of requested {}x{}",
            config.width,
            config.height
        );
    }

    Ok(OpenCapture {
        ictx,
        decoder,
        scaler,
        stream_index,
        width,
        height,
        next_index: 0,
    })
}

impl OpenCapture {
    fn try_receive(&mut self) -> Result<Option<Frame>, CaptureError> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }

        let mut bgr = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler
            .run(&decoded, &mut bgr)
            .map_err(|e| CaptureError::Read(e.to_string()))?;

        let pixels = extract_bgr_pixels(&bgr, self.width, self.height);
        let frame = Frame::new(pixels, self.width, self.height, self.next_index);
        self.next_index += 1;
        Ok(Some(frame))
    }
}

impl CameraDevice for FfmpegCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CaptureError> {
        if self.open.is_some() {
            return Ok(());
        }
        self.open = Some(open_capture(config)?);
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        let capture = self.open.as_mut().ok_or(CaptureError::NotOpen)?;

        if let Some(frame) = capture.try_receive()? {
            return Ok(Some(frame));
        }

        let Some((stream, packet)) = capture.ictx.packets().next() else {
            return Ok(None);
        };
        if stream.index() != capture.stream_index {
            return Ok(None);
        }
        capture
            .decoder
            .send_packet(&packet)
            .map_err(|e| CaptureError::Read(e.to_string()))?;

        capture.try_receive()
    }

    fn release(&mut self) {
        self.open = None;
    }
}

/// Copies pixel data from an ffmpeg frame into a tightly packed BGR buffer,
/// stripping any per-row stride padding.
fn extract_bgr_pixels(
    frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = frame.stride(0);
    let data = frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
