pub mod camera_factory;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg_camera;
pub mod synthetic_camera;
