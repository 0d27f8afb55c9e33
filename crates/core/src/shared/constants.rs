use std::time::Duration;

pub const DEFAULT_CAPTURE_WIDTH: u32 = 1280;
pub const DEFAULT_CAPTURE_HEIGHT: u32 = 720;
pub const DEFAULT_CAPTURE_FPS: u32 = 30;

/// Delay between device reads (~30 fps). Not a real-time guarantee.
pub const DEFAULT_CAPTURE_INTERVAL: Duration = Duration::from_millis(33);

pub const DETECTOR_SCRIPT_NAME: &str = "face_detection_server.py";
pub const DETECTOR_INTERPRETER: &str = "python3";
pub const DETECTOR_SOCKET_NAME: &str = "rudolph_nose.sock";

/// Environment variable through which the launched detector learns its socket path.
pub const DETECTOR_SOCKET_ENV: &str = "RUDOLPH_SOCKET";

/// Line the detector prints on stdout once it is listening.
pub const READY_LINE: &str = r#"{"status":"ready"}"#;

pub const DEFAULT_WARM_UP: Duration = Duration::from_secs(2);
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_EXIT_GRACE: Duration = Duration::from_secs(1);
pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// How long `stop()` waits for in-flight frame processing before tearing
/// down the detector connection underneath it.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How often the pipeline worker re-checks its stop flag while idle.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Progress is logged every this many processed frames.
pub const PROGRESS_LOG_EVERY: u64 = 100;
