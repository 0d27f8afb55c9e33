use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use rudolph_core::capture::domain::camera_device::CaptureConfig;
use rudolph_core::detection::domain::engine_kind::EngineKind;
use rudolph_core::detection::infrastructure::detection_bridge::{BridgeConfig, LaunchMode};
use rudolph_core::detection::infrastructure::detector_process::{
    default_script_path, ProcessConfig, Readiness,
};
use rudolph_core::effects::infrastructure::effect_factory::EffectKind;
use rudolph_core::shared::constants::{
    DEFAULT_CAPTURE_FPS, DEFAULT_CAPTURE_HEIGHT, DEFAULT_CAPTURE_WIDTH, DEFAULT_READY_TIMEOUT,
    DETECTOR_INTERPRETER, DETECTOR_SOCKET_NAME,
};

/// Persisted front-end preferences. Unknown or missing fields take defaults,
/// so older files keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub engine: EngineKind,
    pub effect: EffectKind,
    pub python: PathBuf,
    /// Detector entry script; `None` means next to the executable.
    pub script: Option<PathBuf>,
    pub socket: PathBuf,
    /// Connect to a detector that is already running instead of launching one.
    pub attach: bool,
    /// Fixed warm-up in milliseconds instead of waiting for the ready line.
    pub warm_up_ms: Option<u64>,
    pub response_timeout_ms: Option<u64>,
    pub kill_on_stop: bool,
    pub snapshot_every: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device: default_device().to_string(),
            width: DEFAULT_CAPTURE_WIDTH,
            height: DEFAULT_CAPTURE_HEIGHT,
            fps: DEFAULT_CAPTURE_FPS,
            engine: EngineKind::default(),
            effect: EffectKind::default(),
            python: PathBuf::from(DETECTOR_INTERPRETER),
            script: None,
            socket: std::env::temp_dir().join(DETECTOR_SOCKET_NAME),
            attach: false,
            warm_up_ms: None,
            response_timeout_ms: None,
            kill_on_stop: false,
            snapshot_every: 30,
        }
    }
}

/// The first hardware camera when capture support is compiled in.
fn default_device() -> &'static str {
    if cfg!(feature = "ffmpeg") {
        "0"
    } else {
        rudolph_core::capture::infrastructure::synthetic_camera::SYNTHETIC_DEVICE
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("Rudolph").join("settings.json"))
    }

    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Missing or unreadable files fall back to defaults.
    pub fn load_from(path: &Path) -> Self {
        let Ok(json) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&json) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Ignoring corrupt settings file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self) -> std::io::Result<PathBuf> {
        let path = Self::config_path().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "no config directory")
        })?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            device: self.device.clone(),
            width: self.width,
            height: self.height,
            fps: self.fps,
            interval: CaptureConfig::interval_for_fps(self.fps),
        }
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        let launch = if self.attach {
            LaunchMode::Attach
        } else {
            LaunchMode::Spawn(ProcessConfig {
                interpreter: self.python.clone(),
                script: self.script.clone().unwrap_or_else(default_script_path),
                readiness: match self.warm_up_ms {
                    Some(ms) => Readiness::WarmUp(Duration::from_millis(ms)),
                    None => Readiness::Handshake {
                        timeout: DEFAULT_READY_TIMEOUT,
                    },
                },
                kill_on_stop: self.kill_on_stop,
                ..ProcessConfig::default()
            })
        };

        BridgeConfig {
            socket_path: self.socket.clone(),
            launch,
            response_timeout: self.response_timeout_ms.map(Duration::from_millis),
            initial_engine: self.engine,
            ..BridgeConfig::default()
        }
    }
}
