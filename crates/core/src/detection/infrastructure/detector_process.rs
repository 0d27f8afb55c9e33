use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;

use crate::detection::domain::bridge_error::BridgeError;
use crate::detection::domain::detection_service::ProcessState;
use crate::detection::infrastructure::protocol::is_ready_line;
use crate::shared::constants::{
    DEFAULT_EXIT_GRACE, DEFAULT_READY_TIMEOUT, DEFAULT_WARM_UP, DETECTOR_INTERPRETER,
    DETECTOR_SCRIPT_NAME, DETECTOR_SOCKET_ENV,
};

/// How the bridge decides the detector is ready for a connection.
#[derive(Clone, Debug, PartialEq)]
pub enum Readiness {
    /// Wait for `{"status":"ready"}` on the child's stdout.
    Handshake { timeout: Duration },
    /// Sleep a fixed interval and hope. Kept for detectors that predate
    /// the handshake.
    WarmUp(Duration),
}

impl Default for Readiness {
    fn default() -> Self {
        Readiness::Handshake {
            timeout: DEFAULT_READY_TIMEOUT,
        }
    }
}

impl Readiness {
    pub fn warm_up() -> Self {
        Readiness::WarmUp(DEFAULT_WARM_UP)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProcessConfig {
    pub interpreter: PathBuf,
    pub script: PathBuf,
    pub readiness: Readiness,
    /// How long `stop` waits for the detector to exit after `shutdown`.
    pub exit_grace: Duration,
    /// Kill the detector if it is still alive after `exit_grace`.
    pub kill_on_stop: bool,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from(DETECTOR_INTERPRETER),
            script: default_script_path(),
            readiness: Readiness::default(),
            exit_grace: DEFAULT_EXIT_GRACE,
            kill_on_stop: false,
        }
    }
}

/// `<exe dir>/python/face_detection_server.py`, falling back to the bare
/// script name in the working directory.
pub fn default_script_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .map(|dir| dir.join("python").join(DETECTOR_SCRIPT_NAME))
        .unwrap_or_else(|| PathBuf::from(DETECTOR_SCRIPT_NAME))
}

/// A running detector child process.
///
/// The child is told where to listen through an environment variable and
/// gets no command-line arguments besides its script. Its stdout and stderr
/// are forwarded to the log at debug level.
pub struct DetectorProcess {
    child: Child,
    state: ProcessState,
}

impl DetectorProcess {
    pub fn launch(config: &ProcessConfig, socket_path: &Path) -> Result<Self, BridgeError> {
        if !config.script.is_file() {
            return Err(BridgeError::ScriptNotFound(config.script.clone()));
        }

        log::info!(
            "Launching detector: {} {}",
            config.interpreter.display(),
            config.script.display()
        );

        let mut child = Command::new(&config.interpreter)
            .arg(&config.script)
            .env(DETECTOR_SOCKET_ENV, socket_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                BridgeError::ProcessLaunchFailure(format!(
                    "{}: {e}",
                    config.interpreter.display()
                ))
            })?;

        if let Some(stderr) = child.stderr.take() {
            forward_output(stderr, "stderr", None);
        }

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<()>(1);
        if let Some(stdout) = child.stdout.take() {
            forward_output(stdout, "stdout", Some(ready_tx));
        } else {
            drop(ready_tx);
        }

        let mut process = Self {
            child,
            state: ProcessState::Starting,
        };

        let ready = match config.readiness {
            Readiness::Handshake { timeout } => match ready_rx.recv_timeout(timeout) {
                Ok(()) => Ok(()),
                Err(RecvTimeoutError::Timeout) => Err(format!(
                    "detector did not report ready within {timeout:?}"
                )),
                Err(RecvTimeoutError::Disconnected) => {
                    Err("detector closed stdout before reporting ready".to_string())
                }
            },
            Readiness::WarmUp(delay) => {
                std::thread::sleep(delay);
                if process.is_running() {
                    Ok(())
                } else {
                    Err("detector exited during warm-up".to_string())
                }
            }
        };

        if let Err(reason) = ready {
            log::error!("{reason}");
            let _ = process.child.kill();
            let _ = process.child.wait();
            process.state = ProcessState::Stopped;
            return Err(BridgeError::ProcessLaunchFailure(reason));
        }

        process.state = ProcessState::Ready;
        log::info!("Detector process {} is ready", process.id());
        Ok(process)
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Returns a detector left running by an earlier `shutdown` to service.
    pub fn mark_ready(&mut self) {
        self.state = ProcessState::Ready;
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Waits up to `grace` for the child to exit on its own. Kills it
    /// afterwards only when `kill` is set; otherwise a stubborn detector is
    /// left running, stays `Stopping`, and can be reused by the caller.
    pub fn shutdown(&mut self, grace: Duration, kill: bool) -> ProcessState {
        self.state = ProcessState::Stopping;
        let deadline = Instant::now() + grace;

        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    log::info!("Detector process exited with {status}");
                    self.state = ProcessState::Stopped;
                    return self.state;
                }
                Ok(None) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(20));
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("Could not query detector process: {e}");
                    break;
                }
            }
        }

        if kill {
            log::warn!("Detector process {} did not exit; killing it", self.id());
            let _ = self.child.kill();
            let _ = self.child.wait();
            self.state = ProcessState::Stopped;
        } else {
            log::warn!(
                "Detector process {} is still running after {grace:?}; leaving it",
                self.id()
            );
        }
        self.state
    }
}

/// Drains a child pipe on its own thread so the child never blocks on a
/// full pipe. The first ready line, if any, is signalled on `ready_tx`.
fn forward_output<R: Read + Send + 'static>(
    pipe: R,
    label: &'static str,
    ready_tx: Option<crossbeam_channel::Sender<()>>,
) {
    let spawned = std::thread::Builder::new()
        .name(format!("detector-{label}"))
        .spawn(move || {
            let mut ready_tx = ready_tx;
            for line in BufReader::new(pipe).lines() {
                let Ok(line) = line else { break };
                if ready_tx.is_some() && is_ready_line(&line) {
                    if let Some(tx) = ready_tx.take() {
                        let _ = tx.send(());
                    }
                    continue;
                }
                log::debug!("detector {label}: {line}");
            }
        });

    if let Err(e) = spawned {
        log::warn!("Could not forward detector {label}: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn script(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("detector.sh");
        std::fs::write(&path, body).unwrap();
        path
    }

    fn sh_config(script: PathBuf, readiness: Readiness) -> ProcessConfig {
        ProcessConfig {
            interpreter: PathBuf::from("sh"),
            script,
            readiness,
            exit_grace: Duration::from_millis(200),
            kill_on_stop: true,
        }
    }

    fn handshake(millis: u64) -> Readiness {
        Readiness::Handshake {
            timeout: Duration::from_millis(millis),
        }
    }

    #[test]
    fn test_missing_script() {
        let config = ProcessConfig {
            script: PathBuf::from("/definitely/not/here.py"),
            ..ProcessConfig::default()
        };
        let err = DetectorProcess::launch(&config, Path::new("/tmp/x.sock")).err().unwrap();
        assert!(matches!(err, BridgeError::ScriptNotFound(_)));
    }

    #[test]
    fn test_missing_interpreter() {
        let dir = TempDir::new().unwrap();
        let config = ProcessConfig {
            interpreter: PathBuf::from("/definitely/not/python"),
            ..sh_config(script(&dir, "exit 0\n"), handshake(500))
        };
        let err = DetectorProcess::launch(&config, Path::new("/tmp/x.sock")).err().unwrap();
        assert!(matches!(err, BridgeError::ProcessLaunchFailure(_)));
    }

    #[test]
    fn test_handshake_ready() {
        let dir = TempDir::new().unwrap();
        let body = "echo 'loading models'\necho '{\"status\":\"ready\"}'\nsleep 30\n";
        let config = sh_config(script(&dir, body), handshake(5000));

        let mut process = DetectorProcess::launch(&config, Path::new("/tmp/x.sock")).unwrap();
        assert_eq!(process.state(), ProcessState::Ready);
        assert!(process.is_running());
        assert_eq!(process.shutdown(Duration::from_millis(50), true), ProcessState::Stopped);
    }

    #[test]
    fn test_socket_path_is_passed_through_environment() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("socket.txt");
        let body = format!(
            "printf '%s' \"${DETECTOR_SOCKET_ENV}\" > '{}'\necho '{{\"status\":\"ready\"}}'\nsleep 30\n",
            marker.display()
        );
        let config = sh_config(script(&dir, &body), handshake(5000));

        let mut process = DetectorProcess::launch(&config, Path::new("/tmp/rudolph-test.sock")).unwrap();
        process.shutdown(Duration::from_millis(10), true);

        assert_eq!(std::fs::read_to_string(marker).unwrap(), "/tmp/rudolph-test.sock");
    }

    #[test]
    fn test_exit_before_ready_is_launch_failure() {
        let dir = TempDir::new().unwrap();
        let config = sh_config(script(&dir, "echo 'crashed'\nexit 3\n"), handshake(5000));
        let err = DetectorProcess::launch(&config, Path::new("/tmp/x.sock")).err().unwrap();
        assert!(matches!(err, BridgeError::ProcessLaunchFailure(_)));
    }

    #[test]
    fn test_handshake_timeout() {
        let dir = TempDir::new().unwrap();
        let config = sh_config(script(&dir, "sleep 30\n"), handshake(100));

        let started = Instant::now();
        let err = DetectorProcess::launch(&config, Path::new("/tmp/x.sock")).err().unwrap();
        assert!(matches!(err, BridgeError::ProcessLaunchFailure(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_warm_up_accepts_running_process() {
        let dir = TempDir::new().unwrap();
        let config = sh_config(
            script(&dir, "sleep 30\n"),
            Readiness::WarmUp(Duration::from_millis(50)),
        );
        let mut process = DetectorProcess::launch(&config, Path::new("/tmp/x.sock")).unwrap();
        process.shutdown(Duration::from_millis(10), true);
    }

    #[test]
    fn test_warm_up_detects_early_exit() {
        let dir = TempDir::new().unwrap();
        let config = sh_config(
            script(&dir, "exit 1\n"),
            Readiness::WarmUp(Duration::from_millis(200)),
        );
        assert!(DetectorProcess::launch(&config, Path::new("/tmp/x.sock")).is_err());
    }

    #[test]
    fn test_shutdown_of_exiting_process_is_stopped() {
        let dir = TempDir::new().unwrap();
        let body = "echo '{\"status\":\"ready\"}'\nsleep 0.1\n";
        let config = sh_config(script(&dir, body), handshake(5000));
        let mut process = DetectorProcess::launch(&config, Path::new("/tmp/x.sock")).unwrap();
        assert_eq!(process.shutdown(Duration::from_secs(5), false), ProcessState::Stopped);
        assert_eq!(process.state(), ProcessState::Stopped);
    }

    #[test]
    fn test_shutdown_without_kill_leaves_stubborn_process() {
        let dir = TempDir::new().unwrap();
        let body = "echo '{\"status\":\"ready\"}'\nsleep 30\n";
        let config = sh_config(script(&dir, body), handshake(5000));
        let mut process = DetectorProcess::launch(&config, Path::new("/tmp/x.sock")).unwrap();

        assert_eq!(process.shutdown(Duration::from_millis(50), false), ProcessState::Stopping);
        assert!(process.is_running());
        process.mark_ready();
        assert_eq!(process.state(), ProcessState::Ready);

        assert_eq!(process.shutdown(Duration::from_millis(10), true), ProcessState::Stopped);
        assert!(!process.is_running());
    }

    #[test]
    fn test_default_readiness_is_handshake() {
        assert!(matches!(Readiness::default(), Readiness::Handshake { .. }));
        assert_eq!(Readiness::warm_up(), Readiness::WarmUp(DEFAULT_WARM_UP));
    }
}
