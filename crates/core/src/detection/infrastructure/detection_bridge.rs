use std::io::{self, BufRead, BufReader, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use crate::detection::domain::bridge_error::BridgeError;
use crate::detection::domain::detection_result::DetectionResult;
use crate::detection::domain::detection_service::{
    ConnectionState, DetectionService, ProcessState,
};
use crate::detection::domain::engine_kind::{EngineKind, EngineSelector};
use crate::detection::infrastructure::detector_process::{DetectorProcess, ProcessConfig};
use crate::detection::infrastructure::protocol::{decode_response, Request};
use crate::shared::constants::{
    CONNECT_RETRY_INTERVAL, DEFAULT_CONNECT_TIMEOUT, DETECTOR_SOCKET_NAME,
};
use crate::shared::frame::Frame;

/// Whether the bridge owns the detector process or joins one already running.
#[derive(Clone, Debug, PartialEq)]
pub enum LaunchMode {
    Spawn(ProcessConfig),
    Attach,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BridgeConfig {
    pub socket_path: PathBuf,
    pub launch: LaunchMode,
    pub connect_timeout: Duration,
    /// Upper bound on one response. Expiry drops the connection, since a
    /// late reply would otherwise be read as the answer to the next request.
    pub response_timeout: Option<Duration>,
    pub initial_engine: EngineKind,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            socket_path: std::env::temp_dir().join(DETECTOR_SOCKET_NAME),
            launch: LaunchMode::Spawn(ProcessConfig::default()),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            response_timeout: None,
            initial_engine: EngineKind::default(),
        }
    }
}

struct Link {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
}

impl Link {
    fn open(stream: UnixStream, response_timeout: Option<Duration>) -> io::Result<(Self, UnixStream)> {
        stream.set_read_timeout(response_timeout)?;
        let abort = stream.try_clone()?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok((
            Self {
                reader,
                writer: stream,
            },
            abort,
        ))
    }

    fn send(&mut self, line: &str) -> io::Result<()> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        self.writer.write_all(&buf)?;
        self.writer.flush()
    }

    /// One request line out, exactly one response line back.
    fn exchange(&mut self, line: &str) -> io::Result<String> {
        self.send(line)?;

        let mut response = String::new();
        if self.reader.read_line(&mut response)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "detector closed the connection",
            ));
        }
        Ok(response)
    }
}

/// Client side of the detector link: process lifecycle plus a single-flight
/// request/response call over a Unix domain socket.
///
/// The `link` mutex is the single-flight guard. The protocol carries no
/// request ids, so at most one request may be outstanding per connection.
/// A separate clone of the socket (`abort`) lets `stop` unblock a call that
/// is waiting for its response.
pub struct DetectionBridge {
    config: BridgeConfig,
    engine: EngineSelector,
    link: Mutex<Option<Link>>,
    abort: Mutex<Option<UnixStream>>,
    state: Mutex<ConnectionState>,
    process: Mutex<Option<DetectorProcess>>,
    process_state: Mutex<ProcessState>,
    lifecycle: Mutex<()>,
}

impl DetectionBridge {
    pub fn new(config: BridgeConfig) -> Self {
        let engine = EngineSelector::new(config.initial_engine);
        Self::with_selector(config, engine)
    }

    /// Shares an existing engine selection, e.g. one held by a UI thread.
    pub fn with_selector(config: BridgeConfig, engine: EngineSelector) -> Self {
        Self {
            config,
            engine,
            link: Mutex::new(None),
            abort: Mutex::new(None),
            state: Mutex::new(ConnectionState::Disconnected),
            process: Mutex::new(None),
            process_state: Mutex::new(ProcessState::NotStarted),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn engine_selector(&self) -> EngineSelector {
        self.engine.clone()
    }

    pub fn process_state(&self) -> ProcessState {
        *lock(&self.process_state)
    }

    fn set_state(&self, state: ConnectionState) {
        *lock(&self.state) = state;
    }

    fn ensure_process(&self, config: &ProcessConfig) -> Result<(), BridgeError> {
        let mut slot = lock(&self.process);
        if let Some(process) = slot.as_mut() {
            if process.is_running() {
                log::info!("Reusing running detector process {}", process.id());
                process.mark_ready();
                *lock(&self.process_state) = process.state();
                return Ok(());
            }
            log::warn!("Detector process {} has exited; relaunching", process.id());
        }

        *lock(&self.process_state) = ProcessState::Starting;
        match DetectorProcess::launch(config, &self.config.socket_path) {
            Ok(process) => {
                *lock(&self.process_state) = process.state();
                *slot = Some(process);
                Ok(())
            }
            Err(e) => {
                *lock(&self.process_state) = ProcessState::Stopped;
                *slot = None;
                Err(e)
            }
        }
    }

    fn stop_process(&self) {
        let LaunchMode::Spawn(config) = &self.config.launch else {
            return;
        };
        let mut slot = lock(&self.process);
        let Some(process) = slot.as_mut() else {
            return;
        };
        *lock(&self.process_state) = ProcessState::Stopping;
        let state = process.shutdown(config.exit_grace, config.kill_on_stop);
        *lock(&self.process_state) = state;
        // A detector that outlives the grace period stays tracked so the
        // next start reuses it instead of launching a second one.
        if state == ProcessState::Stopped {
            slot.take();
        }
    }

    fn connect(&self) -> Result<UnixStream, BridgeError> {
        connect_with_timeout(&self.config.socket_path, self.config.connect_timeout)
    }

    /// Drops the current link after an I/O failure. The next session starts
    /// from a fresh stream, never from a half-written request.
    fn mark_lost(&self) {
        lock(&self.abort).take();
        self.set_state(ConnectionState::Disconnected);
    }

    fn interpret(line: &str, engine: EngineKind) -> DetectionResult {
        match decode_response(line) {
            Ok(Some((landmarks, confidence))) => {
                DetectionResult::detected(landmarks, confidence, engine)
            }
            Ok(None) => DetectionResult::not_detected(engine),
            Err(e) => {
                log::warn!("Face detection failed: {e}");
                DetectionResult::not_detected(engine)
            }
        }
    }
}

impl DetectionService for DetectionBridge {
    /// Launches the detector (unless attaching), waits for it to be ready,
    /// and connects. A no-op while already connected.
    fn start(&self) -> Result<(), BridgeError> {
        let _guard = lock(&self.lifecycle);

        if self.connection_state() == ConnectionState::Connected {
            log::info!("Face detection service is already running");
            return Ok(());
        }

        log::info!(
            "Starting face detection service with engine: {}",
            self.engine.get()
        );
        self.set_state(ConnectionState::Connecting);

        if let LaunchMode::Spawn(process_config) = &self.config.launch {
            if let Err(e) = self.ensure_process(process_config) {
                log::error!("Failed to start face detection service: {e}");
                self.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        }

        let stream = match self.connect() {
            Ok(stream) => stream,
            Err(e) => {
                log::error!("Failed to start face detection service: {e}");
                self.stop_process();
                self.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let (link, abort) = Link::open(stream, self.config.response_timeout).map_err(|e| {
            self.stop_process();
            self.set_state(ConnectionState::Disconnected);
            BridgeError::ConnectionLost(e.to_string())
        })?;

        *lock(&self.link) = Some(link);
        *lock(&self.abort) = Some(abort);
        self.set_state(ConnectionState::Connected);
        log::info!("Face detection service started successfully");
        Ok(())
    }

    /// Sends `shutdown` best-effort and closes the stream. If a `detect`
    /// call is waiting for its response, the socket is shut down first so
    /// that call fails promptly with `ConnectionLost`.
    fn stop(&self) {
        let _guard = lock(&self.lifecycle);

        let connected = self.connection_state() == ConnectionState::Connected;
        if !connected && lock(&self.process).is_none() {
            return;
        }

        log::info!("Stopping face detection service");
        self.set_state(ConnectionState::Closing);

        let link = match self.link.try_lock() {
            Ok(mut guard) => guard.take(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().take(),
            Err(TryLockError::WouldBlock) => {
                log::info!("Aborting in-flight detection request");
                if let Some(abort) = lock(&self.abort).as_ref() {
                    let _ = abort.shutdown(Shutdown::Both);
                }
                lock(&self.link).take()
            }
        };

        if let Some(mut link) = link {
            match Request::Shutdown.to_line() {
                Ok(line) => {
                    if let Err(e) = link.send(&line) {
                        log::warn!("Could not send shutdown to detector: {e}");
                    }
                }
                Err(e) => log::warn!("Could not encode shutdown request: {e}"),
            }
            let _ = link.writer.shutdown(Shutdown::Both);
        }

        lock(&self.abort).take();
        self.stop_process();
        self.set_state(ConnectionState::Disconnected);
        log::info!("Face detection service stopped");
    }

    fn detect(&self, frame: &Frame) -> Result<DetectionResult, BridgeError> {
        let mut link_guard = lock(&self.link);
        // Read at request-construction time, under the single-flight guard.
        let engine = self.engine.get();

        let Some(link) = link_guard.as_mut() else {
            log::debug!("Face detection service is not running");
            return Ok(DetectionResult::not_detected(engine));
        };

        let line = match Request::detect(frame, engine).to_line() {
            Ok(line) => line,
            Err(e) => {
                log::warn!("Could not encode detect request: {e}");
                return Ok(DetectionResult::not_detected(engine));
            }
        };

        match link.exchange(&line) {
            Ok(response) => Ok(Self::interpret(&response, engine)),
            Err(e) => {
                link_guard.take();
                drop(link_guard);
                self.mark_lost();
                log::error!("Detector connection lost: {e}");
                Err(BridgeError::ConnectionLost(e.to_string()))
            }
        }
    }

    fn engine(&self) -> EngineKind {
        self.engine.get()
    }

    fn set_engine(&self, engine: EngineKind) {
        log::info!("Detection engine set to {engine}");
        self.engine.set(engine);
    }

    fn connection_state(&self) -> ConnectionState {
        *lock(&self.state)
    }
}

impl Drop for DetectionBridge {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Retries `connect` until it succeeds or `timeout` elapses. The listener
/// may not exist yet when a warm-up based detector is still loading.
pub fn connect_with_timeout(path: &Path, timeout: Duration) -> Result<UnixStream, BridgeError> {
    let deadline = Instant::now() + timeout;
    loop {
        match UnixStream::connect(path) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                let now = Instant::now();
                if now >= deadline {
                    log::debug!("Last connect error for {}: {e}", path.display());
                    return Err(BridgeError::ConnectionTimeout {
                        endpoint: path.display().to_string(),
                        timeout,
                    });
                }
                std::thread::sleep(CONNECT_RETRY_INTERVAL.min(deadline - now));
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
