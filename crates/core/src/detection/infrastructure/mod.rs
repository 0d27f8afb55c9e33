pub mod detection_bridge;
pub mod detector_process;
pub mod protocol;
