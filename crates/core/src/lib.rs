//! Live camera pipeline that overlays landmark-driven effects on faces.
//!
//! Frames flow `capture → detection → effect → sink`. Face landmarks come
//! from an external detector process reached over a Unix domain socket.

pub mod capture {
    pub mod domain {
        pub mod camera_device;
        pub mod capture_error;
        pub mod frame_subscriber;
    }
    pub mod frame_source;
    pub mod infrastructure;
    pub mod latest_frame_slot;
}

pub mod detection {
    pub mod domain {
        pub mod bridge_error;
        pub mod detection_result;
        pub mod detection_service;
        pub mod engine_kind;
    }
    pub mod infrastructure;
}

pub mod effects {
    pub mod domain {
        pub mod face_effect;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod domain {
        pub mod frame_sink;
    }
    pub mod frame_pipeline;
    pub mod infrastructure;
    pub mod pipeline_logger;
}

pub mod shared {
    pub mod constants;
    pub mod frame;
    pub mod geometry;
}
