// duetwatch-api: Async Rust client for the RepRapFirmware HTTP polling API

pub mod client;
pub mod error;
pub mod gcode;
pub mod model;
pub mod session;
pub mod transport;

pub use client::DuetClient;
pub use error::Error;
pub use model::{ModelFlags, ModelQuery, ModelResponse, UNBOUNDED_DEPTH};
pub use session::ConnectResponse;
pub use transport::{DuetTransport, StatusHandler, StatusHandlers, TlsMode, TransportConfig};

pub use reqwest::StatusCode;
