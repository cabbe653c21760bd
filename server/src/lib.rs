//! Wyoming text-to-speech server.
//!
//! Connections receive `describe` and `synthesize` events; synthesized
//! audio is streamed back as `audio-start`, `audio-chunk`... `audio-stop`.

pub mod config;
pub mod error;
pub mod handler;
pub mod info;
pub mod protocol;
pub mod state;
pub mod transport;

pub use config::{ServerConfig, Startup};
pub use error::{ServerError, ServerResult};
pub use handler::{serve_connection, ConnectionHandler, HandlerState};
pub use info::Info;
pub use state::{AppState, SharedSynthesizer};
pub use transport::{BindUri, Listener};
