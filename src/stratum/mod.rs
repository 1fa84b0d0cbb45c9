pub mod client;
pub mod codec;
pub mod session;

pub use client::{ClientCommand, ClientEvent};
pub use session::{SessionState, StratumSession};
