//! Polling client: watches an alias and reports newly arrived messages.

pub mod runner;
pub mod session;
pub mod transport;

pub use runner::{ClientEvent, ClientRunner, ClientView, TerminalView};
pub use session::{Credentials, Effect, PollState, PollingSession};
pub use transport::{CheckTransport, HttpTransport};
