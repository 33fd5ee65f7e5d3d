//! Salon support chat client sessions
//!
//! Used by the customer chat widget and the staff console to talk to the
//! support relay: one shared [`SupportClient`] per process, typed event
//! listeners, a message timeline that reconciles optimistic sends, and the
//! AI suggestion gateway.

pub mod config;
pub mod error;
pub mod listeners;
pub mod session;
pub mod suggestions;
pub mod timeline;
pub mod transport;

pub use config::{ClientConfig, ClientRole};
pub use error::{ClientError, ClientResult};
pub use listeners::{EventKind, ListenerId, ListenerRegistry, ListenerResult, SessionEvent};
pub use session::SupportClient;
pub use suggestions::{SuggestionGateway, SuggestionOutcome, SUGGESTIONS_UNAVAILABLE};
pub use timeline::{Applied, DedupWindow, EntryState, Timeline, TimelineEntry};
pub use transport::{Link, Transport, WsTransport};
