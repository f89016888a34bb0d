//! Collaborators the engine consumes but does not own.
//!
//! Identity supplies the acting person for attribution. Notification
//! delivery is fire-and-forget: the engine calls [`Notifier::notify`] after a
//! successful commit and never looks at the outcome.

mod identity;
mod notify;

pub use identity::{Identity, StaticIdentity};
pub use notify::{MemoryNotifier, NoopNotifier, NotificationEvent, Notifier, TracingNotifier};
