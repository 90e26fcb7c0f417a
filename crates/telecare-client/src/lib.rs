// Real-time client core for the telecare portal.
//
// Ties the engines together: presence, message sync, the notification
// relay and call signaling, all fed by one inbound event stream from
// the transport.

pub mod client;
pub mod config;
pub mod conversations;
pub mod messages;
pub mod notifications;

use tracing_subscriber::{fmt, EnvFilter};

pub use client::{spawn_event_loop, PortalClient};
pub use config::ClientConfig;
pub use conversations::{Conversation, ConversationList};
pub use messages::{MessageSyncEngine, PageMeta};
pub use notifications::NotificationRelay;

/// Install the process-wide tracing subscriber. `RUST_LOG` overrides
/// the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "telecare_client=debug,telecare_transport=debug,telecare_api=info,telecare_media=info,warn",
        )
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
