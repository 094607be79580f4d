//! Entity cache and permission resolution for the [Discord](https://discord.com) API.
//!
//! A Discord client sees server-side state through two channels: full
//! snapshots fetched on demand over the REST API, and incremental updates
//! pushed over a persistent gateway connection. This crate reconciles both
//! into one locally consistent view and answers questions against it:
//! effective permissions, who can see a channel, what was said recently.
//!
//! Transport stays outside. Decode gateway payloads into [`model::Event`]
//! values and feed them to [`State::update`]; implement [`MessageFetcher`]
//! and [`model::MemberFetcher`] on your REST client where message backfill
//! and on-demand member refreshes should reach the network.
//!
//! Every update carries an [`model::UpdateSource`], and state owned by the
//! gateway wins: a `Snapshot` payload applied to an attached entity is
//! dropped, so a refresh racing the event stream can never roll fresher
//! streamed state back. `Stream` and `Creation` payloads always apply.

#![warn(missing_docs)]
#![allow(deprecated)]

mod error;
mod messages;
mod permissions;
mod state;

macro_rules! cdn_concat {
    ($e:expr) => {
        // Out of everything, only the CDN still uses the old domain.
        concat!("https://cdn.discordapp.com", $e)
    };
}

/// Struct and enum definitions of values in the Discord model.
pub mod model {
    mod event;
    pub use self::event::*;

    mod frozen;
    pub use frozen::*;

    mod live;
    pub use live::*;
}

mod serial;

pub use error::{Error, Result};
pub use messages::{GetMessages, MessageCache, MessageFetcher};
pub use permissions::{resolve_channel, resolve_server};
pub use serial::Optional;
pub use state::State;
