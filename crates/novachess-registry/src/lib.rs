//! Identity and session tracking for the Novachess server.
//!
//! This crate answers three questions:
//!
//! 1. **Who is this?** — [`Identity`]: a permanent account id or a
//!    server-issued temporary id ([`generate_temp_identity`]).
//! 2. **How do I reach them right now?** — [`SessionRegistry`] /
//!    [`SharedRegistry`]: identity → current outbound channel, replaced
//!    on reconnect, absent while disconnected.
//! 3. **What are they playing?** — the same registry's at-most-one
//!    active game slot per identity.
//!
//! The persistent user store is a collaborator behind the
//! [`AccountStore`] trait; [`MemoryAccountStore`] ships for tests and
//! development.

#![allow(async_fn_in_trait)]

mod error;
mod identity;
mod registry;
mod store;

pub use error::RegistryError;
pub use identity::{generate_temp_identity, Identity};
pub use registry::{
    Delivery, OutboundSender, SessionRegistry, SharedRegistry,
};
pub use store::{AccountStore, MemoryAccountStore, Outcome, Profile};
