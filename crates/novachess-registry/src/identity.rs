//! User identity: permanent accounts and one-game temporary ids.

use std::fmt;

use rand::Rng;

/// Who a connection speaks for.
///
/// A session survives reconnects by *identity*, not by transport: the
/// registry, the matchmaking queue, and every game session key on this
/// type, never on a connection id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// A permanent user id, stable across sessions, resolvable through
    /// the account store.
    Account(String),

    /// A server-generated id for an anonymous user, valid only for the
    /// lifetime of one game. Assigned when the anonymous user becomes a
    /// game participant and announced via `assign_temp_id`.
    Temp(String),
}

impl Identity {
    /// The raw id string as it appears on the wire (opponent `id`
    /// fields, account-store keys).
    pub fn as_str(&self) -> &str {
        match self {
            Self::Account(uid) | Self::Temp(uid) => uid,
        }
    }

    /// Returns `true` for temporary (anonymous) identities.
    pub fn is_temp(&self) -> bool {
        matches!(self, Self::Temp(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Account(uid) => write!(f, "user-{uid}"),
            Self::Temp(uid) => write!(f, "temp-{uid}"),
        }
    }
}

/// Generates a fresh temporary identity: 32 hex chars, 128 bits of
/// entropy, so collisions and guesses are both infeasible.
pub fn generate_temp_identity() -> Identity {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    Identity::Temp(bytes.iter().map(|b| format!("{b:02x}")).collect())
}
