//! Gateway intents
//!
//! The capability bitmask sent with Identify, declaring which event
//! families the gateway should deliver to this session.

use bitflags::bitflags;

bitflags! {
    /// Gateway capability bitmask
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Intents: u64 {
        /// Guild create/update/delete and role/channel changes
        const GUILDS = 1 << 0;
        /// Member join/leave/update
        const GUILD_MEMBERS = 1 << 1;
        /// Messages sent in guild channels
        const GUILD_MESSAGES = 1 << 2;
        /// Typing indicators in guild channels
        const GUILD_TYPING = 1 << 3;
        /// Presence (online status) updates
        const PRESENCES = 1 << 4;
        /// Messages sent in direct channels
        const DIRECT_MESSAGES = 1 << 5;
        /// Typing indicators in direct channels
        const DIRECT_TYPING = 1 << 6;
    }
}

impl Intents {
    /// Everything except presence updates, which are high-volume.
    #[must_use]
    pub fn standard() -> Self {
        Self::all() - Self::PRESENCES
    }
}

impl Default for Intents {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_excludes_presences() {
        let intents = Intents::standard();
        assert!(intents.contains(Intents::GUILDS));
        assert!(intents.contains(Intents::GUILD_MESSAGES));
        assert!(!intents.contains(Intents::PRESENCES));
    }

    #[test]
    fn test_bits_roundtrip() {
        let intents = Intents::GUILDS | Intents::GUILD_MESSAGES;
        assert_eq!(Intents::from_bits_truncate(intents.bits()), intents);
    }
}
