//! Host events as seen by the bridge.

use std::fmt;

/// Numeric event kind, in the host's numbering.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EventType(pub u16);

impl EventType {
    /// Reserved kind posted by the foreign side to ask the host to delete a
    /// proxy whose foreign value is going away.
    pub const FOREIGN_DELETE: EventType = EventType(513);

    /// First kind available to applications.
    pub const USER: EventType = EventType(1000);

    pub fn is_foreign_delete(self) -> bool {
        self == Self::FOREIGN_DELETE
    }
}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_foreign_delete() {
            write!(f, "EventType::FOREIGN_DELETE")
        } else {
            write!(f, "EventType({})", self.0)
        }
    }
}

/// An event delivered to a host object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    kind: EventType,
    accepted: bool,
}

impl Event {
    pub fn new(kind: EventType) -> Self {
        Self {
            kind,
            accepted: false,
        }
    }

    /// The reserved deletion request.
    pub fn foreign_delete() -> Self {
        Self::new(EventType::FOREIGN_DELETE)
    }

    pub fn kind(&self) -> EventType {
        self.kind
    }

    pub fn accept(&mut self) {
        self.accepted = true;
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreign_delete_is_reserved_kind() {
        let event = Event::foreign_delete();
        assert_eq!(event.kind(), EventType(513));
        assert!(event.kind().is_foreign_delete());
        assert!(!event.is_accepted());
        assert!(!EventType::USER.is_foreign_delete());
    }

    #[test]
    fn debug_names_reserved_kind() {
        assert_eq!(format!("{:?}", EventType::FOREIGN_DELETE), "EventType::FOREIGN_DELETE");
        assert_eq!(format!("{:?}", EventType(12)), "EventType(12)");
    }
}
