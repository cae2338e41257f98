//! Event types for SonicSync

use crate::engine::EmitterId;
use std::fmt;

/// Which engine entity a pose is destined for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PoseRole {
    Listener,
    Emitter(EmitterId),
}

impl fmt::Display for PoseRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listener => write!(f, "listener"),
            Self::Emitter(id) => write!(f, "emitter {}", id),
        }
    }
}

/// Notifications published to subscribers of a
/// [`FrameSyncController`](crate::FrameSyncController).
///
/// Node events are edge-triggered: one `NodeLost` when a tracked node disappears from
/// the scene, one `NodeFound` when it comes back.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Started,
    Stopped,
    NodeLost { role: PoseRole },
    NodeFound { role: PoseRole },
}

impl SyncEvent {
    pub fn role(&self) -> Option<&PoseRole> {
        match self {
            Self::NodeLost { role } | Self::NodeFound { role } => Some(role),
            _ => None,
        }
    }

    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::Started | Self::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_events_carry_role() {
        let lost = SyncEvent::NodeLost {
            role: PoseRole::Emitter(EmitterId::from("src")),
        };
        assert!(!lost.is_lifecycle());
        assert_eq!(lost.role().map(ToString::to_string).as_deref(), Some("emitter src"));

        assert!(SyncEvent::Started.is_lifecycle());
        assert!(SyncEvent::Stopped.role().is_none());
    }
}
