use crate::engine::EmitterId;
use crate::error::{Result, SonicSyncError};
use std::collections::HashSet;

/// Which sign of the rotation's third column is treated as "forward".
///
/// Scene engines disagree on this. Pick the one matching the scene the transforms
/// come from; the same convention is applied to every node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisConvention {
    /// Right-handed, Y-up, cameras look down -Z. Forward is the negated third column.
    #[default]
    NegativeZForward,
    /// Forward is the third column as stored.
    PositiveZForward,
}

/// Ties an emitter id to the scene node whose position drives it.
#[derive(Debug, Clone, PartialEq)]
pub struct EmitterBinding {
    /// Identifier the sink and engine know the emitter by
    pub id: EmitterId,
    /// Name of the scene node to follow
    pub node: String,
}

impl EmitterBinding {
    pub fn new(id: impl Into<EmitterId>, node: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node: node.into(),
        }
    }
}

/// Configuration descriptor for a frame sync controller
#[derive(Debug, Clone)]
pub struct SyncDesc {
    /// Name of the camera node used as the listener
    pub listener_node: String,
    /// Emitters to track, each bound to a scene node
    pub emitters: Vec<EmitterBinding>,
    /// Forward axis convention of the source scene
    pub convention: AxisConvention,
}

impl Default for SyncDesc {
    fn default() -> Self {
        Self {
            listener_node: "camera".to_string(),
            emitters: vec![EmitterBinding::new("soundSource", "soundSource")],
            convention: AxisConvention::default(),
        }
    }
}

impl SyncDesc {
    pub fn new(listener_node: impl Into<String>) -> Self {
        Self {
            listener_node: listener_node.into(),
            emitters: Vec::new(),
            convention: AxisConvention::default(),
        }
    }

    pub fn emitter(mut self, id: impl Into<EmitterId>, node: impl Into<String>) -> Self {
        self.emitters.push(EmitterBinding::new(id, node));
        self
    }

    pub fn convention(mut self, convention: AxisConvention) -> Self {
        self.convention = convention;
        self
    }

    /// Checks the descriptor for wiring mistakes.
    pub fn validate(&self) -> Result<()> {
        if self.listener_node.is_empty() {
            return Err(SonicSyncError::Configuration(
                "listener node name is empty".into(),
            ));
        }

        let mut seen = HashSet::new();
        for binding in &self.emitters {
            if binding.node.is_empty() {
                return Err(SonicSyncError::Configuration(format!(
                    "emitter {} has an empty node name",
                    binding.id
                )));
            }
            if !seen.insert(&binding.id) {
                return Err(SonicSyncError::DuplicateEmitter(binding.id.to_string()));
            }
        }

        Ok(())
    }

    /// Ids of every configured emitter, in binding order.
    pub fn emitter_ids(&self) -> Vec<EmitterId> {
        self.emitters.iter().map(|b| b.id.clone()).collect()
    }
}

/// Tuning for how the sink writes into the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkDesc {
    /// Skip engine writes whose value is bit-identical to the last one applied
    pub skip_redundant_writes: bool,
    /// Normalize forward/up before handing them to the engine
    pub renormalize_orientation: bool,
}

impl Default for SinkDesc {
    fn default() -> Self {
        Self {
            skip_redundant_writes: true,
            renormalize_orientation: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_desc_is_valid() {
        let desc = SyncDesc::default();
        assert!(desc.validate().is_ok());
        assert_eq!(desc.emitter_ids(), vec![EmitterId::from("soundSource")]);
    }

    #[test]
    fn test_duplicate_emitter_rejected() {
        let desc = SyncDesc::new("camera")
            .emitter("a", "node_a")
            .emitter("a", "node_b");
        assert!(matches!(
            desc.validate(),
            Err(SonicSyncError::DuplicateEmitter(id)) if id == "a"
        ));
    }

    #[test]
    fn test_empty_names_rejected() {
        assert!(SyncDesc::new("").validate().is_err());
        assert!(SyncDesc::new("camera").emitter("a", "").validate().is_err());
    }
}
