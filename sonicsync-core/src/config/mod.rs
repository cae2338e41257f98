mod engine_desc;
mod sync_desc;

pub use engine_desc::EngineDesc;
#[cfg(feature = "device")]
pub use engine_desc::OutputDesc;
pub use sync_desc::{AxisConvention, EmitterBinding, SinkDesc, SyncDesc};
