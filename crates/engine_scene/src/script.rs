//! Script attachment.
//!
//! The scripting runtime lives outside the ECS core. A [`ScriptComponent`]
//! only names the script asset, carries an opaque handle to the runtime's
//! object and a [`ScriptFlags`] state mask; the core never interprets them.

use bitflags::bitflags;
use engine_component::Component;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Lifecycle state of an attached script, owned by the scripting runtime.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ScriptFlags: u32 {
        /// The runtime created the script object.
        const INITIALIZED = 1 << 0;
        /// The script source changed and is being reloaded.
        const RELOADING = 1 << 1;
        /// Compilation or initialisation failed.
        const ERRORED = 1 << 2;
        /// `update` hooks should not run.
        const PAUSED = 1 << 3;
    }
}

/// A script bound to an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptComponent {
    /// Script asset path.
    pub asset_path: String,
    /// Runtime object handle. Not persisted.
    #[serde(skip)]
    pub handle: Option<u64>,
    /// Runtime-owned state.
    pub flags: ScriptFlags,
}

impl ScriptComponent {
    /// A script for `asset_path`, not yet initialised.
    #[must_use]
    pub fn new(asset_path: impl Into<String>) -> Self {
        Self {
            asset_path: asset_path.into(),
            handle: None,
            flags: ScriptFlags::empty(),
        }
    }

    /// Returns `true` if the runtime may call into the script.
    #[must_use]
    pub fn is_runnable(&self) -> bool {
        self.handle.is_some()
            && self.flags.contains(ScriptFlags::INITIALIZED)
            && !self
                .flags
                .intersects(ScriptFlags::RELOADING | ScriptFlags::ERRORED | ScriptFlags::PAUSED)
    }
}

impl Component for ScriptComponent {
    fn type_name() -> &'static str {
        "ScriptComponent"
    }
}
