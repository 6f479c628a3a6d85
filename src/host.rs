//! The mod-loader seam.
//!
//! A mod loader owns file I/O: it reads the game module, hands it to every registered
//! [`PatcherMod`] as `&mut Module`, and writes the module back only if every mod reported
//! success. Errors never cross this boundary; a mod logs why it failed and returns `false`.

use log::{error, info, warn};

use crate::{
    metadata::module::Module,
    patch::{PatchConfig, PatchTarget, Patcher},
};

/// A patch mod as seen by the mod loader.
pub trait PatcherMod {
    /// Apply the mod to the game module.
    ///
    /// Returns `true` if the module was patched and should be written back.
    fn patch(&self, module: &mut Module) -> bool;

    /// Link the game module against the mod's own module after patching.
    ///
    /// Mods that ship no code of their own keep the default, which does nothing.
    fn link(&self, _game: &mut Module, _mod_module: &mut Module) -> bool {
        true
    }
}

/// Sets `EntityAlive.MinEventContext.Self` at the end of `EntityAlive::Init`.
///
/// Without it the event context of a freshly initialised entity can carry a null `Self`
/// during the create-player stage, which surfaces as a `NullReferenceException` when the
/// first minimum-event fires.
#[derive(Debug, Clone, Default)]
pub struct CreatePlayerFix {
    target: PatchTarget,
    config: PatchConfig,
}

impl CreatePlayerFix {
    /// Creates the mod with its shipped target and the structural matcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the matcher configuration.
    #[must_use]
    pub fn with_config(mut self, config: PatchConfig) -> Self {
        self.config = config;
        self
    }

    /// The symbols this mod patches.
    #[must_use]
    pub fn target(&self) -> &PatchTarget {
        &self.target
    }
}

impl PatcherMod for CreatePlayerFix {
    fn patch(&self, module: &mut Module) -> bool {
        info!("Start patch process...{}", std::any::type_name::<Self>());

        let mut patcher = Patcher::new(self.target.clone()).with_config(self.config.clone());
        match patcher.apply(module) {
            Ok(_) => {
                info!("Patch mod complete.");
                true
            }
            Err(err) => {
                error!("{err}");
                warn!("Failed to find and modify the required method!");
                false
            }
        }
    }
}
