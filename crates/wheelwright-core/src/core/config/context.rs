use std::sync::Arc;

use anyhow::Result;

use crate::config::{Config, EnvSnapshot, GlobalOptions};
use crate::effects::{Effects, SharedEffects, SystemEffects};

/// Everything a command handler needs: options, configuration, collaborators.
pub struct CommandContext<'a> {
    pub global: &'a GlobalOptions,
    config: Config,
    effects: SharedEffects,
}

impl<'a> CommandContext<'a> {
    /// Captures the environment once and wires the system collaborators.
    pub fn new(global: &'a GlobalOptions) -> Result<Self> {
        let config = Config::from_snapshot(&EnvSnapshot::capture());
        let effects: SharedEffects = Arc::new(SystemEffects::new(&config)?);
        Ok(Self::with_effects(global, config, effects))
    }

    #[must_use]
    pub fn with_effects(global: &'a GlobalOptions, config: Config, effects: SharedEffects) -> Self {
        Self {
            global,
            config,
            effects,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn effects(&self) -> &dyn Effects {
        self.effects.as_ref()
    }
}
