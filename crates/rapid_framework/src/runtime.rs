//! Plugin lifecycle.
//!
//! A plugin implements [`PluginRuntime`]; the host drives it through a
//! [`PluginLifecycle`], which enforces the call order
//! `preload → enable → load` on start and `disable` on stop.

use crate::error::{PluginError, PluginResult};
use async_trait::async_trait;
use tracing::{error, info};

#[async_trait]
pub trait PluginRuntime: Send + Sync {
    fn name(&self) -> &str;

    /// Runs before anything else, e.g. to register services other plugins need.
    async fn preload(&mut self) -> PluginResult<()> {
        Ok(())
    }

    async fn enable(&mut self) -> PluginResult<()>;

    /// Loads (or reloads) configuration and data.
    async fn load(&mut self) -> PluginResult<()>;

    async fn disable(&mut self) -> PluginResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Created,
    Enabled,
    Disabled,
    Failed,
}

/// Drives one plugin through its lifecycle.
pub struct PluginLifecycle<P: PluginRuntime> {
    plugin: P,
    state: PluginState,
}

impl<P: PluginRuntime> PluginLifecycle<P> {
    pub fn new(plugin: P) -> Self {
        Self {
            plugin,
            state: PluginState::Created,
        }
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    pub fn plugin(&self) -> &P {
        &self.plugin
    }

    pub fn plugin_mut(&mut self) -> &mut P {
        &mut self.plugin
    }

    /// Preloads, enables and loads the plugin.
    pub async fn start(&mut self) -> PluginResult<()> {
        if self.state != PluginState::Created {
            return Err(PluginError::InvalidState {
                expected: PluginState::Created,
                actual: self.state,
            });
        }

        let name = self.plugin.name().to_string();
        info!("🔌 Starting plugin {}", name);

        let result = async {
            self.plugin.preload().await?;
            self.plugin.enable().await?;
            self.plugin.load().await
        }
        .await;

        match result {
            Ok(()) => {
                self.state = PluginState::Enabled;
                info!("✅ Plugin {} enabled", name);
                Ok(())
            }
            Err(e) => {
                self.state = PluginState::Failed;
                error!("❌ Plugin {} failed to start: {}", name, e);
                Err(e)
            }
        }
    }

    /// Reloads configuration and data of an enabled plugin.
    pub async fn reload(&mut self) -> PluginResult<()> {
        if self.state != PluginState::Enabled {
            return Err(PluginError::InvalidState {
                expected: PluginState::Enabled,
                actual: self.state,
            });
        }
        self.plugin.load().await
    }

    /// Disables the plugin. Stopping a plugin that never enabled is a no-op.
    pub async fn stop(&mut self) -> PluginResult<()> {
        if self.state != PluginState::Enabled {
            return Ok(());
        }

        let name = self.plugin.name().to_string();
        let result = self.plugin.disable().await;
        self.state = PluginState::Disabled;

        match &result {
            Ok(()) => info!("🛑 Plugin {} disabled", name),
            Err(e) => error!("❌ Plugin {} failed to disable cleanly: {}", name, e),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingPlugin {
        calls: Vec<&'static str>,
        fail_enable: bool,
    }

    #[async_trait]
    impl PluginRuntime for RecordingPlugin {
        fn name(&self) -> &str {
            "recording"
        }

        async fn preload(&mut self) -> PluginResult<()> {
            self.calls.push("preload");
            Ok(())
        }

        async fn enable(&mut self) -> PluginResult<()> {
            self.calls.push("enable");
            if self.fail_enable {
                return Err(PluginError::InitializationFailed("no database".to_string()));
            }
            Ok(())
        }

        async fn load(&mut self) -> PluginResult<()> {
            self.calls.push("load");
            Ok(())
        }

        async fn disable(&mut self) -> PluginResult<()> {
            self.calls.push("disable");
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_lifecycle_order() {
        let mut lifecycle = PluginLifecycle::new(RecordingPlugin::default());
        lifecycle.start().await.unwrap();
        assert_eq!(lifecycle.state(), PluginState::Enabled);

        lifecycle.reload().await.unwrap();
        lifecycle.stop().await.unwrap();
        assert_eq!(lifecycle.state(), PluginState::Disabled);
        assert_eq!(
            lifecycle.plugin().calls,
            vec!["preload", "enable", "load", "load", "disable"]
        );

        assert!(matches!(
            lifecycle.start().await,
            Err(PluginError::InvalidState { actual: PluginState::Disabled, .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_start_skips_disable() {
        let mut lifecycle = PluginLifecycle::new(RecordingPlugin {
            fail_enable: true,
            ..Default::default()
        });

        assert!(lifecycle.start().await.is_err());
        assert_eq!(lifecycle.state(), PluginState::Failed);

        lifecycle.stop().await.unwrap();
        assert_eq!(lifecycle.plugin().calls, vec!["preload", "enable"]);
        assert!(lifecycle.reload().await.is_err());
    }
}
