//! CLI bootstrap - the composition root.
//!
//! This module is the ONLY place where concrete adapters are chosen and
//! wired to the nodes:
//! - Configuration (via ailinker-core settings)
//! - In-process bus endpoints (via ailinker-bus)
//! - TTS connection and node (via ailinker-voice)
//! - Chat backend and node (via ailinker-chat)

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use ailinker_bus::MemoryHub;
use ailinker_chat::{ChatNode, ChatNodeConfig, build_chat_backend};
use ailinker_core::{AppConfig, BusPort, validate_config};
use ailinker_voice::{TtsNode, TtsNodeConfig, build_tts_connection};

/// Fully composed context for CLI commands.
#[derive(Debug, Clone)]
pub struct CliContext {
    pub config: AppConfig,
}

/// Load and validate configuration. Without a path the defaults are used.
pub fn bootstrap(config_path: Option<&Path>) -> Result<CliContext> {
    let config = match config_path {
        Some(path) => AppConfig::load(path)?,
        None => {
            let config = AppConfig::default();
            validate_config(&config)?;
            config
        }
    };
    tracing::debug!(
        tts_service = ?config.tts.service,
        chat_service = ?config.chat.service,
        "Configuration loaded"
    );
    Ok(CliContext { config })
}

impl CliContext {
    /// Override the node name for this invocation.
    #[must_use]
    pub fn with_node_name(mut self, name: Option<String>) -> Self {
        if name.is_some() {
            self.config.node.name = name;
        }
        self
    }

    /// TTS node attached to `hub`.
    ///
    /// The endpoint starts queueing right away, so messages published before
    /// the node task first runs are kept.
    pub fn tts_node(&self, hub: &MemoryHub) -> Result<TtsNode> {
        let config = TtsNodeConfig::from_app(&self.config);
        let conn = build_tts_connection(&config.settings);
        let bus = Arc::new(hub.connect(config.name.clone(), &ailinker_voice::node::SUBSCRIPTIONS));
        bus.start_transport().context("Failed to start TTS endpoint")?;
        Ok(TtsNode::new(config, bus, conn))
    }

    /// Chat node attached to `hub`, queueing from the start like
    /// [`tts_node`](Self::tts_node).
    pub fn chat_node(&self, hub: &MemoryHub) -> Result<ChatNode> {
        let backend = build_chat_backend(&self.config.chat).context("Failed to create chat backend")?;
        let config = ChatNodeConfig::from_app(&self.config);
        let bus = Arc::new(hub.connect(config.name.clone(), &ailinker_chat::node::SUBSCRIPTIONS));
        bus.start_transport().context("Failed to start chat endpoint")?;
        Ok(ChatNode::new(config, bus, backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_config_file() {
        let ctx = bootstrap(None).unwrap();
        assert_eq!(ctx.config, AppConfig::default());
    }

    #[test]
    fn loads_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"tts":{{"direct_n":3}}}}"#).unwrap();
        let ctx = bootstrap(Some(file.path())).unwrap();
        assert_eq!(ctx.config.tts.direct_n, 3);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"tts":{{"frame_length":0}}}}"#).unwrap();
        assert!(bootstrap(Some(file.path())).is_err());
    }

    #[test]
    fn node_name_override() {
        let ctx = bootstrap(None).unwrap().with_node_name(Some("tts-7".into()));
        assert_eq!(ctx.config.node_name("tts"), "tts-7");
        let ctx = ctx.with_node_name(None);
        assert_eq!(ctx.config.node_name("tts"), "tts-7");
    }

    #[test]
    fn wires_nodes_onto_hub() {
        let ctx = bootstrap(None).unwrap();
        let hub = MemoryHub::new();
        let _tts = ctx.tts_node(&hub).unwrap();
        let _chat = ctx.chat_node(&hub).unwrap();
        assert_eq!(hub.open_endpoints(), 2);
    }
}
