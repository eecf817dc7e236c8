//! Command alias table

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// A resolved alias
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAlias {
    pub alias: String,
    pub command: String,
}

/// Maps user-defined aliases onto full commands
pub struct AliasTracker {
    aliases: RwLock<HashMap<String, String>>,
}

impl Default for AliasTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl AliasTracker {
    pub fn new() -> Self {
        Self {
            aliases: RwLock::new(HashMap::new()),
        }
    }

    /// Create or overwrite an alias for a command
    pub fn create_alias(&self, alias: impl Into<String>, command: impl Into<String>) -> ResolvedAlias {
        let resolved = ResolvedAlias {
            alias: alias.into(),
            command: command.into(),
        };
        info!("alias created: {} -> {}", resolved.alias, resolved.command);
        self.aliases
            .write()
            .insert(resolved.alias.clone(), resolved.command.clone());
        resolved
    }

    /// Resolve an alias back to its command
    pub fn resolve_alias(&self, alias: &str) -> Option<ResolvedAlias> {
        self.aliases.read().get(alias).map(|command| ResolvedAlias {
            alias: alias.to_string(),
            command: command.clone(),
        })
    }

    pub fn remove_alias(&self, alias: &str) -> bool {
        self.aliases.write().remove(alias).is_some()
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.read().len()
    }
}
