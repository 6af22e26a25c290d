//! Startup fixtures for the in-memory store.
//!
//! ```toml
//! [[users]]
//! _id = "u1"
//! email = "alice@example.com"
//! firstName = "Alice"
//!
//! [[channels]]
//! name = "general"
//! admin = "u1"
//! members = ["u2"]
//! ```

use anyhow::{Context, Result};
use parley_core::{Channel, MemoryStore, User, UserId};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Users and channels to create at startup.
#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub channels: Vec<SeedChannel>,
}

/// A channel to create. Its id is generated.
#[derive(Debug, Deserialize)]
pub struct SeedChannel {
    pub name: String,
    pub admin: UserId,
    #[serde(default)]
    pub members: Vec<UserId>,
}

impl Seed {
    /// Parse a seed file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse seed file: {}", path.display()))
    }

    /// Create every user, then every channel.
    ///
    /// # Errors
    ///
    /// Returns an error if a channel is rejected by the store.
    pub async fn apply(self, store: &MemoryStore) -> Result<Vec<Channel>> {
        let user_count = self.users.len();
        for user in self.users {
            store.create_user(user).await;
        }

        let mut channels = Vec::with_capacity(self.channels.len());
        for seed in self.channels {
            let channel = store
                .create_channel(&seed.name, seed.members, &seed.admin)
                .await
                .with_context(|| format!("Failed to create channel {}", seed.name))?;
            info!(channel = %channel.id, name = %channel.name, "Seeded channel");
            channels.push(channel);
        }

        info!(users = user_count, channels = channels.len(), "Store seeded");
        Ok(channels)
    }
}
