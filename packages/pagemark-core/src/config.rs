use std::collections::BTreeMap;
use std::env;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::schema::Schema;

/// Largest chunk the cascades delete or repoint per batch.
pub const DEFAULT_CHUNK_SIZE: usize = 400;

pub const CHUNK_SIZE_ENV: &str = "PAGEMARK_CHUNK_SIZE";

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub chunk_size: usize,
    /// Page size overrides keyed by family name.
    pub page_sizes: BTreeMap<String, u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            page_sizes: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay settings from the environment. Unset variables keep the current value.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        match env::var(CHUNK_SIZE_ENV) {
            Ok(raw) => {
                self.chunk_size = raw.trim().parse().map_err(|e| {
                    warn!("Invalid {CHUNK_SIZE_ENV} value {raw:?}: {e}");
                    Error::Config(format!("{CHUNK_SIZE_ENV}: {e}"))
                })?;
                info!(chunk_size = self.chunk_size, "chunk size taken from {CHUNK_SIZE_ENV}");
            }
            Err(_) => {
                debug!(chunk_size = self.chunk_size, "{CHUNK_SIZE_ENV} not set");
            }
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be positive".into()));
        }
        if let Some((family, _)) = self.page_sizes.iter().find(|(_, size)| **size == 0) {
            return Err(Error::Config(format!("page size for {family} must be positive")));
        }
        Ok(())
    }

    /// Apply page size overrides to `schema`.
    pub fn apply(&self, schema: &mut Schema) -> Result<()> {
        self.validate()?;
        for (name, page_size) in &self.page_sizes {
            let family = schema.family_mut(name)?;
            let pagination = family
                .pagination
                .as_mut()
                .ok_or_else(|| Error::Config(format!("{name} is not paginated")))?;
            pagination.page_size = *page_size;
        }
        Ok(())
    }
}
