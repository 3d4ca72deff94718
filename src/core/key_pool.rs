//! Named credential pools with round-robin rotation

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::errors::{RelayError, Result};
use crate::core::models::Credential;

/// Pool feeding the prompt enhancement stage
pub const ENHANCE_POOL: &str = "enhance";
/// Pool feeding the translation stage
pub const TRANSLATE_POOL: &str = "translate";

/// Ordered credentials plus the index of the next one to hand out
#[derive(Debug)]
pub struct KeyPool {
    name: String,
    keys: Vec<Credential>,
    cursor: AtomicUsize,
}

impl KeyPool {
    /// Create a pool, insertion order is rotation order
    pub fn new(name: impl Into<String>, keys: Vec<Credential>) -> Self {
        Self {
            name: name.into(),
            keys,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Parse a newline-delimited key list, ignoring blank lines
    pub fn parse(name: impl Into<String>, content: &str) -> Self {
        let keys = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(Credential::new)
            .collect();
        Self::new(name, keys)
    }

    /// Load a key file. A missing file yields an empty pool.
    pub fn from_file(name: impl Into<String>, path: &Path) -> Result<Self> {
        let name = name.into();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let pool = Self::parse(name, &content);
                info!(
                    "Loaded {} keys for pool '{}' from {}",
                    pool.len(),
                    pool.name,
                    path.display()
                );
                Ok(pool)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "Key file {} not found, pool '{}' disabled",
                    path.display(),
                    name
                );
                Ok(Self::new(name, Vec::new()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Next credential in round-robin order
    pub fn acquire(&self) -> Result<Credential> {
        let len = self.keys.len();
        if len == 0 {
            return Err(RelayError::PoolExhausted {
                pool: self.name.clone(),
            });
        }

        // Closure never returns None so both arms carry the previous cursor.
        let index = self
            .cursor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some((c + 1) % len))
            .unwrap_or_else(|c| c);

        Ok(self.keys[index].clone())
    }
}

/// All named pools loaded at startup
#[derive(Debug, Clone, Default)]
pub struct KeyRing {
    pools: BTreeMap<String, Arc<KeyPool>>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool(mut self, pool: KeyPool) -> Self {
        self.insert(pool);
        self
    }

    pub fn insert(&mut self, pool: KeyPool) {
        self.pools.insert(pool.name().to_string(), Arc::new(pool));
    }

    pub fn pool(&self, name: &str) -> Option<Arc<KeyPool>> {
        self.pools.get(name).cloned()
    }

    /// Next credential of the named pool
    pub fn acquire(&self, name: &str) -> Result<Credential> {
        self.pools
            .get(name)
            .ok_or_else(|| RelayError::ConfigError {
                message: format!("Unknown key pool: {}", name),
            })?
            .acquire()
    }

    /// Number of credentials in the named pool, 0 for unknown pools
    pub fn size(&self, name: &str) -> usize {
        self.pools.get(name).map(|p| p.len()).unwrap_or(0)
    }

    /// Pool sizes keyed by name
    pub fn sizes(&self) -> BTreeMap<String, usize> {
        self.pools
            .iter()
            .map(|(name, pool)| (name.clone(), pool.len()))
            .collect()
    }
}
