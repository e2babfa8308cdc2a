//! Runtime configuration for one application context.

use argon2::Params;
use std::path::PathBuf;

/// Minimum sign-up password length, in characters.
pub const DEFAULT_MIN_PASSWORD_CHARS: usize = 8;

/// Where the local backend database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    InMemory,
    File(PathBuf),
}

/// Argon2id cost parameters for the local identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HasherConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl HasherConfig {
    /// Minimal cost accepted by argon2; for tests and throwaway databases.
    pub fn low_cost() -> Self {
        Self {
            memory_kib: Params::MIN_M_COST,
            iterations: Params::MIN_T_COST,
            parallelism: Params::MIN_P_COST,
        }
    }

    pub fn params(&self) -> Result<Params, String> {
        Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|err| format!("invalid argon2 parameters: {err}"))
    }
}

/// Settings consumed by `AppContext::open`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database: DatabaseLocation,
    pub min_password_chars: usize,
    pub hasher: HasherConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl AppConfig {
    pub fn in_memory() -> Self {
        Self {
            database: DatabaseLocation::InMemory,
            min_password_chars: DEFAULT_MIN_PASSWORD_CHARS,
            hasher: HasherConfig::default(),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            database: DatabaseLocation::File(path.into()),
            ..Self::in_memory()
        }
    }

    pub fn with_hasher(mut self, hasher: HasherConfig) -> Self {
        self.hasher = hasher;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{AppConfig, DatabaseLocation, HasherConfig, DEFAULT_MIN_PASSWORD_CHARS};

    #[test]
    fn defaults_use_memory_and_eight_char_passwords() {
        let config = AppConfig::default();
        assert_eq!(config.database, DatabaseLocation::InMemory);
        assert_eq!(config.min_password_chars, DEFAULT_MIN_PASSWORD_CHARS);
    }

    #[test]
    fn hasher_configs_produce_valid_params() {
        assert!(HasherConfig::default().params().is_ok());
        assert!(HasherConfig::low_cost().params().is_ok());
        let broken = HasherConfig {
            memory_kib: 0,
            ..HasherConfig::default()
        };
        assert!(broken.params().is_err());
    }
}
