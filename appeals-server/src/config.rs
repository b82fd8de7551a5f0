use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// File name of the SQLite database inside `state_dir`.
pub const DATABASE_FILE_NAME: &str = "appeals.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    /// Address the HTTP listener binds to. Defaults to all interfaces.
    pub bind_address: String,
    /// Directory for persistent state (SQLite database).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    /// Explicit database file, overriding `state_dir`.
    pub database_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source. Empty or
    /// whitespace-only values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let port = var("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .trim()
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let bind_address = var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0".to_string());

        let state_dir = var("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let database_path = var("DATABASE_PATH").map(PathBuf::from);

        Ok(Config {
            port,
            bind_address,
            state_dir,
            database_path,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.state_dir.join(DATABASE_FILE_NAME))
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}
