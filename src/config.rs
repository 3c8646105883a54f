use crate::leveling::{DEFAULT_MAX_PASSES, LevelManager};
use clap::Args;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Options shared by the web server and the command-line tool.
#[derive(Args, Clone, Debug, PartialEq)]
pub struct Config {
    /// Address the web server binds to
    #[arg(long, env = "VALUECALC_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "VALUECALC_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Upper bound on leveling passes before giving up
    #[arg(long, env = "VALUECALC_MAX_PASSES", default_value_t = DEFAULT_MAX_PASSES)]
    pub max_passes: usize,

    /// Directory snapshots are saved to
    #[arg(long, env = "VALUECALC_DATA_DIR", default_value = ".")]
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "127.0.0.1".to_string(),
            port: 3000,
            max_passes: DEFAULT_MAX_PASSES,
            data_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    pub fn level_manager(&self) -> LevelManager {
        LevelManager::with_max_passes(self.max_passes)
    }

    pub fn addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    /// Resolves a snapshot file name inside the data directory.
    ///
    /// Only the final path component of `filename` is used.
    pub fn snapshot_path(&self, filename: &str) -> Option<PathBuf> {
        let name = std::path::Path::new(filename).file_name()?;
        Some(self.data_dir.join(name))
    }
}
