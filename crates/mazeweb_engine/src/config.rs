use std::env;

use mazeweb_base::{FilePath, MazewebResult, PalHandle, err};
use serde::Deserialize;
use tracing::{debug, info};

/* # Configuration resolution order

Values come from the environment (IP, PORT, SESSION_KEY, MAZE_DEFAULT_SIZE,
MAZE_EXEC_PATH, MAZE_OUT_PATH) with built-in defaults, UNLESS a local
`config.toml` exists in the working directory. A present override file fully
replaces the environment-based values: keys missing from the file fall back
to the built-in defaults, never to the environment. The config is built once
at startup and passed read-only to every component.
*/

/// Read-only gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Address to bind the HTTP server to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind the HTTP server to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Session signing key. Generated at startup when not configured.
    #[serde(default = "generated_secret_key")]
    pub secret_key: String,
    /// Default value for both `rows` and `cols` when absent from a request.
    #[serde(default = "default_size")]
    pub default_size: u32,
    /// Path of the maze generator executable (or a name resolved via PATH).
    #[serde(default = "default_exec_path")]
    pub exec_path: String,
    /// Base path for generated artifacts, relative to the working directory.
    /// Each request derives its own unique path from this one.
    #[serde(default = "default_out_path")]
    pub out_path: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_size() -> u32 {
    50
}

fn default_exec_path() -> String {
    "./maze".to_string()
}

fn default_out_path() -> String {
    "maze.out".to_string()
}

/// 32 hex chars of fresh randomness, used when no key is configured.
fn generated_secret_key() -> String {
    let bytes: [u8; 16] = rand::random();
    bytes.iter().fold(String::new(), |mut acc, b| {
        acc.push_str(&format!("{:02x}", b));
        acc
    })
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            secret_key: generated_secret_key(),
            default_size: default_size(),
            exec_path: default_exec_path(),
            out_path: default_out_path(),
        }
    }
}

impl GatewayConfig {
    /// Build a configuration from environment variables, falling back to the
    /// built-in defaults for anything unset.
    pub fn from_env() -> MazewebResult<Self> {
        let port = match env::var("PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| err!("Invalid PORT value '{}': {}", raw, e))?,
            Err(_) => default_port(),
        };
        let default_size = match env::var("MAZE_DEFAULT_SIZE") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| err!("Invalid MAZE_DEFAULT_SIZE value '{}': {}", raw, e))?,
            Err(_) => default_size(),
        };

        Ok(Self {
            host: env::var("IP").unwrap_or_else(|_| default_host()),
            port,
            secret_key: env::var("SESSION_KEY").unwrap_or_else(|_| generated_secret_key()),
            default_size,
            exec_path: env::var("MAZE_EXEC_PATH").unwrap_or_else(|_| default_exec_path()),
            out_path: env::var("MAZE_OUT_PATH").unwrap_or_else(|_| default_out_path()),
        })
    }

    /// Base artifact path as a PAL path.
    pub fn out_file(&self) -> FilePath {
        FilePath::from(self.out_path.as_str())
    }
}

/// Load the gateway configuration.
///
/// If the override file exists it wins entirely; otherwise the environment
/// (with built-in defaults) is used.
pub fn load_config(pal: &PalHandle, override_path: &FilePath) -> MazewebResult<GatewayConfig> {
    if pal.file_exists(override_path)? {
        info!(path = %override_path, "loading configuration from override file");
        let raw = pal.read_file_to_string(override_path)?;
        let config: GatewayConfig = toml::from_str(&raw)
            .map_err(|e| err!("Failed to parse {}: {}", override_path, e))?;
        Ok(config)
    } else {
        debug!(path = %override_path, "no override file, using environment configuration");
        GatewayConfig::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mazeweb_base::MockPal;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 5000);
        assert_eq!(config.default_size, 50);
        assert_eq!(config.exec_path, "./maze");
        assert_eq!(config.out_path, "maze.out");
        assert_eq!(config.secret_key.len(), 32);
    }

    #[test]
    fn test_generated_secret_keys_differ() {
        assert_ne!(generated_secret_key(), generated_secret_key());
    }

    #[test]
    fn test_load_config_from_override_file() {
        let mock = MockPal::new();
        mock.add_file(
            FilePath::from("config.toml"),
            br#"
host = "0.0.0.0"
port = 8080
exec_path = "/usr/local/bin/maze"
out_path = "out/maze.bin"
default_size = 25
secret_key = "fixed"
"#
            .to_vec(),
        );
        let pal = PalHandle::new(mock);

        let config = load_config(&pal, &FilePath::from("config.toml")).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.exec_path, "/usr/local/bin/maze");
        assert_eq!(config.out_path, "out/maze.bin");
        assert_eq!(config.default_size, 25);
        assert_eq!(config.secret_key, "fixed");
    }

    #[test]
    fn test_override_file_missing_keys_use_builtin_defaults() {
        let mock = MockPal::new();
        mock.add_file(
            FilePath::from("config.toml"),
            br#"
port = 8080
exec_path = "./maze"
out_path = "maze.out"
"#
            .to_vec(),
        );
        let pal = PalHandle::new(mock);

        let config = load_config(&pal, &FilePath::from("config.toml")).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.default_size, 50);
    }

    #[test]
    fn test_load_config_bad_toml_is_err() {
        let mock = MockPal::new();
        mock.add_file(FilePath::from("config.toml"), b"port = ].oops".to_vec());
        let pal = PalHandle::new(mock);

        assert!(load_config(&pal, &FilePath::from("config.toml")).is_err());
    }

    #[test]
    fn test_load_config_without_file_uses_env_defaults() {
        let pal = PalHandle::new(MockPal::new());
        // No assertions on specific values: the process environment may
        // legitimately define IP/PORT. It must at least resolve.
        assert!(load_config(&pal, &FilePath::from("config.toml")).is_ok());
    }

    #[test]
    fn test_out_file() {
        let config = GatewayConfig::default();
        assert_eq!(config.out_file(), FilePath::from("maze.out"));
    }
}
