/* # Why is the CLI minimal and hardcoded?

The binary takes no arguments. Everything it needs comes from the
environment (IP, PORT, SESSION_KEY, MAZE_DEFAULT_SIZE, MAZE_EXEC_PATH,
MAZE_OUT_PATH) or from an optional `config.toml` in the current directory,
which fully replaces the environment values when present.

The workflow is straightforward:
1. Change to the directory holding the maze generator executable
2. Optionally drop a `config.toml` next to it
3. Run `mazeweb`
4. The gateway serves on the configured address until killed

Exit codes:
- 0: never reached in normal operation; the server runs until killed
- 1: startup error (bad configuration, bind failure)
*/

use std::env;
use std::process;
use std::thread;

use mazeweb_base::pal::http::HttpServerConfig;
use mazeweb_base::tracing::init_tracing;
use mazeweb_base::{FilePath, PalHandle, RealPal};
use mazeweb_engine::{GatewayService, load_config};

fn main() {
    init_tracing().unwrap();

    let current_dir = env::current_dir().unwrap_or_else(|e| {
        eprintln!("Error: Failed to get current directory: {}", e);
        process::exit(1);
    });

    let pal = PalHandle::new(RealPal::new(current_dir));

    let config_path = FilePath::from("config.toml");
    let config = match load_config(&pal, &config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let server_config = HttpServerConfig::new(config.host.clone()).with_port(config.port);
    let service = GatewayService::new(pal.clone(), config);

    let handle = match pal.start_http_server(Box::new(service), server_config) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Error: Failed to start HTTP server: {}", e);
            process::exit(1);
        }
    };

    println!("mazeweb listening on port {}", handle.port());

    // Serve until the process is killed.
    loop {
        thread::park();
    }
}
