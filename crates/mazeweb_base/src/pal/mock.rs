use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU16, Ordering};

use crate::ErrorKind;
use crate::MazewebError;
use crate::MazewebResult;

use super::FilePath;
use super::command::{CommandOutput, CommandSpec};
use super::http::{HttpRequest, HttpResponse, HttpServerConfig, HttpServerHandle, HttpService};
use super::traits::{Pal, ReadSeek};

/* # Why a scriptable command handler instead of canned outputs?

The generation path is: run the generator, then read the artifact it wrote.
A fixed queue of outputs cannot model that second half. The handler is a
closure that receives the CommandSpec and returns the outcome; because
MockPal clones share storage, a test's handler can capture a clone of the
mock and write the artifact file exactly like the real generator would.
*/

type CommandHandler = Box<dyn Fn(&CommandSpec) -> MazewebResult<CommandOutput> + Send + Sync>;

/// In-memory PAL implementation for testing.
///
/// Stores file contents in a HashMap, executes "commands" through a
/// test-provided closure, and registers HTTP services that can be driven via
/// `simulate_request`. Clones share all storage.
///
/// # Examples
///
/// ```
/// use mazeweb_base::{FilePath, MockPal, Pal};
///
/// let mock = MockPal::new();
/// mock.add_file(FilePath::from("maze.out"), b"artifact".to_vec());
/// let content = mock.read_file_to_string(&FilePath::from("maze.out")).unwrap();
/// assert_eq!(content, "artifact");
/// ```
#[derive(Clone)]
pub struct MockPal {
    files: Arc<Mutex<HashMap<FilePath, Vec<u8>>>>,
    command_handler: Arc<Mutex<Option<CommandHandler>>>,
    recorded_commands: Arc<Mutex<Vec<CommandSpec>>>,
    http_servers: Arc<Mutex<HashMap<u16, HttpServerInfo>>>,
    next_port: Arc<AtomicU16>,
}

/// Information about a registered HTTP server.
#[derive(Debug)]
struct HttpServerInfo {
    service: Box<dyn HttpService>,
    _config: HttpServerConfig,
}

impl MockPal {
    /// Create a new empty MockPal.
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            command_handler: Arc::new(Mutex::new(None)),
            recorded_commands: Arc::new(Mutex::new(Vec::new())),
            http_servers: Arc::new(Mutex::new(HashMap::new())),
            next_port: Arc::new(AtomicU16::new(10000)),
        }
    }

    /// Add a file to the mock storage.
    pub fn add_file(&self, path: FilePath, content: Vec<u8>) {
        self.files.lock().unwrap().insert(path, content);
    }

    /// Get the stored content of a file, if present.
    pub fn file_bytes(&self, path: &FilePath) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    /// Install the closure that answers `run_command` calls.
    pub fn set_command_handler<F>(&self, handler: F)
    where
        F: Fn(&CommandSpec) -> MazewebResult<CommandOutput> + Send + Sync + 'static,
    {
        *self.command_handler.lock().unwrap() = Some(Box::new(handler));
    }

    /// All command specs passed to `run_command`, in call order.
    pub fn recorded_commands(&self) -> Vec<CommandSpec> {
        self.recorded_commands.lock().unwrap().clone()
    }

    /// Simulate an HTTP request to a registered server.
    ///
    /// Looks up the service registered for the given port and invokes it
    /// without any real network traffic.
    pub fn simulate_request(
        &self,
        port: u16,
        request: HttpRequest,
    ) -> MazewebResult<HttpResponse> {
        let servers = self.http_servers.lock().unwrap();
        let server_info = servers.get(&port).ok_or_else(|| {
            Box::new(MazewebError::message(format!(
                "No HTTP server registered on port {}",
                port
            )))
        })?;

        server_info.service.handle_request(request)
    }

    /// Get the number of registered HTTP servers.
    pub fn http_server_count(&self) -> usize {
        self.http_servers.lock().unwrap().len()
    }
}

impl Default for MockPal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockPal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPal")
            .field("files", &self.files.lock().unwrap().len())
            .field(
                "command_handler",
                &self.command_handler.lock().unwrap().is_some(),
            )
            .field(
                "recorded_commands",
                &self.recorded_commands.lock().unwrap().len(),
            )
            .field("http_servers", &self.http_servers.lock().unwrap().len())
            .finish()
    }
}

impl Pal for MockPal {
    fn file_exists(&self, path: &FilePath) -> MazewebResult<bool> {
        let files = self.files.lock().unwrap();
        Ok(files.contains_key(path))
    }

    fn read_file(&self, path: &FilePath) -> MazewebResult<Box<dyn ReadSeek + Send + 'static>> {
        let files = self.files.lock().unwrap();
        let content = files
            .get(path)
            .ok_or_else(|| {
                Box::new(MazewebError::new(ErrorKind::FileError {
                    path: path.as_path().to_path_buf(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("File not found: {}", path),
                    ),
                }))
            })?
            .clone();
        Ok(Box::new(Cursor::new(content)))
    }

    fn remove_file(&self, path: &FilePath) -> MazewebResult<()> {
        let mut files = self.files.lock().unwrap();
        files.remove(path).ok_or_else(|| {
            Box::new(MazewebError::new(ErrorKind::FileError {
                path: path.as_path().to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ),
            }))
        })?;
        Ok(())
    }

    fn run_command(&self, spec: &CommandSpec) -> MazewebResult<CommandOutput> {
        self.recorded_commands.lock().unwrap().push(spec.clone());
        let handler = self.command_handler.lock().unwrap();
        match handler.as_ref() {
            Some(handler) => handler(spec),
            None => Err(Box::new(MazewebError::message(format!(
                "No command handler set in MockPal (command: {})",
                spec
            )))),
        }
    }

    fn start_http_server(
        &self,
        service: Box<dyn HttpService>,
        config: HttpServerConfig,
    ) -> MazewebResult<HttpServerHandle> {
        let port = match config.port {
            Some(p) => p,
            None => self.next_port.fetch_add(1, Ordering::SeqCst),
        };

        let server_info = HttpServerInfo {
            service,
            _config: config,
        };
        {
            let mut servers = self.http_servers.lock().unwrap();
            servers.insert(port, server_info);
        }

        Ok(HttpServerHandle::new(port))
    }
}
