use std::io::{Read, Seek};
use std::sync::Arc;

use crate::MazewebResult;

use super::command::{CommandOutput, CommandSpec};
use super::file_path::FilePath;
use super::http::{HttpServerConfig, HttpServerHandle, HttpService};

/* # What is the Platform Abstraction Layer (PAL)?

The PAL is a trait-based abstraction over the three kinds of side effects the
gateway performs: filesystem access (reading and disposing of generated
artifacts), external command execution (the maze generator and the version
lookup), and HTTP serving. Two implementations exist:

- `RealPal`: std::fs, std::process and tiny_http
- `MockPal`: in-memory files and scripted command outcomes for tests

Code depends on the Pal trait, never on a concrete implementation, which is
what makes the whole request path unit-testable without spawning processes.
*/

/// Trait combining Read + Seek for file operations.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// Platform Abstraction Layer (PAL) trait.
pub trait Pal: std::fmt::Debug + Send + Sync + 'static {
    /// Check if a file exists at the given path.
    fn file_exists(&self, path: &FilePath) -> MazewebResult<bool>;

    /// Open a file for reading. The reader is `Send` so it can back a
    /// streaming HTTP response body.
    fn read_file(&self, path: &FilePath) -> MazewebResult<Box<dyn ReadSeek + Send + 'static>>;

    /// Read entire file contents as a UTF-8 string.
    ///
    /// Convenience method with a default implementation on top of `read_file`.
    fn read_file_to_string(&self, path: &FilePath) -> MazewebResult<String> {
        let mut reader = self.read_file(path)?;
        let mut contents = Vec::new();
        reader.read_to_end(&mut contents).map_err(|e| {
            Box::new(crate::MazewebError::new(crate::ErrorKind::FileError {
                path: path.as_path().to_path_buf(),
                source: e,
            }))
        })?;
        String::from_utf8(contents).map_err(|_e| crate::err!("File is not valid UTF-8: {}", path))
    }

    /// Remove a file. Removing a file that does not exist is an error.
    fn remove_file(&self, path: &FilePath) -> MazewebResult<()>;

    /// Execute an external command synchronously, capturing stdout and
    /// stderr.
    ///
    /// A non-zero exit is NOT an error at this level; it is reported through
    /// `CommandOutput::status` so callers can decide what a failure means.
    /// Only the inability to run the command at all (spawn failure, I/O error
    /// while collecting output) is returned as `Err`.
    fn run_command(&self, spec: &CommandSpec) -> MazewebResult<CommandOutput>;

    /// Start an HTTP server with the given service.
    ///
    /// The server starts listening immediately. When the returned handle is
    /// dropped (or `shutdown()` is called), the server stops accepting new
    /// connections.
    fn start_http_server(
        &self,
        service: Box<dyn HttpService>,
        config: HttpServerConfig,
    ) -> MazewebResult<HttpServerHandle>;
}

/// Handle to a PAL implementation, enabling shared ownership.
///
/// Internally wraps `Arc<dyn Pal>` for cheap cloning and thread-safe sharing.
///
/// # Examples
///
/// ```no_run
/// use mazeweb_base::{PalHandle, RealPal};
///
/// let pal = PalHandle::new(RealPal::new(".".into()));
/// let pal_clone = pal.clone(); // shares the same implementation
/// ```
#[derive(Debug, Clone)]
pub struct PalHandle(Arc<dyn Pal>);

impl PalHandle {
    /// Create a new PalHandle from a Pal implementation.
    pub fn new(pal: impl Pal + 'static) -> Self {
        Self(Arc::new(pal))
    }
}

impl std::ops::Deref for PalHandle {
    type Target = dyn Pal;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}
