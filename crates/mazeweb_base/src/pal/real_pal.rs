use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use tracing::{debug, error, instrument, warn};

use crate::{ErrorKind, MazewebError, MazewebResult, err};

use super::FilePath;
use super::command::{CommandOutput, CommandSpec, CommandStatus};
use super::http::{
    HttpMethod, HttpRequest, HttpResponse, HttpServerConfig, HttpServerHandle, HttpService,
    HttpStatusCode,
};
use super::traits::{Pal, ReadSeek};

/* # Why std::fs and std::process instead of async?

Every request performs at most two short subprocess invocations and one file
read; a blocking thread-per-request model covers that without pulling in an
async runtime. The accept loop spawns one worker thread per accepted request,
so a slow generation never stalls other clients.
*/

/// Concrete PAL implementation using the real filesystem, real subprocesses
/// and a tiny_http server.
///
/// All file paths are resolved relative to a configured base directory, and
/// commands run with that directory as their working directory, so relative
/// executable and artifact paths from the configuration behave consistently.
#[derive(Debug)]
pub struct RealPal {
    base_dir: PathBuf,
}

impl RealPal {
    /// Create a new RealPal with the given base directory.
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Resolve a FilePath to an absolute filesystem path.
    fn resolve_path(&self, path: &FilePath) -> PathBuf {
        self.base_dir.join(path.as_path())
    }
}

impl Pal for RealPal {
    #[instrument(skip(self), fields(path = %path))]
    fn file_exists(&self, path: &FilePath) -> MazewebResult<bool> {
        let resolved = self.resolve_path(path);
        let exists = resolved.exists();
        debug!(exists, resolved = %resolved.display(), "checked file existence");
        Ok(exists)
    }

    #[instrument(skip(self), fields(path = %path))]
    fn read_file(&self, path: &FilePath) -> MazewebResult<Box<dyn ReadSeek + Send + 'static>> {
        let resolved = self.resolve_path(path);
        debug!(resolved = %resolved.display(), "opening file for reading");
        let file = fs::File::open(&resolved).map_err(|e| {
            debug!(error = %e, "failed to open file");
            Box::new(MazewebError::new(ErrorKind::FileError {
                path: resolved,
                source: e,
            }))
        })?;
        Ok(Box::new(file))
    }

    #[instrument(skip(self), fields(path = %path))]
    fn remove_file(&self, path: &FilePath) -> MazewebResult<()> {
        let resolved = self.resolve_path(path);
        debug!(resolved = %resolved.display(), "removing file");
        fs::remove_file(&resolved).map_err(|e| {
            debug!(error = %e, "failed to remove file");
            Box::new(MazewebError::new(ErrorKind::FileError {
                path: resolved,
                source: e,
            }))
        })?;
        Ok(())
    }

    #[instrument(skip(self), fields(command = %spec))]
    fn run_command(&self, spec: &CommandSpec) -> MazewebResult<CommandOutput> {
        let mut cmd = Command::new(spec.program());
        cmd.args(spec.args_slice())
            .current_dir(&self.base_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = match spec.timeout() {
            None => {
                let output = cmd.output().map_err(|e| {
                    debug!(error = %e, "failed to run command");
                    Box::new(MazewebError::new(ErrorKind::CommandError {
                        program: spec.program().to_string(),
                        source: e,
                    }))
                })?;
                CommandOutput {
                    status: CommandStatus::Exited(output.status.code().unwrap_or(-1)),
                    stdout: output.stdout,
                    stderr: output.stderr,
                }
            }
            Some(timeout) => {
                let child = cmd.spawn().map_err(|e| {
                    debug!(error = %e, "failed to spawn command");
                    Box::new(MazewebError::new(ErrorKind::CommandError {
                        program: spec.program().to_string(),
                        source: e,
                    }))
                })?;
                wait_with_timeout(child, timeout, spec.program())?
            }
        };

        debug!(status = ?output.status, stderr_len = output.stderr.len(), "command finished");
        Ok(output)
    }

    #[instrument(skip(self, service))]
    fn start_http_server(
        &self,
        service: Box<dyn HttpService>,
        config: HttpServerConfig,
    ) -> MazewebResult<HttpServerHandle> {
        let address = config.address();
        let server = tiny_http::Server::http(&address)
            .map_err(|e| err!("Failed to bind HTTP server to {}: {}", address, e))?;

        let port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .unwrap_or(0);
        debug!(port, "HTTP server listening");

        let handle = HttpServerHandle::new(port);
        let shutdown = Arc::clone(handle.shutdown_flag());
        let server_name = config.server_name.clone();
        let service: Arc<dyn HttpService> = Arc::from(service);

        std::thread::spawn(move || {
            loop {
                if shutdown.load(Ordering::SeqCst) {
                    debug!("HTTP server shutting down");
                    break;
                }
                match server.recv_timeout(Duration::from_millis(100)) {
                    Ok(Some(request)) => {
                        // One worker thread per request; a blocked generation
                        // must not stall other clients.
                        let service = Arc::clone(&service);
                        let server_name = server_name.clone();
                        std::thread::spawn(move || {
                            handle_connection(service.as_ref(), request, &server_name);
                        });
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        // Malformed requests and transient socket errors
                        // surface here; the server must keep accepting.
                        error!(error = %e, "failed to accept HTTP connection");
                        continue;
                    }
                }
            }
        });

        Ok(handle)
    }
}

/// Poll a spawned child until it exits or the timeout elapses.
///
/// Both pipes are drained on background threads for the whole lifetime of
/// the child; a process writing more than the pipe buffer before exiting
/// must not stall. On timeout the child is killed and the outcome is
/// `CommandStatus::TimedOut` carrying whatever output had been written so
/// far. Polling keeps this dependency-free; the commands involved are
/// short-lived.
fn wait_with_timeout(
    mut child: std::process::Child,
    timeout: Duration,
    program: &str,
) -> MazewebResult<CommandOutput> {
    let stdout = child.stdout.take().map(drain_in_background);
    let stderr = child.stderr.take().map(drain_in_background);

    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                return Ok(CommandOutput {
                    status: CommandStatus::Exited(status.code().unwrap_or(-1)),
                    stdout: collect_drained(stdout),
                    stderr: collect_drained(stderr),
                });
            }
            Ok(None) => {
                if start.elapsed() > timeout {
                    warn!(program, timeout_ms = timeout.as_millis() as u64, "killing timed-out command");
                    let _ = child.kill();
                    let _ = child.wait();
                    // Killing the child closes the pipes, so the drain
                    // threads finish; partial diagnostics are kept.
                    return Ok(CommandOutput {
                        status: CommandStatus::TimedOut,
                        stdout: collect_drained(stdout),
                        stderr: collect_drained(stderr),
                    });
                }
                std::thread::sleep(Duration::from_millis(25));
            }
            Err(e) => {
                return Err(Box::new(MazewebError::new(ErrorKind::CommandError {
                    program: program.to_string(),
                    source: e,
                })));
            }
        }
    }
}

fn drain_in_background<R>(mut pipe: R) -> std::thread::JoinHandle<Vec<u8>>
where
    R: std::io::Read + Send + 'static,
{
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        std::io::Read::read_to_end(&mut pipe, &mut buf).ok();
        buf
    })
}

fn collect_drained(handle: Option<std::thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Convert one tiny_http request, dispatch it to the service, and respond.
fn handle_connection(service: &dyn HttpService, request: tiny_http::Request, server_name: &str) {
    let method = match HttpMethod::parse(&request.method().to_string()) {
        Some(method) => method,
        None => {
            let response = HttpResponse::method_not_allowed();
            respond(request, response, server_name);
            return;
        }
    };

    let mut http_request = HttpRequest::new(method, request.url().to_string());
    for header in request.headers() {
        http_request =
            http_request.with_header(header.field.as_str().as_str(), header.value.as_str());
    }

    let response = match service.handle_request(http_request) {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "request handler failed");
            HttpResponse::new(HttpStatusCode::NetworkConnectTimeoutError)
                .with_content_type("text/plain")
                .with_body(format!("Internal error: {}", e))
        }
    };

    respond(request, response, server_name);
}

fn respond(request: tiny_http::Request, response: HttpResponse, server_name: &str) {
    let (status, headers, body) = response.into_parts();
    let body_len = body.len();

    let mut tiny_response = tiny_http::Response::new(
        tiny_http::StatusCode(status.as_u16()),
        vec![],
        body.into_reader(),
        body_len,
        None,
    );

    for (key, value) in headers.all() {
        match tiny_http::Header::from_bytes(key.as_bytes(), value.as_bytes()) {
            Ok(header) => tiny_response.add_header(header),
            Err(()) => warn!(%key, "dropping unrepresentable response header"),
        }
    }
    if let Ok(header) = tiny_http::Header::from_bytes(&b"Server"[..], server_name.as_bytes()) {
        tiny_response.add_header(header);
    }

    if let Err(e) = request.respond(tiny_response) {
        debug!(error = %e, "failed to write HTTP response");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use tempfile::TempDir;

    fn setup_test_dir() -> (TempDir, RealPal) {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let pal = RealPal::new(temp_dir.path().to_path_buf());
        (temp_dir, pal)
    }

    #[test]
    fn test_file_exists() {
        let (temp_dir, pal) = setup_test_dir();
        fs::write(temp_dir.path().join("maze.out"), "content").unwrap();

        assert!(pal.file_exists(&FilePath::from("maze.out")).unwrap());
        assert!(!pal.file_exists(&FilePath::from("missing")).unwrap());
    }

    #[test]
    fn test_read_file() {
        let (temp_dir, pal) = setup_test_dir();
        fs::write(temp_dir.path().join("maze.out"), "hello world").unwrap();

        let result = pal.read_file_to_string(&FilePath::from("maze.out")).unwrap();
        assert_eq!(result, "hello world");
    }

    #[test]
    fn test_read_file_not_found() {
        let (_temp_dir, pal) = setup_test_dir();
        assert!(pal.read_file(&FilePath::from("missing")).is_err());
    }

    #[test]
    fn test_remove_file() {
        let (temp_dir, pal) = setup_test_dir();
        fs::write(temp_dir.path().join("maze.out.1"), "x").unwrap();

        pal.remove_file(&FilePath::from("maze.out.1")).unwrap();
        assert!(!temp_dir.path().join("maze.out.1").exists());

        assert!(pal.remove_file(&FilePath::from("maze.out.1")).is_err());
    }

    #[test]
    fn test_run_command_captures_stdout() {
        let (_temp_dir, pal) = setup_test_dir();
        let out = pal
            .run_command(&CommandSpec::new("echo").arg("png text"))
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout_utf8().trim(), "png text");
    }

    #[test]
    fn test_run_command_nonzero_exit_is_not_err() {
        let (_temp_dir, pal) = setup_test_dir();
        let out = pal
            .run_command(&CommandSpec::new("sh").args(["-c", "echo boom >&2; exit 3"]))
            .unwrap();
        assert_eq!(out.status, CommandStatus::Exited(3));
        assert_eq!(out.stderr_utf8().trim(), "boom");
    }

    #[test]
    fn test_run_command_missing_program_is_err() {
        let (_temp_dir, pal) = setup_test_dir();
        let result = pal.run_command(&CommandSpec::new("./definitely-not-a-real-binary"));
        assert!(result.is_err());
    }

    #[test]
    fn test_run_command_timeout() {
        let (_temp_dir, pal) = setup_test_dir();
        let out = pal
            .run_command(
                &CommandSpec::new("sleep")
                    .arg("5")
                    .with_timeout(Duration::from_millis(100)),
            )
            .unwrap();
        assert_eq!(out.status, CommandStatus::TimedOut);
    }

    #[test]
    fn test_run_command_with_timeout_drains_large_output() {
        // More than a pipe buffer before exit; must not stall until the
        // timeout and must capture everything.
        let (_temp_dir, pal) = setup_test_dir();
        let out = pal
            .run_command(
                &CommandSpec::new("sh")
                    .args(["-c", "head -c 200000 /dev/zero"])
                    .with_timeout(Duration::from_secs(10)),
            )
            .unwrap();
        assert_eq!(out.status, CommandStatus::Exited(0));
        assert_eq!(out.stdout.len(), 200000);
    }

    #[test]
    fn test_run_command_timeout_keeps_partial_stderr() {
        let (_temp_dir, pal) = setup_test_dir();
        let out = pal
            .run_command(
                &CommandSpec::new("sh")
                    .args(["-c", "echo early-diagnostic >&2; sleep 5"])
                    .with_timeout(Duration::from_millis(200)),
            )
            .unwrap();
        assert_eq!(out.status, CommandStatus::TimedOut);
        assert!(out.stderr_utf8().contains("early-diagnostic"));
    }

    #[test]
    fn test_run_command_uses_base_dir_as_cwd() {
        let (temp_dir, pal) = setup_test_dir();
        pal.run_command(&CommandSpec::new("sh").args(["-c", "echo hi > from_cwd.txt"]))
            .unwrap();
        assert!(temp_dir.path().join("from_cwd.txt").exists());
    }

    #[derive(Debug)]
    struct PingService;

    impl HttpService for PingService {
        fn handle_request(&self, request: HttpRequest) -> MazewebResult<HttpResponse> {
            match request.path() {
                "/ping" => Ok(HttpResponse::text("pong")),
                _ => Ok(HttpResponse::not_found()),
            }
        }
    }

    #[test]
    fn test_http_server_round_trip() {
        let (_temp_dir, pal) = setup_test_dir();
        let handle = pal
            .start_http_server(Box::new(PingService), HttpServerConfig::new("127.0.0.1"))
            .unwrap();

        let mut stream =
            std::net::TcpStream::connect(("127.0.0.1", handle.port())).expect("connect");
        stream
            .write_all(b"GET /ping HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).unwrap();

        assert!(raw.starts_with("HTTP/1.1 200"));
        assert!(raw.ends_with("pong"));

        handle.shutdown();
    }

    #[derive(Debug)]
    struct SlowService;

    impl HttpService for SlowService {
        fn handle_request(&self, _request: HttpRequest) -> MazewebResult<HttpResponse> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(HttpResponse::text("done"))
        }
    }

    #[test]
    fn test_http_server_handles_requests_in_parallel() {
        let (_temp_dir, pal) = setup_test_dir();
        let handle = pal
            .start_http_server(Box::new(SlowService), HttpServerConfig::new("127.0.0.1"))
            .unwrap();
        let port = handle.port();

        let start = Instant::now();
        let clients: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(move || {
                    let mut stream =
                        std::net::TcpStream::connect(("127.0.0.1", port)).expect("connect");
                    stream
                        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
                        .unwrap();
                    let mut raw = String::new();
                    stream.read_to_string(&mut raw).unwrap();
                    assert!(raw.starts_with("HTTP/1.1 200"));
                })
            })
            .collect();
        for client in clients {
            client.join().unwrap();
        }
        let elapsed = start.elapsed();

        // Serial handling of four 300ms requests would take 1200ms or more.
        assert!(
            elapsed < Duration::from_millis(900),
            "4 overlapping 300ms requests took {:?}",
            elapsed
        );
        handle.shutdown();
    }

    #[test]
    fn test_http_server_survives_malformed_connection() {
        let (_temp_dir, pal) = setup_test_dir();
        let handle = pal
            .start_http_server(Box::new(PingService), HttpServerConfig::new("127.0.0.1"))
            .unwrap();

        {
            let mut stream =
                std::net::TcpStream::connect(("127.0.0.1", handle.port())).expect("connect");
            stream.write_all(b"this is not http\r\n\r\n").unwrap();
        }
        std::thread::sleep(Duration::from_millis(200));

        let mut stream =
            std::net::TcpStream::connect(("127.0.0.1", handle.port())).expect("connect");
        stream
            .write_all(b"GET /ping HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).unwrap();
        assert!(raw.starts_with("HTTP/1.1 200"));

        handle.shutdown();
    }
}
