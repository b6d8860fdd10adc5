use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use mazeweb_base::pal::{CommandSpec, CommandStatus, ReadSeek};
use mazeweb_base::{FilePath, MazewebResult, PalHandle, ResultExt};
use tracing::{debug, info, warn};

use crate::formats::mime_type;

/// Bound on a single generation run. Exceeding it is reported to the client
/// as a gateway timeout rather than left to hang the worker forever.
const GENERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Validated parameters for one maze generation.
///
/// `out_format` membership in the negotiated format set is checked by the
/// service before an invoker ever sees the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    rows: u32,
    cols: u32,
    seed: Option<String>,
    path_len: u32,
    out_format: String,
}

impl GenerationRequest {
    /// Build a request from raw query-parameter values.
    ///
    /// Absent `rows`/`cols` take the configured default size; absent
    /// `path_len` takes 0 ("unbounded"). An empty seed counts as no seed at
    /// all. The `Err` value is the client-facing message for a 400 response.
    pub fn from_query(
        rows: Option<&str>,
        cols: Option<&str>,
        seed: Option<&str>,
        path_len: Option<&str>,
        out_format: &str,
        default_size: u32,
    ) -> Result<Self, String> {
        let rows = parse_dimension("rows", rows, default_size)?;
        let cols = parse_dimension("cols", cols, default_size)?;
        let path_len = match path_len {
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|_| format!("path_len must be a non-negative integer, got '{}'", raw))?,
            None => 0,
        };
        let seed = seed.filter(|s| !s.is_empty()).map(String::from);

        Ok(Self {
            rows,
            cols,
            seed,
            path_len,
            out_format: out_format.to_string(),
        })
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    /// The seed, if one was supplied. Seed presence decides cacheability:
    /// a seeded generation is deterministic, an unseeded one is not.
    pub fn seed(&self) -> Option<&str> {
        self.seed.as_deref()
    }

    pub fn path_len(&self) -> u32 {
        self.path_len
    }

    pub fn out_format(&self) -> &str {
        &self.out_format
    }
}

fn parse_dimension(name: &str, raw: Option<&str>, default: u32) -> Result<u32, String> {
    match raw {
        None => Ok(default),
        Some(raw) => match raw.parse::<u32>() {
            Ok(value) if value >= 1 => Ok(value),
            _ => Err(format!("{} must be a positive integer, got '{}'", name, raw)),
        },
    }
}

/// Outcome of one generator invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationResult {
    /// The generator exited zero; the artifact exists at `artifact`.
    Success {
        artifact: FilePath,
        mime: &'static str,
    },
    /// The generator exited non-zero. Both values are surfaced to the
    /// client verbatim; diagnostics are never discarded.
    Failure { exit_code: i32, stderr: String },
    /// The generator exceeded the execution bound and was killed.
    TimedOut,
}

/* # Why a unique output path per request?

The reference behavior wrote every artifact to one shared configured path,
so two concurrent requests could interleave write and read and hand a client
a wrong or truncated artifact. Each invocation instead writes to
`<out_path>.<pid>.<seq>`; the file is removed when the response body that
streams it is dropped.
*/

/// Builds and executes generator invocations.
#[derive(Debug)]
pub struct GenerationInvoker {
    pal: PalHandle,
    exec_path: String,
    out_base: FilePath,
    sequence: AtomicU64,
}

impl GenerationInvoker {
    pub fn new(pal: PalHandle, exec_path: impl Into<String>, out_base: FilePath) -> Self {
        Self {
            pal,
            exec_path: exec_path.into(),
            out_base,
            sequence: AtomicU64::new(0),
        }
    }

    fn unique_output_path(&self) -> FilePath {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        FilePath::from(format!(
            "{}.{}.{}",
            self.out_base.as_str(),
            std::process::id(),
            seq
        ))
    }

    /// The exact invocation for a request and output path. Arguments are
    /// discrete tokens; caller-supplied values never pass through a shell.
    fn command_for(&self, request: &GenerationRequest, output_path: &FilePath) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.exec_path)
            .arg("--rows")
            .arg(request.rows().to_string())
            .arg("--cols")
            .arg(request.cols().to_string())
            .arg("--path-len")
            .arg(request.path_len().to_string())
            .arg("-f")
            .arg(output_path.as_str())
            .arg("--format")
            .arg(request.out_format())
            .with_timeout(GENERATION_TIMEOUT);
        if let Some(seed) = request.seed() {
            spec = spec.arg("--seed").arg(seed);
        }
        spec
    }

    /// Run the generator for the given request.
    ///
    /// `Err` means the generator could not be executed at all; a generator
    /// that ran and failed is an `Ok(GenerationResult::Failure { .. })`.
    pub fn invoke(&self, request: &GenerationRequest) -> MazewebResult<GenerationResult> {
        let output_path = self.unique_output_path();
        let spec = self.command_for(request, &output_path);
        info!(command = %spec, "invoking maze generator");

        let output = self
            .pal
            .run_command(&spec)
            .context("running maze generator")?;

        match output.status {
            CommandStatus::Exited(0) => {
                debug!(artifact = %output_path, "generation succeeded");
                Ok(GenerationResult::Success {
                    artifact: output_path,
                    mime: mime_type(request.out_format()),
                })
            }
            CommandStatus::Exited(code) => {
                warn!(code, "maze generator failed");
                Ok(GenerationResult::Failure {
                    exit_code: code,
                    stderr: output.stderr_utf8(),
                })
            }
            CommandStatus::TimedOut => {
                warn!("maze generator timed out");
                Ok(GenerationResult::TimedOut)
            }
        }
    }
}

/// A reader over a generated artifact that removes the file when dropped.
///
/// The response body streams from this reader, so the per-request temp file
/// is released as soon as the response has been written out.
pub struct ArtifactStream {
    reader: Box<dyn ReadSeek + Send>,
    pal: PalHandle,
    path: FilePath,
}

impl ArtifactStream {
    /// Open the artifact at `path` for streaming.
    pub fn open(pal: PalHandle, path: FilePath) -> MazewebResult<Self> {
        let reader = pal.read_file(&path)?;
        Ok(Self { reader, pal, path })
    }
}

impl std::io::Read for ArtifactStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Drop for ArtifactStream {
    fn drop(&mut self) {
        if let Err(e) = self.pal.remove_file(&self.path) {
            debug!(path = %self.path, error = %e, "failed to remove artifact file");
        }
    }
}
