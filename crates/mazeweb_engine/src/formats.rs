use std::collections::BTreeSet;
use std::time::Duration;

use mazeweb_base::pal::{CommandSpec, CommandStatus};
use mazeweb_base::{MazewebResult, PalHandle, ResultExt, err};
use tracing::debug;

/// Bound on the capability query; it should return near-instantly.
const CAPABILITY_TIMEOUT: Duration = Duration::from_secs(10);

/// Mapping of output formats to mime types. Formats the generator knows but
/// this table does not fall back to a generic binary stream.
pub fn mime_type(format: &str) -> &'static str {
    match format {
        "png" => "image/png",
        "text" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Queries the generator for the output formats it supports.
///
/// The set is re-queried on every request, exactly like the reference
/// behavior: the query is one cheap exec, and the generator binary on disk
/// may change at runtime.
#[derive(Debug, Clone)]
pub struct FormatNegotiator {
    pal: PalHandle,
    exec_path: String,
}

impl FormatNegotiator {
    pub fn new(pal: PalHandle, exec_path: impl Into<String>) -> Self {
        Self {
            pal,
            exec_path: exec_path.into(),
        }
    }

    /// Ask the generator which output formats it supports.
    ///
    /// Failure here is a server-side error (the capability query itself could
    /// not be completed), distinct from a requested format merely not being
    /// in the returned set.
    pub fn valid_formats(&self) -> MazewebResult<BTreeSet<String>> {
        let spec = CommandSpec::new(&self.exec_path)
            .arg("--print-valid-formats")
            .with_timeout(CAPABILITY_TIMEOUT);

        let output = self
            .pal
            .run_command(&spec)
            .context("querying valid output formats")?;

        match output.status {
            CommandStatus::Exited(0) => {}
            CommandStatus::Exited(code) => {
                return Err(err!(
                    "Format capability query exited with code {}: {}",
                    code,
                    output.stderr_utf8().trim()
                ));
            }
            CommandStatus::TimedOut => {
                return Err(err!("Format capability query timed out"));
            }
        }

        let formats: BTreeSet<String> = output
            .stdout_utf8()
            .split_whitespace()
            .map(String::from)
            .collect();
        debug!(?formats, "negotiated valid output formats");
        Ok(formats)
    }
}
