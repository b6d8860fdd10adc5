use std::time::Duration;

use mazeweb_base::PalHandle;
use mazeweb_base::pal::CommandSpec;
use tracing::debug;

/// Bound on the revision lookup; a hung `git` must not stall requests.
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of a source-revision lookup.
///
/// An explicit enum rather than `Option<String>` so that "lookup failed"
/// cannot be confused with an empty-but-valid identifier by callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedVersion {
    /// A short commit identifier was resolved.
    Available(String),
    /// The lookup failed in some way; version metadata is simply omitted.
    Unavailable,
}

impl ResolvedVersion {
    /// The commit identifier, if one was resolved.
    pub fn commit(&self) -> Option<&str> {
        match self {
            Self::Available(commit) => Some(commit),
            Self::Unavailable => None,
        }
    }
}

/// Best-effort lookup of the short commit identifier of the running source.
///
/// Version information decorates responses but must never cause a request to
/// fail, so every failure mode (missing git, not a repository, non-zero exit,
/// timeout, empty output) collapses into `ResolvedVersion::Unavailable`.
/// One attempt per call, no caching; the lookup is cheap next to generation.
#[derive(Debug, Clone)]
pub struct VersionResolver {
    pal: PalHandle,
}

impl VersionResolver {
    pub fn new(pal: PalHandle) -> Self {
        Self { pal }
    }

    /// Attempt to discover the short commit identifier.
    pub fn resolve(&self) -> ResolvedVersion {
        let spec = CommandSpec::new("git")
            .args(["rev-parse", "--short", "HEAD"])
            .with_timeout(LOOKUP_TIMEOUT);

        match self.pal.run_command(&spec) {
            Ok(output) if output.success() => {
                let commit = output.stdout_utf8().trim().to_string();
                if commit.is_empty() {
                    debug!("version lookup produced empty output");
                    ResolvedVersion::Unavailable
                } else {
                    debug!(%commit, "resolved source version");
                    ResolvedVersion::Available(commit)
                }
            }
            Ok(output) => {
                debug!(status = ?output.status, "version lookup exited unsuccessfully");
                ResolvedVersion::Unavailable
            }
            Err(e) => {
                debug!(error = %e, "version lookup could not be run");
                ResolvedVersion::Unavailable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mazeweb_base::MockPal;
    use mazeweb_base::pal::CommandOutput;

    fn resolver_with(handler: impl Fn(&CommandSpec) -> mazeweb_base::MazewebResult<CommandOutput> + Send + Sync + 'static) -> VersionResolver {
        let mock = MockPal::new();
        mock.set_command_handler(handler);
        VersionResolver::new(PalHandle::new(mock))
    }

    #[test]
    fn test_resolve_success_trims_newline() {
        let resolver = resolver_with(|_| Ok(CommandOutput::exited(0, "abc1234\n", "")));
        assert_eq!(
            resolver.resolve(),
            ResolvedVersion::Available("abc1234".to_string())
        );
    }

    #[test]
    fn test_resolve_nonzero_exit_is_unavailable() {
        let resolver = resolver_with(|_| {
            Ok(CommandOutput::exited(
                128,
                "",
                "fatal: not a git repository",
            ))
        });
        assert_eq!(resolver.resolve(), ResolvedVersion::Unavailable);
    }

    #[test]
    fn test_resolve_spawn_failure_is_unavailable() {
        let resolver =
            resolver_with(|_| Err(Box::new(mazeweb_base::MazewebError::message("no git"))));
        assert_eq!(resolver.resolve(), ResolvedVersion::Unavailable);
    }

    #[test]
    fn test_resolve_empty_output_is_unavailable() {
        let resolver = resolver_with(|_| Ok(CommandOutput::exited(0, "\n", "")));
        assert_eq!(resolver.resolve(), ResolvedVersion::Unavailable);
    }

    #[test]
    fn test_resolve_invokes_git_rev_parse() {
        let mock = MockPal::new();
        mock.set_command_handler(|_| Ok(CommandOutput::exited(0, "abc1234", "")));
        let resolver = VersionResolver::new(PalHandle::new(mock.clone()));
        resolver.resolve();

        let recorded = mock.recorded_commands();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].program(), "git");
        assert_eq!(recorded[0].args_slice(), &["rev-parse", "--short", "HEAD"]);
    }

    #[test]
    fn test_commit_accessor() {
        assert_eq!(
            ResolvedVersion::Available("abc".to_string()).commit(),
            Some("abc")
        );
        assert_eq!(ResolvedVersion::Unavailable.commit(), None);
    }
}
