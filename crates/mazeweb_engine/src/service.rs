use std::collections::BTreeSet;

use mazeweb_base::pal::http::{
    HttpBody, HttpMethod, HttpRequest, HttpResponse, HttpService,
};
use mazeweb_base::{MazewebResult, PalHandle};
use tracing::{info, instrument, warn};

use crate::config::GatewayConfig;
use crate::formats::FormatNegotiator;
use crate::generate::{ArtifactStream, GenerationInvoker, GenerationRequest, GenerationResult};
use crate::link::{Link, LinkHeader};
use crate::version::{ResolvedVersion, VersionResolver};

/// Upstream project the gateway fronts; used for Link header metadata.
const PROJECT_URL: &str = "https://github.com/mxmeinhold/maze-generator";

/// Format served at the bare root path.
const DEFAULT_FORMAT: &str = "png";

/// Cache lifetime for seeded (deterministic) artifacts, in seconds.
const SEEDED_MAX_AGE: u32 = 3600;

/* # Routing

GET /            -> generate a maze in the default format (png)
GET /<format>    -> generate a maze in the named format
GET /_version    -> short commit identifier of the running source

Anything deeper than one path segment is a 404, any method other than GET is
a 405. All error bodies are plain text.
*/

/// The HTTP service for the maze gateway.
#[derive(Debug)]
pub struct GatewayService {
    config: GatewayConfig,
    formats: FormatNegotiator,
    invoker: GenerationInvoker,
    version: VersionResolver,
    pal: PalHandle,
}

impl GatewayService {
    pub fn new(pal: PalHandle, config: GatewayConfig) -> Self {
        let formats = FormatNegotiator::new(pal.clone(), config.exec_path.clone());
        let invoker = GenerationInvoker::new(pal.clone(), config.exec_path.clone(), config.out_file());
        let version = VersionResolver::new(pal.clone());
        Self {
            config,
            formats,
            invoker,
            version,
            pal,
        }
    }

    /// Handle `GET /` and `GET /<format>`.
    fn maze(&self, out_format: &str, request: &HttpRequest) -> MazewebResult<HttpResponse> {
        let generation = match GenerationRequest::from_query(
            request.query_param("rows"),
            request.query_param("cols"),
            request.query_param("seed"),
            request.query_param("path_len"),
            out_format,
            self.config.default_size,
        ) {
            Ok(generation) => generation,
            Err(message) => {
                info!(%message, "rejecting malformed request");
                return Ok(plain(HttpResponse::bad_request(), message));
            }
        };

        let valid = match self.formats.valid_formats() {
            Ok(valid) => valid,
            Err(e) => {
                warn!(error = %e, "format negotiation failed");
                return Ok(plain(
                    HttpResponse::internal_error(),
                    format!("could not determine valid output formats: {}", e),
                ));
            }
        };
        if !valid.contains(out_format) {
            return Ok(plain(
                HttpResponse::not_found(),
                format!(
                    "out_format {} must be one of {}",
                    out_format,
                    render_format_set(&valid)
                ),
            ));
        }

        match self.invoker.invoke(&generation)? {
            GenerationResult::Success { artifact, mime } => {
                let stream = ArtifactStream::open(self.pal.clone(), artifact)?;
                let max_age = if generation.seed().is_some() {
                    SEEDED_MAX_AGE
                } else {
                    0
                };
                let response = HttpResponse::ok()
                    .with_content_type(mime)
                    .with_header("Cache-Control", format!("max-age={}", max_age))
                    .with_body(HttpBody::from_reader(stream));
                Ok(with_version_metadata(response, &self.version.resolve()))
            }
            GenerationResult::Failure { exit_code, stderr } => Ok(plain(
                HttpResponse::internal_error(),
                format!("maze generation failed with exit code {}:\n{}", exit_code, stderr),
            )),
            GenerationResult::TimedOut => Ok(plain(
                HttpResponse::gateway_timeout(),
                "maze generation timed out",
            )),
        }
    }

    /// Handle `GET /_version`.
    fn version(&self) -> HttpResponse {
        let resolved = self.version.resolve();
        let response = match &resolved {
            ResolvedVersion::Available(commit) => HttpResponse::text(commit.clone()),
            ResolvedVersion::Unavailable => plain(
                HttpResponse::internal_error(),
                "could not determine running version",
            ),
        };
        with_version_metadata(response, &resolved)
    }
}

/// Attach version metadata headers to a response.
///
/// The Link header always carries the canonical project reference; the
/// version-history link and X-Version appear only when the commit could be
/// resolved.
fn with_version_metadata(response: HttpResponse, resolved: &ResolvedVersion) -> HttpResponse {
    let mut links = vec![
        Link::new(PROJECT_URL)
            .param("rel", "latest-version")
            .param("rel", "edit"),
    ];
    if let Some(commit) = resolved.commit() {
        links.push(
            Link::new(format!("{}/tree/{}", PROJECT_URL, commit)).param("rel", "version-history"),
        );
    }
    let response = response.with_header("Link", LinkHeader::new(links).to_string());
    match resolved.commit() {
        Some(commit) => response.with_header("X-Version", commit),
        None => response,
    }
}

impl HttpService for GatewayService {
    #[instrument(skip_all, fields(method = %request.method(), path = request.path()))]
    fn handle_request(&self, request: HttpRequest) -> MazewebResult<HttpResponse> {
        if request.method() != &HttpMethod::Get {
            return Ok(plain(
                HttpResponse::method_not_allowed(),
                "only GET is supported",
            ));
        }

        match request.path() {
            "/_version" => Ok(self.version()),
            "/" => self.maze(DEFAULT_FORMAT, &request),
            path => match path.strip_prefix('/') {
                Some(segment) if !segment.is_empty() && !segment.contains('/') => {
                    self.maze(segment, &request)
                }
                _ => Ok(plain(HttpResponse::not_found(), "not found")),
            },
        }
    }
}

/// A response with a plain text body.
fn plain(response: HttpResponse, body: impl Into<String>) -> HttpResponse {
    response.with_content_type("text/plain").with_body(body.into())
}

/// Render the valid-format set for the 404 body, in set order.
fn render_format_set(formats: &BTreeSet<String>) -> String {
    let mut rendered = String::from("{");
    for (i, format) in formats.iter().enumerate() {
        if i > 0 {
            rendered.push_str(", ");
        }
        rendered.push_str(format);
    }
    rendered.push('}');
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use mazeweb_base::pal::{CommandOutput, CommandSpec, FilePath};
    use mazeweb_base::pal::http::HttpStatusCode;
    use mazeweb_base::MockPal;

    /// Scripts the mock to behave like a working installation: git resolves
    /// to abc1234, the generator knows png and text and writes its artifact
    /// to the path given via -f.
    fn install_working_generator(mock: &MockPal) {
        let writer = mock.clone();
        mock.set_command_handler(move |spec: &CommandSpec| {
            if spec.program() == "git" {
                return Ok(CommandOutput::exited(0, "abc1234\n", ""));
            }
            let args = spec.args_slice();
            if args.iter().any(|a| a == "--print-valid-formats") {
                return Ok(CommandOutput::exited(0, "png text\n", ""));
            }
            let out_path = args
                .iter()
                .position(|a| a == "-f")
                .and_then(|i| args.get(i + 1))
                .expect("generation without -f argument");
            writer.add_file(FilePath::from(out_path.as_str()), b"MAZEDATA".to_vec());
            Ok(CommandOutput::exited(0, "", ""))
        });
    }

    fn gateway(mock: &MockPal) -> GatewayService {
        GatewayService::new(PalHandle::new(mock.clone()), GatewayConfig::default())
    }

    fn get(service: &GatewayService, url: &str) -> HttpResponse {
        service
            .handle_request(HttpRequest::new(HttpMethod::Get, url))
            .unwrap()
    }

    #[test]
    fn test_root_serves_default_format() {
        let mock = MockPal::new();
        install_working_generator(&mock);
        let service = gateway(&mock);

        let response = get(&service, "/");
        assert_eq!(response.status(), HttpStatusCode::Ok);
        assert_eq!(
            response.headers().get("Content-Type"),
            Some(&"image/png".to_string())
        );
        assert_eq!(response.into_body().read_to_bytes().unwrap(), b"MAZEDATA");

        let generation = mock
            .recorded_commands()
            .into_iter()
            .find(|spec| spec.args_slice().iter().any(|a| a == "--format"))
            .expect("generator invocation");
        let args = generation.args_slice();
        let format_pos = args.iter().position(|a| a == "--format").unwrap();
        assert_eq!(args[format_pos + 1], "png");
    }

    #[test]
    fn test_named_format_is_forwarded() {
        let mock = MockPal::new();
        install_working_generator(&mock);
        let service = gateway(&mock);

        let response = get(&service, "/text");
        assert_eq!(response.status(), HttpStatusCode::Ok);
        assert_eq!(
            response.headers().get("Content-Type"),
            Some(&"text/plain".to_string())
        );
    }

    #[test]
    fn test_query_parameters_reach_the_generator() {
        let mock = MockPal::new();
        install_working_generator(&mock);
        let service = gateway(&mock);

        get(&service, "/png?rows=7&cols=9&seed=xyz&path_len=4");

        let generation = mock
            .recorded_commands()
            .into_iter()
            .find(|spec| spec.args_slice().iter().any(|a| a == "--rows"))
            .expect("generator invocation");
        let args = generation.args_slice();
        for window in [
            ["--rows", "7"],
            ["--cols", "9"],
            ["--path-len", "4"],
            ["--seed", "xyz"],
        ] {
            let pos = args.iter().position(|a| a == window[0]).unwrap();
            assert_eq!(args[pos + 1], window[1]);
        }
    }

    #[test]
    fn test_seeded_request_is_cacheable() {
        let mock = MockPal::new();
        install_working_generator(&mock);
        let service = gateway(&mock);

        let seeded = get(&service, "/?seed=abc");
        assert_eq!(
            seeded.headers().get("Cache-Control"),
            Some(&"max-age=3600".to_string())
        );

        let unseeded = get(&service, "/");
        assert_eq!(
            unseeded.headers().get("Cache-Control"),
            Some(&"max-age=0".to_string())
        );
    }

    #[test]
    fn test_empty_seed_is_not_cacheable() {
        let mock = MockPal::new();
        install_working_generator(&mock);
        let service = gateway(&mock);

        let response = get(&service, "/?seed=");
        assert_eq!(
            response.headers().get("Cache-Control"),
            Some(&"max-age=0".to_string())
        );
    }

    #[test]
    fn test_version_metadata_headers() {
        let mock = MockPal::new();
        install_working_generator(&mock);
        let service = gateway(&mock);

        let response = get(&service, "/");
        assert_eq!(
            response.headers().get("X-Version"),
            Some(&"abc1234".to_string())
        );
        let link = response.headers().get("Link").expect("Link header");
        assert_eq!(
            link,
            "<https://github.com/mxmeinhold/maze-generator>; rel=latest-version; rel=edit, \
             <https://github.com/mxmeinhold/maze-generator/tree/abc1234>; rel=version-history"
        );
    }

    #[test]
    fn test_version_metadata_degrades_without_git() {
        let mock = MockPal::new();
        let writer = mock.clone();
        mock.set_command_handler(move |spec: &CommandSpec| {
            if spec.program() == "git" {
                return Ok(CommandOutput::exited(128, "", "fatal: not a git repository"));
            }
            let args = spec.args_slice();
            if args.iter().any(|a| a == "--print-valid-formats") {
                return Ok(CommandOutput::exited(0, "png\n", ""));
            }
            let out_path = args
                .iter()
                .position(|a| a == "-f")
                .and_then(|i| args.get(i + 1))
                .expect("generation without -f argument");
            writer.add_file(FilePath::from(out_path.as_str()), b"MAZEDATA".to_vec());
            Ok(CommandOutput::exited(0, "", ""))
        });
        let service = gateway(&mock);

        let response = get(&service, "/");
        assert_eq!(response.status(), HttpStatusCode::Ok);
        assert!(!response.headers().contains("X-Version"));
        assert_eq!(
            response.headers().get("Link"),
            Some(
                &"<https://github.com/mxmeinhold/maze-generator>; rel=latest-version; rel=edit"
                    .to_string()
            )
        );
    }

    #[test]
    fn test_artifact_file_removed_after_response_consumed() {
        let mock = MockPal::new();
        install_working_generator(&mock);
        let service = gateway(&mock);

        let response = get(&service, "/");
        let artifact_path = FilePath::from(format!("maze.out.{}.1", std::process::id()));
        assert!(mock.file_bytes(&artifact_path).is_some());

        response.into_body().read_to_bytes().unwrap();
        assert!(mock.file_bytes(&artifact_path).is_none());
    }

    #[test]
    fn test_unknown_format_is_404_listing_valid_set() {
        let mock = MockPal::new();
        install_working_generator(&mock);
        let service = gateway(&mock);

        let response = get(&service, "/svg");
        assert_eq!(response.status(), HttpStatusCode::NotFound);
        assert_eq!(
            response.body().as_string(),
            Some("out_format svg must be one of {png, text}".to_string())
        );
    }

    #[test]
    fn test_malformed_integers_are_400_without_invocation() {
        let mock = MockPal::new();
        install_working_generator(&mock);
        let service = gateway(&mock);

        let response = get(&service, "/?rows=ten");
        assert_eq!(response.status(), HttpStatusCode::BadRequest);
        assert!(response.body().as_string().unwrap().contains("rows"));
        assert!(mock.recorded_commands().is_empty());
    }

    #[test]
    fn test_zero_rows_are_rejected() {
        let mock = MockPal::new();
        install_working_generator(&mock);
        let service = gateway(&mock);

        let response = get(&service, "/?rows=0");
        assert_eq!(response.status(), HttpStatusCode::BadRequest);
    }

    #[test]
    fn test_non_get_methods_are_405() {
        let mock = MockPal::new();
        install_working_generator(&mock);
        let service = gateway(&mock);

        let response = service
            .handle_request(HttpRequest::new(HttpMethod::Post, "/"))
            .unwrap();
        assert_eq!(response.status(), HttpStatusCode::MethodNotAllowed);
        assert!(mock.recorded_commands().is_empty());
    }

    #[test]
    fn test_multi_segment_paths_are_404() {
        let mock = MockPal::new();
        install_working_generator(&mock);
        let service = gateway(&mock);

        let response = get(&service, "/png/extra");
        assert_eq!(response.status(), HttpStatusCode::NotFound);
        assert!(mock.recorded_commands().is_empty());
    }

    #[test]
    fn test_generation_failure_surfaces_exit_code_and_stderr() {
        let mock = MockPal::new();
        mock.set_command_handler(|spec: &CommandSpec| {
            if spec.program() == "git" {
                return Ok(CommandOutput::exited(0, "abc1234\n", ""));
            }
            if spec.args_slice().iter().any(|a| a == "--print-valid-formats") {
                return Ok(CommandOutput::exited(0, "png\n", ""));
            }
            Ok(CommandOutput::exited(3, "", "rows out of range"))
        });
        let service = gateway(&mock);

        let response = get(&service, "/");
        assert_eq!(response.status(), HttpStatusCode::InternalServerError);
        let body = response.body().as_string().unwrap();
        assert!(body.contains("exit code 3"));
        assert!(body.contains("rows out of range"));
    }

    #[test]
    fn test_generation_timeout_is_504() {
        let mock = MockPal::new();
        mock.set_command_handler(|spec: &CommandSpec| {
            if spec.program() == "git" {
                return Ok(CommandOutput::exited(0, "abc1234\n", ""));
            }
            if spec.args_slice().iter().any(|a| a == "--print-valid-formats") {
                return Ok(CommandOutput::exited(0, "png\n", ""));
            }
            Ok(CommandOutput::timed_out())
        });
        let service = gateway(&mock);

        let response = get(&service, "/");
        assert_eq!(response.status(), HttpStatusCode::GatewayTimeout);
    }

    #[test]
    fn test_negotiation_failure_is_500() {
        let mock = MockPal::new();
        mock.set_command_handler(|spec: &CommandSpec| {
            if spec.args_slice().iter().any(|a| a == "--print-valid-formats") {
                return Ok(CommandOutput::exited(1, "", "no such flag"));
            }
            Ok(CommandOutput::exited(0, "", ""))
        });
        let service = gateway(&mock);

        let response = get(&service, "/");
        assert_eq!(response.status(), HttpStatusCode::InternalServerError);
        assert!(response.body().as_string().unwrap().contains("formats"));
    }

    #[test]
    fn test_version_endpoint() {
        let mock = MockPal::new();
        install_working_generator(&mock);
        let service = gateway(&mock);

        let response = get(&service, "/_version");
        assert_eq!(response.status(), HttpStatusCode::Ok);
        assert_eq!(response.body().as_string(), Some("abc1234".to_string()));
        assert_eq!(
            response.headers().get("Content-Type"),
            Some(&"text/plain".to_string())
        );
        assert_eq!(
            response.headers().get("X-Version"),
            Some(&"abc1234".to_string())
        );
        assert!(
            response
                .headers()
                .get("Link")
                .unwrap()
                .contains("rel=version-history")
        );
    }

    #[test]
    fn test_version_endpoint_unavailable_is_500() {
        let mock = MockPal::new();
        mock.set_command_handler(|_| Ok(CommandOutput::exited(128, "", "fatal")));
        let service = gateway(&mock);

        let response = get(&service, "/_version");
        assert_eq!(response.status(), HttpStatusCode::InternalServerError);
        assert!(!response.headers().contains("X-Version"));
        let link = response.headers().get("Link").unwrap();
        assert!(link.contains("rel=latest-version"));
        assert!(!link.contains("rel=version-history"));
    }

    #[test]
    fn test_identical_seeded_requests_produce_identical_invocations() {
        let mock = MockPal::new();
        install_working_generator(&mock);
        let service = gateway(&mock);

        get(&service, "/png?rows=10&cols=10&seed=abc");
        get(&service, "/png?rows=10&cols=10&seed=abc");

        let generations: Vec<CommandSpec> = mock
            .recorded_commands()
            .into_iter()
            .filter(|spec| spec.args_slice().iter().any(|a| a == "--rows"))
            .collect();
        assert_eq!(generations.len(), 2);

        // Everything except the per-request output path must match exactly.
        let args_without_output_path = |spec: &CommandSpec| {
            let mut args = spec.args_slice().to_vec();
            let pos = args.iter().position(|a| a == "-f").unwrap();
            args.remove(pos + 1);
            args
        };
        assert_eq!(
            args_without_output_path(&generations[0]),
            args_without_output_path(&generations[1])
        );
    }

    #[test]
    fn test_render_format_set() {
        let formats: BTreeSet<String> =
            ["text", "png"].iter().map(|s| s.to_string()).collect();
        assert_eq!(render_format_set(&formats), "{png, text}");
    }
}
