//! The Git Smart HTTP transport.
//!
//! Requests under `/:owner/:repo.git/` are parsed into one of the three
//! protocol actions and bridged onto a child `git` process: the (possibly
//! gzip-compressed) request body streams into the child's stdin while its
//! stdout streams straight back out as the response body. Nothing is
//! buffered beyond what the protocol framing requires.

use std::process::Stdio;

use async_compression::tokio::bufread::GzipDecoder;
use axum::body::Body;
use axum::extract::Request;
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use tokio::io::{AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::io::{ReaderStream, StreamReader};

use super::{AppState, raw};

//================================================================================================
// Types
//================================================================================================

/// The two services of the smart protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Service {
    UploadPack,
    ReceivePack,
}

/// A parsed smart-HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BackendCommand {
    /// `GET info/refs?service=git-…`: the ref advertisement.
    InfoRefs(Service),
    /// `POST git-…-pack`: the framed RPC exchange.
    Rpc(Service),
}

//================================================================================================
// Impls
//================================================================================================

impl Service {
    fn from_query(service: &str) -> Option<Self> {
        match service {
            "git-upload-pack" => Some(Service::UploadPack),
            "git-receive-pack" => Some(Service::ReceivePack),
            _ => None,
        }
    }

    /// The git subcommand implementing this service.
    pub fn command(self) -> &'static str {
        match self {
            Service::UploadPack => "upload-pack",
            Service::ReceivePack => "receive-pack",
        }
    }

    fn wire_name(self) -> &'static str {
        match self {
            Service::UploadPack => "git-upload-pack",
            Service::ReceivePack => "git-receive-pack",
        }
    }
}

impl BackendCommand {
    /// Maps `(method, path-tail, query)` onto a protocol action.
    pub fn parse(method: &Method, tail: &str, query: Option<&str>) -> Option<Self> {
        if method == Method::GET && tail == "info/refs" {
            let service = query?
                .split('&')
                .find_map(|pair| pair.strip_prefix("service="))?;
            return Some(BackendCommand::InfoRefs(Service::from_query(service)?));
        }
        if method == Method::POST {
            return match tail {
                "git-upload-pack" => Some(BackendCommand::Rpc(Service::UploadPack)),
                "git-receive-pack" => Some(BackendCommand::Rpc(Service::ReceivePack)),
                _ => None,
            };
        }
        None
    }

    /// The response content type for this action.
    pub fn content_type(self) -> String {
        match self {
            BackendCommand::InfoRefs(service) => {
                format!("application/x-{}-advertisement", service.wire_name())
            }
            BackendCommand::Rpc(service) => {
                format!("application/x-{}-result", service.wire_name())
            }
        }
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Entry point for `ANY /:owner/:repo.git/*`.
pub(crate) async fn handle(
    state: AppState,
    owner: String,
    repo: String,
    tail: String,
    req: Request,
) -> Response {
    let Some(command) = BackendCommand::parse(req.method(), &tail, req.uri().query()) else {
        return raw::not_found();
    };

    let repo_path = state.repos.resolve(&owner, &repo);
    if !repo_path.join("HEAD").exists() && !repo_path.join(".git").exists() {
        return raw::not_found();
    }

    match command {
        BackendCommand::InfoRefs(service) => advertise(command, service, repo_path).await,
        BackendCommand::Rpc(service) => rpc(command, service, repo_path, req).await,
    }
}

/// `GET info/refs`: the pkt-line service prelude followed by the
/// advertisement produced by `git <service> --advertise-refs`.
async fn advertise(
    command: BackendCommand,
    service: Service,
    repo_path: std::path::PathBuf,
) -> Response {
    let output = Command::new("git")
        .arg(service.command())
        .arg("--stateless-rpc")
        .arg("--advertise-refs")
        .arg(&repo_path)
        .output()
        .await;

    let output = match output {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            tracing::error!(
                stderr = %String::from_utf8_lossy(&output.stderr),
                "ref advertisement failed"
            );
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to spawn git");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut body = pkt_line(&format!("# service={}\n", service.wire_name()));
    body.extend_from_slice(b"0000");
    body.extend_from_slice(&output.stdout);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, command.content_type())
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from(body))
        .unwrap_or_default()
}

/// `POST git-…-pack`: stream the request into the child and its stdout back
/// out, strictly in pipeline order.
async fn rpc(
    command: BackendCommand,
    service: Service,
    repo_path: std::path::PathBuf,
    req: Request,
) -> Response {
    let gzipped = req
        .headers()
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("gzip"));

    let mut child = match Command::new("git")
        .arg(service.command())
        .arg("--stateless-rpc")
        .arg(&repo_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            tracing::error!(error = %e, "failed to spawn git");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let Some(mut stdin) = child.stdin.take() else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    let Some(stdout) = child.stdout.take() else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let body_reader = StreamReader::new(
        req.into_body()
            .into_data_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other)),
    );
    tokio::spawn(async move {
        let result = if gzipped {
            let mut decoder = GzipDecoder::new(BufReader::new(body_reader));
            feed(&mut decoder, &mut stdin).await
        } else {
            let mut reader = body_reader;
            feed(&mut reader, &mut stdin).await
        };
        if let Err(e) = result {
            tracing::debug!(error = %e, "request body pipe ended early");
        }
        // stdin drops here, closing the child's input.
    });

    // The child handle rides along with the stream so a client disconnect
    // tears the process down.
    let stream = ReaderStream::new(stdout).map(move |chunk| {
        let _keep_alive = &child;
        chunk
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, command.content_type())
        .body(Body::from_stream(stream))
        .unwrap_or_default()
}

async fn feed<R>(reader: &mut R, stdin: &mut tokio::process::ChildStdin) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    tokio::io::copy(reader, stdin).await
}

/// Frames one pkt-line.
fn pkt_line(payload: &str) -> Vec<u8> {
    let mut line = format!("{:04x}", payload.len() + 4).into_bytes();
    line.extend_from_slice(payload.as_bytes());
    line
}
