//! The HTTP(S) server: routing, shared state, and listener startup.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap, header};
use axum::middleware;
use axum::routing::get;
use config::Config;
use gitbox::RepoMap;
use tower_http::trace::TraceLayer;

mod api;
mod codeload;
mod dispatch;
mod error;
mod host;
mod html;
mod models;
mod raw;
mod smart;
mod tls;

pub use raw::RawHit;

//================================================================================================
// Types
//================================================================================================

/// Observer invoked for every successfully resolved raw-content request.
///
/// Panics raised by the observer are caught and logged; observability must
/// never break delivery.
pub type RawObserver = Arc<dyn Fn(&RawHit) + Send + Sync>;

/// A configured but not yet started server.
pub struct Server {
    config: Config,
    observer: Option<RawObserver>,
}

/// The bound listener ports; `None` means the listener is disabled.
#[derive(Debug, Clone, Copy)]
pub struct Started {
    /// The actual HTTP port, after ephemeral binding.
    pub http_port: u16,
    /// The actual HTTPS port, absent when TLS is not configured.
    pub https_port: Option<u16>,
}

/// Shared per-request state.
#[derive(Clone)]
pub(crate) struct AppState {
    pub config: Arc<Config>,
    pub repos: RepoMap,
    pub cache_dir: Arc<tempfile::TempDir>,
    pub observer: Option<RawObserver>,
    pub http_port: u16,
    pub https_port: Option<u16>,
}

/// Which listener a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnScheme {
    Http,
    Https,
}

/// The `<scheme>://<host>` prefix for composing self-referential URLs.
///
/// Requests rewritten by the subdomain mapper substitute
/// `localhost:<port-for-scheme>` so emitted URLs stay resolvable for
/// clients that do not share the wildcard DNS setup.
pub(crate) struct UrlBase(pub String);

//================================================================================================
// Impls
//================================================================================================

impl ConnScheme {
    fn as_str(self) -> &'static str {
        match self {
            ConnScheme::Http => "http",
            ConnScheme::Https => "https",
        }
    }
}

impl Server {
    /// Creates a server from the given configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            observer: None,
        }
    }

    /// Installs an observer for raw-content requests.
    pub fn with_raw_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&RawHit) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Builds the application router without binding any listener.
    ///
    /// Useful for tests and for embedding the route table into another
    /// server; self-referential URLs use the configured (not bound) ports.
    pub fn into_router(self) -> anyhow::Result<Router> {
        let Server { config, observer } = self;
        let state = AppState {
            repos: repo_map(&config),
            http_port: config.listen.http.port,
            https_port: config.listen.https.as_ref().map(|https| https.port),
            config: Arc::new(config),
            cache_dir: Arc::new(tempfile::TempDir::with_prefix("localhub-archives-")?),
            observer,
        };
        Ok(router(state))
    }

    /// Binds the configured listeners and starts serving.
    ///
    /// Listeners configured with port `0` bind an ephemeral port; the
    /// actual ports are reported in the returned [`Started`].
    pub async fn start(self) -> anyhow::Result<Started> {
        let Server { config, observer } = self;

        let http = &config.listen.http;
        let http_listener =
            tokio::net::TcpListener::bind((http.host.as_str(), http.port)).await?;
        let http_port = http_listener.local_addr()?.port();

        let https = match &config.listen.https {
            Some(https) => {
                let listener =
                    tokio::net::TcpListener::bind((https.host.as_str(), https.port)).await?;
                let port = listener.local_addr()?.port();
                let tls_config = tls::server_config(https)?;
                Some((listener, tls_config, port))
            }
            None => None,
        };
        let https_port = https.as_ref().map(|(_, _, port)| *port);

        let state = AppState {
            repos: repo_map(&config),
            config: Arc::new(config),
            cache_dir: Arc::new(tempfile::TempDir::with_prefix("localhub-archives-")?),
            observer,
            http_port,
            https_port,
        };

        let app = router(state);

        let http_app = app
            .clone()
            .layer(axum::Extension(ConnScheme::Http));
        tokio::spawn(async move {
            if let Err(e) = axum::serve(http_listener, http_app).await {
                tracing::error!(error = %e, "http listener failed");
            }
        });

        if let Some((listener, tls_config, _)) = https {
            let https_app = app.layer(axum::Extension(ConnScheme::Https));
            tokio::spawn(tls::serve(listener, tls_config, https_app));
        }

        Ok(Started {
            http_port,
            https_port,
        })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for UrlBase {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(UrlBase(base_url(&parts.extensions, &parts.headers, state)))
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Assembles the full route table over the given state.
pub(crate) fn router(state: AppState) -> Router {
    let trace = state.config.logs.req_log_format != "none";
    let router = Router::new()
        .route("/raw/:owner/:repo/*rest", get(raw::prefixed))
        .route("/api/repos/:owner/:repo/git/blobs/:sha", get(api::blob))
        .route("/api/repos/:owner/:repo/git/trees/*refsha", get(api::tree))
        .route("/api/repos/:owner/:repo/contents", get(api::contents_root))
        .route("/api/repos/:owner/:repo/contents/*path", get(api::contents))
        .route("/api/repos/:owner/:repo/commits", get(api::commits))
        .route("/api/repos/:owner/:repo/zipball", get(api::zipball_default))
        .route("/api/repos/:owner/:repo/zipball/*refname", get(api::zipball))
        .route("/api/repos/:owner/:repo/tarball", get(api::tarball_default))
        .route("/api/repos/:owner/:repo/tarball/*refname", get(api::tarball))
        .route("/codeload/:owner/:repo/:format/*refname", get(codeload::download))
        .fallback(dispatch::fallback)
        .layer(middleware::from_fn_with_state(state.clone(), host::rewrite));

    let router = if trace {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    };
    router.with_state(state)
}

/// Builds the repository resolver from configuration.
fn repo_map(config: &Config) -> RepoMap {
    let mounts: HashMap<String, HashMap<String, PathBuf>> = config
        .virtual_repos
        .iter()
        .map(|(owner, repos)| {
            let repos = repos
                .iter()
                .map(|(name, mount)| (name.clone(), mount.path.clone()))
                .collect();
            (owner.clone(), repos)
        })
        .collect();
    RepoMap::new(&config.repo_root, mounts)
}

/// Computes the `<scheme>://<host>` prefix for self-referential URLs.
pub(crate) fn base_url(
    extensions: &Extensions,
    headers: &HeaderMap,
    state: &AppState,
) -> String {
    let scheme = extensions
        .get::<ConnScheme>()
        .copied()
        .unwrap_or(ConnScheme::Http);
    let host = if extensions.get::<host::Mapped>().is_some() {
        let port = match scheme {
            ConnScheme::Http => state.http_port,
            ConnScheme::Https => state.https_port.unwrap_or(state.http_port),
        };
        format!("localhost:{port}")
    } else {
        headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("localhost")
            .to_string()
    };
    format!("{}://{host}", scheme.as_str())
}

/// Runs a blocking git operation off the async worker threads.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, gitbox::Error>
where
    F: FnOnce() -> Result<T, gitbox::Error> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => Err(gitbox::Error::Io(std::io::Error::other(e))),
    }
}
