//! Rewrites subdomains of configured base domains into path prefixes.
//!
//! With `subdomain_mapping.enable` and `base_domains = ["localtest.me"]`, a
//! request for `http://codeload.localtest.me/o/r/zip/main` is routed as if
//! it were `/codeload/o/r/zip/main`. Rewritten requests are tagged with
//! [`Mapped`] so URL composition swaps the external host for
//! `localhost:<port>`.

use axum::extract::{Request, State};
use axum::http::{Uri, header};
use axum::middleware::Next;
use axum::response::Response;

use super::AppState;

//================================================================================================
// Types
//================================================================================================

/// Marker extension present on requests whose path came from a subdomain.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Mapped;

//================================================================================================
// Functions
//================================================================================================

/// The rewrite middleware; a pure transform that never fails a request.
pub(crate) async fn rewrite(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let mapping = &state.config.subdomain_mapping;
    if mapping.enable {
        let host = req
            .headers()
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .map(|h| h.split(':').next().unwrap_or(h).to_string());
        if let Some(host) = host {
            if let Some(prefix) = subdomain_prefix(&host, &mapping.base_domains) {
                let original = req
                    .uri()
                    .path_and_query()
                    .map(|pq| pq.as_str())
                    .unwrap_or("/");
                if let Ok(uri) = format!("{prefix}{original}").parse::<Uri>() {
                    tracing::debug!(host = %host, rewritten = %uri, "mapped subdomain");
                    *req.uri_mut() = uri;
                    req.extensions_mut().insert(Mapped);
                }
            }
        }
    }
    next.run(req).await
}

/// Turns the subdomain portion of `host` into `/seg1/seg2/…`, or `None`
/// when no configured base domain matches.
fn subdomain_prefix(host: &str, base_domains: &[String]) -> Option<String> {
    for base in base_domains {
        let Some(sub) = host
            .strip_suffix(base.as_str())
            .and_then(|s| s.strip_suffix('.'))
        else {
            continue;
        };
        if sub.is_empty() {
            return None;
        }
        return Some(sub.split('.').fold(String::new(), |mut acc, seg| {
            acc.push('/');
            acc.push_str(seg);
            acc
        }));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_single_and_nested_subdomains() {
        let domains = vec!["localtest.me".to_string()];
        assert_eq!(
            subdomain_prefix("codeload.localtest.me", &domains),
            Some("/codeload".to_string())
        );
        assert_eq!(
            subdomain_prefix("raw.api.localtest.me", &domains),
            Some("/raw/api".to_string())
        );
    }

    #[test]
    fn ignores_bare_and_foreign_hosts() {
        let domains = vec!["localtest.me".to_string()];
        assert_eq!(subdomain_prefix("localtest.me", &domains), None);
        assert_eq!(subdomain_prefix("example.com", &domains), None);
        assert_eq!(subdomain_prefix("notlocaltest.me", &domains), None);
    }
}
