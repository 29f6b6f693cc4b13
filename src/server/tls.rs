//! The TLS listener: certificate loading, self-signed generation, and the
//! accept loop bridging rustls streams into the router.

use std::sync::Arc;

use axum::Router;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use rcgen::{CertificateParams, DnType, KeyPair, SanType};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

//================================================================================================
// Functions
//================================================================================================

/// Builds the rustls server configuration from the listener settings,
/// generating a self-signed pair when no key/cert files are configured.
pub(crate) fn server_config(listen: &config::HttpsListen) -> anyhow::Result<Arc<rustls::ServerConfig>> {
    let (certs, key) = match (&listen.cert, &listen.key) {
        (Some(cert), Some(key)) => {
            let certs = pem_certificates(&std::fs::read(cert)?)?;
            let key = pem_private_key(&std::fs::read(key)?)?;
            (certs, key)
        }
        _ => {
            tracing::info!("no TLS key material configured, generating a self-signed pair");
            self_signed()?
        }
    };

    let mut config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

/// Generates a throwaway certificate for `localhost` and `127.0.0.1`.
fn self_signed() -> anyhow::Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let mut params = CertificateParams::default();
    params
        .distinguished_name
        .push(DnType::CommonName, "localhub");
    params
        .subject_alt_names
        .push(SanType::DnsName("localhost".try_into()?));
    params
        .subject_alt_names
        .push(SanType::IpAddress("127.0.0.1".parse()?));
    let key = KeyPair::generate()?;
    let cert = params.self_signed(&key)?;

    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key.serialize_der()));
    Ok((vec![cert.der().clone()], key))
}

/// Accepts TLS connections and serves each over HTTP/1.1.
pub(crate) async fn serve(
    listener: TcpListener,
    config: Arc<rustls::ServerConfig>,
    app: Router,
) {
    let acceptor = TlsAcceptor::from(config);
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(error = %e, "https accept failed");
                continue;
            }
        };
        let acceptor = acceptor.clone();
        let app = app.clone();
        tokio::spawn(async move {
            let stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::debug!(error = %e, peer = %peer, "tls handshake failed");
                    return;
                }
            };
            let service = TowerToHyperService::new(app);
            if let Err(e) = hyper::server::conn::http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                tracing::debug!(error = %e, peer = %peer, "https connection ended");
            }
        });
    }
}

/// Extracts every CERTIFICATE block from a PEM bundle.
fn pem_certificates(pem: &[u8]) -> anyhow::Result<Vec<CertificateDer<'static>>> {
    let blocks = pem_blocks(pem, "CERTIFICATE")?;
    if blocks.is_empty() {
        anyhow::bail!("no certificates found in the configured cert file");
    }
    Ok(blocks.into_iter().map(CertificateDer::from).collect())
}

/// Extracts the first private key block from a PEM file.
fn pem_private_key(pem: &[u8]) -> anyhow::Result<PrivateKeyDer<'static>> {
    for label in ["PRIVATE KEY", "RSA PRIVATE KEY", "EC PRIVATE KEY"] {
        if let Some(der) = pem_blocks(pem, label)?.into_iter().next() {
            return PrivateKeyDer::try_from(der)
                .map_err(|e| anyhow::anyhow!("unusable private key: {e}"));
        }
    }
    anyhow::bail!("no private key found in the configured key file")
}

/// Collects the base64 payloads of every `-----BEGIN <label>-----` block.
fn pem_blocks(pem: &[u8], label: &str) -> anyhow::Result<Vec<Vec<u8>>> {
    use base64::prelude::{BASE64_STANDARD, Engine as _};

    let text = std::str::from_utf8(pem)?;
    let begin = format!("-----BEGIN {label}-----");
    let end = format!("-----END {label}-----");

    let mut blocks = Vec::new();
    let mut current: Option<String> = None;
    for line in text.lines() {
        let line = line.trim();
        if line == begin {
            current = Some(String::new());
        } else if line == end {
            if let Some(b64) = current.take() {
                blocks.push(BASE64_STANDARD.decode(b64)?);
            }
        } else if let Some(buf) = current.as_mut() {
            buf.push_str(line);
        }
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_signed_material_is_usable() {
        let (certs, _key) = self_signed().unwrap();
        assert_eq!(certs.len(), 1);
        assert!(!certs[0].as_ref().is_empty());
    }

    #[test]
    fn pem_round_trip() {
        let key = KeyPair::generate().unwrap();
        let pem = key.serialize_pem();
        let parsed = pem_private_key(pem.as_bytes()).unwrap();
        assert_eq!(parsed.secret_der(), key.serialize_der().as_slice());
    }
}
