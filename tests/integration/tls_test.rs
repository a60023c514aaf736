//! TLS handshakes served from a provider

use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tokio_util::sync::CancellationToken;
use vault_autocert::tls::crypto_provider;
use vault_autocert::{CertProvider, ExhaustionPolicy};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::integration::{fixtures, MockVaultServer, PATH_ISSUE};

fn client_config(trusted: &fixtures::Material) -> Arc<ClientConfig> {
    let mut roots = RootCertStore::empty();
    roots.add(trusted.leaf_der.clone()).expect("trust anchor");

    let config = ClientConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Arc::new(config)
}

async fn serve_once(acceptor: TlsAcceptor, listener: TcpListener) {
    let (stream, _) = listener.accept().await.unwrap();
    if let Ok(mut tls) = acceptor.accept(stream).await {
        let _ = tls.write_all(b"hello").await;
        let _ = tls.shutdown().await;
    }
}

#[tokio::test]
async fn test_handshake_presents_issued_certificate() {
    let mock = MockVaultServer::start().await;
    let material = fixtures::generate("localhost");
    Mock::given(method("POST"))
        .and(path(PATH_ISSUE))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::secret_json(60, &material)))
        .mount(mock.inner())
        .await;

    let config = mock.config_builder().build().unwrap();
    let cancel = CancellationToken::new();
    let provider = CertProvider::new(&config, cancel.clone()).await.unwrap();
    let acceptor = TlsAcceptor::from(provider.server_config().unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(serve_once(acceptor, listener));

    let connector = TlsConnector::from(client_config(&material));
    let stream = TcpStream::connect(addr).await.unwrap();
    let mut tls = connector
        .connect(ServerName::try_from("localhost").unwrap(), stream)
        .await
        .expect("handshake failed");

    let (_, session) = tls.get_ref();
    let presented = session.peer_certificates().expect("server certificates");
    assert_eq!(presented.len(), 2);
    assert_eq!(presented[0], material.leaf_der);

    let mut buf = Vec::new();
    tls.read_to_end(&mut buf).await.unwrap();
    assert_eq!(buf, b"hello");

    server.await.unwrap();
    cancel.cancel();
}

#[tokio::test]
async fn test_handshake_refused_once_expired() {
    let mock = MockVaultServer::start().await;
    let material = fixtures::generate("localhost");
    Mock::given(method("POST"))
        .and(path(PATH_ISSUE))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::secret_json(1, &material)))
        .up_to_n_times(1)
        .mount(mock.inner())
        .await;
    mock.mock_error(503, "Vault is sealed").await;

    let config = mock
        .config_builder()
        .renew_modifier(1.0)
        .retry_delay(Duration::from_secs(60))
        .on_exhausted(ExhaustionPolicy::ReportExpired)
        .build()
        .unwrap();
    let cancel = CancellationToken::new();
    let provider = CertProvider::new(&config, cancel.clone()).await.unwrap();
    let acceptor = TlsAcceptor::from(provider.server_config().unwrap());

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(serve_once(acceptor, listener));

    let connector = TlsConnector::from(client_config(&material));
    let stream = TcpStream::connect(addr).await.unwrap();
    let result = connector
        .connect(ServerName::try_from("localhost").unwrap(), stream)
        .await;
    assert!(result.is_err(), "handshake with expired certificate succeeded");

    server.await.unwrap();
    cancel.cancel();
}
