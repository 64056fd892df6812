//! Measurement client and cycle orchestration.
//!
//! [`Client`] ties the pieces together: discover a server, run the
//! download meter, then the upload meter, and report a
//! [`MeasurementResult`]. The two directions run strictly in sequence so
//! they never contend for bandwidth, and each is isolated: a failure in
//! one is reported as a zero rate for that direction only.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{
    Connector, MaybeTlsStream, client_async_tls_with_config, connect_async_tls_with_config,
};
use url::Url;

use crate::download;
use crate::emitter::Emitter;
use crate::error::{Result, SpeedTestError};
use crate::locate::ServerSelector;
use crate::measurement::{Direction, MeasurementResult};
use crate::params::{self, Timing};
use crate::proxy::ProxyConfig;
use crate::session::TransportSession;
use crate::upload;

/// Stream type produced by [`Client::connect`].
pub type WsTransport = MaybeTlsStream<TcpStream>;

/// Builder for [`Client`].
pub struct ClientBuilder {
    client_name: String,
    client_version: String,
    locate_url: String,
    proxy: Option<ProxyConfig>,
    timing: Timing,
}

impl ClientBuilder {
    /// Start a builder with the client name and version reported to
    /// measurement servers.
    pub fn new(client_name: impl Into<String>, client_version: impl Into<String>) -> Self {
        ClientBuilder {
            client_name: client_name.into(),
            client_version: client_version.into(),
            locate_url: params::LOCATE_URL.to_string(),
            proxy: None,
            timing: Timing::default(),
        }
    }

    /// Route discovery and both measurement sessions through a forward
    /// proxy.
    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Override the discovery endpoint.
    pub fn locate_url(mut self, url: impl Into<String>) -> Self {
        self.locate_url = url.into();
        self
    }

    /// Override the measurement window and grace period.
    pub fn timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// Build the client. Fails if the HTTP client or proxy configuration
    /// is rejected.
    pub fn build(self) -> Result<Client> {
        let user_agent = format!(
            "{}/{} {}/{}",
            self.client_name,
            self.client_version,
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        );

        let mut http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(params::LOCATE_TIMEOUT);
        if let Some(proxy) = &self.proxy {
            http = http.proxy(proxy.reqwest_proxy()?);
        }
        let http = http.build()?;

        Ok(Client {
            client_name: self.client_name,
            client_version: self.client_version,
            selector: ServerSelector::new(self.locate_url, http),
            proxy: self.proxy,
            timing: self.timing,
        })
    }
}

/// A speed test client for one endpoint configuration.
pub struct Client {
    client_name: String,
    client_version: String,
    selector: ServerSelector,
    proxy: Option<ProxyConfig>,
    timing: Timing,
}

impl Client {
    /// Establish a WebSocket session to the given service URL.
    ///
    /// `service_url` is a full URL from discovery, e.g.
    /// `wss://mlab1-lga06:4443/ndt/v7/download?access_token=...`; client
    /// metadata is appended as query parameters. With a proxy configured
    /// the TCP leg goes through a CONNECT tunnel, with TLS and the
    /// WebSocket upgrade running on top of it.
    pub async fn connect(&self, service_url: &str) -> Result<TransportSession<WsTransport>> {
        let mut url = Url::parse(service_url)?;
        url.query_pairs_mut()
            .append_pair("client_name", &self.client_name)
            .append_pair("client_version", &self.client_version)
            .append_pair("client_os", std::env::consts::OS)
            .append_pair("client_arch", std::env::consts::ARCH);

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(SpeedTestError::connection)?;
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            params::SEC_WEBSOCKET_PROTOCOL.parse().unwrap(),
        );

        let connector = tls_connector();

        let ws = match &self.proxy {
            None => {
                let (ws, _response) =
                    connect_async_tls_with_config(request, None, false, Some(connector))
                        .await
                        .map_err(SpeedTestError::connection)?;
                ws
            }
            Some(proxy) => {
                let host = url.host_str().ok_or(url::ParseError::EmptyHost)?;
                let port = url.port_or_known_default().unwrap_or(443);
                let tcp = proxy.tunnel(host, port).await?;
                let (ws, _response) =
                    client_async_tls_with_config(request, tcp, None, Some(connector))
                        .await
                        .map_err(SpeedTestError::connection)?;
                ws
            }
        };

        Ok(TransportSession::from_websocket(ws))
    }

    /// Run one full measurement cycle: discover, download, then upload.
    ///
    /// This never fails. A direction that cannot run is reported through
    /// the emitter and scored 0.0, so one bad server or network blip
    /// degrades the numbers instead of aborting the caller's loop.
    /// Dropping the returned future cancels whatever is in flight.
    pub async fn run_cycle(&self, emitter: &mut dyn Emitter) -> MeasurementResult {
        let server = match self.selector.discover().await {
            Ok(server) => server,
            Err(e) => {
                tracing::warn!(error = %e, "server discovery failed");
                let _ = emitter.on_cycle_failed(&e.to_string());
                let _ = emitter.on_result(&MeasurementResult::ZERO);
                return MeasurementResult::ZERO;
            }
        };
        tracing::info!(machine = %server.machine, "selected measurement server");
        let _ = emitter.on_server_selected(&server);

        let download_mbps = self
            .measure(Direction::Download, &server.download_url, emitter)
            .await;
        let upload_mbps = self
            .measure(Direction::Upload, &server.upload_url, emitter)
            .await;

        let result = MeasurementResult {
            download_mbps,
            upload_mbps,
        };
        let _ = emitter.on_result(&result);
        result
    }

    /// Run one direction, mapping any failure to a zero rate.
    async fn measure(&self, direction: Direction, url: &str, emitter: &mut dyn Emitter) -> f64 {
        let _ = emitter.on_starting(direction);
        match self.measure_inner(direction, url, emitter).await {
            Ok(mbps) => {
                tracing::info!(%direction, mbps, "direction complete");
                let _ = emitter.on_complete(direction, mbps);
                mbps
            }
            Err(e) => {
                tracing::warn!(%direction, error = %e, "direction failed, reporting zero");
                let _ = emitter.on_error(direction, &e.to_string());
                0.0
            }
        }
    }

    async fn measure_inner(
        &self,
        direction: Direction,
        url: &str,
        emitter: &mut dyn Emitter,
    ) -> Result<f64> {
        let session = self.connect(url).await?;
        tracing::debug!(%direction, "session open");

        let (tx, mut rx) = mpsc::channel(64);
        let timing = self.timing;
        let meter = async move {
            match direction {
                Direction::Download => download::run(session, timing, tx).await,
                Direction::Upload => upload::run(session, timing, tx).await,
            }
        };
        tokio::pin!(meter);

        loop {
            tokio::select! {
                rate = &mut meter => return rate,
                Some(p) = rx.recv() => {
                    let _ = emitter.on_progress(&p);
                }
            }
        }
    }
}

/// rustls connector trusting the webpki root set.
fn tls_connector() -> Connector {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::aws_lc_rs::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_root_certificates(root_store)
    .with_no_client_auth();

    Connector::Rustls(Arc::new(tls_config))
}
