//! Measurement server discovery.
//!
//! Discovery queries a Locate-style API that returns nearby servers with
//! signed WebSocket URLs for running tests. Unlike a latency-optimizing
//! client we do not take the closest entry: one server is picked uniformly
//! at random from the usable results, so repeated cycles spread load
//! across the fleet and a single misbehaving machine cannot dominate the
//! numbers.

use std::collections::HashMap;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Deserialize;

use crate::error::{Result, SpeedTestError};
use crate::params;

/// A single server entry returned by the discovery API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct Target {
    /// FQDN of the server machine.
    pub machine: String,
    /// Map of service key (e.g. `"wss:///ndt/v7/download"`) to full URL with access token.
    pub urls: HashMap<String, String>,
}

/// Top-level response from the discovery API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct LocateResponse {
    /// Ordered list of nearby servers (closest first).
    pub results: Vec<Target>,
}

/// A server chosen for one measurement cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementServer {
    /// FQDN of the server machine.
    pub machine: String,
    /// Signed service URL for the download test.
    pub download_url: String,
    /// Signed service URL for the upload test.
    pub upload_url: String,
}

impl Target {
    /// Resolve both per-direction URLs; `None` when either role is missing.
    fn into_server(self) -> Option<MeasurementServer> {
        let download_url = role_url(&self.urls, params::DOWNLOAD_URL_PATH)?;
        let upload_url = role_url(&self.urls, params::UPLOAD_URL_PATH)?;
        Some(MeasurementServer {
            machine: self.machine,
            download_url,
            upload_url,
        })
    }
}

/// Find the URL advertised for a role path. Prefers the TLS entry when a
/// target advertises both `ws` and `wss`.
fn role_url(urls: &HashMap<String, String>, role_path: &str) -> Option<String> {
    let mut found: Option<&String> = None;
    for (key, url) in urls {
        if key.contains(role_path) && (found.is_none() || key.starts_with("wss:")) {
            found = Some(url);
        }
    }
    found.cloned()
}

/// Pick one usable server uniformly at random.
pub(crate) fn pick<R: Rng>(rng: &mut R, targets: Vec<Target>) -> Option<MeasurementServer> {
    let mut usable: Vec<MeasurementServer> = targets
        .into_iter()
        .filter_map(Target::into_server)
        .collect();
    if usable.is_empty() {
        return None;
    }
    let index = rng.random_range(0..usable.len());
    Some(usable.swap_remove(index))
}

/// Discovers measurement servers and selects one per cycle.
#[derive(Debug, Clone)]
pub struct ServerSelector {
    locate_url: String,
    http: reqwest::Client,
}

impl ServerSelector {
    /// Build a selector querying `locate_url` with the given HTTP client.
    pub fn new(locate_url: impl Into<String>, http: reqwest::Client) -> Self {
        ServerSelector {
            locate_url: locate_url.into(),
            http,
        }
    }

    /// Query the discovery API and pick one server at random.
    ///
    /// Returns [`SpeedTestError::NoServers`] when the API answers 204
    /// (out of capacity) or when no result advertises URLs for both
    /// directions.
    pub async fn discover(&self) -> Result<MeasurementServer> {
        let response = self
            .http
            .get(&self.locate_url)
            .send()
            .await?
            .error_for_status()?;

        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Err(SpeedTestError::NoServers);
        }

        let locate: LocateResponse = response.json().await?;
        tracing::debug!(candidates = locate.results.len(), "discovery response");

        let mut rng = StdRng::from_os_rng();
        pick(&mut rng, locate.results).ok_or(SpeedTestError::NoServers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn target(machine: &str) -> Target {
        let urls = HashMap::from([
            (
                "wss:///ndt/v7/download".to_string(),
                format!("wss://{machine}/ndt/v7/download?access_token=abc"),
            ),
            (
                "wss:///ndt/v7/upload".to_string(),
                format!("wss://{machine}/ndt/v7/upload?access_token=def"),
            ),
        ]);
        Target {
            machine: machine.to_string(),
            urls,
        }
    }

    #[test]
    fn deserialize_locate_response() {
        let json = r#"{
           "results": [
               {
                   "machine": "mlab1-lga06.mlab-oss.measurement-lab.org",
                   "urls": {
                       "wss:///ndt/v7/download": "wss://mlab1-lga06:4443/ndt/v7/download?access_token=abc",
                       "wss:///ndt/v7/upload": "wss://mlab1-lga06:4443/ndt/v7/upload?access_token=def"
                   }
               }
           ]
        }"#;

        let l_resp: LocateResponse = serde_json::from_str(json).unwrap();

        let results = l_resp.results;
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].machine,
            "mlab1-lga06.mlab-oss.measurement-lab.org"
        );
        assert_eq!(results[0].urls.len(), 2);
    }

    #[test]
    fn skips_targets_missing_a_role() {
        let mut crippled = target("half.example.net");
        crippled.urls.retain(|k, _| k.contains("download"));

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let picked = pick(
                &mut rng,
                vec![crippled.clone(), target("whole.example.net")],
            )
            .unwrap();
            assert_eq!(picked.machine, "whole.example.net");
        }

        assert!(pick(&mut rng, vec![crippled]).is_none());
        assert!(pick(&mut rng, Vec::new()).is_none());
    }

    #[test]
    fn selection_is_uniform_over_candidates() {
        let machines = ["a", "b", "c", "d"];
        let targets: Vec<Target> = machines.iter().map(|m| target(m)).collect();

        let mut rng = StdRng::seed_from_u64(42);
        let mut counts = HashMap::new();
        for _ in 0..1000 {
            let picked = pick(&mut rng, targets.clone()).unwrap();
            *counts.entry(picked.machine).or_insert(0u32) += 1;
        }

        for m in machines {
            let n = counts.get(m).copied().unwrap_or(0);
            assert!((190..=310).contains(&n), "machine {m} picked {n} times");
        }
    }

    #[test]
    fn prefers_tls_url_when_both_advertised() {
        let mut t = target("dual.example.net");
        t.urls.insert(
            "ws:///ndt/v7/download".to_string(),
            "ws://dual.example.net/ndt/v7/download".to_string(),
        );

        let server = t.into_server().unwrap();
        assert!(server.download_url.starts_with("wss://"));
    }

    // The MockServer shuts down on drop, so it rides along with the
    // selector.
    async fn mock_locate(template: ResponseTemplate) -> (MockServer, ServerSelector) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/nearest/ndt/ndt7"))
            .respond_with(template)
            .mount(&server)
            .await;
        let selector = ServerSelector::new(
            format!("{}/v2/nearest/ndt/ndt7", server.uri()),
            reqwest::Client::new(),
        );
        (server, selector)
    }

    #[tokio::test]
    async fn discover_picks_from_results() {
        let json = r#"{
           "results": [
               {
                   "machine": "mlab1-lga06.example.net",
                   "urls": {
                       "wss:///ndt/v7/download": "wss://mlab1-lga06:4443/ndt/v7/download?access_token=abc",
                       "wss:///ndt/v7/upload": "wss://mlab1-lga06:4443/ndt/v7/upload?access_token=def"
                   }
               },
               {
                   "machine": "mlab2-ams03.example.net",
                   "urls": {
                       "wss:///ndt/v7/download": "wss://mlab2-ams03:4443/ndt/v7/download?access_token=ghi",
                       "wss:///ndt/v7/upload": "wss://mlab2-ams03:4443/ndt/v7/upload?access_token=jkl"
                   }
               }
           ]
        }"#;
        let (_mock, selector) =
            mock_locate(ResponseTemplate::new(200).set_body_raw(json, "application/json")).await;

        let server = selector.discover().await.unwrap();
        assert!(server.machine.ends_with(".example.net"));
        assert!(server.download_url.contains("/ndt/v7/download"));
        assert!(server.upload_url.contains("/ndt/v7/upload"));
    }

    #[tokio::test]
    async fn out_of_capacity_means_no_servers() {
        let (_mock, selector) = mock_locate(ResponseTemplate::new(204)).await;
        let err = selector.discover().await.unwrap_err();
        assert!(matches!(err, SpeedTestError::NoServers), "{err}");
    }

    #[tokio::test]
    async fn empty_results_means_no_servers() {
        let (_mock, selector) = mock_locate(
            ResponseTemplate::new(200).set_body_raw(r#"{"results": []}"#, "application/json"),
        )
        .await;
        let err = selector.discover().await.unwrap_err();
        assert!(matches!(err, SpeedTestError::NoServers), "{err}");
    }

    #[tokio::test]
    async fn server_error_is_a_locate_failure() {
        let (_mock, selector) = mock_locate(ResponseTemplate::new(503)).await;
        let err = selector.discover().await.unwrap_err();
        assert!(matches!(err, SpeedTestError::Locate(_)), "{err}");
    }

    #[tokio::test]
    #[ignore]
    async fn discover_real_api() {
        let selector = ServerSelector::new(params::LOCATE_URL, reqwest::Client::new());
        let server = selector.discover().await.unwrap();
        assert!(server.download_url.starts_with("wss://"));
        assert!(server.upload_url.starts_with("wss://"));
    }
}
