//! Authenticated reads against an OpenShift API server

use crate::{
    bluegreen,
    errors::{Error, Result},
    kind::{path_segment, ApiKind, Kind},
    resolver::ResourceTarget,
    settings::GatewayOptions,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Normalized list response: every other upstream field is dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub kind: String,
    pub items: Vec<Value>,
}

impl Listing {
    fn from_body(body: Value, kind: ApiKind, namespace: Option<&str>) -> Result<Self> {
        let malformed = |detail: &str| Error::Internal {
            kind: kind.to_string(),
            namespace: namespace_label(namespace).to_string(),
            detail: detail.to_string(),
        };
        let mut body = match body {
            Value::Object(map) => map,
            _ => return Err(malformed("list body is not an object")),
        };
        match (body.remove("kind"), body.remove("items")) {
            (Some(Value::String(kind)), Some(Value::Array(items))) => Ok(Listing { kind, items }),
            (None, _) | (Some(_), None) => Err(malformed("list body lacks kind or items")),
            _ => Err(malformed("list body has mistyped kind or items")),
        }
    }
}

fn namespace_label(namespace: Option<&str>) -> &str {
    namespace.unwrap_or("<cluster>")
}

/// Issues single reads; holds no connection state between calls.
#[derive(Debug, Clone, Default)]
pub struct ResourceGateway {
    options: GatewayOptions,
}

impl ResourceGateway {
    pub fn new(options: GatewayOptions) -> Self {
        ResourceGateway { options }
    }

    pub fn options(&self) -> &GatewayOptions {
        &self.options
    }

    /// Serves one resource kind from one target.
    ///
    /// With `name` the upstream body is returned verbatim, otherwise
    /// a [`Listing`]. `url` and `bgblock` are answered without a direct
    /// fetch of their own.
    #[tracing::instrument(skip(self, target), fields(identifier = %target.identifier))]
    pub async fn fetch(
        &self,
        kind: Kind,
        target: &ResourceTarget,
        namespace: Option<&str>,
        name: Option<&str>,
    ) -> Result<Value> {
        match kind {
            Kind::Clusters => Err(Error::invalid_argument(
                "clusters is served from configuration and cannot be fetched",
            )),
            Kind::Url => Ok(Value::String(target.endpoint.clone())),
            Kind::BgBlock => {
                let namespace = namespace
                    .ok_or_else(|| Error::invalid_argument("namespace is required for bgblock"))?;
                let result = bluegreen::classify(self, target, namespace).await?;
                serde_json::to_value(result).map_err(|err| Error::Internal {
                    kind: kind.to_string(),
                    namespace: namespace.to_string(),
                    detail: err.to_string(),
                })
            }
            Kind::Api(kind) => match name {
                Some(name) => self.get(kind, target, namespace, name).await,
                None => {
                    let listing = self.list(kind, target, namespace).await?;
                    Ok(serde_json::json!({
                        "kind": listing.kind,
                        "items": listing.items,
                    }))
                }
            },
        }
    }

    /// Lists every object of `kind`.
    pub async fn list(
        &self,
        kind: ApiKind,
        target: &ResourceTarget,
        namespace: Option<&str>,
    ) -> Result<Listing> {
        let path = kind.path(namespace, false)?;
        let body = self.request(kind, target, namespace, &path).await?;
        Listing::from_body(body, kind, namespace)
    }

    /// Reads a single named object, unmodified.
    pub async fn get(
        &self,
        kind: ApiKind,
        target: &ResourceTarget,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Value> {
        let name = path_segment("object name", name)?;
        let path = format!("{}/{}", kind.path(namespace, true)?, name);
        self.request(kind, target, namespace, &path).await
    }

    fn client(&self, target: &ResourceTarget) -> Result<kube::Client> {
        let uri = target.endpoint.parse::<http::Uri>().map_err(|err| {
            Error::config(format!(
                "invalid endpoint '{}' for {}: {}",
                target.endpoint, target.identifier, err
            ))
        })?;
        let mut config = kube::Config::new(uri);
        // Cluster API servers present self-signed certificates, so
        // verification is disabled for every target.
        config.accept_invalid_certs = true;
        config.connect_timeout = Some(self.options.connect_timeout);
        config.read_timeout = Some(self.options.timeout);
        kube::Client::try_from(config).map_err(|err| Error::Transport {
            endpoint: target.endpoint.clone(),
            message: format!("failed to build client: {}", err),
        })
    }

    async fn request(
        &self,
        kind: ApiKind,
        target: &ResourceTarget,
        namespace: Option<&str>,
        path: &str,
    ) -> Result<Value> {
        let client = self.client(target)?;
        let request = http::Request::get(path)
            .header(
                http::header::AUTHORIZATION,
                format!("Bearer {}", target.credential),
            )
            .header(http::header::ACCEPT, "application/json")
            .body(kube::client::Body::empty())
            .map_err(|err| {
                Error::invalid_argument(format!("bad request path {}: {}", path, err))
            })?;

        tracing::debug!(path, "requesting");
        let exchange = async {
            let response = client.send(request).await?;
            let status = response.status();
            let body = response.into_body().collect_bytes().await?;
            Ok::<_, kube::Error>((status, body))
        };
        let (status, body) = match tokio::time::timeout(self.options.timeout, exchange).await {
            Ok(Ok(exchange)) => exchange,
            Ok(Err(err)) => {
                return Err(Error::Transport {
                    endpoint: target.endpoint.clone(),
                    message: err.to_string(),
                })
            }
            Err(_) => {
                return Err(Error::Transport {
                    endpoint: target.endpoint.clone(),
                    message: format!("no response within {:?}", self.options.timeout),
                })
            }
        };

        if status != http::StatusCode::OK {
            let reason = upstream_reason(status, &body);
            tracing::warn!(
                status = status.as_u16(),
                reason = %reason,
                path,
                "upstream rejected request"
            );
            return Err(Error::Upstream {
                kind: kind.to_string(),
                namespace: namespace_label(namespace).to_string(),
                status: status.as_u16(),
                reason,
            });
        }

        serde_json::from_slice(&body).map_err(|err| Error::Internal {
            kind: kind.to_string(),
            namespace: namespace_label(namespace).to_string(),
            detail: format!("body is not JSON: {}", err),
        })
    }
}

/// Reason of a failed response: the one carried by a `Status` body, else
/// the canonical phrase of the status code.
fn upstream_reason(status: http::StatusCode, body: &[u8]) -> String {
    serde_json::from_slice::<kube::core::Status>(body)
        .ok()
        .map(|s| s.reason)
        .filter(|reason| !reason.is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown").to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::{
        sync::Arc,
        time::{Duration, Instant},
    };
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_rustls::rustls;
    use wiremock::{
        matchers::{header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    pub(crate) const TOKEN: &str = "sha256~token";

    pub(crate) fn target(server: &MockServer) -> ResourceTarget {
        ResourceTarget {
            identifier: "bo1".to_string(),
            endpoint: server.uri(),
            credential: TOKEN.to_string(),
        }
    }

    pub(crate) async fn serve(server: &MockServer, at: &str, status: u16, body: Value) {
        Mock::given(method("GET"))
            .and(path(at))
            .and(header("authorization", format!("Bearer {}", TOKEN).as_str()))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn list_is_normalized_to_kind_and_items() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/api/v1/namespaces/team-a/pods",
            200,
            json!({
                "kind": "PodList",
                "apiVersion": "v1",
                "metadata": {"resourceVersion": "42"},
                "items": [{"metadata": {"name": "api-1"}}]
            }),
        )
        .await;

        let out = ResourceGateway::default()
            .fetch(
                Kind::Api(ApiKind::Pods),
                &target(&server),
                Some("team-a"),
                None,
            )
            .await
            .unwrap();
        assert_eq!(
            out,
            json!({"kind": "PodList", "items": [{"metadata": {"name": "api-1"}}]})
        );
        assert_eq!(out.as_object().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn named_fetch_returns_body_verbatim() {
        let server = MockServer::start().await;
        let body = json!({
            "kind": "Route",
            "apiVersion": "route.openshift.io/v1",
            "metadata": {"name": "web", "namespace": "team-a"},
            "spec": {"host": "web.apps.example"}
        });
        serve(
            &server,
            "/apis/route.openshift.io/v1/namespaces/team-a/routes/web",
            200,
            body.clone(),
        )
        .await;

        let out = ResourceGateway::default()
            .fetch(
                Kind::Api(ApiKind::Routes),
                &target(&server),
                Some("team-a"),
                Some("web"),
            )
            .await
            .unwrap();
        assert_eq!(out, body);
    }

    #[tokio::test]
    async fn namespace_listing_uses_projects_api() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/apis/project.openshift.io/v1/projects",
            200,
            json!({"kind": "ProjectList", "items": []}),
        )
        .await;
        let listing = ResourceGateway::default()
            .list(ApiKind::Namespaces, &target(&server), None)
            .await
            .unwrap();
        assert_eq!(listing.kind, "ProjectList");
        assert!(listing.items.is_empty());
    }

    #[tokio::test]
    async fn missing_items_is_internal_error() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/api/v1/namespaces/team-a/configmaps",
            200,
            json!({"kind": "ConfigMapList"}),
        )
        .await;
        let err = ResourceGateway::default()
            .fetch(
                Kind::Api(ApiKind::ConfigMaps),
                &target(&server),
                Some("team-a"),
                None,
            )
            .await
            .unwrap_err();
        assert_matches!(err, Error::Internal { ref kind, ref namespace, .. } if kind == "configmaps" && namespace == "team-a");
    }

    #[tokio::test]
    async fn non_success_is_upstream_error() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/api/v1/namespaces/team-a/secrets",
            403,
            json!({
                "kind": "Status",
                "apiVersion": "v1",
                "status": "Failure",
                "message": "secrets is forbidden",
                "reason": "Forbidden",
                "code": 403
            }),
        )
        .await;
        let err = ResourceGateway::default()
            .list(ApiKind::Secrets, &target(&server), Some("team-a"))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Upstream { status: 403, ref reason, .. } if reason == "Forbidden");
        assert_eq!(err.class(), crate::errors::ErrorClass::Forbidden);
    }

    #[tokio::test]
    async fn wrong_token_never_matches() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/api/v1/namespaces/team-a/pods",
            200,
            json!({"kind": "PodList", "items": []}),
        )
        .await;
        let mut target = target(&server);
        target.credential = "other".to_string();
        let err = ResourceGateway::default()
            .list(ApiKind::Pods, &target, Some("team-a"))
            .await
            .unwrap_err();
        // wiremock answers unmatched requests with 404
        assert_matches!(err, Error::Upstream { status: 404, .. });
    }

    #[tokio::test]
    async fn slow_upstream_hits_total_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"kind": "JobList", "items": []}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;
        let gateway = ResourceGateway::new(GatewayOptions {
            timeout: Duration::from_millis(300),
            ..Default::default()
        });
        let err = gateway
            .list(ApiKind::Jobs, &target(&server), Some("team-a"))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Transport { .. });
    }

    #[tokio::test]
    async fn url_kind_makes_no_request() {
        let server = MockServer::start().await;
        let out = ResourceGateway::default()
            .fetch(Kind::Url, &target(&server), None, None)
            .await
            .unwrap();
        assert_eq!(out, Value::String(server.uri()));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_namespace_fails_before_any_request() {
        let server = MockServer::start().await;
        let err = ResourceGateway::default()
            .fetch(Kind::Api(ApiKind::Pods), &target(&server), None, None)
            .await
            .unwrap_err();
        assert_matches!(err, Error::InvalidArgument(_));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn redirect_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", "https://oauth.apps.example/authorize")
                    .set_body_string("<html>redirecting</html>"),
            )
            .mount(&server)
            .await;
        let err = ResourceGateway::default()
            .list(ApiKind::Pods, &target(&server), Some("team-a"))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Upstream { status: 302, ref reason, .. } if reason == "Found");
    }

    #[tokio::test]
    async fn only_200_is_success() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/api/v1/namespaces/team-a/pods",
            203,
            json!({"kind": "PodList", "items": []}),
        )
        .await;
        let err = ResourceGateway::default()
            .list(ApiKind::Pods, &target(&server), Some("team-a"))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Upstream { status: 203, ref reason, .. } if reason == "Non Authoritative Information");
    }

    #[tokio::test]
    async fn namespace_cannot_escape_its_path_segment() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/api/v1/namespaces/other/secrets",
            200,
            json!({"kind": "SecretList", "items": []}),
        )
        .await;
        let err = ResourceGateway::default()
            .list(ApiKind::Pods, &target(&server), Some("other/secrets?x="))
            .await
            .unwrap_err();
        assert_matches!(err, Error::InvalidArgument(_));

        let err = ResourceGateway::default()
            .get(ApiKind::Pods, &target(&server), Some("team-a"), "api-1?watch=1")
            .await
            .unwrap_err();
        assert_matches!(err, Error::InvalidArgument(_));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_endpoint_hits_connect_timeout() {
        let gateway = ResourceGateway::new(GatewayOptions {
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_millis(500),
            ..Default::default()
        });
        // non-routable address: the TCP handshake never completes
        let target = ResourceTarget {
            identifier: "bo1".to_string(),
            endpoint: "http://10.255.255.1".to_string(),
            credential: TOKEN.to_string(),
        };
        let started = Instant::now();
        let err = gateway
            .list(ApiKind::Pods, &target, Some("team-a"))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Transport { .. });
        assert!(started.elapsed() < Duration::from_secs(10), "{:?}", started.elapsed());
    }

    /// Serves one HTTPS request with a certificate issued for another host
    /// and signed by nobody.
    async fn self_signed_server(body: &'static str) -> String {
        let certs = rustls_pemfile::certs(&mut &include_bytes!("../testdata/self-signed.crt")[..])
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        let key = rustls_pemfile::private_key(&mut &include_bytes!("../testdata/self-signed.key")[..])
            .unwrap()
            .unwrap();
        let config = rustls::ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .unwrap();
        let acceptor = tokio_rustls::TlsAcceptor::from(Arc::new(config));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut tls = acceptor.accept(stream).await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = tls.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            tls.write_all(response.as_bytes()).await.unwrap();
            let _ = tls.shutdown().await;
        });
        format!("https://{}", addr)
    }

    #[tokio::test]
    async fn self_signed_certificate_is_accepted() {
        let target = ResourceTarget {
            identifier: "bo1".to_string(),
            endpoint: self_signed_server(r#"{"kind": "PodList", "items": []}"#).await,
            credential: TOKEN.to_string(),
        };
        let listing = ResourceGateway::default()
            .list(ApiKind::Pods, &target, Some("team-a"))
            .await
            .unwrap();
        assert_eq!(listing.kind, "PodList");
    }
}
