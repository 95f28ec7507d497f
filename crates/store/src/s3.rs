//! S3-compatible object storage over the REST API.
//!
//! Requests use path-style addressing (`{endpoint}/{bucket}/{key}`) so the
//! same client works against AWS, MinIO, R2 and friends, and are signed with
//! AWS Signature Version 4.

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    hmac::{Hmac, Mac},
    reqwest::{Client, Method, RequestBuilder, Response, StatusCode},
    secrecy::{ExposeSecret, Secret},
    sha2::{Digest, Sha256},
    tracing::{debug, warn},
    url::Url,
};

use crate::{ObjectStore, Result, StoreError};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";
const DEFAULT_REGION: &str = "us-east-1";
const NO_SUCH_KEY: &str = "NoSuchKey";

/// Connection settings for [`S3Store`].
#[derive(Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Override the service endpoint (e.g. `http://localhost:9000`).
    /// Defaults to `https://s3.{region}.amazonaws.com`.
    pub endpoint: Option<String>,
    /// Prepended to every key, e.g. `sessions/`.
    pub key_prefix: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: Secret<String>,
    pub session_token: Option<Secret<String>>,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("key_prefix", &self.key_prefix)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &self.session_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl S3Config {
    pub fn new(
        bucket: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: Secret<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            region: DEFAULT_REGION.into(),
            endpoint: None,
            key_prefix: None,
            access_key_id: access_key_id.into(),
            secret_access_key,
            session_token: None,
        }
    }

    /// Read credentials and region from the standard `AWS_*` variables.
    pub fn from_env(bucket: impl Into<String>) -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| StoreError::Config("AWS_ACCESS_KEY_ID is not set".into()))?;
        let secret = std::env::var("AWS_SECRET_ACCESS_KEY")
            .map_err(|_| StoreError::Config("AWS_SECRET_ACCESS_KEY is not set".into()))?;

        let mut config = Self::new(bucket, access_key_id, Secret::new(secret));
        if let Ok(region) =
            std::env::var("AWS_REGION").or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
        {
            config.region = region;
        }
        config.endpoint = std::env::var("AWS_ENDPOINT_URL").ok();
        config.session_token = std::env::var("AWS_SESSION_TOKEN").ok().map(Secret::new);
        Ok(config)
    }

    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }
}

/// Object store talking to an S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    config: S3Config,
    endpoint: Url,
}

impl S3Store {
    pub fn new(config: S3Config) -> Result<Self> {
        Self::with_client(Client::new(), config)
    }

    /// Use a preconfigured `reqwest` client (timeouts, proxies, TLS).
    pub fn with_client(client: Client, config: S3Config) -> Result<Self> {
        if config.bucket.trim().is_empty() {
            return Err(StoreError::Config("bucket name not specified".into()));
        }
        if config.region.trim().is_empty() {
            return Err(StoreError::Config("region not specified".into()));
        }
        let raw = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", config.region));
        let endpoint = Url::parse(raw.trim_end_matches('/'))
            .map_err(|e| StoreError::Config(format!("invalid endpoint {raw}: {e}")))?;
        if endpoint.host_str().is_none() {
            return Err(StoreError::Config(format!("endpoint {raw} has no host")));
        }
        if endpoint.query().is_some() || endpoint.fragment().is_some() {
            return Err(StoreError::Config(format!(
                "endpoint {raw} must not have a query or fragment"
            )));
        }
        Ok(Self {
            client,
            config,
            endpoint,
        })
    }

    /// Canonical (percent-encoded) path for `key`: endpoint path, bucket,
    /// then the prefixed key. This is both the request path and the path
    /// that gets signed.
    fn canonical_uri(&self, key: &str) -> Result<String> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        let full = match &self.config.key_prefix {
            Some(prefix) => format!("{prefix}{key}"),
            None => key.to_string(),
        };
        let base = self.endpoint.path().trim_end_matches('/');
        let mut uri = format!("{base}/{}", uri_encode(&self.config.bucket));
        for segment in full.split('/') {
            uri.push('/');
            uri.push_str(&uri_encode(segment));
        }
        Ok(uri)
    }

    fn host_header(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    fn signed_request(
        &self,
        method: Method,
        key: &str,
        body: Option<(&[u8], Option<&str>)>,
    ) -> Result<RequestBuilder> {
        let canonical_uri = self.canonical_uri(key)?;
        let mut url = self.endpoint.clone();
        url.set_path(&canonical_uri);

        let payload = body.map(|(b, _)| b).unwrap_or_default();
        let content_type = body.and_then(|(_, ct)| ct);
        let payload_hash = hex::encode(Sha256::digest(payload));
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let mut headers: Vec<(&str, String)> = vec![
            ("host", self.host_header()),
            ("x-amz-content-sha256", payload_hash.clone()),
            ("x-amz-date", amz_date),
        ];
        if let Some(ct) = content_type {
            headers.push(("content-type", ct.to_string()));
        }
        if let Some(token) = &self.config.session_token {
            headers.push(("x-amz-security-token", token.expose_secret().clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(b.0));

        let authorization = self.authorization(
            method.as_str(),
            &canonical_uri,
            &headers,
            &payload_hash,
            now,
        )?;

        let mut request = self.client.request(method, url);
        for (name, value) in headers.iter().filter(|(name, _)| *name != "host") {
            request = request.header(*name, value);
        }
        request = request.header("authorization", authorization);
        if let Some((bytes, _)) = body {
            request = request.body(bytes.to_vec());
        }
        Ok(request)
    }

    /// `Authorization` header value for a request with sorted `headers`.
    fn authorization(
        &self,
        method: &str,
        canonical_uri: &str,
        headers: &[(&str, String)],
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let date = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let scope = format!("{date}/{}/{SERVICE}/aws4_request", self.config.region);

        let canonical = canonical_request(method, canonical_uri, "", headers, payload_hash);
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical.as_bytes()))
        );
        let key = signing_key(
            self.config.secret_access_key.expose_secret(),
            &date,
            &self.config.region,
            SERVICE,
        )?;
        let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);
        let signed_headers = headers
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(";");

        Ok(format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.config.access_key_id
        ))
    }

    async fn failure(operation: &'static str, key: &str, response: Response) -> StoreError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Self::status_error(operation, key, status, body)
    }

    fn status_error(operation: &'static str, key: &str, status: u16, body: String) -> StoreError {
        warn!(operation, key, status, code = error_code(&body), "s3 request failed");
        StoreError::Status {
            operation,
            key: key.to_string(),
            status,
            body,
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let response = self.signed_request(Method::GET, key, None)?.send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => {
                // A missing bucket is also a 404; only a missing key means
                // "no session".
                let body = response.text().await.unwrap_or_default();
                if error_code(&body) == Some(NO_SUCH_KEY) {
                    debug!(bucket = %self.config.bucket, key, "no such key");
                    Ok(None)
                } else {
                    Err(Self::status_error("get", key, StatusCode::NOT_FOUND.as_u16(), body))
                }
            },
            status if status.is_success() => Ok(Some(response.bytes().await?.to_vec())),
            _ => Err(Self::failure("get", key, response).await),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>, content_type: Option<&str>) -> Result<()> {
        let response = self
            .signed_request(Method::PUT, key, Some((value.as_slice(), content_type)))?
            .send()
            .await?;
        if response.status().is_success() {
            debug!(bucket = %self.config.bucket, key, bytes = value.len(), "put object");
            Ok(())
        } else {
            Err(Self::failure("put", key, response).await)
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let response = self.signed_request(Method::DELETE, key, None)?.send().await?;
        let status = response.status();
        if status.is_success() {
            debug!(bucket = %self.config.bucket, key, "deleted object");
            return Ok(());
        }
        // S3 answers 204 for absent keys; some compatible servers send
        // NoSuchKey instead. Any other 404 (NoSuchBucket) is a failure.
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND && error_code(&body) == Some(NO_SUCH_KEY) {
            debug!(bucket = %self.config.bucket, key, "object already absent");
            return Ok(());
        }
        Err(Self::status_error("delete", key, status.as_u16(), body))
    }
}

/// `<Code>` element of an S3 XML error document.
fn error_code(body: &str) -> Option<&str> {
    let start = body.find("<Code>")? + "<Code>".len();
    let len = body[start..].find("</Code>")?;
    Some(body[start..start + len].trim())
}

// ── Signature V4 ────────────────────────────────────────────────────────────

/// Percent-encode everything except the RFC 3986 unreserved set.
fn uri_encode(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

fn canonical_request(
    method: &str,
    canonical_uri: &str,
    canonical_query: &str,
    headers: &[(&str, String)],
    payload_hash: &str,
) -> String {
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{}\n", value.trim()))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(";");
    format!(
        "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
    )
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| StoreError::Config(format!("invalid signing key: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Result<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, mockito::Matcher};

    fn config(endpoint: &str) -> S3Config {
        S3Config::new("bot-sessions", "AKIDEXAMPLE", Secret::new("secret".into()))
            .with_endpoint(endpoint)
    }

    #[test]
    fn signing_key_matches_aws_example() {
        let key = signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        )
        .unwrap();
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn canonical_uri_encodes_key_segments() {
        let store = S3Store::new(config("http://localhost:9000")).unwrap();
        assert_eq!(store.canonical_uri("1:2").unwrap(), "/bot-sessions/1%3A2");

        let store = S3Store::new(
            config("http://localhost:9000").with_key_prefix("sessions/telegram/"),
        )
        .unwrap();
        assert_eq!(
            store.canonical_uri("a b").unwrap(),
            "/bot-sessions/sessions/telegram/a%20b"
        );
    }

    #[test]
    fn canonical_request_layout() {
        let headers = vec![
            ("host", "example.com".to_string()),
            ("x-amz-date", " 20130524T000000Z ".to_string()),
        ];
        let req = canonical_request("GET", "/b/k", "", &headers, "abc");
        assert_eq!(
            req,
            "GET\n/b/k\n\nhost:example.com\nx-amz-date:20130524T000000Z\n\nhost;x-amz-date\nabc"
        );
    }

    #[test]
    fn missing_bucket_is_rejected() {
        let err = S3Store::new(S3Config::new(
            "  ",
            "AKIDEXAMPLE",
            Secret::new("secret".into()),
        ))
        .unwrap_err();
        assert!(err.to_string().contains("bucket name not specified"));
    }

    #[test]
    fn default_endpoint_uses_region() {
        let store = S3Store::new(
            S3Config::new("b", "AKIDEXAMPLE", Secret::new("s".into())).with_region("eu-west-1"),
        )
        .unwrap();
        assert_eq!(store.host_header(), "s3.eu-west-1.amazonaws.com");
    }

    #[test]
    fn debug_redacts_secret() {
        let rendered = format!("{:?}", config("http://localhost:9000"));
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("\"secret\""));
    }

    #[tokio::test]
    async fn get_returns_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/bot-sessions/chat-42")
            .match_header(
                "authorization",
                Matcher::Regex(r"^AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/\d{8}/us-east-1/s3/aws4_request, SignedHeaders=host;x-amz-content-sha256;x-amz-date, Signature=[0-9a-f]{64}$".into()),
            )
            .match_header("x-amz-content-sha256", Matcher::Any)
            .with_status(200)
            .with_body(r#"{"count":1}"#)
            .create_async()
            .await;

        let store = S3Store::new(config(&server.url())).unwrap();
        let body = store.get("chat-42").await.unwrap().unwrap();
        assert_eq!(body, br#"{"count":1}"#);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_not_found_is_none() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/bot-sessions/chat-42")
            .with_status(404)
            .with_body("<Error><Code>NoSuchKey</Code></Error>")
            .create_async()
            .await;

        let store = S3Store::new(config(&server.url())).unwrap();
        assert!(store.get("chat-42").await.unwrap().is_none());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_access_denied_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/bot-sessions/chat-42")
            .with_status(403)
            .with_body("<Error><Code>AccessDenied</Code></Error>")
            .create_async()
            .await;

        let store = S3Store::new(config(&server.url())).unwrap();
        let err = store.get("chat-42").await.unwrap_err();
        match err {
            StoreError::Status {
                operation,
                status,
                body,
                ..
            } => {
                assert_eq!(operation, "get");
                assert_eq!(status, 403);
                assert!(body.contains("AccessDenied"));
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn put_sends_body_and_content_type() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/bot-sessions/sessions/chat-42")
            .match_header("content-type", "application/json")
            .match_header(
                "authorization",
                Matcher::Regex("SignedHeaders=content-type;host;x-amz-content-sha256;x-amz-date,".into()),
            )
            .match_body(r#"{"count":1}"#)
            .with_status(200)
            .create_async()
            .await;

        let store =
            S3Store::new(config(&server.url()).with_key_prefix("sessions/")).unwrap();
        store
            .put("chat-42", br#"{"count":1}"#.to_vec(), Some("application/json"))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn session_token_is_sent_and_signed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/bot-sessions/chat-42")
            .match_header("x-amz-security-token", "token-123")
            .match_header(
                "authorization",
                Matcher::Regex("x-amz-date;x-amz-security-token,".into()),
            )
            .with_status(404)
            .with_body("<Error><Code>NoSuchKey</Code></Error>")
            .create_async()
            .await;

        let mut cfg = config(&server.url());
        cfg.session_token = Some(Secret::new("token-123".into()));
        let store = S3Store::new(cfg).unwrap();
        assert!(store.get("chat-42").await.unwrap().is_none());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_missing_bucket_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/bot-sessions/chat-42")
            .with_status(404)
            .with_body("<?xml version=\"1.0\"?><Error><Code>NoSuchBucket</Code><BucketName>bot-sessions</BucketName></Error>")
            .create_async()
            .await;

        let store = S3Store::new(config(&server.url())).unwrap();
        let err = store.get("chat-42").await.unwrap_err();
        match err {
            StoreError::Status { status, body, .. } => {
                assert_eq!(status, 404);
                assert!(body.contains("NoSuchBucket"));
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_bare_not_found_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/bot-sessions/chat-42")
            .with_status(404)
            .create_async()
            .await;

        let store = S3Store::new(config(&server.url())).unwrap();
        assert!(matches!(
            store.get("chat-42").await,
            Err(StoreError::Status { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn delete_absent_object_succeeds() {
        let mut server = mockito::Server::new_async().await;
        let no_content = server
            .mock("DELETE", "/bot-sessions/chat-42")
            .with_status(204)
            .create_async()
            .await;
        let no_such_key = server
            .mock("DELETE", "/bot-sessions/chat-43")
            .with_status(404)
            .with_body("<Error><Code>NoSuchKey</Code></Error>")
            .create_async()
            .await;

        let store = S3Store::new(config(&server.url())).unwrap();
        store.delete("chat-42").await.unwrap();
        store.delete("chat-43").await.unwrap();
        no_content.assert_async().await;
        no_such_key.assert_async().await;
    }

    #[tokio::test]
    async fn delete_missing_bucket_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/bot-sessions/chat-42")
            .with_status(404)
            .with_body("<Error><Code>NoSuchBucket</Code></Error>")
            .create_async()
            .await;

        let store = S3Store::new(config(&server.url())).unwrap();
        let err = store.delete("chat-42").await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Status { operation: "delete", status: 404, .. }
        ));
    }

    #[test]
    fn error_code_extraction() {
        assert_eq!(
            error_code("<Error><Code> NoSuchKey </Code><Key>k</Key></Error>"),
            Some("NoSuchKey")
        );
        assert_eq!(error_code("Not Found"), None);
        assert_eq!(error_code("<Code>unterminated"), None);
    }

    #[test]
    fn endpoint_path_is_part_of_signed_uri() {
        let store = S3Store::new(config("http://gw.local/s3/")).unwrap();
        assert_eq!(store.canonical_uri("1:2").unwrap(), "/s3/bot-sessions/1%3A2");
    }

    #[test]
    fn endpoint_with_query_is_rejected() {
        let err = S3Store::new(config("http://gw.local/s3?x=1")).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[tokio::test]
    async fn requests_go_to_endpoint_path() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/gateway/bot-sessions/chat-42")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let store = S3Store::new(config(&format!("{}/gateway", server.url()))).unwrap();
        assert_eq!(store.get("chat-42").await.unwrap().unwrap(), b"{}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn delete_server_error_propagates() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/bot-sessions/chat-42")
            .with_status(503)
            .with_body("SlowDown")
            .create_async()
            .await;

        let store = S3Store::new(config(&server.url())).unwrap();
        let err = store.delete("chat-42").await.unwrap_err();
        assert!(matches!(err, StoreError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        // Nothing listens on port 9 of localhost in the test environment.
        let store = S3Store::new(config("http://127.0.0.1:9")).unwrap();
        let err = store.get("chat-42").await.unwrap_err();
        assert!(err.is_transport());
    }
}
