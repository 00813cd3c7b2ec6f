use hyper::client::HttpConnector;
use hyper::{header, Body, Client, Method, Request};

use super::NetworkError;
use crate::sync::SyncStatusState;

/// Client for the control API of a running `dbmirror serve`.
pub struct AdminClient {
    address: String,
    auth_token: Option<String>,
    client: Client<HttpConnector>,
}

impl AdminClient {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.trim_start_matches("http://").to_string(),
            auth_token: None,
            client: Client::new(),
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    fn request(&self, method: Method, path: &str) -> Result<Request<Body>, NetworkError> {
        let mut builder = Request::builder()
            .method(method)
            .uri(format!("http://{}{}", self.address, path));
        if let Some(token) = &self.auth_token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        Ok(builder.body(Body::empty())?)
    }

    async fn send(&self, method: Method, path: &str) -> Result<String, NetworkError> {
        let req = self.request(method, path)?;
        let resp = self.client.request(req).await?;
        let status = resp.status();
        let bytes = hyper::body::to_bytes(resp.into_body()).await?;
        let body = String::from_utf8_lossy(&bytes).into_owned();
        if !status.is_success() {
            return Err(NetworkError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    pub async fn status(&self) -> Result<SyncStatusState, NetworkError> {
        let body = self.send(Method::GET, "/sync/status").await?;
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn start(&self) -> Result<String, NetworkError> {
        self.send(Method::POST, "/sync").await
    }

    pub async fn stop(&self) -> Result<String, NetworkError> {
        self.send(Method::POST, "/sync/stop").await
    }
}
