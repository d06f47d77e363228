//! Remote client - thin REST wrapper over the authoritative service.
//!
//! Each call issues exactly one request. There are no retries and no
//! per-call timeouts here; the engine decides what to do with a failure.

use crate::{error::Result, Collection, Error, RecordId};
use async_trait::async_trait;
use reqwest::{Method, Response};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// The remote operations the engine consumes.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Lightweight read used to decide whether a cycle can run.
    async fn probe(&self) -> Result<()>;

    /// Every remote document in `collection`, in remote (wire) form.
    async fn fetch_all(&self, collection: Collection) -> Result<Vec<Value>>;

    /// Point read. Any non-success status means "does not exist"; a 404 and a
    /// transient 5xx are not told apart.
    async fn exists(&self, collection: Collection, id: &str) -> Result<bool>;

    async fn create(&self, collection: Collection, body: Value) -> Result<()>;

    async fn update(&self, collection: Collection, id: &str, body: Value) -> Result<()>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<()>;

    /// Items belonging to one container, in remote form.
    async fn fetch_items_for_container(&self, container_id: &str) -> Result<Vec<Value>>;
}

/// Decode one remote document.
pub fn decode<T: DeserializeOwned>(collection: Collection, doc: Value) -> Result<T> {
    serde_json::from_value(doc).map_err(|e| Error::Decode {
        collection,
        reason: e.to_string(),
    })
}

/// Encode a wire record as a request body.
pub fn encode<T: Serialize>(record: &T) -> Result<Value> {
    serde_json::to_value(record).map_err(|e| Error::validation("body", e.to_string()))
}

/// [`RemoteService`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRemote {
    /// Create a client for `base_url` (for example `http://localhost:5000/api`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn path(collection: Collection, id: Option<&str>) -> String {
        match id {
            Some(id) => format!("/{}/{}", collection.as_str(), id),
            None => format!("/{}", collection.as_str()),
        }
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            tracing::debug!(%method, %path, error = %e, "Remote request failed");
            Error::Transport(e.to_string())
        })?;
        tracing::trace!(%method, %path, status = %response.status(), "Remote response");
        Ok(response)
    }

    async fn send_checked(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Response> {
        let response = self.send(method.clone(), path, body).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::RemoteRejected {
                method: method.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn get_list(&self, collection: Collection, path: &str) -> Result<Vec<Value>> {
        let response = self.send_checked(Method::GET, path, None).await?;
        response.json::<Vec<Value>>().await.map_err(|e| Error::Decode {
            collection,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl RemoteService for HttpRemote {
    async fn probe(&self) -> Result<()> {
        self.send_checked(Method::GET, &Self::path(Collection::Containers, None), None)
            .await
            .map(|_| ())
    }

    async fn fetch_all(&self, collection: Collection) -> Result<Vec<Value>> {
        self.get_list(collection, &Self::path(collection, None)).await
    }

    async fn exists(&self, collection: Collection, id: &str) -> Result<bool> {
        let response = self
            .send(Method::GET, &Self::path(collection, Some(id)), None)
            .await?;
        Ok(response.status().is_success())
    }

    async fn create(&self, collection: Collection, body: Value) -> Result<()> {
        self.send_checked(Method::POST, &Self::path(collection, None), Some(&body))
            .await
            .map(|_| ())
    }

    async fn update(&self, collection: Collection, id: &str, body: Value) -> Result<()> {
        self.send_checked(Method::PUT, &Self::path(collection, Some(id)), Some(&body))
            .await
            .map(|_| ())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        self.send_checked(Method::DELETE, &Self::path(collection, Some(id)), None)
            .await
            .map(|_| ())
    }

    async fn fetch_items_for_container(&self, container_id: &str) -> Result<Vec<Value>> {
        let path = format!("/{}/container/{}", Collection::Items.as_str(), container_id);
        self.get_list(Collection::Items, &path).await
    }
}

/// Id carried by a remote document (`_id`), if any.
pub fn remote_id(doc: &Value) -> Option<RecordId> {
    doc.get("_id").and_then(Value::as_str).map(str::to_string)
}
