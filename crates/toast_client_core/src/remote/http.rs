//! HTTP client for the remote document API.
//!
//! Layout: `{base}/v1/{collection}/{id}` holds one JSON document `{ "id", "fields" }`;
//! `GET {base}/v1/{collection}` lists `{ "documents": [...] }`, optionally filtered by
//! `?{field}={value}`. Live feeds poll the collection and deliver when the set changes.

use super::{Document, FeedEvent, FeedRegistration, FeedSink, Fields, RemoteStore};
use crate::auth::AuthProvider;
use crate::error::{CoreError, Result};
use crate::rust_log;
use crate::RUNTIME;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct HttpRemoteStore {
    base_url: String,
    client: reqwest::Client,
    auth: Arc<dyn AuthProvider>,
    feed_poll: Duration,
}

impl HttpRemoteStore {
    pub fn new(
        base_url: &str,
        auth: Arc<dyn AuthProvider>,
        timeout: Duration,
        feed_poll: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Config(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            auth,
            feed_poll,
        })
    }

    fn collection_url(&self, collection: &str) -> String {
        let path: Vec<String> = collection
            .split('/')
            .map(|seg| urlencoding::encode(seg).into_owned())
            .collect();
        format!("{}/v1/{}", self.base_url, path.join("/"))
    }

    fn doc_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}", self.collection_url(collection), urlencoding::encode(id))
    }

    fn bearer(&self) -> Result<String> {
        Ok(self.auth.fresh_token()?.bearer())
    }

    async fn list(&self, url: &str, query: &[(&str, &str)]) -> Result<Vec<Document>> {
        let bearer = self.bearer()?;
        let resp = self
            .client
            .get(url)
            .query(query)
            .header(reqwest::header::AUTHORIZATION, bearer)
            .send()
            .await
            .map_err(transport)?;
        let status = resp.status();
        let text = resp.text().await.map_err(transport)?;
        check_status(status, &text)?;
        let json: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| CoreError::RemoteTransient(e.to_string()))?;
        let docs = json
            .get("documents")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| serde_json::from_value::<Document>(v).ok())
            .collect();
        Ok(docs)
    }
}

fn transport(e: reqwest::Error) -> CoreError {
    CoreError::RemoteTransient(e.to_string())
}

fn check_status(status: StatusCode, body: &str) -> Result<()> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(CoreError::Auth(format!("{} {}", status, body)));
    }
    if !status.is_success() {
        return Err(CoreError::RemoteTransient(format!("{} {}", status, body)));
    }
    Ok(())
}

impl RemoteStore for HttpRemoteStore {
    /// PUT {base}/v1/{collection}/{id}
    fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        let url = self.doc_url(collection, id);
        let bearer = self.bearer()?;
        let body = Document {
            id: id.to_string(),
            fields,
        };
        RUNTIME.block_on(async {
            let resp = self
                .client
                .put(&url)
                .header(reqwest::header::AUTHORIZATION, bearer)
                .json(&body)
                .send()
                .await
                .map_err(transport)?;
            let status = resp.status();
            let text = resp.text().await.map_err(transport)?;
            check_status(status, &text)
        })
    }

    /// GET {base}/v1/{collection}/{id}
    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let url = self.doc_url(collection, id);
        let bearer = self.bearer()?;
        RUNTIME.block_on(async {
            let resp = self
                .client
                .get(&url)
                .header(reqwest::header::AUTHORIZATION, bearer)
                .send()
                .await
                .map_err(transport)?;
            let status = resp.status();
            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let text = resp.text().await.map_err(transport)?;
            check_status(status, &text)?;
            let doc: Document =
                serde_json::from_str(&text).map_err(|e| CoreError::RemoteTransient(e.to_string()))?;
            Ok(Some(doc))
        })
    }

    /// GET {base}/v1/{collection}?{field}={value}
    fn query_eq(&self, collection: &str, field: &str, value: &str) -> Result<Vec<Document>> {
        let url = self.collection_url(collection);
        RUNTIME.block_on(self.list(&url, &[(field, value)]))
    }

    /// DELETE {base}/v1/{collection}/{id}
    fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let url = self.doc_url(collection, id);
        let bearer = self.bearer()?;
        RUNTIME.block_on(async {
            let resp = self
                .client
                .delete(&url)
                .header(reqwest::header::AUTHORIZATION, bearer)
                .send()
                .await
                .map_err(transport)?;
            let status = resp.status();
            if status == StatusCode::NOT_FOUND {
                return Ok(());
            }
            let text = resp.text().await.map_err(transport)?;
            check_status(status, &text)
        })
    }

    fn listen(&self, collection: &str, sink: FeedSink) -> Result<FeedRegistration> {
        let this = self.clone();
        let url = self.collection_url(collection);
        let label = collection.to_string();
        let task = RUNTIME.spawn(async move {
            let mut last: Option<Vec<Document>> = None;
            loop {
                match this.list(&url, &[]).await {
                    Ok(docs) => {
                        if last.as_ref() != Some(&docs) {
                            sink(FeedEvent::Snapshot(docs.clone()));
                            last = Some(docs);
                        }
                    }
                    Err(e) => {
                        rust_log!(debug, "[toast_rs] feed poll failed collection={}: {}", label, e);
                        sink(FeedEvent::Error(e.to_string()));
                    }
                }
                tokio::time::sleep(this.feed_poll).await;
            }
        });
        Ok(FeedRegistration::new(move || task.abort()))
    }
}
