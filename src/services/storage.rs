use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when talking to the media object store
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Storage API returned error: {0}")]
    ApiError(String),

    #[error("Unauthorized: invalid storage key")]
    Unauthorized,

    #[error("Not an object in this bucket: {0}")]
    ForeignObject(String),
}

/// Object storage holding provider work images
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Remove objects by path; objects that are already gone count as removed
    async fn remove_objects(&self, paths: &[String]) -> Result<(), MediaError>;
}

/// HTTP client for an S3-style object storage API
///
/// Objects live at `{base_url}/object/{bucket}/{path}` and are removed with
/// `DELETE`, authenticated with a service key.
pub struct StorageClient {
    base_url: String,
    api_key: String,
    bucket: String,
    client: Client,
}

impl StorageClient {
    pub fn new(
        base_url: String,
        api_key: String,
        bucket: String,
        timeout: Duration,
    ) -> Result<Self, MediaError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url,
            api_key,
            bucket,
            client,
        })
    }

    /// Object path for a stored reference
    ///
    /// References are either bucket-relative paths or the public URLs handed
    /// out at upload time (`{base_url}/object/public/{bucket}/{path}`). URLs
    /// that point anywhere else cannot be deleted through this client.
    fn object_path(&self, reference: &str) -> Result<String, MediaError> {
        let reference = reference.trim();
        if !reference.starts_with("http://") && !reference.starts_with("https://") {
            return Ok(reference.trim_start_matches('/').to_string());
        }

        let url = reference.split(['?', '#']).next().unwrap_or(reference);
        let base_url = self.base_url.trim_end_matches('/');
        let foreign = || MediaError::ForeignObject(reference.to_string());

        let path = [
            format!("{}/object/public/{}/", base_url, self.bucket),
            format!("{}/object/{}/", base_url, self.bucket),
        ]
        .iter()
        .find_map(|prefix| url.strip_prefix(prefix.as_str()))
        .filter(|path| !path.is_empty())
        .ok_or_else(foreign)?;

        urlencoding::decode(path)
            .map(|decoded| decoded.into_owned())
            .map_err(|_| foreign())
    }

    /// URL of a single object, with each path segment percent-encoded
    fn object_url(&self, path: &str) -> String {
        let encoded_path = path
            .trim_start_matches('/')
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        format!(
            "{}/object/{}/{}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.bucket),
            encoded_path
        )
    }

    async fn remove_object(&self, reference: &str) -> Result<(), MediaError> {
        let path = self.object_path(reference)?;
        let path = path.as_str();
        let url = self.object_url(path);

        tracing::debug!("Deleting media object: {}", url);

        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.api_key)
            .header("apikey", &self.api_key)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                tracing::debug!("Media object {} already removed", path);
                Ok(())
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(MediaError::Unauthorized),
            status => {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unable to read body".to_string());
                Err(MediaError::ApiError(format!(
                    "Failed to delete {}: {} - {}",
                    path, status, body
                )))
            }
        }
    }
}

#[async_trait]
impl MediaStore for StorageClient {
    async fn remove_objects(&self, paths: &[String]) -> Result<(), MediaError> {
        // Try every object, report the first failure
        let mut first_error = None;

        for path in paths {
            if let Err(e) = self.remove_object(path).await {
                tracing::warn!("Failed to delete media object {}: {}", path, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_client(base_url: String) -> StorageClient {
        StorageClient::new(
            base_url,
            "service_key".to_string(),
            "provider-images".to_string(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_object_url_encoding() {
        let client = create_client("https://storage.test/v1/".to_string());

        assert_eq!(
            client.object_url("user-1/photo 1.jpg"),
            "https://storage.test/v1/object/provider-images/user-1/photo%201.jpg"
        );
    }

    #[test]
    fn test_public_url_resolves_to_object_path() {
        let client = create_client("https://proj.storage.test/storage/v1".to_string());

        let path = client
            .object_path(
                "https://proj.storage.test/storage/v1/object/public/provider-images/u1/work%201.jpg",
            )
            .unwrap();
        assert_eq!(path, "u1/work 1.jpg");
        assert_eq!(
            client.object_url(&path),
            "https://proj.storage.test/storage/v1/object/provider-images/u1/work%201.jpg"
        );

        assert_eq!(client.object_path("/u1/a.jpg").unwrap(), "u1/a.jpg");
    }

    #[test]
    fn test_urls_outside_bucket_are_rejected() {
        let client = create_client("https://proj.storage.test/storage/v1".to_string());

        for reference in [
            "https://cdn.elsewhere.test/u1/a.jpg",
            "https://proj.storage.test/storage/v1/object/public/avatars/u1/a.jpg",
            "https://proj.storage.test/storage/v1/object/public/provider-images/",
        ] {
            assert!(
                matches!(client.object_path(reference), Err(MediaError::ForeignObject(_))),
                "{}",
                reference
            );
        }
    }

    #[tokio::test]
    async fn test_remove_objects_by_public_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/object/provider-images/u1/a.jpg")
            .with_status(200)
            .create_async()
            .await;

        let client = create_client(server.url());
        let public_url = format!("{}/object/public/provider-images/u1/a.jpg?t=123", server.url());
        let result = client.remove_objects(&[public_url]).await;

        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_foreign_url_is_reported_not_skipped() {
        let server = mockito::Server::new_async().await;
        let client = create_client(server.url());

        let result = client
            .remove_objects(&["https://cdn.elsewhere.test/u1/a.jpg".to_string()])
            .await;

        assert!(matches!(result, Err(MediaError::ForeignObject(_))));
    }

    #[tokio::test]
    async fn test_remove_objects_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/object/provider-images/user-1/a.jpg")
            .match_header("authorization", "Bearer service_key")
            .with_status(200)
            .create_async()
            .await;

        let client = create_client(server.url());
        let result = client.remove_objects(&["user-1/a.jpg".to_string()]).await;

        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_object_counts_as_removed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("DELETE", "/object/provider-images/gone.jpg")
            .with_status(404)
            .create_async()
            .await;

        let client = create_client(server.url());

        assert!(client.remove_objects(&["gone.jpg".to_string()]).await.is_ok());
    }

    #[tokio::test]
    async fn test_server_error_reported_after_trying_all() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("DELETE", "/object/provider-images/a.jpg")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;
        let succeeding = server
            .mock("DELETE", "/object/provider-images/b.jpg")
            .with_status(200)
            .create_async()
            .await;

        let client = create_client(server.url());
        let result = client
            .remove_objects(&["a.jpg".to_string(), "b.jpg".to_string()])
            .await;

        assert!(matches!(result, Err(MediaError::ApiError(_))));
        failing.assert_async().await;
        succeeding.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("DELETE", "/object/provider-images/a.jpg")
            .with_status(401)
            .create_async()
            .await;

        let client = create_client(server.url());
        let result = client.remove_objects(&["a.jpg".to_string()]).await;

        assert!(matches!(result, Err(MediaError::Unauthorized)));
    }
}
