use classifier::{AiErrorClassification, ClassifiedError, ErrorType, ProviderErrorBody};
use common::env_config::StorageConfig;

pub const SOURCE: &str = "Storage";

/// Object storage for generated images (Supabase-style REST API).
#[derive(Clone)]
pub struct StorageClient {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

/// File extension stored for an image MIME type.
pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

fn save_failed(details: Option<String>) -> ClassifiedError {
    AiErrorClassification::new(ErrorType::DatabaseError, SOURCE, details).into_error(500)
}

impl StorageClient {
    pub fn new(http: reqwest::Client, config: &StorageConfig) -> Self {
        StorageClient {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
            bucket: config.bucket.clone(),
        }
    }

    pub fn public_url(&self, path: &str) -> String {
        format!("{}/object/public/{}/{}", self.base_url, self.bucket, path)
    }

    /// Uploads `bytes` under `path`, overwriting any existing object, and
    /// returns its public URL.
    ///
    /// Any failure is a `DATABASE_ERROR`: the image exists but could not be saved.
    pub async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<String, ClassifiedError> {
        let size = bytes.len();
        let response = self
            .http
            .post(format!("{}/object/{}/{}", self.base_url, self.bucket, path))
            .bearer_auth(&self.service_key)
            .header("content-type", mime_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(|e| {
                log::error!("Upload of {} failed: {}", path, e);
                save_failed(Some(e.to_string()))
            })?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let raw = response.text().await.unwrap_or_default();
            log::error!("Upload of {} failed with {}: {}", path, status, raw);
            return Err(save_failed(ProviderErrorBody::parse(&raw).details()));
        }

        log::debug!("Uploaded {} ({} bytes)", path, size);
        Ok(self.public_url(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn client(url: String) -> StorageClient {
        StorageClient::new(
            reqwest::Client::new(),
            &StorageConfig {
                url,
                service_key: "service-key".to_string(),
                bucket: "dream-images".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn upload_returns_public_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/object/dream-images/u1/d1.png")
            .match_header("authorization", "Bearer service-key")
            .match_header("content-type", "image/png")
            .with_status(200)
            .with_body(r#"{"Key":"dream-images/u1/d1.png"}"#)
            .create_async()
            .await;

        let url = client(server.url())
            .upload("u1/d1.png", b"png".to_vec(), "image/png")
            .await
            .unwrap();
        assert_eq!(
            url,
            format!("{}/object/public/dream-images/u1/d1.png", server.url())
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_upload_is_a_save_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/object/dream-images/u1/d1.png")
            .with_status(403)
            .with_body(r#"{"statusCode":"403","error":"Unauthorized","message":"new row violates row-level security policy"}"#)
            .create_async()
            .await;

        let err = client(server.url())
            .upload("u1/d1.png", b"png".to_vec(), "image/png")
            .await
            .unwrap_err();
        assert_eq!(err.classification.error_type, ErrorType::DatabaseError);
        assert_eq!(err.status, 500);
        assert_eq!(
            err.classification.details.as_deref(),
            Some("new row violates row-level security policy")
        );
    }

    #[tokio::test]
    async fn unreachable_storage_is_a_save_failure() {
        let err = client("http://127.0.0.1:9".to_string())
            .upload("u1/d1.png", b"png".to_vec(), "image/png")
            .await
            .unwrap_err();
        assert_eq!(err.classification.error_type, ErrorType::DatabaseError);
        assert_eq!(err.status, 500);
    }

    #[test]
    fn unknown_mime_types_are_stored_as_png() {
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("application/octet-stream"), "png");
    }
}
