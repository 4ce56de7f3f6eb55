//! Job and texture endpoints of the generation backend.
//!
//! Each method is one request/response pair. Non-2xx responses become
//! [`ClientError::Api`] with the best-effort message from the body.

use std::path::{Path, PathBuf};

use chrono::Utc;

use texgen_core::job::{Job, JobPayload, JobResult, FINALIZATION_PROMPT};
use texgen_core::reference::ReferenceImage;
use texgen_core::types::JobId;

use crate::auth::AuthenticatedClient;
use crate::error::ClientError;
use crate::transport::{FormPart, HttpRequest, HttpResponse};

/// First page of the public gallery.
pub const DEFAULT_PAGE: u32 = 1;
/// Gallery page size.
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

/// Binary asset for a completed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedTexture {
    pub job_id: JobId,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl DownloadedTexture {
    /// `texture-<jobId>.png`
    pub fn default_file_name(&self) -> String {
        format!("texture-{}.png", self.job_id)
    }

    /// Write the texture to `target`.
    ///
    /// A directory target receives the file under its default name; `None`
    /// writes the default name into the working directory.
    pub async fn save(&self, target: Option<&Path>) -> Result<PathBuf, ClientError> {
        let path = match target {
            None => PathBuf::from(self.default_file_name()),
            Some(dir) if tokio::fs::metadata(dir).await.is_ok_and(|m| m.is_dir()) => {
                dir.join(self.default_file_name())
            }
            Some(file) => file.to_path_buf(),
        };
        tokio::fs::write(&path, &self.bytes).await?;
        tracing::info!(job_id = %self.job_id, path = %path.display(), "Saved texture");
        Ok(path)
    }
}

#[derive(Clone)]
pub struct JobApi {
    client: AuthenticatedClient,
}

impl JobApi {
    pub fn new(client: AuthenticatedClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &AuthenticatedClient {
        &self.client
    }

    // ---- submission ----

    /// `POST /ai/generate` as multipart: `prompt` plus one `images` part per
    /// reference image.
    pub async fn submit_generation(
        &self,
        prompt: &str,
        reference_images: &[ReferenceImage],
    ) -> Result<Job, ClientError> {
        let mut parts = vec![FormPart::Text {
            name: "prompt".into(),
            value: prompt.to_string(),
        }];
        parts.extend(reference_images.iter().map(|image| FormPart::File {
            name: "images".into(),
            file_name: image.file_name().to_string(),
            content_type: image.content_type().to_string(),
            bytes: image.bytes().to_vec(),
        }));

        let response = self
            .client
            .execute(HttpRequest::post("/ai/generate").multipart(parts))
            .await?;
        let job = Self::submitted_job(response, prompt)?;
        tracing::info!(job_id = %job.job_id, images = reference_images.len(), "Generation submitted");
        Ok(job)
    }

    /// `POST /ai/modify`. An unknown source job maps to [`ClientError::NotFound`].
    pub async fn submit_modification(&self, job_id: &JobId, prompt: &str) -> Result<Job, ClientError> {
        let request = HttpRequest::post("/ai/modify").json(serde_json::json!({
            "jobId": job_id,
            "prompt": prompt,
        }));
        let response = self.client.execute(request).await?;
        if response.status == 404 {
            return Err(ClientError::NotFound(job_id.to_string()));
        }
        let job = Self::submitted_job(response, prompt)?;
        tracing::info!(source_job_id = %job_id, job_id = %job.job_id, "Modification submitted");
        Ok(job)
    }

    /// `POST /ai/upscale` for the given job.
    pub async fn submit_finalization(&self, job_id: &JobId) -> Result<Job, ClientError> {
        let request = HttpRequest::post("/ai/upscale").json(serde_json::json!({ "jobId": job_id }));
        let response = self.client.execute(request).await?;
        let job = Self::submitted_job(response, FINALIZATION_PROMPT)?;
        tracing::info!(source_job_id = %job_id, job_id = %job.job_id, "Finalization submitted");
        Ok(job)
    }

    // ---- observation ----

    /// `GET /ai/status/{jobId}`. Side-effect free.
    pub async fn get_status(&self, job_id: &JobId) -> Result<Job, ClientError> {
        let payload: JobPayload = self
            .client
            .execute(HttpRequest::get(format!("/ai/status/{job_id}")))
            .await?
            .parse()?;
        if payload.status.is_none() {
            return Err(ClientError::Decode(format!(
                "status response for job {job_id} has no status"
            )));
        }
        Ok(payload.into_job("", Utc::now()))
    }

    /// `GET /ai/job-results/{jobId}`. Only meaningful once completed.
    pub async fn get_result(&self, job_id: &JobId) -> Result<JobResult, ClientError> {
        self.client
            .execute(HttpRequest::get(format!("/ai/job-results/{job_id}")))
            .await?
            .parse()
    }

    /// `GET /textures/{jobId}/download`.
    ///
    /// Requires a signed-in session; without one nothing is sent.
    pub async fn download(&self, job_id: &JobId) -> Result<DownloadedTexture, ClientError> {
        if !self.client.session().is_authenticated() {
            return Err(ClientError::AuthRequired);
        }
        let response = self
            .client
            .execute(HttpRequest::get(format!("/textures/{job_id}/download")))
            .await?
            .ensure_success()?;
        Ok(DownloadedTexture {
            job_id: job_id.clone(),
            content_type: response.content_type,
            bytes: response.body,
        })
    }

    // ---- collections ----

    /// `GET /textures/user`: the signed-in user's finalized textures.
    pub async fn list_user_textures(&self) -> Result<Vec<JobResult>, ClientError> {
        self.client
            .execute(HttpRequest::get("/textures/user"))
            .await?
            .parse()
    }

    /// `GET /textures/public?page&limit`.
    pub async fn list_public_textures(&self, page: u32, limit: u32) -> Result<Vec<JobResult>, ClientError> {
        let request = HttpRequest::get("/textures/public")
            .query("page", page)
            .query("limit", limit);
        self.client.execute(request).await?.parse()
    }

    /// `PUT /textures/{jobId}/visibility`.
    pub async fn update_visibility(&self, job_id: &JobId, is_public: bool) -> Result<(), ClientError> {
        let request = HttpRequest::put(format!("/textures/{job_id}/visibility"))
            .json(serde_json::json!({ "isPublic": is_public }));
        self.client.execute(request).await?.ensure_success()?;
        tracing::info!(job_id = %job_id, is_public, "Updated texture visibility");
        Ok(())
    }

    // ---- private helpers ----

    fn submitted_job(response: HttpResponse, prompt: &str) -> Result<Job, ClientError> {
        let payload: JobPayload = response.parse()?;
        Ok(payload.into_job(prompt, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AuthSession;
    use crate::testing::{bytes, job, job_result, json, StubTransport};
    use crate::transport::{Method, RequestBody};
    use assert_matches::assert_matches;
    use std::sync::Arc;
    use texgen_core::job::JobStatus;

    fn api(signed_in: bool) -> (JobApi, Arc<StubTransport>) {
        let stub = StubTransport::new();
        let session = AuthSession::new();
        if signed_in {
            session.set_tokens("a1", "r1");
        }
        (JobApi::new(AuthenticatedClient::new(stub.clone(), session)), stub)
    }

    fn png(name: &str) -> ReferenceImage {
        ReferenceImage::from_bytes(name, vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]).unwrap()
    }

    #[tokio::test]
    async fn generation_fills_missing_fields() {
        let (api, stub) = api(true);
        stub.on(Method::Post, "/ai/generate", [json(200, serde_json::json!({"jobId": "j1"}))]);

        let job = api.submit_generation("red brick wall", &[]).await.unwrap();

        assert_eq!(job.job_id, JobId::from("j1"));
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.prompt, "red brick wall");
        assert!(job.variations().is_empty());
    }

    #[tokio::test]
    async fn generation_sends_prompt_and_images_as_multipart() {
        let (api, stub) = api(true);
        stub.on(Method::Post, "/ai/generate", [job("j1", "processing")]);

        api.submit_generation("moss", &[png("a.png"), png("b.png")]).await.unwrap();

        let request = &stub.requests()[0];
        let RequestBody::Multipart(parts) = &request.body else {
            panic!("expected multipart body, got {:?}", request.body);
        };
        let names: Vec<&str> = parts.iter().map(FormPart::name).collect();
        assert_eq!(names, ["prompt", "images", "images"]);
        assert_matches!(&parts[1], FormPart::File { file_name, content_type, .. }
            if file_name == "a.png" && content_type == "image/png");
    }

    #[tokio::test]
    async fn modification_of_unknown_job_is_not_found() {
        let (api, stub) = api(true);
        stub.on(Method::Post, "/ai/modify", [json(404, serde_json::json!({"message": "gone"}))]);

        let err = api.submit_modification(&JobId::from("j0"), "darker").await.unwrap_err();
        assert_matches!(err, ClientError::NotFound(ref id) if id == "j0");
    }

    #[tokio::test]
    async fn modification_body_is_camel_case() {
        let (api, stub) = api(true);
        stub.on(Method::Post, "/ai/modify", [job("j2", "pending")]);

        let job = api.submit_modification(&JobId::from("j1"), "darker").await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(
            stub.requests()[0].body,
            RequestBody::Json(serde_json::json!({"jobId": "j1", "prompt": "darker"}))
        );
    }

    #[tokio::test]
    async fn finalization_uses_upscaling_prompt() {
        let (api, stub) = api(true);
        stub.on(Method::Post, "/ai/upscale", [json(200, serde_json::json!({"jobId": "j3"}))]);

        let job = api.submit_finalization(&JobId::from("j2")).await.unwrap();
        assert_eq!(job.prompt, FINALIZATION_PROMPT);
        assert_eq!(
            stub.requests()[0].body,
            RequestBody::Json(serde_json::json!({"jobId": "j2"}))
        );
    }

    #[tokio::test]
    async fn status_without_status_field_is_rejected() {
        let (api, stub) = api(true);
        stub.on(Method::Get, "/ai/status/j1", [json(200, serde_json::json!({"jobId": "j1"}))]);
        assert_matches!(api.get_status(&JobId::from("j1")).await, Err(ClientError::Decode(_)));
    }

    #[tokio::test]
    async fn api_errors_carry_backend_message() {
        let (api, stub) = api(true);
        stub.on(
            Method::Get,
            "/ai/status/j1",
            [json(500, serde_json::json!({"message": "queue offline"}))],
        );
        let err = api.get_status(&JobId::from("j1")).await.unwrap_err();
        assert_matches!(err, ClientError::Api { status: 500, ref message } if message == "queue offline");
    }

    #[tokio::test]
    async fn result_is_decoded() {
        let (api, stub) = api(true);
        stub.on(Method::Get, "/ai/job-results/j1", [job_result("j1")]);
        let result = api.get_result(&JobId::from("j1")).await.unwrap();
        assert_eq!(result.high_res_image_url, "https://cdn/j1/full.png");
        assert!(result.tags.contains("brick"));
    }

    #[tokio::test]
    async fn download_requires_session_and_sends_nothing() {
        let (api, stub) = api(false);
        assert_matches!(api.download(&JobId::from("j1")).await, Err(ClientError::AuthRequired));
        assert!(stub.requests().is_empty());
    }

    #[tokio::test]
    async fn download_returns_bytes() {
        let (api, stub) = api(true);
        stub.on(Method::Get, "/textures/j1/download", [bytes("image/png", b"PNGDATA")]);

        let texture = api.download(&JobId::from("j1")).await.unwrap();
        assert_eq!(texture.bytes, b"PNGDATA");
        assert_eq!(texture.content_type.as_deref(), Some("image/png"));
        assert_eq!(texture.default_file_name(), "texture-j1.png");
    }

    #[tokio::test]
    async fn public_listing_sends_paging() {
        let (api, stub) = api(false);
        stub.on(Method::Get, "/textures/public", [json(200, serde_json::json!([]))]);

        let textures = api.list_public_textures(DEFAULT_PAGE, DEFAULT_PAGE_LIMIT).await.unwrap();
        assert!(textures.is_empty());
        assert_eq!(
            stub.requests()[0].query,
            vec![("page".to_string(), "1".to_string()), ("limit".to_string(), "20".to_string())]
        );
    }

    #[tokio::test]
    async fn visibility_update() {
        let (api, stub) = api(true);
        stub.on(Method::Put, "/textures/j1/visibility", [crate::testing::status(204)]);

        api.update_visibility(&JobId::from("j1"), true).await.unwrap();
        assert_eq!(
            stub.requests()[0].body,
            RequestBody::Json(serde_json::json!({"isPublic": true}))
        );
    }

    #[tokio::test]
    async fn save_into_directory_uses_default_name() {
        let dir = std::env::temp_dir().join(format!("texgen-save-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let texture = DownloadedTexture {
            job_id: JobId::from("j7"),
            content_type: None,
            bytes: b"abc".to_vec(),
        };

        let path = texture.save(Some(&dir)).await.unwrap();

        assert_eq!(path, dir.join("texture-j7.png"));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"abc");
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
