use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use classifier::{
    AiErrorClassification, ClassifiedError, DreamAnalysis, ErrorType, detect_refusal,
    parse_analysis,
};
use common::{error::AppError, misc::UsageKind};
use uuid::Uuid;

use crate::{
    clients::{
        PROVIDER_DEFAULT_STATUS,
        chat::{self, ChatClient},
        image::{ImageClient, ImageOutcome},
        storage::{StorageClient, extension_for},
        transcription::TranscriptionClient,
    },
    dtos::dream::GenerateImageResponse,
    ports::DreamStore,
};

pub const ANALYSIS_SYSTEM_PROMPT: &str = r#"You are an expert dream analyst drawing on Jungian and modern psychology.
Analyze the dream the user describes and respond with ONLY a JSON object, no markdown and no commentary, in exactly this shape:
{
  "rating": <integer from 1 to 5 describing how vivid and meaningful the dream is>,
  "themes": [<2 to 5 short themes>],
  "symbols": [<2 to 6 notable symbols>],
  "emotions": [<1 to 5 emotions the dreamer likely felt>],
  "interpretation": "<two or three paragraphs interpreting the dream>"
}"#;

pub const ENHANCE_SYSTEM_PROMPT: &str = "You turn dream descriptions into vivid, safe prompts for an image model. \
Keep the scene, mood and key symbols, add visual detail about lighting, colors and composition, \
and leave out anything graphic, violent or explicit. Reply with the prompt only, at most 120 words.";

/// Audio sent to the transcriber when the client gives no format.
const DEFAULT_AUDIO_EXTENSION: &str = "webm";
const DEFAULT_AUDIO_MIME: &str = "audio/webm";

/// The three AI edge functions over injected provider clients and storage.
pub struct DreamService {
    chat: ChatClient,
    images: ImageClient,
    storage: StorageClient,
    transcriber: TranscriptionClient,
    store: Arc<dyn DreamStore>,
}

fn database_error(error: AppError) -> ClassifiedError {
    log::error!("Failed to persist edge function result: {}", error);
    AiErrorClassification::new(ErrorType::DatabaseError, "database", Some(error.to_string()))
        .into_error(500)
}

impl DreamService {
    pub fn new(
        chat: ChatClient,
        images: ImageClient,
        storage: StorageClient,
        transcriber: TranscriptionClient,
        store: Arc<dyn DreamStore>,
    ) -> Self {
        DreamService {
            chat,
            images,
            storage,
            transcriber,
            store,
        }
    }

    async fn ensure_owner(&self, user_id: Uuid, dream_id: Uuid) -> Result<(), ClassifiedError> {
        match self.store.dream_owner(dream_id).await {
            Ok(Some(owner)) if owner == user_id => Ok(()),
            Ok(Some(_)) => Err(ClassifiedError::from(AppError::Forbidden(
                "Dream belongs to another user".to_string(),
            ))),
            Ok(None) => Err(ClassifiedError::from(AppError::NotFound(format!(
                "Dream {} not found",
                dream_id
            )))),
            Err(e) => Err(database_error(e)),
        }
    }

    /// Interprets a dream and stores the result.
    ///
    /// Provider failures, refusals and unparseable output fail before
    /// anything is written; a failed insert is a `DATABASE_ERROR`.
    pub async fn analyze(
        &self,
        user_id: Uuid,
        dream_id: Uuid,
        content: &str,
    ) -> Result<DreamAnalysis, ClassifiedError> {
        self.ensure_owner(user_id, dream_id).await?;

        let text = self
            .chat
            .complete(ANALYSIS_SYSTEM_PROMPT, content, true)
            .await?;
        if let Some(refusal) = detect_refusal(&text, chat::SOURCE) {
            return Err(refusal.into_error(PROVIDER_DEFAULT_STATUS));
        }
        let analysis = parse_analysis(&text, chat::SOURCE).map_err(|c| c.into_error(500))?;

        self.store
            .save_analysis(user_id, dream_id, &analysis)
            .await
            .map_err(database_error)?;
        self.record_usage(user_id, UsageKind::Analysis).await;

        log::info!("Analyzed dream {} for {}", dream_id, user_id);
        Ok(analysis)
    }

    /// Image prompt for `description`; falls back to the description itself
    /// when the chat provider fails or refuses.
    pub async fn enhance(&self, description: &str) -> String {
        match self
            .chat
            .complete(ENHANCE_SYSTEM_PROMPT, description, false)
            .await
        {
            Ok(text) if detect_refusal(&text, chat::SOURCE).is_none() => text.trim().to_string(),
            Ok(_) => description.to_string(),
            Err(e) => {
                log::warn!("Description enhancement failed, using the original: {}", e);
                description.to_string()
            }
        }
    }

    /// Generates, uploads and attaches an image to a dream.
    ///
    /// A content block is a successful call with `success: false` so the
    /// client can show the enhanced prompt and let the user rephrase.
    pub async fn generate_image(
        &self,
        user_id: Uuid,
        dream_id: Uuid,
        description: &str,
    ) -> Result<GenerateImageResponse, ClassifiedError> {
        self.ensure_owner(user_id, dream_id).await?;

        let enhanced = self.enhance(description).await;
        let (mime_type, bytes) = match self.images.generate(&enhanced).await? {
            ImageOutcome::Image { mime_type, bytes } => (mime_type, bytes),
            ImageOutcome::Blocked { message } => {
                log::info!("Image for dream {} blocked by content policy", dream_id);
                return Ok(GenerateImageResponse::blocked(message, enhanced));
            }
        };

        let path = format!(
            "{}/{}-{}.{}",
            user_id,
            dream_id,
            Uuid::new_v4(),
            extension_for(&mime_type)
        );
        let image_url = self.storage.upload(&path, bytes, &mime_type).await?;

        self.store
            .set_image(dream_id, &image_url, &enhanced)
            .await
            .map_err(database_error)?;
        self.record_usage(user_id, UsageKind::Image).await;

        log::info!("Generated image for dream {} ({})", dream_id, image_url);
        Ok(GenerateImageResponse::generated(image_url, enhanced))
    }

    /// Transcribes base64 audio; a `data:` URI prefix is accepted.
    pub async fn transcribe(
        &self,
        audio_base64: &str,
        file_extension: Option<&str>,
        mime_type: Option<&str>,
    ) -> Result<String, ClassifiedError> {
        let audio = decode_audio(audio_base64)?;
        let extension = file_extension
            .map(|e| e.trim().trim_start_matches('.'))
            .filter(|e| !e.is_empty())
            .unwrap_or(DEFAULT_AUDIO_EXTENSION);
        let mime_type = mime_type
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_AUDIO_MIME);

        self.transcriber
            .transcribe(audio, format!("recording.{}", extension), mime_type)
            .await
    }

    async fn record_usage(&self, user_id: Uuid, kind: UsageKind) {
        // the result is already stored, so a lost usage row is not worth failing the call
        if let Err(e) = self.store.record_usage(user_id, kind).await {
            log::warn!("Failed to record {} usage for {}: {}", kind, user_id, e);
        }
    }
}

fn decode_audio(audio_base64: &str) -> Result<Vec<u8>, ClassifiedError> {
    let payload = match audio_base64.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => audio_base64,
    };
    let audio = STANDARD.decode(payload.trim()).map_err(|e| {
        AiErrorClassification::invalid_request(format!("audioBase64 is not valid base64: {}", e))
            .into_error(400)
    })?;
    if audio.is_empty() {
        return Err(AiErrorClassification::invalid_request("audioBase64 is empty").into_error(400));
    }
    Ok(audio)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use async_trait::async_trait;
    use common::{
        env_config::{ImageProviderConfig, OpenAiConfig, StorageConfig},
        error::Res,
    };
    use mockito::{Matcher, Server, ServerGuard};
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct FakeStore {
        owner: Option<Uuid>,
        fail_writes: bool,
        analyses: Mutex<Vec<DreamAnalysis>>,
        images: Mutex<Vec<(Uuid, String, String)>>,
        usage: Mutex<Vec<UsageKind>>,
    }

    #[async_trait]
    impl DreamStore for FakeStore {
        async fn dream_owner(&self, _dream_id: Uuid) -> Res<Option<Uuid>> {
            Ok(self.owner)
        }

        async fn save_analysis(
            &self,
            _user_id: Uuid,
            _dream_id: Uuid,
            analysis: &DreamAnalysis,
        ) -> Res<()> {
            if self.fail_writes {
                return Err(AppError::Internal("insert failed".to_string()));
            }
            self.analyses.lock().unwrap().push(analysis.clone());
            Ok(())
        }

        async fn set_image(&self, dream_id: Uuid, image_url: &str, enhanced: &str) -> Res<()> {
            if self.fail_writes {
                return Err(AppError::Internal("update failed".to_string()));
            }
            self.images
                .lock()
                .unwrap()
                .push((dream_id, image_url.to_string(), enhanced.to_string()));
            Ok(())
        }

        async fn record_usage(&self, _user_id: Uuid, kind: UsageKind) -> Res<()> {
            self.usage.lock().unwrap().push(kind);
            Ok(())
        }
    }

    fn service(server: &ServerGuard, store: Arc<FakeStore>) -> DreamService {
        let http = reqwest::Client::new();
        let openai = OpenAiConfig {
            api_key: "sk-test".to_string(),
            base_url: server.url(),
            chat_model: "gpt-4o-mini".to_string(),
            transcription_model: "whisper-1".to_string(),
        };
        DreamService::new(
            ChatClient::new(http.clone(), &openai),
            ImageClient::new(
                http.clone(),
                &ImageProviderConfig {
                    api_key: "AIza-test".to_string(),
                    base_url: server.url(),
                    model: "imagen".to_string(),
                },
            ),
            StorageClient::new(
                http.clone(),
                &StorageConfig {
                    url: server.url(),
                    service_key: "service-key".to_string(),
                    bucket: "dream-images".to_string(),
                },
            ),
            TranscriptionClient::new(http, &openai),
            store,
        )
    }

    fn chat_body(content: &str) -> String {
        serde_json::json!({ "choices": [{ "message": { "content": content } }] }).to_string()
    }

    async fn mock_chat(server: &mut ServerGuard, system_marker: &str, content: &str) -> mockito::Mock {
        server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::Regex(system_marker.to_string()))
            .with_status(200)
            .with_body(chat_body(content))
            .create_async()
            .await
    }

    #[tokio::test]
    async fn analysis_is_salvaged_and_stored() {
        let mut server = Server::new_async().await;
        let user = Uuid::new_v4();
        let store = Arc::new(FakeStore {
            owner: Some(user),
            ..Default::default()
        });
        let _chat = mock_chat(
            &mut server,
            "dream analyst",
            "Sure! ```json\n{\"rating\": 4, \"themes\": [\"flight\"], \"symbols\": [\"city\"], \"emotions\": [\"joy\"], \"interpretation\": \"Freedom.\"}\n```",
        )
        .await;

        let analysis = service(&server, store.clone())
            .analyze(user, Uuid::new_v4(), "I was flying over a city")
            .await
            .unwrap();

        assert_eq!(analysis.rating, 4);
        assert_eq!(analysis.interpretation, "Freedom.");
        assert_eq!(store.analyses.lock().unwrap().len(), 1);
        assert_eq!(*store.usage.lock().unwrap(), vec![UsageKind::Analysis]);
    }

    #[tokio::test]
    async fn hidden_refusal_stores_nothing() {
        let mut server = Server::new_async().await;
        let user = Uuid::new_v4();
        let store = Arc::new(FakeStore {
            owner: Some(user),
            ..Default::default()
        });
        let _chat = mock_chat(
            &mut server,
            "dream analyst",
            "I'm unable to fulfill this request.",
        )
        .await;

        let err = service(&server, store.clone())
            .analyze(user, Uuid::new_v4(), "a dream")
            .await
            .unwrap_err();

        assert_eq!(err.classification.error_type, ErrorType::ContentModeration);
        assert_eq!(err.status, 422);
        assert!(store.analyses.lock().unwrap().is_empty());
        assert!(store.usage.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_insert_is_a_database_error() {
        let mut server = Server::new_async().await;
        let user = Uuid::new_v4();
        let store = Arc::new(FakeStore {
            owner: Some(user),
            fail_writes: true,
            ..Default::default()
        });
        let _chat = mock_chat(
            &mut server,
            "dream analyst",
            r#"{"rating": 2, "themes": ["loss"], "symbols": [], "emotions": [], "interpretation": "Letting go."}"#,
        )
        .await;

        let err = service(&server, store)
            .analyze(user, Uuid::new_v4(), "a dream")
            .await
            .unwrap_err();

        assert_eq!(err.classification.error_type, ErrorType::DatabaseError);
        assert_eq!(err.status, 500);
    }

    #[tokio::test]
    async fn someone_elses_dream_is_rejected() {
        let server = Server::new_async().await;
        let store = Arc::new(FakeStore {
            owner: Some(Uuid::new_v4()),
            ..Default::default()
        });

        let err = service(&server, store)
            .analyze(Uuid::new_v4(), Uuid::new_v4(), "a dream")
            .await
            .unwrap_err();
        assert_eq!(err.classification.error_type, ErrorType::Authorization);
    }

    #[tokio::test]
    async fn generated_image_is_uploaded_and_attached() {
        let mut server = Server::new_async().await;
        let user = Uuid::new_v4();
        let dream = Uuid::new_v4();
        let store = Arc::new(FakeStore {
            owner: Some(user),
            ..Default::default()
        });
        let _chat = mock_chat(&mut server, "safe prompts", "  A glowing lighthouse at dusk  ").await;
        let _mock = server
            .mock("POST", "/models/imagen:generateContent")
            .match_body(Matcher::Regex("A glowing lighthouse at dusk".to_string()))
            .with_status(200)
            .with_body(r#"{"candidates":[{"content":{"parts":[{"inlineData":{"mimeType":"image/png","data":"aGVsbG8="}}]}}]}"#)
            .create_async()
            .await;
        let upload = server
            .mock(
                "POST",
                Matcher::Regex(format!(r"^/object/dream-images/{}/{}-.+\.png$", user, dream)),
            )
            .with_status(200)
            .create_async()
            .await;

        let response = service(&server, store.clone())
            .generate_image(user, dream, "a lighthouse")
            .await
            .unwrap();

        upload.assert_async().await;
        assert!(response.success);
        assert_eq!(response.enhanced_description, "A glowing lighthouse at dusk");
        let image_url = response.image_url.unwrap();
        assert!(image_url.starts_with(&format!(
            "{}/object/public/dream-images/{}/",
            server.url(),
            user
        )));
        let images = store.images.lock().unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].1, image_url);
        assert_eq!(*store.usage.lock().unwrap(), vec![UsageKind::Image]);
    }

    #[tokio::test]
    async fn blocked_image_is_reported_without_usage() {
        let mut server = Server::new_async().await;
        let user = Uuid::new_v4();
        let store = Arc::new(FakeStore {
            owner: Some(user),
            ..Default::default()
        });
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .with_body("upstream unavailable")
            .create_async()
            .await;
        let _mock = server
            .mock("POST", "/models/imagen:generateContent")
            .with_status(400)
            .with_body(r#"{"error":{"code":400,"message":"Request blocked by the safety filter.","status":"INVALID_ARGUMENT"}}"#)
            .create_async()
            .await;

        let response = service(&server, store.clone())
            .generate_image(user, Uuid::new_v4(), "a storm")
            .await
            .unwrap();

        assert_eq!(
            response,
            GenerateImageResponse::blocked(
                "Request blocked by the safety filter.".to_string(),
                "a storm".to_string(),
            )
        );
        assert!(store.images.lock().unwrap().is_empty());
        assert!(store.usage.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn data_uri_audio_is_transcribed() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/audio/transcriptions")
            .match_body(Matcher::Regex(r#"filename="recording\.m4a""#.to_string()))
            .with_status(200)
            .with_body(r#"{"text":"I lost my teeth."}"#)
            .create_async()
            .await;

        let text = service(&server, Arc::new(FakeStore::default()))
            .transcribe("data:audio/m4a;base64,aGVsbG8=", Some(".m4a"), Some("audio/m4a"))
            .await
            .unwrap();
        assert_eq!(text, "I lost my teeth.");
    }

    #[test]
    fn invalid_audio_is_an_invalid_request() {
        let err = decode_audio("not base64!").unwrap_err();
        assert_eq!(err.status, 400);
        assert_eq!(err.classification.error_type, ErrorType::InvalidRequest);
        assert!(decode_audio("").is_err());
    }
}
