use actix_web::{HttpResponse, web};
use api_subs::SubscriptionService;
use classifier::ClassifiedError;
use common::{error::AppError, jwt::JwtClaims};
use uuid::Uuid;

use crate::{
    dtos::dream::{
        AnalyzeDreamRequest, AnalyzeDreamResponse, GenerateImageRequest, TranscribeRequest,
        TranscribeResponse, required, required_text,
    },
    services::dream::DreamService,
};

fn ensure_same_user(claims: &JwtClaims, user_id: Uuid) -> Result<(), ClassifiedError> {
    if claims.user_id != user_id {
        return Err(ClassifiedError::from(AppError::Forbidden(
            "userId does not match the authenticated user".to_string(),
        )));
    }
    Ok(())
}

/// Analyzes a dream and stores the result.
///
/// ### Example
/// ```js
/// const res = await fetch('/api/functions/v1/analyze-dream', {
///   method: 'POST',
///   headers: { 'Content-Type': 'application/json', Authorization: `Bearer ${token}` },
///   body: JSON.stringify({ dreamContent, dreamId, userId }),
/// });
/// const { analysis } = await res.json();
/// ```
pub async fn post_analyze_dream(
    claims: web::ReqData<JwtClaims>,
    req: web::Json<AnalyzeDreamRequest>,
    dreams: web::Data<DreamService>,
    subscriptions: web::Data<SubscriptionService>,
) -> Result<HttpResponse, ClassifiedError> {
    let req = req.into_inner();
    let content = required_text(req.dream_content, "dreamContent")?;
    let dream_id = required(req.dream_id, "dreamId")?;
    let user_id = required(req.user_id, "userId")?;
    ensure_same_user(&claims, user_id)?;

    let analysis = dreams.analyze(user_id, dream_id, &content).await?;
    subscriptions.invalidate(user_id).await;
    Ok(HttpResponse::Ok().json(AnalyzeDreamResponse { analysis }))
}

/// Generates an image for a dream.
///
/// Answers `200` with `success: false` and `status: "blocked_content"` when
/// the image provider declines the prompt.
pub async fn post_generate_image(
    claims: web::ReqData<JwtClaims>,
    req: web::Json<GenerateImageRequest>,
    dreams: web::Data<DreamService>,
    subscriptions: web::Data<SubscriptionService>,
) -> Result<HttpResponse, ClassifiedError> {
    let req = req.into_inner();
    let description = required_text(req.description, "description")?;
    let dream_id = required(req.dream_id, "dreamId")?;
    let user_id = required(req.user_id, "userId")?;
    ensure_same_user(&claims, user_id)?;

    let response = dreams.generate_image(user_id, dream_id, &description).await?;
    if response.success {
        subscriptions.invalidate(user_id).await;
    }
    Ok(HttpResponse::Ok().json(response))
}

pub async fn post_transcribe(
    req: web::Json<TranscribeRequest>,
    dreams: web::Data<DreamService>,
) -> Result<HttpResponse, ClassifiedError> {
    let req = req.into_inner();
    let audio = required_text(req.audio_base64, "audioBase64")?;
    let text = dreams
        .transcribe(
            &audio,
            req.file_extension.as_deref(),
            req.mime_type.as_deref(),
        )
        .await?;
    Ok(HttpResponse::Ok().json(TranscribeResponse { text }))
}
