use uuid::Uuid;

pub struct DreamAnalysisCreateRequest {
    pub dream_id: Uuid,
    pub user_id: Uuid,
    pub rating: i16,
    pub themes: Vec<String>,
    pub symbols: Vec<String>,
    pub emotions: Vec<String>,
    pub interpretation: String,
}
