use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TutorStatus {
    Active,
    Pending,
    Inactive,
}

impl TutorStatus {
    /// Tutors that appear in attendance reports.
    pub fn is_reportable(&self) -> bool {
        matches!(self, TutorStatus::Active | TutorStatus::Pending)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(
    example = json!({
        "id": 42,
        "name": "Abdul Rahman",
        "phone": "9876543210",
        "email": "rahman@example.com",
        "assignedCenter": 7,
        "status": "active"
    })
)]
pub struct Tutor {
    pub id: u64,
    pub name: String,
    pub phone: String,
    #[schema(nullable = true)]
    pub email: Option<String>,
    #[schema(nullable = true)]
    pub assigned_center: Option<u64>,
    pub status: TutorStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Center {
    #[schema(example = 7)]
    pub id: u64,
    #[schema(example = "Jama Masjid Center")]
    pub name: String,
    #[schema(example = 28.6139)]
    pub latitude: f64,
    #[schema(example = 77.2090)]
    pub longitude: f64,
}
