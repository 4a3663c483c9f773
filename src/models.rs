use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Backend booleans are nullable; a null flag means "not set".
fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    // Anything the backend doesn't call "admin" gets specialist scoping.
    #[serde(other)]
    Specialist,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Specialist => "specialist",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: Option<String>,
    pub role: Role,
    #[serde(default, deserialize_with = "null_as_false")]
    pub is_demo: bool,
}

/// Who is looking at the dashboard. Resolved once and handed to every view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub name: String,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: Uuid, name: impl Into<String>, role: Role) -> Self {
        Self { user_id, name: name.into(), role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<User> for Identity {
    fn from(user: User) -> Self {
        Self::new(user.id, user.name.unwrap_or_else(|| "Unknown".to_string()), user.role)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub is_demo: bool,
}

impl Client {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name.as_deref().unwrap_or(""))
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientAssignment {
    pub id: Uuid,
    pub specialist_id: Uuid,
    pub client_id: Uuid,
    #[serde(default, deserialize_with = "null_as_false")]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub company: String,
    pub job_title: String,
    pub client_id: Option<Uuid>,
    pub specialist_id: Option<Uuid>,
    pub date_applied: NaiveDate,
    pub source: Option<String>,     // "linkedin", "indeed", "referral", etc.
    pub source_link: Option<String>,
    pub application_link: Option<String>,
    pub location: Option<String>,
    pub salary: Option<String>,
    pub resume_used: Option<String>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub is_flagged: bool,
    pub flag_reason: Option<String>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

/// An application joined to its client and specialist display names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationRecord {
    #[serde(flatten)]
    pub application: Application,
    pub client_name: String,
    pub specialist_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplicationStats {
    pub total: usize,
    pub flagged: usize,
    pub today: usize,
}

impl ApplicationStats {
    pub fn compute(records: &[ApplicationRecord], today: NaiveDate) -> Self {
        Self {
            total: records.len(),
            flagged: records.iter().filter(|r| r.application.is_flagged).count(),
            today: records
                .iter()
                .filter(|r| r.application.date_applied == today)
                .count(),
        }
    }
}
