use serde::{Deserialize, Serialize};

use super::enums::{Role, UserStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub medical_id: Option<String>,
    pub status: UserStatus,
    pub created_at: String,
}

/// Short form used by list endpoints and dropdowns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub status: UserStatus,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
}

/// Practice details kept alongside a doctor's user row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorProfile {
    pub user_id: i64,
    pub phone: Option<String>,
    pub specialization: Option<String>,
    pub qualification: Option<String>,
}

impl DoctorProfile {
    pub fn blank(user_id: i64) -> Self {
        Self {
            user_id,
            phone: None,
            specialization: None,
            qualification: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    pub user_id: i64,
    pub email_notifications: bool,
    pub sms_notifications: bool,
    pub prescription_reminders: bool,
    pub status_updates: bool,
}

impl UserSettings {
    /// Defaults applied at registration.
    pub fn defaults(user_id: i64) -> Self {
        Self {
            user_id,
            email_notifications: true,
            sms_notifications: false,
            prescription_reminders: true,
            status_updates: true,
        }
    }
}

/// Fields required to insert a new user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub medical_id: Option<String>,
}
