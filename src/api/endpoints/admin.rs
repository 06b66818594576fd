//! Admin surface: user management, prescription oversight, dashboard counts.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::app_state::AppState;
use crate::auth::{self, email_is_valid, password_meets_rules};
use crate::db::repository::{drug, notification, prescription, user};
use crate::models::enums::{NotificationKind, PrescriptionStatus, Role, UserStatus};
use crate::models::filters::{Page, PageInfo, PrescriptionFilter, UserFilter};
use crate::models::prescription::PrescriptionSummary;
use crate::models::user::{NewUser, UserSummary};

#[derive(Deserialize)]
pub struct UserListQuery {
    pub role: Option<String>,
    pub status: Option<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
}

#[derive(Serialize)]
pub struct UserListResponse {
    pub users: Vec<UserSummary>,
    pub page: PageInfo,
}

/// `GET /api/admin/users`
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserListQuery>,
) -> Result<Json<UserListResponse>, ApiError> {
    let filter = UserFilter {
        role: query.role,
        status: query.status,
        search: query.search,
    };
    let page = Page {
        page: query.page.unwrap_or(1),
    };

    let conn = state.db()?;
    let users = user::list_users(&conn, &filter, &page)?;
    let total = user::count_users(&conn, &filter)?;

    Ok(Json(UserListResponse {
        users,
        page: PageInfo::new(&page, total),
    }))
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub medical_id: Option<String>,
}

/// `POST /api/admin/users` — like registration, but any role is allowed.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut errors = Vec::new();

    if req.name.trim().is_empty() {
        errors.push("Name is required".to_string());
    }
    if !email_is_valid(&req.email) {
        errors.push("A valid email address is required".to_string());
    }
    if !password_meets_rules(&req.password) {
        errors.push(
            "Password must be at least 8 characters with uppercase, lowercase and a digit"
                .to_string(),
        );
    }
    let role = match Role::from_str(&req.role) {
        Ok(role) => Some(role),
        Err(_) => {
            errors.push("Invalid role".to_string());
            None
        }
    };

    if email_is_valid(&req.email) {
        let conn = state.db()?;
        if user::email_exists(&conn, &req.email)? {
            errors.push("This email address is already registered".to_string());
        }
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }
    let role = role.ok_or_else(|| ApiError::Internal("role validated but absent".into()))?;

    let password_hash = auth::hash_password(&req.password)?;
    let new = NewUser {
        name: req.name.trim().to_string(),
        email: req.email.trim().to_string(),
        password_hash,
        role,
        medical_id: req.medical_id.filter(|m| !m.trim().is_empty()),
    };
    let id = {
        let mut conn = state.db()?;
        user::create_user(&mut conn, &new)?
    };

    tracing::info!(user_id = id, role = role.as_str(), "admin created user");
    Ok(Json(serde_json::json!({ "id": id })))
}

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub status: UserStatus,
}

/// `PUT /api/admin/users/:id`
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.name.trim().is_empty() || !email_is_valid(&req.email) {
        return Err(ApiError::Validation(vec![
            "Name and a valid email address are required".to_string(),
        ]));
    }

    let conn = state.db()?;
    user::update_user(&conn, id, req.name.trim(), req.email.trim(), req.role, req.status)?;
    Ok(Json(serde_json::json!({ "message": "User updated" })))
}

/// `DELETE /api/admin/users/:id` — admin accounts are never deletable.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conn = state.db()?;
    let target = user::find_by_id(&conn, id)?
        .ok_or_else(|| ApiError::NotFound(format!("user {id} not found")))?;
    if target.role == Role::Admin {
        return Err(ApiError::BadRequest("Admin accounts cannot be deleted".into()));
    }

    if !user::delete_user(&conn, id)? {
        return Err(ApiError::NotFound(format!("user {id} not found")));
    }
    tracing::info!(user_id = id, "admin deleted user");
    Ok(Json(serde_json::json!({ "message": "User deleted" })))
}

#[derive(Deserialize)]
pub struct SetUserStatusRequest {
    pub status: UserStatus,
}

/// `PUT /api/admin/users/:id/status`
pub async fn set_user_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<SetUserStatusRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conn = state.db()?;
    user::set_status(&conn, id, req.status)?;
    Ok(Json(serde_json::json!({ "message": "Status updated" })))
}

#[derive(Deserialize)]
pub struct PrescriptionListQuery {
    pub status: Option<String>,
    pub doctor_id: Option<i64>,
    pub patient_id: Option<i64>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub page: Option<u32>,
}

#[derive(Serialize)]
pub struct PrescriptionListResponse {
    pub prescriptions: Vec<PrescriptionSummary>,
    pub page: PageInfo,
}

/// `GET /api/admin/prescriptions`
pub async fn list_prescriptions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PrescriptionListQuery>,
) -> Result<Json<PrescriptionListResponse>, ApiError> {
    let filter = PrescriptionFilter {
        status: query.status,
        doctor_id: query.doctor_id,
        patient_id: query.patient_id,
        date_from: query.date_from,
        date_to: query.date_to,
    };
    let page = Page {
        page: query.page.unwrap_or(1),
    };

    let conn = state.db()?;
    let prescriptions = prescription::list_prescriptions(&conn, &filter, &page)?;
    let total = prescription::count_prescriptions(&conn, &filter)?;

    Ok(Json(PrescriptionListResponse {
        prescriptions,
        page: PageInfo::new(&page, total),
    }))
}

#[derive(Deserialize)]
pub struct SetPrescriptionStatusRequest {
    pub status: PrescriptionStatus,
}

/// `PUT /api/admin/prescriptions/:id/status` — also notifies the patient.
pub async fn set_prescription_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<SetPrescriptionStatusRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conn = state.db()?;
    prescription::set_status(&conn, id, req.status)?;

    if let Some(rx) = prescription::get_prescription(&conn, id)? {
        notification::create_notification(
            &conn,
            rx.patient_id,
            &format!("Your prescription #{id} is now {}", req.status.as_str()),
            NotificationKind::Info,
        )?;
    }

    tracing::info!(prescription_id = id, status = req.status.as_str(), "status changed");
    Ok(Json(serde_json::json!({ "message": "Status updated" })))
}

#[derive(Deserialize)]
pub struct CreateDrugRequest {
    pub name: String,
    pub generic_name: Option<String>,
}

/// `POST /api/admin/drugs` — add a catalog entry for the doctors' dropdown.
pub async fn create_drug(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDrugRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation(vec!["Drug name is required".to_string()]));
    }

    let conn = state.db()?;
    let id = drug::insert_drug(
        &conn,
        name,
        req.generic_name.as_deref().map(str::trim).filter(|g| !g.is_empty()),
    )?;

    tracing::info!(drug_id = id, name, "drug added to catalog");
    Ok(Json(serde_json::json!({ "id": id })))
}

#[derive(Serialize)]
pub struct DashboardResponse {
    pub patients: u32,
    pub doctors: u32,
    pub pharmacists: u32,
    pub admins: u32,
    pub prescriptions_total: u32,
    pub prescriptions_pending: u32,
    pub prescriptions_active: u32,
}

/// `GET /api/admin/dashboard` — entity counts for the landing view.
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let conn = state.db()?;

    let role_count = |role: &str| -> Result<u32, ApiError> {
        Ok(user::count_users(
            &conn,
            &UserFilter {
                role: Some(role.to_string()),
                ..Default::default()
            },
        )?)
    };
    let status_count = |status: &str| -> Result<u32, ApiError> {
        Ok(prescription::count_prescriptions(
            &conn,
            &PrescriptionFilter {
                status: Some(status.to_string()),
                ..Default::default()
            },
        )?)
    };

    Ok(Json(DashboardResponse {
        patients: role_count("patient")?,
        doctors: role_count("doctor")?,
        pharmacists: role_count("pharmacist")?,
        admins: role_count("admin")?,
        prescriptions_total: prescription::count_prescriptions(
            &conn,
            &PrescriptionFilter::default(),
        )?,
        prescriptions_pending: status_count("pending")?,
        prescriptions_active: status_count("active")?,
    }))
}
