//! Patient surface: own prescriptions, uploads, doctor choice, profile,
//! allergies and settings.

use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::CurrentUser;
use crate::app_state::AppState;
use crate::auth::{self, password_meets_rules};
use crate::db::repository::{assignment, notification, prescription, user};
use crate::models::enums::{NotificationKind, PrescriptionStatus, Role, UserStatus};
use crate::models::filters::{Page, PageInfo, PrescriptionFilter};
use crate::models::prescription::{NewPrescription, PrescriptionDetail, PrescriptionSummary};
use crate::models::user::{UserProfile, UserSettings, UserSummary};
use crate::uploads;

#[derive(Deserialize)]
pub struct PatientPrescriptionQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
}

#[derive(Serialize)]
pub struct PatientPrescriptionList {
    pub prescriptions: Vec<PrescriptionSummary>,
    pub page: PageInfo,
}

/// `GET /api/patient/prescriptions`
pub async fn list_prescriptions(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<PatientPrescriptionQuery>,
) -> Result<Json<PatientPrescriptionList>, ApiError> {
    let filter = PrescriptionFilter {
        status: query.status,
        patient_id: Some(current.user_id),
        ..Default::default()
    };
    let page = Page {
        page: query.page.unwrap_or(1),
    };

    let conn = state.db()?;
    let prescriptions = prescription::list_prescriptions(&conn, &filter, &page)?;
    let total = prescription::count_prescriptions(&conn, &filter)?;

    Ok(Json(PatientPrescriptionList {
        prescriptions,
        page: PageInfo::new(&page, total),
    }))
}

/// `GET /api/patient/prescriptions/:id` — ownership-scoped detail.
pub async fn get_prescription(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<PrescriptionDetail>, ApiError> {
    let conn = state.db()?;
    let detail = prescription::get_detail(&conn, id)?
        .filter(|d| d.prescription.patient_id == current.user_id)
        .ok_or_else(|| ApiError::NotFound(format!("prescription {id} not found")))?;
    Ok(Json(detail))
}

#[derive(Deserialize)]
pub struct PatientEditRequest {
    pub diagnosis: Option<String>,
    pub notes: Option<String>,
}

/// `PUT /api/patient/prescriptions/:id` — annotate an uploaded prescription
/// with diagnosis and notes. Only the owner can edit, and only while the
/// prescription is still pending review.
pub async fn update_prescription(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<PatientEditRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let diagnosis = req.diagnosis.as_deref().map(str::trim).filter(|d| !d.is_empty());
    let notes = req.notes.as_deref().map(str::trim).filter(|n| !n.is_empty());

    let conn = state.db()?;
    prescription::update_pending_by_patient(&conn, id, current.user_id, diagnosis, notes)?;

    tracing::info!(prescription_id = id, patient_id = current.user_id, "upload annotated");
    Ok(Json(serde_json::json!({ "message": "Prescription updated" })))
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub id: i64,
    pub file: String,
}

/// `POST /api/patient/prescriptions/upload`
///
/// Multipart upload of a scanned prescription (JPG/PNG/PDF). The file is
/// stored under a randomized name, a pending prescription is created, and
/// the reviewing doctor is resolved as: the patient's assigned doctor, else
/// any active doctor, else any admin.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut file_name: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut data: Option<axum::body::Bytes> = None;
    let mut notes: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        match field.name() {
            Some("file") => {
                file_name = field.file_name().map(str::to_string);
                content_type = field.content_type().map(str::to_string);
                data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::BadRequest(e.to_string()))?,
                );
            }
            Some("notes") => {
                notes = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::BadRequest(e.to_string()))?,
                );
            }
            _ => {}
        }
    }

    let data = data.filter(|d| !d.is_empty()).ok_or_else(|| {
        ApiError::BadRequest("No file uploaded".into())
    })?;
    let original_name = file_name.unwrap_or_else(|| "upload".to_string());

    if !uploads::mime_allowed(content_type.as_deref(), &original_name) {
        return Err(ApiError::BadRequest(
            "Only JPG, PNG and PDF files are accepted".into(),
        ));
    }

    let stored = uploads::save_upload(&state.config.upload_dir(), &original_name, &data)
        .map_err(|e| ApiError::Internal(format!("failed to store upload: {e}")))?;

    let mut conn = state.db()?;

    let doctor_id = match assignment::doctor_for_patient(&conn, current.user_id)? {
        Some(id) => id,
        None => user::find_any_active_doctor(&conn)?
            .or(user::find_any_admin(&conn)?)
            .ok_or_else(|| {
                ApiError::BadRequest("No doctor is available to review uploads".into())
            })?,
    };

    let upload_note = match notes.filter(|n| !n.trim().is_empty()) {
        Some(n) => format!("Uploaded file: {original_name}. {n}"),
        None => format!("Uploaded file: {original_name}"),
    };
    let new = NewPrescription {
        patient_id: current.user_id,
        doctor_id,
        diagnosis: None,
        notes: Some(upload_note),
        status: PrescriptionStatus::Pending,
        file_path: Some(stored.clone()),
        medications: Vec::new(),
    };
    let id = prescription::create_prescription(&mut conn, &new)?;

    notification::create_notification(
        &conn,
        doctor_id,
        &format!("{} uploaded a prescription for review", current.name),
        NotificationKind::Info,
    )?;

    tracing::info!(prescription_id = id, patient_id = current.user_id, "prescription uploaded");
    Ok(Json(UploadResponse { id, file: stored }))
}

#[derive(Serialize)]
pub struct CurrentDoctorResponse {
    pub doctor: Option<UserSummary>,
}

/// `GET /api/patient/doctor`
pub async fn current_doctor(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<CurrentDoctorResponse>, ApiError> {
    let conn = state.db()?;
    let doctor = match assignment::doctor_for_patient(&conn, current.user_id)? {
        Some(id) => user::find_by_id(&conn, id)?.map(|u| UserSummary {
            id: u.id,
            name: u.name,
            email: u.email,
            role: u.role,
            status: u.status,
            created_at: u.created_at,
        }),
        None => None,
    };
    Ok(Json(CurrentDoctorResponse { doctor }))
}

#[derive(Deserialize)]
pub struct ChooseDoctorRequest {
    pub doctor_id: i64,
}

/// `POST /api/patient/doctor` — switch to a new doctor. Any existing
/// assignment row is replaced; the target must be an active doctor.
pub async fn choose_doctor(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<ChooseDoctorRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut conn = state.db()?;
    let target = user::find_by_id(&conn, req.doctor_id)?;
    match target {
        Some(u) if u.role == Role::Doctor && u.status == UserStatus::Active => {}
        _ => {
            return Err(ApiError::BadRequest(
                "Selected doctor is not available".into(),
            ))
        }
    }

    assignment::reassign_doctor(&mut conn, current.user_id, req.doctor_id)?;
    tracing::info!(patient_id = current.user_id, doctor_id = req.doctor_id, "doctor chosen");
    Ok(Json(serde_json::json!({ "message": "Doctor assigned" })))
}

/// `GET /api/patient/doctors` — active doctors the patient can choose from.
pub async fn available_doctors(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let conn = state.db()?;
    Ok(Json(user::list_active_doctors(&conn)?))
}

/// `GET /api/patient/profile`
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<UserProfile>, ApiError> {
    let conn = state.db()?;
    let profile = user::get_profile(&conn, current.user_id)?
        .ok_or_else(|| ApiError::NotFound("profile not found".into()))?;
    Ok(Json(profile))
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub phone: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
}

/// `PUT /api/patient/profile`
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conn = state.db()?;
    user::update_profile(
        &conn,
        &UserProfile {
            user_id: current.user_id,
            phone: req.phone,
            address: req.address,
            date_of_birth: req.date_of_birth,
            gender: req.gender,
        },
    )?;
    Ok(Json(serde_json::json!({ "message": "Profile updated" })))
}

#[derive(Serialize)]
pub struct AllergiesResponse {
    pub allergies: Vec<String>,
}

/// `GET /api/patient/allergies`
pub async fn get_allergies(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<AllergiesResponse>, ApiError> {
    let conn = state.db()?;
    Ok(Json(AllergiesResponse {
        allergies: user::get_allergies(&conn, current.user_id)?,
    }))
}

#[derive(Deserialize)]
pub struct UpdateAllergiesRequest {
    pub allergies: Vec<String>,
}

/// `PUT /api/patient/allergies` — replace the whole list. Entries are
/// trimmed, blanks dropped, duplicates collapsed.
pub async fn update_allergies(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<UpdateAllergiesRequest>,
) -> Result<Json<AllergiesResponse>, ApiError> {
    let mut allergies: Vec<String> = Vec::new();
    for entry in &req.allergies {
        let entry = entry.trim();
        if entry.is_empty() || allergies.iter().any(|a| a == entry) {
            continue;
        }
        allergies.push(entry.to_string());
    }

    let conn = state.db()?;
    user::set_allergies(&conn, current.user_id, &allergies)?;
    Ok(Json(AllergiesResponse { allergies }))
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// `POST /api/patient/settings/password`
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut errors = Vec::new();
    if !password_meets_rules(&req.new_password) {
        errors.push(
            "Password must be at least 8 characters with uppercase, lowercase and a digit"
                .to_string(),
        );
    }
    if req.new_password != req.confirm_password {
        errors.push("Passwords do not match".to_string());
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let stored = {
        let conn = state.db()?;
        user::find_by_id(&conn, current.user_id)?
            .ok_or_else(|| ApiError::NotFound("user not found".into()))?
    };
    if !auth::verify_password(&req.current_password, &stored.password_hash) {
        return Err(ApiError::BadRequest("Current password is incorrect".into()));
    }

    let hash = auth::hash_password(&req.new_password)?;
    {
        let conn = state.db()?;
        user::update_password(&conn, current.user_id, &hash)?;
    }
    tracing::info!(user_id = current.user_id, "password changed");
    Ok(Json(serde_json::json!({ "message": "Password updated" })))
}

/// `GET /api/patient/settings`
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<UserSettings>, ApiError> {
    let conn = state.db()?;
    let settings = user::get_settings(&conn, current.user_id)?
        .ok_or_else(|| ApiError::NotFound("settings not found".into()))?;
    Ok(Json(settings))
}

#[derive(Deserialize)]
pub struct UpdateSettingsRequest {
    pub email_notifications: bool,
    pub sms_notifications: bool,
    pub prescription_reminders: bool,
    pub status_updates: bool,
}

/// `PUT /api/patient/settings/notifications`
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<UpdateSettingsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conn = state.db()?;
    user::update_settings(
        &conn,
        &UserSettings {
            user_id: current.user_id,
            email_notifications: req.email_notifications,
            sms_notifications: req.sms_notifications,
            prescription_reminders: req.prescription_reminders,
            status_updates: req.status_updates,
        },
    )?;
    Ok(Json(serde_json::json!({ "message": "Settings updated" })))
}

#[derive(Serialize)]
pub struct PatientDashboardResponse {
    pub prescriptions_total: u32,
    pub prescriptions_pending: u32,
    pub prescriptions_active: u32,
    pub unread_notifications: i64,
    pub doctor_id: Option<i64>,
}

/// `GET /api/patient/dashboard` — the patient's own counts and current
/// doctor, for the landing view.
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<PatientDashboardResponse>, ApiError> {
    let conn = state.db()?;

    let status_count = |status: Option<&str>| -> Result<u32, ApiError> {
        Ok(prescription::count_prescriptions(
            &conn,
            &PrescriptionFilter {
                status: status.map(str::to_string),
                patient_id: Some(current.user_id),
                ..Default::default()
            },
        )?)
    };

    Ok(Json(PatientDashboardResponse {
        prescriptions_total: status_count(None)?,
        prescriptions_pending: status_count(Some("pending"))?,
        prescriptions_active: status_count(Some("active"))?,
        unread_notifications: notification::unread_count(&conn, current.user_id)?,
        doctor_id: assignment::doctor_for_patient(&conn, current.user_id)?,
    }))
}
