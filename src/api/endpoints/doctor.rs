//! Doctor surface: patient roster, assignment, prescription authoring,
//! practice profile and settings.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::CurrentUser;
use crate::app_state::AppState;
use crate::auth::{self, password_meets_rules};
use crate::db::repository::{assignment, drug, notification, prescription, user};
use crate::models::drug::Drug;
use crate::models::enums::{NotificationKind, PrescriptionStatus, Role};
use crate::models::filters::{Page, PageInfo, PrescriptionFilter};
use crate::models::prescription::{
    NewMedicationItem, NewPrescription, PrescriptionDetail, PrescriptionSummary,
};
use crate::models::user::{DoctorProfile, UserSettings, UserSummary};

/// `GET /api/doctor/patients` — every patient, for the assignment picker.
pub async fn patients(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let conn = state.db()?;
    Ok(Json(user::list_patients(&conn)?))
}

/// `GET /api/doctor/assigned` — patients assigned to this doctor.
pub async fn assigned(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let conn = state.db()?;
    Ok(Json(assignment::patients_of_doctor(&conn, current.user_id)?))
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub patient_id: i64,
}

/// `POST /api/doctor/assign`
///
/// Idempotent: a patient already assigned elsewhere keeps their existing
/// doctor; only reassignment through the patient's own choose-doctor flow
/// changes it.
pub async fn assign(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<AssignRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conn = state.db()?;
    let target = user::find_by_id(&conn, req.patient_id)?
        .ok_or_else(|| ApiError::NotFound(format!("user {} not found", req.patient_id)))?;
    if target.role != Role::Patient {
        return Err(ApiError::BadRequest("Selected user is not a patient".into()));
    }

    assignment::upsert_assignment(&conn, req.patient_id, current.user_id)?;
    Ok(Json(serde_json::json!({ "message": "Patient assigned" })))
}

/// One medication line as submitted by the prescription form. Either a
/// catalog `drug_id` or a manual `drug_name`; fully blank lines are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct MedicationInput {
    pub drug_id: Option<i64>,
    pub drug_name: Option<String>,
    pub generic_name: Option<String>,
    #[serde(default)]
    pub dosage: String,
    pub duration: Option<String>,
    pub instructions: Option<String>,
}

impl MedicationInput {
    fn is_blank(&self) -> bool {
        self.drug_id.is_none()
            && self.drug_name.as_deref().map(str::trim).unwrap_or("").is_empty()
            && self.dosage.trim().is_empty()
    }
}

/// Resolve submitted lines into insertable items: catalog ids are looked up,
/// manual names pass through, blank lines are dropped. Validation errors for
/// non-blank lines are collected into `errors`.
fn resolve_medications(
    conn: &rusqlite::Connection,
    inputs: &[MedicationInput],
    errors: &mut Vec<String>,
) -> Result<Vec<NewMedicationItem>, ApiError> {
    let mut items = Vec::new();

    for (index, input) in inputs.iter().enumerate() {
        if input.is_blank() {
            continue;
        }
        let line = index + 1;

        let (name, generic) = match input.drug_id {
            Some(id) => match drug::find_drug(conn, id)? {
                Some(Drug { name, generic_name, .. }) => (name, generic_name),
                None => {
                    errors.push(format!("Line {line}: unknown drug"));
                    continue;
                }
            },
            None => (
                input.drug_name.as_deref().unwrap_or("").trim().to_string(),
                input.generic_name.clone(),
            ),
        };

        if name.is_empty() {
            errors.push(format!("Line {line}: drug name is required"));
            continue;
        }
        if input.dosage.trim().is_empty() {
            errors.push(format!("Line {line}: dosage is required"));
            continue;
        }

        items.push(NewMedicationItem {
            drug_name: name,
            generic_name: generic,
            dosage: input.dosage.trim().to_string(),
            duration: input.duration.clone(),
            instructions: input.instructions.clone(),
        });
    }
    Ok(items)
}

#[derive(Deserialize)]
pub struct CreatePrescriptionRequest {
    pub patient_id: i64,
    pub diagnosis: String,
    pub notes: Option<String>,
    pub medications: Vec<MedicationInput>,
}

#[derive(Serialize)]
pub struct CreatePrescriptionResponse {
    pub id: i64,
}

/// `POST /api/doctor/prescriptions`
///
/// Prescription row, patient-doctor link and medication lines are written as
/// one all-or-nothing transaction; the patient is notified on success.
pub async fn create_prescription(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<CreatePrescriptionRequest>,
) -> Result<Json<CreatePrescriptionResponse>, ApiError> {
    let mut errors = Vec::new();
    if req.diagnosis.trim().is_empty() {
        errors.push("Diagnosis is required".to_string());
    }

    let mut conn = state.db()?;

    match user::find_by_id(&conn, req.patient_id)? {
        Some(target) if target.role == Role::Patient => {}
        Some(_) => errors.push("Selected user is not a patient".to_string()),
        None => errors.push("Patient not found".to_string()),
    }

    let medications = resolve_medications(&conn, &req.medications, &mut errors)?;
    if medications.is_empty() && errors.is_empty() {
        errors.push("At least one medication is required".to_string());
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let new = NewPrescription {
        patient_id: req.patient_id,
        doctor_id: current.user_id,
        diagnosis: Some(req.diagnosis.trim().to_string()),
        notes: req.notes,
        status: PrescriptionStatus::Active,
        file_path: None,
        medications,
    };
    let id = prescription::create_prescription(&mut conn, &new)?;

    notification::create_notification(
        &conn,
        req.patient_id,
        &format!("Dr. {} has written a new prescription for you", current.name),
        NotificationKind::Info,
    )?;

    tracing::info!(prescription_id = id, doctor_id = current.user_id, "prescription created");
    Ok(Json(CreatePrescriptionResponse { id }))
}

#[derive(Deserialize)]
pub struct DoctorPrescriptionQuery {
    pub status: Option<String>,
    pub patient_id: Option<i64>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub page: Option<u32>,
}

#[derive(Serialize)]
pub struct DoctorPrescriptionList {
    pub prescriptions: Vec<PrescriptionSummary>,
    pub page: PageInfo,
}

/// `GET /api/doctor/prescriptions` — own prescriptions only.
pub async fn list_prescriptions(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<DoctorPrescriptionQuery>,
) -> Result<Json<DoctorPrescriptionList>, ApiError> {
    let filter = PrescriptionFilter {
        status: query.status,
        doctor_id: Some(current.user_id),
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

    Ok(Json(DoctorPrescriptionList {
        prescriptions,
        page: PageInfo::new(&page, total),
    }))
}

/// `GET /api/doctor/prescriptions/:id` — ownership-scoped detail.
pub async fn get_prescription(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<PrescriptionDetail>, ApiError> {
    let conn = state.db()?;
    let detail = prescription::get_detail(&conn, id)?
        .filter(|d| d.prescription.doctor_id == current.user_id)
        .ok_or_else(|| ApiError::NotFound(format!("prescription {id} not found")))?;
    Ok(Json(detail))
}

#[derive(Deserialize)]
pub struct UpdatePrescriptionRequest {
    pub diagnosis: String,
    pub notes: Option<String>,
    pub status: PrescriptionStatus,
    pub medications: Vec<MedicationInput>,
}

/// `PUT /api/doctor/prescriptions/:id`
///
/// Full replacement of the medication set, scoped to the owning doctor,
/// inside one transaction.
pub async fn update_prescription(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePrescriptionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut errors = Vec::new();
    if req.diagnosis.trim().is_empty() {
        errors.push("Diagnosis is required".to_string());
    }

    let mut conn = state.db()?;
    let medications = resolve_medications(&conn, &req.medications, &mut errors)?;
    if medications.is_empty() && errors.is_empty() {
        errors.push("At least one medication is required".to_string());
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    prescription::update_prescription(
        &mut conn,
        id,
        current.user_id,
        req.diagnosis.trim(),
        req.notes.as_deref(),
        req.status,
        &medications,
    )?;

    if let Some(rx) = prescription::get_prescription(&conn, id)? {
        notification::create_notification(
            &conn,
            rx.patient_id,
            &format!("Your prescription #{id} was updated by Dr. {}", current.name),
            NotificationKind::Info,
        )?;
    }

    tracing::info!(prescription_id = id, doctor_id = current.user_id, "prescription updated");
    Ok(Json(serde_json::json!({ "message": "Prescription updated" })))
}

/// `GET /api/doctor/drugs` — catalog for the prescription form dropdown.
pub async fn drugs(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Drug>>, ApiError> {
    let conn = state.db()?;
    Ok(Json(drug::list_drugs(&conn)?))
}

/// `GET /api/doctor/profile` — practice details. Accounts promoted to doctor
/// after registration get a blank profile until their first save.
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<DoctorProfile>, ApiError> {
    let conn = state.db()?;
    let profile = user::get_doctor_profile(&conn, current.user_id)?
        .unwrap_or_else(|| DoctorProfile::blank(current.user_id));
    Ok(Json(profile))
}

#[derive(Deserialize)]
pub struct UpdateDoctorProfileRequest {
    pub phone: Option<String>,
    pub specialization: Option<String>,
    pub qualification: Option<String>,
}

/// `PUT /api/doctor/profile`
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<UpdateDoctorProfileRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conn = state.db()?;
    user::update_doctor_profile(
        &conn,
        &DoctorProfile {
            user_id: current.user_id,
            phone: req.phone,
            specialization: req.specialization,
            qualification: req.qualification,
        },
    )?;
    Ok(Json(serde_json::json!({ "message": "Profile updated" })))
}

/// `GET /api/doctor/settings`
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

/// `PUT /api/doctor/settings/notifications`
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

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// `POST /api/doctor/settings/password`
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

#[derive(Serialize)]
pub struct DoctorDashboardResponse {
    pub prescriptions_total: u32,
    pub prescriptions_pending: u32,
    pub prescriptions_active: u32,
    pub patients_assigned: u32,
}

/// `GET /api/doctor/dashboard` — this doctor's prescription counts and
/// assigned-patient total.
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<DoctorDashboardResponse>, ApiError> {
    let conn = state.db()?;

    let status_count = |status: Option<&str>| -> Result<u32, ApiError> {
        Ok(prescription::count_prescriptions(
            &conn,
            &PrescriptionFilter {
                status: status.map(str::to_string),
                doctor_id: Some(current.user_id),
                ..Default::default()
            },
        )?)
    };

    Ok(Json(DoctorDashboardResponse {
        prescriptions_total: status_count(None)?,
        prescriptions_pending: status_count(Some("pending"))?,
        prescriptions_active: status_count(Some("active"))?,
        patients_assigned: assignment::patients_of_doctor(&conn, current.user_id)?.len() as u32,
    }))
}
