//! API router.
//!
//! Routes are nested under `/api/` in four groups: public auth routes, the
//! common session-gated routes, and the three role-gated surfaces.
//!
//! Layers are applied from bottom (innermost) to top (outermost):
//!   Extension (outermost) → trace → require_session → role gate → handler
//! Extension must be outermost so the session middleware can reach
//! `AppState` from request extensions.

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::app_state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    let public = Router::new()
        .route("/auth/register", post(endpoints::auth::register))
        .route("/auth/login", post(endpoints::auth::login))
        .route("/auth/logout", post(endpoints::auth::logout))
        .route("/auth/forgot-password", post(endpoints::auth::forgot_password))
        .route("/auth/reset-password", post(endpoints::auth::reset_password))
        .with_state(state.clone());

    let common = Router::new()
        .route("/notifications", get(endpoints::notifications::list))
        .route("/notifications/:id/read", post(endpoints::notifications::mark_read))
        .with_state(state.clone())
        .layer(axum::middleware::from_fn(middleware::auth::require_session));

    let admin = Router::new()
        .route(
            "/admin/users",
            get(endpoints::admin::list_users).post(endpoints::admin::create_user),
        )
        .route(
            "/admin/users/:id",
            put(endpoints::admin::update_user).delete(endpoints::admin::delete_user),
        )
        .route("/admin/users/:id/status", put(endpoints::admin::set_user_status))
        .route("/admin/prescriptions", get(endpoints::admin::list_prescriptions))
        .route(
            "/admin/prescriptions/:id/status",
            put(endpoints::admin::set_prescription_status),
        )
        .route("/admin/drugs", post(endpoints::admin::create_drug))
        .route("/admin/dashboard", get(endpoints::admin::dashboard))
        .with_state(state.clone())
        .layer(axum::middleware::from_fn(middleware::auth::require_admin))
        .layer(axum::middleware::from_fn(middleware::auth::require_session));

    let doctor = Router::new()
        .route("/doctor/patients", get(endpoints::doctor::patients))
        .route("/doctor/assigned", get(endpoints::doctor::assigned))
        .route("/doctor/assign", post(endpoints::doctor::assign))
        .route(
            "/doctor/prescriptions",
            get(endpoints::doctor::list_prescriptions).post(endpoints::doctor::create_prescription),
        )
        .route(
            "/doctor/prescriptions/:id",
            get(endpoints::doctor::get_prescription).put(endpoints::doctor::update_prescription),
        )
        .route("/doctor/drugs", get(endpoints::doctor::drugs))
        .route(
            "/doctor/profile",
            get(endpoints::doctor::get_profile).put(endpoints::doctor::update_profile),
        )
        .route("/doctor/settings", get(endpoints::doctor::get_settings))
        .route(
            "/doctor/settings/password",
            post(endpoints::doctor::change_password),
        )
        .route(
            "/doctor/settings/notifications",
            put(endpoints::doctor::update_settings),
        )
        .route("/doctor/dashboard", get(endpoints::doctor::dashboard))
        .with_state(state.clone())
        .layer(axum::middleware::from_fn(middleware::auth::require_doctor))
        .layer(axum::middleware::from_fn(middleware::auth::require_session));

    let patient = Router::new()
        .route("/patient/prescriptions", get(endpoints::patient::list_prescriptions))
        .route("/patient/prescriptions/upload", post(endpoints::patient::upload))
        .route(
            "/patient/prescriptions/:id",
            get(endpoints::patient::get_prescription).put(endpoints::patient::update_prescription),
        )
        .route(
            "/patient/allergies",
            get(endpoints::patient::get_allergies).put(endpoints::patient::update_allergies),
        )
        .route("/patient/dashboard", get(endpoints::patient::dashboard))
        .route(
            "/patient/doctor",
            get(endpoints::patient::current_doctor).post(endpoints::patient::choose_doctor),
        )
        .route("/patient/doctors", get(endpoints::patient::available_doctors))
        .route(
            "/patient/profile",
            get(endpoints::patient::get_profile).put(endpoints::patient::update_profile),
        )
        .route("/patient/settings", get(endpoints::patient::get_settings))
        .route(
            "/patient/settings/password",
            post(endpoints::patient::change_password),
        )
        .route(
            "/patient/settings/notifications",
            put(endpoints::patient::update_settings),
        )
        .with_state(state.clone())
        .layer(axum::middleware::from_fn(middleware::auth::require_patient))
        .layer(axum::middleware::from_fn(middleware::auth::require_session));

    Router::new()
        .nest("/api", public)
        .nest("/api", common)
        .nest("/api", admin)
        .nest("/api", doctor)
        .nest("/api", patient)
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use crate::api::types::SESSION_COOKIE;
    use crate::app_state::AppState;
    use crate::auth::session::Session;
    use crate::config::ServerConfig;
    use crate::db::repository::{assignment, notification, prescription, user};
    use crate::db::sqlite::open_memory_database;
    use crate::mailer::testing::RecordingMailer;
    use crate::models::enums::{NotificationKind, Role, UserStatus};
    use crate::models::user::NewUser;

    fn test_state() -> (Arc<AppState>, Arc<RecordingMailer>, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            bind_addr: ([127, 0, 0, 1], 0).into(),
            data_dir: tmp.path().to_path_buf(),
            session_ttl_secs: 3600,
        };
        let conn = open_memory_database().unwrap();
        let mailer = Arc::new(RecordingMailer::default());
        let state = Arc::new(AppState::new(config, conn, mailer.clone()));
        (state, mailer, tmp)
    }

    /// Seed a user with a junk password hash (fine for everything except
    /// real login verification).
    fn seed_user(state: &Arc<AppState>, name: &str, email: &str, role: Role) -> i64 {
        let mut conn = state.db().unwrap();
        user::create_user(
            &mut conn,
            &NewUser {
                name: name.into(),
                email: email.into(),
                password_hash: "h".into(),
                role,
                medical_id: None,
            },
        )
        .unwrap()
    }

    /// Open a session directly in the store, skipping the login endpoint.
    fn cookie_for(state: &Arc<AppState>, id: i64, name: &str, email: &str, role: Role) -> String {
        let token = state.sessions().unwrap().insert(Session {
            user_id: id,
            name: name.into(),
            email: email.into(),
            role,
        });
        format!("{SESSION_COOKIE}={token}")
    }

    fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(c) = cookie {
            builder = builder.header(header::COOKIE, c);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn send_json(
        method: &str,
        uri: &str,
        cookie: Option<&str>,
        body: serde_json::Value,
    ) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(c) = cookie {
            builder = builder.header(header::COOKIE, c);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: axum::http::Response<Body>) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn multipart_upload(
        cookie: &str,
        filename: &str,
        content_type: &str,
        data: &[u8],
    ) -> Request<Body> {
        let boundary = "XRXPORTALBOUNDARYX";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
                 filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/patient/prescriptions/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header(header::COOKIE, cookie)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn register_login_notifications_logout_flow() {
        let (state, mailer, _tmp) = test_state();

        let response = build_router(state.clone())
            .oneshot(send_json(
                "POST",
                "/api/auth/register",
                None,
                serde_json::json!({
                    "name": "Anna",
                    "email": "anna@example.com",
                    "password": "Passw0rd1",
                    "confirm_password": "Passw0rd1",
                    "role": "patient"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        {
            let sent = mailer.sent.lock().unwrap();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].0, "anna@example.com");
        }

        let response = build_router(state.clone())
            .oneshot(send_json(
                "POST",
                "/api/auth/login",
                None,
                serde_json::json!({ "email": "anna@example.com", "password": "Passw0rd1" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(set_cookie.contains("HttpOnly"));
        let cookie = set_cookie.split(';').next().unwrap().to_string();

        let json = body_json(response).await;
        assert_eq!(json["role"], "patient");
        assert_eq!(json["name"], "Anna");

        let response = build_router(state.clone())
            .oneshot(get("/api/notifications", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = build_router(state.clone())
            .oneshot(send_json("POST", "/api/auth/logout", Some(&cookie), serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = build_router(state)
            .oneshot(get("/api/notifications", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn register_collects_validation_errors() {
        let (state, _mailer, _tmp) = test_state();

        let response = build_router(state)
            .oneshot(send_json(
                "POST",
                "/api/auth/register",
                None,
                serde_json::json!({
                    "name": "",
                    "email": "not-an-email",
                    "password": "short",
                    "confirm_password": "different",
                    "role": "doctor"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let json = body_json(response).await;
        let errors = json["error"]["errors"].as_array().unwrap();
        // name, email, strength, mismatch, missing medical id
        assert_eq!(errors.len(), 5);
    }

    #[tokio::test]
    async fn login_rejects_bad_credentials_and_inactive_accounts() {
        let (state, _mailer, _tmp) = test_state();
        let id = seed_user(&state, "Bob", "bob@example.com", Role::Patient);

        let response = build_router(state.clone())
            .oneshot(send_json(
                "POST",
                "/api/auth/login",
                None,
                serde_json::json!({ "email": "bob@example.com", "password": "anything" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        {
            let conn = state.db().unwrap();
            user::set_status(&conn, id, UserStatus::Inactive).unwrap();
        }
        let response = build_router(state)
            .oneshot(send_json(
                "POST",
                "/api/auth/login",
                None,
                serde_json::json!({ "email": "bob@example.com", "password": "anything" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "ACCOUNT_INACTIVE");
    }

    #[tokio::test]
    async fn role_gates_enforced() {
        let (state, _mailer, _tmp) = test_state();
        let id = seed_user(&state, "Pat", "pat@example.com", Role::Patient);
        let cookie = cookie_for(&state, id, "Pat", "pat@example.com", Role::Patient);

        // No cookie → 401
        let response = build_router(state.clone())
            .oneshot(get("/api/admin/dashboard", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // Wrong role → 403
        let response = build_router(state.clone())
            .oneshot(get("/api/admin/dashboard", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = build_router(state.clone())
            .oneshot(get("/api/doctor/patients", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // Right role → 200
        let response = build_router(state)
            .oneshot(get("/api/patient/prescriptions", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_manages_users() {
        let (state, _mailer, _tmp) = test_state();
        let admin = seed_user(&state, "Root", "root@example.com", Role::Admin);
        seed_user(&state, "Pat", "pat@example.com", Role::Patient);
        let cookie = cookie_for(&state, admin, "Root", "root@example.com", Role::Admin);

        let response = build_router(state.clone())
            .oneshot(send_json(
                "POST",
                "/api/admin/users",
                Some(&cookie),
                serde_json::json!({
                    "name": "Dr Gray",
                    "email": "gray@example.com",
                    "password": "Passw0rd1",
                    "role": "doctor",
                    "medical_id": "MD-100"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let doctor_id = body_json(response).await["id"].as_i64().unwrap();

        let response = build_router(state.clone())
            .oneshot(get("/api/admin/users?role=doctor", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["users"].as_array().unwrap().len(), 1);
        assert_eq!(json["page"]["total_records"], 1);

        let response = build_router(state.clone())
            .oneshot(send_json(
                "PUT",
                &format!("/api/admin/users/{doctor_id}/status"),
                Some(&cookie),
                serde_json::json!({ "status": "inactive" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Admin accounts are never deletable
        let response = build_router(state.clone())
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/admin/users/{admin}"))
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = build_router(state)
            .oneshot(get("/api/admin/dashboard", Some(&cookie)))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["patients"], 1);
        assert_eq!(json["doctors"], 1);
        assert_eq!(json["admins"], 1);
    }

    #[tokio::test]
    async fn doctor_writes_prescription_patient_sees_it() {
        let (state, _mailer, _tmp) = test_state();
        let doctor = seed_user(&state, "Dr Gray", "gray@example.com", Role::Doctor);
        let patient = seed_user(&state, "Anna", "anna@example.com", Role::Patient);
        let doctor_cookie = cookie_for(&state, doctor, "Dr Gray", "gray@example.com", Role::Doctor);
        let patient_cookie = cookie_for(&state, patient, "Anna", "anna@example.com", Role::Patient);

        let response = build_router(state.clone())
            .oneshot(send_json(
                "POST",
                "/api/doctor/prescriptions",
                Some(&doctor_cookie),
                serde_json::json!({
                    "patient_id": patient,
                    "diagnosis": "Hypertension",
                    "medications": [
                        { "drug_name": "Lisinopril", "dosage": "10mg", "duration": "30 days" },
                        { "drug_name": "Amlodipine", "dosage": "5mg" }
                    ]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let id = body_json(response).await["id"].as_i64().unwrap();

        // Patient list shows it with both lines counted
        let response = build_router(state.clone())
            .oneshot(get("/api/patient/prescriptions", Some(&patient_cookie)))
            .await
            .unwrap();
        let json = body_json(response).await;
        let rows = json["prescriptions"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["status"], "active");
        assert_eq!(rows[0]["medication_count"], 2);
        assert_eq!(rows[0]["doctor_name"], "Dr Gray");

        // Detail, ownership-scoped
        let response = build_router(state.clone())
            .oneshot(get(&format!("/api/patient/prescriptions/{id}"), Some(&patient_cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["medications"].as_array().unwrap().len(), 2);
        assert_eq!(json["prescription"]["diagnosis"], "Hypertension");

        // The transaction also created the assignment
        let response = build_router(state.clone())
            .oneshot(get("/api/patient/doctor", Some(&patient_cookie)))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["doctor"]["id"].as_i64().unwrap(), doctor);

        // And notified the patient
        let response = build_router(state)
            .oneshot(get("/api/notifications", Some(&patient_cookie)))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["unread_count"], 1);
    }

    #[tokio::test]
    async fn doctor_prescription_requires_medication_lines() {
        let (state, _mailer, _tmp) = test_state();
        let doctor = seed_user(&state, "Dr Gray", "gray@example.com", Role::Doctor);
        let patient = seed_user(&state, "Anna", "anna@example.com", Role::Patient);
        let cookie = cookie_for(&state, doctor, "Dr Gray", "gray@example.com", Role::Doctor);

        let response = build_router(state)
            .oneshot(send_json(
                "POST",
                "/api/doctor/prescriptions",
                Some(&cookie),
                serde_json::json!({
                    "patient_id": patient,
                    "diagnosis": "Hypertension",
                    "medications": [ { "drug_name": "  ", "dosage": "" } ]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(
            json["error"]["errors"][0],
            "At least one medication is required"
        );
    }

    #[tokio::test]
    async fn doctor_cannot_read_anothers_prescription() {
        let (state, _mailer, _tmp) = test_state();
        let doctor = seed_user(&state, "Dr Gray", "gray@example.com", Role::Doctor);
        let other = seed_user(&state, "Dr Blue", "blue@example.com", Role::Doctor);
        let patient = seed_user(&state, "Anna", "anna@example.com", Role::Patient);

        let id = {
            let mut conn = state.db().unwrap();
            prescription::create_prescription(
                &mut conn,
                &crate::models::prescription::NewPrescription {
                    patient_id: patient,
                    doctor_id: doctor,
                    diagnosis: Some("Flu".into()),
                    notes: None,
                    status: crate::models::enums::PrescriptionStatus::Active,
                    file_path: None,
                    medications: vec![crate::models::prescription::NewMedicationItem {
                        drug_name: "Oseltamivir".into(),
                        generic_name: None,
                        dosage: "75mg".into(),
                        duration: None,
                        instructions: None,
                    }],
                },
            )
            .unwrap()
        };

        let other_cookie = cookie_for(&state, other, "Dr Blue", "blue@example.com", Role::Doctor);
        let response = build_router(state)
            .oneshot(get(&format!("/api/doctor/prescriptions/{id}"), Some(&other_cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn upload_creates_pending_prescription_for_fallback_doctor() {
        let (state, _mailer, _tmp) = test_state();
        let doctor = seed_user(&state, "Dr Gray", "gray@example.com", Role::Doctor);
        let patient = seed_user(&state, "Anna", "anna@example.com", Role::Patient);
        let cookie = cookie_for(&state, patient, "Anna", "anna@example.com", Role::Patient);

        let response = build_router(state.clone())
            .oneshot(multipart_upload(&cookie, "scan.jpg", "image/jpeg", b"fake-jpeg-bytes"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let id = json["id"].as_i64().unwrap();
        let stored = json["file"].as_str().unwrap().to_string();

        assert!(state.config.upload_dir().join(&stored).exists());

        {
            let conn = state.db().unwrap();
            let rx = prescription::get_prescription(&conn, id).unwrap().unwrap();
            assert_eq!(rx.status, crate::models::enums::PrescriptionStatus::Pending);
            assert_eq!(rx.doctor_id, doctor);
            assert_eq!(rx.file_path.as_deref(), Some(stored.as_str()));
            assert!(rx.notes.unwrap().contains("scan.jpg"));

            // Upload assigned the patient and notified the doctor
            assert_eq!(
                assignment::doctor_for_patient(&conn, patient).unwrap(),
                Some(doctor)
            );
            assert_eq!(notification::unread_count(&conn, doctor).unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn upload_rejects_disallowed_mime() {
        let (state, _mailer, _tmp) = test_state();
        seed_user(&state, "Dr Gray", "gray@example.com", Role::Doctor);
        let patient = seed_user(&state, "Anna", "anna@example.com", Role::Patient);
        let cookie = cookie_for(&state, patient, "Anna", "anna@example.com", Role::Patient);

        let response = build_router(state)
            .oneshot(multipart_upload(&cookie, "evil.html", "text/html", b"<script>"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn patient_chooses_and_switches_doctor() {
        let (state, _mailer, _tmp) = test_state();
        let doc1 = seed_user(&state, "Dr Gray", "gray@example.com", Role::Doctor);
        let doc2 = seed_user(&state, "Dr Blue", "blue@example.com", Role::Doctor);
        let inactive = seed_user(&state, "Dr Old", "old@example.com", Role::Doctor);
        let patient = seed_user(&state, "Anna", "anna@example.com", Role::Patient);
        {
            let conn = state.db().unwrap();
            user::set_status(&conn, inactive, UserStatus::Inactive).unwrap();
        }
        let cookie = cookie_for(&state, patient, "Anna", "anna@example.com", Role::Patient);

        // Roster excludes the inactive doctor
        let response = build_router(state.clone())
            .oneshot(get("/api/patient/doctors", Some(&cookie)))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json.as_array().unwrap().len(), 2);

        let response = build_router(state.clone())
            .oneshot(send_json(
                "POST",
                "/api/patient/doctor",
                Some(&cookie),
                serde_json::json!({ "doctor_id": doc1 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Switching replaces the assignment, never duplicates it
        let response = build_router(state.clone())
            .oneshot(send_json(
                "POST",
                "/api/patient/doctor",
                Some(&cookie),
                serde_json::json!({ "doctor_id": doc2 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        {
            let conn = state.db().unwrap();
            assert_eq!(assignment::assignment_count(&conn, patient).unwrap(), 1);
            assert_eq!(assignment::doctor_for_patient(&conn, patient).unwrap(), Some(doc2));
        }

        // Inactive doctor is not selectable
        let response = build_router(state)
            .oneshot(send_json(
                "POST",
                "/api/patient/doctor",
                Some(&cookie),
                serde_json::json!({ "doctor_id": inactive }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn forgot_reset_login_flow() {
        let (state, mailer, _tmp) = test_state();
        let id = seed_user(&state, "Anna", "anna@example.com", Role::Patient);

        let response = build_router(state.clone())
            .oneshot(send_json(
                "POST",
                "/api/auth/forgot-password",
                None,
                serde_json::json!({ "email": "anna@example.com" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);

        // Unknown addresses get the same response and no email
        let response = build_router(state.clone())
            .oneshot(send_json(
                "POST",
                "/api/auth/forgot-password",
                None,
                serde_json::json!({ "email": "nobody@example.com" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);

        let token: String = {
            let conn = state.db().unwrap();
            conn.query_row(
                "SELECT reset_token FROM users WHERE id = ?1",
                rusqlite::params![id],
                |row| row.get(0),
            )
            .unwrap()
        };

        let response = build_router(state.clone())
            .oneshot(send_json(
                "POST",
                "/api/auth/reset-password",
                None,
                serde_json::json!({
                    "token": token,
                    "password": "NewPassw0rd",
                    "confirm_password": "NewPassw0rd"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Token is single-use
        let response = build_router(state.clone())
            .oneshot(send_json(
                "POST",
                "/api/auth/reset-password",
                None,
                serde_json::json!({
                    "token": token,
                    "password": "NewPassw0rd",
                    "confirm_password": "NewPassw0rd"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // New password works
        let response = build_router(state)
            .oneshot(send_json(
                "POST",
                "/api/auth/login",
                None,
                serde_json::json!({ "email": "anna@example.com", "password": "NewPassw0rd" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn notification_read_scoped_to_owner() {
        let (state, _mailer, _tmp) = test_state();
        let anna = seed_user(&state, "Anna", "anna@example.com", Role::Patient);
        let bob = seed_user(&state, "Bob", "bob@example.com", Role::Patient);
        let id = {
            let conn = state.db().unwrap();
            notification::create_notification(&conn, anna, "hello", NotificationKind::Info).unwrap()
        };

        let bob_cookie = cookie_for(&state, bob, "Bob", "bob@example.com", Role::Patient);
        let response = build_router(state.clone())
            .oneshot(send_json(
                "POST",
                &format!("/api/notifications/{id}/read"),
                Some(&bob_cookie),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let anna_cookie = cookie_for(&state, anna, "Anna", "anna@example.com", Role::Patient);
        let response = build_router(state)
            .oneshot(send_json(
                "POST",
                &format!("/api/notifications/{id}/read"),
                Some(&anna_cookie),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn profile_and_settings_round_trip() {
        let (state, _mailer, _tmp) = test_state();
        let patient = seed_user(&state, "Anna", "anna@example.com", Role::Patient);
        let cookie = cookie_for(&state, patient, "Anna", "anna@example.com", Role::Patient);

        let response = build_router(state.clone())
            .oneshot(send_json(
                "PUT",
                "/api/patient/profile",
                Some(&cookie),
                serde_json::json!({
                    "phone": "555-0100",
                    "address": "1 Main St",
                    "date_of_birth": "1990-04-01",
                    "gender": "female"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = build_router(state.clone())
            .oneshot(get("/api/patient/profile", Some(&cookie)))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["phone"], "555-0100");

        let response = build_router(state.clone())
            .oneshot(send_json(
                "PUT",
                "/api/patient/settings/notifications",
                Some(&cookie),
                serde_json::json!({
                    "email_notifications": false,
                    "sms_notifications": true,
                    "prescription_reminders": false,
                    "status_updates": true
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = build_router(state)
            .oneshot(get("/api/patient/settings", Some(&cookie)))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["email_notifications"], false);
        assert_eq!(json["sms_notifications"], true);
    }

    #[tokio::test]
    async fn doctor_profile_and_settings_round_trip() {
        let (state, _mailer, _tmp) = test_state();
        let doctor = seed_user(&state, "Dr Gray", "gray@example.com", Role::Doctor);
        let cookie = cookie_for(&state, doctor, "Dr Gray", "gray@example.com", Role::Doctor);

        let response = build_router(state.clone())
            .oneshot(send_json(
                "PUT",
                "/api/doctor/profile",
                Some(&cookie),
                serde_json::json!({
                    "phone": "555-0199",
                    "specialization": "Cardiology",
                    "qualification": "MD, FACC"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = build_router(state.clone())
            .oneshot(get("/api/doctor/profile", Some(&cookie)))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["specialization"], "Cardiology");
        assert_eq!(json["phone"], "555-0199");

        let response = build_router(state.clone())
            .oneshot(send_json(
                "PUT",
                "/api/doctor/settings/notifications",
                Some(&cookie),
                serde_json::json!({
                    "email_notifications": false,
                    "sms_notifications": true,
                    "prescription_reminders": true,
                    "status_updates": false
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = build_router(state)
            .oneshot(get("/api/doctor/settings", Some(&cookie)))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["email_notifications"], false);
        assert_eq!(json["sms_notifications"], true);
    }

    #[tokio::test]
    async fn patient_manages_allergies() {
        let (state, _mailer, _tmp) = test_state();
        let patient = seed_user(&state, "Anna", "anna@example.com", Role::Patient);
        let cookie = cookie_for(&state, patient, "Anna", "anna@example.com", Role::Patient);

        let response = build_router(state.clone())
            .oneshot(get("/api/patient/allergies", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert!(json["allergies"].as_array().unwrap().is_empty());

        // Blanks are dropped, duplicates collapsed, entries trimmed
        let response = build_router(state.clone())
            .oneshot(send_json(
                "PUT",
                "/api/patient/allergies",
                Some(&cookie),
                serde_json::json!({
                    "allergies": ["Penicillin", "  Latex  ", "", "Penicillin"]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["allergies"], serde_json::json!(["Penicillin", "Latex"]));

        let response = build_router(state)
            .oneshot(get("/api/patient/allergies", Some(&cookie)))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["allergies"], serde_json::json!(["Penicillin", "Latex"]));
    }

    #[tokio::test]
    async fn patient_edits_own_pending_upload_only() {
        let (state, _mailer, _tmp) = test_state();
        let doctor = seed_user(&state, "Dr Gray", "gray@example.com", Role::Doctor);
        let patient = seed_user(&state, "Anna", "anna@example.com", Role::Patient);
        let other = seed_user(&state, "Bob", "bob@example.com", Role::Patient);
        let cookie = cookie_for(&state, patient, "Anna", "anna@example.com", Role::Patient);

        let id = {
            let mut conn = state.db().unwrap();
            prescription::create_prescription(
                &mut conn,
                &crate::models::prescription::NewPrescription {
                    patient_id: patient,
                    doctor_id: doctor,
                    diagnosis: None,
                    notes: Some("Uploaded file: scan.jpg".into()),
                    status: crate::models::enums::PrescriptionStatus::Pending,
                    file_path: Some("stored.jpg".into()),
                    medications: vec![],
                },
            )
            .unwrap()
        };

        let response = build_router(state.clone())
            .oneshot(send_json(
                "PUT",
                &format!("/api/patient/prescriptions/{id}"),
                Some(&cookie),
                serde_json::json!({ "diagnosis": "Migraine", "notes": "since Tuesday" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        {
            let conn = state.db().unwrap();
            let rx = prescription::get_prescription(&conn, id).unwrap().unwrap();
            assert_eq!(rx.diagnosis.as_deref(), Some("Migraine"));
            assert_eq!(rx.notes.as_deref(), Some("since Tuesday"));
        }

        // Not the owner
        let other_cookie = cookie_for(&state, other, "Bob", "bob@example.com", Role::Patient);
        let response = build_router(state.clone())
            .oneshot(send_json(
                "PUT",
                &format!("/api/patient/prescriptions/{id}"),
                Some(&other_cookie),
                serde_json::json!({ "diagnosis": "hijack" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // No longer pending
        {
            let conn = state.db().unwrap();
            prescription::set_status(&conn, id, crate::models::enums::PrescriptionStatus::Active)
                .unwrap();
        }
        let response = build_router(state)
            .oneshot(send_json(
                "PUT",
                &format!("/api/patient/prescriptions/{id}"),
                Some(&cookie),
                serde_json::json!({ "diagnosis": "too late" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_adds_drug_doctor_sees_it() {
        let (state, _mailer, _tmp) = test_state();
        let admin = seed_user(&state, "Root", "root@example.com", Role::Admin);
        let doctor = seed_user(&state, "Dr Gray", "gray@example.com", Role::Doctor);
        let admin_cookie = cookie_for(&state, admin, "Root", "root@example.com", Role::Admin);
        let doctor_cookie = cookie_for(&state, doctor, "Dr Gray", "gray@example.com", Role::Doctor);

        let response = build_router(state.clone())
            .oneshot(send_json(
                "POST",
                "/api/admin/drugs",
                Some(&admin_cookie),
                serde_json::json!({ "name": "  " }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = build_router(state.clone())
            .oneshot(send_json(
                "POST",
                "/api/admin/drugs",
                Some(&admin_cookie),
                serde_json::json!({ "name": "Amoxil", "generic_name": "amoxicillin" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = build_router(state)
            .oneshot(get("/api/doctor/drugs", Some(&doctor_cookie)))
            .await
            .unwrap();
        let json = body_json(response).await;
        let drugs = json.as_array().unwrap();
        assert_eq!(drugs.len(), 1);
        assert_eq!(drugs[0]["name"], "Amoxil");
        assert_eq!(drugs[0]["generic_name"], "amoxicillin");
    }

    #[tokio::test]
    async fn role_dashboards_report_own_counts() {
        let (state, _mailer, _tmp) = test_state();
        let doctor = seed_user(&state, "Dr Gray", "gray@example.com", Role::Doctor);
        let patient = seed_user(&state, "Anna", "anna@example.com", Role::Patient);
        let doctor_cookie = cookie_for(&state, doctor, "Dr Gray", "gray@example.com", Role::Doctor);
        let patient_cookie = cookie_for(&state, patient, "Anna", "anna@example.com", Role::Patient);

        {
            let mut conn = state.db().unwrap();
            for status in [
                crate::models::enums::PrescriptionStatus::Active,
                crate::models::enums::PrescriptionStatus::Pending,
            ] {
                prescription::create_prescription(
                    &mut conn,
                    &crate::models::prescription::NewPrescription {
                        patient_id: patient,
                        doctor_id: doctor,
                        diagnosis: Some("Flu".into()),
                        notes: None,
                        status,
                        file_path: None,
                        medications: vec![],
                    },
                )
                .unwrap();
            }
            notification::create_notification(
                &conn,
                patient,
                "hello",
                NotificationKind::Info,
            )
            .unwrap();
        }

        let response = build_router(state.clone())
            .oneshot(get("/api/doctor/dashboard", Some(&doctor_cookie)))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["prescriptions_total"], 2);
        assert_eq!(json["prescriptions_pending"], 1);
        assert_eq!(json["prescriptions_active"], 1);
        assert_eq!(json["patients_assigned"], 1);

        let response = build_router(state)
            .oneshot(get("/api/patient/dashboard", Some(&patient_cookie)))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["prescriptions_total"], 2);
        assert_eq!(json["unread_notifications"], 1);
        assert_eq!(json["doctor_id"].as_i64().unwrap(), doctor);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let (state, _mailer, _tmp) = test_state();
        let response = build_router(state)
            .oneshot(get("/api/nonexistent", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
