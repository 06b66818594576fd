//! rxportal — a role-based healthcare portal service.
//!
//! Patients, doctors, pharmacists and admins share one SQLite-backed JSON
//! API: prescriptions with medication line items, patient-doctor
//! assignments, uploads, notifications, and session-cookie auth.

pub mod api;
pub mod app_state;
pub mod auth;
pub mod config;
pub mod db;
pub mod mailer;
pub mod models;
pub mod uploads;
