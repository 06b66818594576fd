pub mod admin;
pub mod auth;
pub mod doctor;
pub mod notifications;
pub mod patient;
