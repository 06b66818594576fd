pub mod assignment;
pub mod drug;
pub mod notification;
pub mod prescription;
pub mod user;
