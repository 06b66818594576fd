pub mod drug;
pub mod enums;
pub mod filters;
pub mod notification;
pub mod prescription;
pub mod user;

pub use drug::*;
pub use enums::*;
pub use filters::*;
pub use notification::*;
pub use prescription::*;
pub use user::*;
