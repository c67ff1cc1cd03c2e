pub mod admin;
pub mod dispatch;
pub mod fare;
pub mod hub;
pub mod lifecycle;
pub mod location;
pub mod presence;
pub mod session;
