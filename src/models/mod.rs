pub mod caller;
pub mod driver;
pub mod location;
pub mod message;
pub mod ride;
