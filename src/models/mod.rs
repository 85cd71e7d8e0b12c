pub mod actor;
pub mod driver;
pub mod ride;
