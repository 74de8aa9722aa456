pub mod access;
pub mod admin;
pub mod attendance;
pub mod employee;
