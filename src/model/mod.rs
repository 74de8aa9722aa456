pub mod attendance;
pub mod role;
pub mod shift_policy;
pub mod user;
