pub mod candidate;
pub mod entity;
pub mod session;
