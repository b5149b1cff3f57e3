pub mod access_window;
pub mod appeal;
pub mod audit_log;
pub mod payment;
pub mod student;
pub mod submission;
