pub mod biomarker;
pub mod event;
pub mod intervention;
pub mod message;
