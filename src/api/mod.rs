pub mod attachment;
pub mod document;
pub mod leave_request;
pub mod stats;
