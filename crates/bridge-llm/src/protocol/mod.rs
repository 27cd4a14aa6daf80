//! Wire format types for the inbound and backend APIs

pub mod google;
pub mod openai;
