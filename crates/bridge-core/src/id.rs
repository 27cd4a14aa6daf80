use uuid::Uuid;

/// Random 32-character hex identifier used for completion ids
pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}
