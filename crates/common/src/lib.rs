pub mod types;
pub mod utils;
pub mod env;
pub mod metrics;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_type_ok() {
        let h = types::Health { status: "ok" };
        assert_eq!(h.status, "ok");
    }

    #[test]
    fn message_body_serializes_as_object() {
        let body = serde_json::to_value(types::MessageBody::new("Logged out successfully")).unwrap();
        assert_eq!(body, serde_json::json!({"message": "Logged out successfully"}));
    }
}
