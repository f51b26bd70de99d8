fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use aecaxis_protocol::messages::Urgency;
    use aecaxis_protocol::{
        ClientMessage, EventKind, FileDescriptor, IfcFileStatus, InboundEvent, ServerMessage,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Normalizes JSON values so that integer-valued floats compare equal.
    ///
    /// The backend serializes whole numbers without a fraction (`2`), Rust
    /// serializes `f64` as `2.0`.
    fn normalize_value(v: &serde_json::Value) -> serde_json::Value {
        match v {
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => serde_json::json!(f),
                None => v.clone(),
            },
            serde_json::Value::Object(map) => {
                let normalized: serde_json::Map<String, serde_json::Value> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), normalize_value(v)))
                    .collect();
                serde_json::Value::Object(normalized)
            }
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(normalize_value).collect())
            }
            _ => v.clone(),
        }
    }

    /// Deserializes a fixture, re-serializes it, and compares the JSON values
    /// (order-independent, float-normalized comparison).
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            normalize_value(&fixture),
            normalize_value(&reserialized),
            "roundtrip mismatch for {name}:\n  backend: {fixture}\n  rust:    {reserialized}"
        );
        parsed
    }

    fn event(name: &str) -> InboundEvent {
        InboundEvent::now(roundtrip_test::<ServerMessage>(name))
    }

    // --- Subscription acks ---

    #[test]
    fn fixture_subscribed() {
        let ev = event("subscribed.json");
        assert_eq!(ev.kind, EventKind::SubscriptionAck);
        assert_eq!(ev.subject_id, "3f1e9c2a-7b44-4c1e-9a57-0d6f1b2c8e11");
    }

    #[test]
    fn fixture_subscribed_rfq() {
        let ev = event("subscribed_rfq.json");
        assert_eq!(ev.kind, EventKind::SubscriptionAck);
        assert_eq!(ev.subject_id, "rfq-2024-0042");
    }

    // --- Project channel ---

    #[test]
    fn fixture_ifc_status_update() {
        let ev = event("ifc_status_update.json");
        assert_eq!(ev.kind, EventKind::FileStatusUpdate);
        assert_eq!(ev.subject_id, "a9d2f7c0-51b3-4f0e-8c1d-6e2b9f4a7d30");
        let ServerMessage::IfcStatusUpdate(update) = ev.payload else {
            panic!("expected a status update");
        };
        assert_eq!(update.status, IfcFileStatus::Processing);
        assert_eq!(update.filename.as_deref(), Some("tower_block_b.ifc"));
    }

    // --- RFQ channel ---

    #[test]
    fn fixture_quote_received() {
        let ev = event("quote_received.json");
        assert_eq!(ev.kind, EventKind::Quote);
        assert_eq!(ev.subject_id, "rfq-2024-0042");
    }

    #[test]
    fn fixture_price_update() {
        let ev = event("price_update.json");
        assert_eq!(ev.kind, EventKind::PriceUpdate);
        assert_eq!(ev.subject_id, "mat-steel-beam");
        let ServerMessage::PriceUpdate(update) = ev.payload else {
            panic!("expected a price update");
        };
        assert_eq!(update.data.new_price, Some(1190.5));
    }

    #[test]
    fn fixture_supplier_presence() {
        for name in ["supplier_online.json", "supplier_offline.json"] {
            let ev = event(name);
            assert_eq!(ev.kind, EventKind::Presence, "{name}");
            assert_eq!(ev.subject_id, "sup-118", "{name}");
        }
    }

    #[test]
    fn fixture_deadline_warning() {
        let ev = event("deadline_warning.json");
        assert_eq!(ev.kind, EventKind::DeadlineWarning);
        let ServerMessage::DeadlineWarning(warning) = ev.payload else {
            panic!("expected a deadline warning");
        };
        assert_eq!(warning.data.urgency_level, Urgency::Critical);
        assert_eq!(
            Urgency::for_hours(warning.data.hours_remaining),
            warning.data.urgency_level
        );
    }

    #[test]
    fn fixture_notification() {
        let ev = event("notification.json");
        assert_eq!(ev.kind, EventKind::Notification);
        let ServerMessage::Notification(n) = ev.payload else {
            panic!("expected a notification");
        };
        assert_eq!(n.data.level.as_deref(), Some("success"));
        assert_eq!(n.data.duration, Some(5000));
    }

    // --- Upload endpoint ---

    #[test]
    fn upload_response_uses_backend_names() {
        let json = load_fixture("upload_response.json");
        let descriptor: FileDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(descriptor.filename, "tower_block_b.ifc");
        assert_eq!(descriptor.file_size, Some(48_213_377));
        assert_eq!(descriptor.upload_date.as_deref(), Some("2024-03-01T10:00:00"));
        assert_eq!(descriptor.status, IfcFileStatus::Pending);
    }

    // --- Outbound ---

    #[test]
    fn client_messages_match_backend_expectations() {
        let sub = serde_json::to_value(ClientMessage::Subscribe {
            project_id: "p-1".into(),
        })
        .unwrap();
        assert_eq!(sub["type"], "subscribe");
        assert_eq!(sub["project_id"], "p-1");

        let sub = serde_json::to_value(ClientMessage::SubscribeRfq {
            rfq_id: "r-1".into(),
        })
        .unwrap();
        assert_eq!(sub["type"], "subscribe_rfq");
        assert_eq!(sub["rfq_id"], "r-1");
    }

    #[test]
    fn unknown_message_type_is_not_an_error() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"bid_closed","rfq_id":"rfq-2024-0042"}"#).unwrap();
        assert_eq!(msg, ServerMessage::Unknown);
    }
}
