use serde_json::Value;

/// Normalizes a raw tool response into its inner JSON payload.
///
/// Text-encoded JSON is parsed; text that is not JSON is kept as a string. A
/// `{content: [{type: "text", text}]}` envelope yields its first text item,
/// and an envelope flagged `isError` becomes `Err` with that text.
pub fn unwrap_payload(raw: Value) -> Result<Value, String> {
    match raw {
        Value::String(text) => Ok(parse_text(text)),
        Value::Object(ref object) if object.get("content").is_some_and(Value::is_array) => {
            let first_text = object
                .get("content")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .find(|item| item.get("type").and_then(Value::as_str) == Some("text"))
                .and_then(|item| item.get("text"))
                .and_then(Value::as_str)
                .map(ToString::to_string);

            if object.get("isError").and_then(Value::as_bool) == Some(true) {
                return Err(first_text.unwrap_or_else(|| "tool reported an error".to_string()));
            }

            Ok(first_text.map(parse_text).unwrap_or(raw))
        }
        other => Ok(other),
    }
}

fn parse_text(text: String) -> Value {
    serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_text_envelope_json() {
        let raw = json!({"content": [
            {"type": "image", "data": "..."},
            {"type": "text", "text": "{\"cart\":{\"id\":\"cart-1\"}}"}
        ]});
        assert_eq!(
            unwrap_payload(raw).expect("envelope should unwrap"),
            json!({"cart": {"id": "cart-1"}})
        );
    }

    #[test]
    fn keeps_non_json_text_as_string() {
        let raw = json!({"content": [{"type": "text", "text": "slot reserved"}]});
        assert_eq!(
            unwrap_payload(raw).expect("envelope should unwrap"),
            json!("slot reserved")
        );
        assert_eq!(
            unwrap_payload(json!("[1,2]")).expect("string should unwrap"),
            json!([1, 2])
        );
    }

    #[test]
    fn error_flag_becomes_err() {
        let raw = json!({"isError": true, "content": [{"type": "text", "text": "cart expired"}]});
        assert_eq!(unwrap_payload(raw), Err("cart expired".to_string()));
    }

    #[test]
    fn direct_values_pass_through() {
        let raw = json!({"locations": [{"id": "loc-1", "name": "Sandbox"}]});
        assert_eq!(unwrap_payload(raw.clone()).expect("object should pass"), raw);
    }
}
