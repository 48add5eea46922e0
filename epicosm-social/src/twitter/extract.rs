//! Small transforms over raw v2 items before they are stored.
use serde_json::Value;

/// Stamp every follow edge with the seed that owns it.
pub fn tag_follower(items: &mut [Value], follower_id: u64) {
    for item in items.iter_mut() {
        if let Value::Object(map) = item {
            map.insert("follower_id".into(), Value::from(follower_id));
        }
    }
}

/// Append each post's `text` to `out` in page order, with no separator.
/// Items without a string `text` are skipped. Returns how many were appended.
pub fn append_texts(items: &[Value], out: &mut String) -> usize {
    let mut appended = 0;
    for item in items {
        match item.get("text").and_then(Value::as_str) {
            Some(text) => {
                out.push_str(text);
                appended += 1;
            }
            None => {
                let id = item.get("id").and_then(Value::as_str).unwrap_or("-");
                tracing::debug!(id, "extract.no_text");
            }
        }
    }
    appended
}

/// Whitespace-delimited token count.
pub fn approx_word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// The `id` of a v2 item, whether the API sent it as a string or a number.
pub fn item_id(item: &Value) -> Option<String> {
    match item.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
