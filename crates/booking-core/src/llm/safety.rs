const REDACTED_UNTRUSTED_TEXT: &str = "[redacted untrusted instruction]";

/// Collapses whitespace in user-supplied text.
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapses whitespace and replaces text that reads like an attempt to
/// steer the model with a fixed marker.
pub fn sanitize_untrusted_text(value: &str) -> String {
    let compact = collapse_whitespace(value);
    if compact.is_empty() {
        return compact;
    }

    if looks_like_prompt_injection(&compact) {
        return REDACTED_UNTRUSTED_TEXT.to_string();
    }

    compact
}

pub fn is_redacted(value: &str) -> bool {
    value == REDACTED_UNTRUSTED_TEXT
}

fn looks_like_prompt_injection(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();

    let ignore_or_override_instruction =
        (lower.contains("ignore") || lower.contains("disregard") || lower.contains("override"))
            && (lower.contains("instruction")
                || lower.contains("system prompt")
                || lower.contains("developer message"));
    let role_takeover = lower.contains("you are now") || lower.contains("act as");
    let secret_exfiltration = (lower.contains("api key")
        || lower.contains("password")
        || lower.contains("secret")
        || lower.contains("token"))
        && (lower.contains("reveal")
            || lower.contains("exfiltrate")
            || lower.contains("send me")
            || lower.contains("dump"));
    let execution_override = lower.contains("function call")
        || lower.contains("tool call")
        || lower.contains("print the prompt")
        || lower.contains("return raw json");
    let price_override = lower.contains("set the total") || lower.contains("make it free");

    ignore_or_override_instruction
        || role_takeover
        || secret_exfiltration
        || execution_override
        || price_override
}
