const BOOKING_VERBS: [&str; 7] = [
    "book",
    "booking",
    "appointment",
    "schedule",
    "reserve",
    "reservation",
    "make an appointment",
];

const AFFIRMATIONS: [&str; 12] = [
    "yes",
    "y",
    "yeah",
    "yep",
    "sure",
    "ok",
    "okay",
    "confirm",
    "correct",
    "looks good",
    "sounds good",
    "go ahead",
];

const DECLINES: [&str; 6] = ["no", "n", "nope", "cancel", "never mind", "nevermind"];

const NO_PREFERENCE: [&str; 7] = [
    "no preference",
    "any",
    "anyone",
    "anybody",
    "whoever",
    "doesn t matter",
    "don t care",
];

const HINT_FILLER: [&str; 19] = [
    "i", "id", "d", "want", "would", "like", "to", "a", "an", "the", "please", "can", "could",
    "me", "for", "get", "book", "booking", "appointment",
];

/// Lowercases, turns punctuation into spaces and collapses whitespace.
pub fn normalize(message: &str) -> String {
    message
        .to_ascii_lowercase()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch.is_ascii_whitespace() {
                ch
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn is_reset(message: &str) -> bool {
    matches!(
        normalize(message).as_str(),
        "hi" | "hello" | "hey" | "start over" | "restart" | "reset" | "new booking"
    )
}

pub fn is_affirmation(message: &str) -> bool {
    let normalized = normalize(message);
    AFFIRMATIONS.contains(&normalized.as_str())
        || AFFIRMATIONS
            .iter()
            .filter(|phrase| phrase.len() > 2)
            .any(|phrase| starts_with_phrase(&normalized, phrase))
}

pub fn is_decline(message: &str) -> bool {
    let normalized = normalize(message);
    DECLINES.contains(&normalized.as_str())
        || DECLINES
            .iter()
            .filter(|phrase| phrase.len() > 1)
            .any(|phrase| starts_with_phrase(&normalized, phrase))
}

pub fn is_no_preference(message: &str) -> bool {
    let normalized = normalize(message);
    NO_PREFERENCE
        .iter()
        .any(|phrase| contains_phrase(&normalized, phrase))
}

pub fn is_booking_request(message: &str) -> bool {
    let normalized = normalize(message);
    BOOKING_VERBS
        .iter()
        .any(|verb| contains_phrase(&normalized, verb))
}

/// What the user asked to book, with booking verbs and filler removed.
/// "I'd like to book a facial" gives "facial".
pub fn service_hint(message: &str) -> Option<String> {
    let hint = normalize(message)
        .split_whitespace()
        .filter(|word| !HINT_FILLER.contains(word))
        .collect::<Vec<_>>()
        .join(" ");

    if hint.is_empty() { None } else { Some(hint) }
}

fn starts_with_phrase(normalized: &str, phrase: &str) -> bool {
    normalized == phrase || normalized.starts_with(&format!("{phrase} "))
}

fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    format!(" {normalized} ").contains(&format!(" {phrase} "))
}
