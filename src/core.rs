use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) fn truncate_message(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }

    let truncated: String = input.chars().take(max_chars).collect();
    format!("{truncated}...")
}

pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_message_short_input_untouched() {
        assert_eq!(truncate_message("hello", 10), "hello");
    }

    #[test]
    fn truncate_message_appends_ellipsis() {
        assert_eq!(truncate_message("hello world", 5), "hello...");
    }
}
