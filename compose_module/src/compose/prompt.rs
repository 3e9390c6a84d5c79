const INSTRUCTIONS: &str = "You write posts for a Discord server. Reply with the message text only: \
no preamble, no surrounding quotes, at most 1500 characters. Discord markdown and a few emoji are fine.";

const IMAGE_ONLY_REQUEST: &str = "Write an engaging post to accompany the attached image.";

pub(super) fn build_prompt(user_prompt: Option<&str>, has_image: bool) -> String {
    match (user_prompt, has_image) {
        (Some(request), true) => format!(
            "{INSTRUCTIONS}\n\nRequest: {request}\n\nUse the attached image as context."
        ),
        (Some(request), false) => format!("{INSTRUCTIONS}\n\nRequest: {request}"),
        (None, _) => format!("{INSTRUCTIONS}\n\nRequest: {IMAGE_ONLY_REQUEST}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_mentions_image_only_when_attached() {
        let with_image = build_prompt(Some("Happy birthday to Sam"), true);
        assert!(with_image.contains("Happy birthday to Sam"));
        assert!(with_image.contains("attached image"));

        let text_only = build_prompt(Some("Weekly reminder"), false);
        assert!(!text_only.contains("attached image"));

        assert!(build_prompt(None, true).contains(IMAGE_ONLY_REQUEST));
    }
}
