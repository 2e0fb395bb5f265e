/// Ready-to-copy prompt for drafting a reply to `comment_text`.
pub fn reply_prompt(comment_text: &str) -> String {
    let context = if comment_text.trim().is_empty() {
        "No comment text available"
    } else {
        comment_text.trim()
    };
    format!(
        "Act as \"GPT Pro Malaysia\" answering Facebook comment.\n\
         Context: \"{}\"\n\
         Output concise, friendly BM/BI mix reply (2-5 sentences).",
        context
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeds_comment_text() {
        let prompt = reply_prompt("  Berapa harga?  ");
        assert!(prompt.contains("Context: \"Berapa harga?\""));
        assert!(prompt.starts_with("Act as"));
    }

    #[test]
    fn placeholder_for_missing_text() {
        assert!(reply_prompt("").contains("No comment text available"));
    }
}
