use crate::utils::openai_chat::{ChatMessage, Role};

const SYSTEM_PROMPT: &str = "You are a helpful assistant that reads the results of non-invasive prenatal test from a young couple to help them with their gender reveal party.";

const OPENING_REQUEST: &str = "Hello, we are having a baby and the results of our NIPT test are in. We haven't looked at the results yet, but we want you to tell us the gender of our baby based on the results we can show you. We only want you to tell us the gender based on the results. Can you help us with that?";

const ASSISTANT_AGREEMENT: &str = "Sure, I can help with that. Please include the results of the NIPT test in text format, and I'll help you determine the gender.  I will only say the word 'male' or 'female' as a response. Nothing else.";

/// The fixed four-turn conversation; only the last turn carries the test results.
pub fn reveal_conversation(context: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::new(Role::System, SYSTEM_PROMPT),
        ChatMessage::new(Role::User, OPENING_REQUEST),
        ChatMessage::new(Role::Assistant, ASSISTANT_AGREEMENT),
        ChatMessage::new(
            Role::User,
            format!(
                "Great, here are the results of our NIPT test: {}. That's all. Please tell us the gender as a single word either 'male' or 'female' and nothing else.",
                context
            ),
        ),
    ]
}
