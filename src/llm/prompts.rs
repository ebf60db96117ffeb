//! System prompts for the completion proxy

/// Reply used when the provider returns an empty completion
pub const FALLBACK_REPLY: &str = "I apologize, but I could not generate a response.";

/// Build a system prompt naming the models actually configured
pub fn build_system_prompt(
    chat_model: &str,
    transcription_model: Option<&str>,
    additional_instructions: Option<&str>,
) -> String {
    let mut prompt = String::from(
        "You are a helpful, knowledgeable AI assistant. Answer questions directly and provide detailed, informative responses. Be conversational and friendly.",
    );

    match transcription_model {
        Some(stt) => {
            prompt.push_str(" Keep your answers informative but brief enough to be spoken aloud.");
            prompt.push_str(&format!(
                " When asked about yourself or your capabilities, explain that you are powered by the {chat_model} model with {stt} for audio transcription."
            ));
        }
        None => {
            prompt.push_str(&format!(
                " When asked about yourself or your capabilities, explain that you are powered by the {chat_model} model."
            ));
        }
    }

    if let Some(instructions) = additional_instructions {
        prompt.push_str("\n\n");
        prompt.push_str(instructions);
    }

    prompt
}
