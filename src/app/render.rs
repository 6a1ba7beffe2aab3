#[cfg(test)]
#[path = "render_test.rs"]
mod tests;

use crate::models::{
    Message, MessageContent, ParticipantDirectory, ProcessedParticipant, SenderType, UiError,
};

pub fn format_message(message: &Message, directory: &ParticipantDirectory) -> String {
    let sender = match message.sender_type() {
        SenderType::System => "system".to_string(),
        sender_type => directory
            .display_name(message.sender_id())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} {}", sender_type, short_id(message.sender_id()))),
    };

    let body = match message.classify() {
        MessageContent::Text(text) => text.to_string(),
        MessageContent::Control { kind, .. } => format!("<{}>", kind),
    };

    format!(
        "[{}] {}: {}  ({})",
        message.timestamp().format("%H:%M"),
        sender,
        body,
        message.id()
    )
}

pub fn format_participant(participant: &ProcessedParticipant) -> String {
    let mut line = format!(
        "{} [{}] {} ({})",
        participant.participant_id,
        participant.actor_type,
        participant.display_name,
        participant.actor_id
    );
    if let Some(id) = participant.representing_character_id.as_deref() {
        line.push_str(&format!(" as {}", id));
    }
    line
}

pub fn format_error(err: &UiError) -> String {
    format!("[{}] {}", err.timestamp().format("%H:%M:%S"), err)
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}
