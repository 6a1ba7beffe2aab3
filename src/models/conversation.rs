#[cfg(test)]
#[path = "conversation_test.rs"]
mod tests;

use eyre::{Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::lenient::skip_invalid;
use super::participant::{Participant, ParticipantDirectory, ParticipantRecord};

#[derive(Deserialize, Debug, Clone)]
#[serde(from = "ConversationRecord")]
pub struct Conversation {
    id: String,
    title: Option<String>,
    participants: Vec<Participant>,
    settings: ConversationSettings,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct ConversationRecord {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default, deserialize_with = "skip_invalid")]
    participants: Vec<ParticipantRecord>,
    #[serde(default)]
    settings: ConversationSettings,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_mode: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_length: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_nsfw: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roleplay: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,

    /// Fields this client does not know about, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<ConversationRecord> for Conversation {
    fn from(record: ConversationRecord) -> Self {
        let participants = record
            .participants
            .into_iter()
            .filter_map(|p| {
                let id = p.id.clone();
                let participant = Participant::from_record(p);
                if participant.is_none() {
                    log::warn!(
                        "Dropping participant {} of conversation {}: no known actor",
                        id,
                        record.id
                    );
                }
                participant
            })
            .collect();

        Self {
            id: record.id,
            title: record.title,
            participants,
            settings: record.settings,
        }
    }
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            participants: vec![],
            settings: ConversationSettings::default(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_participants(mut self, participants: Vec<Participant>) -> Self {
        self.participants = participants;
        self
    }

    pub fn with_settings(mut self, settings: ConversationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn settings(&self) -> &ConversationSettings {
        &self.settings
    }

    pub fn directory(&self) -> ParticipantDirectory {
        ParticipantDirectory::from_participants(&self.participants)
    }

    /// First assistant participant, used as the default responder.
    pub fn assistant(&self) -> Option<&Participant> {
        self.participants.iter().find(|p| p.is_assistant())
    }
}

impl ConversationSettings {
    /// Sets a field from its wire name. Unknown keys go to `extra` as
    /// strings.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "interactionMode" | "interaction_mode" => {
                self.interaction_mode = Some(value.to_string())
            }
            "responseLength" | "response_length" => self.response_length = Some(value.to_string()),
            "allowNsfw" | "allow_nsfw" | "nsfw" => self.allow_nsfw = Some(parse_bool(key, value)?),
            "roleplay" => self.roleplay = Some(parse_bool(key, value)?),
            "background" => self.background = Some(value.to_string()),
            "" => bail!("empty setting key"),
            _ => {
                self.extra
                    .insert(key.to_string(), Value::String(value.to_string()));
            }
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => bail!("{} expects a boolean, got {}", key, value),
    }
}
