#[cfg(test)]
#[path = "participant_test.rs"]
mod tests;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::HashMap, fmt::Display};

use crate::config::constants::USER_ID_PREFIX_LEN;

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CharacterRef {
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssistantRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Participant as returned by the backend. Exactly one of the acting
/// foreign keys is expected to be populated.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRecord {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user: Option<UserRef>,
    #[serde(default)]
    pub acting_character_id: Option<String>,
    #[serde(default)]
    pub acting_character: Option<CharacterRef>,
    #[serde(default)]
    pub acting_assistant_id: Option<String>,
    #[serde(default)]
    pub acting_assistant: Option<AssistantRef>,
    #[serde(default)]
    pub representing_character_id: Option<String>,
    #[serde(default)]
    pub representing_character: Option<CharacterRef>,
    #[serde(default)]
    pub config_override: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorType {
    User,
    Character,
    Assistant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Actor {
    User(UserRef),
    Character(CharacterRef),
    Assistant(AssistantRef),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigOverride {
    Text(String),
    Json(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    id: String,
    actor: Actor,
    representing_character_id: Option<String>,
    representing: Option<CharacterRef>,
    config_override: Option<ConfigOverride>,
}

/// Display view of a participant. Recomputed from the conversation, never
/// stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedParticipant {
    pub participant_id: String,
    pub actor_id: String,
    pub actor_type: ActorType,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub representing_character_id: Option<String>,
    pub config_override: Option<ConfigOverride>,
}

/// Resolves senders by participant id or by actor id. Stored messages
/// reference the actor while live state may carry the participant.
#[derive(Debug, Default, Clone)]
pub struct ParticipantDirectory {
    participants: Vec<ProcessedParticipant>,
    index: HashMap<String, usize>,
}

impl Participant {
    /// Converts a backend record, or returns None when the record does not
    /// match a user, character or assistant shape.
    pub fn from_record(record: ParticipantRecord) -> Option<Self> {
        let ParticipantRecord {
            id,
            user_id,
            user,
            acting_character_id,
            acting_character,
            acting_assistant_id,
            acting_assistant,
            representing_character_id,
            representing_character,
            config_override,
        } = record;

        let actor = match (user_id, user, acting_character_id, acting_character) {
            (Some(_), Some(user), _, _) => Actor::User(user),
            (_, _, Some(_), Some(character)) => Actor::Character(character),
            _ => match (acting_assistant_id, acting_assistant) {
                (Some(_), Some(assistant)) => Actor::Assistant(assistant),
                _ => return None,
            },
        };

        Some(Self {
            id,
            actor,
            representing_character_id,
            representing: representing_character,
            config_override: config_override.map(ConfigOverride::parse),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn representing(&self) -> Option<&CharacterRef> {
        self.representing.as_ref()
    }

    pub fn config_override(&self) -> Option<&ConfigOverride> {
        self.config_override.as_ref()
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self.actor, Actor::Assistant(_))
    }
}

impl Actor {
    pub fn id(&self) -> &str {
        match self {
            Actor::User(u) => &u.id,
            Actor::Character(c) => &c.id,
            Actor::Assistant(a) => &a.id,
        }
    }

    pub fn actor_type(&self) -> ActorType {
        match self {
            Actor::User(_) => ActorType::User,
            Actor::Character(_) => ActorType::Character,
            Actor::Assistant(_) => ActorType::Assistant,
        }
    }
}

impl CharacterRef {
    pub fn full_name(&self) -> String {
        match self.last_name.as_deref() {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last)
                .trim()
                .to_string(),
            _ => self.first_name.trim().to_string(),
        }
    }
}

impl ConfigOverride {
    /// Free text unless the value parses as a JSON object.
    pub fn parse(raw: String) -> Self {
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) if value.is_object() => ConfigOverride::Json(value),
            _ => ConfigOverride::Text(raw),
        }
    }
}

impl From<&Participant> for ProcessedParticipant {
    fn from(participant: &Participant) -> Self {
        let representing = participant.representing.as_ref();
        let (display_name, own_avatar) = match &participant.actor {
            Actor::User(user) => {
                let name = match user.display_name.as_deref() {
                    Some(name) if !name.trim().is_empty() => name.to_string(),
                    _ => format!(
                        "User {}",
                        user.id.chars().take(USER_ID_PREFIX_LEN).collect::<String>()
                    ),
                };
                (name, user.avatar_url.clone())
            }
            Actor::Character(character) => (character.full_name(), character.avatar_url.clone()),
            Actor::Assistant(assistant) => {
                let name = match representing {
                    Some(persona) if !persona.first_name.is_empty() => persona.first_name.clone(),
                    _ => assistant.name.clone(),
                };
                (name, assistant.avatar_url.clone())
            }
        };

        Self {
            participant_id: participant.id.clone(),
            actor_id: participant.actor.id().to_string(),
            actor_type: participant.actor.actor_type(),
            display_name,
            avatar_url: representing
                .and_then(|c| c.avatar_url.clone())
                .or(own_avatar),
            representing_character_id: participant.representing_character_id.clone(),
            config_override: participant.config_override.clone(),
        }
    }
}

impl ParticipantDirectory {
    pub fn new(participants: Vec<ProcessedParticipant>) -> Self {
        let mut index = HashMap::new();
        // Participant ids win over actor ids when they collide.
        for (i, p) in participants.iter().enumerate() {
            index.entry(p.actor_id.clone()).or_insert(i);
        }
        for (i, p) in participants.iter().enumerate() {
            index.insert(p.participant_id.clone(), i);
        }
        Self {
            participants,
            index,
        }
    }

    pub fn from_participants(participants: &[Participant]) -> Self {
        Self::new(participants.iter().map(ProcessedParticipant::from).collect())
    }

    pub fn lookup(&self, id: &str) -> Option<&ProcessedParticipant> {
        self.index.get(id).map(|&i| &self.participants[i])
    }

    pub fn display_name(&self, id: &str) -> Option<&str> {
        self.lookup(id).map(|p| p.display_name.as_str())
    }

    pub fn participants(&self) -> &[ProcessedParticipant] {
        &self.participants
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

impl Display for ActorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActorType::User => write!(f, "USER"),
            ActorType::Character => write!(f, "CHARACTER"),
            ActorType::Assistant => write!(f, "ASSISTANT"),
        }
    }
}
