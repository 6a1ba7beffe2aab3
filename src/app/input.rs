#[cfg(test)]
#[path = "input_test.rs"]
mod tests;

use eyre::{Result, bail};

/// A line typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Empty,
    Send(String),
    Delete(String),           // Message ID
    Generate(Option<String>), // Participant ID, defaults to the first assistant
    AddParticipant(String),   // Acting character ID
    RemoveParticipant(String),
    Set(String, String),
    Who,
    Errors,
    Help,
    Quit,
}

pub const HELP: &str = r#"Commands:
  <text>                 send a message
  /delete <message-id>   delete a message
  /ai [participant-id]   ask an assistant to respond
  /add <character-id>    add a character to the conversation
  /remove <participant>  remove a participant
  /set <key>=<value>     update a conversation setting
  /who                   list participants
  /errors                show recent errors
  /help                  show this help
  /quit                  leave"#;

pub fn parse_input(line: &str) -> Result<Input> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Ok(Input::Empty);
    }

    // `//text` sends a message that starts with a slash.
    if let Some(text) = line.strip_prefix("//") {
        return Ok(Input::Send(format!("/{}", text)));
    }

    let Some(command) = line.strip_prefix('/') else {
        return Ok(Input::Send(line.to_string()));
    };

    let mut parts = command.trim().splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());

    let input = match (name, arg) {
        ("delete" | "del", Some(id)) => Input::Delete(id.to_string()),
        ("ai" | "generate", id) => Input::Generate(id.map(str::to_string)),
        ("add", Some(id)) => Input::AddParticipant(id.to_string()),
        ("remove" | "rm", Some(id)) => Input::RemoveParticipant(id.to_string()),
        ("set", Some(arg)) => {
            let Some((key, value)) = arg.split_once('=') else {
                bail!("usage: /set <key>=<value>");
            };
            Input::Set(key.trim().to_string(), value.trim().to_string())
        }
        ("who", None) => Input::Who,
        ("errors", None) => Input::Errors,
        ("help" | "?", None) => Input::Help,
        ("quit" | "exit" | "q", None) => Input::Quit,
        ("delete" | "del" | "add" | "remove" | "rm" | "set", None) => {
            bail!("/{} needs an argument", name)
        }
        _ => bail!("unknown command /{}, try /help", name),
    };
    Ok(input)
}
