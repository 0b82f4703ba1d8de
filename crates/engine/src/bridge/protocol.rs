use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::level::LevelDescription;

pub const COMMAND_NOT_FOUND_MESSAGE: &str = "Error: Command not found.";

/// One inbound message: `{command, data, requestId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(default)]
    pub data: JsonValue,
    #[serde(
        rename = "requestId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub request_id: Option<String>,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            data: JsonValue::Null,
            request_id: None,
        }
    }

    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = data;
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// One outbound message, echoing the request's `requestId`.
///
/// `success` reports whether the command was understood and ran; `result`
/// carries the command's own answer (a query's value, or whether an action
/// took effect).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub exception: String,
    #[serde(default)]
    pub result: bool,
    #[serde(rename = "requestId", default)]
    pub request_id: String,
}

impl CommandResponse {
    pub fn ok(result: bool) -> Self {
        Self {
            success: true,
            message: String::new(),
            exception: String::new(),
            result,
            request_id: String::new(),
        }
    }

    pub fn ok_with_message(result: bool, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::ok(result)
        }
    }

    /// Understood and executed, but the action did not take effect.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::ok_with_message(false, message)
    }

    pub fn failure(message: impl Into<String>, exception: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            exception: exception.into(),
            result: false,
            request_id: String::new(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

/// Commands answered against the hero of the current level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeroCommand {
    Move,
    TurnLeft,
    Interact,
    Configure { name: String, type_number: u32 },
    IsMoving,
    IsFacingNorth,
    IsAtGoal,
    IsCollisionInFront,
    IsSwitchInFront,
    IsTorchInFront,
}

impl HeroCommand {
    pub fn name(&self) -> &'static str {
        match self {
            HeroCommand::Move => "move",
            HeroCommand::TurnLeft => "turn_left",
            HeroCommand::Interact => "interact",
            HeroCommand::Configure { .. } => "configure",
            HeroCommand::IsMoving => "is_moving",
            HeroCommand::IsFacingNorth => "is_facing_north",
            HeroCommand::IsAtGoal => "is_at_goal",
            HeroCommand::IsCollisionInFront => "is_collision_in_front",
            HeroCommand::IsSwitchInFront => "is_switch_in_front",
            HeroCommand::IsTorchInFront => "is_torch_in_front",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Command {
    LoadLevel(Box<LevelDescription>),
    ResetLevel,
    Hero(HeroCommand),
}

#[derive(Debug, Deserialize)]
struct ConfigureData {
    name: String,
    #[serde(rename = "typeNumber")]
    type_number: u32,
}

#[derive(Debug, Error)]
pub enum CommandParseError {
    #[error("Error: Command not found.")]
    NotFound(String),
    #[error("Error: Invalid data for {command}.")]
    InvalidData {
        command: &'static str,
        #[source]
        source: serde_path_to_error::Error<serde_json::Error>,
    },
}

impl CommandParseError {
    pub fn into_response(self) -> CommandResponse {
        let exception = match &self {
            CommandParseError::NotFound(name) => format!("unknown command {name:?}"),
            CommandParseError::InvalidData { source, .. } => source.to_string(),
        };
        CommandResponse::failure(self.to_string(), exception)
    }
}

impl Command {
    pub fn parse(name: &str, data: &JsonValue) -> Result<Self, CommandParseError> {
        let hero = match name {
            "load_level" => {
                return LevelDescription::from_value(data.clone())
                    .map(|description| Command::LoadLevel(Box::new(description)))
                    .map_err(|source| CommandParseError::InvalidData {
                        command: "load_level",
                        source,
                    });
            }
            "reset_level" => return Ok(Command::ResetLevel),
            "configure" => {
                let parsed: ConfigureData = serde_path_to_error::deserialize(data).map_err(
                    |source| CommandParseError::InvalidData {
                        command: "configure",
                        source,
                    },
                )?;
                HeroCommand::Configure {
                    name: parsed.name,
                    type_number: parsed.type_number,
                }
            }
            "move" => HeroCommand::Move,
            "turn_left" => HeroCommand::TurnLeft,
            "interact" => HeroCommand::Interact,
            "is_moving" => HeroCommand::IsMoving,
            "is_facing_north" => HeroCommand::IsFacingNorth,
            "is_at_goal" => HeroCommand::IsAtGoal,
            "is_collision_in_front" => HeroCommand::IsCollisionInFront,
            "is_switch_in_front" => HeroCommand::IsSwitchInFront,
            "is_torch_in_front" => HeroCommand::IsTorchInFront,
            other => return Err(CommandParseError::NotFound(other.to_string())),
        };
        Ok(Command::Hero(hero))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::LoadLevel(_) => "load_level",
            Command::ResetLevel => "reset_level",
            Command::Hero(hero) => hero.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_reads_camel_case_request_id() {
        let request: CommandRequest =
            serde_json::from_str(r#"{"command":"move","requestId":"r-7"}"#).expect("parse");
        assert_eq!(request.command, "move");
        assert_eq!(request.data, JsonValue::Null);
        assert_eq!(request.request_id.as_deref(), Some("r-7"));
    }

    #[test]
    fn response_serializes_every_field() {
        let response = CommandResponse::rejected("blocked").with_request_id("r-1");
        let value = serde_json::to_value(&response).expect("serialize");
        assert_eq!(
            value,
            json!({
                "success": true,
                "message": "blocked",
                "exception": "",
                "result": false,
                "requestId": "r-1",
            })
        );
    }

    #[test]
    fn unknown_command_maps_to_not_found() {
        let err = Command::parse("bogus", &JsonValue::Null).expect_err("unknown");
        let response = err.into_response();
        assert!(!response.success);
        assert_eq!(response.message, COMMAND_NOT_FOUND_MESSAGE);
    }

    #[test]
    fn configure_reads_name_and_type_number() {
        let command = Command::parse("configure", &json!({"name": "Alarna", "typeNumber": 2}))
            .expect("configure");
        assert!(matches!(
            command,
            Command::Hero(HeroCommand::Configure { ref name, type_number: 2 }) if name == "Alarna"
        ));
    }

    #[test]
    fn configure_without_type_number_is_invalid_data() {
        let err = Command::parse("configure", &json!({"name": "Alarna"})).expect_err("invalid");
        let response = err.into_response();
        assert!(!response.success);
        assert_eq!(response.message, "Error: Invalid data for configure.");
        assert!(response.exception.contains("typeNumber"));
    }

    #[test]
    fn query_commands_ignore_data() {
        let command = Command::parse("is_torch_in_front", &json!({"extra": 1})).expect("query");
        assert_eq!(command.name(), "is_torch_in_front");
    }
}
