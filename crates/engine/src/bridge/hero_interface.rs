use tracing::debug;

use crate::level::{Direction, HeroError, InteractOutcome, InteractReport, Level, ObjectKind};

use super::protocol::{CommandResponse, HeroCommand};

pub const NO_LEVEL_MESSAGE: &str = "Error: No level loaded.";

/// Runs one hero command against the current level.
///
/// Rejections (blocked, still moving, nothing to interact with) answer
/// `success = true, result = false` with the reason as message; only a
/// missing level is a failure.
pub fn apply_hero_command(level: Option<&mut Level>, command: &HeroCommand) -> CommandResponse {
    let Some(level) = level else {
        return CommandResponse::failure(NO_LEVEL_MESSAGE, String::new());
    };
    let response = match command {
        HeroCommand::Move => action(level.move_hero_forward(), |to| {
            format!("The hero walks to ({}, {}).", to.x, to.y)
        }),
        HeroCommand::TurnLeft => action(level.turn_hero_left(), |facing| {
            format!("The hero now faces {facing}.")
        }),
        HeroCommand::Interact => action(level.hero_interact(), describe_interaction),
        HeroCommand::Configure { name, type_number } => {
            action(level.configure_hero(name, *type_number), |()| {
                format!("The hero is now {name}.")
            })
        }
        HeroCommand::IsMoving => query(level.is_hero_moving()),
        HeroCommand::IsFacingNorth => query(level.is_hero_facing(Direction::North)),
        HeroCommand::IsAtGoal => query(level.is_hero_at_goal()),
        HeroCommand::IsCollisionInFront => query(level.is_collision_in_front()),
        HeroCommand::IsSwitchInFront => query(level.is_object_in_front(ObjectKind::TwoWaySwitch)),
        HeroCommand::IsTorchInFront => query(level.is_object_in_front(ObjectKind::Torch)),
    };
    if !response.result {
        debug!(command = command.name(), message = %response.message, "hero_command_rejected");
    }
    response
}

fn action<T>(outcome: Result<T, HeroError>, describe: impl FnOnce(T) -> String) -> CommandResponse {
    match outcome {
        Ok(value) => CommandResponse::ok_with_message(true, describe(value)),
        Err(err) => CommandResponse::rejected(err.to_string()),
    }
}

fn query(outcome: Result<bool, HeroError>) -> CommandResponse {
    match outcome {
        Ok(value) => CommandResponse::ok(value),
        Err(err) => CommandResponse::rejected(err.to_string()),
    }
}

fn describe_interaction(report: InteractReport) -> String {
    let mut message = match report.outcome {
        InteractOutcome::Changed { to, .. } => format!("The {} is now {}.", report.kind, to.name()),
        InteractOutcome::Unchanged(state) => {
            format!("The {} stays {}.", report.kind, state.name())
        }
        InteractOutcome::NotInteractive => format!("The {} does not react.", report.kind),
    };
    for (id, outcome) in &report.forwarded {
        if let InteractOutcome::Changed { to, .. } = outcome {
            message.push_str(&format!(" Object {id} is now {}.", to.name()));
        }
    }
    message
}
