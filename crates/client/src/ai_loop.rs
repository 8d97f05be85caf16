//! AI auto-play loop.
//!
//! While the computer owns the turn: roll if the dice are empty, then let
//! the server play the whole turn with `ai_play`. The loop ends as soon as
//! the returned owner is not the computer. It never picks or moves checkers
//! itself.

use maxgammon_wire::Transport;

use crate::controller::TurnController;
use crate::error::{ClientError, Result};

/// Play computer turns until a human is on turn or the game ends.
/// Returns the number of turns played.
pub(crate) fn play_out<T: Transport>(controller: &mut TurnController<T>) -> Result<u32> {
    let mut rounds = 0;
    while controller.is_ai_turn() && !controller.is_game_over() {
        if rounds >= controller.config().max_ai_rounds {
            tracing::error!(rounds, "computer still on turn");
            return Err(ClientError::invalid(format!(
                "computer still on turn after {rounds} rounds"
            )));
        }
        rounds += 1;

        if controller.state().dice.is_empty() {
            controller.roll()?;
        }
        controller.ai_play()?;
        controller.check_winner()?;
        tracing::debug!(
            round = rounds,
            current_turn = %controller.state().current_turn,
            "computer turn played"
        );
    }
    Ok(rounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::testing::{connect, finished_except, stage};
    use maxgammon_board::{Color, GameMode};
    use maxgammon_server::{ServerConfig, SessionServer};

    /// Handing the turn to the computer brings it back to the human.
    #[test]
    fn test_computer_turn_returns_to_human() {
        let server = SessionServer::shared(ServerConfig {
            test_mode: true,
            test_rolls: vec![(6, 5)],
            ..Default::default()
        });
        let mut controller =
            TurnController::create(connect(&server), ClientConfig::default(), GameMode::Ai, &["Max"])
                .unwrap();
        let session_id = controller.session_id().unwrap().to_string();
        let layout = controller.state().checkers.clone();

        // stage the computer on turn with no dice; pump settles through the loop
        server
            .borrow_mut()
            .stage_position(&session_id, layout, maxgammon_board::Dice::empty(), "AI")
            .unwrap();
        controller.pump().unwrap();

        assert_eq!(controller.state().current_turn, "Max");
        assert!(controller.state().dice.is_empty());
        assert_ne!(controller.state().checkers, maxgammon_board::CheckerPositions::starting());
    }

    /// A computer bear-off ends the game with the computer on turn.
    #[test]
    fn test_computer_win_stops_loop() {
        let server = SessionServer::shared(ServerConfig {
            test_mode: true,
            test_rolls: vec![(2, 1)],
            ..Default::default()
        });
        let mut controller =
            TurnController::create(connect(&server), ClientConfig::default(), GameMode::Ai, &["Max"])
                .unwrap();
        // light's last checker two pips from home, dark still far away
        stage(&server, &mut controller, finished_except(&[(15, 1), (0, 10)]), &[], "AI");

        assert_eq!(controller.winner(), Some("AI"));
        assert_eq!(controller.state().current_turn, "AI");
        assert_eq!(controller.state().checkers.home_count(Color::Light), 15);
        assert_eq!(play_out(&mut controller).unwrap(), 0);
    }

    /// A zero round budget refuses to play the computer.
    #[test]
    fn test_round_budget() {
        let server = SessionServer::shared(ServerConfig {
            test_mode: true,
            ..Default::default()
        });
        let config = ClientConfig {
            max_ai_rounds: 0,
            ..Default::default()
        };
        let mut controller =
            TurnController::create(connect(&server), config, GameMode::Ai, &["Max"]).unwrap();
        let session_id = controller.session_id().unwrap().to_string();
        server
            .borrow_mut()
            .stage_position(
                &session_id,
                maxgammon_board::CheckerPositions::starting(),
                maxgammon_board::Dice::empty(),
                "AI",
            )
            .unwrap();

        assert!(matches!(
            controller.pump(),
            Err(ClientError::InvalidCommand { .. })
        ));
    }
}
