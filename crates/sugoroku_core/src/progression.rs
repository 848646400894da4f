//! crates/sugoroku_core/src/progression.rs
//!
//! The board progression rule: one square forward for a correct answer, one
//! square back for a wrong one, never leaving the board.

use crate::domain::BoardPosition;

/// The result of applying one answer to a board position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub next: BoardPosition,
    pub finished: bool,
}

/// Computes the next board position for an answer.
pub fn advance(current: BoardPosition, is_correct: bool) -> Step {
    let raw = current.value() as i64;
    let next = if is_correct {
        BoardPosition::clamped(raw + 1)
    } else {
        BoardPosition::clamped(raw - 1)
    };
    Step {
        next,
        finished: next.is_goal(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_positions() -> impl Iterator<Item = BoardPosition> {
        (0..=10).map(BoardPosition::clamped)
    }

    #[test]
    fn correct_answer_moves_forward_by_one_up_to_goal() {
        for p in all_positions() {
            let step = advance(p, true);
            let expected = (p.value() + 1).min(10);
            assert_eq!(step.next.value(), expected, "from {}", p.value());
        }
    }

    #[test]
    fn wrong_answer_moves_back_by_one_down_to_start() {
        for p in all_positions() {
            let step = advance(p, false);
            let expected = p.value().saturating_sub(1);
            assert_eq!(step.next.value(), expected, "from {}", p.value());
        }
    }

    #[test]
    fn finished_iff_next_is_goal() {
        for p in all_positions() {
            for correct in [true, false] {
                let step = advance(p, correct);
                assert_eq!(step.finished, step.next.value() == 10);
            }
        }
    }

    #[test]
    fn edges_are_clamped() {
        assert_eq!(advance(BoardPosition::GOAL, true).next, BoardPosition::GOAL);
        assert!(advance(BoardPosition::GOAL, true).finished);
        assert_eq!(advance(BoardPosition::START, false).next, BoardPosition::START);
    }

    #[test]
    fn nine_to_goal_and_back() {
        let nine = BoardPosition::clamped(9);
        let up = advance(nine, true);
        assert_eq!(up.next.value(), 10);
        assert!(up.finished);

        let down = advance(nine, false);
        assert_eq!(down.next.value(), 8);
        assert!(!down.finished);
    }

    #[test]
    fn out_of_range_input_is_clamped_first() {
        assert_eq!(advance(BoardPosition::clamped(57), false).next.value(), 9);
        assert_eq!(advance(BoardPosition::clamped(-4), true).next.value(), 1);
    }
}
