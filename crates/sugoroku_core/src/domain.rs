//! crates/sugoroku_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A square on the sugoroku board. Always within `[START, GOAL]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BoardPosition(u8);

impl BoardPosition {
    pub const START: BoardPosition = BoardPosition(0);
    pub const GOAL: BoardPosition = BoardPosition(10);

    /// Builds a position from an untrusted integer, clamping it onto the board.
    pub fn clamped(raw: i64) -> Self {
        let clamped = raw.clamp(Self::START.0 as i64, Self::GOAL.0 as i64);
        BoardPosition(clamped as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_goal(self) -> bool {
        self == Self::GOAL
    }
}

impl From<BoardPosition> for i32 {
    fn from(position: BoardPosition) -> Self {
        position.0 as i32
    }
}

/// Board progress for one (user, theme) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub user_id: String,
    pub theme: String,
    pub current_position: BoardPosition,
    pub finished: bool,
    /// Set once, when the record is created.
    pub started_at: DateTime<Utc>,
}

/// A local shopkeeper profile unlocked when a child reaches the goal of a theme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeacherProfile {
    pub id: Uuid,
    pub name: String,
    pub shop_name: String,
    /// Free-text tags; a theme matches when it appears inside this string.
    pub specialty: String,
    pub location: String,
    pub profile_img_url: Option<String>,
    pub visit_type: String,
    pub created_at: DateTime<Utc>,
}

impl TeacherProfile {
    /// Case-insensitive substring match of a theme within the specialty tags.
    pub fn teaches(&self, theme: &str) -> bool {
        self.specialty.to_lowercase().contains(&theme.to_lowercase())
    }
}

/// The fields supplied by the teacher registration form.
#[derive(Debug, Clone)]
pub struct NewTeacher {
    pub name: String,
    pub shop_name: String,
    pub specialty: String,
    pub location: String,
    pub profile_img_url: Option<String>,
    pub visit_type: String,
}

/// What a child receives for reaching the goal of a theme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reward {
    WithTeacher {
        knowledge_card: String,
        teacher: TeacherProfile,
    },
    WithoutTeacher {
        knowledge_card: String,
    },
}

impl Reward {
    /// Builds the reward for a finished theme, with or without a matching teacher.
    pub fn for_theme(theme: &str, teacher: Option<TeacherProfile>) -> Self {
        let knowledge_card = knowledge_card_for(theme);
        match teacher {
            Some(teacher) => Reward::WithTeacher {
                knowledge_card,
                teacher,
            },
            None => Reward::WithoutTeacher { knowledge_card },
        }
    }

    pub fn knowledge_card(&self) -> &str {
        match self {
            Reward::WithTeacher { knowledge_card, .. } => knowledge_card,
            Reward::WithoutTeacher { knowledge_card } => knowledge_card,
        }
    }

    pub fn teacher(&self) -> Option<&TeacherProfile> {
        match self {
            Reward::WithTeacher { teacher, .. } => Some(teacher),
            Reward::WithoutTeacher { .. } => None,
        }
    }
}

/// The "<theme> master" badge name. Never empty, even for an empty theme.
pub fn knowledge_card_for(theme: &str) -> String {
    format!("{}マスター", theme.trim())
}

/// A three-choice quiz generated for one chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QuizSpec {
    pub question: String,
    pub options: Vec<String>,
    /// Always equal to one of `options` when any options exist.
    pub correct_answer: String,
}

impl QuizSpec {
    /// The "no quiz available" value returned for unusable model replies.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_available(&self) -> bool {
        !self.options.is_empty()
    }
}

/// A search history row written after a chat turn or a quiz generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchLogEntry {
    pub user_id: String,
    pub query: String,
    pub result_summary: String,
}

/// A chat transcript row (question and the full streamed answer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEntry {
    pub user_id: String,
    pub message: String,
    pub answer: String,
}

/// A learning note archived by the child, usually right after a reward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: Uuid,
    pub user_id: String,
    pub entry_title: String,
    pub summary: String,
    pub knowledge_cards: Vec<String>,
    pub shop_visit_log: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNote {
    pub user_id: String,
    pub entry_title: String,
    pub summary: String,
    pub knowledge_cards: Vec<String>,
    pub shop_visit_log: Option<String>,
}
