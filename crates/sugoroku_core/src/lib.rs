pub mod domain;
pub mod ports;
pub mod progression;

pub use domain::{
    knowledge_card_for, BoardPosition, MessageEntry, NewNote, NewTeacher, Note, ProgressRecord,
    QuizSpec, Reward, SearchLogEntry, TeacherProfile,
};
pub use ports::{
    ActivityLog, CompletionByteStream, CompletionStreamService, NoteBook, PortError, PortResult,
    ProgressStore, QuizSynthesisService, TeacherDirectory,
};
pub use progression::{advance, Step};
