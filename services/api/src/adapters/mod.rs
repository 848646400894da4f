pub mod chat_llm;
pub mod db;
pub mod memory;
pub mod quiz_llm;

pub use chat_llm::OpenAiChatStreamAdapter;
pub use db::DbAdapter;
pub use memory::InMemoryStore;
pub use quiz_llm::OpenAiQuizAdapter;
