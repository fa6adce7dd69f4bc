pub mod generation_llm;
pub mod templates;
pub mod users;

pub use generation_llm::OpenAiGenerationAdapter;
pub use templates::FsTemplateStore;
pub use users::{JsonFileUserRepository, MemoryUserRepository};
