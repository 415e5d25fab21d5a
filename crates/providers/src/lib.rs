pub mod governor;
pub mod openai_compat;
pub mod retry;
pub mod traits;
pub(crate) mod util;

// Re-exports for convenience.
pub use governor::{Governor, ProviderState};
pub use openai_compat::OpenAiCompatBackend;
pub use retry::RetryPolicy;
pub use traits::{Completion, CompletionBackend, CompletionRequest, Message, Role, Usage};
