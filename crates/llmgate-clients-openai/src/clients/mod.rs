pub(crate) mod mock;
pub(crate) mod openai;

pub use mock::MockProviderClient;
pub use openai::OpenAiClient;
