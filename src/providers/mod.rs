pub mod capability;
pub mod openai;
pub mod registry;
pub mod stub;

pub use capability::{
    AudioTranscriber, Capability, ImageAnalyzer, ImageEditor, ImageGenerator, Provider,
    TextGenerator, TextPrompt,
};
pub use openai::OpenAIProvider;
pub use registry::ProviderRegistry;
pub use stub::StubProvider;
