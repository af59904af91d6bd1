pub mod openai;
pub mod presets;

pub use openai::OpenAiClient;
pub use presets::{apply_preset_defaults, get_preset, ProviderPreset};
