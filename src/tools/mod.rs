pub mod cinematic_switch;
pub mod direct;
pub mod global_voice;
pub mod image_jobs;
pub mod instant_influencer;
pub mod payload;
pub mod registry;
pub mod time_capsule;

pub use cinematic_switch::CinematicSwitchTool;
pub use direct::{
    AudioTranscriptionTool, FutureLetterTool, ImageAgingTool, ImageAnalysisTool, ImageVariationTool,
};
pub use global_voice::GlobalVoiceTool;
pub use image_jobs::ImageJobs;
pub use instant_influencer::InstantInfluencerTool;
pub use registry::{Tool, ToolContext, ToolMetadata, ToolRegistry, ToolRequest, ToolResult};
pub use time_capsule::TimeCapsuleTool;
