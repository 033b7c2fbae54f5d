pub mod heygen;
pub mod replicate;

pub use heygen::{
    HeyGenClient, MediaAsset, TargetLanguage, TranslationRequest, UploadedAsset,
    VideoTranslationService,
};
pub use replicate::{PredictionRequest, PredictionService, ReplicateClient, DEFAULT_IMAGE_MODEL};
