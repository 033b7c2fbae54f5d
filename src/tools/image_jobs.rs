use std::sync::Arc;

use crate::clock::Clock;
use crate::error::Result;
use crate::jobs::{AsyncJob, JobPoller, JobTarget, PollPolicy};
use crate::vendors::replicate::{self, PredictionRequest, PredictionService};

/// Replicate image-to-image jobs as used by the photo tools.
#[derive(Clone)]
pub struct ImageJobs {
    predictions: Arc<dyn PredictionService>,
    poller: JobPoller,
    policy: PollPolicy,
    model: String,
}

impl ImageJobs {
    pub fn new(predictions: Arc<dyn PredictionService>, poller: JobPoller, policy: PollPolicy) -> Self {
        Self {
            predictions,
            poller,
            policy,
            model: replicate::DEFAULT_IMAGE_MODEL.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        self.poller.clock()
    }

    pub fn ensure_configured(&self) -> Result<()> {
        self.predictions.ensure_configured()
    }

    /// Submit one transformation and wait for it to finish.
    pub async fn transform(&self, image: &str, prompt: &str, aspect_ratio: Option<&str>) -> Result<AsyncJob> {
        let request =
            PredictionRequest::image_to_image(&self.model, image, prompt).with_aspect_ratio(aspect_ratio);
        let target = JobTarget {
            service: "Replicate",
            vendor: replicate::VENDOR,
            policy: self.policy,
        };
        let predictions = &self.predictions;

        self.poller
            .submit_and_await(
                &target,
                || predictions.create_prediction(&request),
                |prediction_id| async move { predictions.get_prediction(&prediction_id).await },
            )
            .await
    }
}
