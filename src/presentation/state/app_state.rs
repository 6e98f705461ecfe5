use std::sync::Arc;

use crate::application::ports::SourceFetcher;
use crate::application::services::{AdmissionController, AnalysisPipeline};
use crate::presentation::config::Settings;

pub struct AppState {
    pub pipeline: Arc<AnalysisPipeline>,
    pub admission: Arc<AdmissionController>,
    pub fetcher: Arc<dyn SourceFetcher>,
    pub settings: Settings,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            admission: Arc::clone(&self.admission),
            fetcher: Arc::clone(&self.fetcher),
            settings: self.settings.clone(),
        }
    }
}
