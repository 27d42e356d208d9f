use std::sync::Arc;

use crate::aqi::AqiPipeline;

/// Shared handler state. Cloned per request; holds no mutable data.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AqiPipeline>,
}

impl AppState {
    pub fn new(pipeline: AqiPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}
