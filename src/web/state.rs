use std::sync::Arc;

use crate::context::BridgeContext;

#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<BridgeContext>,
}

impl AppState {
    pub fn new(ctx: Arc<BridgeContext>) -> Self {
        Self { ctx }
    }
}
