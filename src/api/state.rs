//! API shared state

use std::sync::Arc;

use crate::actors::retention::RetentionHandle;
use crate::services::Services;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    pub services: Services,

    /// Bearer token for the admin routes; `None` leaves them open
    pub admin_token: Option<Arc<str>>,

    /// Handle to the retention actor, reported by `/api/stats`
    pub retention: Option<RetentionHandle>,
}

impl ApiState {
    pub fn new(services: Services, admin_token: Option<String>) -> Self {
        Self {
            services,
            admin_token: admin_token.filter(|t| !t.is_empty()).map(Arc::from),
            retention: None,
        }
    }

    pub fn with_retention(mut self, retention: RetentionHandle) -> Self {
        self.retention = Some(retention);
        self
    }
}
