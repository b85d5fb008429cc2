use crate::endpoint::{VerifiedEndpoint, VerifiedSet};
use crate::store::EndpointStore;
use rand::seq::SliceRandom;
use std::sync::Arc;

/// Read-only view over the verified endpoints handed to workers.
///
/// The backing slice is immutable after construction, so clones can be
/// shared across lifelines and `pick` needs no locking.
#[derive(Debug, Clone)]
pub struct EndpointPool {
    endpoints: Arc<[VerifiedEndpoint]>,
    enabled: bool,
}

impl EndpointPool {
    pub fn new(set: VerifiedSet) -> Self {
        Self {
            endpoints: set.into_vec().into(),
            enabled: true,
        }
    }

    /// A pool that never hands out an endpoint.
    pub fn disabled() -> Self {
        Self {
            endpoints: Arc::from(Vec::new()),
            enabled: false,
        }
    }

    pub async fn load(store: &EndpointStore) -> Self {
        Self::new(store.load().await)
    }

    /// Uniform-random endpoint, or `None` when empty or disabled.
    pub fn pick(&self) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        let mut rng = rand::thread_rng();
        self.endpoints.choose(&mut rng).map(|e| e.addr.as_str())
    }

    pub fn len(&self) -> usize {
        if self.enabled {
            self.endpoints.len()
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
