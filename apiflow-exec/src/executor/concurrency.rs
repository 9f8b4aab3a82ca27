use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Global and per-protocol bounds on in-flight requests.
#[derive(Clone)]
pub struct ConcurrencyLimits {
    global: Arc<Semaphore>,
    per_protocol: Arc<HashMap<String, Arc<Semaphore>>>,
}

impl ConcurrencyLimits {
    pub fn new(global_limit: usize, per_protocol_limits: &BTreeMap<String, usize>) -> Self {
        Self {
            global: Arc::new(Semaphore::new(global_limit.max(1))),
            per_protocol: Arc::new(
                per_protocol_limits
                    .iter()
                    .map(|(k, v)| (k.clone(), Arc::new(Semaphore::new((*v).max(1)))))
                    .collect(),
            ),
        }
    }

    pub async fn acquire(&self, protocol: Option<&str>) -> Result<ConcurrencyPermit, AcquireError> {
        let global = self.global.clone().acquire_owned().await?;
        let protocol = match protocol.and_then(|p| self.per_protocol.get(p)) {
            Some(sem) => Some(sem.clone().acquire_owned().await?),
            None => None,
        };
        Ok(ConcurrencyPermit {
            _global: global,
            _protocol: protocol,
        })
    }

    pub fn available(&self) -> usize {
        self.global.available_permits()
    }
}

pub struct ConcurrencyPermit {
    _global: OwnedSemaphorePermit,
    _protocol: Option<OwnedSemaphorePermit>,
}
