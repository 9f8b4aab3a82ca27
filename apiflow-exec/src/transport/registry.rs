use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use apiflow_core::types::Protocol;
use tracing::debug;

use super::{ReqwestHttpTransport, Transport, TransportError};

pub type TransportFactory =
    Arc<dyn Fn() -> Result<Arc<dyn Transport>, TransportError> + Send + Sync>;

/// Per-protocol transports, each built on first use and then reused.
pub struct TransportRegistry {
    factories: HashMap<String, TransportFactory>,
    instances: Mutex<HashMap<String, Arc<dyn Transport>>>,
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

impl TransportRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Registry with the built-in reqwest transport for `http`.
    pub fn with_defaults(max_response_bytes: usize) -> Self {
        let mut registry = Self::empty();
        registry.register_factory(Protocol::Http, move || {
            Ok(Arc::new(ReqwestHttpTransport::new(max_response_bytes)?) as Arc<dyn Transport>)
        });
        registry
    }

    pub fn register_factory<F>(&mut self, protocol: Protocol, factory: F)
    where
        F: Fn() -> Result<Arc<dyn Transport>, TransportError> + Send + Sync + 'static,
    {
        let key = protocol.as_str().to_string();
        if let Ok(mut instances) = self.instances.lock() {
            instances.remove(&key);
        }
        self.factories.insert(key, Arc::new(factory));
    }

    /// Registers an already built transport.
    pub fn register(&mut self, protocol: Protocol, transport: Arc<dyn Transport>) {
        self.register_factory(protocol, move || Ok(transport.clone()));
    }

    pub fn with(mut self, protocol: Protocol, transport: Arc<dyn Transport>) -> Self {
        self.register(protocol, transport);
        self
    }

    pub fn supports(&self, protocol: &Protocol) -> bool {
        self.factories.contains_key(protocol.as_str())
    }

    pub fn get(&self, protocol: &Protocol) -> Result<Arc<dyn Transport>, TransportError> {
        let key = protocol.as_str();
        let mut instances = self
            .instances
            .lock()
            .map_err(|_| TransportError::Other("transport registry lock poisoned".into()))?;
        if let Some(t) = instances.get(key) {
            return Ok(t.clone());
        }
        let factory = self
            .factories
            .get(key)
            .ok_or_else(|| TransportError::UnsupportedProtocol(key.to_string()))?;
        let transport = factory()?;
        debug!(protocol = key, "transport initialized");
        instances.insert(key.to_string(), transport.clone());
        Ok(transport)
    }
}
