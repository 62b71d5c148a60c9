use std::collections::HashMap;

use crate::error::Result;
use crate::registry::ServerRegistry;

/// Remembers which server each coalescing key went to, so repeated
/// submissions of the same work land on the same server.
#[derive(Debug, Default)]
pub struct AffinityRouter {
    routes: HashMap<String, String>,
}

impl AffinityRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route<R: ServerRegistry>(&mut self, key: &str, registry: &mut R) -> Result<String> {
        if let Some(addr) = self.routes.get(key) {
            return Ok(addr.clone());
        }
        let addr = registry.resolve(key)?;
        self.routes.insert(key.to_string(), addr.clone());
        Ok(addr)
    }

    /// Drop the route for `key`; the next submission resolves afresh.
    pub fn forget(&mut self, key: &str) {
        self.routes.remove(key);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.routes.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::registry::ServerPool;

    #[test]
    fn route_is_sticky_until_forgotten() {
        let config = ClientConfig::new(vec!["a:4730".to_string(), "b:4730".to_string()]);
        let mut pool = ServerPool::new(&config);
        let mut router = AffinityRouter::new();

        let first = router.route("key", &mut pool).unwrap();
        pool.mark_bad(&first);
        assert_eq!(router.route("key", &mut pool).unwrap(), first);

        router.forget("key");
        assert!(router.get("key").is_none());
        let second = router.route("key", &mut pool).unwrap();
        assert_ne!(first, second);
        assert_eq!(router.get("key"), Some(second.as_str()));
    }
}
