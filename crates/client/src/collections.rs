use std::collections::HashMap;

use crate::error::ClientError;

/// Maps logical collection names to node-side schema identifiers
#[derive(Debug, Clone)]
pub struct CollectionRouter {
    schemas: HashMap<String, String>,
}

impl CollectionRouter {
    pub fn new(schemas: HashMap<String, String>) -> Self {
        CollectionRouter { schemas }
    }

    /// Resolve a collection name to its schema identifier
    pub fn schema(&self, collection: &str) -> Result<&str, ClientError> {
        self.schemas
            .get(collection)
            .map(String::as_str)
            .ok_or_else(|| ClientError::UnknownCollection(collection.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_router_resolves_known_collection() {
        let router = CollectionRouter::new(HashMap::from([(
            "findings".to_string(),
            "schema-findings-v1".to_string(),
        )]));
        assert_eq!(router.schema("findings").unwrap(), "schema-findings-v1");
    }

    #[test]
    fn test_router_rejects_unknown_collection() {
        let router = CollectionRouter::new(HashMap::new());
        assert!(matches!(
            router.schema("leads"),
            Err(ClientError::UnknownCollection(name)) if name == "leads"
        ));
    }
}
