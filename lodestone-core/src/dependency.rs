//! Opaque dependency values passed through the engine

use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};

/// An already-resolved dependency value.
///
/// The engine never looks inside a dependency. It only needs to turn it into
/// its wire form before a submission leaves the controller, so that values
/// which cannot cross the process boundary are caught locally.
pub trait Dependency: Send + Sync {
    fn to_wire(&self) -> Result<JsonValue, serde_json::Error>;
}

impl<T> Dependency for T
where
    T: Serialize + Send + Sync,
{
    fn to_wire(&self) -> Result<JsonValue, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Dependencies keyed by the id the task tree uses to look them up
pub type DependencyMap = BTreeMap<String, Arc<dyn Dependency>>;

/// Encode every dependency of a map, failing on the first value that has no
/// wire form.
pub fn encode_dependencies(deps: &DependencyMap) -> CoreResult<JsonMap<String, JsonValue>> {
    let mut encoded = JsonMap::new();
    for (key, value) in deps {
        let wire = value
            .to_wire()
            .map_err(|source| CoreError::DependencyEncoding {
                key: key.clone(),
                source,
            })?;
        encoded.insert(key.clone(), wire);
    }
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_encode_serializable_dependencies() {
        let mut deps: DependencyMap = BTreeMap::new();
        deps.insert("driver".to_string(), Arc::new("visa://gpib0::12"));
        deps.insert("channels".to_string(), Arc::new(vec![1, 2, 3]));

        let encoded = encode_dependencies(&deps).unwrap();
        assert_eq!(encoded["driver"], json!("visa://gpib0::12"));
        assert_eq!(encoded["channels"], json!([1, 2, 3]));
    }

    #[test]
    fn test_encode_reports_offending_key() {
        // JSON object keys must be strings
        let mut handle: HashMap<Vec<u8>, u32> = HashMap::new();
        handle.insert(vec![0xde, 0xad], 1);

        let mut deps: DependencyMap = BTreeMap::new();
        deps.insert("ok".to_string(), Arc::new(1u32));
        deps.insert("instrument".to_string(), Arc::new(handle));

        match encode_dependencies(&deps) {
            Err(CoreError::DependencyEncoding { key, .. }) => assert_eq!(key, "instrument"),
            other => panic!("expected encoding error, got {:?}", other),
        }
    }
}
