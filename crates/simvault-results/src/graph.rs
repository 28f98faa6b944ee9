use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;
use simvault_store::ResultServer;
use simvault_types::TokenKey;
use tracing::{debug, trace};

use crate::cache::DecodeCache;
use crate::encode::{flatten, token_of_bytes};
use crate::error::{ResultsError, ResultsResult};
use crate::tokenizable::{
    ShallowFields, ShallowValue, Tokenizable, TokenizableRegistry, CLASS_FIELD, KEY_MARKER,
};

/// What storing one object graph did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreReport {
    /// Key of the graph's root object.
    pub root: Option<TokenKey>,
    /// Records physically written, in write order.
    pub written: Vec<TokenKey>,
    /// Records skipped because their key was already stored.
    pub skipped: Vec<TokenKey>,
}

/// Store every distinct object reachable from `root` under `prefix`.
///
/// Records are written dependencies first, and a record whose storage key is
/// already known to the server is never rewritten.
pub fn store_graph<T: Tokenizable + ?Sized>(
    server: &ResultServer,
    prefix: &str,
    root: &T,
) -> ResultsResult<StoreReport> {
    let records = flatten(root)?;
    let mut report = StoreReport {
        root: records.last().map(|r| r.key.clone()),
        ..StoreReport::default()
    };

    for record in &records {
        let location = record.location(prefix);
        if server.store_if_absent(&location, &record.to_bytes()?)? {
            report.written.push(record.key.clone());
        } else {
            debug!(key = %record.key, "record already stored, skipping");
            report.skipped.push(record.key.clone());
        }
    }

    debug!(
        prefix,
        written = report.written.len(),
        skipped = report.skipped.len(),
        "stored object graph"
    );
    Ok(report)
}

/// Rebuilds object graphs from stored records.
///
/// Every reference is resolved before the object holding it is decoded, and
/// each key is decoded at most once per [`DecodeCache`].
pub struct GraphLoader<'a> {
    server: &'a ResultServer,
    registry: &'a TokenizableRegistry,
    cache: &'a DecodeCache,
    prefix: &'a str,
}

impl<'a> GraphLoader<'a> {
    pub fn new(
        server: &'a ResultServer,
        registry: &'a TokenizableRegistry,
        cache: &'a DecodeCache,
        prefix: &'a str,
    ) -> Self {
        Self {
            server,
            registry,
            cache,
            prefix,
        }
    }

    /// Load the object stored under `key` together with everything it references.
    pub fn load(&self, key: &TokenKey) -> ResultsResult<Arc<dyn Tokenizable>> {
        let mut stack = Vec::new();
        self.resolve(key, None, &mut stack)
    }

    fn resolve(
        &self,
        key: &TokenKey,
        referenced_by: Option<&TokenKey>,
        stack: &mut Vec<TokenKey>,
    ) -> ResultsResult<Arc<dyn Tokenizable>> {
        if stack.contains(key) {
            return Err(ResultsError::malformed(key, "reference cycle between records"));
        }

        self.cache.get_or_try_insert(key, || {
            stack.push(key.clone());
            let obj = self.build(key, referenced_by, stack)?;
            stack.pop();
            Ok(obj)
        })
    }

    fn build(
        &self,
        key: &TokenKey,
        referenced_by: Option<&TokenKey>,
        stack: &mut Vec<TokenKey>,
    ) -> ResultsResult<Arc<dyn Tokenizable>> {
        let record = self.read_record(key, referenced_by)?;

        let mut dependencies = Vec::new();
        collect_references(key, &record, &mut dependencies)?;

        let mut resolved = HashMap::with_capacity(dependencies.len());
        for dependency in dependencies {
            if resolved.contains_key(&dependency) {
                continue;
            }
            let obj = self.resolve(&dependency, Some(key), stack)?;
            resolved.insert(dependency, obj);
        }

        let fields = materialize_fields(key, record, &resolved)?;
        let obj = self.registry.decode(key, fields)?;
        trace!(%key, "reconstructed object");
        Ok(obj)
    }

    /// Load and check the record for `key`.
    ///
    /// The token is checked against the stored bytes, not a re-encoding of
    /// the parsed value, so number formatting cannot cause a false mismatch.
    fn read_record(
        &self,
        key: &TokenKey,
        referenced_by: Option<&TokenKey>,
    ) -> ResultsResult<Value> {
        let location = key.storage_location(self.prefix);
        let bytes = match (self.server.load_bytes(&location), referenced_by) {
            (Ok(bytes), _) => bytes,
            (Err(e), Some(parent)) if e.is_missing() => {
                return Err(ResultsError::MissingDependency {
                    key: key.clone(),
                    referenced_by: parent.clone(),
                })
            }
            (Err(e), _) => return Err(e.into()),
        };

        let record: Value = serde_json::from_slice(&bytes)
            .map_err(|e| ResultsError::malformed(key, format!("invalid JSON: {e}")))?;

        match record.get(CLASS_FIELD).and_then(Value::as_str) {
            Some(class) if class == key.class_name() => {}
            Some(class) => {
                return Err(ResultsError::malformed(
                    key,
                    format!("record declares class {class}"),
                ))
            }
            None => return Err(ResultsError::malformed(key, "missing class field")),
        }
        if token_of_bytes(&bytes) != key.token() {
            return Err(ResultsError::malformed(key, "content does not match its key"));
        }
        Ok(record)
    }
}

/// If `value` is a key reference marker, the key it points at.
fn as_reference(owner: &TokenKey, value: &Value) -> ResultsResult<Option<TokenKey>> {
    let Value::Object(map) = value else {
        return Ok(None);
    };
    let Some(target) = map.get(KEY_MARKER) else {
        return Ok(None);
    };
    if map.len() != 1 {
        return Err(ResultsError::malformed(owner, "key reference with extra fields"));
    }
    let target = target
        .as_str()
        .ok_or_else(|| ResultsError::malformed(owner, "key reference is not a string"))?;
    TokenKey::parse(target)
        .map(Some)
        .map_err(|e| ResultsError::malformed(owner, e.to_string()))
}

/// Every key referenced anywhere in `value`, in document order.
fn collect_references(
    owner: &TokenKey,
    value: &Value,
    out: &mut Vec<TokenKey>,
) -> ResultsResult<()> {
    if let Some(key) = as_reference(owner, value)? {
        out.push(key);
        return Ok(());
    }
    match value {
        Value::Array(items) => items
            .iter()
            .try_for_each(|item| collect_references(owner, item, out)),
        Value::Object(map) => map
            .values()
            .try_for_each(|item| collect_references(owner, item, out)),
        _ => Ok(()),
    }
}

fn contains_reference(value: &Value) -> bool {
    match value {
        Value::Object(map) if map.contains_key(KEY_MARKER) => true,
        Value::Object(map) => map.values().any(contains_reference),
        Value::Array(items) => items.iter().any(contains_reference),
        _ => false,
    }
}

/// Replace every reference marker in `value` with the resolved object.
fn materialize(
    owner: &TokenKey,
    value: Value,
    resolved: &HashMap<TokenKey, Arc<dyn Tokenizable>>,
) -> ResultsResult<ShallowValue> {
    if let Some(key) = as_reference(owner, &value)? {
        let obj = resolved.get(&key).ok_or_else(|| ResultsError::MissingDependency {
            key: key.clone(),
            referenced_by: owner.clone(),
        })?;
        return Ok(ShallowValue::Ref(Arc::clone(obj)));
    }
    if !contains_reference(&value) {
        return Ok(ShallowValue::Json(value));
    }
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| materialize(owner, item, resolved))
            .collect::<ResultsResult<Vec<_>>>()
            .map(ShallowValue::List),
        Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| materialize(owner, v, resolved).map(|v| (k, v)))
            .collect::<ResultsResult<BTreeMap<_, _>>>()
            .map(ShallowValue::Map),
        other => Ok(ShallowValue::Json(other)),
    }
}

fn materialize_fields(
    owner: &TokenKey,
    record: Value,
    resolved: &HashMap<TokenKey, Arc<dyn Tokenizable>>,
) -> ResultsResult<ShallowFields> {
    let Value::Object(map) = record else {
        return Err(ResultsError::malformed(owner, "record is not a JSON object"));
    };
    map.into_iter()
        .filter(|(name, _)| name != CLASS_FIELD)
        .map(|(name, value)| materialize(owner, value, resolved).map(|v| (name, v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn owner() -> TokenKey {
        TokenKey::parse("Owner-00").unwrap()
    }

    #[test]
    fn finds_nested_references() {
        let record = json!({
            "a": { KEY_MARKER: "Clone-01" },
            "b": [{ KEY_MARKER: "Clone-02" }, 3, { "deep": { KEY_MARKER: "Ext-03" } }],
            "c": "Clone-04",
        });
        let mut found = Vec::new();
        collect_references(&owner(), &record, &mut found).unwrap();
        let found: Vec<String> = found.iter().map(|k| k.to_string()).collect();
        assert_eq!(found, vec!["Clone-01", "Clone-02", "Ext-03"]);
    }

    #[test]
    fn marker_with_extra_fields_is_malformed() {
        let record = json!({ "a": { KEY_MARKER: "Clone-01", "x": 1 } });
        let mut found = Vec::new();
        assert!(matches!(
            collect_references(&owner(), &record, &mut found),
            Err(ResultsError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn marker_with_bad_key_is_malformed() {
        let record = json!({ "a": { KEY_MARKER: "not a key" } });
        let mut found = Vec::new();
        assert!(matches!(
            collect_references(&owner(), &record, &mut found),
            Err(ResultsError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn non_object_record_is_malformed() {
        assert!(matches!(
            materialize_fields(&owner(), json!([1, 2]), &HashMap::new()),
            Err(ResultsError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn plain_fields_stay_json() {
        let fields = materialize_fields(
            &owner(),
            json!({ CLASS_FIELD: "Owner", "n": 1, "m": { "x": [1, 2] } }),
            &HashMap::new(),
        )
        .unwrap();
        assert!(!fields.contains_key(CLASS_FIELD));
        assert!(matches!(fields["n"], ShallowValue::Json(_)));
        assert!(matches!(fields["m"], ShallowValue::Json(_)));
    }

    #[test]
    fn unresolved_marker_is_missing_dependency() {
        let err = materialize_fields(
            &owner(),
            json!({ "a": { KEY_MARKER: "Clone-01" } }),
            &HashMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ResultsError::MissingDependency { .. }));
    }
}
