use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{Map, Value};
use simvault_crypto::ContentHasher;
use simvault_types::{Location, TokenKey};

use crate::error::{ResultsError, ResultsResult};
use crate::tokenizable::{ShallowValue, Tokenizable, CLASS_FIELD, KEY_MARKER};

/// One object's keyed record, ready to be written.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedRecord {
    pub key: TokenKey,
    /// Shallow fields plus [`CLASS_FIELD`], with nested objects as key references.
    pub record: Value,
}

impl EncodedRecord {
    /// Canonical JSON bytes (sorted keys, compact separators).
    pub fn to_bytes(&self) -> ResultsResult<Vec<u8>> {
        serde_json::to_vec(&self.record).map_err(|e| ResultsError::Serialization(e.to_string()))
    }

    /// Where this record lives under `prefix`.
    pub fn location(&self, prefix: &str) -> Location {
        self.key.storage_location(prefix)
    }
}

/// The identity key of `obj`.
pub fn key_of<T: Tokenizable + ?Sized>(obj: &T) -> ResultsResult<TokenKey> {
    Encoder::default().visit(obj)
}

/// Every distinct object reachable from `root`, dependencies first.
///
/// Each key appears once no matter how many times it is referenced; the
/// root's record is last.
pub fn flatten<T: Tokenizable + ?Sized>(root: &T) -> ResultsResult<Vec<EncodedRecord>> {
    let mut encoder = Encoder::default();
    encoder.visit(root)?;
    Ok(encoder.records)
}

/// Token of a keyed record.
///
/// Equal to [`token_of_bytes`] over the record's stored form, since both
/// hash the same canonical JSON encoding.
pub(crate) fn token_of(record: &Value) -> ResultsResult<String> {
    ContentHasher::TOKEN
        .hash_json(record)
        .map(|digest| digest.to_hex())
        .map_err(|e| ResultsError::Serialization(e.to_string()))
}

/// Token of a record as it was stored.
pub(crate) fn token_of_bytes(bytes: &[u8]) -> String {
    ContentHasher::TOKEN.hash(bytes).to_hex()
}

/// A key reference marker pointing at `key`.
pub(crate) fn key_reference(key: &TokenKey) -> Value {
    let mut marker = Map::new();
    marker.insert(KEY_MARKER.to_string(), Value::String(key.to_string()));
    Value::Object(marker)
}

#[derive(Default)]
struct Encoder {
    /// Keys already computed, by object address.
    by_address: HashMap<usize, TokenKey>,
    /// Objects whose fields are being encoded; seeing one again is a cycle.
    in_progress: HashSet<usize>,
    seen: HashSet<TokenKey>,
    records: Vec<EncodedRecord>,
    /// Holds every visited child so no address is reused mid-walk.
    keepalive: Vec<Arc<dyn Tokenizable>>,
}

impl Encoder {
    fn visit<T: Tokenizable + ?Sized>(&mut self, obj: &T) -> ResultsResult<TokenKey> {
        let address = obj as *const T as *const () as usize;
        if let Some(key) = self.by_address.get(&address) {
            return Ok(key.clone());
        }
        if !self.in_progress.insert(address) {
            return Err(ResultsError::malformed(
                obj.class_name(),
                "reference cycle in object graph",
            ));
        }

        let mut record = Map::new();
        for (name, value) in obj.to_shallow() {
            if name == CLASS_FIELD || name == KEY_MARKER {
                return Err(ResultsError::malformed(
                    obj.class_name(),
                    format!("field name '{name}' is reserved"),
                ));
            }
            let encoded = self.encode_value(value)?;
            record.insert(name, encoded);
        }
        record.insert(
            CLASS_FIELD.to_string(),
            Value::String(obj.class_name().to_string()),
        );
        let record = Value::Object(record);

        let key = TokenKey::new(obj.class_name(), &token_of(&record)?)?;
        self.in_progress.remove(&address);
        self.by_address.insert(address, key.clone());
        if self.seen.insert(key.clone()) {
            self.records.push(EncodedRecord {
                key: key.clone(),
                record,
            });
        }
        Ok(key)
    }

    fn encode_value(&mut self, value: ShallowValue) -> ResultsResult<Value> {
        match value {
            ShallowValue::Json(v) => Ok(v),
            ShallowValue::Ref(obj) => {
                let key = self.visit(&*obj)?;
                self.keepalive.push(obj);
                Ok(key_reference(&key))
            }
            ShallowValue::List(items) => items
                .into_iter()
                .map(|item| self.encode_value(item))
                .collect::<ResultsResult<Vec<_>>>()
                .map(Value::Array),
            ShallowValue::Map(map) => map
                .into_iter()
                .map(|(k, v)| self.encode_value(v).map(|v| (k, v)))
                .collect::<ResultsResult<Map<_, _>>>()
                .map(Value::Object),
        }
    }
}
