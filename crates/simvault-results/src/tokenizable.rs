use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use simvault_types::TokenKey;

use crate::error::{ResultsError, ResultsResult};

/// Reserved field marking a key reference inside a serialized record.
///
/// A reference is an object with this single field whose value is the
/// referenced object's `<ClassName>-<token>` key.
pub const KEY_MARKER: &str = ":simvault-key:";

/// Reserved field holding the class name in every serialized record.
pub const CLASS_FIELD: &str = "__class__";

/// Upcasting support so `Arc<dyn Tokenizable>` can be downcast to a concrete type.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A domain object with a content-derived identity.
///
/// The key is `<ClassName>-<token>`, where the token hashes the object's
/// keyed record: its shallow fields with every nested tokenizable replaced
/// by a reference to that object's key. Equal keys mean equal objects.
pub trait Tokenizable: AsAny {
    /// Class name used in the key and in storage paths. ASCII alphanumeric
    /// or `_` only.
    fn class_name(&self) -> &'static str;

    /// Fields of this object, one level deep. Nested tokenizables must
    /// appear as [`ShallowValue::Ref`], never inlined.
    fn to_shallow(&self) -> ShallowFields;

    /// The stable identity key.
    fn key(&self) -> ResultsResult<TokenKey> {
        crate::encode::key_of(self)
    }
}

/// A tokenizable type that can be rebuilt from its shallow fields.
pub trait TokenizableClass: Tokenizable + Sized {
    const CLASS_NAME: &'static str;

    /// Rebuild from fields whose references are already materialized.
    fn from_shallow(fields: &mut FieldReader) -> ResultsResult<Self>;
}

/// Shallow fields of a tokenizable object.
pub type ShallowFields = BTreeMap<String, ShallowValue>;

/// One field value in a shallow representation.
#[derive(Clone)]
pub enum ShallowValue {
    /// Plain JSON data with no embedded references.
    Json(Value),
    /// A nested tokenizable object, stored as a key reference.
    Ref(Arc<dyn Tokenizable>),
    /// A list that may contain references.
    List(Vec<ShallowValue>),
    /// A string-keyed map that may contain references.
    Map(BTreeMap<String, ShallowValue>),
}

impl ShallowValue {
    /// Wrap a reference to a nested object.
    pub fn object<T: Tokenizable>(obj: &Arc<T>) -> Self {
        Self::Ref(Arc::clone(obj) as Arc<dyn Tokenizable>)
    }

    /// A list of references to nested objects.
    pub fn objects<'a, T: Tokenizable>(objs: impl IntoIterator<Item = &'a Arc<T>>) -> Self {
        Self::List(objs.into_iter().map(Self::object).collect())
    }

    /// Plain JSON, or `None` if a reference is embedded anywhere inside.
    pub fn into_json(self) -> Option<Value> {
        match self {
            Self::Json(v) => Some(v),
            Self::Ref(_) => None,
            Self::List(items) => items
                .into_iter()
                .map(Self::into_json)
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            Self::Map(map) => map
                .into_iter()
                .map(|(k, v)| v.into_json().map(|v| (k, v)))
                .collect::<Option<serde_json::Map<_, _>>>()
                .map(Value::Object),
        }
    }
}

impl From<Value> for ShallowValue {
    fn from(v: Value) -> Self {
        Self::Json(v)
    }
}

impl<T: Tokenizable> From<Arc<T>> for ShallowValue {
    fn from(obj: Arc<T>) -> Self {
        Self::Ref(obj)
    }
}

impl fmt::Debug for ShallowValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(v) => write!(f, "Json({v})"),
            Self::Ref(obj) => write!(f, "Ref({})", obj.class_name()),
            Self::List(items) => f.debug_list().entries(items).finish(),
            Self::Map(map) => f.debug_map().entries(map).finish(),
        }
    }
}

impl fmt::Debug for dyn Tokenizable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tokenizable({})", self.class_name())
    }
}

/// Downcast a reconstructed object to its concrete type.
pub fn downcast<T: Tokenizable>(
    obj: Arc<dyn Tokenizable>,
    key: &TokenKey,
) -> ResultsResult<Arc<T>> {
    obj.into_any_arc()
        .downcast::<T>()
        .map_err(|_| ResultsError::TypeMismatch {
            key: key.clone(),
            expected: std::any::type_name::<T>(),
        })
}

// ---------------------------------------------------------------------------
// FieldReader
// ---------------------------------------------------------------------------

/// Typed access to the materialized fields of one record during decoding.
pub struct FieldReader {
    key: TokenKey,
    fields: ShallowFields,
}

impl FieldReader {
    pub fn new(key: TokenKey, fields: ShallowFields) -> Self {
        Self { key, fields }
    }

    /// Key of the record being decoded.
    pub fn key(&self) -> &TokenKey {
        &self.key
    }

    fn malformed(&self, reason: String) -> ResultsError {
        ResultsError::malformed(&self.key, reason)
    }

    /// Remove and return a field.
    pub fn take(&mut self, name: &str) -> ResultsResult<ShallowValue> {
        self.fields
            .remove(name)
            .ok_or_else(|| self.malformed(format!("missing field '{name}'")))
    }

    /// Deserialize a plain-data field.
    pub fn value<T: DeserializeOwned>(&mut self, name: &str) -> ResultsResult<T> {
        let raw = self.take(name)?;
        let json = raw
            .into_json()
            .ok_or_else(|| self.malformed(format!("field '{name}' holds object references")))?;
        serde_json::from_value(json)
            .map_err(|e| self.malformed(format!("field '{name}': {e}")))
    }

    /// Deserialize a plain-data field that may be absent or null.
    pub fn optional<T: DeserializeOwned>(&mut self, name: &str) -> ResultsResult<Option<T>> {
        let absent = matches!(
            self.fields.get(name),
            None | Some(ShallowValue::Json(Value::Null))
        );
        if absent {
            self.fields.remove(name);
            return Ok(None);
        }
        self.value(name).map(Some)
    }

    /// A single nested object.
    pub fn object<T: Tokenizable>(&mut self, name: &str) -> ResultsResult<Arc<T>> {
        match self.take(name)? {
            ShallowValue::Ref(obj) => self.cast(obj, name),
            other => Err(self.malformed(format!("field '{name}' is not a reference: {other:?}"))),
        }
    }

    /// A list of nested objects.
    pub fn objects<T: Tokenizable>(&mut self, name: &str) -> ResultsResult<Vec<Arc<T>>> {
        match self.take(name)? {
            ShallowValue::List(items) => items
                .into_iter()
                .map(|item| match item {
                    ShallowValue::Ref(obj) => self.cast(obj, name),
                    other => Err(self.malformed(format!(
                        "field '{name}' contains a non-reference: {other:?}"
                    ))),
                })
                .collect(),
            // An empty list carries no references and decodes as plain JSON.
            ShallowValue::Json(Value::Array(items)) if items.is_empty() => Ok(Vec::new()),
            other => Err(self.malformed(format!("field '{name}' is not a list: {other:?}"))),
        }
    }

    /// A string-keyed map of nested objects.
    pub fn object_map<T: Tokenizable>(
        &mut self,
        name: &str,
    ) -> ResultsResult<BTreeMap<String, Arc<T>>> {
        match self.take(name)? {
            ShallowValue::Map(map) => map
                .into_iter()
                .map(|(k, v)| match v {
                    ShallowValue::Ref(obj) => self.cast(obj, name).map(|o| (k, o)),
                    other => Err(self.malformed(format!(
                        "field '{name}.{k}' is not a reference: {other:?}"
                    ))),
                })
                .collect(),
            ShallowValue::Json(Value::Object(map)) if map.is_empty() => Ok(BTreeMap::new()),
            other => Err(self.malformed(format!("field '{name}' is not a map: {other:?}"))),
        }
    }

    fn cast<T: Tokenizable>(&self, obj: Arc<dyn Tokenizable>, name: &str) -> ResultsResult<Arc<T>> {
        let class = obj.class_name();
        obj.into_any_arc().downcast::<T>().map_err(|_| {
            self.malformed(format!(
                "field '{name}' references a {class}, expected {}",
                std::any::type_name::<T>()
            ))
        })
    }
}

// ---------------------------------------------------------------------------
// TokenizableRegistry
// ---------------------------------------------------------------------------

type DecodeFn = fn(FieldReader) -> ResultsResult<Arc<dyn Tokenizable>>;

fn decode_as<T: TokenizableClass>(mut fields: FieldReader) -> ResultsResult<Arc<dyn Tokenizable>> {
    Ok(Arc::new(T::from_shallow(&mut fields)?))
}

/// Maps class names to decoders so records can be rebuilt by class.
#[derive(Default)]
pub struct TokenizableRegistry {
    decoders: HashMap<&'static str, DecodeFn>,
}

impl TokenizableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class under its `CLASS_NAME`.
    pub fn register<T: TokenizableClass>(&mut self) -> &mut Self {
        self.decoders.insert(T::CLASS_NAME, decode_as::<T>);
        self
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<T: TokenizableClass>(mut self) -> Self {
        self.register::<T>();
        self
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.decoders.contains_key(class_name)
    }

    /// Rebuild the object for `key` from materialized fields.
    pub fn decode(
        &self,
        key: &TokenKey,
        fields: ShallowFields,
    ) -> ResultsResult<Arc<dyn Tokenizable>> {
        let decoder = self
            .decoders
            .get(key.class_name())
            .ok_or_else(|| ResultsError::UnknownClass(key.class_name().to_string()))?;
        decoder(FieldReader::new(key.clone(), fields))
    }
}

impl fmt::Debug for TokenizableRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut classes: Vec<_> = self.decoders.keys().collect();
        classes.sort();
        f.debug_struct("TokenizableRegistry")
            .field("classes", &classes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Leaf {
        label: String,
    }

    impl Tokenizable for Leaf {
        fn class_name(&self) -> &'static str {
            Self::CLASS_NAME
        }

        fn to_shallow(&self) -> ShallowFields {
            BTreeMap::from([("label".to_string(), json!(self.label).into())])
        }
    }

    impl TokenizableClass for Leaf {
        const CLASS_NAME: &'static str = "Leaf";

        fn from_shallow(fields: &mut FieldReader) -> ResultsResult<Self> {
            Ok(Self {
                label: fields.value("label")?,
            })
        }
    }

    fn leaf(label: &str) -> Arc<Leaf> {
        Arc::new(Leaf {
            label: label.to_string(),
        })
    }

    fn reader(fields: ShallowFields) -> FieldReader {
        FieldReader::new(TokenKey::parse("Holder-00").unwrap(), fields)
    }

    #[test]
    fn into_json_without_refs() {
        let v = ShallowValue::List(vec![json!(1).into(), json!("a").into()]);
        assert_eq!(v.into_json(), Some(json!([1, "a"])));
    }

    #[test]
    fn into_json_with_refs_is_none() {
        let v = ShallowValue::Map(BTreeMap::from([(
            "x".to_string(),
            ShallowValue::object(&leaf("a")),
        )]));
        assert!(v.into_json().is_none());
    }

    #[test]
    fn reader_typed_access() {
        let a = leaf("a");
        let mut r = reader(BTreeMap::from([
            ("n".to_string(), json!(7).into()),
            ("one".to_string(), ShallowValue::object(&a)),
            ("many".to_string(), ShallowValue::objects([&a, &a])),
            ("none".to_string(), json!(null).into()),
        ]));
        assert_eq!(r.value::<u32>("n").unwrap(), 7);
        assert!(Arc::ptr_eq(&r.object::<Leaf>("one").unwrap(), &a));
        assert_eq!(r.objects::<Leaf>("many").unwrap().len(), 2);
        assert_eq!(r.optional::<u32>("none").unwrap(), None);
        assert_eq!(r.optional::<u32>("absent").unwrap(), None);
    }

    #[test]
    fn reader_missing_field_is_malformed() {
        let mut r = reader(BTreeMap::new());
        assert!(matches!(
            r.value::<u32>("n"),
            Err(ResultsError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn reader_wrong_shape_is_malformed() {
        let mut r = reader(BTreeMap::from([("n".to_string(), json!("seven").into())]));
        assert!(matches!(
            r.value::<u32>("n"),
            Err(ResultsError::MalformedRecord { .. })
        ));
        let mut r = reader(BTreeMap::from([("o".to_string(), json!(1).into())]));
        assert!(matches!(
            r.object::<Leaf>("o"),
            Err(ResultsError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn empty_reference_collections_decode() {
        let mut r = reader(BTreeMap::from([
            ("l".to_string(), json!([]).into()),
            ("m".to_string(), json!({}).into()),
        ]));
        assert!(r.objects::<Leaf>("l").unwrap().is_empty());
        assert!(r.object_map::<Leaf>("m").unwrap().is_empty());
    }

    #[test]
    fn registry_decodes_registered_class() {
        let registry = TokenizableRegistry::new().with::<Leaf>();
        assert!(registry.contains("Leaf"));
        let key = TokenKey::parse("Leaf-ab").unwrap();
        let obj = registry
            .decode(&key, BTreeMap::from([("label".to_string(), json!("x").into())]))
            .unwrap();
        let leaf = downcast::<Leaf>(obj, &key).unwrap();
        assert_eq!(leaf.label, "x");
    }

    #[test]
    fn registry_rejects_unknown_class() {
        let registry = TokenizableRegistry::new();
        let key = TokenKey::parse("Mystery-ab").unwrap();
        assert!(matches!(
            registry.decode(&key, BTreeMap::new()),
            Err(ResultsError::UnknownClass(c)) if c == "Mystery"
        ));
    }
}
