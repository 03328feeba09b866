//! Evaluation contexts: the subjects (users, organizations, devices, ...) flags are evaluated for.
//!
//! A [`Context`] is either a single context of one [`Kind`] or a multi-context bundling one context
//! per kind. Contexts are immutable once built and are serialized using the LaunchDarkly context
//! schema:
//!
//! ```json
//! {"kind": "user", "key": "user-123", "name": "John Doe", "tier": "premium"}
//! {"kind": "multi", "user": {"key": "user-123"}, "organization": {"key": "org-456"}}
//! ```
use std::collections::HashSet;

use derive_more::{Display, Into};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Kind discriminator of a single context, e.g. `user` or `organization`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Into)]
pub struct Kind(String);

impl Kind {
    /// Kind used when none is specified.
    pub const DEFAULT: &'static str = "user";

    /// Validate and wrap a kind name.
    ///
    /// Kinds must be non-empty, may only contain ASCII letters, digits, `.`, `_` and `-`, and
    /// cannot be `kind` or `multi`.
    pub fn new(kind: impl Into<String>) -> Result<Kind> {
        let kind = kind.into();
        if kind.is_empty() {
            return Err(Error::InvalidContext("kind must not be empty".to_owned()));
        }
        if kind == "kind" || kind == "multi" {
            return Err(Error::InvalidContext(format!("\"{kind}\" is not a valid kind")));
        }
        if !kind
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return Err(Error::InvalidContext(format!(
                "kind \"{kind}\" contains invalid characters"
            )));
        }
        Ok(Kind(kind))
    }

    /// The kind as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A context of a single kind.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleContext {
    kind: Kind,
    key: String,
    name: Option<String>,
    anonymous: bool,
    attributes: Map<String, Value>,
}

impl SingleContext {
    /// Kind of the context.
    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    /// Stable identifier of the subject.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Optional display name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether the context is anonymous.
    pub fn anonymous(&self) -> bool {
        self.anonymous
    }

    /// Custom attributes set with [`ContextBuilder::set`].
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// JSON object representation. `kind` is omitted inside multi-contexts, where the kind is
    /// the key the object is stored under.
    pub(crate) fn to_json_map(&self, with_kind: bool) -> Map<String, Value> {
        let mut map = Map::with_capacity(self.attributes.len() + 4);
        if with_kind {
            map.insert("kind".to_owned(), self.kind.as_str().into());
        }
        map.insert("key".to_owned(), self.key.clone().into());
        if let Some(name) = &self.name {
            map.insert("name".to_owned(), name.clone().into());
        }
        if self.anonymous {
            map.insert("anonymous".to_owned(), true.into());
        }
        for (attribute, value) in &self.attributes {
            map.insert(attribute.clone(), value.clone());
        }
        map
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ContextInner {
    Single(SingleContext),
    Multi(Vec<SingleContext>),
}

/// An evaluation context. Owned by the host SDK and read-only for the hook.
///
/// # Examples
/// ```
/// # use experiment_firehose::ContextBuilder;
/// let context = ContextBuilder::new("user-123")
///     .kind("user")
///     .name("John Doe")
///     .set("tier", "premium")
///     .set("country", "US")
///     .build()
///     .unwrap();
/// assert_eq!(context.kind(), "user");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Context(ContextInner);

impl Context {
    /// Combine contexts of different kinds into a multi-context.
    ///
    /// Nested multi-contexts are flattened. A single resulting context is returned as-is rather
    /// than wrapped.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidContext`] if no contexts are given or two contexts share a kind.
    pub fn multi(contexts: impl IntoIterator<Item = Context>) -> Result<Context> {
        let mut singles = Vec::new();
        for context in contexts {
            match context.0 {
                ContextInner::Single(single) => singles.push(single),
                ContextInner::Multi(nested) => singles.extend(nested),
            }
        }

        let mut seen = HashSet::with_capacity(singles.len());
        for single in &singles {
            if !seen.insert(single.kind.as_str()) {
                return Err(Error::InvalidContext(format!(
                    "multi-context contains kind \"{}\" more than once",
                    single.kind
                )));
            }
        }

        match singles.len() {
            0 => Err(Error::InvalidContext(
                "multi-context must contain at least one context".to_owned(),
            )),
            1 => Ok(Context(ContextInner::Single(singles.remove(0)))),
            _ => Ok(Context(ContextInner::Multi(singles))),
        }
    }

    /// Whether this is a multi-context.
    pub fn is_multi(&self) -> bool {
        matches!(self.0, ContextInner::Multi(_))
    }

    /// Kind of the context, `multi` for multi-contexts.
    pub fn kind(&self) -> &str {
        match &self.0 {
            ContextInner::Single(single) => single.kind.as_str(),
            ContextInner::Multi(_) => "multi",
        }
    }

    /// Individual contexts. A single context yields itself.
    pub fn contexts(&self) -> &[SingleContext] {
        match &self.0 {
            ContextInner::Single(single) => std::slice::from_ref(single),
            ContextInner::Multi(singles) => singles,
        }
    }

    /// Individual context of the given kind.
    pub fn as_kind(&self, kind: &str) -> Option<&SingleContext> {
        self.contexts().iter().find(|it| it.kind.as_str() == kind)
    }

    /// JSON representation of the context.
    pub fn to_json(&self) -> Value {
        match &self.0 {
            ContextInner::Single(single) => Value::Object(single.to_json_map(true)),
            ContextInner::Multi(singles) => {
                let mut map = Map::with_capacity(singles.len() + 1);
                map.insert("kind".to_owned(), "multi".into());
                for single in singles {
                    map.insert(
                        single.kind.to_string(),
                        Value::Object(single.to_json_map(false)),
                    );
                }
                Value::Object(map)
            }
        }
    }
}

impl Serialize for Context {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Builder for single contexts.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    kind: String,
    key: String,
    name: Option<String>,
    anonymous: bool,
    attributes: Map<String, Value>,
}

impl ContextBuilder {
    /// Start building a context with the given key and the default `user` kind.
    pub fn new(key: impl Into<String>) -> ContextBuilder {
        ContextBuilder {
            kind: Kind::DEFAULT.to_owned(),
            key: key.into(),
            name: None,
            anonymous: false,
            attributes: Map::new(),
        }
    }

    /// Set the context kind.
    pub fn kind(mut self, kind: impl Into<String>) -> ContextBuilder {
        self.kind = kind.into();
        self
    }

    /// Replace the context key.
    pub fn key(mut self, key: impl Into<String>) -> ContextBuilder {
        self.key = key.into();
        self
    }

    /// Set the display name.
    pub fn name(mut self, name: impl Into<String>) -> ContextBuilder {
        self.name = Some(name.into());
        self
    }

    /// Mark the context as anonymous.
    pub fn anonymous(mut self, anonymous: bool) -> ContextBuilder {
        self.anonymous = anonymous;
        self
    }

    /// Set an attribute.
    ///
    /// Built-in attributes (`kind`, `key`, `name`, `anonymous`) are routed to their dedicated
    /// setters and are ignored when the value has the wrong type. `_meta` cannot be set.
    pub fn set(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> ContextBuilder {
        let attribute = attribute.into();
        let value = value.into();
        match attribute.as_str() {
            "kind" | "key" | "name" | "anonymous" | "_meta" => self.set_builtin(&attribute, value),
            _ => {
                self.attributes.insert(attribute, value);
            }
        }
        self
    }

    fn set_builtin(&mut self, attribute: &str, value: Value) {
        match (attribute, value) {
            ("kind", Value::String(kind)) => self.kind = kind,
            ("key", Value::String(key)) => self.key = key,
            ("name", Value::String(name)) => self.name = Some(name),
            ("name", Value::Null) => self.name = None,
            ("anonymous", Value::Bool(anonymous)) => self.anonymous = anonymous,
            _ => {
                log::debug!(target: "experiment_firehose",
                            "ignoring invalid value for built-in attribute {attribute}");
            }
        }
    }

    /// Build the context.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidContext`] if the key is empty or the kind is invalid.
    pub fn build(self) -> Result<Context> {
        let kind = Kind::new(self.kind)?;
        if self.key.is_empty() {
            return Err(Error::InvalidContext("key must not be empty".to_owned()));
        }
        Ok(Context(ContextInner::Single(SingleContext {
            kind,
            key: self.key,
            name: self.name,
            anonymous: self.anonymous,
            attributes: self.attributes,
        })))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Context, ContextBuilder, Kind};
    use crate::Error;

    #[test]
    fn builds_user_context_by_default() {
        let context = ContextBuilder::new("user-123")
            .name("John Doe")
            .set("tier", "premium")
            .build()
            .unwrap();

        assert!(!context.is_multi());
        assert_eq!(context.kind(), "user");
        assert_eq!(
            context.to_json(),
            json!({"kind": "user", "key": "user-123", "name": "John Doe", "tier": "premium"})
        );
    }

    #[test]
    fn set_routes_builtin_attributes() {
        let context = ContextBuilder::new("a")
            .set("key", "device-789")
            .set("kind", "device")
            .set("anonymous", true)
            .set("_meta", json!({"privateAttributes": ["os"]}))
            .set("name", 42)
            .set("os", "iOS")
            .build()
            .unwrap();

        assert_eq!(
            context.to_json(),
            json!({"kind": "device", "key": "device-789", "anonymous": true, "os": "iOS"})
        );
    }

    #[test]
    fn rejects_empty_key() {
        let result = ContextBuilder::new("").build();
        assert!(matches!(result, Err(Error::InvalidContext(_))));
    }

    #[test]
    fn validates_kind() {
        assert!(Kind::new("organization").is_ok());
        assert!(Kind::new("my.kind_v-2").is_ok());
        assert!(Kind::new("").is_err());
        assert!(Kind::new("kind").is_err());
        assert!(Kind::new("multi").is_err());
        assert!(Kind::new("with space").is_err());
    }

    #[test]
    fn multi_context_serializes_by_kind() {
        let user = ContextBuilder::new("user-123")
            .name("Jane Smith")
            .set("role", "admin")
            .build()
            .unwrap();
        let org = ContextBuilder::new("org-456")
            .kind("organization")
            .set("plan", "pro")
            .build()
            .unwrap();

        let context = Context::multi([user, org]).unwrap();

        assert!(context.is_multi());
        assert_eq!(context.kind(), "multi");
        assert_eq!(context.contexts().len(), 2);
        assert_eq!(context.as_kind("organization").unwrap().key(), "org-456");
        assert_eq!(
            serde_json::to_value(&context).unwrap(),
            json!({
                "kind": "multi",
                "user": {"key": "user-123", "name": "Jane Smith", "role": "admin"},
                "organization": {"key": "org-456", "plan": "pro"},
            })
        );
    }

    #[test]
    fn multi_context_rejects_duplicate_kinds() {
        let a = ContextBuilder::new("a").build().unwrap();
        let b = ContextBuilder::new("b").build().unwrap();

        assert!(matches!(
            Context::multi([a, b]),
            Err(Error::InvalidContext(_))
        ));
        assert!(Context::multi(Vec::new()).is_err());
    }

    #[test]
    fn multi_context_of_one_is_single() {
        let a = ContextBuilder::new("a").build().unwrap();
        let context = Context::multi([a.clone()]).unwrap();
        assert_eq!(context, a);
    }
}
