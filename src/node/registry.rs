//! Tag-based node construction for configuration files.
//!
//! Vocabulary files name nodes by stable string tags. Each tag maps to a
//! factory that builds the [`Node`] from the spec's parameters. Tags are
//! resolved once when the configuration is loaded; an unknown tag is a
//! [`GpError::UnknownTag`].

use super::{ConstRange, Node, NodeKind, Op, Primitive};
use crate::error::GpError;
use crate::types::{TypeSpec, Value, ValueType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Default loop repetition cap when a spec does not give one.
const DEFAULT_LOOP_CAP: u32 = 16;

/// Registry tags of the built-in operators.
const OP_TAGS: [(&str, Op); 16] = [
    ("add", Op::Add),
    ("sub", Op::Sub),
    ("mul", Op::Mul),
    ("div", Op::Div),
    ("mod", Op::Mod),
    ("neg", Op::Neg),
    ("abs", Op::Abs),
    ("min", Op::Min),
    ("max", Op::Max),
    ("gt", Op::Gt),
    ("lt", Op::Lt),
    ("eq", Op::Eq),
    ("and", Op::And),
    ("or", Op::Or),
    ("xor", Op::Xor),
    ("not", Op::Not),
];

/// Builds a node from its spec.
pub type NodeFactory = Arc<dyn Fn(&NodeSpec) -> Result<Node, GpError> + Send + Sync>;

/// A node as written in a configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Registry tag, e.g. `"add"` or `"erc"`.
    pub tag: String,
    /// Tag-specific parameters.
    #[serde(default)]
    pub params: NodeParams,
}

impl NodeSpec {
    /// Spec with parameters given as JSON.
    ///
    /// Non-object JSON yields empty parameters.
    #[must_use]
    pub fn new(tag: impl Into<String>, params: serde_json::Value) -> Self {
        let params = match params {
            serde_json::Value::Object(map) => NodeParams(map),
            _ => NodeParams::default(),
        };
        Self {
            tag: tag.into(),
            params,
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> GpError {
        GpError::InvalidParameter {
            tag: self.tag.clone(),
            reason: reason.into(),
        }
    }

    fn raw(&self, key: &str) -> Result<&serde_json::Value, GpError> {
        self.params
            .0
            .get(key)
            .ok_or_else(|| self.invalid(format!("missing `{key}`")))
    }

    /// Declared type from `type` and optional `sub`.
    ///
    /// # Errors
    ///
    /// Returns [`GpError::InvalidParameter`] if `type` is missing or unknown.
    pub fn type_spec(&self) -> Result<TypeSpec, GpError> {
        let value: ValueType = serde_json::from_value(self.raw("type")?.clone())
            .map_err(|e| self.invalid(format!("bad `type`: {e}")))?;
        let sub = match self.params.0.get("sub") {
            Some(raw) => Some(
                raw.as_u64()
                    .and_then(|s| u32::try_from(s).ok())
                    .ok_or_else(|| self.invalid("`sub` must be a small unsigned integer"))?,
            ),
            None => None,
        };
        Ok(TypeSpec { value, sub })
    }

    /// String parameter.
    ///
    /// # Errors
    ///
    /// Returns [`GpError::InvalidParameter`] if missing or not a string.
    pub fn string(&self, key: &str) -> Result<String, GpError> {
        self.raw(key)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.invalid(format!("`{key}` must be a string")))
    }

    /// Number parameter.
    ///
    /// # Errors
    ///
    /// Returns [`GpError::InvalidParameter`] if missing or not a number.
    pub fn number(&self, key: &str) -> Result<f64, GpError> {
        self.raw(key)?
            .as_f64()
            .ok_or_else(|| self.invalid(format!("`{key}` must be a number")))
    }

    /// Index parameter.
    ///
    /// # Errors
    ///
    /// Returns [`GpError::InvalidParameter`] if missing or not an unsigned integer.
    pub fn index(&self, key: &str) -> Result<usize, GpError> {
        self.raw(key)?
            .as_u64()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| self.invalid(format!("`{key}` must be an unsigned integer")))
    }

    /// List of types, e.g. ADF or sequence argument types.
    ///
    /// # Errors
    ///
    /// Returns [`GpError::InvalidParameter`] if missing or malformed.
    pub fn types(&self, key: &str) -> Result<Vec<TypeSpec>, GpError> {
        serde_json::from_value(self.raw(key)?.clone())
            .map_err(|e| self.invalid(format!("bad `{key}`: {e}")))
    }

    fn literal(&self, ty: ValueType) -> Result<Value, GpError> {
        let raw = self.raw("value")?;
        let value = match ty {
            ValueType::Boolean => raw.as_bool().map(Value::Boolean),
            ValueType::Integer => raw
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(Value::Integer),
            ValueType::Long => raw.as_i64().map(Value::Long),
            ValueType::Float | ValueType::Double => raw.as_f64().map(|v| Value::from_f64(ty, v)),
            ValueType::Object => raw.as_str().map(|s| Value::Object(s.to_string())),
            ValueType::Void => Some(Value::Void),
        };
        value.ok_or_else(|| self.invalid(format!("`value` is not a {ty}")))
    }
}

/// Parameters of a [`NodeSpec`], kept as raw JSON until resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeParams(pub serde_json::Map<String, serde_json::Value>);

/// Maps tags to node factories.
#[derive(Clone)]
pub struct NodeRegistry {
    factories: HashMap<String, NodeFactory>,
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<&String> = self.factories.keys().collect();
        tags.sort();
        f.debug_struct("NodeRegistry").field("tags", &tags).finish()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl NodeRegistry {
    /// Registry with no tags at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry preloaded with every built-in node kind.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();

        for (tag, op) in OP_TAGS {
            if op.is_logical() {
                registry.register(tag, move |_: &NodeSpec| Ok(Node::op(op, ValueType::Boolean)));
                continue;
            }
            registry.register(tag, move |spec: &NodeSpec| {
                let ty = spec.type_spec()?;
                if !ty.value.is_numeric() {
                    return Err(spec.invalid(format!("{ty} is not numeric")));
                }
                Ok(Node::op(op, ty))
            });
        }

        registry.register("const", |spec: &NodeSpec| {
            let ty = spec.type_spec()?;
            let value = spec.literal(ty.value)?;
            // An ERC placed in a tree keeps its range for later mutation.
            let range = match (spec.params.0.get("min"), spec.params.0.get("max")) {
                (Some(_), Some(_)) => Some(ConstRange {
                    min: spec.number("min")?,
                    max: spec.number("max")?,
                }),
                _ => None,
            };
            Ok(Node::new(NodeKind::Constant { value, range }, ty, Vec::new()))
        });
        registry.register("erc", |spec: &NodeSpec| {
            let ty = spec.type_spec()?;
            let (min, max) = (spec.number("min")?, spec.number("max")?);
            if !ty.value.is_numeric() || min > max || !min.is_finite() || !max.is_finite() {
                return Err(spec.invalid("needs a numeric type and finite min <= max"));
            }
            Ok(Node::ephemeral(ty.value, min, max))
        });
        registry.register("var", |spec: &NodeSpec| {
            Ok(Node::variable(spec.string("name")?, spec.type_spec()?))
        });
        registry.register("if", |spec: &NodeSpec| Ok(Node::if_else(spec.type_spec()?)));
        registry.register("loop", |spec: &NodeSpec| {
            let index = match spec.params.0.get("index") {
                Some(_) => Some(spec.string("index")?),
                None => None,
            };
            let cap = match spec.params.0.get("cap") {
                Some(_) => u32::try_from(spec.index("cap")?)
                    .map_err(|_| spec.invalid("`cap` too large"))?,
                None => DEFAULT_LOOP_CAP,
            };
            Ok(Node::repeat(spec.string("count")?, index, cap, spec.type_spec()?))
        });
        registry.register("seq", |spec: &NodeSpec| {
            Node::sequence(spec.types("args")?).ok_or_else(|| spec.invalid("`args` is empty"))
        });
        registry.register("store", |spec: &NodeSpec| {
            Ok(Node::store(spec.string("cell")?, spec.type_spec()?))
        });
        registry.register("read", |spec: &NodeSpec| {
            Ok(Node::read(spec.string("cell")?, spec.type_spec()?))
        });
        registry.register("adf", |spec: &NodeSpec| {
            let args = match spec.params.0.get("args") {
                Some(_) => spec.types("args")?,
                None => Vec::new(),
            };
            Ok(Node::adf_call(spec.index("target")?, spec.type_spec()?, args))
        });
        registry.register("arg", |spec: &NodeSpec| {
            Ok(Node::adf_arg(spec.index("index")?, spec.type_spec()?))
        });

        registry
    }

    /// Register (or replace) a factory for `tag`.
    pub fn register<F>(&mut self, tag: impl Into<String>, factory: F)
    where
        F: Fn(&NodeSpec) -> Result<Node, GpError> + Send + Sync + 'static,
    {
        self.factories.insert(tag.into(), Arc::new(factory));
    }

    /// Register a primitive under `tag` with fixed types.
    pub fn register_primitive(
        &mut self,
        tag: impl Into<String>,
        primitive: Primitive,
        return_type: TypeSpec,
        args: Vec<TypeSpec>,
    ) {
        self.register(tag, move |_: &NodeSpec| {
            Ok(Node::primitive(primitive.clone(), return_type, args.clone()))
        });
    }

    /// Whether `tag` is known.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    /// Build the node a spec describes.
    ///
    /// # Errors
    ///
    /// Returns [`GpError::UnknownTag`] for unregistered tags, or the
    /// factory's error for bad parameters.
    pub fn resolve(&self, spec: &NodeSpec) -> Result<Node, GpError> {
        let factory = self
            .factories
            .get(&spec.tag)
            .ok_or_else(|| GpError::UnknownTag(spec.tag.clone()))?;
        factory(spec)
    }

    /// Resolve a list of specs, failing on the first bad one.
    ///
    /// # Errors
    ///
    /// See [`NodeRegistry::resolve`].
    pub fn resolve_all(&self, specs: &[NodeSpec]) -> Result<Vec<Node>, GpError> {
        specs.iter().map(|spec| self.resolve(spec)).collect()
    }
}

fn type_json(ty: TypeSpec) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    map.insert("value".into(), ty.value.name().into());
    if let Some(sub) = ty.sub {
        map.insert("sub".into(), sub.into());
    }
    serde_json::Value::Object(map)
}

fn insert_type(params: &mut serde_json::Map<String, serde_json::Value>, ty: TypeSpec) {
    params.insert("type".into(), ty.value.name().into());
    if let Some(sub) = ty.sub {
        params.insert("sub".into(), sub.into());
    }
}

fn literal_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Boolean(b) => (*b).into(),
        Value::Integer(v) => (*v).into(),
        Value::Long(v) => (*v).into(),
        Value::Float(v) => f64::from(*v).into(),
        Value::Double(v) => (*v).into(),
        Value::Object(s) => s.as_str().into(),
        Value::Void => serde_json::Value::Null,
    }
}

impl From<&Node> for NodeSpec {
    /// Encode a node under the built-in tags, so that resolving the spec
    /// rebuilds an equal node. Primitives are tagged by their name and
    /// resolve only where they are registered under it.
    fn from(node: &Node) -> Self {
        let mut params = serde_json::Map::new();
        let ret = node.return_type;
        let arg_types = || serde_json::Value::Array(node.child_types.iter().copied().map(type_json).collect());

        let tag = match &node.kind {
            NodeKind::Constant { value, range } => {
                insert_type(&mut params, ret);
                params.insert("value".into(), literal_json(value));
                if let Some(range) = range {
                    params.insert("min".into(), range.min.into());
                    params.insert("max".into(), range.max.into());
                }
                "const".to_string()
            }
            NodeKind::Variable(name) => {
                insert_type(&mut params, ret);
                params.insert("name".into(), name.as_str().into());
                "var".to_string()
            }
            NodeKind::Op(op) => {
                if !op.is_logical() {
                    let operand = node.child_types.first().copied().unwrap_or(ret);
                    insert_type(&mut params, operand);
                }
                OP_TAGS
                    .iter()
                    .find(|(_, o)| o == op)
                    .map_or_else(|| op.symbol().to_string(), |(tag, _)| (*tag).to_string())
            }
            NodeKind::Primitive(primitive) => primitive.name().to_string(),
            NodeKind::AdfCall(target) => {
                insert_type(&mut params, ret);
                params.insert("target".into(), (*target).into());
                params.insert("args".into(), arg_types());
                "adf".to_string()
            }
            NodeKind::AdfArg(index) => {
                insert_type(&mut params, ret);
                params.insert("index".into(), (*index).into());
                "arg".to_string()
            }
            NodeKind::Store(cell) => {
                insert_type(&mut params, ret);
                params.insert("cell".into(), cell.as_str().into());
                "store".to_string()
            }
            NodeKind::Read(cell) => {
                insert_type(&mut params, ret);
                params.insert("cell".into(), cell.as_str().into());
                "read".to_string()
            }
            NodeKind::If => {
                insert_type(&mut params, ret);
                "if".to_string()
            }
            NodeKind::Loop { count, index, cap } => {
                insert_type(&mut params, ret);
                params.insert("count".into(), count.as_str().into());
                if let Some(index) = index {
                    params.insert("index".into(), index.as_str().into());
                }
                params.insert("cap".into(), (*cap).into());
                "loop".to_string()
            }
            NodeKind::Sequence => {
                params.insert("args".into(), arg_types());
                "seq".to_string()
            }
        };
        Self {
            tag,
            params: NodeParams(params),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use serde_json::json;

    #[test]
    fn test_resolve_builtins() {
        let registry = NodeRegistry::with_builtins();

        let add = registry
            .resolve(&NodeSpec::new("add", json!({"type": "integer"})))
            .unwrap();
        assert_eq!(add.kind(), &NodeKind::Op(Op::Add));
        assert_eq!(add.arity(), 2);

        let erc = registry
            .resolve(&NodeSpec::new("erc", json!({"type": "double", "min": -1.0, "max": 1.0})))
            .unwrap();
        assert!(erc.is_terminal());

        let adf = registry
            .resolve(&NodeSpec::new(
                "adf",
                json!({"target": 1, "type": "double", "args": [{"value": "double"}]}),
            ))
            .unwrap();
        assert_eq!(adf.kind(), &NodeKind::AdfCall(1));
        assert_eq!(adf.arity(), 1);
    }

    #[test]
    fn test_encoded_nodes_resolve_to_equal_nodes() {
        let registry = NodeRegistry::with_builtins();
        let int = TypeSpec::of(ValueType::Integer);
        let tagged = TypeSpec::with_sub(ValueType::Double, 2);
        let mut erc = Node::ephemeral(ValueType::Float, -1.0, 1.0);
        erc.set_value(Value::Float(0.25));
        let nodes = vec![
            Node::op(Op::Add, int),
            Node::op(Op::Gt, tagged),
            Node::op(Op::Not, ValueType::Boolean),
            Node::constant(Value::Long(-9)),
            Node::constant(Value::Object("north".into())),
            Node::constant(Value::Boolean(true)),
            erc,
            Node::variable("x", tagged),
            Node::if_else(int),
            Node::repeat("n", Some("i".to_string()), 12, int),
            Node::repeat("n", None, 3, ValueType::Void),
            Node::sequence(vec![int, tagged]).unwrap(),
            Node::store("acc", int),
            Node::read("acc", int),
            Node::adf_call(1, tagged, vec![int, tagged]),
            Node::adf_arg(1, tagged),
        ];
        for node in nodes {
            let spec = NodeSpec::from(&node);
            let wire = serde_json::to_string(&spec).unwrap();
            let back: NodeSpec = serde_json::from_str(&wire).unwrap();
            assert_eq!(registry.resolve(&back).unwrap(), node, "{wire}");
        }
    }

    #[test]
    fn test_encoded_primitive_needs_registration() {
        let double = TypeSpec::of(ValueType::Double);
        let sin = Primitive::new("sin", |args, _| {
            Ok(Value::Double(args.first().map_or(0.0, Value::to_f64).sin()))
        });
        let node = Node::primitive(sin.clone(), double, vec![double]);
        let spec = NodeSpec::from(&node);
        assert_eq!(spec.tag, "sin");

        let mut registry = NodeRegistry::with_builtins();
        assert!(matches!(registry.resolve(&spec), Err(GpError::UnknownTag(_))));
        registry.register_primitive("sin", sin, double, vec![double]);
        assert_eq!(registry.resolve(&spec).unwrap(), node);
    }

    #[test]
    fn test_unknown_tag() {
        let registry = NodeRegistry::with_builtins();
        let err = registry
            .resolve(&NodeSpec::new("teleport", json!({})))
            .unwrap_err();
        assert!(matches!(err, GpError::UnknownTag(tag) if tag == "teleport"));
    }

    #[test]
    fn test_bad_parameters() {
        let registry = NodeRegistry::with_builtins();
        let err = registry
            .resolve(&NodeSpec::new("add", json!({"type": "boolean"})))
            .unwrap_err();
        assert!(matches!(err, GpError::InvalidParameter { .. }));

        let err = registry
            .resolve(&NodeSpec::new("const", json!({"type": "integer", "value": "seven"})))
            .unwrap_err();
        assert!(matches!(err, GpError::InvalidParameter { .. }));
    }

    #[test]
    fn test_register_primitive() {
        let mut registry = NodeRegistry::empty();
        let double = TypeSpec::of(ValueType::Double);
        registry.register_primitive(
            "sin",
            Primitive::new("sin", |args, _| {
                Ok(Value::Double(args.first().map_or(0.0, Value::to_f64).sin()))
            }),
            double,
            vec![double],
        );
        let node = registry.resolve(&NodeSpec::new("sin", json!({}))).unwrap();
        assert_eq!(node.label(), "sin");
        assert!(!registry.contains("add"));
    }
}
