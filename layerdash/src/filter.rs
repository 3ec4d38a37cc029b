//! Attribute predicates applied to render layers.

use geojson::JsonObject;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Property set by the engine on cluster features.
pub const POINT_COUNT: &str = "point_count";

/// Feature predicate understood by the render engine.
///
/// Serializes into the engine expression syntax, e.g. `["==", ["get", "class"], "high"]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "Value", try_from = "Value")]
pub enum Predicate {
    /// The feature has the property.
    Has(String),
    /// Negation.
    Not(Box<Predicate>),
    /// The property equals the value.
    Eq(String, Value),
    /// All predicates hold.
    All(Vec<Predicate>),
}

impl Predicate {
    /// `property == value`.
    pub fn eq(property: impl Into<String>, value: Value) -> Self {
        Self::Eq(property.into(), value)
    }

    /// Matches cluster features.
    pub fn is_cluster() -> Self {
        Self::Has(POINT_COUNT.to_string())
    }

    /// Matches features that are not clusters.
    pub fn is_not_cluster() -> Self {
        Self::Not(Box::new(Self::is_cluster()))
    }

    /// Conjunction of `self` and `other`.
    pub fn and(self, other: Predicate) -> Self {
        match self {
            Self::All(mut items) => {
                items.push(other);
                Self::All(items)
            }
            first => Self::All(vec![first, other]),
        }
    }

    /// Evaluates the predicate against feature properties.
    pub fn matches(&self, properties: Option<&JsonObject>) -> bool {
        match self {
            Self::Has(key) => properties.is_some_and(|p| p.contains_key(key)),
            Self::Not(inner) => !inner.matches(properties),
            Self::Eq(key, value) => properties.and_then(|p| p.get(key)) == Some(value),
            Self::All(items) => items.iter().all(|item| item.matches(properties)),
        }
    }

    /// Converts the predicate into the engine expression.
    pub fn to_expression(&self) -> Value {
        match self {
            Self::Has(key) => json!(["has", key]),
            Self::Not(inner) => json!(["!", inner.to_expression()]),
            Self::Eq(key, value) => json!(["==", ["get", key], value]),
            Self::All(items) => {
                let mut expr = vec![json!("all")];
                expr.extend(items.iter().map(Predicate::to_expression));
                Value::Array(expr)
            }
        }
    }

    /// Parses an engine expression produced by [`Predicate::to_expression`].
    pub fn from_expression(value: &Value) -> Option<Self> {
        let items = value.as_array()?;
        let (op, args) = items.split_first()?;
        match (op.as_str()?, args) {
            ("has", [key]) => Some(Self::Has(key.as_str()?.to_string())),
            ("!", [inner]) => Some(Self::Not(Box::new(Self::from_expression(inner)?))),
            ("==", [getter, value]) => {
                let getter = getter.as_array()?;
                match getter.as_slice() {
                    [get, key] if get == "get" => {
                        Some(Self::Eq(key.as_str()?.to_string(), value.clone()))
                    }
                    _ => None,
                }
            }
            ("all", items) => items
                .iter()
                .map(Self::from_expression)
                .collect::<Option<Vec<_>>>()
                .map(Self::All),
            _ => None,
        }
    }
}

impl From<Predicate> for Value {
    fn from(value: Predicate) -> Self {
        value.to_expression()
    }
}

impl TryFrom<Value> for Predicate {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_expression(&value)
            .ok_or_else(|| format!("unsupported filter expression {value}"))
    }
}

/// Attribute-equality filter set on a logical layer by the dashboard.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeFilter {
    /// Feature property to compare.
    pub property: String,
    /// Value the property must equal.
    pub value: Value,
}

impl AttributeFilter {
    /// Creates a new filter.
    pub fn new(property: impl Into<String>, value: Value) -> Self {
        Self {
            property: property.into(),
            value,
        }
    }

    /// Equality predicate of the filter.
    pub fn predicate(&self) -> Predicate {
        Predicate::eq(self.property.clone(), self.value.clone())
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_compact_debug_snapshot;

    use super::*;

    fn props(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn cluster_filter_expression() {
        let predicate = Predicate::is_cluster().and(Predicate::eq("town", json!("Daan")));
        assert_eq!(
            predicate.to_expression(),
            json!(["all", ["has", "point_count"], ["==", ["get", "town"], "Daan"]])
        );
        assert_compact_debug_snapshot!(
            Predicate::is_not_cluster().to_expression(),
            @r#"Array [String("!"), Array [String("has"), String("point_count")]]"#
        );
    }

    #[test]
    fn expressions_parse_back() {
        let predicate = Predicate::is_not_cluster().and(Predicate::eq("class", json!(3)));
        let parsed = Predicate::from_expression(&predicate.to_expression());
        assert_eq!(parsed, Some(predicate));
        assert_eq!(Predicate::from_expression(&json!(["in", "a"])), None);
    }

    #[test]
    fn equality_is_strict() {
        let predicate = Predicate::eq("class", json!("3"));
        assert!(predicate.matches(Some(&props(json!({ "class": "3" })))));
        assert!(!predicate.matches(Some(&props(json!({ "class": 3 })))));
        assert!(!predicate.matches(Some(&props(json!({})))));
        assert!(!predicate.matches(None));
    }

    #[test]
    fn cluster_predicates_split_features() {
        let cluster = props(json!({ "point_count": 7, "cluster_id": 1 }));
        let point = props(json!({ "name": "shop" }));

        assert!(Predicate::is_cluster().matches(Some(&cluster)));
        assert!(!Predicate::is_cluster().matches(Some(&point)));
        assert!(Predicate::is_not_cluster().matches(Some(&point)));
        assert!(Predicate::is_not_cluster().matches(None));
    }
}
