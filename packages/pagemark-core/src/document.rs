use std::cmp::Ordering;

use serde_json::Value;

use crate::ids::DocId;

/// Schemaless document body.
pub type Fields = serde_json::Map<String, Value>;

/// Field names maintained by the engines.
pub mod field {
    pub const ORDER: &str = "order";
    pub const VISIBLE: &str = "visible";
    pub const PAGE: &str = "page";
    pub const POS: &str = "pos";
    /// Page number carried by a page marker.
    pub const INDEX: &str = "index";
}

/// A stored document together with the store-managed revision counter.
///
/// `revision` starts at 1 on create and is bumped by every write; it is not part of
/// `fields` and is what compare-and-swap preconditions are checked against.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: DocId,
    pub revision: u64,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<DocId>, revision: u64, fields: Fields) -> Self {
        Self {
            id: id.into(),
            revision,
            fields,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_u64(&self, name: &str) -> Option<u64> {
        self.fields.get(name).and_then(Value::as_u64)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn order(&self) -> Option<u64> {
        self.get_u64(field::ORDER)
    }

    /// Missing or non-boolean `visible` counts as visible.
    pub fn is_visible(&self) -> bool {
        self.fields
            .get(field::VISIBLE)
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    pub fn page(&self) -> Option<u64> {
        self.get_u64(field::PAGE)
    }

    pub fn pos(&self) -> Option<u64> {
        self.get_u64(field::POS)
    }

    /// Id of the parent this document points at through `name`.
    pub fn reference(&self, name: &str) -> Option<DocId> {
        self.get_str(name).map(DocId::from)
    }

    /// Whether `value` equals the field, with a `null` value also matching a missing field.
    /// Numbers compare by value, so `1` matches `1.0`.
    pub fn field_matches(&self, name: &str, value: &Value) -> bool {
        match (self.fields.get(name), value) {
            (Some(current @ Value::Number(_)), Value::Number(_)) => {
                cmp_values(Some(current), Some(value)) == Ordering::Equal
            }
            (Some(current), _) => current == value,
            (None, _) => value.is_null(),
        }
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Total order used by `order_by`: missing/null first, then booleans, numbers, strings.
pub fn cmp_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => match (x.as_u64(), y.as_u64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => x
                    .as_f64()
                    .unwrap_or_default()
                    .partial_cmp(&y.as_f64().unwrap_or_default())
                    .unwrap_or(Ordering::Equal),
            },
        },
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Shorthand for building a `Fields` map.
///
/// ```
/// use pagemark_core::fields;
///
/// let f = fields! { "name" => "Tiramisu", "price" => 7 };
/// assert_eq!(f["price"], 7);
/// ```
#[macro_export]
macro_rules! fields {
    () => { $crate::document::Fields::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::document::Fields::new();
        $( map.insert(::std::string::String::from($key), $crate::serde_json::json!($value)); )+
        map
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn visible_defaults_to_true() {
        let doc = Document::new("a", 1, Fields::new());
        assert!(doc.is_visible());

        let hidden = Document::new("b", 1, crate::fields! { "visible" => false });
        assert!(!hidden.is_visible());
    }

    #[test]
    fn missing_values_sort_first() {
        let one = json!(1);
        assert_eq!(cmp_values(None, Some(&one)), Ordering::Less);
        assert_eq!(cmp_values(Some(&Value::Null), None), Ordering::Equal);
        assert_eq!(cmp_values(Some(&json!(2)), Some(&json!(10))), Ordering::Less);
        assert_eq!(cmp_values(Some(&json!(3)), Some(&json!("a"))), Ordering::Less);
    }

    #[test]
    fn null_filter_matches_missing_field() {
        let doc = Document::new("a", 1, crate::fields! { "category" => "drinks" });
        assert!(doc.field_matches("thread", &Value::Null));
        assert!(doc.field_matches("category", &json!("drinks")));
        assert!(!doc.field_matches("category", &json!("desserts")));
    }

    #[test]
    fn numbers_match_across_integer_and_float() {
        let doc = Document::new("a", 1, crate::fields! { "order" => 1, "price" => 2.5 });
        assert!(doc.field_matches("order", &json!(1.0)));
        assert!(doc.field_matches("order", &json!(1)));
        assert!(!doc.field_matches("order", &json!(1.5)));
        assert!(!doc.field_matches("order", &json!("1")));
        assert!(doc.field_matches("price", &json!(2.5)));
    }
}
