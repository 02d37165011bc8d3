//! The parsed phrase book: rule names mapped to weighted alternatives.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::preamble::Preamble;

/// Name of the reserved metadata rule.
pub const PREAMBLE: &str = "%preamble";

/// Separator between an import alias and an imported rule name.
pub const NAMESPACE_SEPARATOR: char = '.';

/// Separator between a parent rule name and the index of the alternative
/// owning an anonymous sub-rule.
pub const ANONYMOUS_SEPARATOR: char = '~';

/// A parsed argument value inside a reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArgValue {
    /// Literal text, bound as-is.
    Text(String),
    /// `$name`: the bound argument `name`, or else an expansion of rule `name`.
    Ref(String),
}

/// A `name: value` pair inside a reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub name: String,
    pub value: ArgValue,
    /// For a `$name` value renamed by an import, the name as written.
    /// Bindings are looked up under it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<String>,
}

impl Argument {
    /// Binding key read by a `$name` value, if this is one.
    pub fn binding_key(&self) -> Option<&str> {
        match &self.value {
            ArgValue::Ref(name) => Some(self.binding.as_deref().unwrap_or(name)),
            ArgValue::Text(_) => None,
        }
    }
}

/// A `{{ ... }}` placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    /// Rule name, possibly qualified (`alias.rule`). For animated
    /// references this names the interpolation curve.
    pub name: String,
    pub args: Vec<Argument>,
    pub animated: bool,
    /// The name as written, when an import qualified `name`. Bindings are
    /// looked up under it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<String>,
}

impl Reference {
    pub fn rule(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            animated: false,
            binding: None,
        }
    }

    /// Look up an argument by name. Later bindings of the same name win.
    pub fn argument(&self, name: &str) -> Option<&Argument> {
        self.args.iter().rev().find(|a| a.name == name)
    }

    pub fn arg(&self, name: &str) -> Option<&ArgValue> {
        self.argument(name).map(|a| &a.value)
    }

    /// Key under which a bare reference reads an argument binding.
    pub fn binding_key(&self) -> &str {
        self.binding.as_deref().unwrap_or(&self.name)
    }
}

/// A segment of a parsed template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Segment {
    /// Literal text, emitted as-is.
    Literal(String),
    /// Reference to another rule, a bound argument, or an animation curve.
    Reference(Reference),
}

/// A parsed template: a sequence of segments.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Template {
    pub segments: Vec<Segment>,
}

impl Template {
    /// Iterate over the references of this template, in order.
    pub fn references(&self) -> impl Iterator<Item = &Reference> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Reference(r) => Some(r),
            Segment::Literal(_) => None,
        })
    }
}

/// A weighted alternative within a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub weight: f64,
    pub template: Template,
}

/// A named rule with its ordered alternatives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDef {
    pub name: String,
    pub variants: Vec<Variant>,
}

impl RuleDef {
    pub fn total_weight(&self) -> f64 {
        self.variants.iter().map(|v| v.weight).sum()
    }
}

/// A parsed phrase book.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleTable {
    pub rules: HashMap<String, RuleDef>,
    pub preamble: Preamble,
}

impl RuleTable {
    pub fn get(&self, name: &str) -> Option<&RuleDef> {
        self.rules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Rule names in sorted order, for stable reporting.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Serialize the table to pretty RON.
    pub fn to_ron(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }
}

/// True for names generated for anonymous sub-rules.
pub fn is_anonymous(name: &str) -> bool {
    name.contains(ANONYMOUS_SEPARATOR)
}

/// Name of the anonymous sub-rule owned by alternative `index` of `parent`.
pub fn anonymous_name(parent: &str, index: usize) -> String {
    format!("{}{}{}", parent, ANONYMOUS_SEPARATOR, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str, weights: &[f64]) -> RuleDef {
        RuleDef {
            name: name.to_string(),
            variants: weights
                .iter()
                .map(|w| Variant {
                    weight: *w,
                    template: Template {
                        segments: vec![Segment::Literal(name.to_string())],
                    },
                })
                .collect(),
        }
    }

    #[test]
    fn total_weight_sums_variants() {
        assert_eq!(rule("a", &[1.0, 2.5, 0.0]).total_weight(), 3.5);
    }

    #[test]
    fn later_argument_wins() {
        let r = Reference {
            name: "circle".to_string(),
            args: vec![
                Argument {
                    name: "color".to_string(),
                    value: ArgValue::Text("red".to_string()),
                    binding: None,
                },
                Argument {
                    name: "color".to_string(),
                    value: ArgValue::Text("blue".to_string()),
                    binding: None,
                },
            ],
            animated: false,
            binding: None,
        };
        assert_eq!(r.arg("color"), Some(&ArgValue::Text("blue".to_string())));
        assert_eq!(r.arg("size"), None);
    }

    #[test]
    fn binding_key_prefers_written_name() {
        let mut r = Reference::rule("greeting");
        assert_eq!(r.binding_key(), "greeting");
        r.name = "lib.greeting".to_string();
        r.binding = Some("greeting".to_string());
        assert_eq!(r.binding_key(), "greeting");

        let text = Argument {
            name: "fill".to_string(),
            value: ArgValue::Text("red".to_string()),
            binding: None,
        };
        assert_eq!(text.binding_key(), None);
        let bound = Argument {
            name: "fill".to_string(),
            value: ArgValue::Ref("lib.color".to_string()),
            binding: Some("color".to_string()),
        };
        assert_eq!(bound.binding_key(), Some("color"));
    }

    #[test]
    fn names_are_sorted() {
        let mut table = RuleTable::default();
        for name in ["zeta", "alpha", "mid"] {
            table.rules.insert(name.to_string(), rule(name, &[1.0]));
        }
        assert_eq!(table.names(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn anonymous_names_cannot_collide_with_user_names() {
        let name = anonymous_name("root", 2);
        assert_eq!(name, "root~2");
        assert!(is_anonymous(&name));
        assert!(!is_anonymous("root"));
    }

    #[test]
    fn ron_round_trip() {
        let mut table = RuleTable::default();
        table.rules.insert("greeting".to_string(), rule("greeting", &[2.0]));
        let serialized = table.to_ron().unwrap();
        let deserialized: RuleTable = ron::from_str(&serialized).unwrap();
        assert_eq!(deserialized, table);
    }
}
