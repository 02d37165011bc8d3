//! Expansion interpreter: renders one rule of a [`RuleTable`] to text.
//!
//! Choices are drawn from generator sub-streams keyed by the structural
//! path to the choice point, never from a running counter, so a render is a
//! pure function of (table, rule, arguments, seed, t).

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::trace;

use crate::core::animate::{self, Curve, DEFAULT_DECIMALS, MAX_DECIMALS};
use crate::core::rng::{Generator, PathPart};
use crate::core::seed::Seed;
use crate::schema::rule_table::{ArgValue, Reference, RuleDef, RuleTable, Segment, Variant};

/// Default bound on reference nesting.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Largest nesting limit accepted. Expansion recurses natively, so the
/// limit has to stay well inside the smallest thread stack it runs on.
pub const MAX_DEPTH_LIMIT: usize = 256;

/// Argument bindings visible while expanding a rule.
pub type Bindings = FxHashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpandError {
    #[error("unknown rule '{0}'")]
    UnknownRule(String),
    #[error("recursion limit of {limit} reached while expanding '{rule}'")]
    RecursionLimit { rule: String, limit: usize },
    #[error("rule '{0}' has no alternative with positive weight")]
    EmptyRule(String),
    #[error("invalid argument '{name}' for '{rule}': {reason}")]
    InvalidArgument {
        rule: String,
        name: String,
        reason: String,
    },
}

/// Render `root` with the default depth limit.
pub fn generate(
    table: &RuleTable,
    root: &str,
    args: &Bindings,
    seed: &Seed,
    t: f64,
) -> Result<String, ExpandError> {
    Interpreter::new(table).expand(root, args, &Generator::from_seed(seed), t)
}

/// Read-only view of a table that expands rules.
#[derive(Debug, Clone, Copy)]
pub struct Interpreter<'a> {
    table: &'a RuleTable,
    max_depth: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(table: &'a RuleTable) -> Self {
        Self {
            table,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Set the nesting limit, clamped to [`MAX_DEPTH_LIMIT`].
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.min(MAX_DEPTH_LIMIT);
        self
    }

    /// Expand `name` at depth zero below `generator`.
    pub fn expand(
        &self,
        name: &str,
        args: &Bindings,
        generator: &Generator,
        t: f64,
    ) -> Result<String, ExpandError> {
        let mut out = String::new();
        self.expand_rule(name, args, generator, t, 0, &mut out)?;
        Ok(out)
    }

    fn expand_rule(
        &self,
        name: &str,
        bindings: &Bindings,
        generator: &Generator,
        t: f64,
        depth: usize,
        out: &mut String,
    ) -> Result<(), ExpandError> {
        if depth > self.max_depth {
            return Err(ExpandError::RecursionLimit {
                rule: name.to_string(),
                limit: self.max_depth,
            });
        }
        let rule = self
            .table
            .get(name)
            .ok_or_else(|| ExpandError::UnknownRule(name.to_string()))?;

        let choice = generator.sub_stream([name]);
        let (index, variant) = choose(rule, &choice)?;
        trace!(rule = name, variant = index, depth, "selected variant");

        for (i, segment) in variant.template.segments.iter().enumerate() {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Reference(r) => {
                    let stream = choice.sub_stream([index, i]);
                    self.render_reference(r, bindings, &stream, t, depth, out)?;
                }
            }
        }
        Ok(())
    }

    fn render_reference(
        &self,
        reference: &Reference,
        bindings: &Bindings,
        stream: &Generator,
        t: f64,
        depth: usize,
        out: &mut String,
    ) -> Result<(), ExpandError> {
        if reference.animated {
            out.push_str(&self.animate(reference, bindings, t)?);
            return Ok(());
        }

        if reference.args.is_empty() {
            if let Some(value) = bindings.get(reference.binding_key()) {
                out.push_str(value);
                return Ok(());
            }
            return self.expand_rule(&reference.name, bindings, stream, t, depth + 1, out);
        }

        let mut scoped = bindings.clone();
        for (k, arg) in reference.args.iter().enumerate() {
            let value = match &arg.value {
                ArgValue::Text(text) => text.clone(),
                ArgValue::Ref(name) => match arg.binding_key().and_then(|key| bindings.get(key)) {
                    Some(bound) => bound.clone(),
                    None => {
                        let arg_stream =
                            stream.sub_stream([PathPart::Name("$arg"), PathPart::Index(k as u64)]);
                        let mut value = String::new();
                        self.expand_rule(name, bindings, &arg_stream, t, depth + 1, &mut value)?;
                        value
                    }
                },
            };
            scoped.insert(arg.name.clone(), value);
        }
        self.expand_rule(&reference.name, &scoped, stream, t, depth + 1, out)
    }

    fn animate(
        &self,
        reference: &Reference,
        bindings: &Bindings,
        t: f64,
    ) -> Result<String, ExpandError> {
        let curve = Curve::from_name(&reference.name)
            .ok_or_else(|| ExpandError::UnknownRule(reference.name.clone()))?;
        let from = numeric_arg(reference, "from", bindings)?.unwrap_or(0.0);
        let to = numeric_arg(reference, "to", bindings)?.unwrap_or(1.0);
        let decimals = match numeric_arg(reference, "decimals", bindings)? {
            None => DEFAULT_DECIMALS,
            Some(d) if d.fract() == 0.0 && (0.0..=MAX_DECIMALS as f64).contains(&d) => d as usize,
            Some(d) => {
                return Err(ExpandError::InvalidArgument {
                    rule: reference.name.clone(),
                    name: "decimals".to_string(),
                    reason: format!("expected a whole number from 0 to {}, got {}", MAX_DECIMALS, d),
                })
            }
        };
        Ok(animate::format_number(
            animate::interpolate(curve, from, to, t),
            decimals,
        ))
    }
}

/// Weighted choice: the first variant whose cumulative weight exceeds the
/// scaled draw.
fn choose<'r>(rule: &'r RuleDef, stream: &Generator) -> Result<(usize, &'r Variant), ExpandError> {
    let total = rule.total_weight();
    if !(total > 0.0) {
        return Err(ExpandError::EmptyRule(rule.name.clone()));
    }
    let draw = stream.unit() * total;
    let mut cumulative = 0.0;
    for (i, variant) in rule.variants.iter().enumerate() {
        cumulative += variant.weight;
        if cumulative > draw {
            return Ok((i, variant));
        }
    }
    // Float rounding can leave the draw at the very top of the range.
    rule.variants
        .iter()
        .enumerate()
        .rev()
        .find(|(_, v)| v.weight > 0.0)
        .ok_or_else(|| ExpandError::EmptyRule(rule.name.clone()))
}

fn numeric_arg(
    reference: &Reference,
    name: &str,
    bindings: &Bindings,
) -> Result<Option<f64>, ExpandError> {
    let invalid = |reason: String| ExpandError::InvalidArgument {
        rule: reference.name.clone(),
        name: name.to_string(),
        reason,
    };
    let Some(arg) = reference.argument(name) else {
        return Ok(None);
    };
    let raw = match &arg.value {
        ArgValue::Text(text) => text.as_str(),
        ArgValue::Ref(bound) => {
            let key = arg.binding.as_deref().unwrap_or(bound);
            bindings
                .get(key)
                .map(String::as_str)
                .ok_or_else(|| invalid(format!("'${}' is not a bound argument", key)))?
        }
    };
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(Some)
        .ok_or_else(|| invalid(format!("'{}' is not a number", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grammar::parse;

    fn seed(token: &str) -> Seed {
        Seed::new(token).unwrap()
    }

    fn render(source: &str, token: &str) -> Result<String, ExpandError> {
        let table = parse(source).unwrap();
        generate(&table, "root", &Bindings::default(), &seed(token), 0.0)
    }

    #[test]
    fn single_variant_rules_ignore_seed() {
        let source = "root:\n- Dear {{ giver }}, thank you for the {{ object }}.\ngiver:\n- Aunt Emma\nobject:\n- purple vase\n";
        for token in ["0", "k3x9", "zzzzzzzz"] {
            assert_eq!(
                render(source, token).unwrap(),
                "Dear Aunt Emma, thank you for the purple vase."
            );
        }
    }

    #[test]
    fn unknown_reference() {
        assert_eq!(
            render("root:\n- {{ nonexistent }}\n", "abc"),
            Err(ExpandError::UnknownRule("nonexistent".to_string()))
        );
    }

    #[test]
    fn missing_root() {
        assert_eq!(
            render("other:\n- x\n", "abc"),
            Err(ExpandError::UnknownRule("root".to_string()))
        );
    }

    #[test]
    fn same_inputs_same_output() {
        let source = "root:\n- {{ a }} {{ a }} {{ a }}\na:\n- 1\n- 2\n- 3\n- 4\n- 5\n";
        for token in ["a", "b", "c0", "zz9"] {
            assert_eq!(render(source, token), render(source, token));
        }
    }

    #[test]
    fn repeated_references_draw_independently() {
        let source = "root:\n- {{ a }}{{ a }}{{ a }}{{ a }}{{ a }}{{ a }}\na:\n- x\n- y\n";
        let mut mixed = false;
        let mut token = "a".to_string();
        for _ in 0..20 {
            let out = render(source, &token).unwrap();
            if out.contains('x') && out.contains('y') {
                mixed = true;
                break;
            }
            token = crate::core::seed::increment(&token).unwrap();
        }
        assert!(mixed, "expected independent choices per occurrence");
    }

    #[test]
    fn seed_changes_choices() {
        let source = "root:\n- {{ n }}\nn:\n- 1\n- 2\n- 3\n- 4\n- 5\n- 6\n- 7\n- 8\n";
        let first = render(source, "a").unwrap();
        let differs = ["b", "c", "d", "e", "f", "g", "h", "i"]
            .iter()
            .any(|t| render(source, t).unwrap() != first);
        assert!(differs);
    }

    #[test]
    fn zero_weight_variants_are_never_chosen() {
        let source = "root:\n- [0] never\n- sometimes\n- [0] never\n- often\n";
        let mut token = "0".to_string();
        for _ in 0..200 {
            assert!(!render(source, &token).unwrap().contains("never"));
            token = crate::core::seed::increment(&token).unwrap();
        }
    }

    #[test]
    fn direct_recursion_hits_limit() {
        let result = render("root:\n- again {{ root }}\n", "abc");
        assert!(matches!(
            result,
            Err(ExpandError::RecursionLimit { ref rule, limit: 64 }) if rule == "root"
        ));
    }

    #[test]
    fn transitive_recursion_hits_limit_for_small_limits() {
        let table = parse("root:\n- {{ ping }}\nping:\n- {{ pong }}\npong:\n- {{ ping }}\n").unwrap();
        for limit in [1, 2, 5] {
            let result = Interpreter::new(&table).with_max_depth(limit).expand(
                "root",
                &Bindings::default(),
                &Generator::from_seed(&seed("abc")),
                0.0,
            );
            assert!(matches!(result, Err(ExpandError::RecursionLimit { .. })));
        }
    }

    #[test]
    fn oversized_limit_is_clamped() {
        let table = parse("root:\n- x{{ root }}\n").unwrap();
        let result = Interpreter::new(&table).with_max_depth(5_000).expand(
            "root",
            &Bindings::default(),
            &Generator::from_seed(&seed("abc")),
            0.0,
        );
        assert!(matches!(
            result,
            Err(ExpandError::RecursionLimit { limit: MAX_DEPTH_LIMIT, .. })
        ));
    }

    #[test]
    fn terminating_recursion_succeeds() {
        let source = "root:\n- {{ chain }}\nchain:\n- [1] .\n- [1] .{{ chain }}\n";
        let out = render(source, "k3x9").unwrap();
        assert!(!out.is_empty());
        assert!(out.chars().all(|c| c == '.'));
    }

    #[test]
    fn arguments_bind_and_shadow() {
        let source = "root:\n- {{ card(name: Emma) }} / {{ card(name: \"Bob\", greeting: Hey) }}\ncard:\n- {{ greeting }} {{ name }}\ngreeting:\n- Dear\n";
        assert_eq!(render(source, "abc").unwrap(), "Dear Emma / Hey Bob");
    }

    #[test]
    fn arguments_are_inherited() {
        let source = "root:\n- {{ outer(color: red) }}\nouter:\n- ({{ inner }})\ninner:\n- {{ color }}\n";
        assert_eq!(render(source, "abc").unwrap(), "(red)");
    }

    #[test]
    fn dollar_arguments_read_bindings_or_expand_rules() {
        let source = "root:\n- {{ pair(a: $word, b: x) }}\npair:\n- {{ copy(c: $b) }}{{ a }}\ncopy:\n- {{ c }}\nword:\n- hello\n";
        assert_eq!(render(source, "abc").unwrap(), "xhello");
    }

    #[test]
    fn top_level_arguments() {
        let table = parse("root:\n- Hi {{ who }}\n").unwrap();
        let mut args = Bindings::default();
        args.insert("who".to_string(), "there".to_string());
        assert_eq!(
            generate(&table, "root", &args, &seed("a"), 0.0).unwrap(),
            "Hi there"
        );
    }

    #[test]
    fn anonymous_sub_rules_expand() {
        let out = render("root:\n- <g>{{ _ }}</g>\n  - <circle/>\n", "abc").unwrap();
        assert_eq!(out, "<g><circle/></g>");
    }

    #[test]
    fn animated_values_follow_t() {
        let table = parse("root:\n- {{ ~lerp(from: 0, to: 100) }}|{{ ~ease_in(from: 0, to: 10, decimals: 1) }}\n").unwrap();
        let at = |t| generate(&table, "root", &Bindings::default(), &seed("a"), t).unwrap();
        assert_eq!(at(0.0), "0|0");
        assert_eq!(at(0.5), "50|2.5");
        assert_eq!(at(0.2), "20|0.4");
    }

    #[test]
    fn animated_endpoints_from_arguments() {
        let source = "root:\n- {{ grow(size: 40) }}\ngrow:\n- {{ ~linear(from: 0, to: $size) }}\n";
        let table = parse(source).unwrap();
        let out = generate(&table, "root", &Bindings::default(), &seed("a"), 0.5).unwrap();
        assert_eq!(out, "20");
    }

    #[test]
    fn animation_keeps_discrete_choices() {
        let source = "root:\n- {{ color }} circle r={{ ~lerp(from: 0, to: 100) }}\n- {{ color }} square s={{ ~ease(from: 10, to: 20) }}\ncolor:\n- red\n- green\n- blue\n- amber\n";
        let table = parse(source).unwrap();
        let mut token = "q".to_string();
        for _ in 0..25 {
            let s = seed(&token);
            let frames: Vec<String> = (0..10)
                .map(|i| generate(&table, "root", &Bindings::default(), &s, i as f64 / 10.0).unwrap())
                .collect();
            let discrete: Vec<&str> = frames.iter().map(|f| f.split('=').next().unwrap()).collect();
            assert!(discrete.iter().all(|d| *d == discrete[0]), "{:?}", frames);
            assert_ne!(frames[0], frames[5]);
            token = crate::core::seed::increment(&token).unwrap();
        }
    }

    #[test]
    fn unknown_curve() {
        assert_eq!(
            render("root:\n- {{ ~wobble(from: 0) }}\n", "a"),
            Err(ExpandError::UnknownRule("wobble".to_string()))
        );
    }

    #[test]
    fn invalid_animation_arguments() {
        assert!(matches!(
            render("root:\n- {{ ~lerp(from: big) }}\n", "a"),
            Err(ExpandError::InvalidArgument { .. })
        ));
        assert!(matches!(
            render("root:\n- {{ ~lerp(decimals: 1.5) }}\n", "a"),
            Err(ExpandError::InvalidArgument { .. })
        ));
        assert!(matches!(
            render("root:\n- {{ ~lerp(to: $missing) }}\n", "a"),
            Err(ExpandError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn choose_skips_trailing_zero_weight() {
        let rule = RuleDef {
            name: "r".to_string(),
            variants: vec![
                Variant {
                    weight: 1.0,
                    template: Default::default(),
                },
                Variant {
                    weight: 0.0,
                    template: Default::default(),
                },
            ],
        };
        let (index, _) = choose(&rule, &Generator::from_seed(&seed("a"))).unwrap();
        assert_eq!(index, 0);
    }
}
