//! Static checks over a parsed phrase book.
//!
//! Errors describe books that cannot render (a reference to nothing, a rule
//! that can never finish). Warnings describe books that render but likely
//! not as intended.

use rustc_hash::FxHashSet;
use std::fmt;

use crate::schema::rule_table::{ArgValue, Reference, RuleDef, RuleTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub severity: Severity,
    /// Rule the finding is about, when there is one.
    pub rule: Option<String>,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        write!(f, "{}: {}", label, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LintReport {
    pub findings: Vec<Finding>,
}

impl LintReport {
    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    fn push(&mut self, severity: Severity, rule: Option<&str>, message: String) {
        self.findings.push(Finding {
            severity,
            rule: rule.map(str::to_string),
            message,
        });
    }
}

/// Lint `table`, treating `root` as the entry point.
pub fn lint(table: &RuleTable, root: &str) -> LintReport {
    let mut report = LintReport::default();
    let arg_names = argument_names(table);
    let names = table.names();

    if !table.contains(root) {
        report.push(
            Severity::Warning,
            None,
            format!("No '{}' rule; the book has no default entry point", root),
        );
    }

    for name in &names {
        let rule = &table.rules[*name];
        for reference in rule_references(rule) {
            if reference.animated {
                continue;
            }
            if !table.contains(&reference.name) && !arg_names.contains(reference.name.as_str()) {
                report.push(
                    Severity::Error,
                    Some(*name),
                    format!("Rule '{}' references non-existent rule '{}'", name, reference.name),
                );
            }
            for arg in &reference.args {
                if let ArgValue::Ref(target) = &arg.value {
                    if !table.contains(target) && !arg_names.contains(target.as_str()) {
                        report.push(
                            Severity::Error,
                            Some(*name),
                            format!(
                                "Rule '{}' passes '${}' to '{}' but nothing defines it",
                                name, target, reference.name
                            ),
                        );
                    }
                }
            }
        }
        for (i, variant) in rule.variants.iter().enumerate() {
            if variant.weight == 0.0 {
                report.push(
                    Severity::Warning,
                    Some(*name),
                    format!("Rule '{}' alternative {} has zero weight and is never chosen", name, i + 1),
                );
            }
        }
    }

    let terminating = terminating_rules(table, &arg_names);
    for name in &names {
        if !terminating.contains(*name) {
            report.push(
                Severity::Error,
                Some(*name),
                format!("Rule '{}' has no alternative that can finish expanding", name),
            );
        }
    }

    if table.contains(root) {
        let reachable = reachable_rules(table, root);
        for name in &names {
            if !reachable.contains(*name) {
                report.push(
                    Severity::Warning,
                    Some(*name),
                    format!("Rule '{}' is never reached from '{}'", name, root),
                );
            }
        }
    }

    report
}

fn rule_references(rule: &RuleDef) -> impl Iterator<Item = &Reference> {
    rule.variants.iter().flat_map(|v| v.template.references())
}

/// Every name bound as an argument somewhere in the book. A bare reference
/// to one of these may be satisfied by a binding at render time.
fn argument_names(table: &RuleTable) -> FxHashSet<&str> {
    table
        .rules
        .values()
        .flat_map(rule_references)
        .flat_map(|r| r.args.iter().map(|a| a.name.as_str()))
        .collect()
}

/// Least fixpoint of "has a positive-weight alternative whose references
/// all terminate". Unknown names count as terminating; they are reported
/// separately.
fn terminating_rules<'t>(table: &'t RuleTable, arg_names: &FxHashSet<&str>) -> FxHashSet<&'t str> {
    let mut done: FxHashSet<&str> = FxHashSet::default();
    loop {
        let mut changed = false;
        for (name, rule) in &table.rules {
            if done.contains(name.as_str()) {
                continue;
            }
            let finishes = rule.variants.iter().filter(|v| v.weight > 0.0).any(|v| {
                v.template.references().all(|r| {
                    let settled = |target: &str| {
                        done.contains(target)
                            || arg_names.contains(target)
                            || !table.contains(target)
                    };
                    r.animated
                        || (settled(r.name.as_str())
                            && r.args.iter().all(|a| match &a.value {
                                ArgValue::Ref(target) => settled(target.as_str()),
                                ArgValue::Text(_) => true,
                            }))
                })
            });
            if finishes {
                done.insert(name.as_str());
                changed = true;
            }
        }
        if !changed {
            return done;
        }
    }
}

fn reachable_rules<'t>(table: &'t RuleTable, root: &str) -> FxHashSet<&'t str> {
    let mut seen = FxHashSet::default();
    let mut stack: Vec<&RuleDef> = table.get(root).into_iter().collect();
    while let Some(rule) = stack.pop() {
        if !seen.insert(rule.name.as_str()) {
            continue;
        }
        for reference in rule_references(rule) {
            let targets = std::iter::once(reference.name.as_str()).chain(
                reference.args.iter().filter_map(|a| match &a.value {
                    ArgValue::Ref(target) => Some(target.as_str()),
                    ArgValue::Text(_) => None,
                }),
            );
            for target in targets {
                if let Some(next) = table.get(target) {
                    if !seen.contains(next.name.as_str()) {
                        stack.push(next);
                    }
                }
            }
        }
    }
    seen
}
