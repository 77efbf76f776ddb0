//! Compiles rules into a [`RuleBase`].

use std::collections::HashMap;
use std::sync::Arc;

use thicket_foundation::{EntryPointId, Error, ErrorKind, FactTemplate, Interner, KeywordId, Result};

use super::beta::{AccumulateNode, BetaNode, Declaration, JoinTest, LeftSource};
use super::{CompiledRule, EntryPointDecl, NodeId, NodeKind, ObjectTypeIndex, RuleBase, RuleId};
use crate::constraint::JoinConstraint;
use crate::rule::{Condition, Pattern, PatternBinding, Rule};

/// Collects entry points, templates, and rules, then compiles them.
#[derive(Debug)]
pub struct RuleBaseBuilder {
    interner: Interner,
    entry_points: Vec<EntryPointDecl>,
    templates: HashMap<KeywordId, FactTemplate>,
    rules: Vec<Rule>,
}

impl Default for RuleBaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleBaseBuilder {
    /// Creates a builder with only the `DEFAULT` entry point.
    #[must_use]
    pub fn new() -> Self {
        Self {
            interner: Interner::new(),
            entry_points: vec![EntryPointDecl {
                name: "DEFAULT".to_string(),
                stream: false,
            }],
            templates: HashMap::new(),
            rules: Vec::new(),
        }
    }

    /// Interns a keyword.
    pub fn keyword(&mut self, name: &str) -> KeywordId {
        self.interner.intern_keyword(name)
    }

    /// Mutable access to the interner.
    pub fn interner_mut(&mut self) -> &mut Interner {
        &mut self.interner
    }

    fn declare(&mut self, name: &str, stream: bool) -> EntryPointId {
        if let Some(i) = self.entry_points.iter().position(|ep| ep.name == name) {
            self.entry_points[i].stream |= stream;
            return EntryPointId(u32::try_from(i).unwrap_or(u32::MAX));
        }
        self.entry_points.push(EntryPointDecl {
            name: name.to_string(),
            stream,
        });
        EntryPointId(u32::try_from(self.entry_points.len() - 1).unwrap_or(u32::MAX))
    }

    /// Declares a regular entry point (idempotent).
    pub fn entry_point(&mut self, name: &str) -> EntryPointId {
        self.declare(name, false)
    }

    /// Declares a stream entry point whose facts are timestamped events.
    pub fn stream(&mut self, name: &str) -> EntryPointId {
        self.declare(name, true)
    }

    /// Registers a template; inserts of its object type are validated against it.
    pub fn add_template(&mut self, template: FactTemplate) -> &mut Self {
        self.templates.insert(template.name, template);
        self
    }

    /// Adds a rule.
    pub fn add_rule(&mut self, rule: Rule) -> &mut Self {
        self.rules.push(rule);
        self
    }

    /// Compiles everything into an immutable rule base.
    ///
    /// # Errors
    /// Returns `InvalidRule` for duplicate rule names, unknown entry points,
    /// or variables bound twice, and `UndefinedVariable` for a join that reads
    /// a variable no earlier condition binds.
    pub fn build(self) -> Result<Arc<RuleBase>> {
        let mut rule_base = RuleBase {
            entry_points: self.entry_points,
            rules: Vec::with_capacity(self.rules.len()),
            nodes: Vec::new(),
            object_types: ObjectTypeIndex::new(),
            root_consumers: Vec::new(),
            templates: self.templates,
            interner: self.interner,
        };

        for rule in self.rules {
            if rule_base.rule_id(&rule.name).is_some() {
                return Err(Error::invalid_rule(&rule.name, "duplicate rule name"));
            }
            let id = RuleId(u32::try_from(rule_base.rules.len()).unwrap_or(u32::MAX));
            let (declarations, terminal) = if rule.enabled {
                let (declarations, terminal) = rule_base.compile(id, &rule)?;
                (declarations, Some(terminal))
            } else {
                (HashMap::new(), None)
            };
            rule_base.rules.push(CompiledRule {
                id,
                rule,
                declarations,
                terminal,
            });
        }

        Ok(Arc::new(rule_base))
    }
}

/// Joins of one condition, split into indexed equalities and other tests.
struct CompiledJoins {
    index: Vec<(Declaration, KeywordId)>,
    tests: Vec<JoinTest>,
}

fn lookup(rule: &str, declarations: &HashMap<String, Declaration>, var: &str) -> Result<Declaration> {
    declarations.get(var).copied().ok_or_else(|| {
        Error::new(ErrorKind::UndefinedVariable {
            rule: rule.to_string(),
            variable: var.to_string(),
        })
    })
}

fn compile_joins(
    rule: &str,
    pattern: &Pattern,
    declarations: &HashMap<String, Declaration>,
    unify: bool,
) -> Result<CompiledJoins> {
    let mut index = Vec::new();
    let mut tests = Vec::new();
    for join in &pattern.joins {
        match join {
            JoinConstraint::Equals { field, var } => {
                index.push((lookup(rule, declarations, var)?, *field));
            }
            JoinConstraint::Compare { field, op, var } => tests.push(JoinTest::Compare {
                left: lookup(rule, declarations, var)?,
                op: *op,
                field: *field,
            }),
            JoinConstraint::Predicate(p) => {
                let vars = p
                    .vars
                    .iter()
                    .map(|v| Ok((v.clone(), lookup(rule, declarations, v)?)))
                    .collect::<Result<Vec<_>>>()?;
                tests.push(JoinTest::Predicate {
                    key: Arc::clone(&p.key),
                    vars,
                    func: Arc::clone(&p.func),
                });
            }
        }
    }
    if unify {
        // A field binding of an already bound variable is an equality join.
        for binding in &pattern.bindings {
            if let PatternBinding::Field { var, field } = binding {
                if let Some(decl) = declarations.get(var) {
                    index.push((*decl, *field));
                }
            }
        }
    }
    Ok(CompiledJoins { index, tests })
}

impl RuleBase {
    /// Points `parent`'s output at `child`; `None` means the root tuple.
    fn link(&mut self, parent: Option<NodeId>, child: NodeId) {
        let Some(parent) = parent else {
            self.root_consumers.push(child);
            return;
        };
        match self.nodes.get_mut(parent.index()) {
            Some(NodeKind::LeftInputAdapter { child: slot }) => *slot = child,
            Some(NodeKind::Join(b) | NodeKind::Not(b) | NodeKind::Exists(b)) => b.child = child,
            Some(NodeKind::Accumulate(a)) => a.beta.child = child,
            _ => {}
        }
    }

    fn compile(&mut self, id: RuleId, rule: &Rule) -> Result<(HashMap<String, Declaration>, NodeId)> {
        let name = rule.name.as_str();
        let mut declarations: HashMap<String, Declaration> = HashMap::new();
        let mut left: Option<NodeId> = None;

        for (slot, condition) in rule.conditions.iter().enumerate() {
            let pattern = condition.pattern();
            if !self.has_entry_point(pattern.entry_point) {
                return Err(Error::invalid_rule(
                    name,
                    format!("unknown entry point {:?}", pattern.entry_point),
                ));
            }
            let alpha_end = self.alpha_chain(pattern);
            let source = left.map_or(LeftSource::Root, LeftSource::Node);
            let unify = matches!(condition, Condition::Pattern(_));
            let joins = compile_joins(name, pattern, &declarations, unify)?;
            let beta = BetaNode {
                left: source,
                child: NodeId::UNLINKED,
                index: joins.index,
                tests: joins.tests,
            };

            let node = match condition {
                // First positive pattern: no earlier variables, so no joins.
                Condition::Pattern(_) if left.is_none() => self.push_node(NodeKind::LeftInputAdapter {
                    child: NodeId::UNLINKED,
                }),
                Condition::Pattern(_) => self.push_node(NodeKind::Join(beta)),
                Condition::Not(_) => self.push_node(NodeKind::Not(beta)),
                Condition::Exists(_) => self.push_node(NodeKind::Exists(beta)),
                Condition::Accumulate(acc) => self.push_node(NodeKind::Accumulate(AccumulateNode {
                    beta,
                    function: Arc::clone(&acc.function),
                    input: acc.input,
                    result_test: acc.result_test.clone(),
                })),
            };
            if !matches!(self.nodes.get(node.index()), Some(NodeKind::LeftInputAdapter { .. })) {
                self.link(left, node);
            }
            self.attach(alpha_end, node);
            left = Some(node);

            match condition {
                Condition::Pattern(p) => {
                    let before = declarations.clone();
                    for binding in &p.bindings {
                        let var = binding.var();
                        if before.contains_key(var) {
                            if matches!(binding, PatternBinding::Fact(_)) {
                                return Err(Error::invalid_rule(
                                    name,
                                    format!("fact variable ?{var} bound twice"),
                                ));
                            }
                            continue;
                        }
                        let field = match binding {
                            PatternBinding::Fact(_) => None,
                            PatternBinding::Field { field, .. } => Some(*field),
                        };
                        if declarations.insert(var.to_string(), Declaration { slot, field }).is_some() {
                            return Err(Error::invalid_rule(
                                name,
                                format!("variable ?{var} bound twice in one pattern"),
                            ));
                        }
                    }
                }
                Condition::Accumulate(acc) => {
                    let decl = Declaration { slot, field: None };
                    if declarations.insert(acc.result_var.clone(), decl).is_some() {
                        return Err(Error::invalid_rule(
                            name,
                            format!("variable ?{} bound twice", acc.result_var),
                        ));
                    }
                }
                Condition::Not(_) | Condition::Exists(_) => {}
            }
        }

        let terminal = self.push_node(NodeKind::Terminal { rule: id });
        self.link(left, terminal);
        Ok((declarations, terminal))
    }
}
