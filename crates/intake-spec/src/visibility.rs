use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

use crate::spec::{Effect, FieldDefinition, FieldKind, FormSpec, Target, VisibilityRule};
use crate::value::{FieldValue, FormSnapshot};

/// Field name to effective visibility, for renderers.
pub type VisibilityMap = BTreeMap<String, bool>;

/// Resolved state of one section or field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TargetState {
    pub visible: bool,
    /// `required_while_visible` of the winning rule; false while hidden.
    pub required: bool,
    /// Whether an active rule decided this state rather than the default.
    pub ruled: bool,
}

/// One target's state after a trigger was evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisibilityChange {
    pub target: Target,
    pub show: bool,
    pub required: bool,
}

/// A value copied from one branch's field into its duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorWrite {
    pub source: String,
    pub target: String,
    pub value: FieldValue,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisibilityOutcome {
    pub changes: Vec<VisibilityChange>,
    pub mirrors: Vec<MirrorWrite>,
}

/// Visibility of every section and field for one snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisibilityState {
    targets: BTreeMap<Target, TargetState>,
}

/// Resolves every section and field from scratch.
pub fn resolve_visibility(spec: &FormSpec, snapshot: &FormSnapshot) -> VisibilityState {
    let mut targets = BTreeMap::new();
    for section in &spec.sections {
        let target = Target::Section(section.id.clone());
        let state = decide(spec, snapshot, &target);
        targets.insert(target, state);
        for field in &section.fields {
            let target = Target::Field(field.name.clone());
            let state = decide(spec, snapshot, &target);
            targets.insert(target, state);
        }
    }
    VisibilityState { targets }
}

/// Re-decides every target named by rules triggered by `trigger` and collects
/// the mirror writes that the new value calls for. Does not touch `snapshot`.
pub fn evaluate(spec: &FormSpec, trigger: &str, snapshot: &FormSnapshot) -> VisibilityOutcome {
    let mut seen = BTreeSet::new();
    let mut changes = Vec::new();
    for rule in spec.visibility.iter().filter(|rule| rule.trigger == trigger) {
        for target in &rule.targets {
            if !seen.insert(target.clone()) {
                continue;
            }
            let state = decide(spec, snapshot, target);
            changes.push(VisibilityChange {
                target: target.clone(),
                show: state.visible,
                required: state.required,
            });
        }
    }

    let mirrors = spec
        .mirrors
        .iter()
        .filter(|mirror| mirror.trigger == trigger || mirror.source == trigger)
        .filter(|mirror| mirror.when.holds(snapshot.get(&mirror.trigger)))
        .filter_map(|mirror| {
            let value = snapshot.get(&mirror.source)?;
            if snapshot.get(&mirror.target) == Some(value) {
                return None;
            }
            Some(MirrorWrite {
                source: mirror.source.clone(),
                target: mirror.target.clone(),
                value: value.clone(),
            })
        })
        .collect();

    debug!(trigger, changes = changes.len(), "evaluated visibility rules");
    VisibilityOutcome { changes, mirrors }
}

fn decide(spec: &FormSpec, snapshot: &FormSnapshot, target: &Target) -> TargetState {
    let winner = spec
        .visibility
        .iter()
        .enumerate()
        .filter(|(_, rule)| rule.targets.contains(target))
        .filter(|(_, rule)| rule.when.holds(snapshot.get(&rule.trigger)))
        .max_by_key(|(index, rule)| (rule.priority, *index))
        .map(|(_, rule)| rule);

    match winner {
        Some(rule) => from_rule(rule),
        None => TargetState {
            visible: default_visibility(spec, target),
            required: false,
            ruled: false,
        },
    }
}

fn from_rule(rule: &VisibilityRule) -> TargetState {
    let visible = rule.effect == Effect::Show;
    TargetState {
        visible,
        required: visible && rule.required_while_visible,
        ruled: true,
    }
}

fn default_visibility(spec: &FormSpec, target: &Target) -> bool {
    match target {
        Target::Section(id) => spec
            .section(id)
            .map(|section| section.visible_by_default)
            .unwrap_or(true),
        Target::Field(name) => spec
            .field(name)
            .map(|field| field.visible_by_default)
            .unwrap_or(true),
    }
}

impl VisibilityState {
    /// Applies evaluated changes and returns the targets whose state actually moved.
    pub fn apply(&mut self, changes: &[VisibilityChange]) -> Vec<Target> {
        let mut moved = Vec::new();
        for change in changes {
            let next = TargetState {
                visible: change.show,
                required: change.required,
                ruled: true,
            };
            let previous = self.targets.insert(change.target.clone(), next);
            let was = previous.map(|state| (state.visible, state.required));
            if was != Some((next.visible, next.required)) {
                moved.push(change.target.clone());
            }
        }
        moved
    }

    pub fn state(&self, target: &Target) -> Option<TargetState> {
        self.targets.get(target).copied()
    }

    pub fn is_section_visible(&self, id: &str) -> bool {
        self.targets
            .get(&Target::Section(id.to_string()))
            .is_none_or(|state| state.visible)
    }

    /// A field is visible only while both it and its section are.
    pub fn is_field_visible(&self, spec: &FormSpec, name: &str) -> bool {
        let own = self
            .targets
            .get(&Target::Field(name.to_string()))
            .is_none_or(|state| state.visible);
        let section = spec
            .section_of(name)
            .is_none_or(|section| self.is_section_visible(&section.id));
        own && section
    }

    /// Required-ness contributed by the most specific active rule:
    /// a field-level rule first, then a rule on the owning section.
    pub fn dynamic_required(&self, spec: &FormSpec, name: &str) -> bool {
        if let Some(state) = self.targets.get(&Target::Field(name.to_string()))
            && state.ruled
        {
            return state.required;
        }
        spec.section_of(name)
            .and_then(|section| self.targets.get(&Target::Section(section.id.clone())))
            .is_some_and(|state| state.ruled && state.required)
    }

    pub fn to_map(&self, spec: &FormSpec) -> VisibilityMap {
        spec.fields()
            .map(|field| (field.name.clone(), self.is_field_visible(spec, &field.name)))
            .collect()
    }
}

/// Static constraint OR the dynamic requirement of the winning rule.
pub fn effective_required(
    spec: &FormSpec,
    field: &FieldDefinition,
    visibility: &VisibilityState,
) -> bool {
    field.constraint.required || visibility.dynamic_required(spec, &field.name)
}

/// Options of a multi-choice field that are disabled by its current value.
pub fn disabled_options(field: &FieldDefinition, value: Option<&FieldValue>) -> BTreeSet<String> {
    let Some(exclusive) = field.exclusive_option() else {
        return BTreeSet::new();
    };
    if value.is_some_and(|value| value.contains(&exclusive.value)) {
        field
            .options
            .iter()
            .filter(|option| !option.exclusive)
            .map(|option| option.value.clone())
            .collect()
    } else {
        BTreeSet::new()
    }
}

/// True while a mirror rule fills `name` from another field. Such a field is
/// hidden from the user but still carries a real answer.
pub fn is_mirror_target(spec: &FormSpec, name: &str, snapshot: &FormSnapshot) -> bool {
    spec.mirrors
        .iter()
        .any(|mirror| mirror.target == name && mirror.when.holds(snapshot.get(&mirror.trigger)))
}

/// Selecting the exclusive option of a group deselects every sibling.
pub fn normalize_exclusive(field: &FieldDefinition, value: FieldValue) -> FieldValue {
    if field.kind != FieldKind::MultiChoice {
        return value;
    }
    match field.exclusive_option() {
        Some(exclusive) if value.contains(&exclusive.value) => {
            FieldValue::many([exclusive.value.clone()])
        }
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use crate::spec::{ChoiceOption, Constraint, NumberFormat, Section, Transmit};

    fn choice(name: &str, options: &[&str]) -> FieldDefinition {
        FieldDefinition {
            name: name.into(),
            label: name.into(),
            kind: FieldKind::SingleChoice,
            options: options
                .iter()
                .map(|value| ChoiceOption {
                    value: value.to_string(),
                    label: value.to_string(),
                    exclusive: false,
                })
                .collect(),
            constraint: Constraint::default(),
            format: NumberFormat::default(),
            visible_by_default: true,
            transmit: Transmit::Keep,
        }
    }

    fn rule(id: &str, trigger: &str, when: Condition, effect: Effect, priority: i32) -> VisibilityRule {
        VisibilityRule {
            id: id.into(),
            trigger: trigger.into(),
            when,
            targets: vec![Target::Field("detail".into())],
            effect,
            required_while_visible: true,
            priority,
        }
    }

    fn spec(rules: Vec<VisibilityRule>) -> FormSpec {
        let mut detail = choice("detail", &["x"]);
        detail.visible_by_default = false;
        FormSpec {
            id: "rules".into(),
            title: "Rules".into(),
            version: "1".into(),
            description: None,
            presentation: None,
            sections: vec![Section {
                id: "only".into(),
                title: "Only".into(),
                optional: false,
                visible_by_default: true,
                fields: vec![
                    choice("status", &["single", "married"]),
                    choice("activity", &["active", "none"]),
                    detail,
                ],
            }],
            visibility: rules,
            mirrors: vec![],
            red_flags: vec![],
        }
    }

    #[test]
    fn inactive_rules_fall_back_to_default() {
        let spec = spec(vec![rule(
            "show",
            "activity",
            Condition::equals("active"),
            Effect::Show,
            0,
        )]);
        let state = resolve_visibility(&spec, &FormSnapshot::new());
        assert!(!state.is_field_visible(&spec, "detail"));
        assert!(!state.dynamic_required(&spec, "detail"));
    }

    #[test]
    fn higher_priority_wins_regardless_of_declaration_order() {
        let hide = rule("hide", "status", Condition::equals("single"), Effect::Hide, 5);
        let show = rule("show", "activity", Condition::equals("active"), Effect::Show, 0);
        let mut snapshot = FormSnapshot::new();
        snapshot.set("status", FieldValue::one("single"));
        snapshot.set("activity", FieldValue::one("active"));

        for rules in [vec![hide.clone(), show.clone()], vec![show, hide]] {
            let spec = spec(rules);
            let state = resolve_visibility(&spec, &snapshot);
            assert!(!state.is_field_visible(&spec, "detail"));
        }
    }

    #[test]
    fn equal_priority_goes_to_later_declaration() {
        let hide = rule("hide", "status", Condition::equals("single"), Effect::Hide, 0);
        let show = rule("show", "activity", Condition::equals("active"), Effect::Show, 0);
        let mut snapshot = FormSnapshot::new();
        snapshot.set("status", FieldValue::one("single"));
        snapshot.set("activity", FieldValue::one("active"));

        let spec_a = spec(vec![hide.clone(), show.clone()]);
        assert!(resolve_visibility(&spec_a, &snapshot).is_field_visible(&spec_a, "detail"));
        let spec_b = spec(vec![show, hide]);
        assert!(!resolve_visibility(&spec_b, &snapshot).is_field_visible(&spec_b, "detail"));
    }

    #[test]
    fn evaluate_reports_resolved_state_for_each_target_once() {
        let spec = spec(vec![
            rule("a", "activity", Condition::equals("active"), Effect::Show, 0),
            rule("b", "activity", Condition::equals("none"), Effect::Hide, 0),
        ]);
        let mut snapshot = FormSnapshot::new();
        snapshot.set("activity", FieldValue::one("active"));
        let outcome = evaluate(&spec, "activity", &snapshot);
        assert_eq!(
            outcome.changes,
            vec![VisibilityChange {
                target: Target::Field("detail".into()),
                show: true,
                required: true,
            }]
        );
    }

    #[test]
    fn apply_reports_only_moved_targets() {
        let spec = spec(vec![rule(
            "show",
            "activity",
            Condition::equals("active"),
            Effect::Show,
            0,
        )]);
        let mut snapshot = FormSnapshot::new();
        let mut state = resolve_visibility(&spec, &snapshot);
        snapshot.set("activity", FieldValue::one("active"));
        let outcome = evaluate(&spec, "activity", &snapshot);
        assert_eq!(state.apply(&outcome.changes).len(), 1);
        assert!(state.apply(&outcome.changes).is_empty());
    }

    #[test]
    fn exclusive_selection_disables_siblings() {
        let mut field = choice("meds", &["a", "b", "none"]);
        field.kind = FieldKind::MultiChoice;
        field.options[2].exclusive = true;

        let normalized = normalize_exclusive(&field, FieldValue::many(["a", "none"]));
        assert_eq!(normalized, FieldValue::many(["none"]));
        assert_eq!(
            disabled_options(&field, Some(&normalized)),
            BTreeSet::from(["a".to_string(), "b".to_string()])
        );
        assert!(disabled_options(&field, Some(&FieldValue::many(["a"]))).is_empty());
    }
}
