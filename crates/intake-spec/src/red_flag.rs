use std::str::FromStr;

use serde::Serialize;

use crate::spec::{FormSpec, RedFlagRule, Severity};
use crate::value::FormSnapshot;

/// Youngest age accepted by the age field.
pub const AGE_FLOOR: i64 = 11;
/// Oldest age accepted by the age field.
pub const AGE_CEILING: i64 = 99;
/// Below this age the patient is a minor.
pub const ADULT_AGE: i64 = 18;
/// Above this age an in-person consultation is advised.
pub const ELDERLY_AGE: i64 = 80;

pub const MINOR_MESSAGE: &str = "RED FLAG: Patient is a minor. Cannot proceed with online consultation. Decline call and document.";
pub const ELDERLY_MESSAGE: &str = "WARNING: In-person consultation required for elderly patients (age 80+). Flag for doctor review.";

/// Emergency symptom codes offered by the emergency question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencySymptom {
    SeverePain,
    Blood,
    Priapism,
    None,
}

impl EmergencySymptom {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmergencySymptom::SeverePain => "severe_pain",
            EmergencySymptom::Blood => "blood",
            EmergencySymptom::Priapism => "priapism",
            EmergencySymptom::None => "none",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            EmergencySymptom::SeverePain => {
                "RED FLAG: Severe pain reported. Stop the call and direct the patient to emergency care."
            }
            EmergencySymptom::Blood => {
                "RED FLAG: Blood in urine or semen reported. Stop the call and refer for urgent in-person evaluation."
            }
            EmergencySymptom::Priapism => {
                "RED FLAG: Erection lasting over 4 hours reported. Direct the patient to the emergency room immediately."
            }
            EmergencySymptom::None => "",
        }
    }
}

impl FromStr for EmergencySymptom {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "severe_pain" => Ok(EmergencySymptom::SeverePain),
            "blood" => Ok(EmergencySymptom::Blood),
            "priapism" => Ok(EmergencySymptom::Priapism),
            "none" => Ok(EmergencySymptom::None),
            other => Err(format!("unknown emergency symptom '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "code", rename_all = "snake_case")]
pub enum FlagKind {
    Minor,
    Elderly,
    Emergency(EmergencySymptom),
    Selection(String),
}

/// A raised safety concern. Reported beside, never inside, validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedFlag {
    pub kind: FlagKind,
    pub severity: Severity,
    pub field: String,
    pub message: String,
}

/// Flags an age inside the accepted domain. Ages outside [11, 99] are left
/// to the validator's range check and raise nothing here.
pub fn check_age_boundaries(age: i64) -> Option<RedFlag> {
    if !(AGE_FLOOR..=AGE_CEILING).contains(&age) {
        return None;
    }
    if age < ADULT_AGE {
        Some(RedFlag {
            kind: FlagKind::Minor,
            severity: Severity::Block,
            field: String::new(),
            message: MINOR_MESSAGE.into(),
        })
    } else if age > ELDERLY_AGE {
        Some(RedFlag {
            kind: FlagKind::Elderly,
            severity: Severity::Warning,
            field: String::new(),
            message: ELDERLY_MESSAGE.into(),
        })
    } else {
        None
    }
}

/// Any emergency code other than `none` blocks the form. Unknown codes are
/// left to option validation.
pub fn check_emergency_symptom(selection: &str) -> Option<RedFlag> {
    let symptom = selection.parse::<EmergencySymptom>().ok()?;
    if symptom == EmergencySymptom::None {
        return None;
    }
    Some(RedFlag {
        kind: FlagKind::Emergency(symptom),
        severity: Severity::Block,
        field: String::new(),
        message: symptom.message().into(),
    })
}

/// Flags currently raised by a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RedFlagReport {
    pub flags: Vec<RedFlag>,
}

impl RedFlagReport {
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Any active block disables submission.
    pub fn blocks_submission(&self) -> bool {
        self.flags.iter().any(|flag| flag.severity == Severity::Block)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &RedFlag> {
        self.flags
            .iter()
            .filter(|flag| flag.severity == Severity::Block)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &RedFlag> {
        self.flags
            .iter()
            .filter(|flag| flag.severity == Severity::Warning)
    }

    /// Fields whose value raised an active block; these stay editable while locked.
    pub fn blocking_fields(&self) -> impl Iterator<Item = &str> {
        self.blocks().map(|flag| flag.field.as_str())
    }
}

/// Runs every red-flag rule of the form against the snapshot.
pub fn detect(spec: &FormSpec, snapshot: &FormSnapshot) -> RedFlagReport {
    let flags = spec
        .red_flags
        .iter()
        .filter_map(|rule| check_rule(rule, snapshot))
        .collect();
    RedFlagReport { flags }
}

fn check_rule(rule: &RedFlagRule, snapshot: &FormSnapshot) -> Option<RedFlag> {
    let value = snapshot.get(rule.field())?;
    let flag = match rule {
        RedFlagRule::AgeBoundary { .. } => {
            let age = value.as_scalar()?.trim().parse::<i64>().ok()?;
            check_age_boundaries(age)
        }
        RedFlagRule::Emergency { .. } => check_emergency_symptom(value.as_scalar()?.trim()),
        RedFlagRule::Selection {
            values,
            severity,
            code,
            message,
            ..
        } => values
            .iter()
            .any(|candidate| value.contains(candidate))
            .then(|| RedFlag {
                kind: FlagKind::Selection(code.clone()),
                severity: *severity,
                field: String::new(),
                message: message.clone(),
            }),
    }?;
    Some(RedFlag {
        field: rule.field().to_string(),
        ..flag
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(age: i64) -> Option<FlagKind> {
        check_age_boundaries(age).map(|flag| flag.kind)
    }

    #[test]
    fn age_zones_are_exact_at_every_boundary() {
        assert_eq!(kind(10), None);
        assert_eq!(kind(11), Some(FlagKind::Minor));
        assert_eq!(kind(12), Some(FlagKind::Minor));
        assert_eq!(kind(17), Some(FlagKind::Minor));
        assert_eq!(kind(18), None);
        assert_eq!(kind(19), None);
        assert_eq!(kind(79), None);
        assert_eq!(kind(80), None);
        assert_eq!(kind(81), Some(FlagKind::Elderly));
        assert_eq!(kind(98), Some(FlagKind::Elderly));
        assert_eq!(kind(99), Some(FlagKind::Elderly));
        assert_eq!(kind(100), None);
    }

    #[test]
    fn age_zones_cover_the_domain_without_overlap() {
        for age in AGE_FLOOR..=AGE_CEILING {
            let minor = (AGE_FLOOR..ADULT_AGE).contains(&age);
            let clear = (ADULT_AGE..=ELDERLY_AGE).contains(&age);
            let elderly = age > ELDERLY_AGE && age <= AGE_CEILING;
            assert_eq!(
                [minor, clear, elderly].iter().filter(|zone| **zone).count(),
                1,
                "age {age}"
            );
            match kind(age) {
                Some(FlagKind::Minor) => assert!(minor),
                Some(FlagKind::Elderly) => assert!(elderly),
                None => assert!(clear),
                other => panic!("unexpected flag {other:?}"),
            }
        }
    }

    #[test]
    fn minor_blocks_and_elderly_only_warns() {
        assert_eq!(
            check_age_boundaries(16).map(|flag| flag.severity),
            Some(Severity::Block)
        );
        assert_eq!(
            check_age_boundaries(85).map(|flag| flag.severity),
            Some(Severity::Warning)
        );
    }

    #[test]
    fn every_emergency_code_except_none_blocks() {
        for code in ["severe_pain", "blood", "priapism"] {
            let flag = check_emergency_symptom(code).expect("flag");
            assert_eq!(flag.severity, Severity::Block);
        }
        assert!(check_emergency_symptom("none").is_none());
        assert!(check_emergency_symptom("unknown").is_none());
    }
}
