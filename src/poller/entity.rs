use serde::{Deserialize, Serialize};

use crate::{
    bundle::{Binding, EnumOption, Range, ValueKind, resolve_read_write},
    error::ConfigurationError,
    id::{EncodedId, Layout},
};

use super::{error::WriteError, schedule::PollingMode};

/// One configured point on a host. Immutable once the poller owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityConfig {
    pub key: String,
    pub name: String,
    pub read_id: EncodedId,
    /// falls back to `read_id`
    pub write_id: Option<EncodedId>,
    pub kind: EntityKind,
    pub unit: Option<String>,
    pub readonly: bool,
    pub polling: PollingMode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    Analog { range: Option<Range>, step: Option<f64> },
    Digital,
    Enumerated { options: Vec<EnumOption> },
}

/// Decoded form of a cached value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Reading {
    Analog(f64),
    Digital(bool),
    Enumerated(String),
    /// enumerated value without a matching option
    Unknown(f64),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum WriteValue {
    Number(f64),
    Bool(bool),
    Label(String),
}

/// Options as declared by hand, where a value may still be missing.
pub fn map_options(
    entity: &str,
    declared: Vec<(String, Option<f64>)>,
) -> Result<Vec<EnumOption>, ConfigurationError> {
    declared
        .into_iter()
        .map(|(label, value)| match value {
            Some(value) => Ok(EnumOption { label, value }),
            None => Err(ConfigurationError::UnmappedOption {
                entity: entity.to_string(),
                label,
            }),
        })
        .collect()
}

impl EntityConfig {
    pub fn from_binding(
        key: impl Into<String>,
        binding: &Binding,
        layout: Layout,
        polling: PollingMode,
    ) -> Result<Self, ConfigurationError> {
        let (read_id, write_id) = resolve_read_write(binding, layout)?;

        let kind = match binding.value_kind {
            ValueKind::Analog => EntityKind::Analog {
                range: binding.range,
                step: binding.step,
            },
            ValueKind::Digital => EntityKind::Digital,
            ValueKind::Enumerated => EntityKind::Enumerated {
                options: binding.options.clone(),
            },
        };

        let entity = Self {
            key: key.into(),
            name: binding.name.clone(),
            read_id,
            write_id: Some(write_id),
            kind,
            unit: binding.unit.clone(),
            readonly: binding.readonly.unwrap_or(false),
            polling,
        };
        entity.validate()?;
        Ok(entity)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match &self.kind {
            EntityKind::Analog { range, step } => {
                if let Some(r) = range {
                    if !(r.min <= r.max) {
                        return Err(ConfigurationError::InvalidRange {
                            entity: self.key.clone(),
                            min: r.min,
                            max: r.max,
                        });
                    }
                }
                if let Some(step) = *step {
                    if !(step > 0.0) || !step.is_finite() {
                        return Err(ConfigurationError::InvalidStep {
                            entity: self.key.clone(),
                            step,
                        });
                    }
                }
            }
            EntityKind::Digital => {}
            EntityKind::Enumerated { options } => {
                if options.is_empty() {
                    return Err(ConfigurationError::NoOptions(self.key.clone()));
                }
                for (i, opt) in options.iter().enumerate() {
                    if options[..i].iter().any(|o| o.label == opt.label) {
                        return Err(ConfigurationError::DuplicateOption {
                            entity: self.key.clone(),
                            label: opt.label.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn write_target(&self) -> &EncodedId {
        self.write_id.as_ref().unwrap_or(&self.read_id)
    }

    pub fn decode(&self, raw: f64) -> Reading {
        match &self.kind {
            EntityKind::Analog { .. } => Reading::Analog(raw),
            EntityKind::Digital => Reading::Digital(raw != 0.0),
            EntityKind::Enumerated { options } => options
                .iter()
                .find(|o| same_value(o.value, raw))
                .map(|o| Reading::Enumerated(o.label.clone()))
                .unwrap_or(Reading::Unknown(raw)),
        }
    }

    /// Number actually sent for `value`.
    pub fn encode(&self, value: &WriteValue) -> Result<f64, WriteError> {
        let mismatch = |expected| WriteError::TypeMismatch {
            entity: self.key.clone(),
            expected,
        };

        match (&self.kind, value) {
            (EntityKind::Analog { range, step }, WriteValue::Number(v)) => {
                if !v.is_finite() {
                    return Err(WriteError::NotFinite(self.key.clone()));
                }
                Ok(clamp_and_round(*v, *range, *step))
            }
            (EntityKind::Analog { .. }, _) => Err(mismatch("numeric")),

            (EntityKind::Digital, WriteValue::Bool(b)) => Ok(if *b { 1.0 } else { 0.0 }),
            (EntityKind::Digital, WriteValue::Number(v)) => Ok(if *v != 0.0 { 1.0 } else { 0.0 }),
            (EntityKind::Digital, WriteValue::Label(_)) => Err(mismatch("boolean")),

            (EntityKind::Enumerated { options }, WriteValue::Label(label)) => options
                .iter()
                .find(|o| o.label == *label)
                .map(|o| o.value)
                .ok_or_else(|| WriteError::UnknownOption {
                    entity: self.key.clone(),
                    label: label.clone(),
                }),
            (EntityKind::Enumerated { options }, WriteValue::Number(v)) => options
                .iter()
                .find(|o| same_value(o.value, *v))
                .map(|o| o.value)
                .ok_or_else(|| WriteError::UnknownOption {
                    entity: self.key.clone(),
                    label: v.to_string(),
                }),
            (EntityKind::Enumerated { .. }, WriteValue::Bool(_)) => Err(mismatch("option label")),
        }
    }
}

fn same_value(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

/// Clamps into `range`, snaps to the nearest multiple of `step` that still
/// lies inside it, then trims float noise to the step's decimals.
pub fn clamp_and_round(value: f64, range: Option<Range>, step: Option<f64>) -> f64 {
    let mut v = value;
    if let Some(r) = range {
        v = v.clamp(r.min, r.max);
    }

    let Some(step) = step.filter(|s| *s > 0.0 && s.is_finite()) else {
        return v;
    };

    let mut snapped = (v / step).round() * step;
    if let Some(r) = range {
        if snapped > r.max + 1e-9 {
            snapped -= step;
        }
        if snapped < r.min - 1e-9 {
            snapped += step;
        }
        // range narrower than one step
        snapped = snapped.clamp(r.min, r.max);
    }

    let factor = 10f64.powi(step_decimals(step));
    (snapped * factor).round() / factor
}

fn step_decimals(step: f64) -> i32 {
    (0..=6)
        .find(|p| {
            let scaled = step * 10f64.powi(*p);
            (scaled - scaled.round()).abs() < 1e-6
        })
        .unwrap_or(6)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::IdPair;

    const R_DIRECT: &str = "ACIAAAABACg-";

    fn analog(range: Option<(f64, f64)>, step: Option<f64>) -> EntityConfig {
        EntityConfig {
            key: "setpoint".to_string(),
            name: "Raumsollwert".to_string(),
            read_id: EncodedId::parse(Layout::Direct, R_DIRECT).unwrap(),
            write_id: None,
            kind: EntityKind::Analog {
                range: range.map(|(min, max)| Range { min, max }),
                step,
            },
            unit: None,
            readonly: false,
            polling: PollingMode::Fast,
        }
    }

    fn mode_entity() -> EntityConfig {
        EntityConfig {
            kind: EntityKind::Enumerated {
                options: vec![
                    EnumOption { label: "Aus".to_string(), value: 0.0 },
                    EnumOption { label: "Auto".to_string(), value: 1.0 },
                    EnumOption { label: "Komfort".to_string(), value: 3.0 },
                ],
            },
            ..analog(None, None)
        }
    }

    #[test]
    fn test_clamp_and_round() {
        let r = Some(Range { min: 5.0, max: 30.0 });
        assert_eq!(clamp_and_round(21.46, r, Some(0.5)), 21.5);
        assert_eq!(clamp_and_round(21.74, r, Some(0.5)), 21.5);
        assert_eq!(clamp_and_round(99.0, r, Some(0.5)), 30.0);
        assert_eq!(clamp_and_round(-4.0, r, Some(0.5)), 5.0);
        assert_eq!(clamp_and_round(0.30000000000000004, None, Some(0.1)), 0.3);
        assert_eq!(clamp_and_round(42.123, None, None), 42.123);
    }

    #[test]
    fn test_round_stays_in_range() {
        // nearest multiple of 2 above 9.5 would be 10
        let r = Some(Range { min: 0.5, max: 9.5 });
        assert_eq!(clamp_and_round(9.4, r, Some(2.0)), 8.0);
        // nearest multiple below 0.5 would be 0
        assert_eq!(clamp_and_round(0.6, r, Some(2.0)), 2.0);
    }

    #[test]
    fn test_encode_analog() {
        let e = analog(Some((5.0, 30.0)), Some(0.1));
        assert_eq!(e.encode(&WriteValue::Number(21.54)).unwrap(), 21.5);
        assert_eq!(e.encode(&WriteValue::Number(3.0)).unwrap(), 5.0);
        assert!(matches!(e.encode(&WriteValue::Number(f64::NAN)), Err(WriteError::NotFinite(_))));
        assert!(matches!(
            e.encode(&WriteValue::Label("on".to_string())),
            Err(WriteError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_digital() {
        let e = EntityConfig {
            kind: EntityKind::Digital,
            ..analog(None, None)
        };
        assert_eq!(e.decode(0.0), Reading::Digital(false));
        assert_eq!(e.decode(2.0), Reading::Digital(true));
        assert_eq!(e.encode(&WriteValue::Bool(true)).unwrap(), 1.0);
        assert_eq!(e.encode(&WriteValue::Number(0.0)).unwrap(), 0.0);
    }

    #[test]
    fn test_enumerated() {
        let e = mode_entity();
        assert_eq!(e.decode(1.0), Reading::Enumerated("Auto".to_string()));
        assert_eq!(e.decode(2.0), Reading::Unknown(2.0));
        assert_eq!(e.encode(&WriteValue::Label("Komfort".to_string())).unwrap(), 3.0);
        assert!(matches!(
            e.encode(&WriteValue::Label("Eco".to_string())),
            Err(WriteError::UnknownOption { label, .. }) if label == "Eco"
        ));
    }

    #[test]
    fn test_map_options() {
        let ok = map_options("mode", vec![("Aus".to_string(), Some(0.0))]).unwrap();
        assert_eq!(ok[0].value, 0.0);
        assert_eq!(
            map_options("mode", vec![("Aus".to_string(), Some(0.0)), ("Eco".to_string(), None)]),
            Err(ConfigurationError::UnmappedOption {
                entity: "mode".to_string(),
                label: "Eco".to_string()
            })
        );
    }

    #[test]
    fn test_validate() {
        assert!(matches!(
            analog(Some((30.0, 5.0)), None).validate(),
            Err(ConfigurationError::InvalidRange { .. })
        ));
        assert!(matches!(
            analog(None, Some(0.0)).validate(),
            Err(ConfigurationError::InvalidStep { .. })
        ));
        let empty = EntityConfig {
            kind: EntityKind::Enumerated { options: vec![] },
            ..analog(None, None)
        };
        assert_eq!(empty.validate(), Err(ConfigurationError::NoOptions("setpoint".to_string())));
        assert!(mode_entity().validate().is_ok());
    }

    #[test]
    fn test_from_binding() {
        let read = EncodedId::parse(Layout::Generic, "IgABAAAAKAA=").unwrap();
        let write = EncodedId::parse(Layout::Generic, "IgABAAAAKQA=").unwrap();
        let binding = Binding {
            name: "Raumsollwert".to_string(),
            read: Some(IdPair { direct: None, generic: Some(read.clone()) }),
            write: Some(IdPair { direct: None, generic: Some(write.clone()) }),
            range: Some(Range { min: 5.0, max: 30.0 }),
            step: Some(0.5),
            ..Binding::default()
        };

        let e = EntityConfig::from_binding("hk1_setpoint", &binding, Layout::Generic, PollingMode::Slow).unwrap();
        assert_eq!(e.read_id, read);
        assert_eq!(e.write_target(), &write);
        assert_eq!(e.kind, EntityKind::Analog {
            range: Some(Range { min: 5.0, max: 30.0 }),
            step: Some(0.5)
        });

        assert!(matches!(
            EntityConfig::from_binding("x", &binding, Layout::Direct, PollingMode::Fast),
            Err(ConfigurationError::NoPointId(..))
        ));
    }
}
