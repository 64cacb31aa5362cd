use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SensorcastError};

/// Suffix of the per-sensor data-quality column.
pub const ERROR_FLAG_SUFFIX: &str = "_error_flag";

/// Index of a sensor within its [`SensorSet`].
///
/// Ids are only meaningful relative to the set that issued them; the set is
/// fixed for the lifetime of a pipeline instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SensorId(u16);

impl SensorId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The closed, ordered set of monitored sensors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorSet {
    names: Vec<String>,
}

impl SensorSet {
    /// Build a sensor set, rejecting empty, blank, or duplicate names.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for name in names {
            let name = name.into().trim().to_string();
            if name.is_empty() {
                return Err(SensorcastError::Config {
                    key: "TARGETS".to_string(),
                    reason: "sensor names must not be blank".to_string(),
                });
            }
            if out.contains(&name) {
                return Err(SensorcastError::Config {
                    key: "TARGETS".to_string(),
                    reason: format!("duplicate sensor '{}'", name),
                });
            }
            out.push(name);
        }
        if out.is_empty() {
            return Err(SensorcastError::Config {
                key: "TARGETS".to_string(),
                reason: "at least one sensor is required".to_string(),
            });
        }
        if out.len() > u16::MAX as usize {
            return Err(SensorcastError::Config {
                key: "TARGETS".to_string(),
                reason: format!("too many sensors ({})", out.len()),
            });
        }
        Ok(Self { names: out })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = SensorId> + '_ {
        (0..self.names.len()).map(|i| SensorId(i as u16))
    }

    pub fn iter(&self) -> impl Iterator<Item = (SensorId, &str)> + '_ {
        self.names
            .iter()
            .enumerate()
            .map(|(i, n)| (SensorId(i as u16), n.as_str()))
    }

    pub fn name(&self, id: SensorId) -> &str {
        &self.names[id.index()]
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn id_of(&self, name: &str) -> Option<SensorId> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| SensorId(i as u16))
    }

    /// Resolve a name or fail with [`SensorcastError::UnknownSensor`].
    pub fn require(&self, name: &str) -> Result<SensorId> {
        self.id_of(name)
            .ok_or_else(|| SensorcastError::UnknownSensor(name.to_string()))
    }

    /// Name of the data-quality flag column for a sensor.
    pub fn flag_column(&self, id: SensorId) -> String {
        format!("{}{}", self.name(id), ERROR_FLAG_SUFFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_follow_declaration_order() {
        let set = SensorSet::new(["current", "temperature", "z_rms"]).unwrap();
        let names: Vec<&str> = set.iter().map(|(_, n)| n).collect();
        assert_eq!(names, vec!["current", "temperature", "z_rms"]);
        assert_eq!(set.id_of("z_rms").unwrap().index(), 2);
        assert!(set.id_of("noise").is_none());
    }

    #[test]
    fn rejects_duplicates_and_blanks() {
        assert!(SensorSet::new(["a", "a"]).is_err());
        assert!(SensorSet::new(["a", " "]).is_err());
        assert!(SensorSet::new(Vec::<String>::new()).is_err());
    }

    #[test]
    fn flag_column_name() {
        let set = SensorSet::new(["temperature"]).unwrap();
        let id = set.require("temperature").unwrap();
        assert_eq!(set.flag_column(id), "temperature_error_flag");
    }
}
