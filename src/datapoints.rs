use std::borrow::Cow;
use std::collections::BTreeMap;

/// Identifier of a datapoint, scoped to a single device.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct DatapointKey(Cow<'static, str>);

impl DatapointKey {
    pub const fn new_const(key: &'static str) -> Self {
        Self(Cow::Borrowed(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DatapointKey {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

impl From<&'static str> for DatapointKey {
    fn from(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }
}

impl std::fmt::Display for DatapointKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A raw value as reported by (or written to) the device.
///
/// `Absent` stands for "not reported yet" as well as "unavailable" and is encoded as JSON `null`.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum DatapointValue {
    Boolean(bool),
    Integer(i64),
    String(String),
    #[default]
    Absent,
}

impl DatapointValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, DatapointValue::Absent)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            DatapointValue::Boolean(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match *self {
            DatapointValue::Integer(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DatapointValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for DatapointValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatapointValue::Boolean(b) => f.write_fmt(format_args!("{b}")),
            DatapointValue::Integer(n) => f.write_fmt(format_args!("{n}")),
            DatapointValue::String(s) => f.write_str(s),
            DatapointValue::Absent => f.write_str("unavailable"),
        }
    }
}

impl From<bool> for DatapointValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for DatapointValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for DatapointValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

static ABSENT: DatapointValue = DatapointValue::Absent;

/// Last known state of every datapoint of a device.
///
/// Decoding is lenient: a datapoint whose value does not fit [`DatapointValue`] (e.g. a fractional
/// number) is logged and left out, the rest of the datapoints are kept.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct Datapoints(BTreeMap<DatapointKey, DatapointValue>);

impl<'de> serde::Deserialize<'de> for Datapoints {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = <BTreeMap<DatapointKey, serde_json::Value> as serde::Deserialize>::deserialize(
            deserializer,
        )?;
        let mut datapoints = BTreeMap::new();
        for (key, value) in raw {
            match <DatapointValue as serde::Deserialize>::deserialize(&value) {
                Ok(decoded) => {
                    datapoints.insert(key, decoded);
                }
                Err(error) => {
                    tracing::warn!(%key, %value, %error, "skipping datapoint with unsupported value");
                }
            }
        }
        Ok(Self(datapoints))
    }
}

impl Datapoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// The value of a datapoint, `Absent` if the device never reported it.
    pub fn get(&self, key: &DatapointKey) -> &DatapointValue {
        self.0.get(key).unwrap_or(&ABSENT)
    }

    /// Record a value reported by the device.
    ///
    /// Returns `true` if the value has changed.
    pub fn set(&mut self, key: DatapointKey, value: DatapointValue) -> bool {
        match self.0.insert(key, value.clone()) {
            None => !value.is_absent(),
            Some(old) => old != value,
        }
    }

    /// Merge a batch of updates, returning how many datapoints changed.
    pub fn apply(&mut self, updates: impl IntoIterator<Item = (DatapointKey, DatapointValue)>) -> usize {
        let mut changed = 0;
        for (key, value) in updates {
            if self.set(key, value) {
                changed += 1;
            }
        }
        changed
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DatapointKey, &DatapointValue)> {
        self.0.iter()
    }
}

impl FromIterator<(DatapointKey, DatapointValue)> for Datapoints {
    fn from_iter<T: IntoIterator<Item = (DatapointKey, DatapointValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Datapoints {
    type Item = (DatapointKey, DatapointValue);
    type IntoIter = std::collections::btree_map::IntoIter<DatapointKey, DatapointValue>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A batch of datapoint writes that is submitted to the device as a single request.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct DatapointWrites(BTreeMap<DatapointKey, DatapointValue>);

impl DatapointWrites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(key: DatapointKey, value: impl Into<DatapointValue>) -> Self {
        let mut writes = Self::new();
        writes.insert(key, value);
        writes
    }

    pub fn insert(&mut self, key: DatapointKey, value: impl Into<DatapointValue>) {
        self.0.insert(key, value.into());
    }

    /// Fold another batch into this one. Writes in `other` win on conflicting keys.
    pub fn merge(&mut self, other: DatapointWrites) {
        self.0.extend(other.0);
    }

    pub fn get(&self, key: &DatapointKey) -> Option<&DatapointValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DatapointKey, &DatapointValue)> {
        self.0.iter()
    }
}

impl IntoIterator for DatapointWrites {
    type Item = (DatapointKey, DatapointValue);
    type IntoIter = std::collections::btree_map::IntoIter<DatapointKey, DatapointValue>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
