//! Hint bundle and result resolution.
//!
//! Before a transform is applied, observers receive a mutable [`Hints`]
//! bundle. Setting `data` overrides what the update reports as its result;
//! `details` is passed through untouched in a full response. After commit,
//! [`resolve`] turns the hints (or, if unset, the coordinator's per-operation
//! results) into the caller-visible [`UpdateData`].

use serde::Serialize;
use serde_json::Value;

use relstore_core::{Identity, Record, RecordCache, Transform};

/// One element of a hinted result.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOrAbsent {
    /// Returned as is.
    Record(Record),
    /// Resolved against the cache after commit.
    Identity(Identity),
    /// An explicit "no value" slot.
    Absent,
}

impl From<Record> for RecordOrAbsent {
    fn from(record: Record) -> Self {
        RecordOrAbsent::Record(record)
    }
}

impl From<Identity> for RecordOrAbsent {
    fn from(identity: Identity) -> Self {
        RecordOrAbsent::Identity(identity)
    }
}

impl<T: Into<RecordOrAbsent>> From<Option<T>> for RecordOrAbsent {
    fn from(value: Option<T>) -> Self {
        value.map_or(RecordOrAbsent::Absent, Into::into)
    }
}

/// The `data` slot of a hint bundle.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum HintValue {
    #[default]
    Unset,
    One(RecordOrAbsent),
    Many(Vec<RecordOrAbsent>),
}

/// Mutable bundle handed to `before_update` observers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hints {
    pub data: HintValue,
    pub details: Option<Value>,
}

impl Hints {
    pub fn new() -> Self {
        Hints::default()
    }

    /// Overrides the result with a single value.
    pub fn set_data(&mut self, value: impl Into<RecordOrAbsent>) {
        self.data = HintValue::One(value.into());
    }

    /// Overrides the result with a sequence, kept in order and length.
    pub fn set_data_many<I, T>(&mut self, values: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<RecordOrAbsent>,
    {
        self.data = HintValue::Many(values.into_iter().map(Into::into).collect());
    }

    pub fn set_details(&mut self, details: impl Into<Value>) {
        self.details = Some(details.into());
    }

    pub fn is_data_set(&self) -> bool {
        self.data != HintValue::Unset
    }
}

/// The data an update resolves to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UpdateData {
    One(Option<Record>),
    Many(Vec<Option<Record>>),
}

impl UpdateData {
    /// The single value, if this is one.
    pub fn as_one(&self) -> Option<&Option<Record>> {
        match self {
            UpdateData::One(one) => Some(one),
            UpdateData::Many(_) => None,
        }
    }

    /// The sequence, if this is one.
    pub fn as_many(&self) -> Option<&[Option<Record>]> {
        match self {
            UpdateData::One(_) => None,
            UpdateData::Many(many) => Some(many),
        }
    }
}

/// `{data, details, transform}`, returned when `fullResponse` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FullResponse {
    pub data: UpdateData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub transform: Transform,
}

/// What `Source::update` returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UpdateOutcome {
    Data(UpdateData),
    Full(FullResponse),
}

impl UpdateOutcome {
    /// The resolved data, whichever shape was requested.
    pub fn data(&self) -> &UpdateData {
        match self {
            UpdateOutcome::Data(data) => data,
            UpdateOutcome::Full(full) => &full.data,
        }
    }

    pub fn into_data(self) -> UpdateData {
        match self {
            UpdateOutcome::Data(data) => data,
            UpdateOutcome::Full(full) => full.data,
        }
    }

    pub fn as_full(&self) -> Option<&FullResponse> {
        match self {
            UpdateOutcome::Full(full) => Some(full),
            UpdateOutcome::Data(_) => None,
        }
    }
}

/// Resolves the caller-visible data of a committed transform.
///
/// `results` are the coordinator's per-operation results; `cache` must
/// already reflect the commit.
pub fn resolve(hints: &Hints, results: &[Option<Record>], cache: &RecordCache) -> UpdateData {
    match &hints.data {
        HintValue::One(value) => UpdateData::One(resolve_one(value, cache)),
        HintValue::Many(values) => {
            UpdateData::Many(values.iter().map(|v| resolve_one(v, cache)).collect())
        }
        HintValue::Unset => match results {
            [only] => UpdateData::One(only.clone()),
            _ => UpdateData::Many(results.to_vec()),
        },
    }
}

fn resolve_one(value: &RecordOrAbsent, cache: &RecordCache) -> Option<Record> {
    match value {
        RecordOrAbsent::Record(record) => Some(record.clone()),
        RecordOrAbsent::Identity(identity) => cache.get(identity).cloned(),
        RecordOrAbsent::Absent => None,
    }
}
