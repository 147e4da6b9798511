//! Ensemble descriptors: one configuration record per ensemble.
//!
//! On the wire a descriptor is a positional record of exactly five fields:
//!
//! ```text
//! [rank_begin, rank_end, [arg, ...], output_path, error_path]
//! ```
//!
//! The (de)serializer is written against serde's data model, so any
//! self-describing format (YAML, JSON, TOML arrays) can carry it.

use serde::de::{self, Deserializer, IgnoredAny, SeqAccess, Visitor};
use serde::ser::{SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Number of positional fields in a serialized descriptor.
pub const DESCRIPTOR_FIELDS: usize = 5;

/// One ensemble: an inclusive rank range, its argument list and its output files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsembleDescriptor {
    /// First global rank in the ensemble (inclusive)
    pub rank_begin: i32,
    /// Last global rank in the ensemble (inclusive)
    pub rank_end: i32,
    /// Command-line arguments seen by ranks of this ensemble (program name excluded)
    pub arguments: Vec<String>,
    /// Destination of the ensemble's standard output
    pub output_path: PathBuf,
    /// Destination of the ensemble's standard error
    pub error_path: PathBuf,
}

impl EnsembleDescriptor {
    /// Create a descriptor.
    pub fn new<A, S>(
        rank_begin: i32,
        rank_end: i32,
        arguments: A,
        output_path: impl Into<PathBuf>,
        error_path: impl Into<PathBuf>,
    ) -> Self
    where
        A: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EnsembleDescriptor {
            rank_begin,
            rank_end,
            arguments: arguments.into_iter().map(Into::into).collect(),
            output_path: output_path.into(),
            error_path: error_path.into(),
        }
    }

    /// Whether `rank` falls inside `[rank_begin, rank_end]`.
    pub fn contains(&self, rank: i32) -> bool {
        rank >= self.rank_begin && rank <= self.rank_end
    }

    /// Number of ranks covered, zero for an inverted range.
    pub fn len(&self) -> usize {
        if self.rank_end < self.rank_begin {
            0
        } else {
            (i64::from(self.rank_end) - i64::from(self.rank_begin) + 1) as usize
        }
    }

    /// Whether the range covers no rank at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the rank ranges of two descriptors intersect.
    pub fn overlaps(&self, other: &EnsembleDescriptor) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.rank_begin <= other.rank_end
            && other.rank_begin <= self.rank_end
    }
}

impl Serialize for EnsembleDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut record = serializer.serialize_tuple(DESCRIPTOR_FIELDS)?;
        record.serialize_element(&self.rank_begin)?;
        record.serialize_element(&self.rank_end)?;
        record.serialize_element(&self.arguments)?;
        record.serialize_element(&self.output_path)?;
        record.serialize_element(&self.error_path)?;
        record.end()
    }
}

impl<'de> Deserialize<'de> for EnsembleDescriptor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(DescriptorVisitor)
    }
}

struct DescriptorVisitor;

impl<'de> Visitor<'de> for DescriptorVisitor {
    type Value = EnsembleDescriptor;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a sequence [rank_begin, rank_end, [args], output_path, error_path]")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let rank_begin = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let rank_end = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
        let arguments = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(2, &self))?;
        let output_path = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(3, &self))?;
        let error_path = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(4, &self))?;

        let mut extra = 0;
        while seq.next_element::<IgnoredAny>()?.is_some() {
            extra += 1;
        }
        if extra > 0 {
            return Err(de::Error::invalid_length(DESCRIPTOR_FIELDS + extra, &self));
        }

        Ok(EnsembleDescriptor {
            rank_begin,
            rank_end,
            arguments,
            output_path,
            error_path,
        })
    }
}
