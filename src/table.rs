// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Argument and Header Tables
//!
//! Queue arguments, consumer arguments and publish headers are loosely typed
//! tables in the configuration document. This module models them as a closed
//! value type, normalizes whole-number floats into integers and converts the
//! result into the `FieldTable` the broker expects.

use lapin::types::{AMQPValue, FieldArray, FieldTable, LongString, ShortString};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// A table of broker arguments or message headers.
pub type ArgTable = BTreeMap<String, ArgValue>;

/// A single argument or header value.
///
/// Every number decoded from a configuration document starts as `Float`;
/// [`normalize_table`] turns the whole ones into `Int`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    Void,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<ArgValue>),
    Table(ArgTable),
}

impl From<serde_json::Value> for ArgValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ArgValue::Void,
            serde_json::Value::Bool(b) => ArgValue::Bool(b),
            serde_json::Value::Number(n) => ArgValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => ArgValue::String(s),
            serde_json::Value::Array(items) => {
                ArgValue::Array(items.into_iter().map(ArgValue::from).collect())
            }
            serde_json::Value::Object(map) => ArgValue::Table(
                map.into_iter()
                    .map(|(k, v)| (k, ArgValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl<'de> Deserialize<'de> for ArgValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        serde_json::Value::deserialize(deserializer).map(ArgValue::from)
    }
}

impl ArgValue {
    /// Rewrites a whole-number float into an integer, recursing into nested
    /// arrays and tables. Fractional, non-finite and out-of-range floats are kept.
    pub fn normalize(&mut self) {
        match self {
            ArgValue::Float(f) => {
                if let Some(i) = whole_number(*f) {
                    *self = ArgValue::Int(i);
                }
            }
            ArgValue::Array(items) => items.iter_mut().for_each(ArgValue::normalize),
            ArgValue::Table(table) => normalize_table(table),
            _ => {}
        }
    }
}

// i64::MAX is not representable as f64, so the upper bound is exclusive.
const I64_LOWER: f64 = -9_223_372_036_854_775_808.0;
const I64_UPPER: f64 = 9_223_372_036_854_775_808.0;

fn whole_number(f: f64) -> Option<i64> {
    if f.is_finite() && f == f.trunc() && (I64_LOWER..I64_UPPER).contains(&f) {
        Some(f as i64)
    } else {
        None
    }
}

/// Normalizes every value of the table in place. Idempotent.
pub fn normalize_table(table: &mut ArgTable) {
    table.values_mut().for_each(ArgValue::normalize);
}

impl From<&ArgValue> for AMQPValue {
    fn from(value: &ArgValue) -> Self {
        match value {
            ArgValue::Void => AMQPValue::Void,
            ArgValue::Bool(b) => AMQPValue::Boolean(*b),
            ArgValue::Int(i) => AMQPValue::LongLongInt(*i),
            ArgValue::Float(f) => AMQPValue::Double(*f),
            ArgValue::String(s) => AMQPValue::LongString(LongString::from(s.clone())),
            ArgValue::Array(items) => AMQPValue::FieldArray(FieldArray::from(
                items.iter().map(AMQPValue::from).collect::<Vec<_>>(),
            )),
            ArgValue::Table(table) => AMQPValue::FieldTable(field_table(table)),
        }
    }
}

/// Converts a table into the broker wire representation.
pub fn field_table(table: &ArgTable) -> FieldTable {
    FieldTable::from(wire_map(table))
}

pub(crate) fn wire_map(table: &ArgTable) -> BTreeMap<ShortString, AMQPValue> {
    table
        .iter()
        .map(|(k, v)| (ShortString::from(k.clone()), AMQPValue::from(v)))
        .collect()
}
