// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Input transformations applied before a rule's conditions are evaluated.
//!
//! A transformed view of an address lives in its own namespace, keyed by
//! [`transform_input_key`], so the raw and transformed values of the same
//! address can coexist in one [`AddressMap`].

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::AddressMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transformation {
    Lowercase,
    RemoveNulls,
    CompressWhitespace,
    UrlDecode,
    Trim,
}

impl Transformation {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Lowercase => "lowercase",
            Self::RemoveNulls => "removeNulls",
            Self::CompressWhitespace => "compressWhitespace",
            Self::UrlDecode => "urlDecode",
            Self::Trim => "trim",
        }
    }

    #[must_use]
    pub fn apply(self, input: &str) -> String {
        match self {
            Self::Lowercase => input.to_lowercase(),
            Self::RemoveNulls => input.replace('\0', ""),
            Self::CompressWhitespace => compress_whitespace(input),
            Self::UrlDecode => url_decode(input),
            Self::Trim => input.trim().to_string(),
        }
    }
}

impl fmt::Display for Transformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Transformation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lowercase" => Ok(Self::Lowercase),
            "removeNulls" => Ok(Self::RemoveNulls),
            "compressWhitespace" => Ok(Self::CompressWhitespace),
            "urlDecode" => Ok(Self::UrlDecode),
            "trim" => Ok(Self::Trim),
            other => Err(other.to_string()),
        }
    }
}

/// Runs `chain` over `input` in order.
#[must_use]
pub fn apply_all<'a>(chain: &[Transformation], input: &'a str) -> Cow<'a, str> {
    chain
        .iter()
        .fold(Cow::Borrowed(input), |value, t| Cow::Owned(t.apply(&value)))
}

/// Name under which the `chain`-transformed view of `address` is stored.
#[must_use]
pub fn transform_input_key(chain: &[Transformation], address: &str) -> String {
    let names: Vec<&str> = chain.iter().map(|t| t.name()).collect();
    format!("{}:{address}", names.join(","))
}

/// Applies `chain` to every string leaf of `value`. Map keys are left as is.
#[must_use]
pub fn transform_value(chain: &[Transformation], value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(apply_all(chain, s).into_owned()),
        Value::Array(items) => Value::Array(items.iter().map(|v| transform_value(chain, v)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), transform_value(chain, v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Returns the `chain`-transformed view of every address in `data`, keyed by
/// [`transform_input_key`].
#[must_use]
pub fn rekey(chain: &[Transformation], data: &AddressMap) -> AddressMap {
    data.iter()
        .map(|(address, value)| {
            (
                transform_input_key(chain, address),
                transform_value(chain, value),
            )
        })
        .collect()
}

fn compress_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_run = false;
    for c in input.chars() {
        if c.is_whitespace() {
            if !in_run {
                out.push(' ');
            }
            in_run = true;
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out
}

fn url_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi << 4) | lo);
                        i += 2;
                    }
                    _ => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
