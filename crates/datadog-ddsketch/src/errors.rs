// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#[derive(Debug, thiserror::Error)]
pub enum SketchError {
    #[error("gamma must be finite and greater than 1, got {0}")]
    InvalidGamma(f64),
    #[error("relative accuracy must be strictly between 0 and 1, got {0}")]
    InvalidRelativeAccuracy(f64),
    #[error("cannot merge sketches with different index mappings")]
    MappingMismatch,
    #[error("encoded sketch has no index mapping")]
    MissingMapping,
    #[error("encoded bin index {0} is outside the range of the index mapping")]
    IndexOutOfRange(i64),
    #[error("failed to decode sketch: {0}")]
    Decode(#[from] prost::DecodeError),
}
