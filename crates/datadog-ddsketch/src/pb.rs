// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Protobuf messages of the sketch wire format.

/// A quantile sketch: index mapping, positive and negative stores and the count
/// of values too close to zero to be indexed.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DdSketch {
    #[prost(message, optional, tag = "1")]
    pub mapping: ::core::option::Option<IndexMapping>,
    #[prost(message, optional, tag = "2")]
    pub positive_values: ::core::option::Option<Store>,
    #[prost(message, optional, tag = "3")]
    pub negative_values: ::core::option::Option<Store>,
    #[prost(double, tag = "4")]
    pub zero_count: f64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IndexMapping {
    /// gamma is the base of the logarithm used by the mapping.
    #[prost(double, tag = "1")]
    pub gamma: f64,
    /// index_offset is added to the logarithm before rounding.
    #[prost(double, tag = "2")]
    pub index_offset: f64,
    #[prost(enumeration = "Interpolation", tag = "3")]
    pub interpolation: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Interpolation {
    None = 0,
    Linear = 1,
    Quadratic = 2,
    Cubic = 3,
}

/// Bin counts, either sparse (`bin_counts`) or contiguous from
/// `contiguous_bin_index_offset`. Decoders sum both representations.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Store {
    #[prost(map = "sint32, double", tag = "1")]
    pub bin_counts: ::std::collections::HashMap<i32, f64>,
    #[prost(double, repeated, tag = "2")]
    pub contiguous_bin_counts: ::std::vec::Vec<f64>,
    #[prost(sint32, tag = "3")]
    pub contiguous_bin_index_offset: i32,
}
