//! Reading exposition output back into structured families.

mod decoder;

pub use decoder::{
    decode, find_family, DecodeError, DecodeErrorKind, MetricFamily, MetricKind, Sample,
};
