// ============================================================
// Layer 4 — Record Decoder
// ============================================================
// Turns one Raw Record payload into a DecodedExample.
//
// The payload is a protobuf `Example`: a map from feature name
// to a typed list. The image schema has exactly five entries:
//
//   image_raw → bytes_list [ 784 raw u8 pixels ]
//   label     → int64_list [ class id ]
//   height    → int64_list [ 28 ]    (carried, not used)
//   width     → int64_list [ 28 ]    (carried, not used)
//   channels  → int64_list [ 1 ]     (carried, not used)
//
// Decoding steps:
//   1. protobuf parse                 → SchemaMismatch on failure
//   2. exact key set + list kinds     → SchemaMismatch
//   3. image_raw length == 784        → ShapeMismatch
//   4. pixel / 255.0                  → f32 in [0, 1]
//   5. label as i32                   → no bounds check
//
// The message types are declared with prost's derive macros,
// so no .proto file or build script is needed.
//
// Reference: prost crate documentation
//            TensorFlow example.proto / feature.proto (wire layout)

use std::collections::HashMap;

use prost::Message;

use crate::domain::error::DecodeError;
use crate::domain::example::{DecodedExample, IMAGE_PIXELS};

pub const IMAGE_RAW: &str = "image_raw";
pub const LABEL:     &str = "label";
pub const HEIGHT:    &str = "height";
pub const WIDTH:     &str = "width";
pub const CHANNELS:  &str = "channels";

const SCHEMA: [&str; 5] = [IMAGE_RAW, LABEL, HEIGHT, WIDTH, CHANNELS];

// ─── Protobuf messages ────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct Example {
    #[prost(message, optional, tag = "1")]
    pub features: Option<Features>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Features {
    #[prost(map = "string, message", tag = "1")]
    pub feature: HashMap<String, Feature>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Feature {
    #[prost(oneof = "feature::Kind", tags = "1, 2, 3")]
    pub kind: Option<feature::Kind>,
}

pub mod feature {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Kind {
        #[prost(message, tag = "1")]
        BytesList(super::BytesList),
        #[prost(message, tag = "2")]
        FloatList(super::FloatList),
        #[prost(message, tag = "3")]
        Int64List(super::Int64List),
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct BytesList {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub value: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FloatList {
    #[prost(float, repeated, tag = "1")]
    pub value: Vec<f32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Int64List {
    #[prost(int64, repeated, tag = "1")]
    pub value: Vec<i64>,
}

// ─── Decoding ─────────────────────────────────────────────────────────────────

/// Decode one record payload into a normalised image and its label.
pub fn decode(record: &[u8]) -> Result<DecodedExample, DecodeError> {
    let example = Example::decode(record)
        .map_err(|e| DecodeError::SchemaMismatch(format!("not an Example: {e}")))?;
    let features = example
        .features
        .ok_or_else(|| DecodeError::SchemaMismatch("no features".to_string()))?
        .feature;

    for key in features.keys() {
        if !SCHEMA.contains(&key.as_str()) {
            return Err(DecodeError::SchemaMismatch(format!("unexpected field '{key}'")));
        }
    }

    let image_raw = single_bytes(&features, IMAGE_RAW)?;
    let label     = single_int(&features, LABEL)?;
    // Present in every record but only validated for kind.
    for key in [HEIGHT, WIDTH, CHANNELS] {
        single_int(&features, key)?;
    }

    if image_raw.len() != IMAGE_PIXELS {
        return Err(DecodeError::ShapeMismatch {
            expected: IMAGE_PIXELS,
            actual:   image_raw.len(),
        });
    }

    let feature_map = image_raw.iter().map(|&px| f32::from(px) / 255.0).collect();

    Ok(DecodedExample { feature_map, label: label as i32 })
}

fn lookup<'a>(features: &'a HashMap<String, Feature>, key: &str) -> Result<&'a feature::Kind, DecodeError> {
    features
        .get(key)
        .and_then(|f| f.kind.as_ref())
        .ok_or_else(|| DecodeError::SchemaMismatch(format!("missing field '{key}'")))
}

fn single_bytes<'a>(features: &'a HashMap<String, Feature>, key: &str) -> Result<&'a [u8], DecodeError> {
    match lookup(features, key)? {
        feature::Kind::BytesList(list) if list.value.len() == 1 => Ok(&list.value[0]),
        feature::Kind::BytesList(list) => Err(DecodeError::SchemaMismatch(format!(
            "field '{key}' holds {} byte strings, expected 1",
            list.value.len()
        ))),
        _ => Err(DecodeError::SchemaMismatch(format!("field '{key}' is not a bytes list"))),
    }
}

fn single_int(features: &HashMap<String, Feature>, key: &str) -> Result<i64, DecodeError> {
    match lookup(features, key)? {
        feature::Kind::Int64List(list) if list.value.len() == 1 => Ok(list.value[0]),
        feature::Kind::Int64List(list) => Err(DecodeError::SchemaMismatch(format!(
            "field '{key}' holds {} integers, expected 1",
            list.value.len()
        ))),
        _ => Err(DecodeError::SchemaMismatch(format!("field '{key}' is not an int64 list"))),
    }
}

// ─── Encoding ─────────────────────────────────────────────────────────────────

/// Build a Raw Record payload with the five-field image schema.
pub fn encode_example(image_raw: &[u8], label: i64, height: i64, width: i64, channels: i64) -> Vec<u8> {
    let mut feature = HashMap::with_capacity(SCHEMA.len());
    feature.insert(IMAGE_RAW.to_string(), bytes_feature(image_raw.to_vec()));
    feature.insert(LABEL.to_string(), int_feature(label));
    feature.insert(HEIGHT.to_string(), int_feature(height));
    feature.insert(WIDTH.to_string(), int_feature(width));
    feature.insert(CHANNELS.to_string(), int_feature(channels));

    Example { features: Some(Features { feature }) }.encode_to_vec()
}

fn bytes_feature(value: Vec<u8>) -> Feature {
    Feature { kind: Some(feature::Kind::BytesList(BytesList { value: vec![value] })) }
}

fn int_feature(value: i64) -> Feature {
    Feature { kind: Some(feature::Kind::Int64List(Int64List { value: vec![value] })) }
}
