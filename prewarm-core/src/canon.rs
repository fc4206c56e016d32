//! Strict canonical JSON conversion.
//!
//! `serde_json::to_value` maps non-finite floats to `null`, which would
//! collide with an explicit `null` argument in the key space. This
//! serializer mirrors serde_json's data model but rejects any value that
//! has no exact JSON representation, so key derivation fails fast instead
//! of silently folding distinct arguments together.

use serde::ser::{self, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

/// Convert a value to canonical JSON, rejecting non-finite floats.
pub(crate) fn to_canonical_value<T: Serialize>(value: &T) -> Result<Value, CanonError> {
    value.serialize(Canonicalizer)
}

/// A value that cannot be represented exactly in JSON.
#[derive(Debug)]
pub(crate) struct CanonError(String);

impl fmt::Display for CanonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for CanonError {}

impl ser::Error for CanonError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        CanonError(msg.to_string())
    }
}

struct Canonicalizer;

impl ser::Serializer for Canonicalizer {
    type Ok = Value;
    type Error = CanonError;

    type SerializeSeq = SeqCanon;
    type SerializeTuple = SeqCanon;
    type SerializeTupleStruct = SeqCanon;
    type SerializeTupleVariant = VariantSeqCanon;
    type SerializeMap = MapCanon;
    type SerializeStruct = MapCanon;
    type SerializeStructVariant = VariantMapCanon;

    fn serialize_bool(self, v: bool) -> Result<Value, CanonError> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, CanonError> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<Value, CanonError> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<Value, CanonError> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Value, CanonError> {
        Ok(Value::Number(Number::from(v)))
    }

    fn serialize_u8(self, v: u8) -> Result<Value, CanonError> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Value, CanonError> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<Value, CanonError> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<Value, CanonError> {
        Ok(Value::Number(Number::from(v)))
    }

    fn serialize_f32(self, v: f32) -> Result<Value, CanonError> {
        self.serialize_f64(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<Value, CanonError> {
        Number::from_f64(v)
            .map(Value::Number)
            .ok_or_else(|| CanonError(format!("float {v} has no JSON representation")))
    }

    fn serialize_char(self, v: char) -> Result<Value, CanonError> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value, CanonError> {
        Ok(Value::String(v.to_owned()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value, CanonError> {
        Ok(Value::Array(
            v.iter().map(|&b| Value::Number(Number::from(b))).collect(),
        ))
    }

    fn serialize_none(self) -> Result<Value, CanonError> {
        Ok(Value::Null)
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Value, CanonError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value, CanonError> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value, CanonError> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Value, CanonError> {
        Ok(Value::String(variant.to_owned()))
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value, CanonError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, CanonError> {
        let mut map = Map::new();
        map.insert(variant.to_owned(), value.serialize(Canonicalizer)?);
        Ok(Value::Object(map))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqCanon, CanonError> {
        Ok(SeqCanon {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqCanon, CanonError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SeqCanon, CanonError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantSeqCanon, CanonError> {
        Ok(VariantSeqCanon {
            variant,
            items: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapCanon, CanonError> {
        Ok(MapCanon {
            map: Map::new(),
            next_key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<MapCanon, CanonError> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<VariantMapCanon, CanonError> {
        Ok(VariantMapCanon {
            variant,
            map: Map::new(),
        })
    }
}

struct SeqCanon {
    items: Vec<Value>,
}

impl ser::SerializeSeq for SeqCanon {
    type Ok = Value;
    type Error = CanonError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), CanonError> {
        self.items.push(value.serialize(Canonicalizer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, CanonError> {
        Ok(Value::Array(self.items))
    }
}

impl ser::SerializeTuple for SeqCanon {
    type Ok = Value;
    type Error = CanonError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), CanonError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, CanonError> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SeqCanon {
    type Ok = Value;
    type Error = CanonError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), CanonError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, CanonError> {
        ser::SerializeSeq::end(self)
    }
}

struct VariantSeqCanon {
    variant: &'static str,
    items: Vec<Value>,
}

impl ser::SerializeTupleVariant for VariantSeqCanon {
    type Ok = Value;
    type Error = CanonError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), CanonError> {
        self.items.push(value.serialize(Canonicalizer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, CanonError> {
        let mut map = Map::new();
        map.insert(self.variant.to_owned(), Value::Array(self.items));
        Ok(Value::Object(map))
    }
}

struct MapCanon {
    map: Map<String, Value>,
    next_key: Option<String>,
}

impl ser::SerializeMap for MapCanon {
    type Ok = Value;
    type Error = CanonError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), CanonError> {
        self.next_key = Some(map_key(key.serialize(Canonicalizer)?)?);
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), CanonError> {
        let key = self
            .next_key
            .take()
            .ok_or_else(|| CanonError("map value serialized before its key".to_owned()))?;
        self.map.insert(key, value.serialize(Canonicalizer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, CanonError> {
        Ok(Value::Object(self.map))
    }
}

impl ser::SerializeStruct for MapCanon {
    type Ok = Value;
    type Error = CanonError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), CanonError> {
        self.map
            .insert(key.to_owned(), value.serialize(Canonicalizer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, CanonError> {
        Ok(Value::Object(self.map))
    }
}

struct VariantMapCanon {
    variant: &'static str,
    map: Map<String, Value>,
}

impl ser::SerializeStructVariant for VariantMapCanon {
    type Ok = Value;
    type Error = CanonError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), CanonError> {
        self.map
            .insert(key.to_owned(), value.serialize(Canonicalizer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, CanonError> {
        let mut map = Map::new();
        map.insert(self.variant.to_owned(), Value::Object(self.map));
        Ok(Value::Object(map))
    }
}

fn map_key(key: Value) -> Result<String, CanonError> {
    match key {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(CanonError(format!(
            "map key must be a string or number, got {other}"
        ))),
    }
}
