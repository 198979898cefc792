// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ROS1 binary serialization driven by [`TypeDefinition`]s.
//!
//! Little-endian, no padding. Strings and dynamic arrays carry a `u32`
//! length prefix; fixed arrays do not. `time`/`duration` are two 32-bit
//! words (`sec`, `nsec`) and decode to a struct with those fields.
//! `uint8` arrays decode to [`Value::Bytes`].

use super::{CodecError, Value};
use crate::schema::{ArrayKind, FieldDefinition, FieldType, PrimitiveType, TypeRegistry};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::collections::BTreeMap;

const MAX_DEPTH: usize = 64;

/// Decode `data` as an instance of `type_name`.
///
/// Trailing bytes after the last field are ignored.
pub fn decode(registry: &TypeRegistry, type_name: &str, data: &[u8]) -> Result<Value, CodecError> {
    let mut decoder = Decoder {
        registry,
        data,
        pos: 0,
    };
    decoder.message(type_name, 0)
}

/// Encode `value` as an instance of `type_name`.
pub fn encode(
    registry: &TypeRegistry,
    type_name: &str,
    value: &Value,
) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    encode_message(registry, type_name, value, &mut out, 0)?;
    Ok(out)
}

struct Decoder<'a> {
    registry: &'a TypeRegistry,
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn message(&mut self, type_name: &str, depth: usize) -> Result<Value, CodecError> {
        if depth > MAX_DEPTH {
            return Err(CodecError::TooDeep(type_name.to_string()));
        }
        let registry = self.registry;
        let def = registry
            .get(type_name)
            .ok_or_else(|| CodecError::UnknownType(type_name.to_string()))?;

        let mut fields = BTreeMap::new();
        for field in &def.fields {
            let value = self.field(field, depth)?;
            fields.insert(field.name.clone(), value);
        }
        Ok(Value::Struct(fields))
    }

    fn field(&mut self, field: &FieldDefinition, depth: usize) -> Result<Value, CodecError> {
        let len = match field.array {
            ArrayKind::Scalar => return self.single(&field.field_type, depth),
            ArrayKind::Fixed(n) => n,
            ArrayKind::Dynamic => self.u32(&field.name)? as usize,
        };

        if let FieldType::Primitive(p) = &field.field_type {
            if let Some(size) = p.size() {
                let needed = len.checked_mul(size);
                if needed.map_or(true, |n| n > self.remaining()) {
                    return Err(self.truncated(&field.name));
                }
            }
            if *p == PrimitiveType::UInt8 {
                return Ok(Value::Bytes(self.take(len, &field.name)?.to_vec()));
            }
        }

        let mut items = Vec::with_capacity(len.min(self.remaining()));
        for _ in 0..len {
            items.push(self.single(&field.field_type, depth)?);
        }
        Ok(Value::Array(items))
    }

    fn single(&mut self, field_type: &FieldType, depth: usize) -> Result<Value, CodecError> {
        match field_type {
            FieldType::Complex(name) => self.message(name, depth + 1),
            FieldType::Primitive(p) => self.primitive(*p),
        }
    }

    fn primitive(&mut self, p: PrimitiveType) -> Result<Value, CodecError> {
        let what = p.name();
        Ok(match p {
            PrimitiveType::Bool => Value::Bool(self.take(1, what)?[0] != 0),
            PrimitiveType::Int8 => Value::Int(i64::from(self.take(1, what)?[0] as i8)),
            PrimitiveType::UInt8 => Value::UInt(u64::from(self.take(1, what)?[0])),
            PrimitiveType::Int16 => {
                Value::Int(i64::from(LittleEndian::read_i16(self.take(2, what)?)))
            }
            PrimitiveType::UInt16 => {
                Value::UInt(u64::from(LittleEndian::read_u16(self.take(2, what)?)))
            }
            PrimitiveType::Int32 => {
                Value::Int(i64::from(LittleEndian::read_i32(self.take(4, what)?)))
            }
            PrimitiveType::UInt32 => Value::UInt(u64::from(self.u32(what)?)),
            PrimitiveType::Int64 => Value::Int(LittleEndian::read_i64(self.take(8, what)?)),
            PrimitiveType::UInt64 => Value::UInt(LittleEndian::read_u64(self.take(8, what)?)),
            PrimitiveType::Float32 => {
                Value::Float(f64::from(LittleEndian::read_f32(self.take(4, what)?)))
            }
            PrimitiveType::Float64 => Value::Float(LittleEndian::read_f64(self.take(8, what)?)),
            PrimitiveType::String => {
                let len = self.u32(what)? as usize;
                Value::String(String::from_utf8_lossy(self.take(len, what)?).into_owned())
            }
            PrimitiveType::Time => {
                let sec = self.u32(what)?;
                let nsec = self.u32(what)?;
                Value::from([("sec", Value::UInt(sec.into())), ("nsec", Value::UInt(nsec.into()))])
            }
            PrimitiveType::Duration => {
                let sec = LittleEndian::read_i32(self.take(4, what)?);
                let nsec = LittleEndian::read_i32(self.take(4, what)?);
                Value::from([("sec", Value::Int(sec.into())), ("nsec", Value::Int(nsec.into()))])
            }
        })
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], CodecError> {
        if n > self.remaining() {
            return Err(self.truncated(what));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u32(&mut self, what: &str) -> Result<u32, CodecError> {
        Ok(LittleEndian::read_u32(self.take(4, what)?))
    }

    fn truncated(&self, what: &str) -> CodecError {
        CodecError::Truncated {
            field: what.to_string(),
            offset: self.pos,
        }
    }
}

fn encode_message(
    registry: &TypeRegistry,
    type_name: &str,
    value: &Value,
    out: &mut Vec<u8>,
    depth: usize,
) -> Result<(), CodecError> {
    if depth > MAX_DEPTH {
        return Err(CodecError::TooDeep(type_name.to_string()));
    }
    let def = registry
        .get(type_name)
        .ok_or_else(|| CodecError::UnknownType(type_name.to_string()))?;

    for field in &def.fields {
        let field_value = value.get(&field.name).ok_or_else(|| CodecError::Mismatch {
            field: field.name.clone(),
            expected: "struct member",
        })?;
        encode_field(registry, field, field_value, out, depth)?;
    }
    Ok(())
}

fn encode_field(
    registry: &TypeRegistry,
    field: &FieldDefinition,
    value: &Value,
    out: &mut Vec<u8>,
    depth: usize,
) -> Result<(), CodecError> {
    if field.array == ArrayKind::Scalar {
        return encode_single(registry, field, value, out, depth);
    }

    let items = value.elements().ok_or_else(|| CodecError::Mismatch {
        field: field.name.clone(),
        expected: "array",
    })?;
    match field.array {
        ArrayKind::Fixed(n) if n != items.len() => {
            return Err(CodecError::Mismatch {
                field: field.name.clone(),
                expected: "array of declared length",
            });
        }
        ArrayKind::Dynamic => out.write_u32::<LittleEndian>(items.len() as u32)?,
        _ => {}
    }
    for item in &items {
        encode_single(registry, field, item, out, depth)?;
    }
    Ok(())
}

fn encode_single(
    registry: &TypeRegistry,
    field: &FieldDefinition,
    value: &Value,
    out: &mut Vec<u8>,
    depth: usize,
) -> Result<(), CodecError> {
    let p = match &field.field_type {
        FieldType::Complex(name) => return encode_message(registry, name, value, out, depth + 1),
        FieldType::Primitive(p) => *p,
    };

    let mismatch = |expected: &'static str| CodecError::Mismatch {
        field: field.name.clone(),
        expected,
    };
    let int = || match value {
        Value::Int(v) => Ok(*v),
        Value::UInt(v) => Ok(*v as i64),
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Float(v) => Ok(*v as i64),
        _ => Err(mismatch("integer")),
    };
    let float = || value.as_plot_number().ok_or_else(|| mismatch("number"));

    match p {
        PrimitiveType::Bool => out.write_u8(u8::from(int()? != 0))?,
        PrimitiveType::Int8 => out.write_i8(int()? as i8)?,
        PrimitiveType::UInt8 => out.write_u8(int()? as u8)?,
        PrimitiveType::Int16 => out.write_i16::<LittleEndian>(int()? as i16)?,
        PrimitiveType::UInt16 => out.write_u16::<LittleEndian>(int()? as u16)?,
        PrimitiveType::Int32 => out.write_i32::<LittleEndian>(int()? as i32)?,
        PrimitiveType::UInt32 => out.write_u32::<LittleEndian>(int()? as u32)?,
        PrimitiveType::Int64 => out.write_i64::<LittleEndian>(int()?)?,
        PrimitiveType::UInt64 => out.write_u64::<LittleEndian>(match value {
            Value::UInt(v) => *v,
            _ => int()? as u64,
        })?,
        PrimitiveType::Float32 => out.write_f32::<LittleEndian>(float()? as f32)?,
        PrimitiveType::Float64 => out.write_f64::<LittleEndian>(float()?)?,
        PrimitiveType::String => {
            let s = value.as_str().ok_or_else(|| mismatch("string"))?;
            out.write_u32::<LittleEndian>(s.len() as u32)?;
            out.extend_from_slice(s.as_bytes());
        }
        PrimitiveType::Time | PrimitiveType::Duration => {
            let part = |name: &str| match value.get(name) {
                Some(Value::Int(v)) => Ok(*v),
                Some(Value::UInt(v)) => Ok(*v as i64),
                _ => Err(mismatch("{sec, nsec}")),
            };
            out.write_u32::<LittleEndian>(part("sec")? as u32)?;
            out.write_u32::<LittleEndian>(part("nsec")? as u32)?;
        }
    }
    Ok(())
}
