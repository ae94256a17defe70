//! Per-column typed parsers (§4.I "Per-column parsers").
//!
//! Grounded on `original_source/src/mlio/parser.cc`'s `make_parser_core<dt>`
//! dispatch table: one closure per `Data_type`, each returning an
//! ok/failed/overflowed trichotomy instead of throwing.

use std::collections::HashSet;

use crate::dtype::DataType;

/// Outcome of parsing one field into one typed slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseResult {
    Ok,
    Failed,
    Overflowed,
}

/// Knobs that affect parsing beyond the target `DataType` (§6 `parser_options`).
#[derive(Debug, Clone)]
pub struct ParserOptions {
    pub nan_values: HashSet<String>,
    pub base: u32,
}

impl Default for ParserOptions {
    fn default() -> ParserOptions {
        ParserOptions {
            nan_values: HashSet::new(),
            base: 10,
        }
    }
}

/// Parse `text` into the row `row` slot of `column`, per §4.I.
pub fn parse_into(
    dtype: DataType,
    text: &str,
    options: &ParserOptions,
    column: &mut crate::tensor::ColumnBuilder,
    row: usize,
) -> ParseResult {
    match dtype {
        DataType::Size => parse_uint(text, options.base).map_or(ParseResult::Failed, |v| {
            column.set_u64(row, v);
            ParseResult::Ok
        }),
        DataType::Float16 => ParseResult::Failed,
        DataType::Float32 => parse_float(text, options, |v| column.set_f32(row, v as f32)),
        DataType::Float64 => parse_float(text, options, |v| column.set_f64(row, v)),
        DataType::Int8 => parse_narrow_int(text, options.base, i8::MIN as i64, i8::MAX as i64)
            .map_or(ParseResult::Failed, |v| {
                column.set_i8(row, v as i8);
                ParseResult::Ok
            }),
        DataType::Int16 => parse_narrow_int(text, options.base, i16::MIN as i64, i16::MAX as i64)
            .map_or(ParseResult::Failed, |v| {
                column.set_i16(row, v as i16);
                ParseResult::Ok
            }),
        DataType::Int32 => match parse_signed(text, options.base) {
            Some(v) if v >= i32::MIN as i64 && v <= i32::MAX as i64 => {
                column.set_i32(row, v as i32);
                ParseResult::Ok
            }
            Some(_) => ParseResult::Overflowed,
            None => ParseResult::Failed,
        },
        DataType::Int64 => parse_signed(text, options.base).map_or(ParseResult::Failed, |v| {
            column.set_i64(row, v);
            ParseResult::Ok
        }),
        DataType::UInt8 => parse_narrow_uint(text, options.base, u8::MAX as u64)
            .map_or(ParseResult::Failed, |v| {
                column.set_u8(row, v as u8);
                ParseResult::Ok
            }),
        DataType::UInt16 => parse_narrow_uint(text, options.base, u16::MAX as u64)
            .map_or(ParseResult::Failed, |v| {
                column.set_u16(row, v as u16);
                ParseResult::Ok
            }),
        DataType::UInt32 => match parse_uint(text, options.base) {
            Some(v) if v <= u32::MAX as u64 => {
                column.set_u32(row, v as u32);
                ParseResult::Ok
            }
            Some(_) => ParseResult::Overflowed,
            None => ParseResult::Failed,
        },
        DataType::UInt64 => parse_uint(text, options.base).map_or(ParseResult::Failed, |v| {
            column.set_u64(row, v);
            ParseResult::Ok
        }),
        DataType::String => {
            column.set_string(row, text.to_string());
            ParseResult::Ok
        }
    }
}

fn parse_signed(text: &str, base: u32) -> Option<i64> {
    if base == 10 {
        text.trim().parse::<i64>().ok()
    } else {
        i64::from_str_radix(text.trim(), base).ok()
    }
}

fn parse_uint(text: &str, base: u32) -> Option<u64> {
    if base == 10 {
        text.trim().parse::<u64>().ok()
    } else {
        u64::from_str_radix(text.trim(), base).ok()
    }
}

/// Parse then range-check against `[min, max]`; overflow is distinguished
/// from "not a number at all" (§8's integer-parse law).
fn parse_narrow_int(text: &str, base: u32, min: i64, max: i64) -> Option<i64> {
    let v = parse_signed(text, base)?;
    if v < min || v > max {
        return None;
    }
    Some(v)
}

fn parse_narrow_uint(text: &str, base: u32, max: u64) -> Option<u64> {
    let v = parse_uint(text, base)?;
    if v > max {
        return None;
    }
    Some(v)
}

fn parse_float(text: &str, options: &ParserOptions, mut store: impl FnMut(f64)) -> ParseResult {
    let trimmed = text.trim();
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_infinite() => ParseResult::Overflowed,
        Ok(v) => {
            store(v);
            ParseResult::Ok
        }
        Err(_) => {
            if options.nan_values.contains(trimmed) {
                store(f64::NAN);
                ParseResult::Ok
            } else {
                ParseResult::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::ColumnBuilder;

    fn parse_one(dtype: DataType, text: &str) -> (ParseResult, crate::tensor::TypedBuffer) {
        let opts = ParserOptions::default();
        let mut col = ColumnBuilder::zeroed(dtype, 1);
        let r = parse_into(dtype, text, &opts, &mut col, 0);
        (r, col.freeze())
    }

    #[test]
    fn parses_int64() {
        let (r, buf) = parse_one(DataType::Int64, "42");
        assert_eq!(r, ParseResult::Ok);
        assert_eq!(buf.as_i64().unwrap()[0], 42);
    }

    #[test]
    fn int32_overflow_is_overflowed_not_failed() {
        let (r, _) = parse_one(DataType::Int32, "99999999999");
        assert_eq!(r, ParseResult::Overflowed);
    }

    #[test]
    fn int8_narrows_via_i32_range_check() {
        let (r, _) = parse_one(DataType::Int8, "200");
        assert_eq!(r, ParseResult::Failed);
        let (r2, _) = parse_one(DataType::Int8, "100");
        assert_eq!(r2, ParseResult::Ok);
    }

    #[test]
    fn float_parses_configured_nan_token() {
        let mut opts = ParserOptions::default();
        opts.nan_values.insert("N/A".to_string());
        let mut col = ColumnBuilder::zeroed(DataType::Float64, 1);
        let r = parse_into(DataType::Float64, "N/A", &opts, &mut col, 0);
        assert_eq!(r, ParseResult::Ok);
        assert!(col.freeze().as_f64().unwrap()[0].is_nan());
    }

    #[test]
    fn float_overflow_from_parsed_infinity() {
        let (r, _) = parse_one(DataType::Float64, "1e400");
        assert_eq!(r, ParseResult::Overflowed);
    }

    #[test]
    fn float16_always_fails() {
        let (r, _) = parse_one(DataType::Float16, "1.0");
        assert_eq!(r, ParseResult::Failed);
    }

    #[test]
    fn string_copies_verbatim() {
        let (r, buf) = parse_one(DataType::String, "hello");
        assert_eq!(r, ParseResult::Ok);
        assert_eq!(&buf.as_strings().unwrap()[0], "hello");
    }
}
