// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Conversion between 16-bit register words and typed values.
//!
//! ```text
//! 3.14_f32 = 0x4048_F5C3  (bytes A=40 B=48 C=F5 D=C3)
//!
//! BigEndian        [0x4048, 0xF5C3]   ABCD
//! MidLittleEndian  [0xF5C3, 0x4048]   CDAB  (device default)
//! MidBigEndian     [0x4840, 0xC3F5]   BADC
//! LittleEndian     [0xC3F5, 0x4840]   DCBA
//! ```

use azimuth_core::{DataType, Value};

use crate::error::{ConversionError, ModbusError, ModbusResult};
use crate::types::ByteOrder;

// =============================================================================
// DataConverter
// =============================================================================

/// Converts register words to [`Value`]s and back using one byte order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataConverter {
    byte_order: ByteOrder,
}

impl DataConverter {
    /// Creates a converter for the given byte order.
    pub fn new(byte_order: ByteOrder) -> Self {
        Self { byte_order }
    }

    /// Returns the byte order.
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    // =========================================================================
    // From Registers
    // =========================================================================

    /// Decodes words read from a holding or input register.
    pub fn decode_words(&self, data_type: DataType, words: &[u16]) -> ModbusResult<Value> {
        let needed = data_type.word_count() as usize;
        if words.len() < needed {
            return Err(ModbusError::conversion(ConversionError::insufficient_data(
                needed,
                words.len(),
            )));
        }

        Ok(match data_type {
            DataType::Bool => Value::Bool(words[0] != 0),
            DataType::Int16 => Value::from(words[0] as i16),
            DataType::Float32 => Value::from(self.decode_f32([words[0], words[1]])),
        })
    }

    /// Decodes a two-word float.
    pub fn decode_f32(&self, words: [u16; 2]) -> f32 {
        let [first, second] = words;
        let (high, low) = if self.byte_order.low_word_first() {
            (second, first)
        } else {
            (first, second)
        };
        let (high, low) = if self.byte_order.swap_bytes() {
            (high.swap_bytes(), low.swap_bytes())
        } else {
            (high, low)
        };
        f32::from_bits((u32::from(high) << 16) | u32::from(low))
    }

    // =========================================================================
    // To Registers
    // =========================================================================

    /// Encodes a float into two words in wire order.
    pub fn encode_f32(&self, value: f32) -> [u16; 2] {
        let bits = value.to_bits();
        let mut high = (bits >> 16) as u16;
        let mut low = (bits & 0xFFFF) as u16;
        if self.byte_order.swap_bytes() {
            high = high.swap_bytes();
            low = low.swap_bytes();
        }
        if self.byte_order.low_word_first() {
            [low, high]
        } else {
            [high, low]
        }
    }

    /// Encodes an `f64` for a float register, rejecting values `f32` cannot hold.
    pub fn encode_float(&self, value: f64) -> ModbusResult<[u16; 2]> {
        if !value.is_finite() {
            return Err(ModbusError::conversion(ConversionError::NonFinite { value }));
        }
        if value.abs() > f64::from(f32::MAX) {
            return Err(ModbusError::conversion(ConversionError::overflow(value, "f32")));
        }
        Ok(self.encode_f32(value as f32))
    }
}

/// Encodes an integer for a single register.
///
/// Values in `i16` range are written two's-complement; `32768..=65535` pass
/// through unchanged.
pub fn encode_word(value: i32) -> ModbusResult<u16> {
    if let Ok(v) = i16::try_from(value) {
        return Ok(v as u16);
    }
    u16::try_from(value)
        .map_err(|_| ModbusError::conversion(ConversionError::overflow(value, "16-bit register")))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_word_order() {
        let converter = DataConverter::new(ByteOrder::MidLittleEndian);
        assert_eq!(converter.encode_f32(3.14), [0xF5C3, 0x4048]);
        assert_eq!(converter.decode_f32([0xF5C3, 0x4048]), 3.14);
    }

    #[test]
    fn test_all_layouts() {
        let cases = [
            (ByteOrder::BigEndian, [0x4048, 0xF5C3]),
            (ByteOrder::MidLittleEndian, [0xF5C3, 0x4048]),
            (ByteOrder::MidBigEndian, [0x4840, 0xC3F5]),
            (ByteOrder::LittleEndian, [0xC3F5, 0x4840]),
        ];
        for (order, words) in cases {
            let converter = DataConverter::new(order);
            assert_eq!(converter.encode_f32(3.14), words, "{}", order);
            assert_eq!(converter.decode_f32(words), 3.14, "{}", order);
        }
    }

    #[test]
    fn test_float_round_trip_representative_values() {
        let converter = DataConverter::default();
        for v in [0.0_f32, -1.0, 3.14159, f32::MAX] {
            assert_eq!(converter.decode_f32(converter.encode_f32(v)), v);
        }
    }

    #[test]
    fn test_decode_words() {
        let converter = DataConverter::default();
        assert_eq!(
            converter.decode_words(DataType::Int16, &[0xFFFE]).unwrap(),
            Value::Int(-2)
        );
        assert_eq!(
            converter.decode_words(DataType::Int16, &[42]).unwrap(),
            Value::Int(42)
        );
        assert!(converter.decode_words(DataType::Float32, &[0x4048]).is_err());
    }

    #[test]
    fn test_encode_float_rejects_out_of_range() {
        let converter = DataConverter::default();
        assert!(converter.encode_float(f64::NAN).is_err());
        assert!(converter.encode_float(1e40).is_err());
        assert_eq!(converter.encode_float(3.14).unwrap(), [0xF5C3, 0x4048]);
    }

    #[test]
    fn test_encode_word() {
        assert_eq!(encode_word(-1).unwrap(), 0xFFFF);
        assert_eq!(encode_word(50).unwrap(), 50);
        assert_eq!(encode_word(40_000).unwrap(), 40_000);
        assert!(encode_word(70_000).is_err());
        assert!(encode_word(-40_000).is_err());
    }
}
