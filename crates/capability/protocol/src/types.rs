//! Modbus 寄存器数据类型与编解码

use domain::PointValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Modbus 寄存器数据类型（多寄存器按大端字序排列）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModbusDataType {
    /// 16位有符号整数
    Int16,
    /// 16位无符号整数
    #[default]
    Uint16,
    /// 32位有符号整数（2个寄存器）
    Int32,
    /// 32位无符号整数（2个寄存器）
    Uint32,
    /// 32位浮点数（2个寄存器）
    Float32,
    /// 64位浮点数（4个寄存器）
    Float64,
}

impl ModbusDataType {
    /// 占用的寄存器数量
    pub fn register_count(self) -> u16 {
        match self {
            ModbusDataType::Int16 | ModbusDataType::Uint16 => 1,
            ModbusDataType::Int32 | ModbusDataType::Uint32 | ModbusDataType::Float32 => 2,
            ModbusDataType::Float64 => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModbusDataType::Int16 => "int16",
            ModbusDataType::Uint16 => "uint16",
            ModbusDataType::Int32 => "int32",
            ModbusDataType::Uint32 => "uint32",
            ModbusDataType::Float32 => "float32",
            ModbusDataType::Float64 => "float64",
        }
    }
}

impl fmt::Display for ModbusDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModbusDataType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "int16" => Ok(ModbusDataType::Int16),
            "uint16" => Ok(ModbusDataType::Uint16),
            "int32" => Ok(ModbusDataType::Int32),
            "uint32" => Ok(ModbusDataType::Uint32),
            "float32" | "float" => Ok(ModbusDataType::Float32),
            "float64" | "double" => Ok(ModbusDataType::Float64),
            other => Err(format!("unknown register type `{}`", other)),
        }
    }
}

/// 解析寄存器数据为点位值
pub fn decode_registers(registers: &[u16], data_type: ModbusDataType) -> Result<PointValue, String> {
    let needed = data_type.register_count() as usize;
    if registers.len() < needed {
        return Err(format!(
            "need {} registers for {}, got {}",
            needed,
            data_type,
            registers.len()
        ));
    }

    let value = match data_type {
        ModbusDataType::Int16 => PointValue::Int(i64::from(registers[0] as i16)),
        ModbusDataType::Uint16 => PointValue::Int(i64::from(registers[0])),
        ModbusDataType::Int32 => PointValue::Int(i64::from(join32(registers) as i32)),
        ModbusDataType::Uint32 => PointValue::Int(i64::from(join32(registers))),
        ModbusDataType::Float32 => PointValue::Float(f64::from(f32::from_bits(join32(registers)))),
        ModbusDataType::Float64 => {
            let bits = registers[..4]
                .iter()
                .fold(0u64, |acc, word| (acc << 16) | u64::from(*word));
            PointValue::Float(f64::from_bits(bits))
        }
    };
    Ok(value)
}

/// 点位值编码为寄存器，超出类型范围时报错
pub fn encode_registers(value: &PointValue, data_type: ModbusDataType) -> Result<Vec<u16>, String> {
    let number = match value {
        PointValue::Bool(state) => {
            if *state {
                1.0
            } else {
                0.0
            }
        }
        PointValue::Int(value) => *value as f64,
        PointValue::Float(value) => *value,
        PointValue::String(_) => {
            return Err(format!("string value cannot be written as {}", data_type));
        }
    };
    if !number.is_finite() {
        return Err(format!("{} is not a finite number", number));
    }

    let registers = match data_type {
        ModbusDataType::Int16 => vec![integer_in(number, i16::MIN as f64, i16::MAX as f64, data_type)? as i16 as u16],
        ModbusDataType::Uint16 => vec![integer_in(number, 0.0, u16::MAX as f64, data_type)? as u16],
        ModbusDataType::Int32 => {
            split32(integer_in(number, i32::MIN as f64, i32::MAX as f64, data_type)? as i32 as u32)
        }
        ModbusDataType::Uint32 => split32(integer_in(number, 0.0, u32::MAX as f64, data_type)? as u32),
        ModbusDataType::Float32 => split32((number as f32).to_bits()),
        ModbusDataType::Float64 => {
            let bits = number.to_bits();
            (0..4)
                .map(|index| (bits >> (48 - 16 * index)) as u16)
                .collect()
        }
    };
    Ok(registers)
}

fn join32(registers: &[u16]) -> u32 {
    (u32::from(registers[0]) << 16) | u32::from(registers[1])
}

fn split32(bits: u32) -> Vec<u16> {
    vec![(bits >> 16) as u16, bits as u16]
}

fn integer_in(number: f64, min: f64, max: f64, data_type: ModbusDataType) -> Result<i64, String> {
    if number.fract() != 0.0 {
        return Err(format!("{} is not an integer for {}", number, data_type));
    }
    if number < min || number > max {
        return Err(format!("{} out of range for {}", number, data_type));
    }
    Ok(number as i64)
}
