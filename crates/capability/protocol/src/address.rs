//! 点位地址语法
//!
//! - Modbus：`TABLE:register[:type]`，TABLE ∈ {HR, IR, C, DI}；设备 ID 为站号 1..=247
//! - BACnet：`TYPE:instance`，TYPE ∈ {AI, AO, AV, BI, BO, BV, MI, MO, MV}
//!   - BACnet/IP 设备 ID：`instance` 或 `instance@ip:port`
//!   - MS/TP 设备 ID：MAC 地址 0..=254
//!
//! 非法地址在任何 I/O 之前被拒绝。

use crate::types::ModbusDataType;
use domain::ProtocolType;
use std::fmt;
use std::net::SocketAddr;

/// Modbus 数据表
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterTable {
    HoldingRegister,
    InputRegister,
    Coil,
    DiscreteInput,
}

impl RegisterTable {
    pub fn is_writable(self) -> bool {
        matches!(self, RegisterTable::HoldingRegister | RegisterTable::Coil)
    }

    pub fn is_bit(self) -> bool {
        matches!(self, RegisterTable::Coil | RegisterTable::DiscreteInput)
    }

    fn prefix(self) -> &'static str {
        match self {
            RegisterTable::HoldingRegister => "HR",
            RegisterTable::InputRegister => "IR",
            RegisterTable::Coil => "C",
            RegisterTable::DiscreteInput => "DI",
        }
    }
}

/// BACnet 对象类型（只覆盖 present-value 读写用到的类型）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    AnalogInput,
    AnalogOutput,
    AnalogValue,
    BinaryInput,
    BinaryOutput,
    BinaryValue,
    MultiStateInput,
    MultiStateOutput,
    MultiStateValue,
}

impl ObjectType {
    pub fn code(self) -> u16 {
        match self {
            ObjectType::AnalogInput => 0,
            ObjectType::AnalogOutput => 1,
            ObjectType::AnalogValue => 2,
            ObjectType::BinaryInput => 3,
            ObjectType::BinaryOutput => 4,
            ObjectType::BinaryValue => 5,
            ObjectType::MultiStateInput => 13,
            ObjectType::MultiStateOutput => 14,
            ObjectType::MultiStateValue => 19,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(ObjectType::AnalogInput),
            1 => Some(ObjectType::AnalogOutput),
            2 => Some(ObjectType::AnalogValue),
            3 => Some(ObjectType::BinaryInput),
            4 => Some(ObjectType::BinaryOutput),
            5 => Some(ObjectType::BinaryValue),
            13 => Some(ObjectType::MultiStateInput),
            14 => Some(ObjectType::MultiStateOutput),
            19 => Some(ObjectType::MultiStateValue),
            _ => None,
        }
    }

    pub fn is_binary(self) -> bool {
        matches!(
            self,
            ObjectType::BinaryInput | ObjectType::BinaryOutput | ObjectType::BinaryValue
        )
    }

    pub fn is_multistate(self) -> bool {
        matches!(
            self,
            ObjectType::MultiStateInput | ObjectType::MultiStateOutput | ObjectType::MultiStateValue
        )
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "AI" => Some(ObjectType::AnalogInput),
            "AO" => Some(ObjectType::AnalogOutput),
            "AV" => Some(ObjectType::AnalogValue),
            "BI" => Some(ObjectType::BinaryInput),
            "BO" => Some(ObjectType::BinaryOutput),
            "BV" => Some(ObjectType::BinaryValue),
            "MI" => Some(ObjectType::MultiStateInput),
            "MO" => Some(ObjectType::MultiStateOutput),
            "MV" => Some(ObjectType::MultiStateValue),
            _ => None,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            ObjectType::AnalogInput => "AI",
            ObjectType::AnalogOutput => "AO",
            ObjectType::AnalogValue => "AV",
            ObjectType::BinaryInput => "BI",
            ObjectType::BinaryOutput => "BO",
            ObjectType::BinaryValue => "BV",
            ObjectType::MultiStateInput => "MI",
            ObjectType::MultiStateOutput => "MO",
            ObjectType::MultiStateValue => "MV",
        }
    }
}

/// BACnet 对象标识，实例号为 22 位。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId {
    pub object_type: ObjectType,
    pub instance: u32,
}

pub const MAX_INSTANCE: u32 = 0x3F_FFFF;

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type.prefix(), self.instance)
    }
}

/// BACnet 设备定位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BacnetDevice {
    /// 设备实例号，可选显式地址（否则使用发现缓存）
    Ip {
        instance: u32,
        address: Option<SocketAddr>,
    },
    Mstp { mac: u8 },
}

/// 解析后的点位目标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointTarget {
    Modbus {
        unit: u8,
        table: RegisterTable,
        register: u16,
        data_type: ModbusDataType,
    },
    Bacnet {
        device: BacnetDevice,
        object: ObjectId,
    },
}

impl PointTarget {
    /// 是否落在同一现场位置：Modbus 按站号、数据表与寄存器区间重叠判断，
    /// BACnet 按设备与对象判断（IP 设备只比较实例号）。
    pub fn overlaps(&self, other: &PointTarget) -> bool {
        match (self, other) {
            (
                PointTarget::Modbus {
                    unit,
                    table,
                    register,
                    data_type,
                },
                PointTarget::Modbus {
                    unit: other_unit,
                    table: other_table,
                    register: other_register,
                    data_type: other_type,
                },
            ) => {
                if unit != other_unit || table != other_table {
                    return false;
                }
                let width = |data_type: &ModbusDataType| {
                    if table.is_bit() {
                        1
                    } else {
                        u32::from(data_type.register_count())
                    }
                };
                let start = u32::from(*register);
                let other_start = u32::from(*other_register);
                start < other_start + width(other_type) && other_start < start + width(data_type)
            }
            (
                PointTarget::Bacnet { device, object },
                PointTarget::Bacnet {
                    device: other_device,
                    object: other_object,
                },
            ) => {
                let same_device = match (device, other_device) {
                    (
                        BacnetDevice::Ip { instance, .. },
                        BacnetDevice::Ip {
                            instance: other_instance,
                            ..
                        },
                    ) => instance == other_instance,
                    (BacnetDevice::Mstp { mac }, BacnetDevice::Mstp { mac: other_mac }) => {
                        mac == other_mac
                    }
                    _ => false,
                };
                same_device && object == other_object
            }
            _ => false,
        }
    }
}

impl fmt::Display for PointTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointTarget::Modbus {
                unit,
                table,
                register,
                data_type,
            } => {
                if table.is_bit() {
                    write!(f, "unit {} {}:{}", unit, table.prefix(), register)
                } else {
                    write!(f, "unit {} {}:{}:{}", unit, table.prefix(), register, data_type)
                }
            }
            PointTarget::Bacnet { device, object } => match device {
                BacnetDevice::Ip { instance, .. } => write!(f, "device {} {}", instance, object),
                BacnetDevice::Mstp { mac } => write!(f, "mac {} {}", mac, object),
            },
        }
    }
}

/// 按协议类型解析设备 ID 与地址；错误信息直接用于 `InvalidAddress`。
pub fn parse_target(
    protocol_type: ProtocolType,
    device_id: &str,
    address: &str,
) -> Result<PointTarget, String> {
    match protocol_type {
        ProtocolType::ModbusTcp | ProtocolType::ModbusRtu => {
            let unit = parse_unit_id(device_id)?;
            let (table, register, data_type) = parse_modbus_address(address)?;
            Ok(PointTarget::Modbus {
                unit,
                table,
                register,
                data_type,
            })
        }
        ProtocolType::BacnetIp => Ok(PointTarget::Bacnet {
            device: parse_bacnet_ip_device(device_id)?,
            object: parse_object_id(address)?,
        }),
        ProtocolType::BacnetMstp => Ok(PointTarget::Bacnet {
            device: BacnetDevice::Mstp {
                mac: parse_mstp_mac(device_id)?,
            },
            object: parse_object_id(address)?,
        }),
    }
}

/// Modbus 站号 1..=247
pub fn parse_unit_id(device_id: &str) -> Result<u8, String> {
    let unit = device_id
        .trim()
        .parse::<u8>()
        .map_err(|_| format!("modbus unit id `{}` is not a number in 1..=247", device_id))?;
    if !(1..=247).contains(&unit) {
        return Err(format!("modbus unit id {} outside 1..=247", unit));
    }
    Ok(unit)
}

fn parse_modbus_address(address: &str) -> Result<(RegisterTable, u16, ModbusDataType), String> {
    let mut parts = address.trim().split(':');
    let table = match parts.next().map(|part| part.to_ascii_uppercase()).as_deref() {
        Some("HR") => RegisterTable::HoldingRegister,
        Some("IR") => RegisterTable::InputRegister,
        Some("C") => RegisterTable::Coil,
        Some("DI") => RegisterTable::DiscreteInput,
        _ => {
            return Err(format!(
                "modbus address `{}` must start with HR, IR, C or DI",
                address
            ))
        }
    };
    let register = parts
        .next()
        .ok_or_else(|| format!("modbus address `{}` missing register", address))?
        .parse::<u16>()
        .map_err(|_| format!("modbus address `{}` has invalid register", address))?;
    let data_type = match parts.next() {
        Some(_) if table.is_bit() => {
            return Err(format!(
                "modbus address `{}`: coils and discrete inputs take no data type",
                address
            ))
        }
        Some(raw) => raw.parse::<ModbusDataType>()?,
        None => ModbusDataType::default(),
    };
    if parts.next().is_some() {
        return Err(format!("modbus address `{}` has trailing fields", address));
    }
    let last = u32::from(register) + u32::from(data_type.register_count()) - 1;
    if !table.is_bit() && last > u32::from(u16::MAX) {
        return Err(format!(
            "modbus address `{}` runs past register 65535",
            address
        ));
    }
    Ok((table, register, data_type))
}

/// `TYPE:instance`
pub fn parse_object_id(address: &str) -> Result<ObjectId, String> {
    let (prefix, instance) = address
        .trim()
        .split_once(':')
        .ok_or_else(|| format!("bacnet address `{}` must be TYPE:instance", address))?;
    let object_type = ObjectType::from_prefix(&prefix.to_ascii_uppercase())
        .ok_or_else(|| format!("bacnet object type `{}` not supported", prefix))?;
    let instance = parse_instance(instance)?;
    Ok(ObjectId {
        object_type,
        instance,
    })
}

fn parse_instance(raw: &str) -> Result<u32, String> {
    let instance = raw
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("bacnet instance `{}` is not a number", raw))?;
    if instance >= MAX_INSTANCE {
        return Err(format!("bacnet instance {} outside 0..{}", instance, MAX_INSTANCE));
    }
    Ok(instance)
}

fn parse_bacnet_ip_device(device_id: &str) -> Result<BacnetDevice, String> {
    match device_id.trim().split_once('@') {
        Some((instance, address)) => {
            let address = address
                .parse::<SocketAddr>()
                .map_err(|_| format!("bacnet device address `{}` must be ip:port", address))?;
            Ok(BacnetDevice::Ip {
                instance: parse_instance(instance)?,
                address: Some(address),
            })
        }
        None => Ok(BacnetDevice::Ip {
            instance: parse_instance(device_id)?,
            address: None,
        }),
    }
}

/// MS/TP MAC 0..=254（255 为广播）
pub fn parse_mstp_mac(device_id: &str) -> Result<u8, String> {
    let mac = device_id
        .trim()
        .parse::<u8>()
        .map_err(|_| format!("ms/tp mac `{}` is not a number in 0..=254", device_id))?;
    if mac == 255 {
        return Err("ms/tp mac 255 is the broadcast address".to_string());
    }
    Ok(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modbus_defaults_to_uint16() {
        let target = parse_target(ProtocolType::ModbusRtu, "1", "HR:100").expect("target");
        assert_eq!(
            target,
            PointTarget::Modbus {
                unit: 1,
                table: RegisterTable::HoldingRegister,
                register: 100,
                data_type: ModbusDataType::Uint16,
            }
        );
    }

    #[test]
    fn modbus_typed_register() {
        let target = parse_target(ProtocolType::ModbusTcp, "17", "ir:30:float32").expect("target");
        assert!(matches!(
            target,
            PointTarget::Modbus {
                table: RegisterTable::InputRegister,
                data_type: ModbusDataType::Float32,
                ..
            }
        ));
    }

    #[test]
    fn modbus_rejects_malformed() {
        for (device, address) in [
            ("0", "HR:1"),
            ("248", "HR:1"),
            ("x", "HR:1"),
            ("1", "XX:1"),
            ("1", "HR"),
            ("1", "HR:70000"),
            ("1", "HR:1:int8"),
            ("1", "C:5:uint16"),
            ("1", "HR:65535:float32"),
            ("1", "HR:1:int16:extra"),
        ] {
            assert!(
                parse_target(ProtocolType::ModbusTcp, device, address).is_err(),
                "{device} {address}"
            );
        }
    }

    #[test]
    fn aliases_share_a_location() {
        let bound = parse_target(ProtocolType::ModbusTcp, "2", "HR:41").expect("bound");
        for (device, address) in [
            ("2", "hr:41"),
            ("02", "HR:41"),
            (" 2", "HR:41:uint16"),
            ("2", "HR:40:float32"),
        ] {
            let alias = parse_target(ProtocolType::ModbusTcp, device, address).expect("alias");
            assert!(bound.overlaps(&alias), "{device} {address}");
            assert!(alias.overlaps(&bound), "{device} {address}");
        }
        for (device, address) in [
            ("3", "HR:41"),
            ("2", "IR:41"),
            ("2", "HR:42"),
            ("2", "HR:39:float32"),
        ] {
            let other = parse_target(ProtocolType::ModbusTcp, device, address).expect("other");
            assert!(!bound.overlaps(&other), "{device} {address}");
        }

        let av = parse_target(ProtocolType::BacnetIp, "1234", "AV:3").expect("av");
        let routed =
            parse_target(ProtocolType::BacnetIp, "1234@10.0.0.7:47808", "av:3").expect("routed");
        assert!(av.overlaps(&routed));
    }

    #[test]
    fn bacnet_ip_devices() {
        let target = parse_target(ProtocolType::BacnetIp, "1234", "AV:3").expect("target");
        assert_eq!(
            target,
            PointTarget::Bacnet {
                device: BacnetDevice::Ip {
                    instance: 1234,
                    address: None
                },
                object: ObjectId {
                    object_type: ObjectType::AnalogValue,
                    instance: 3
                },
            }
        );

        let target =
            parse_target(ProtocolType::BacnetIp, "7@192.168.1.20:47808", "bo:1").expect("target");
        match target {
            PointTarget::Bacnet {
                device: BacnetDevice::Ip { address, .. },
                object,
            } => {
                assert_eq!(address, Some("192.168.1.20:47808".parse().expect("addr")));
                assert_eq!(object.object_type, ObjectType::BinaryOutput);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bacnet_rejects_malformed() {
        assert!(parse_target(ProtocolType::BacnetIp, "1", "XY:1").is_err());
        assert!(parse_target(ProtocolType::BacnetIp, "1", "AI").is_err());
        assert!(parse_target(ProtocolType::BacnetIp, "1@nowhere", "AI:1").is_err());
        assert!(parse_target(ProtocolType::BacnetIp, "4194303", "AI:1").is_err());
        assert!(parse_target(ProtocolType::BacnetMstp, "255", "AI:1").is_err());
        assert!(parse_target(ProtocolType::BacnetMstp, "12", "MV:2").is_ok());
    }
}
