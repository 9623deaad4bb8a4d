//! 最小 BACnet 编解码：BVLC / NPDU / APDU
//!
//! 只覆盖 Who-Is、I-Am、ReadProperty、WriteProperty（present-value）
//! 以及对应的 ComplexAck / SimpleAck / Error / Reject / Abort。

use crate::address::{ObjectId, ObjectType};
use domain::PointValue;

pub const PROP_PRESENT_VALUE: u32 = 85;
/// WriteProperty 使用的命令优先级
pub const WRITE_PRIORITY: u8 = 10;

const BVLC_TYPE: u8 = 0x81;
pub const BVLC_FORWARDED_NPDU: u8 = 0x04;
pub const BVLC_ORIGINAL_UNICAST: u8 = 0x0A;
pub const BVLC_ORIGINAL_BROADCAST: u8 = 0x0B;

const SERVICE_I_AM: u8 = 0x00;
const SERVICE_WHO_IS: u8 = 0x08;
const SERVICE_READ_PROPERTY: u8 = 0x0C;
const SERVICE_WRITE_PROPERTY: u8 = 0x0F;

/// 应用层数据值
#[derive(Debug, Clone, PartialEq)]
pub enum AppValue {
    Null,
    Boolean(bool),
    Unsigned(u32),
    Signed(i32),
    Real(f32),
    Double(f64),
    CharString(String),
    Enumerated(u32),
    ObjectId(u16, u32),
    /// 未支持的应用标签号
    Other(u8),
}

/// 解码后的 APDU
#[derive(Debug, Clone, PartialEq)]
pub enum Apdu {
    WhoIs,
    IAm {
        device_instance: u32,
        max_apdu: u32,
        segmentation: u32,
        vendor_id: u32,
    },
    ReadPropertyAck {
        invoke_id: u8,
        object_type: u16,
        instance: u32,
        property: u32,
        value: AppValue,
    },
    SimpleAck {
        invoke_id: u8,
        service: u8,
    },
    Error {
        invoke_id: u8,
        service: u8,
        class: u32,
        code: u32,
    },
    Reject {
        invoke_id: u8,
        reason: u8,
    },
    Abort {
        invoke_id: u8,
        reason: u8,
    },
    /// 其它请求或服务（忽略）
    Other,
}

impl Apdu {
    /// 确认服务响应的 invoke id
    pub fn invoke_id(&self) -> Option<u8> {
        match self {
            Apdu::ReadPropertyAck { invoke_id, .. }
            | Apdu::SimpleAck { invoke_id, .. }
            | Apdu::Error { invoke_id, .. }
            | Apdu::Reject { invoke_id, .. }
            | Apdu::Abort { invoke_id, .. } => Some(*invoke_id),
            Apdu::WhoIs | Apdu::IAm { .. } | Apdu::Other => None,
        }
    }
}

// ---------------------------------------------------------------------------
// BVLC / NPDU

/// BACnet/IP 帧：BVLC 头 + NPDU + APDU。
pub fn encode_bvlc(function: u8, expecting_reply: bool, apdu: &[u8]) -> Vec<u8> {
    let npdu = encode_npdu(expecting_reply);
    let length = 4 + npdu.len() + apdu.len();
    let mut frame = Vec::with_capacity(length);
    frame.extend_from_slice(&[BVLC_TYPE, function, (length >> 8) as u8, length as u8]);
    frame.extend_from_slice(&npdu);
    frame.extend_from_slice(apdu);
    frame
}

/// 本地网络 NPDU（无 DNET / SNET）。
pub fn encode_npdu(expecting_reply: bool) -> [u8; 2] {
    [0x01, if expecting_reply { 0x04 } else { 0x00 }]
}

/// 剥离 BVLC 头，返回 NPDU 起始的负载。
pub fn decode_bvlc(frame: &[u8]) -> Result<&[u8], String> {
    if frame.len() < 4 || frame[0] != BVLC_TYPE {
        return Err("not a BACnet/IP frame".to_string());
    }
    let length = usize::from(u16::from_be_bytes([frame[2], frame[3]]));
    if length != frame.len() {
        return Err(format!(
            "bvlc length {} does not match datagram {}",
            length,
            frame.len()
        ));
    }
    match frame[1] {
        BVLC_ORIGINAL_UNICAST | BVLC_ORIGINAL_BROADCAST => Ok(&frame[4..]),
        // 转发帧带 6 字节原始源地址
        BVLC_FORWARDED_NPDU if frame.len() >= 10 => Ok(&frame[10..]),
        other => Err(format!("unsupported bvlc function 0x{:02x}", other)),
    }
}

/// 剥离 NPDU，返回 APDU；网络层消息返回 None。
pub fn decode_npdu(npdu: &[u8]) -> Result<Option<&[u8]>, String> {
    if npdu.len() < 2 || npdu[0] != 0x01 {
        return Err("unsupported npdu version".to_string());
    }
    let control = npdu[1];
    let mut pos = 2;
    if control & 0x20 != 0 {
        // DNET(2) DLEN(1) DADR(DLEN)
        let dlen = usize::from(*npdu.get(pos + 2).ok_or("truncated npdu")?);
        pos += 3 + dlen;
    }
    if control & 0x08 != 0 {
        let slen = usize::from(*npdu.get(pos + 2).ok_or("truncated npdu")?);
        pos += 3 + slen;
    }
    if control & 0x20 != 0 {
        // hop count
        pos += 1;
    }
    if pos > npdu.len() {
        return Err("truncated npdu".to_string());
    }
    if control & 0x80 != 0 {
        return Ok(None);
    }
    Ok(Some(&npdu[pos..]))
}

/// BACnet/IP 数据报一步解码到 APDU。
pub fn decode_ip_frame(frame: &[u8]) -> Result<Option<Apdu>, String> {
    let npdu = decode_bvlc(frame)?;
    match decode_npdu(npdu)? {
        Some(apdu) => decode_apdu(apdu).map(Some),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// APDU 编码

pub fn encode_who_is() -> Vec<u8> {
    vec![0x10, SERVICE_WHO_IS]
}

pub fn encode_i_am(device_instance: u32, vendor_id: u32) -> Vec<u8> {
    let mut apdu = vec![0x10, SERVICE_I_AM];
    encode_app_value(&mut apdu, &AppValue::ObjectId(8, device_instance));
    encode_app_value(&mut apdu, &AppValue::Unsigned(1476));
    // segmentation: no-segmentation (3)
    encode_app_value(&mut apdu, &AppValue::Enumerated(3));
    encode_app_value(&mut apdu, &AppValue::Unsigned(vendor_id));
    apdu
}

pub fn encode_read_property(invoke_id: u8, object: ObjectId) -> Vec<u8> {
    let mut apdu = confirmed_header(invoke_id, SERVICE_READ_PROPERTY);
    encode_object_id_context(&mut apdu, 0, object.object_type.code(), object.instance);
    encode_unsigned_tag(&mut apdu, 1, true, PROP_PRESENT_VALUE);
    apdu
}

pub fn encode_write_property(invoke_id: u8, object: ObjectId, value: &AppValue) -> Vec<u8> {
    let mut apdu = confirmed_header(invoke_id, SERVICE_WRITE_PROPERTY);
    encode_object_id_context(&mut apdu, 0, object.object_type.code(), object.instance);
    encode_unsigned_tag(&mut apdu, 1, true, PROP_PRESENT_VALUE);
    apdu.push(0x3E);
    encode_app_value(&mut apdu, value);
    apdu.push(0x3F);
    encode_unsigned_tag(&mut apdu, 4, true, u32::from(WRITE_PRIORITY));
    apdu
}

/// ReadProperty 的 ComplexAck（设备侧编码，模拟设备时使用）。
pub fn encode_read_property_ack(invoke_id: u8, object: ObjectId, value: &AppValue) -> Vec<u8> {
    let mut apdu = vec![0x30, invoke_id, SERVICE_READ_PROPERTY];
    encode_object_id_context(&mut apdu, 0, object.object_type.code(), object.instance);
    encode_unsigned_tag(&mut apdu, 1, true, PROP_PRESENT_VALUE);
    apdu.push(0x3E);
    encode_app_value(&mut apdu, value);
    apdu.push(0x3F);
    apdu
}

pub fn encode_simple_ack(invoke_id: u8, service: u8) -> Vec<u8> {
    vec![0x20, invoke_id, service]
}

fn confirmed_header(invoke_id: u8, service: u8) -> Vec<u8> {
    // 不分段，最大 APDU 1476
    vec![0x00, 0x05, invoke_id, service]
}

fn encode_object_id_context(out: &mut Vec<u8>, tag: u8, object_type: u16, instance: u32) {
    out.push((tag << 4) | 0x08 | 4);
    out.extend_from_slice(&object_id_bits(object_type, instance).to_be_bytes());
}

fn object_id_bits(object_type: u16, instance: u32) -> u32 {
    (u32::from(object_type) << 22) | (instance & 0x3F_FFFF)
}

fn encode_unsigned_tag(out: &mut Vec<u8>, tag: u8, context: bool, value: u32) {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take(3).take_while(|byte| **byte == 0).count();
    let class = if context { 0x08 } else { 0x00 };
    out.push((tag << 4) | class | (4 - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
}

pub fn encode_app_value(out: &mut Vec<u8>, value: &AppValue) {
    match value {
        AppValue::Null => out.push(0x00),
        AppValue::Boolean(state) => out.push(0x10 | u8::from(*state)),
        AppValue::Unsigned(value) => encode_unsigned_tag(out, 2, false, *value),
        AppValue::Signed(value) => {
            let bytes = value.to_be_bytes();
            // 去掉冗余的符号扩展字节
            let mut skip = 0;
            while skip < 3 {
                let redundant = (bytes[skip] == 0x00 && bytes[skip + 1] & 0x80 == 0)
                    || (bytes[skip] == 0xFF && bytes[skip + 1] & 0x80 != 0);
                if !redundant {
                    break;
                }
                skip += 1;
            }
            out.push(0x30 | (4 - skip) as u8);
            out.extend_from_slice(&bytes[skip..]);
        }
        AppValue::Real(value) => {
            out.push(0x44);
            out.extend_from_slice(&value.to_be_bytes());
        }
        AppValue::Double(value) => {
            out.extend_from_slice(&[0x55, 0x08]);
            out.extend_from_slice(&value.to_be_bytes());
        }
        AppValue::CharString(text) => {
            let length = text.len() + 1;
            if length <= 4 {
                out.push(0x70 | length as u8);
            } else if length < 254 {
                out.extend_from_slice(&[0x75, length as u8]);
            } else {
                out.extend_from_slice(&[0x75, 254]);
                out.extend_from_slice(&(length as u16).to_be_bytes());
            }
            // UTF-8 字符集
            out.push(0x00);
            out.extend_from_slice(text.as_bytes());
        }
        AppValue::Enumerated(value) => encode_unsigned_tag(out, 9, false, *value),
        AppValue::ObjectId(object_type, instance) => {
            out.push(0xC4);
            out.extend_from_slice(&object_id_bits(*object_type, *instance).to_be_bytes());
        }
        AppValue::Other(_) => out.push(0x00),
    }
}

// ---------------------------------------------------------------------------
// APDU 解码

#[derive(Debug, Clone, Copy)]
struct Tag {
    number: u8,
    context: bool,
    /// 数据长度；应用布尔值时为取值
    length: usize,
    opening: bool,
    closing: bool,
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn byte(&mut self) -> Result<u8, String> {
        let byte = *self.buf.get(self.pos).ok_or("truncated apdu")?;
        self.pos += 1;
        Ok(byte)
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], String> {
        // 扩展长度可达 u32::MAX，32 位目标上需要防止溢出
        let end = self.pos.checked_add(count).ok_or("truncated apdu")?;
        let slice = self.buf.get(self.pos..end).ok_or("truncated apdu")?;
        self.pos = end;
        Ok(slice)
    }

    fn peek_tag(&self) -> Result<Tag, String> {
        let mut probe = Reader {
            buf: self.buf,
            pos: self.pos,
        };
        probe.tag()
    }

    fn tag(&mut self) -> Result<Tag, String> {
        let first = self.byte()?;
        let mut number = first >> 4;
        if number == 0x0F {
            number = self.byte()?;
        }
        let context = first & 0x08 != 0;
        let lvt = first & 0x07;
        if context && lvt == 6 {
            return Ok(Tag {
                number,
                context,
                length: 0,
                opening: true,
                closing: false,
            });
        }
        if context && lvt == 7 {
            return Ok(Tag {
                number,
                context,
                length: 0,
                opening: false,
                closing: true,
            });
        }
        let length = if lvt == 5 {
            match self.byte()? {
                254 => {
                    let raw = self.take(2)?;
                    usize::from(u16::from_be_bytes([raw[0], raw[1]]))
                }
                255 => {
                    let raw = self.take(4)?;
                    u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize
                }
                short => usize::from(short),
            }
        } else {
            usize::from(lvt)
        };
        Ok(Tag {
            number,
            context,
            length,
            opening: false,
            closing: false,
        })
    }

    fn unsigned(&mut self, length: usize) -> Result<u32, String> {
        if length == 0 || length > 4 {
            return Err(format!("unsigned length {} not supported", length));
        }
        Ok(self
            .take(length)?
            .iter()
            .fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte)))
    }

    fn context_unsigned(&mut self, expected: u8) -> Result<u32, String> {
        let tag = self.tag()?;
        if !tag.context || tag.number != expected || tag.opening || tag.closing {
            return Err(format!("expected context tag {}", expected));
        }
        self.unsigned(tag.length)
    }

    fn app_value(&mut self) -> Result<AppValue, String> {
        let tag = self.tag()?;
        if tag.context || tag.opening || tag.closing {
            return Err("expected application tag".to_string());
        }
        let value = match tag.number {
            0 => AppValue::Null,
            1 => AppValue::Boolean(tag.length != 0),
            2 => AppValue::Unsigned(self.unsigned(tag.length)?),
            3 => {
                if tag.length == 0 || tag.length > 4 {
                    return Err(format!("signed length {} not supported", tag.length));
                }
                let raw = self.take(tag.length)?;
                let fill = if raw[0] & 0x80 != 0 { 0xFF } else { 0x00 };
                let mut bytes = [fill; 4];
                bytes[4 - raw.len()..].copy_from_slice(raw);
                AppValue::Signed(i32::from_be_bytes(bytes))
            }
            4 => {
                let raw = self.take(4)?;
                AppValue::Real(f32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
            }
            5 => {
                let raw = self.take(8)?;
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(raw);
                AppValue::Double(f64::from_be_bytes(bytes))
            }
            7 => {
                let raw = self.take(tag.length)?;
                match raw.split_first() {
                    Some((0x00, text)) => {
                        AppValue::CharString(String::from_utf8_lossy(text).into_owned())
                    }
                    Some((charset, _)) => {
                        return Err(format!("character set {} not supported", charset))
                    }
                    None => AppValue::CharString(String::new()),
                }
            }
            9 => AppValue::Enumerated(self.unsigned(tag.length)?),
            12 => {
                let bits = self.unsigned(4)?;
                AppValue::ObjectId((bits >> 22) as u16, bits & 0x3F_FFFF)
            }
            other => {
                self.take(tag.length)?;
                AppValue::Other(other)
            }
        };
        Ok(value)
    }
}

pub fn decode_apdu(apdu: &[u8]) -> Result<Apdu, String> {
    let mut reader = Reader::new(apdu);
    let first = reader.byte()?;
    match first >> 4 {
        // Unconfirmed-Request
        0x1 => match reader.byte()? {
            SERVICE_WHO_IS => Ok(Apdu::WhoIs),
            SERVICE_I_AM => decode_i_am(&mut reader),
            _ => Ok(Apdu::Other),
        },
        // SimpleACK
        0x2 => Ok(Apdu::SimpleAck {
            invoke_id: reader.byte()?,
            service: reader.byte()?,
        }),
        // ComplexACK
        0x3 => {
            if first & 0x08 != 0 {
                return Err("segmented complex ack not supported".to_string());
            }
            let invoke_id = reader.byte()?;
            match reader.byte()? {
                SERVICE_READ_PROPERTY => decode_read_property_ack(&mut reader, invoke_id),
                _ => Ok(Apdu::Other),
            }
        }
        // Error
        0x5 => {
            let invoke_id = reader.byte()?;
            let service = reader.byte()?;
            let class = match reader.app_value()? {
                AppValue::Enumerated(value) => value,
                _ => return Err("error class must be enumerated".to_string()),
            };
            let code = match reader.app_value()? {
                AppValue::Enumerated(value) => value,
                _ => return Err("error code must be enumerated".to_string()),
            };
            Ok(Apdu::Error {
                invoke_id,
                service,
                class,
                code,
            })
        }
        0x6 => Ok(Apdu::Reject {
            invoke_id: reader.byte()?,
            reason: reader.byte()?,
        }),
        0x7 => Ok(Apdu::Abort {
            invoke_id: reader.byte()?,
            reason: reader.byte()?,
        }),
        _ => Ok(Apdu::Other),
    }
}

fn decode_i_am(reader: &mut Reader<'_>) -> Result<Apdu, String> {
    let device_instance = match reader.app_value()? {
        AppValue::ObjectId(8, instance) => instance,
        other => return Err(format!("i-am must start with a device id, got {:?}", other)),
    };
    let max_apdu = match reader.app_value()? {
        AppValue::Unsigned(value) => value,
        _ => return Err("i-am max apdu must be unsigned".to_string()),
    };
    let segmentation = match reader.app_value()? {
        AppValue::Enumerated(value) => value,
        _ => return Err("i-am segmentation must be enumerated".to_string()),
    };
    let vendor_id = match reader.app_value()? {
        AppValue::Unsigned(value) => value,
        _ => return Err("i-am vendor id must be unsigned".to_string()),
    };
    Ok(Apdu::IAm {
        device_instance,
        max_apdu,
        segmentation,
        vendor_id,
    })
}

fn decode_read_property_ack(reader: &mut Reader<'_>, invoke_id: u8) -> Result<Apdu, String> {
    let tag = reader.tag()?;
    if !tag.context || tag.number != 0 || tag.length != 4 {
        return Err("read-property ack missing object id".to_string());
    }
    let bits = reader.unsigned(4)?;
    let property = reader.context_unsigned(1)?;

    let mut next = reader.tag()?;
    if next.context && next.number == 2 && !next.opening {
        // 数组下标
        reader.unsigned(next.length)?;
        next = reader.tag()?;
    }
    if !(next.opening && next.number == 3) {
        return Err("read-property ack missing value".to_string());
    }
    let value = reader.app_value()?;
    // 多值（数组 / 列表）只取第一个
    while !reader.is_empty() {
        let peek = reader.peek_tag()?;
        if peek.closing && peek.number == 3 {
            reader.tag()?;
            break;
        }
        reader.app_value()?;
    }
    Ok(Apdu::ReadPropertyAck {
        invoke_id,
        object_type: (bits >> 22) as u16,
        instance: bits & 0x3F_FFFF,
        property,
        value,
    })
}

// ---------------------------------------------------------------------------
// present-value 与点位值互转

/// 按对象类型把 present-value 映射为点位值。
pub fn to_point_value(object_type: ObjectType, value: AppValue) -> Result<PointValue, String> {
    match value {
        AppValue::Boolean(state) => Ok(PointValue::Bool(state)),
        AppValue::Enumerated(state) if object_type.is_binary() => Ok(PointValue::Bool(state != 0)),
        AppValue::Enumerated(state) => Ok(PointValue::Int(i64::from(state))),
        AppValue::Unsigned(state) if object_type.is_binary() => Ok(PointValue::Bool(state != 0)),
        AppValue::Unsigned(value) => Ok(PointValue::Int(i64::from(value))),
        AppValue::Signed(value) => Ok(PointValue::Int(i64::from(value))),
        AppValue::Real(value) => Ok(PointValue::Float(f64::from(value))),
        AppValue::Double(value) => Ok(PointValue::Float(value)),
        AppValue::CharString(text) => Ok(PointValue::String(text)),
        AppValue::Null => Err("present-value is null".to_string()),
        AppValue::ObjectId(..) | AppValue::Other(_) => {
            Err(format!("unexpected present-value encoding {:?}", value))
        }
    }
}

/// 按对象类型编码写入值：模拟量为 REAL，开关量为枚举，多态为无符号整数。
pub fn from_point_value(object_type: ObjectType, value: &PointValue) -> Result<AppValue, String> {
    if object_type.is_binary() {
        return match value {
            PointValue::Bool(state) => Ok(AppValue::Enumerated(u32::from(*state))),
            PointValue::Int(state @ (0 | 1)) => Ok(AppValue::Enumerated(*state as u32)),
            other => Err(format!("binary object expects bool, got {}", other)),
        };
    }
    if object_type.is_multistate() {
        return match value {
            PointValue::Int(state) if *state >= 1 && *state <= i64::from(u32::MAX) => {
                Ok(AppValue::Unsigned(*state as u32))
            }
            other => Err(format!("multi-state object expects state >= 1, got {}", other)),
        };
    }
    match value {
        PointValue::Float(value) if value.is_finite() => Ok(AppValue::Real(*value as f32)),
        PointValue::Int(value) => Ok(AppValue::Real(*value as f32)),
        other => Err(format!("analog object expects a number, got {}", other)),
    }
}
