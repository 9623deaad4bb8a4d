//! BACnet/IP 与 BACnet MS/TP 传输
//!
//! 两种数据链路共享同一套 APDU 编解码，只负责 present-value 的读写与 Who-Is 发现。

pub mod codec;
mod ip;
pub mod mstp;

pub use ip::BacnetIpTransport;
pub use mstp::BacnetMstpTransport;

use crate::address::{ObjectId, PointTarget};
use crate::error::TransportError;
use codec::Apdu;
use domain::PointValue;
use std::sync::atomic::{AtomicU8, Ordering};

/// BACnet error-class / error-code 中表示"对象或属性不存在"的组合
const ERROR_CLASS_OBJECT: u32 = 1;
const ERROR_CLASS_PROPERTY: u32 = 2;
const ERROR_CODE_UNKNOWN_OBJECT: u32 = 31;
const ERROR_CODE_UNKNOWN_PROPERTY: u32 = 32;

/// 循环分配的 invoke id
#[derive(Debug, Default)]
pub(crate) struct InvokeIds(AtomicU8);

impl InvokeIds {
    pub(crate) fn next(&self) -> u8 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// 解析 ReadProperty 的响应。
pub(crate) fn read_reply(
    apdu: Apdu,
    target: &PointTarget,
    object: ObjectId,
) -> Result<PointValue, TransportError> {
    match apdu {
        Apdu::ReadPropertyAck {
            object_type,
            instance,
            value,
            ..
        } => {
            if object_type != object.object_type.code() || instance != object.instance {
                return Err(TransportError::Decode(format!(
                    "{}: ack for object {}:{}",
                    target, object_type, instance
                )));
            }
            codec::to_point_value(object.object_type, value)
                .map_err(|detail| TransportError::Decode(format!("{}: {}", target, detail)))
        }
        other => Err(failure(other, target)),
    }
}

/// 解析 WriteProperty 的响应。
pub(crate) fn write_reply(apdu: Apdu, target: &PointTarget) -> Result<(), TransportError> {
    match apdu {
        Apdu::SimpleAck { .. } => Ok(()),
        other => Err(failure(other, target)),
    }
}

fn failure(apdu: Apdu, target: &PointTarget) -> TransportError {
    match apdu {
        Apdu::Error { class, code, .. }
            if (class == ERROR_CLASS_OBJECT && code == ERROR_CODE_UNKNOWN_OBJECT)
                || (class == ERROR_CLASS_PROPERTY && code == ERROR_CODE_UNKNOWN_PROPERTY) =>
        {
            TransportError::IllegalAddress(format!("{}: unknown object or property", target))
        }
        Apdu::Error { class, code, .. } => TransportError::Exception(format!(
            "{}: error class {} code {}",
            target, class, code
        )),
        Apdu::Reject { reason, .. } => {
            TransportError::Exception(format!("{}: rejected, reason {}", target, reason))
        }
        Apdu::Abort { reason, .. } => {
            TransportError::Exception(format!("{}: aborted, reason {}", target, reason))
        }
        other => TransportError::Decode(format!("{}: unexpected reply {:?}", target, other)),
    }
}

pub(crate) fn bacnet_object(target: &PointTarget) -> Result<ObjectId, TransportError> {
    match target {
        PointTarget::Bacnet { object, .. } => Ok(*object),
        PointTarget::Modbus { .. } => Err(TransportError::IllegalAddress(format!(
            "{} is not a bacnet address",
            target
        ))),
    }
}
