//! BACnet MS/TP（RS-485）
//!
//! 帧格式：`55 FF | type dest src len_hi len_lo | header_crc | data | crc16(低字节在前)`。
//! 网关作为主站直接发起请求并等待回复，不参与令牌轮转，也不应答 Poll-For-Master。
//! 因此只适用于网关是总线上唯一主站的场景（其余设备均为从站）；
//! 有其他主站在轮转令牌时，网关的请求会与令牌持有者的发送冲突。
//! 收到其他主站的令牌帧时记录 `mstp_foreign_master_detected` 告警。

use super::codec::{self, Apdu};
use super::{bacnet_object, read_reply, write_reply, InvokeIds};
use crate::address::{BacnetDevice, PointTarget};
use crate::error::TransportError;
use crate::serial::open_serial;
use crate::transport::FieldTransport;
use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use domain::{Device, PointValue, ProtocolConfig};
use futures::{SinkExt, StreamExt};
use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_serial::SerialStream;
use tokio_util::codec::{Decoder, Encoder, Framed};
use tracing::{debug, info, warn};

const PREAMBLE: [u8; 2] = [0x55, 0xFF];
const HEADER_LEN: usize = 8;
const MAX_DATA_LEN: usize = 501;
pub const BROADCAST_MAC: u8 = 0xFF;
/// 未配置本站地址时使用
pub const DEFAULT_STATION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Token,
    PollForMaster,
    ReplyToPollForMaster,
    TestRequest,
    TestResponse,
    DataExpectingReply,
    DataNotExpectingReply,
    ReplyPostponed,
    Other(u8),
}

impl FrameType {
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0 => FrameType::Token,
            1 => FrameType::PollForMaster,
            2 => FrameType::ReplyToPollForMaster,
            3 => FrameType::TestRequest,
            4 => FrameType::TestResponse,
            5 => FrameType::DataExpectingReply,
            6 => FrameType::DataNotExpectingReply,
            7 => FrameType::ReplyPostponed,
            other => FrameType::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            FrameType::Token => 0,
            FrameType::PollForMaster => 1,
            FrameType::ReplyToPollForMaster => 2,
            FrameType::TestRequest => 3,
            FrameType::TestResponse => 4,
            FrameType::DataExpectingReply => 5,
            FrameType::DataNotExpectingReply => 6,
            FrameType::ReplyPostponed => 7,
            FrameType::Other(raw) => raw,
        }
    }

    fn carries_npdu(self) -> bool {
        matches!(
            self,
            FrameType::DataExpectingReply | FrameType::DataNotExpectingReply
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MstpFrame {
    pub frame_type: FrameType,
    pub destination: u8,
    pub source: u8,
    pub data: Bytes,
}

impl MstpFrame {
    pub fn to_bytes(&self) -> Result<Vec<u8>, io::Error> {
        if self.data.len() > MAX_DATA_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("ms/tp data length {} exceeds {}", self.data.len(), MAX_DATA_LEN),
            ));
        }
        let length = self.data.len() as u16;
        let header = [
            self.frame_type.as_u8(),
            self.destination,
            self.source,
            (length >> 8) as u8,
            length as u8,
        ];
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len() + 2);
        out.extend_from_slice(&PREAMBLE);
        out.extend_from_slice(&header);
        out.push(header_crc(&header));
        if !self.data.is_empty() {
            out.extend_from_slice(&self.data);
            out.extend_from_slice(&data_crc(&self.data).to_le_bytes());
        }
        Ok(out)
    }
}

/// 帧头 CRC-8（x^8 + x^7 + 1），结果取反。
pub fn header_crc(header: &[u8]) -> u8 {
    let crc = header.iter().fold(0xFFu8, |crc, byte| {
        let mut value = u16::from(crc ^ byte);
        value ^= (value << 1)
            ^ (value << 2)
            ^ (value << 3)
            ^ (value << 4)
            ^ (value << 5)
            ^ (value << 6)
            ^ (value << 7);
        ((value & 0xFE) ^ ((value >> 8) & 1)) as u8
    });
    !crc
}

/// 数据 CRC-16（CRC-CCITT 反射），结果取反。
pub fn data_crc(data: &[u8]) -> u16 {
    let crc = data.iter().fold(0xFFFFu16, |crc, byte| {
        let low = (crc & 0xFF) ^ u16::from(*byte);
        (crc >> 8)
            ^ (low << 8)
            ^ (low << 3)
            ^ (low << 12)
            ^ (low >> 4)
            ^ (low & 0x0F)
            ^ ((low & 0x0F) << 7)
    });
    !crc
}

/// MS/TP 帧编解码。CRC 错误的帧被丢弃并重新同步到下一个前导。
#[derive(Debug, Default)]
pub struct MstpCodec;

impl Decoder for MstpCodec {
    type Item = MstpFrame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<MstpFrame>, io::Error> {
        loop {
            match src.windows(2).position(|pair| pair == PREAMBLE) {
                Some(start) => src.advance(start),
                None => {
                    // 末尾的 0x55 可能是下一帧前导的前半
                    let keep = usize::from(src.last() == Some(&PREAMBLE[0]));
                    let discard = src.len() - keep;
                    src.advance(discard);
                    return Ok(None);
                }
            }
            if src.len() < HEADER_LEN {
                return Ok(None);
            }
            if header_crc(&src[2..7]) != src[7] {
                src.advance(1);
                continue;
            }
            let length = usize::from(u16::from_be_bytes([src[5], src[6]]));
            if length > MAX_DATA_LEN {
                src.advance(1);
                continue;
            }
            let frame_type = FrameType::from_u8(src[2]);
            let destination = src[3];
            let source = src[4];
            if length == 0 {
                src.advance(HEADER_LEN);
                return Ok(Some(MstpFrame {
                    frame_type,
                    destination,
                    source,
                    data: Bytes::new(),
                }));
            }

            let total = HEADER_LEN + length + 2;
            if src.len() < total {
                src.reserve(total - src.len());
                return Ok(None);
            }
            let data_end = HEADER_LEN + length;
            let expected = u16::from_le_bytes([src[data_end], src[data_end + 1]]);
            if data_crc(&src[HEADER_LEN..data_end]) != expected {
                src.advance(total);
                continue;
            }
            src.advance(HEADER_LEN);
            let data = src.split_to(length).freeze();
            src.advance(2);
            return Ok(Some(MstpFrame {
                frame_type,
                destination,
                source,
                data,
            }));
        }
    }
}

impl Encoder<MstpFrame> for MstpCodec {
    type Error = io::Error;

    fn encode(&mut self, frame: MstpFrame, dst: &mut BytesMut) -> Result<(), io::Error> {
        dst.extend_from_slice(&frame.to_bytes()?);
        Ok(())
    }
}

type MstpPort = Framed<SerialStream, MstpCodec>;

/// 令牌轮转流量：其他站发出的 Token / Poll-For-Master 帧说明总线上还有主站。
fn is_foreign_master(frame: &MstpFrame, station: u8) -> bool {
    frame.source != station
        && matches!(
            frame.frame_type,
            FrameType::Token | FrameType::PollForMaster
        )
}

/// 单主站 MS/TP 传输：不持有令牌即发送请求，只能用于没有其他主站的总线。
pub struct BacnetMstpTransport {
    name: String,
    config: ProtocolConfig,
    station: u8,
    port: Mutex<Option<MstpPort>>,
    invoke_ids: InvokeIds,
    foreign_master: AtomicBool,
}

impl BacnetMstpTransport {
    pub fn new(name: impl Into<String>, config: ProtocolConfig) -> Self {
        let station = config.station_address.unwrap_or(DEFAULT_STATION);
        Self {
            name: name.into(),
            config,
            station,
            port: Mutex::new(None),
            invoke_ids: InvokeIds::default(),
            foreign_master: AtomicBool::new(false),
        }
    }

    /// 每个传输只告警一次。
    fn note_master_traffic(&self, frame: &MstpFrame) {
        if is_foreign_master(frame, self.station)
            && !self.foreign_master.swap(true, Ordering::Relaxed)
        {
            warn!(
                target: "fpg.protocol",
                protocol = %self.name,
                station = self.station,
                source = frame.source,
                frame_type = ?frame.frame_type,
                "mstp_foreign_master_detected"
            );
        }
    }

    fn open(&self) -> Result<MstpPort, TransportError> {
        let stream = open_serial(&self.config.connection)?;
        info!(target: "fpg.protocol", protocol = %self.name, station = self.station, "mstp_port_opened");
        Ok(Framed::new(stream, MstpCodec))
    }

    fn data_frame(&self, frame_type: FrameType, destination: u8, apdu: &[u8]) -> MstpFrame {
        let expecting_reply = frame_type == FrameType::DataExpectingReply;
        let mut data = Vec::with_capacity(apdu.len() + 2);
        data.extend_from_slice(&codec::encode_npdu(expecting_reply));
        data.extend_from_slice(apdu);
        MstpFrame {
            frame_type,
            destination,
            source: self.station,
            data: Bytes::from(data),
        }
    }

    /// 发送请求并等待目标 MAC 回给本站、invoke id 相同的数据帧。
    async fn transact(&self, mac: u8, invoke_id: u8, apdu: &[u8]) -> Result<Apdu, TransportError> {
        let request = self.data_frame(FrameType::DataExpectingReply, mac, apdu);
        let mut slot = self.port.lock().await;
        let port = match slot.take() {
            Some(port) => port,
            None => self.open()?,
        };
        let port = slot.insert(port);

        port.send(request).await?;
        loop {
            let frame = port
                .next()
                .await
                .ok_or_else(|| TransportError::Connection("serial port closed".to_string()))??;
            self.note_master_traffic(&frame);
            if frame.source != mac || frame.destination != self.station {
                continue;
            }
            if !frame.frame_type.carries_npdu() {
                continue;
            }
            match decode_frame(&frame) {
                Ok(Some(reply)) if reply.invoke_id() == Some(invoke_id) => return Ok(reply),
                Ok(_) => {}
                Err(detail) => {
                    debug!(target: "fpg.protocol", protocol = %self.name, mac, %detail, "mstp_frame_skipped");
                }
            }
        }
    }
}

fn decode_frame(frame: &MstpFrame) -> Result<Option<Apdu>, String> {
    match codec::decode_npdu(&frame.data)? {
        Some(apdu) => codec::decode_apdu(apdu).map(Some),
        None => Ok(None),
    }
}

fn mstp_mac(target: &PointTarget) -> Result<u8, TransportError> {
    match target {
        PointTarget::Bacnet {
            device: BacnetDevice::Mstp { mac },
            ..
        } => Ok(*mac),
        other => Err(TransportError::IllegalAddress(format!(
            "{} is not an ms/tp address",
            other
        ))),
    }
}

#[async_trait]
impl FieldTransport for BacnetMstpTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut slot = self.port.lock().await;
        if slot.is_none() {
            *slot = Some(self.open()?);
        }
        Ok(())
    }

    async fn close(&self) {
        if self.port.lock().await.take().is_some() {
            debug!(target: "fpg.protocol", protocol = %self.name, "mstp_port_closed");
        }
    }

    async fn read(&self, target: &PointTarget) -> Result<PointValue, TransportError> {
        let object = bacnet_object(target)?;
        let mac = mstp_mac(target)?;
        let invoke_id = self.invoke_ids.next();
        let reply = self
            .transact(mac, invoke_id, &codec::encode_read_property(invoke_id, object))
            .await?;
        read_reply(reply, target, object)
    }

    async fn write(&self, target: &PointTarget, value: &PointValue) -> Result<(), TransportError> {
        let object = bacnet_object(target)?;
        let mac = mstp_mac(target)?;
        let encoded =
            codec::from_point_value(object.object_type, value).map_err(TransportError::InvalidValue)?;
        let invoke_id = self.invoke_ids.next();
        let reply = self
            .transact(
                mac,
                invoke_id,
                &codec::encode_write_property(invoke_id, object, &encoded),
            )
            .await?;
        write_reply(reply, target)
    }

    async fn probe(&self, _unit: u8, _timeout: Duration) -> Result<bool, TransportError> {
        Err(TransportError::Unsupported(
            "bacnet discovery uses who-is".to_string(),
        ))
    }

    async fn who_is(&self, window: Duration) -> Result<Vec<Device>, TransportError> {
        let request = self.data_frame(
            FrameType::DataNotExpectingReply,
            BROADCAST_MAC,
            &codec::encode_who_is(),
        );
        let mut slot = self.port.lock().await;
        let port = match slot.take() {
            Some(port) => port,
            None => self.open()?,
        };
        let port = slot.insert(port);
        port.send(request).await?;

        let deadline = tokio::time::Instant::now() + window;
        let mut found = BTreeMap::new();
        loop {
            match tokio::time::timeout_at(deadline, port.next()).await {
                Err(_elapsed) => break,
                Ok(None) => {
                    return Err(TransportError::Connection("serial port closed".to_string()))
                }
                Ok(Some(Err(err))) => return Err(err.into()),
                Ok(Some(Ok(frame))) => {
                    self.note_master_traffic(&frame);
                    if !frame.frame_type.carries_npdu() {
                        continue;
                    }
                    if let Ok(Some(Apdu::IAm {
                        device_instance, ..
                    })) = decode_frame(&frame)
                    {
                        found.insert(frame.source, device_instance);
                    }
                }
            }
        }

        Ok(found
            .into_iter()
            .map(|(mac, instance)| {
                Device::new(
                    mac.to_string(),
                    format!("BACnet MS/TP device {} at MAC {}", instance, mac),
                )
            })
            .collect())
    }
}
