//! BACnet/IP（UDP，BVLC 封装）

use super::codec::{self, Apdu, BVLC_ORIGINAL_BROADCAST, BVLC_ORIGINAL_UNICAST};
use super::{bacnet_object, read_reply, write_reply, InvokeIds};
use crate::address::{BacnetDevice, PointTarget};
use crate::error::TransportError;
use crate::transport::FieldTransport;
use async_trait::async_trait;
use domain::{ConnectionType, Device, PointValue, ProtocolConfig};
use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::RwLock;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::{debug, info};

const MAX_DATAGRAM: usize = 1500;

pub struct BacnetIpTransport {
    name: String,
    config: ProtocolConfig,
    socket: Mutex<Option<UdpSocket>>,
    /// I-Am 学到的设备实例号 -> 地址
    devices: RwLock<HashMap<u32, SocketAddr>>,
    invoke_ids: InvokeIds,
}

impl BacnetIpTransport {
    pub fn new(name: impl Into<String>, config: ProtocolConfig) -> Self {
        Self {
            name: name.into(),
            config,
            socket: Mutex::new(None),
            devices: RwLock::new(HashMap::new()),
            invoke_ids: InvokeIds::default(),
        }
    }

    fn endpoint(&self) -> Result<(&str, u16), TransportError> {
        match &self.config.connection {
            ConnectionType::Network {
                ip_address, port, ..
            } => Ok((ip_address.as_str(), *port)),
            ConnectionType::Serial { .. } => Err(TransportError::Connection(
                "bacnet/ip requires a network connection".to_string(),
            )),
        }
    }

    async fn bind(&self) -> Result<UdpSocket, TransportError> {
        let (ip, port) = self.endpoint()?;
        let socket = UdpSocket::bind((ip, port))
            .await
            .map_err(|err| TransportError::Connection(format!("bind {}:{}: {}", ip, port, err)))?;
        socket.set_broadcast(true)?;
        info!(
            target: "fpg.protocol",
            protocol = %self.name,
            local = ?socket.local_addr().ok(),
            "bacnet_ip_bound"
        );
        Ok(socket)
    }

    fn resolve(&self, device: BacnetDevice) -> Result<SocketAddr, TransportError> {
        match device {
            BacnetDevice::Ip {
                address: Some(address),
                ..
            } => Ok(address),
            BacnetDevice::Ip {
                instance,
                address: None,
            } => {
                let devices = self
                    .devices
                    .read()
                    .map_err(|_| TransportError::Connection("device cache lock failed".to_string()))?;
                devices.get(&instance).copied().ok_or_else(|| {
                    TransportError::IllegalAddress(format!(
                        "device {} has not answered who-is; use instance@ip:port",
                        instance
                    ))
                })
            }
            BacnetDevice::Mstp { mac } => Err(TransportError::IllegalAddress(format!(
                "ms/tp mac {} on a bacnet/ip protocol",
                mac
            ))),
        }
    }

    fn remember(&self, found: &BTreeMap<u32, SocketAddr>) {
        if let Ok(mut devices) = self.devices.write() {
            devices.extend(found.iter().map(|(instance, addr)| (*instance, *addr)));
        }
    }

    /// 发送确认请求并等待同一 invoke id 的响应；其它报文跳过。
    async fn transact(
        &self,
        peer: SocketAddr,
        invoke_id: u8,
        apdu: &[u8],
    ) -> Result<Apdu, TransportError> {
        let frame = codec::encode_bvlc(BVLC_ORIGINAL_UNICAST, true, apdu);
        let mut slot = self.socket.lock().await;
        let socket = match slot.take() {
            Some(socket) => socket,
            None => self.bind().await?,
        };
        let socket = slot.insert(socket);

        socket.send_to(&frame, peer).await?;
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            let (len, from) = socket.recv_from(&mut buf).await?;
            if from.ip() != peer.ip() {
                continue;
            }
            match codec::decode_ip_frame(&buf[..len]) {
                Ok(Some(reply)) if reply.invoke_id() == Some(invoke_id) => return Ok(reply),
                Ok(_) => {}
                Err(detail) => {
                    debug!(target: "fpg.protocol", protocol = %self.name, %from, %detail, "bacnet_frame_skipped");
                }
            }
        }
    }
}

#[async_trait]
impl FieldTransport for BacnetIpTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut slot = self.socket.lock().await;
        if slot.is_none() {
            *slot = Some(self.bind().await?);
        }
        Ok(())
    }

    async fn close(&self) {
        if self.socket.lock().await.take().is_some() {
            debug!(target: "fpg.protocol", protocol = %self.name, "bacnet_ip_closed");
        }
    }

    async fn read(&self, target: &PointTarget) -> Result<PointValue, TransportError> {
        let object = bacnet_object(target)?;
        let PointTarget::Bacnet { device, .. } = target else {
            return Err(TransportError::IllegalAddress(target.to_string()));
        };
        let peer = self.resolve(*device)?;
        let invoke_id = self.invoke_ids.next();
        let reply = self
            .transact(peer, invoke_id, &codec::encode_read_property(invoke_id, object))
            .await?;
        read_reply(reply, target, object)
    }

    async fn write(&self, target: &PointTarget, value: &PointValue) -> Result<(), TransportError> {
        let object = bacnet_object(target)?;
        let PointTarget::Bacnet { device, .. } = target else {
            return Err(TransportError::IllegalAddress(target.to_string()));
        };
        let encoded =
            codec::from_point_value(object.object_type, value).map_err(TransportError::InvalidValue)?;
        let peer = self.resolve(*device)?;
        let invoke_id = self.invoke_ids.next();
        let reply = self
            .transact(
                peer,
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
        let (_, port) = self.endpoint()?;
        let broadcast = SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), port);
        let frame = codec::encode_bvlc(BVLC_ORIGINAL_BROADCAST, false, &codec::encode_who_is());

        let mut slot = self.socket.lock().await;
        let socket = match slot.take() {
            Some(socket) => socket,
            None => self.bind().await?,
        };
        let socket = slot.insert(socket);
        socket.send_to(&frame, broadcast).await?;

        let deadline = tokio::time::Instant::now() + window;
        let mut found = BTreeMap::new();
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            match tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
                Err(_elapsed) => break,
                Ok(Err(err)) => return Err(err.into()),
                Ok(Ok((len, from))) => {
                    if let Ok(Some(Apdu::IAm {
                        device_instance, ..
                    })) = codec::decode_ip_frame(&buf[..len])
                    {
                        found.insert(device_instance, from);
                    }
                }
            }
        }
        drop(slot);

        self.remember(&found);
        Ok(found
            .into_iter()
            .map(|(instance, addr)| {
                Device::new(instance.to_string(), format!("BACnet device {} at {}", instance, addr))
            })
            .collect())
    }
}
