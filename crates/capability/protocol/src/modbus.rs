//! Modbus TCP / RTU 传输
//!
//! 每个连接持有一个 tokio-modbus 上下文。事务进行时上下文被取出，
//! 正常完成才放回；事务被超时取消时上下文随之丢弃，下次调用重新打开，
//! 避免迟到的响应污染下一次事务。
//!
//! 发现探测：TCP 每个探测使用独立短连接，可并发；RTU 共用串口上下文，逐个进行。

use crate::address::{PointTarget, RegisterTable};
use crate::error::TransportError;
use crate::serial::open_serial;
use crate::transport::FieldTransport;
use crate::types::{decode_registers, encode_registers, ModbusDataType};
use async_trait::async_trait;
use domain::{ConnectionType, Device, PointValue, ProtocolConfig};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_modbus::client::{rtu, tcp, Client as _, Context, Reader as _, Writer as _};
use tokio_modbus::slave::{Slave, SlaveContext as _};
use tokio_modbus::ExceptionCode;
use tracing::{debug, info};

/// 单次 Modbus 事务
enum Op<'a> {
    ReadBits(RegisterTable, u16),
    ReadRegisters(RegisterTable, u16, u16),
    WriteCoil(u16, bool),
    WriteRegisters(u16, &'a [u16]),
}

enum Reply {
    Bits(Vec<bool>),
    Registers(Vec<u16>),
    Written,
}

pub struct ModbusTransport {
    name: String,
    config: ProtocolConfig,
    ctx: Mutex<Option<Context>>,
}

impl ModbusTransport {
    pub fn new(name: impl Into<String>, config: ProtocolConfig) -> Self {
        Self {
            name: name.into(),
            config,
            ctx: Mutex::new(None),
        }
    }

    async fn open(&self) -> Result<Context, TransportError> {
        match &self.config.connection {
            ConnectionType::Network {
                ip_address, port, ..
            } => {
                let addr = tokio::net::lookup_host((ip_address.as_str(), *port))
                    .await?
                    .next()
                    .ok_or_else(|| {
                        TransportError::Connection(format!("cannot resolve {}", ip_address))
                    })?;
                let ctx = tcp::connect(addr)
                    .await
                    .map_err(|err| TransportError::Connection(format!("{}: {}", addr, err)))?;
                Ok(ctx)
            }
            serial @ ConnectionType::Serial { .. } => Ok(rtu::attach(open_serial(serial)?)),
        }
    }

    /// 执行一次事务。`Ok(Err(code))` 为设备异常响应。
    async fn call(
        &self,
        unit: u8,
        op: Op<'_>,
    ) -> Result<Result<Reply, ExceptionCode>, TransportError> {
        let mut slot = self.ctx.lock().await;
        let mut ctx = match slot.take() {
            Some(ctx) => ctx,
            None => self.open().await?,
        };
        ctx.set_slave(Slave(unit));

        let result = match op {
            Op::ReadBits(RegisterTable::Coil, address) => ctx
                .read_coils(address, 1)
                .await
                .map(|reply| reply.map(Reply::Bits)),
            Op::ReadBits(_, address) => ctx
                .read_discrete_inputs(address, 1)
                .await
                .map(|reply| reply.map(Reply::Bits)),
            Op::ReadRegisters(RegisterTable::InputRegister, address, count) => ctx
                .read_input_registers(address, count)
                .await
                .map(|reply| reply.map(Reply::Registers)),
            Op::ReadRegisters(_, address, count) => ctx
                .read_holding_registers(address, count)
                .await
                .map(|reply| reply.map(Reply::Registers)),
            Op::WriteCoil(address, state) => ctx
                .write_single_coil(address, state)
                .await
                .map(|reply| reply.map(|_| Reply::Written)),
            Op::WriteRegisters(address, [word]) => ctx
                .write_single_register(address, *word)
                .await
                .map(|reply| reply.map(|_| Reply::Written)),
            Op::WriteRegisters(address, words) => ctx
                .write_multiple_registers(address, words)
                .await
                .map(|reply| reply.map(|_| Reply::Written)),
        };

        match result {
            Ok(reply) => {
                *slot = Some(ctx);
                Ok(reply)
            }
            Err(tokio_modbus::Error::Transport(err)) => {
                // 传输已损坏，丢弃上下文
                Err(TransportError::Connection(err.to_string()))
            }
            Err(other) => {
                *slot = Some(ctx);
                Err(TransportError::Decode(other.to_string()))
            }
        }
    }
}

impl ModbusTransport {
    /// TCP 探测：每次使用独立的短连接，并发 worker 之间以及与读写上下文互不阻塞。
    /// 建连与请求共用同一个超时。
    async fn probe_detached(&self, unit: u8, timeout: Duration) -> Result<bool, TransportError> {
        let exchange = async {
            let mut ctx = self.open().await?;
            ctx.set_slave(Slave(unit));
            let reply = ctx.read_holding_registers(0, 1).await;
            let _ = ctx.disconnect().await;
            Ok::<_, TransportError>(reply)
        };
        match tokio::time::timeout(timeout, exchange).await {
            // 正常响应或异常响应都说明站号存在
            Ok(Ok(Ok(_))) => Ok(true),
            Ok(Ok(Err(tokio_modbus::Error::Transport(err)))) => {
                Err(TransportError::Connection(err.to_string()))
            }
            Ok(Ok(Err(other))) => {
                debug!(target: "fpg.protocol", protocol = %self.name, unit, error = %other, "modbus_probe_garbled");
                Ok(false)
            }
            Ok(Err(err)) => Err(err),
            Err(_elapsed) => Ok(false),
        }
    }
}

fn exception(code: ExceptionCode, target: &PointTarget) -> TransportError {
    match code {
        ExceptionCode::IllegalDataAddress => {
            TransportError::IllegalAddress(format!("{}: illegal data address", target))
        }
        other => TransportError::Exception(format!("{}: {:?}", target, other)),
    }
}

fn modbus_target(
    target: &PointTarget,
) -> Result<(u8, RegisterTable, u16, ModbusDataType), TransportError> {
    match *target {
        PointTarget::Modbus {
            unit,
            table,
            register,
            data_type,
        } => Ok((unit, table, register, data_type)),
        PointTarget::Bacnet { .. } => Err(TransportError::IllegalAddress(format!(
            "{} is not a modbus address",
            target
        ))),
    }
}

#[async_trait]
impl FieldTransport for ModbusTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut slot = self.ctx.lock().await;
        if slot.is_none() {
            *slot = Some(self.open().await?);
            info!(target: "fpg.protocol", protocol = %self.name, "modbus_connected");
        }
        Ok(())
    }

    async fn close(&self) {
        let mut slot = self.ctx.lock().await;
        if let Some(mut ctx) = slot.take() {
            let _ = ctx.disconnect().await;
            debug!(target: "fpg.protocol", protocol = %self.name, "modbus_closed");
        }
    }

    async fn read(&self, target: &PointTarget) -> Result<PointValue, TransportError> {
        let (unit, table, register, data_type) = modbus_target(target)?;
        let op = if table.is_bit() {
            Op::ReadBits(table, register)
        } else {
            Op::ReadRegisters(table, register, data_type.register_count())
        };
        match self.call(unit, op).await? {
            Ok(Reply::Bits(bits)) => bits
                .first()
                .map(|bit| PointValue::Bool(*bit))
                .ok_or_else(|| TransportError::Decode(format!("{}: empty bit response", target))),
            Ok(Reply::Registers(words)) => decode_registers(&words, data_type)
                .map_err(|detail| TransportError::Decode(format!("{}: {}", target, detail))),
            Ok(Reply::Written) => Err(TransportError::Decode(format!(
                "{}: unexpected write response",
                target
            ))),
            Err(code) => Err(exception(code, target)),
        }
    }

    async fn write(&self, target: &PointTarget, value: &PointValue) -> Result<(), TransportError> {
        let (unit, table, register, data_type) = modbus_target(target)?;
        if !table.is_writable() {
            return Err(TransportError::IllegalAddress(format!(
                "{} is read-only",
                target
            )));
        }

        let reply = if table.is_bit() {
            let state = match value {
                PointValue::Bool(state) => *state,
                PointValue::Int(0) => false,
                PointValue::Int(1) => true,
                other => {
                    return Err(TransportError::InvalidValue(format!(
                        "coil expects bool, got {}",
                        other.kind()
                    )))
                }
            };
            self.call(unit, Op::WriteCoil(register, state)).await?
        } else {
            let words = encode_registers(value, data_type).map_err(TransportError::InvalidValue)?;
            self.call(unit, Op::WriteRegisters(register, &words)).await?
        };

        match reply {
            Ok(_) => Ok(()),
            Err(code) => Err(exception(code, target)),
        }
    }

    async fn probe(&self, unit: u8, timeout: Duration) -> Result<bool, TransportError> {
        if let ConnectionType::Network { .. } = &self.config.connection {
            return self.probe_detached(unit, timeout).await;
        }
        // RTU 半双工，探测只能逐个进行；锁内计时，排队等待不计入探测超时
        let mut slot = self.ctx.lock().await;
        let mut ctx = match slot.take() {
            Some(ctx) => ctx,
            None => self.open().await?,
        };
        ctx.set_slave(Slave(unit));
        match tokio::time::timeout(timeout, ctx.read_holding_registers(0, 1)).await {
            Ok(Ok(_)) => {
                // 正常响应或异常响应都说明站号存在
                *slot = Some(ctx);
                Ok(true)
            }
            Ok(Err(tokio_modbus::Error::Transport(err))) => {
                Err(TransportError::Connection(err.to_string()))
            }
            Ok(Err(other)) => {
                debug!(target: "fpg.protocol", protocol = %self.name, unit, error = %other, "modbus_probe_garbled");
                *slot = Some(ctx);
                Ok(false)
            }
            Err(_elapsed) => Ok(false),
        }
    }

    async fn who_is(&self, _window: Duration) -> Result<Vec<Device>, TransportError> {
        Err(TransportError::Unsupported(
            "modbus has no who-is broadcast".to_string(),
        ))
    }
}
