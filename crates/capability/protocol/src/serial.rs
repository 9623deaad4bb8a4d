//! RS-485 串口打开与枚举

use crate::error::TransportError;
use domain::{ConnectionType, Parity};
use tokio_serial::SerialStream;

/// 主机串口枚举（无副作用查询）。
pub trait SerialPortLister: Send + Sync {
    fn available_ports(&self) -> Result<Vec<String>, TransportError>;
}

/// 通过 tokio-serial 枚举主机串口。
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSerialPorts;

impl SerialPortLister for SystemSerialPorts {
    fn available_ports(&self) -> Result<Vec<String>, TransportError> {
        let mut ports: Vec<String> = tokio_serial::available_ports()
            .map_err(|err| TransportError::Connection(err.to_string()))?
            .into_iter()
            .map(|info| info.port_name)
            .collect();
        ports.sort();
        ports.dedup();
        Ok(ports)
    }
}

/// 按串口参数打开端口；网络连接返回错误。
pub(crate) fn open_serial(connection: &ConnectionType) -> Result<SerialStream, TransportError> {
    let ConnectionType::Serial {
        port,
        baud_rate,
        data_bits,
        stop_bits,
        parity,
    } = connection
    else {
        return Err(TransportError::Connection(
            "serial transport requires a serial connection".to_string(),
        ));
    };

    let data_bits = match data_bits {
        5 => tokio_serial::DataBits::Five,
        6 => tokio_serial::DataBits::Six,
        7 => tokio_serial::DataBits::Seven,
        _ => tokio_serial::DataBits::Eight,
    };
    let stop_bits = match stop_bits {
        2 => tokio_serial::StopBits::Two,
        _ => tokio_serial::StopBits::One,
    };
    let parity = match parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Odd => tokio_serial::Parity::Odd,
        Parity::Even => tokio_serial::Parity::Even,
    };

    let builder = tokio_serial::new(port.as_str(), *baud_rate)
        .data_bits(data_bits)
        .stop_bits(stop_bits)
        .parity(parity);
    SerialStream::open(&builder)
        .map_err(|err| TransportError::Connection(format!("open {}: {}", port, err)))
}
