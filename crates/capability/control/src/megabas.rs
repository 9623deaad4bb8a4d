//! Sequent Microsystems 板卡命令行驱动
//!
//! 板卡 id 格式：`<kind>:<stack>` 或仅 `<stack>`（默认 megabas）。
//!
//! | kind | 命令 | 通道 |
//! |---|---|---|
//! | megabas | `megabas <stack> uinrd/r10krd/uoutrd/uoutwr/trrd/trwr <ch> [value]` | 通用输入、模拟输出、可控硅 |
//! | 8relind | `8relind <stack> read/write <ch> [on/off]` | 继电器 1..=8 |
//! | 16relind | `16relind <stack> read/write <ch> [on/off]` | 继电器 1..=16 |

use crate::local::{HardwareDriver, HardwareError};
use async_trait::async_trait;
use domain::ChannelType;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const MAX_STACK: u8 = 7;
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoardKind {
    Megabas,
    Relay8,
    Relay16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BoardAddress {
    kind: BoardKind,
    stack: u8,
}

fn parse_board(board_id: &str) -> Result<BoardAddress, HardwareError> {
    let invalid = || HardwareError::InvalidBoard(board_id.to_string());
    let (kind, stack) = match board_id.trim().split_once(':') {
        Some((kind, stack)) => {
            let kind = match kind.trim().to_ascii_lowercase().as_str() {
                "megabas" => BoardKind::Megabas,
                "8relind" => BoardKind::Relay8,
                "16relind" => BoardKind::Relay16,
                _ => return Err(invalid()),
            };
            (kind, stack)
        }
        None => (BoardKind::Megabas, board_id),
    };
    let stack = stack.trim().parse::<u8>().map_err(|_| invalid())?;
    if stack > MAX_STACK {
        return Err(invalid());
    }
    Ok(BoardAddress { kind, stack })
}

fn on_off(raw: f64) -> &'static str {
    if raw >= 0.5 { "on" } else { "off" }
}

/// 命令输出解析：数值或 on/off。
fn parse_output(output: &str) -> Result<f64, HardwareError> {
    let text = output.trim();
    if let Ok(value) = text.parse::<f64>() {
        return Ok(value);
    }
    match text.to_ascii_lowercase().as_str() {
        "on" => Ok(1.0),
        "off" => Ok(0.0),
        _ => Err(HardwareError::Parse(text.to_string())),
    }
}

pub struct MegabasCliDriver {
    megabas_bin: String,
    relay8_bin: String,
    relay16_bin: String,
    timeout: Duration,
}

impl Default for MegabasCliDriver {
    fn default() -> Self {
        Self::new("megabas", "8relind", "16relind")
    }
}

impl MegabasCliDriver {
    pub fn new(
        megabas_bin: impl Into<String>,
        relay8_bin: impl Into<String>,
        relay16_bin: impl Into<String>,
    ) -> Self {
        Self {
            megabas_bin: megabas_bin.into(),
            relay8_bin: relay8_bin.into(),
            relay16_bin: relay16_bin.into(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn bin(&self, kind: BoardKind) -> &str {
        match kind {
            BoardKind::Megabas => &self.megabas_bin,
            BoardKind::Relay8 => &self.relay8_bin,
            BoardKind::Relay16 => &self.relay16_bin,
        }
    }

    /// 返回 (程序, 参数)。
    fn read_command(
        &self,
        board_id: &str,
        channel_type: ChannelType,
        index: u8,
    ) -> Result<(&str, Vec<String>), HardwareError> {
        let board = parse_board(board_id)?;
        let verb = match (board.kind, channel_type) {
            (BoardKind::Megabas, ChannelType::UniversalInput) => "uinrd",
            (BoardKind::Megabas, ChannelType::AnalogOutput) => "uoutrd",
            (BoardKind::Megabas, ChannelType::Triac) => "trrd",
            (BoardKind::Relay8 | BoardKind::Relay16, ChannelType::Relay) => "read",
            _ => return Err(no_channel(board_id, channel_type, index)),
        };
        check_index(board_id, board.kind, channel_type, index)?;
        Ok((
            self.bin(board.kind),
            vec![board.stack.to_string(), verb.to_string(), index.to_string()],
        ))
    }

    fn write_command(
        &self,
        board_id: &str,
        channel_type: ChannelType,
        index: u8,
        raw: f64,
    ) -> Result<(&str, Vec<String>), HardwareError> {
        let board = parse_board(board_id)?;
        let (verb, value) = match (board.kind, channel_type) {
            (BoardKind::Megabas, ChannelType::AnalogOutput) => {
                ("uoutwr", format!("{:.3}", raw.clamp(0.0, 10.0)))
            }
            (BoardKind::Megabas, ChannelType::Triac) => ("trwr", on_off(raw).to_string()),
            (BoardKind::Relay8 | BoardKind::Relay16, ChannelType::Relay) => {
                ("write", on_off(raw).to_string())
            }
            _ => return Err(no_channel(board_id, channel_type, index)),
        };
        check_index(board_id, board.kind, channel_type, index)?;
        Ok((
            self.bin(board.kind),
            vec![
                board.stack.to_string(),
                verb.to_string(),
                index.to_string(),
                value,
            ],
        ))
    }

    async fn run(&self, program: &str, args: &[String]) -> Result<String, HardwareError> {
        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);
        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| HardwareError::Timeout(self.timeout.as_millis() as u64))??;
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(
            target: "fpg.control",
            program = %program,
            args = %args.join(" "),
            status = ?output.status.code(),
            "hardware_command"
        );
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HardwareError::Command(format!(
                "{} {}: {}",
                program,
                args.join(" "),
                if stderr.trim().is_empty() { stdout.as_str() } else { stderr.trim() }
            )));
        }
        Ok(stdout)
    }
}

fn no_channel(board_id: &str, channel: ChannelType, index: u8) -> HardwareError {
    HardwareError::InvalidChannel {
        board: board_id.to_string(),
        channel,
        index,
    }
}

fn check_index(
    board_id: &str,
    kind: BoardKind,
    channel: ChannelType,
    index: u8,
) -> Result<(), HardwareError> {
    let max = match kind {
        BoardKind::Relay8 => 8,
        BoardKind::Megabas | BoardKind::Relay16 => channel.max_index(),
    };
    if index == 0 || index > max {
        return Err(no_channel(board_id, channel, index));
    }
    Ok(())
}

#[async_trait]
impl HardwareDriver for MegabasCliDriver {
    async fn read_raw(
        &self,
        board_id: &str,
        channel_type: ChannelType,
        channel_index: u8,
    ) -> Result<f64, HardwareError> {
        let (program, args) = self.read_command(board_id, channel_type, channel_index)?;
        parse_output(&self.run(program, &args).await?)
    }

    async fn write_raw(
        &self,
        board_id: &str,
        channel_type: ChannelType,
        channel_index: u8,
        raw: f64,
    ) -> Result<(), HardwareError> {
        let (program, args) = self.write_command(board_id, channel_type, channel_index, raw)?;
        self.run(program, &args).await.map(|_| ())
    }

    /// `r10krd` 输出千欧。
    async fn read_resistance(&self, board_id: &str, channel_index: u8) -> Result<f64, HardwareError> {
        let board = parse_board(board_id)?;
        if board.kind != BoardKind::Megabas {
            return Err(no_channel(board_id, ChannelType::UniversalInput, channel_index));
        }
        check_index(board_id, board.kind, ChannelType::UniversalInput, channel_index)?;
        let args = vec![
            board.stack.to_string(),
            "r10krd".to_string(),
            channel_index.to_string(),
        ];
        let kilo_ohms = parse_output(&self.run(self.bin(board.kind), &args).await?)?;
        Ok(kilo_ohms * 1000.0)
    }
}
