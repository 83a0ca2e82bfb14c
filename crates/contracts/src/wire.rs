//! Framed wire transport.
//!
//! Every message travels as one frame over a plain TCP stream:
//!
//! ```text
//! ┌────────────┬──────┬───────────┐
//! │ length     │ u32  │  4 bytes  │  big-endian, covers op + status + body
//! ├────────────┼──────┼───────────┤
//! │ op         │ u8   │  1 byte   │
//! ├────────────┼──────┼───────────┤
//! │ status     │ u8   │  1 byte   │  0 on requests
//! ├────────────┼──────┼───────────┤
//! │ body       │ [u8] │  N bytes  │  bincode
//! └────────────┴──────┴───────────┘
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::CoordError;

/// Frame header length after the length prefix (op + status).
pub const FRAME_HEADER_LEN: usize = 2;

/// Transport message ceiling; drains are batched to stay under it.
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

/// Operation selector for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    RegisterVehicle = 1,
    SendUpdate = 2,
    GetWaypoints = 3,
    DoTick = 4,
    GetVehicleUpdates = 5,
    StartScenario = 6,
    EndScenario = 7,
    PushEdgeWaypoints = 8,
    PushTick = 9,
    Ping = 10,
    Pong = 11,
}

impl TryFrom<u8> for OpCode {
    type Error = CoordError;

    fn try_from(value: u8) -> Result<Self, CoordError> {
        match value {
            1 => Ok(OpCode::RegisterVehicle),
            2 => Ok(OpCode::SendUpdate),
            3 => Ok(OpCode::GetWaypoints),
            4 => Ok(OpCode::DoTick),
            5 => Ok(OpCode::GetVehicleUpdates),
            6 => Ok(OpCode::StartScenario),
            7 => Ok(OpCode::EndScenario),
            8 => Ok(OpCode::PushEdgeWaypoints),
            9 => Ok(OpCode::PushTick),
            10 => Ok(OpCode::Ping),
            11 => Ok(OpCode::Pong),
            other => Err(CoordError::UnknownOpcode { value: other }),
        }
    }
}

/// Response status for a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    #[default]
    Ok = 0,
    InvalidArgument = 1,
    FailedPrecondition = 2,
    ResourceExhausted = 3,
    Internal = 4,
}

impl Status {
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl TryFrom<u8> for Status {
    type Error = CoordError;

    fn try_from(value: u8) -> Result<Self, CoordError> {
        match value {
            0 => Ok(Status::Ok),
            1 => Ok(Status::InvalidArgument),
            2 => Ok(Status::FailedPrecondition),
            3 => Ok(Status::ResourceExhausted),
            4 => Ok(Status::Internal),
            other => Err(CoordError::UnknownStatus { value: other }),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Status::Ok => "ok",
            Status::InvalidArgument => "invalid argument",
            Status::FailedPrecondition => "failed precondition",
            Status::ResourceExhausted => "resource exhausted",
            Status::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// One wire frame: opcode, status, opaque bincode body.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub op: OpCode,
    pub status: Status,
    pub body: Bytes,
}

impl Frame {
    /// Build a request frame carrying `msg`.
    pub fn request<T: Serialize>(op: OpCode, msg: &T) -> Result<Self, CoordError> {
        Ok(Self {
            op,
            status: Status::Ok,
            body: encode(msg)?,
        })
    }

    /// Build a successful response frame carrying `msg`.
    pub fn response<T: Serialize>(op: OpCode, msg: &T) -> Result<Self, CoordError> {
        Self::request(op, msg)
    }

    /// Build an error response with an empty body.
    pub fn error(op: OpCode, status: Status) -> Self {
        Self {
            op,
            status,
            body: Bytes::new(),
        }
    }

    /// Bodyless control frame (ping/pong).
    pub fn control(op: OpCode) -> Self {
        Self {
            op,
            status: Status::Ok,
            body: Bytes::new(),
        }
    }

    /// Decode the frame body.
    pub fn decode_body<T: DeserializeOwned>(&self) -> Result<T, CoordError> {
        decode(&self.body)
    }
}

/// Serialize a message to its wire body.
pub fn encode<T: Serialize>(msg: &T) -> Result<Bytes, CoordError> {
    let vec = bincode::serialize(msg).map_err(|e| CoordError::codec(e.to_string()))?;
    Ok(Bytes::from(vec))
}

/// Deserialize a message from its wire body.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CoordError> {
    bincode::deserialize(bytes).map_err(|e| CoordError::codec(e.to_string()))
}

/// Write one frame to the stream.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), CoordError>
where
    W: AsyncWrite + Unpin,
{
    let len = FRAME_HEADER_LEN + frame.body.len();
    if len > MAX_FRAME_LEN {
        return Err(CoordError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut buf = BytesMut::with_capacity(4 + len);
    buf.put_u32(len as u32);
    buf.put_u8(frame.op as u8);
    buf.put_u8(frame.status as u8);
    buf.put_slice(&frame.body);

    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame from the stream.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, CoordError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len < FRAME_HEADER_LEN || len > MAX_FRAME_LEN {
        return Err(CoordError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let op = OpCode::try_from(reader.read_u8().await?)?;
    let status = Status::try_from(reader.read_u8().await?)?;

    let mut body = vec![0u8; len - FRAME_HEADER_LEN];
    reader.read_exact(&mut body).await?;

    Ok(Frame {
        op,
        status,
        body: Bytes::from(body),
    })
}
