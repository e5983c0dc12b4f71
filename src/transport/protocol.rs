//! Wire Protocol
//!
//! Requests are framed as a numeric operation id plus a bincode body whose
//! shape depends on that id. The table below is fixed; any substrate binding
//! carrying work-manager traffic must use these ids.
//!
//! | id | operation | | id | operation |
//! |----|-----------|-|----|-----------|
//! | 1 | join | | 10 | update long-running free |
//! | 2 | leave | | 11 | delta doWork accepted |
//! | 3 | ping | | 12 | delta doWork rejected |
//! | 4 | doWork | | 13 | delta startWork accepted |
//! | 5 | startWork | | 14 | delta startWork rejected |
//! | 6 | scheduleWork | | 15 | delta scheduleWork accepted |
//! | 7 | get short-running free | | 16 | delta scheduleWork rejected |
//! | 8 | get long-running free | | 17 | delta work successful |
//! | 9 | update short-running free | | 18 | delta work failed |

use crate::error::ChannelError;
use crate::executor::types::Work;
use crate::membership::types::NodeId;
use crate::workmanager::statistics::Counter;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum OpCode {
    Join = 1,
    Leave = 2,
    Ping = 3,
    DoWork = 4,
    StartWork = 5,
    ScheduleWork = 6,
    GetShortRunningFree = 7,
    GetLongRunningFree = 8,
    UpdateShortRunningFree = 9,
    UpdateLongRunningFree = 10,
    DeltaDoWorkAccepted = 11,
    DeltaDoWorkRejected = 12,
    DeltaStartWorkAccepted = 13,
    DeltaStartWorkRejected = 14,
    DeltaScheduleWorkAccepted = 15,
    DeltaScheduleWorkRejected = 16,
    DeltaWorkSuccessful = 17,
    DeltaWorkFailed = 18,
}

impl OpCode {
    pub fn id(self) -> u16 {
        self as u16
    }

    pub fn for_delta(counter: Counter) -> OpCode {
        match counter {
            Counter::DoWorkAccepted => OpCode::DeltaDoWorkAccepted,
            Counter::DoWorkRejected => OpCode::DeltaDoWorkRejected,
            Counter::StartWorkAccepted => OpCode::DeltaStartWorkAccepted,
            Counter::StartWorkRejected => OpCode::DeltaStartWorkRejected,
            Counter::ScheduleWorkAccepted => OpCode::DeltaScheduleWorkAccepted,
            Counter::ScheduleWorkRejected => OpCode::DeltaScheduleWorkRejected,
            Counter::WorkSuccessful => OpCode::DeltaWorkSuccessful,
            Counter::WorkFailed => OpCode::DeltaWorkFailed,
        }
    }

    pub fn delta_counter(self) -> Option<Counter> {
        match self {
            OpCode::DeltaDoWorkAccepted => Some(Counter::DoWorkAccepted),
            OpCode::DeltaDoWorkRejected => Some(Counter::DoWorkRejected),
            OpCode::DeltaStartWorkAccepted => Some(Counter::StartWorkAccepted),
            OpCode::DeltaStartWorkRejected => Some(Counter::StartWorkRejected),
            OpCode::DeltaScheduleWorkAccepted => Some(Counter::ScheduleWorkAccepted),
            OpCode::DeltaScheduleWorkRejected => Some(Counter::ScheduleWorkRejected),
            OpCode::DeltaWorkSuccessful => Some(Counter::WorkSuccessful),
            OpCode::DeltaWorkFailed => Some(Counter::WorkFailed),
            _ => None,
        }
    }

    /// One-way operations are sent without waiting for a reply.
    pub fn is_one_way(self) -> bool {
        matches!(
            self,
            OpCode::Join
                | OpCode::Leave
                | OpCode::UpdateShortRunningFree
                | OpCode::UpdateLongRunningFree
        ) || self.delta_counter().is_some()
    }
}

impl TryFrom<u16> for OpCode {
    type Error = ChannelError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        let op = match value {
            1 => OpCode::Join,
            2 => OpCode::Leave,
            3 => OpCode::Ping,
            4 => OpCode::DoWork,
            5 => OpCode::StartWork,
            6 => OpCode::ScheduleWork,
            7 => OpCode::GetShortRunningFree,
            8 => OpCode::GetLongRunningFree,
            9 => OpCode::UpdateShortRunningFree,
            10 => OpCode::UpdateLongRunningFree,
            11 => OpCode::DeltaDoWorkAccepted,
            12 => OpCode::DeltaDoWorkRejected,
            13 => OpCode::DeltaStartWorkAccepted,
            14 => OpCode::DeltaStartWorkRejected,
            15 => OpCode::DeltaScheduleWorkAccepted,
            16 => OpCode::DeltaScheduleWorkRejected,
            17 => OpCode::DeltaWorkSuccessful,
            18 => OpCode::DeltaWorkFailed,
            other => return Err(ChannelError::UnknownOperation(other)),
        };
        Ok(op)
    }
}

/// A decoded request. `A` is the substrate's address type.
#[derive(Debug, Clone)]
pub enum Request<A> {
    Join { node: NodeId, address: A },
    Leave { node: NodeId },
    Ping,
    DoWork(Work),
    StartWork(Work),
    ScheduleWork(Work),
    GetShortRunningFree,
    GetLongRunningFree,
    UpdateShortRunningFree { node: NodeId, free: u64 },
    UpdateLongRunningFree { node: NodeId, free: u64 },
    Delta { origin: NodeId, counter: Counter },
}

impl<A> Request<A>
where
    A: Serialize + DeserializeOwned,
{
    pub fn op_code(&self) -> OpCode {
        match self {
            Request::Join { .. } => OpCode::Join,
            Request::Leave { .. } => OpCode::Leave,
            Request::Ping => OpCode::Ping,
            Request::DoWork(_) => OpCode::DoWork,
            Request::StartWork(_) => OpCode::StartWork,
            Request::ScheduleWork(_) => OpCode::ScheduleWork,
            Request::GetShortRunningFree => OpCode::GetShortRunningFree,
            Request::GetLongRunningFree => OpCode::GetLongRunningFree,
            Request::UpdateShortRunningFree { .. } => OpCode::UpdateShortRunningFree,
            Request::UpdateLongRunningFree { .. } => OpCode::UpdateLongRunningFree,
            Request::Delta { counter, .. } => OpCode::for_delta(*counter),
        }
    }

    pub fn encode(&self) -> Result<(OpCode, Vec<u8>), ChannelError> {
        let body = match self {
            Request::Join { node, address } => bincode::serialize(&(node, address))?,
            Request::Leave { node } => bincode::serialize(node)?,
            Request::Ping | Request::GetShortRunningFree | Request::GetLongRunningFree => {
                Vec::new()
            }
            Request::DoWork(work) | Request::StartWork(work) | Request::ScheduleWork(work) => {
                bincode::serialize(work)?
            }
            Request::UpdateShortRunningFree { node, free }
            | Request::UpdateLongRunningFree { node, free } => bincode::serialize(&(node, free))?,
            Request::Delta { origin, .. } => bincode::serialize(origin)?,
        };
        Ok((self.op_code(), body))
    }

    /// Decodes a body using the argument layout registered for `op`.
    pub fn decode(op: u16, body: &[u8]) -> Result<Self, ChannelError> {
        let request = match OpCode::try_from(op)? {
            OpCode::Join => {
                let (node, address): (NodeId, A) = bincode::deserialize(body)?;
                Request::Join { node, address }
            }
            OpCode::Leave => Request::Leave {
                node: bincode::deserialize(body)?,
            },
            OpCode::Ping => Request::Ping,
            OpCode::DoWork => Request::DoWork(bincode::deserialize(body)?),
            OpCode::StartWork => Request::StartWork(bincode::deserialize(body)?),
            OpCode::ScheduleWork => Request::ScheduleWork(bincode::deserialize(body)?),
            OpCode::GetShortRunningFree => Request::GetShortRunningFree,
            OpCode::GetLongRunningFree => Request::GetLongRunningFree,
            OpCode::UpdateShortRunningFree => {
                let (node, free) = bincode::deserialize(body)?;
                Request::UpdateShortRunningFree { node, free }
            }
            OpCode::UpdateLongRunningFree => {
                let (node, free) = bincode::deserialize(body)?;
                Request::UpdateLongRunningFree { node, free }
            }
            delta => {
                let counter = delta
                    .delta_counter()
                    .ok_or(ChannelError::UnknownOperation(op))?;
                Request::Delta {
                    origin: bincode::deserialize(body)?,
                    counter,
                }
            }
        };
        Ok(request)
    }
}

/// Successful outcome of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    Done,
    /// Free-worker count, start delay in ms, or peer clock in ms for a ping.
    Value(u64),
}

pub type ReplyResult = Result<Reply, String>;

pub fn encode_reply(reply: &ReplyResult) -> Result<Vec<u8>, ChannelError> {
    Ok(bincode::serialize(reply)?)
}

pub fn decode_reply(bytes: &[u8]) -> Result<ReplyResult, ChannelError> {
    Ok(bincode::deserialize(bytes)?)
}
