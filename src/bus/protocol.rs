//! Wire codec for the benchmark bus.
//!
//! Strings and byte arrays are framed with a big-endian `i32` length
//! prefix. Commands are a single opcode byte followed by their payload.
//!
//! | message | layout                                                 |
//! |---------|--------------------------------------------------------|
//! | data    | `string file_name`, raw content (rest of the message)  |
//! | command | `u8 opcode`, payload                                   |
//! | task    | `string task_id`, `string task_type`, `string payload` |
//! | result  | `string task_id`, `i32 count`, `count` byte arrays     |

use crate::core::{Task, TaskResult};
use crate::error::{AdapterError, Result};

/// Sent by the adapter when it has finished bulk loading a version.
pub const BULK_LOADING_DATA_FINISHED: u8 = 150;

/// Sent by the controller when all data of a version has been generated.
pub const BULK_LOAD_DATA_GEN_FINISHED: u8 = 151;

/// Commands exchanged with the benchmark controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    GenerationFinished { count: i32, is_last_phase: bool },
    LoadingFinished,
    /// Any opcode this adapter does not act upon.
    Other(u8),
}

impl Command {
    pub fn opcode(&self) -> u8 {
        match self {
            Command::GenerationFinished { .. } => BULK_LOAD_DATA_GEN_FINISHED,
            Command::LoadingFinished => BULK_LOADING_DATA_FINISHED,
            Command::Other(opcode) => *opcode,
        }
    }

    /// Decode an opcode and its payload.
    pub fn decode(opcode: u8, payload: &[u8]) -> Result<Self> {
        match opcode {
            BULK_LOAD_DATA_GEN_FINISHED => {
                let mut reader = ByteReader::new(payload);
                let count = reader.read_i32()?;
                let is_last_phase = reader.read_u8()? != 0;
                if count < 0 {
                    return Err(AdapterError::Transport(format!(
                        "negative fragment count {}",
                        count
                    )));
                }
                Ok(Command::GenerationFinished { count, is_last_phase })
            }
            BULK_LOADING_DATA_FINISHED => Ok(Command::LoadingFinished),
            other => Ok(Command::Other(other)),
        }
    }

    /// Decode a whole command message: opcode byte followed by payload.
    pub fn from_message(message: &[u8]) -> Result<Self> {
        match message.split_first() {
            Some((opcode, payload)) => Self::decode(*opcode, payload),
            None => Err(AdapterError::Transport("empty command message".to_string())),
        }
    }

    pub fn payload(&self) -> Vec<u8> {
        match self {
            Command::GenerationFinished { count, is_last_phase } => {
                let mut out = count.to_be_bytes().to_vec();
                out.push(u8::from(*is_last_phase));
                out
            }
            Command::LoadingFinished | Command::Other(_) => Vec::new(),
        }
    }

    pub fn to_message(&self) -> Vec<u8> {
        let mut out = vec![self.opcode()];
        out.extend(self.payload());
        out
    }
}

/// A data file delivered by a generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFragment {
    pub file_name: String,
    pub content: Vec<u8>,
}

impl DataFragment {
    pub fn decode(message: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(message);
        let file_name = reader.read_string()?;
        let content = reader.rest().to_vec();
        Ok(Self { file_name, content })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.file_name.len() + self.content.len());
        write_string(&mut out, &self.file_name);
        out.extend_from_slice(&self.content);
        out
    }
}

/// Decode the body of a task (type and payload) once its id is known.
pub fn decode_task_body(task_id: &str, body: &[u8]) -> Result<Task> {
    let mut reader = ByteReader::new(body);
    let declared_type = reader.read_string()?;
    let payload = if reader.is_empty() { String::new() } else { reader.read_string()? };
    Ok(Task { task_id: task_id.to_string(), declared_type, payload })
}

/// Decode a full task message: task id followed by the task body.
pub fn decode_task_message(message: &[u8]) -> Result<Task> {
    let mut reader = ByteReader::new(message);
    let task_id = reader.read_string()?;
    decode_task_body(&task_id, reader.rest())
}

pub fn encode_task_message(task: &Task) -> Vec<u8> {
    let mut out = Vec::new();
    write_string(&mut out, &task.task_id);
    write_string(&mut out, &task.declared_type);
    write_string(&mut out, &task.payload);
    out
}

pub fn encode_result_message(result: &TaskResult) -> Vec<u8> {
    let mut out = Vec::new();
    write_string(&mut out, &result.task_id);
    write_byte_arrays(&mut out, &result.segments);
    out
}

pub fn decode_result_message(message: &[u8]) -> Result<TaskResult> {
    let mut reader = ByteReader::new(message);
    let task_id = reader.read_string()?;
    let count = reader.read_len()?;
    let mut segments = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        segments.push(reader.read_bytes()?.to_vec());
    }
    Ok(TaskResult { task_id, segments })
}

pub fn write_string(out: &mut Vec<u8>, value: &str) {
    write_bytes(out, value.as_bytes());
}

pub fn write_bytes(out: &mut Vec<u8>, value: &[u8]) {
    out.extend_from_slice(&(value.len() as i32).to_be_bytes());
    out.extend_from_slice(value);
}

pub fn write_byte_arrays(out: &mut Vec<u8>, arrays: &[Vec<u8>]) {
    out.extend_from_slice(&(arrays.len() as i32).to_be_bytes());
    for array in arrays {
        write_bytes(out, array);
    }
}

/// Cursor over a received message. Every read checks the remaining length.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos.min(self.buf.len())..]
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.buf.len()).ok_or_else(
            || {
                AdapterError::Transport(format!(
                    "message truncated: needed {} bytes at offset {}, {} available",
                    len,
                    self.pos,
                    self.buf.len().saturating_sub(self.pos)
                ))
            },
        )?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_len(&mut self) -> Result<usize> {
        let len = self.read_i32()?;
        usize::try_from(len)
            .map_err(|_| AdapterError::Transport(format!("negative length prefix {}", len)))
    }

    pub fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_len()?;
        self.take(len)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| AdapterError::Transport(format!("string is not UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TaskType;

    #[test]
    fn test_generation_finished_payload() {
        let message = Command::GenerationFinished { count: 5, is_last_phase: true }.to_message();
        assert_eq!(message, vec![151, 0, 0, 0, 5, 1]);
        assert_eq!(
            Command::from_message(&message).unwrap(),
            Command::GenerationFinished { count: 5, is_last_phase: true }
        );
    }

    #[test]
    fn test_undersized_generation_finished() {
        let err = Command::decode(BULK_LOAD_DATA_GEN_FINISHED, &[0, 0, 1]).unwrap_err();
        assert!(matches!(err, AdapterError::Transport(_)));
    }

    #[test]
    fn test_unknown_opcode_is_passed_through() {
        assert_eq!(Command::from_message(&[12, 1, 2]).unwrap(), Command::Other(12));
        assert!(Command::from_message(&[]).is_err());
    }

    #[test]
    fn test_data_fragment_keeps_raw_content() {
        let fragment = DataFragment {
            file_name: "v0/data.nt".to_string(),
            content: b"<a> <b> <c> .\n".to_vec(),
        };
        let decoded = DataFragment::decode(&fragment.encode()).unwrap();
        assert_eq!(decoded, fragment);
    }

    #[test]
    fn test_data_fragment_with_oversized_length_prefix() {
        let mut message = 1000i32.to_be_bytes().to_vec();
        message.extend_from_slice(b"short");
        assert!(matches!(DataFragment::decode(&message), Err(AdapterError::Transport(_))));
    }

    #[test]
    fn test_task_message_without_payload() {
        let mut message = Vec::new();
        write_string(&mut message, "task-7");
        write_string(&mut message, "2");
        let task = decode_task_message(&message).unwrap();
        assert_eq!(task.task_id, "task-7");
        assert_eq!(task.kind().unwrap(), TaskType::StorageSpace);
        assert!(task.payload.is_empty());
    }

    #[test]
    fn test_result_message_layout() {
        let result = TaskResult::new("q1", TaskType::Query).with_field("4").with_field(2);
        let message = encode_result_message(&result);
        // id (4 + 2), count (4), three segments of one byte each (3 * 5)
        assert_eq!(message.len(), 6 + 4 + 15);
        assert_eq!(decode_result_message(&message).unwrap(), result);
    }
}
