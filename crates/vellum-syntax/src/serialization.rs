use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Registered deserializer name carried inside the envelope.
pub const DESERIALIZER_NAME: &str = "TokenizedBuffer";

/// Serialized form of a tokenized buffer.
///
/// Tokenized state itself is never persisted; the envelope records only what
/// is needed to rebind to a live buffer and re-tokenize from scratch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenizedBufferState {
	pub deserializer: String,
	#[serde(rename = "bufferPath")]
	pub buffer_path: Option<PathBuf>,
	#[serde(rename = "bufferId")]
	pub buffer_id: u64,
	#[serde(rename = "tabLength")]
	pub tab_length: u32,
	#[serde(rename = "largeFileMode")]
	pub large_file_mode: bool,
}
