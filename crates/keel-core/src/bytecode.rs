//! Creation code of a compiled artifact

use alloy::primitives::Bytes;

use crate::error::{Error, Result};

/// Compiled contract creation code
#[derive(Debug, Clone)]
pub struct Bytecode {
    bytes: Vec<u8>,
}

impl Bytecode {
    /// Create bytecode from a hex string (with or without 0x prefix)
    pub fn from_hex(hex: &str) -> Result<Self> {
        let clean = hex.trim_start_matches("0x");
        if clean.contains("__$") {
            return Err(Error::Abi(
                "Bytecode contains unlinked library placeholders".to_string(),
            ));
        }
        let bytes = hex::decode(clean).map_err(|e| Error::Abi(format!("Invalid bytecode: {}", e)))?;
        Ok(Self { bytes })
    }

    /// Check if the bytecode is empty (interfaces and abstract contracts)
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Creation transaction input: the code followed by the encoded constructor arguments
    pub fn with_constructor_args(&self, encoded_args: &[u8]) -> Bytes {
        let mut data = Vec::with_capacity(self.bytes.len() + encoded_args.len());
        data.extend_from_slice(&self.bytes);
        data.extend_from_slice(encoded_args);
        Bytes::from(data)
    }
}
