//! ABI parsing and constructor argument encoding
//!
//! Provides the [`Abi`] struct for access to a contract's constructor inputs and
//! [`encode_constructor_args`], which turns resolved JSON arguments into the
//! ABI-encoded bytes appended to creation code and sent to the verifier.

use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::json_abi::{JsonAbi, Param};
use alloy::primitives::{Address, Bytes, FixedBytes, I256, U256};

use crate::error::{Error, Result};

// =============================================================================
// Abi Struct
// =============================================================================

/// Wrapper around alloy's JsonAbi
#[derive(Debug, Clone)]
pub struct Abi(JsonAbi);

impl Abi {
    /// Parse from a serde_json::Value
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let abi: JsonAbi = serde_json::from_value(value.clone())
            .map_err(|e| Error::Abi(format!("Failed to parse ABI: {}", e)))?;
        Ok(Self(abi))
    }

    /// Constructor inputs, empty when the contract declares no constructor
    pub fn constructor_inputs(&self) -> Vec<ParamInfo> {
        self.0
            .constructor
            .as_ref()
            .map(|c| c.inputs.iter().map(ParamInfo::from_abi_param).collect())
            .unwrap_or_default()
    }
}

/// A constructor parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamInfo {
    pub name: String,
    pub param_type: String,
}

impl ParamInfo {
    pub fn from_abi_param(param: &Param) -> Self {
        Self {
            name: param.name.clone(),
            // selector_type expands tuples into their component types
            param_type: param.selector_type().into_owned(),
        }
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// ABI-encode `args` against the constructor `inputs`.
///
/// The argument count and every value's type must match exactly; a mismatch
/// is an [`Error::Abi`] and is never retried.
pub fn encode_constructor_args(inputs: &[ParamInfo], args: &[serde_json::Value]) -> Result<Vec<u8>> {
    if inputs.len() != args.len() {
        return Err(Error::Abi(format!(
            "Expected {} constructor arguments, got {}",
            inputs.len(),
            args.len()
        )));
    }

    if inputs.is_empty() {
        return Ok(Vec::new());
    }

    let values = inputs
        .iter()
        .zip(args)
        .enumerate()
        .map(|(i, (input, value))| {
            json_to_sol_value(&input.param_type, value)
                .map_err(|e| Error::Abi(format!("Argument {} ({}): {}", i, input.name, e)))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(DynSolValue::Tuple(values).abi_encode_params())
}

/// Convert a JSON value into a Solidity value of the given type
pub fn json_to_sol_value(type_str: &str, value: &serde_json::Value) -> Result<DynSolValue, String> {
    let sol_type: DynSolType = type_str
        .parse()
        .map_err(|e| format!("Unknown type '{}': {}", type_str, e))?;

    to_sol_value(&sol_type, value)
}

fn to_sol_value(sol_type: &DynSolType, value: &serde_json::Value) -> Result<DynSolValue, String> {
    match sol_type {
        DynSolType::Address => {
            let addr_str = value.as_str().ok_or("Expected string for address")?;
            let addr: Address = addr_str
                .parse()
                .map_err(|e| format!("Invalid address '{}': {}", addr_str, e))?;
            Ok(DynSolValue::Address(addr))
        }
        DynSolType::Bool => {
            let b = value.as_bool().ok_or("Expected boolean")?;
            Ok(DynSolValue::Bool(b))
        }
        DynSolType::Uint(bits) => Ok(DynSolValue::Uint(parse_uint(value)?, *bits)),
        DynSolType::Int(bits) => Ok(DynSolValue::Int(parse_int(value)?, *bits)),
        DynSolType::Bytes => {
            let hex_str = value.as_str().ok_or("Expected hex string for bytes")?;
            let bytes: Bytes = hex_str.parse().map_err(|e| format!("Invalid hex: {}", e))?;
            Ok(DynSolValue::Bytes(bytes.to_vec()))
        }
        DynSolType::String => {
            let s = value.as_str().ok_or("Expected string")?;
            Ok(DynSolValue::String(s.to_string()))
        }
        DynSolType::FixedBytes(size) => {
            let hex_str = value.as_str().ok_or("Expected hex string")?;
            let bytes: Bytes = hex_str.parse().map_err(|e| format!("Invalid hex: {}", e))?;
            if bytes.len() != *size {
                return Err(format!("Expected {} bytes, got {}", size, bytes.len()));
            }
            let mut word = [0u8; 32];
            word[..*size].copy_from_slice(&bytes);
            Ok(DynSolValue::FixedBytes(FixedBytes::from(word), *size))
        }
        DynSolType::Array(inner) => {
            let arr = value.as_array().ok_or("Expected array")?;
            let values = arr
                .iter()
                .map(|v| to_sol_value(inner, v))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(DynSolValue::Array(values))
        }
        DynSolType::FixedArray(inner, len) => {
            let arr = value.as_array().ok_or("Expected array")?;
            if arr.len() != *len {
                return Err(format!("Expected {} elements, got {}", len, arr.len()));
            }
            let values = arr
                .iter()
                .map(|v| to_sol_value(inner, v))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(DynSolValue::FixedArray(values))
        }
        DynSolType::Tuple(types) => {
            let arr = value.as_array().ok_or("Expected array for tuple")?;
            if arr.len() != types.len() {
                return Err(format!(
                    "Expected {} tuple fields, got {}",
                    types.len(),
                    arr.len()
                ));
            }
            let values = types
                .iter()
                .zip(arr)
                .map(|(t, v)| to_sol_value(t, v))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(DynSolValue::Tuple(values))
        }
        other => Err(format!("Unsupported type: {}", other)),
    }
}

fn parse_uint(value: &serde_json::Value) -> Result<U256, String> {
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| "Expected a non-negative integer for uint".to_string()),
        serde_json::Value::String(s) => s
            .parse::<U256>()
            .map_err(|e| format!("Invalid uint: {}", e)),
        _ => Err("Expected number or string for uint".to_string()),
    }
}

fn parse_int(value: &serde_json::Value) -> Result<I256, String> {
    match value {
        serde_json::Value::Number(n) => {
            let i = n.as_i64().ok_or("Number out of range")?;
            I256::try_from(i).map_err(|e| format!("Invalid int: {}", e))
        }
        serde_json::Value::String(s) => s
            .parse::<I256>()
            .map_err(|e| format!("Invalid int: {}", e)),
        _ => Err("Expected number or string for int".to_string()),
    }
}
