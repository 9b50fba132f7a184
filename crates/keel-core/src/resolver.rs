//! Constructor argument resolution
//!
//! Substitutes deployed addresses into a spec's argument template. The
//! registry order is trusted here; [`Registry::validate`](crate::Registry::validate)
//! is what asserts it.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::registry::{ArgRef, ArtifactSpec};
use crate::types::RunState;

/// Resolve the constructor arguments of `spec` against the records deployed so far.
///
/// Literals pass through unchanged. Each `address_of` reference becomes the
/// checksummed address of the named record; a name with no record is an
/// [`Error::UnresolvedReference`].
pub fn resolve_args(spec: &ArtifactSpec, state: &RunState) -> Result<Vec<Value>> {
    spec.constructor_args
        .iter()
        .map(|arg| match arg {
            ArgRef::Literal(value) => Ok(value.clone()),
            ArgRef::AddressOf { address_of } => state
                .address_of(address_of)
                .map(|address| Value::String(address.to_checksum(None)))
                .ok_or_else(|| Error::UnresolvedReference {
                    artifact: spec.name.clone(),
                    reference: address_of.clone(),
                }),
        })
        .collect()
}
